use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    /// Path of the selected image, relative to the API's image directory.
    #[serde(default)]
    pub image: String,
}

/// Client-supplied fields of an event; the server assigns the id.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, TypedBuilder,
)]
#[builder(field_defaults(setter(into)))]
pub struct EventInput {
    pub title: String,
    #[builder(default)]
    pub description: String,
    pub date: String,
    #[builder(default)]
    pub time: String,
    #[builder(default)]
    pub location: String,
    #[builder(default)]
    pub image: String,
}

impl Event {
    pub fn from_input(id: impl Into<String>, input: EventInput) -> Self {
        Self {
            id: id.into(),
            title: input.title,
            description: input.description,
            date: input.date,
            time: input.time,
            location: input.location,
            image: input.image,
        }
    }

    /// Human readable date such as `May 3, 2024`. Unparseable dates are
    /// returned unchanged.
    pub fn formatted_date(&self) -> String {
        match NaiveDate::parse_from_str(&self.date, "%Y-%m-%d") {
            Ok(date) => date.format("%B %-d, %Y").to_string(),
            Err(_) => self.date.clone(),
        }
    }

    pub fn to_input(&self) -> EventInput {
        EventInput {
            title: self.title.clone(),
            description: self.description.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
            location: self.location.clone(),
            image: self.image.clone(),
        }
    }
}
