use serde::{Deserialize, Serialize};

/// A selectable event image served by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventImage {
    pub path: String,
    #[serde(default)]
    pub caption: String,
}
