use events_models::{Event, EventImage, EventInput};

pub fn sample_input(title: &str) -> EventInput {
    EventInput::builder()
        .title(title)
        .description(format!("All about {}", title.to_lowercase()))
        .date("2024-05-03")
        .time("18:00")
        .location("Berlin")
        .image("buzzing-city.jpg")
        .build()
}

pub fn sample_event(id: &str, title: &str) -> Event {
    Event::from_input(id, sample_input(title))
}

/// Three events, newest first.
pub fn sample_events() -> Vec<Event> {
    vec![
        sample_event("e1", "Jazz Night"),
        sample_event("e2", "Rust Meetup"),
        sample_event("e3", "City Walk"),
    ]
}

pub fn sample_images() -> Vec<EventImage> {
    vec![
        EventImage {
            path: "buzzing-city.jpg".to_string(),
            caption: "People in a busy city".to_string(),
        },
        EventImage {
            path: "meeting-networking.jpg".to_string(),
            caption: "People networking at a meetup".to_string(),
        },
    ]
}
