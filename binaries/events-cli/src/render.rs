use std::fmt::Write;

use events_models::{Event, EventImage};

pub fn events(events: &[Event]) -> String {
    if events.is_empty() {
        return "No events found.".to_string();
    }
    let mut out = String::new();
    for event in events {
        let _ = writeln!(
            out,
            "{:<12} {}  ({}, {})",
            event.id,
            event.title,
            event.formatted_date(),
            event.location
        );
    }
    out.trim_end().to_string()
}

pub fn event(event: &Event) -> String {
    let mut out = format!("{}\n", event.title);
    let _ = writeln!(out, "  id:       {}", event.id);
    let _ = writeln!(out, "  when:     {} @ {}", event.formatted_date(), event.time);
    let _ = writeln!(out, "  where:    {}", event.location);
    let _ = writeln!(out, "  image:    {}", event.image);
    if !event.description.is_empty() {
        let _ = write!(out, "\n{}", event.description);
    }
    out.trim_end().to_string()
}

pub fn images(images: &[EventImage]) -> String {
    images
        .iter()
        .map(|image| format!("{:<32} {}", image.path, image.caption))
        .collect::<Vec<_>>()
        .join("\n")
}
