pub mod envelopes;
pub mod events;
pub mod images;

pub use envelopes::{EventEnvelope, EventsEnvelope, ImagesEnvelope};
pub use events::{Event, EventInput};
pub use images::EventImage;
