pub mod api;
pub mod client;
pub mod config;

pub use api::EventsApi;
pub use client::{HttpEventsApi, HttpSetupError};
pub use config::HttpConfig;
