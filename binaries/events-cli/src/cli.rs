use clap::{Args, Parser, Subcommand};
use events_http::HttpConfig;
use events_models::{Event, EventInput};
use query_cache::QueryCacheConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "events-cli")]
#[command(about = "Browse and manage events through the cached events API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Base URL of the events API
    #[arg(long, env = "EVENTS_API_URL", default_value = "http://localhost:3000")]
    pub api_url: String,

    #[arg(long, env = "EVENTS_API_TIMEOUT_SECS", default_value = "10")]
    pub timeout_secs: u64,

    /// Cache-wide freshness window
    #[arg(long, env = "EVENTS_STALE_TIME_MS", default_value = "0")]
    pub stale_time_ms: u64,

    #[arg(long, env = "EVENTS_GC_TIME_MS", default_value = "300000")]
    pub gc_time_ms: u64,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Most recent events
    List {
        #[arg(long)]
        max: Option<u32>,
    },
    /// Events whose title, description or location match a term
    Search {
        term: String,

        #[arg(long)]
        max: Option<u32>,
    },
    /// One event in full
    Show { id: String },
    /// Images an event can use
    Images,
    Create(NewEventArgs),
    /// Change the given fields of an event, keeping the rest
    Edit {
        id: String,

        #[command(flatten)]
        fields: EventFieldArgs,
    },
    Delete { id: String },
}

#[derive(Args, Debug)]
pub struct NewEventArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// `YYYY-MM-DD`
    #[arg(long)]
    pub date: String,

    #[arg(long, default_value = "")]
    pub time: String,

    #[arg(long, default_value = "")]
    pub location: String,

    #[arg(long, default_value = "")]
    pub image: String,
}

#[derive(Args, Debug, Default)]
pub struct EventFieldArgs {
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub date: Option<String>,

    #[arg(long)]
    pub time: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    #[arg(long)]
    pub image: Option<String>,
}

impl Cli {
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.api_url.clone(),
            timeout_secs: self.timeout_secs,
            ..HttpConfig::default()
        }
    }

    pub fn cache_config(&self) -> QueryCacheConfig {
        QueryCacheConfig {
            stale_time_ms: self.stale_time_ms,
            gc_time_ms: self.gc_time_ms,
        }
    }
}

impl Commands {
    /// Title and fallback message shown when the command fails.
    pub fn failure_text(&self) -> (&'static str, &'static str) {
        match self {
            Self::List { .. } | Self::Search { .. } => {
                ("An error occurred", "Failed to fetch events.")
            }
            Self::Show { .. } => (
                "Failed to load event",
                "Failed to fetch event data, please try again later.",
            ),
            Self::Images => (
                "Failed to load images",
                "Failed to fetch images, please try again later.",
            ),
            Self::Create(_) => (
                "Failed to create event",
                "Failed to create event. Please check your inputs and try \
                 again later.",
            ),
            Self::Edit { .. } => (
                "Failed to update event",
                "Failed to update event. Please check your inputs and try \
                 again later.",
            ),
            Self::Delete { .. } => (
                "Failed to delete event",
                "Failed to delete event, please try again later.",
            ),
        }
    }
}

impl From<NewEventArgs> for EventInput {
    fn from(args: NewEventArgs) -> Self {
        EventInput::builder()
            .title(args.title)
            .description(args.description)
            .date(args.date)
            .time(args.time)
            .location(args.location)
            .image(args.image)
            .build()
    }
}

impl EventFieldArgs {
    /// The stored event with every given field replaced.
    pub fn apply(self, event: &Event) -> EventInput {
        let current = event.to_input();
        EventInput {
            title: self.title.unwrap_or(current.title),
            description: self.description.unwrap_or(current.description),
            date: self.date.unwrap_or(current.date),
            time: self.time.unwrap_or(current.time),
            location: self.location.unwrap_or(current.location),
            image: self.image.unwrap_or(current.image),
        }
    }
}
