mod app;
mod cli;
mod render;

use std::sync::Arc;

use clap::Parser;
use common_errors::ErrorBlock;
use events_http::HttpEventsApi;
use query_cache::QueryCache;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{app::App, cli::Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let http_config = cli.http_config();
    let api = HttpEventsApi::new(&http_config)?;
    info!("Using events API at {}", api.base_url());

    let cache = QueryCache::new(cli.cache_config());
    let gc = cache.spawn_gc(cache.config().gc_time());
    let app = App::new(cache, Arc::new(api));

    let cancel = app.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling requests");
            cancel.cancel();
        }
    });

    let (title, fallback) = cli.command.failure_text();
    let outcome = app.run(cli.command).await;
    gc.abort();

    match outcome {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", ErrorBlock::new(title, &err, fallback));
            std::process::exit(1);
        }
    }
}
