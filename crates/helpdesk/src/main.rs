//! Helpdesk runner entry point.

use common::SystemClock;
use helpdesk::{Config, LogFormat};
use persistence::UnitOfWorkFactory;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration
    let config = Config::from_env().expect("invalid configuration");

    // 2. Initialize tracing
    init_tracing(&config);
    tracing::info!(backend = ?config.store_backend, "starting helpdesk");

    // 3. Open the store
    let store = helpdesk::connect_store(&config)
        .await
        .expect("failed to open store");

    // 4. Wire repositories and event handlers
    let factory = UnitOfWorkFactory::new(store, helpdesk::registry(), helpdesk::dispatcher());

    // 5. Seed and read back
    match helpdesk::seed_demo(&factory, &SystemClock, config.default_page_size).await {
        Ok(summary) => tracing::info!(
            categories = summary.categories,
            active_categories = summary.active_categories,
            open_tickets = summary.open_tickets,
            events_dispatched = summary.events_dispatched,
            "seed run complete"
        ),
        Err(e) => {
            tracing::error!(error = %e, "seed run failed");
            std::process::exit(1);
        }
    }
}
