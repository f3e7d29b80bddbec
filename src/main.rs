//! DeviceHub Storefront - catalog, discounts, cart and WhatsApp checkout

use anyhow::Result;
use devicehub_storefront::config::Config;
use devicehub_storefront::http::{router, AppState};
use devicehub_storefront::publisher::{EventPublisher, NatsPublisher, NoopPublisher};
use devicehub_storefront::store::{MemoryStore, PgStore};
use devicehub_storefront::{Clock, SystemClock};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let publisher: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unreachable, order events will not be published");
                Arc::new(NoopPublisher)
            }
        },
        None => Arc::new(NoopPublisher),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let state = match &config.database_url {
        Some(url) => {
            let store = PgStore::new(PgPoolOptions::new().max_connections(10).connect(url).await?);
            store.migrate().await?;
            AppState::from_store(store, publisher, clock, &config)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            AppState::from_store(MemoryStore::new(), publisher, clock, &config)
        }
    };
    if config.whatsapp_number.is_empty() {
        tracing::warn!("WHATSAPP_NUMBER not set, checkout links will not reach the shop");
    }

    let app = router(state);
    tracing::info!("DeviceHub storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
