//! Record server: loads the entity catalog, picks a store and serves the generated API.
//!
//! Run from repo root: `cargo run -p record-server`

use record_service::{app, load_catalog, AppState, MemoryStore, PgStore, Settings};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("record_service=info,record_server=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    tracing::debug!(?settings, "settings");
    let registry = load_catalog(&settings.catalog_path).await?;

    let state = match &settings.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(settings.db_max_connections)
                .connect(url)
                .await?;
            tracing::info!("using PostgreSQL store");
            AppState::new(registry, PgStore::new(pool))
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            AppState::new(registry, MemoryStore::new())
        }
    };

    let router = app(state, settings.max_body_bytes);
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
