use axum::serve;
use configraph::config::AppConfig;
use configraph::routes::create_router;
use configraph::store::{LoggingReconciler, MemoryStore};
use configraph::{seed, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new().filter_level(LevelFilter::Info).init();

    println!("configraph: configuration graph store");

    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}",
        config.server.host, config.server.port
    );

    let store = Arc::new(MemoryStore::new());
    let project = seed::seed_demo_project(store.as_ref()).await?;
    println!("Seeded demo project '{}' ({})", project.name, project.uuid);

    let state = Arc::new(AppState {
        store,
        reconciler: Arc::new(LoggingReconciler::new()),
        config: config.clone(),
    });

    let app = create_router().with_state(state);

    let bind_address = config.server_address();
    println!("Listening on {}", bind_address);
    let listener = TcpListener::bind(&bind_address).await?;
    serve(listener, app).await?;

    Ok(())
}
