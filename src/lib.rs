pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers::{AppState, SharedState};
pub use api::routes;

// Export logic types
pub use logic::{
    copy_name, ClosureCollector, CopyMoveOrchestrator, ExportEncoder, ExportManifest,
    FolderChainCollector, ImportDecoder, ReplicationError,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{LoggingReconciler, MemoryStore, ReconciliationSender, Store};

use std::sync::Arc;

/// Start the server on the embedded in-memory store; also used by
/// integration scenarios that need the full wiring.
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let app_config = config::AppConfig::load()?;

    let store = Arc::new(MemoryStore::new());
    seed::seed_demo_project(store.as_ref()).await?;

    let state = Arc::new(AppState {
        store,
        reconciler: Arc::new(LoggingReconciler::new()),
        config: app_config.clone(),
    });

    let app = routes::create_router().with_state(state);

    let bind_address = app_config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;

    serve(listener, app).await?;

    Ok(())
}
