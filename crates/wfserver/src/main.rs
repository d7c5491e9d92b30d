use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wfnodes::NodeDeps;
use wfruntime::{
    load_graphs_from_dir, CheckpointStore, ExecutorRegistry, FileCheckpointStore, GraphRuntime,
    InMemoryCheckpointStore, RuntimeConfig,
};
use wfserver::{AppState, Executions};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🚀 Starting workflow server");

    let mut registry = ExecutorRegistry::new();
    wfnodes::register_all(&mut registry, NodeDeps::from_env()?);

    let config = RuntimeConfig::from_env();
    info!(?config, "Runtime configuration");
    let runtime = Arc::new(GraphRuntime::with_registry(Arc::new(registry), config));

    if let Ok(dir) = std::env::var("WORKFLOW_DIR") {
        let loaded = load_graphs_from_dir(Path::new(&dir), runtime.store().as_ref()).await?;
        info!("📂 Loaded {} workflow(s) from {}", loaded.len(), dir);
    }

    let checkpoints: Arc<dyn CheckpointStore> = match std::env::var("CHECKPOINT_DIR") {
        Ok(dir) => {
            info!("💾 Checkpoints stored in {}", dir);
            Arc::new(FileCheckpointStore::new(dir))
        }
        Err(_) => Arc::new(InMemoryCheckpointStore::new()),
    };

    info!("✅ Runtime initialized with kinds: {:?}", runtime.registry().list_kinds());

    let app_state = web::Data::new(AppState {
        executions: Executions::new(runtime, checkpoints),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(wfserver::configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
