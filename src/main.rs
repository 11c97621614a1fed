use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use erp_categories::config::{Config, DatabaseKind};
use erp_categories::store::{CategoryStore, DbStore, MemoryStore};
use erp_categories::{db, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "-help" || arg == "--help") {
        println!("Usage: erp-categories [OPTIONS]");
        println!("Options:");
        println!("  -config <path>  Path to configuration file (default: ./etc/categories.toml)");
        println!("  -help, --help   Print this help message");
        return Ok(());
    }

    let config_path = args
        .iter()
        .skip_while(|arg| arg.as_str() != "-config")
        .nth(1)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "./etc/categories.toml".to_string());

    // Load configuration first (before logging init)
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Could not load config file: {}, using defaults", e);
        Config::default()
    });

    // Priority: RUST_LOG env var > config file > default "info"
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting category service...");
    info!("Loading configuration from: {}", config_path);

    let store: Arc<dyn CategoryStore> = match config.database.db_type {
        DatabaseKind::Postgres => {
            let conn = db::init_database(&config.database).await.map_err(|e| {
                tracing::error!("Database initialization failed: {}", e);
                anyhow::anyhow!("Database initialization failed: {}", e)
            })?;
            Arc::new(DbStore::new(conn))
        }
        DatabaseKind::Memory => {
            tracing::warn!("Using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", config.addr, e))?;

    let state = AppState::new(store, config.pagination);
    let app = routes::create_router(state);

    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
