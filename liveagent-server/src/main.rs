use std::sync::Arc;

use clap::Parser;
use liveagent_core::{
    LiveAgentConfig, LiveKitDispatchClient, MemorySessionStore, PgSessionStore, SessionStore,
};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use liveagent_server::runtime::AgentRuntime;
use liveagent_server::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "liveagent.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match LiveAgentConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over service.log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let store: Arc<dyn SessionStore> = if config.database.enabled {
        let pool = match liveagent_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };

        if args.health {
            match liveagent_core::db::health_check(&pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            }

            match liveagent_core::db::check_sessions_table(&pool).await {
                Ok(n) => println!("✅ agent_instance_sessions rows: {}", n),
                Err(e) => {
                    println!("❌ agent_instance_sessions check failed: {}", e);
                    std::process::exit(1);
                }
            }

            println!("✅ LiveAgent DB health check passed");
            return Ok(());
        }

        Arc::new(PgSessionStore::new(pool))
    } else {
        if args.health {
            println!("✅ Database disabled; nothing to check");
            return Ok(());
        }
        tracing::warn!("Database disabled: sessions are kept in memory only");
        Arc::new(MemorySessionStore::new())
    };

    let dispatcher = Arc::new(LiveKitDispatchClient::new(config.livekit.clone())?);
    let runtime = Arc::new(AgentRuntime::new(
        store,
        dispatcher,
        config.runtime.default_max_sessions,
    ));
    tracing::info!(
        "Runtime ready (store: {}, default max sessions: {})",
        runtime.sessions().store().name(),
        config.runtime.default_max_sessions
    );

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    if config.http.enabled {
        let http_runtime = runtime.clone();
        let http_config = config.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                liveagent_server::http::start_http_server(http_runtime, http_config, http_shutdown)
                    .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, runtime, tx.subscribe()).await?;

    Ok(())
}
