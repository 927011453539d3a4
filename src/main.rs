use std::sync::Arc;

use family_intake::config::ServerConfig;
use family_intake::intake::{IntakeManager, RendererSet, intake_routes, spawn_expiry_task};
use family_intake::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;

    let steps: Vec<&str> = config.steps.iter().map(|s| s.as_str()).collect();
    eprintln!("📋 Family Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Steps: {}", steps.join(" → "));
    eprintln!("   API: http://0.0.0.0:{}/api/intake/sessions", config.port);
    eprintln!("   WS: ws://0.0.0.0:{}/ws/intake/{{id}}", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    eprintln!("   Database: {}\n", config.db_path.display());

    // ── Intake ───────────────────────────────────────────────────────────
    let manager = Arc::new(IntakeManager::new(
        config.steps.clone(),
        RendererSet::standard(),
        Some(db),
    ));
    // Release idle sessions from memory every 60s
    let _expiry_handle = spawn_expiry_task(Arc::clone(&manager));

    let app = intake_routes(manager);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Intake server started");
    axum::serve(listener, app).await?;

    Ok(())
}
