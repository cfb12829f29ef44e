use exam_portal::config::{Config, LogFormat};
use exam_portal::{build_state, routes::build_router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let filter = EnvFilter::try_new(&config.rust_log).unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let addr = config.addr()?;
    let state = build_state(config)?;
    let exams = state.content.exams();
    tracing::info!("loaded {} exams into the catalog", exams.len());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("exam portal listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
