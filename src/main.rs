use std::net::SocketAddr;
use timed_quiz::{build_state, config::Config, routes::build_router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    if config.shuffle_api_url.is_none() {
        tracing::info!("SHUFFLE_API_URL not set, questions are shuffled locally");
    }

    let state = build_state(config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("backend listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
