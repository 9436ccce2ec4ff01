use planscrape::ScrapeConfig;
use planscrape_web::{AppState, router};
use tower_http::cors::CorsLayer;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .write_style(env_logger::WriteStyle::Never)
        .init();

    let state = AppState::new(ScrapeConfig::service());
    let app = router(state).layer(CorsLayer::permissive());

    let address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.into());
    let tcp_listener = tokio::net::TcpListener::bind(&address).await?;

    log::info!("Starting planscrape web service on address: {}", address);

    axum::serve(tcp_listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {e:?}");
            }
            log::info!("Shutting down");
        })
        .await?;

    Ok(())
}
