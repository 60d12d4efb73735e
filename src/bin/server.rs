//! Development server for the browser demo: serves `www/` (including the
//! wasm-pack output under `www/pkg`) and the audio assets.

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use axum::{routing::get, Router};
    use buffered_sound::config::ServerConfig;
    use tower_http::cors::CorsLayer;
    use tower_http::services::ServeDir;

    dotenv::dotenv().ok();
    env_logger::init();

    let config = ServerConfig::default();
    log::info!(
        "Serving {} (audio from {})",
        config.static_dir,
        config.audio_dir
    );

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest_service("/audio", ServeDir::new(&config.audio_dir))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.address()).await?;
    log::info!("Server started at http://{}", config.address());
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
