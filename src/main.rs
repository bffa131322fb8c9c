use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::Parser;
use news_digest::{cache::RefreshCache, index, AppState, Args};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let invalid = |e: news_digest::error::ConfigError| {
        tracing::error!(error = %e, "invalid configuration");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    };
    let settings = args.settings().map_err(invalid)?;
    let fetcher = args.fetcher().map_err(invalid)?;
    let cache = Arc::new(RefreshCache::new(settings.ttl, fetcher, args.renderer()));

    if args.prefetch {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache.get_current().await;
        });
    }

    let address = settings.address.clone();
    let app_state = web::Data::new(AppState { settings, cache });

    info!(%address, ttl_s = args.cache_lifetime, "server running");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .service(index)
    })
    .bind(&address)?
    .run()
    .await
}
