mod api;
mod assembler;
mod cache;
mod config;
mod error;
mod estimator;
mod halving;
mod hashrate;
mod upstream;

use actix_web::{App, HttpServer, middleware::DefaultHeaders, web};
use dotenvy::dotenv;
use log::info;
use std::io;

use api::AppState;
use assembler::SnapshotService;
use cache::{FileStore, MemoryStore, SnapshotCache};
use config::Config;
use estimator::BlockTimeEstimator;
use upstream::ExplorerClient;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let cfg = Config::from_env();

    let cache = match &cfg.cache_path {
        Some(path) => {
            info!("snapshot cache at {}", path.display());
            SnapshotCache::new(FileStore::new(path), cfg.cache_ttl)
        }
        None => {
            info!("snapshot cache kept in memory");
            SnapshotCache::new(MemoryStore::new(), cfg.cache_ttl)
        }
    };
    let explorer = ExplorerClient::new(cfg.explorer_url.as_str(), cfg.fetch_timeout)
        .map_err(io::Error::other)?;

    let service = SnapshotService::new(
        cache,
        explorer,
        cfg.schedule(),
        BlockTimeEstimator::new(cfg.estimator),
        cfg.hashrate_base,
        cfg.fetch_timeout,
    );
    let state = web::Data::new(AppState::new(service));

    info!(
        "⛓️ Serving halving snapshot from {} at http://{}:{}",
        cfg.explorer_url, cfg.host, cfg.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(DefaultHeaders::new().add(("Access-Control-Allow-Origin", "*")))
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((cfg.host.as_str(), cfg.port))?
    .run()
    .await
}
