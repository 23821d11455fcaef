use axum::{Router, routing::get};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::api::routes;
use crate::recorder::Recorder;

#[derive(Clone)]
pub struct ApiState {
    pub recorder: Arc<Recorder>,
}

impl ApiState {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self { recorder }
    }
}

/// Control routes plus `/vod` serving the storage root.
pub fn router(state: ApiState) -> Router {
    let vod_root = state.recorder.settings().root().to_path_buf();

    Router::new()
        .route("/api/record/list", get(routes::record::list))
        .route("/api/record/active", get(routes::record::active))
        .route("/api/record/start", get(routes::record::start))
        .route("/api/record/stop", get(routes::record::stop))
        .route("/api/record/play", get(routes::record::play))
        .route("/api/record/delete", get(routes::record::delete))
        .route("/api/record/auto", get(routes::record::auto_record))
        .nest_service("/vod", ServeDir::new(vod_root))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct ApiService {
    bind_addr: SocketAddr,
}

impl ApiService {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr }
    }

    pub fn start(self, state: ApiState) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("[api] failed to create runtime: {}", err);
                    return;
                }
            };

            if let Err(err) = rt.block_on(run_api_server(self.bind_addr, state)) {
                error!("[api] server error: {}", err);
            }
        })
    }
}

async fn run_api_server(bind_addr: SocketAddr, state: ApiState) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("[api] server listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
