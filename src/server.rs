use crate::config::EngineConfig;
use crate::data::{SchedulingInput, SchedulingOutput};
use crate::driver;
use crate::error::EngineError;
use crate::store::InMemoryStore;
use axum::{routing::post, Json, Router};
use std::sync::Arc;

async fn solve_handler(
    axum::extract::State(store): axum::extract::State<Arc<InMemoryStore>>,
    Json(input): Json<SchedulingInput>,
) -> Result<Json<SchedulingOutput>, (axum::http::StatusCode, String)> {
    let config = EngineConfig::default();
    match driver::run(&input, &config, store.as_ref()) {
        Ok(output) => Ok(Json(output)),
        Err(e) => Err((status_for(&e), e.to_string())),
    }
}

fn status_for(err: &EngineError) -> axum::http::StatusCode {
    match err {
        EngineError::ProgrammerInput(_) => axum::http::StatusCode::BAD_REQUEST,
        EngineError::InfeasibleSchedule { .. } => axum::http::StatusCode::UNPROCESSABLE_ENTITY,
    }
}

pub async fn run_server() {
    let store = Arc::new(InMemoryStore::new());
    let app = Router::new()
        .route("/v1/schedule/solve", post(solve_handler))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();

    log::info!("Server running at http://{}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
