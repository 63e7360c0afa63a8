//! HTTP API over one `TaskQueue`: add/get/list/delete, mirroring spec.md
//! §4.1's public operations one-for-one as REST endpoints.

use asynx::{build_queue, AsynxConfig};
use asynx_task::AddTaskArgs;
use asynx_taskqueue::{Error as QueueError, TaskQueue};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use dotenvy::dotenv;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "configs/asynx.toml")]
    config: String,

    /// Override the configured bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = AsynxConfig::load(&args.config).await?;
    info!(app = %config.app, queue = %config.queue, "starting asynx-server");

    let queue = Arc::new(build_queue(&config).await?);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/tasks", post(add_task).get(list_tasks))
        .route("/tasks/:id", get(get_task).delete(delete_task))
        .route("/tasks/by-uuid/:uuid", get(get_task_by_uuid).delete(delete_task_by_uuid))
        .route("/tasks/by-cname/:cname", get(get_task_by_cname).delete(delete_task_by_cname))
        .with_state(queue);

    let bind_addr = args.bind.unwrap_or(config.bind_addr);
    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "asynx-server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn add_task(
    State(queue): State<Arc<TaskQueue>>,
    Json(args): Json<AddTaskArgs>,
) -> Response {
    match queue.add_task(args).await {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(e) => queue_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    offset: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

async fn list_tasks(
    State(queue): State<Arc<TaskQueue>>,
    Query(params): Query<ListParams>,
) -> Response {
    match queue.list_tasks(params.offset, params.limit).await {
        Ok(views) => Json(views).into_response(),
        Err(e) => queue_error_response(e),
    }
}

async fn get_task(State(queue): State<Arc<TaskQueue>>, Path(id): Path<u64>) -> Response {
    match queue.get_task(id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => queue_error_response(e),
    }
}

async fn get_task_by_uuid(
    State(queue): State<Arc<TaskQueue>>,
    Path(uuid): Path<String>,
) -> Response {
    match queue.get_task_by_uuid(&uuid).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => queue_error_response(e),
    }
}

async fn get_task_by_cname(
    State(queue): State<Arc<TaskQueue>>,
    Path(cname): Path<String>,
) -> Response {
    match queue.get_task_by_cname(&cname).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => queue_error_response(e),
    }
}

async fn delete_task(State(queue): State<Arc<TaskQueue>>, Path(id): Path<u64>) -> Response {
    match queue.delete_task(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => queue_error_response(e),
    }
}

async fn delete_task_by_uuid(
    State(queue): State<Arc<TaskQueue>>,
    Path(uuid): Path<String>,
) -> Response {
    match queue.delete_task_by_uuid(&uuid).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => queue_error_response(e),
    }
}

async fn delete_task_by_cname(
    State(queue): State<Arc<TaskQueue>>,
    Path(cname): Path<String>,
) -> Response {
    match queue.delete_task_by_cname(&cname).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => queue_error_response(e),
    }
}

fn queue_error_response(err: QueueError) -> Response {
    let status = match err {
        QueueError::NotFound => StatusCode::NOT_FOUND,
        QueueError::AlreadyExists => StatusCode::CONFLICT,
        QueueError::StatusNotMatched => StatusCode::CONFLICT,
        QueueError::CNameRequired => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
