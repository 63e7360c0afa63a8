//! Drains the `DelayedExecutor` and dispatches each due task. A dispatch
//! error is logged and the loop continues — a single bad task must not
//! stall the whole queue.

use asynx::{build_queue, AsynxConfig};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "configs/asynx.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = AsynxConfig::load(&args.config).await?;
    info!(app = %config.app, queue = %config.queue, "starting asynx-worker");

    let queue = build_queue(&config).await?;
    let executor = asynx_delayed_executor::RedisDelayedExecutor::connect(
        &config.redis_url,
        std::time::Duration::from_millis(config.poll_interval_ms),
    )
    .await?;

    run(&queue, &executor).await
}

async fn run(
    queue: &asynx_taskqueue::TaskQueue,
    executor: &asynx_delayed_executor::RedisDelayedExecutor,
) -> anyhow::Result<()> {
    use asynx_delayed_executor::DelayedExecutor;

    loop {
        let Some((appname, queuename, task_id)) = executor.next_due().await else {
            info!("executor channel closed, shutting down");
            return Ok(());
        };
        if appname != queue.appname() || queuename != queue.queuename() {
            continue;
        }
        if let Err(e) = queue.dispatch(task_id).await {
            error!(task_id, error = %e, "dispatch failed");
        }
    }
}
