//! Implementation hook invoked by the `"__report__"` callback descriptor.

use async_trait::async_trait;
use asynx_http_fetcher::CapturedResponse;
use asynx_task::Task;

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, task: &Task, response: &CapturedResponse);
}

/// Default sink: discards the report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReportSink;

#[async_trait]
impl ReportSink for NoopReportSink {
    async fn report(&self, _task: &Task, _response: &CapturedResponse) {}
}

/// Logs the dispatch result at `info` instead of discarding it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReportSink;

#[async_trait]
impl ReportSink for LoggingReportSink {
    async fn report(&self, task: &Task, response: &CapturedResponse) {
        tracing::info!(
            task_id = task.id,
            cname = ?task.cname,
            status_code = response.status_code,
            "task report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asynx_task::{CallbackSpec, HttpRequestSpec, TaskStatus};
    use std::collections::HashMap;

    fn sample_response() -> CapturedResponse {
        CapturedResponse {
            url: "http://x".to_string(),
            status_code: 200,
            headers: HashMap::new(),
            content: String::new(),
            history: Vec::new(),
            reason: "OK".to_string(),
        }
    }

    fn sample_task() -> Task {
        Task {
            id: 1,
            uuid: "u1".to_string(),
            cname: None,
            request: HttpRequestSpec::get("http://x"),
            eta: None,
            schedule: None,
            last_run_at: None,
            status: TaskStatus::Enqueued,
            on_success: CallbackSpec::None,
            on_failure: CallbackSpec::Report,
            on_complete: CallbackSpec::None,
        }
    }

    #[tokio::test]
    async fn noop_sink_does_not_panic() {
        let sink = NoopReportSink;
        sink.report(&sample_task(), &sample_response()).await;
    }
}
