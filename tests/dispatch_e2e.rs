//! End-to-end dispatch and callback-chain tests, run against the in-memory
//! collaborators so no live Redis or network access is required.

use async_trait::async_trait;
use asynx_delayed_executor::InMemoryDelayedExecutor;
use asynx_http_fetcher::{CapturedResponse, FetchError, FetchRequest, HTTPFetcher};
use asynx_keystore::InMemoryKeyStore;
use asynx_task::{AddTaskArgs, CallbackSpec, HttpRequestSpec};
use asynx_taskqueue::TaskQueue;
use asynx_timesource::FixedTimeSource;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Records every outbound request and answers with a fixed response.
struct RecordingFetcher {
    requests: Mutex<Vec<FetchRequest>>,
    status_code: u16,
}

impl RecordingFetcher {
    fn new(status_code: u16) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            status_code,
        })
    }

    fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HTTPFetcher for RecordingFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<CapturedResponse, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(CapturedResponse {
            url: request.url,
            status_code: self.status_code,
            headers: request.headers,
            content: request.data.unwrap_or_default(),
            history: Vec::new(),
            reason: "OK".to_string(),
        })
    }
}

fn queue_with_fetcher(fetcher: Arc<RecordingFetcher>) -> TaskQueue {
    let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    TaskQueue::new(
        "app",
        "q",
        chrono_tz::UTC,
        Arc::new(InMemoryKeyStore::new()),
        InMemoryDelayedExecutor::new(),
    )
    .with_time_source(Arc::new(FixedTimeSource::new(now)))
    .with_fetcher(fetcher)
}

/// Scenario 5: dispatch end-to-end. Outbound headers and body match the
/// task's request description, and the non-recurring task is fully gone
/// afterward.
#[tokio::test]
async fn dispatch_end_to_end_injects_headers_and_cleans_up() {
    let fetcher = RecordingFetcher::new(200);
    let queue = queue_with_fetcher(fetcher.clone());

    let mut request = HttpRequestSpec::post("http://httpbin/post", r#"{"a":"b"}"#);
    request.timeout = Some(30.0);
    let mut args = AddTaskArgs::new(request);
    args.cname = Some("thistask".to_string());
    args.countdown = Some(42.0);

    let view = queue.add_task(args).await.unwrap();
    queue.dispatch(view.id).await.unwrap();

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert!(req.headers.contains_key("X-Asynx-TaskUUID"));
    assert_eq!(req.headers.get("X-Asynx-TaskCName").unwrap(), "thistask");
    assert!(req.headers.contains_key("X-Asynx-TaskETA"));
    assert!(req.headers.get("User-Agent").unwrap().starts_with("asynx/"));
    assert_eq!(req.data.as_deref(), Some(r#"{"a":"b"}"#));

    let err = queue.get_task(view.id).await.unwrap_err();
    assert!(matches!(err, asynx_taskqueue::Error::NotFound));
    let err = queue.get_task_by_cname("thistask").await.unwrap_err();
    assert!(matches!(err, asynx_taskqueue::Error::NotFound));
}

/// Scenario 6: a successful dispatch with `on_success` set to an http(s)
/// URL chains into a sub-task carrying the `X-Asynx-Chained*` headers and
/// the encoded parent response as its payload.
#[tokio::test]
async fn callback_chain_creates_subtask_with_chained_headers() {
    let fetcher = RecordingFetcher::new(200);
    let queue = queue_with_fetcher(fetcher.clone());

    let mut request = HttpRequestSpec::get("http://httpbin/get");
    request
        .headers
        .insert("X-Original".to_string(), "yes".to_string());
    let mut args = AddTaskArgs::new(request);
    args.cname = Some("thistask".to_string());
    args.on_success = CallbackSpec::HttpUrl("http://httpbin/post".to_string());

    let parent = queue.add_task(args).await.unwrap();
    queue.dispatch(parent.id).await.unwrap();

    // `on_success` created sub-task id=2 as part of the parent's dispatch;
    // the chained headers/payload live on its stored request, ready for
    // its own future dispatch.
    let subtask = queue.get_task(2).await.unwrap();
    assert_eq!(
        subtask.request.headers.get("X-Asynx-Chained").unwrap(),
        "http://httpbin/get"
    );
    assert_eq!(
        subtask.request.headers.get("X-Asynx-Chained-TaskCName").unwrap(),
        "thistask"
    );
    assert!(subtask.request.headers.contains_key("X-Asynx-Chained-TaskETA"));

    let payload = subtask
        .request
        .payload
        .as_ref()
        .expect("sub-task carries the encoded parent response");
    let decoded: HashMap<String, serde_json::Value> = serde_json::from_str(payload).unwrap();
    assert_eq!(decoded.get("url").unwrap(), "http://httpbin/get");
    let echoed_headers = decoded.get("headers").unwrap().as_object().unwrap();
    assert_eq!(echoed_headers.get("X-Original").unwrap(), "yes");

    // Dispatching the sub-task itself fires the real outbound request, and
    // it still carries the chained headers alongside the subtask's own.
    queue.dispatch(2).await.unwrap();
    let requests = fetcher.requests();
    assert_eq!(requests.len(), 2, "parent dispatch + chained sub-task dispatch");
    let subtask_req = &requests[1];
    assert_eq!(
        subtask_req.headers.get("X-Asynx-Chained").unwrap(),
        "http://httpbin/get"
    );
    assert!(subtask_req.headers.contains_key("X-Asynx-TaskUUID"));
}
