//! The dispatch entrypoint and the callback chain it fires afterward.

use crate::error::{Error, Result};
use crate::TaskQueue;
use asynx_http_fetcher::{CapturedResponse, FetchRequest};
use asynx_task::{AddTaskArgs, CallbackSpec, HttpRequestSpec, Task, TaskStatus};
use tracing::{debug, info, info_span, warn};

const CHAINED_HEADER: &str = "X-Asynx-Chained";
const CHAINED_UUID_HEADER: &str = "X-Asynx-Chained-TaskUUID";
const CHAINED_ETA_HEADER: &str = "X-Asynx-Chained-TaskETA";
const CHAINED_CNAME_HEADER: &str = "X-Asynx-Chained-TaskCName";

impl TaskQueue {
    /// Entry point invoked by the worker once a submission's delay has
    /// elapsed: `(appname, queuename, task_id)` is implicit in `self` and
    /// `task_id`. Loads the task, acquires the running slot, performs the
    /// HTTP call, fires callbacks, then reschedules (recurring) or
    /// deletes. A task gone by the time this runs (deleted, or the
    /// running CAS lost to another worker) is not an error — both return
    /// `Ok(())` silently, per spec §4.3.
    pub async fn dispatch(&self, task_id: u64) -> Result<()> {
        let mut task = match self.load_task(task_id).await {
            Ok(task) => task,
            Err(Error::NotFound) => {
                debug!(task_id, "dispatch: task already gone, skipping");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let allowed_prev = [
            TaskStatus::Enqueued,
            TaskStatus::Scheduled,
            TaskStatus::Delayed,
        ];
        let now = match self
            .update_status(task.id, TaskStatus::Running, &allowed_prev)
            .await
        {
            Ok(now) => now,
            Err(Error::StatusNotMatched) => {
                debug!(task_id, "dispatch: lost the running CAS, another worker has it");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        task.status = TaskStatus::Running;
        task.last_run_at = Some(now);

        let span = info_span!("dispatch", task_id = task.id, uuid = %task.uuid, cname = ?task.cname);
        let _enter = span.enter();
        info!("dispatching task");

        let request = self.build_fetch_request(&task);
        let response = match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(task_id = task.id, error = %e, "dispatch failed");
                return Err(Error::DispatchError(e));
            }
        };

        let success = (200..303).contains(&response.status_code);
        let result_callback = if success {
            task.on_success.clone()
        } else {
            task.on_failure.clone()
        };
        if let Err(e) = self.dispatch_callback(&task, &result_callback, &response).await {
            warn!(task_id = task.id, error = %e, "callback failed");
        }
        let on_complete = task.on_complete.clone();
        if let Err(e) = self.dispatch_callback(&task, &on_complete, &response).await {
            warn!(task_id = task.id, error = %e, "on_complete callback failed");
        }

        if task.is_recurring() {
            self.dispatch_task(&mut task).await?;
        } else {
            self.delete_after_dispatch(&task).await?;
        }

        Ok(())
    }

    fn build_fetch_request(&self, task: &Task) -> FetchRequest {
        let mut headers = task.request.headers.clone();
        headers.insert("X-Asynx-QueueName".to_string(), self.queuename.clone());
        headers.insert("X-Asynx-TaskUUID".to_string(), task.uuid.clone());
        headers.insert(
            "X-Asynx-TaskETA".to_string(),
            task.eta.map(|e| e.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
        );
        if let Some(cname) = &task.cname {
            headers.insert("X-Asynx-TaskCName".to_string(), cname.clone());
        }
        headers
            .entry("User-Agent".to_string())
            .or_insert_with(|| format!("asynx/{}", env!("CARGO_PKG_VERSION")));

        FetchRequest {
            method: task.request.method.clone(),
            url: task.request.url.clone(),
            headers,
            data: if task.request.sends_payload() {
                task.request.payload.clone()
            } else {
                None
            },
            timeout_seconds: task.request.timeout,
            allow_redirects: task.request.resolved_allow_redirects(),
        }
    }

    async fn dispatch_callback(
        &self,
        task: &Task,
        descriptor: &CallbackSpec,
        response: &CapturedResponse,
    ) -> Result<()> {
        match descriptor {
            CallbackSpec::None => Ok(()),
            CallbackSpec::Report => {
                self.report_sink.report(task, response).await;
                Ok(())
            }
            // The post-dispatch step already deletes non-recurring tasks;
            // within the callback itself this is just a hint.
            CallbackSpec::Delete => Ok(()),
            CallbackSpec::HttpUrl(url) => {
                if CallbackSpec::is_http_url(url) {
                    let args = AddTaskArgs::new(HttpRequestSpec::post(url.clone(), String::new()));
                    self.dispatch_subtask(task, args, response).await
                } else {
                    Ok(())
                }
            }
            CallbackSpec::Subtask(args) => {
                self.dispatch_subtask(task, (**args).clone(), response).await
            }
        }
    }

    async fn dispatch_subtask(
        &self,
        parent: &Task,
        mut args: AddTaskArgs,
        response: &CapturedResponse,
    ) -> Result<()> {
        args.request
            .headers
            .insert(CHAINED_HEADER.to_string(), parent.request.url.clone());
        args.request
            .headers
            .insert(CHAINED_UUID_HEADER.to_string(), parent.uuid.clone());
        args.request.headers.insert(
            CHAINED_ETA_HEADER.to_string(),
            parent
                .eta
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
        );
        if let Some(cname) = &parent.cname {
            args.request
                .headers
                .insert(CHAINED_CNAME_HEADER.to_string(), cname.clone());
        }

        let encoded = asynx_codec::encode(self.codec.as_ref(), response)?;
        args.request.payload = Some(String::from_utf8_lossy(&encoded).into_owned());

        self.add_task(args).await?;
        Ok(())
    }

    /// Post-dispatch cleanup for a non-recurring task: the same low-level
    /// transaction `delete_task` uses. Watching a meta key that a racing
    /// delete already removed is not a conflict, so this is a safe no-op
    /// in that case.
    async fn delete_after_dispatch(&self, task: &Task) -> Result<()> {
        self.delete_task_unchecked(task).await
    }
}
