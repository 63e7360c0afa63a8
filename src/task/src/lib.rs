//! # Asynx Task
//!
//! The in-memory value object for one task: request description,
//! scheduling info, status, callbacks, and identity (id, uuid, optional
//! cname). `Task` itself never talks to the store; `asynx-taskqueue` reads
//! and writes these fields.

mod callback;
mod request;
mod status;

pub use callback::CallbackSpec;
pub use request::HttpRequestSpec;
pub use status::TaskStatus;

use asynx_schedule::ScheduleSpec;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("recurring task requires a cname")]
    CNameRequired,
}

/// Either an already-UTC instant or a naive timestamp awaiting
/// localization by the owning `TaskQueue`'s configured zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EtaSpec {
    Naive(NaiveDateTime),
    Utc(DateTime<Utc>),
}

/// Arguments to `TaskQueue::add_task`, and the shape of a sub-task
/// callback descriptor (`CallbackSpec::Subtask`) — spec.md calls these out
/// as "identical in shape".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTaskArgs {
    pub request: HttpRequestSpec,
    #[serde(default)]
    pub cname: Option<String>,
    #[serde(default)]
    pub countdown: Option<f64>,
    #[serde(default)]
    pub eta: Option<EtaSpec>,
    #[serde(default)]
    pub schedule: Option<ScheduleSpec>,
    #[serde(default)]
    pub on_success: CallbackSpec,
    #[serde(default = "CallbackSpec::default_on_failure")]
    pub on_failure: CallbackSpec,
    #[serde(default)]
    pub on_complete: CallbackSpec,
}

impl AddTaskArgs {
    pub fn new(request: HttpRequestSpec) -> Self {
        Self {
            request,
            cname: None,
            countdown: None,
            eta: None,
            schedule: None,
            on_success: CallbackSpec::None,
            on_failure: CallbackSpec::default_on_failure(),
            on_complete: CallbackSpec::None,
        }
    }
}

/// The full in-memory task. `countdown` is deliberately not a field: it is
/// computed from `eta` at read time by [`Task::countdown`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub uuid: String,
    pub cname: Option<String>,
    pub request: HttpRequestSpec,
    pub eta: Option<DateTime<Utc>>,
    pub schedule: Option<ScheduleSpec>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub on_success: CallbackSpec,
    pub on_failure: CallbackSpec,
    pub on_complete: CallbackSpec,
}

impl Task {
    /// `eta - now` in seconds, `None` when there is no `eta`. Kept as a
    /// sub-second float rather than truncated to whole seconds — never
    /// persisted, always recomputed.
    pub fn countdown(&self, now: DateTime<Utc>) -> Option<f64> {
        self.eta
            .map(|eta| (eta - now).num_milliseconds() as f64 / 1000.0)
    }

    pub fn is_recurring(&self) -> bool {
        self.schedule.is_some()
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        Self::validate_schedule_cname(&self.schedule, &self.cname)
    }

    /// Shared precondition: a recurring task needs a cname to be
    /// addressable for its next fire. Also used by `TaskQueue::add_task`
    /// before a `Task` exists yet, so it takes the raw fields rather than
    /// `&self`.
    pub fn validate_schedule_cname(
        schedule: &Option<ScheduleSpec>,
        cname: &Option<String>,
    ) -> Result<(), TaskError> {
        if schedule.is_some() && cname.is_none() {
            return Err(TaskError::CNameRequired);
        }
        Ok(())
    }
}

/// Snapshot returned to clients by every `TaskQueue` read/write operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    pub id: u64,
    pub uuid: String,
    pub cname: Option<String>,
    pub request: HttpRequestSpec,
    pub eta: Option<DateTime<Utc>>,
    pub countdown: Option<f64>,
    pub schedule: Option<ScheduleSpec>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub on_success: CallbackSpec,
    pub on_failure: CallbackSpec,
    pub on_complete: CallbackSpec,
}

impl TaskView {
    pub fn from_task(task: &Task, now: DateTime<Utc>) -> Self {
        Self {
            id: task.id,
            uuid: task.uuid.clone(),
            cname: task.cname.clone(),
            request: task.request.clone(),
            eta: task.eta,
            countdown: task.countdown(now),
            schedule: task.schedule.clone(),
            last_run_at: task.last_run_at,
            status: task.status,
            on_success: task.on_success.clone(),
            on_failure: task.on_failure.clone(),
            on_complete: task.on_complete.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_task() -> Task {
        Task {
            id: 1,
            uuid: "u1".to_string(),
            cname: Some("task001".to_string()),
            request: HttpRequestSpec::get("http://x"),
            eta: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 10).unwrap()),
            schedule: None,
            last_run_at: None,
            status: TaskStatus::Delayed,
            on_success: CallbackSpec::None,
            on_failure: CallbackSpec::Report,
            on_complete: CallbackSpec::None,
        }
    }

    #[test]
    fn countdown_is_derived_not_stored() {
        let task = sample_task();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(task.countdown(now), Some(10.0));
    }

    #[test]
    fn recurring_without_cname_fails_validation() {
        let mut task = sample_task();
        task.cname = None;
        task.schedule = Some(ScheduleSpec::Interval(30.0));
        assert!(matches!(task.validate(), Err(TaskError::CNameRequired)));
    }

    #[test]
    fn view_snapshots_countdown() {
        let task = sample_task();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 3).unwrap();
        let view = TaskView::from_task(&task, now);
        assert_eq!(view.countdown, Some(7.0));
    }
}
