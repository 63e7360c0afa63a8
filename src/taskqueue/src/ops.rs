//! Add/get/list/iter/delete and the internal status-CAS/resubmit
//! operations. Dispatch and the callback chain live in `dispatch.rs`.

use crate::encode;
use crate::error::{Error, Result};
use crate::iter::TaskIter;
use crate::keys;
use crate::TaskQueue;
use asynx_keystore::{run_optimistic, TxnOutcome, WriteOp};
use asynx_task::{AddTaskArgs, EtaSpec, Task, TaskStatus, TaskView};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

impl TaskQueue {
    /// Atomically reserves the cname (if any), allocates an id, writes the
    /// meta hash and schedule index, then hands the task to the
    /// `DelayedExecutor`. See spec §4.1: on a cname collision — whether
    /// detected up front or lost to a concurrent committer at `EXEC` time —
    /// this fails with `AlreadyExists` rather than retrying.
    pub async fn add_task(&self, args: AddTaskArgs) -> Result<TaskView> {
        Task::validate_schedule_cname(&args.schedule, &args.cname)
            .map_err(|_| Error::CNameRequired)?;

        let now = self.time.now_utc();
        let eta = self.resolve_eta(&args, now)?;

        let watch_keys: Vec<String> = args
            .cname
            .as_ref()
            .map(|c| vec![keys::cname_key(&self.appname, &self.queuename, c)])
            .unwrap_or_default();

        let mut txn = self.store.begin_transaction(&watch_keys).await?;
        if let Some(cname_key) = watch_keys.first() {
            if txn.exists(cname_key).await? {
                return Err(Error::AlreadyExists);
            }
        }

        let id = self
            .store
            .hincrby(
                keys::inc_key(),
                &keys::inc_field(&self.appname, &self.queuename),
                1,
            )
            .await? as u64;

        let mut task = Task {
            id,
            uuid: String::new(),
            cname: args.cname.clone(),
            request: args.request,
            eta,
            schedule: args.schedule,
            last_run_at: None,
            status: TaskStatus::Enqueued,
            on_success: args.on_success,
            on_failure: args.on_failure,
            on_complete: args.on_complete,
        };

        let meta_key = keys::meta_key(&self.appname, &self.queuename, id);
        let fields = encode::encode_task_fields(&task, self.codec.as_ref())?;
        let mut write_ops = vec![WriteOp::HSet {
            key: meta_key,
            fields,
        }];
        if task.cname.is_some() {
            let cname_key = watch_keys.first().expect("cname set implies a watched cname key");
            write_ops.push(WriteOp::Set {
                key: cname_key.clone(),
                value: id.to_string().into_bytes(),
            });
        }
        if task.is_recurring() {
            write_ops.push(WriteOp::ZAdd {
                key: keys::schedule_index_key(&self.appname, &self.queuename),
                member: id.to_string(),
                score: 0.0,
            });
        }

        let committed = txn.exec(write_ops).await?;
        if !committed {
            return Err(Error::AlreadyExists);
        }

        self.dispatch_task(&mut task).await?;

        let now = self.time.now_utc();
        info!(task_id = task.id, cname = ?task.cname, "task added");
        Ok(TaskView::from_task(&task, now))
    }

    fn resolve_eta(
        &self,
        args: &AddTaskArgs,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        if let Some(countdown) = args.countdown {
            let delta = Duration::milliseconds((countdown * 1000.0).round() as i64);
            return Ok(Some(now + delta));
        }
        match &args.eta {
            Some(EtaSpec::Utc(dt)) => Ok(Some(*dt)),
            Some(EtaSpec::Naive(naive)) => {
                Ok(Some(self.time.localize(*naive, &self.localzone)?))
            }
            None => Ok(None),
        }
    }

    pub async fn get_task(&self, id: u64) -> Result<TaskView> {
        let task = self.load_task(id).await?;
        Ok(TaskView::from_task(&task, self.time.now_utc()))
    }

    pub async fn get_task_by_uuid(&self, uuid: &str) -> Result<TaskView> {
        let id = self.resolve_uuid(uuid).await?;
        self.get_task(id).await
    }

    pub async fn get_task_by_cname(&self, cname: &str) -> Result<TaskView> {
        let id = self.resolve_cname(cname).await?;
        self.get_task(id).await
    }

    /// Paginates the uuid index starting at `offset`, stopping once
    /// `limit` views have been collected or the index is exhausted.
    /// `per_pipeline` (the batch size per round trip) is
    /// `min(limit + 10, 100)`, per spec §4.1.
    pub async fn list_tasks(&self, offset: i64, limit: i64) -> Result<Vec<TaskView>> {
        let per_pipeline = (limit + 10).min(100).max(1);
        let mut iter = TaskIter::new(self, offset, per_pipeline);
        let mut out = Vec::new();
        while (out.len() as i64) < limit {
            match iter.next().await {
                Some(view) => out.push(view),
                None => break,
            }
        }
        Ok(out)
    }

    /// The open-ended counterpart to `list_tasks`: caller controls the
    /// pipeline batch size and drives iteration to the end of the set.
    pub fn iter_tasks(&self, offset: i64, per_pipeline: i64) -> TaskIter<'_> {
        TaskIter::new(self, offset, per_pipeline)
    }

    pub async fn count_tasks(&self) -> Result<i64> {
        let key = keys::uuid_index_key(&self.appname, &self.queuename);
        Ok(self.store.zcard(&key).await?)
    }

    /// Refuses with `StatusNotMatched` if the task is currently `Running`.
    pub async fn delete_task(&self, id: u64) -> Result<()> {
        let task = self.load_task(id).await?;
        if task.status == TaskStatus::Running {
            return Err(Error::StatusNotMatched);
        }
        self.delete_task_unchecked(&task).await
    }

    /// Resolves by uuid and deletes. Does **not** check `status == Running`
    /// the way `delete_task` does — a documented inconsistency carried
    /// over from the original system rather than fixed (see `DESIGN.md`
    /// Open Question 1).
    pub async fn delete_task_by_uuid(&self, uuid: &str) -> Result<()> {
        let id = self.resolve_uuid(uuid).await?;
        let task = self.load_task(id).await?;
        self.delete_task_unchecked(&task).await
    }

    /// Resolves by cname and deletes, with the same `Running`-check
    /// omission as `delete_task_by_uuid`.
    pub async fn delete_task_by_cname(&self, cname: &str) -> Result<()> {
        let id = self.resolve_cname(cname).await?;
        let task = self.load_task(id).await?;
        self.delete_task_unchecked(&task).await
    }

    pub(crate) async fn delete_task_unchecked(&self, task: &Task) -> Result<()> {
        let meta_key = keys::meta_key(&self.appname, &self.queuename, task.id);
        let uuid_key = keys::uuid_index_key(&self.appname, &self.queuename);

        let mut write_ops = vec![
            WriteOp::Del {
                keys: vec![meta_key.clone()],
            },
            WriteOp::ZRem {
                key: uuid_key,
                member: task.uuid.clone(),
            },
        ];
        if let Some(cname) = &task.cname {
            write_ops.push(WriteOp::Del {
                keys: vec![keys::cname_key(&self.appname, &self.queuename, cname)],
            });
        }
        if task.is_recurring() {
            write_ops.push(WriteOp::ZRem {
                key: keys::schedule_index_key(&self.appname, &self.queuename),
                member: task.id.to_string(),
            });
        }

        let watch_keys = vec![meta_key];
        run_optimistic(self.store.as_ref(), &watch_keys, 5, move |_txn| {
            let ops = write_ops.clone();
            async move { Ok(TxnOutcome::Apply(ops, ())) }
        })
        .await?;
        Ok(())
    }

    /// The internal status CAS: `status` must be one of `allowed_prev` or
    /// this fails `StatusNotMatched` without retrying — a lost race here
    /// means another worker already owns the transition.
    pub(crate) async fn update_status(
        &self,
        id: u64,
        next: TaskStatus,
        allowed_prev: &[TaskStatus],
    ) -> Result<DateTime<Utc>> {
        let meta_key = keys::meta_key(&self.appname, &self.queuename, id);
        let mut txn = self.store.begin_transaction(&[meta_key.clone()]).await?;

        let raw_status = txn
            .hget(&meta_key, encode::F_STATUS)
            .await?
            .ok_or(Error::NotFound)?;
        let current: TaskStatus = asynx_codec::decode(self.codec.as_ref(), &raw_status)?;
        if !allowed_prev.contains(&current) {
            return Err(Error::StatusNotMatched);
        }

        let now = self.time.now_utc();
        let write_ops = vec![WriteOp::HSet {
            key: meta_key,
            fields: vec![
                (encode::F_STATUS.to_string(), asynx_codec::encode(self.codec.as_ref(), &next)?),
                (encode::F_LAST_RUN_AT.to_string(), asynx_codec::encode(self.codec.as_ref(), &now)?),
            ],
        }];

        let committed = txn.exec(write_ops).await?;
        if !committed {
            return Err(Error::StatusNotMatched);
        }
        Ok(now)
    }

    /// (Re)hands `task` to the `DelayedExecutor`: computes a fresh uuid and
    /// the delay, rewrites `uuid`/`status` in the meta hash, and
    /// pipeline-updates the uuid index (best-effort, per spec §5 — the
    /// meta `uuid` field stays authoritative).
    pub(crate) async fn dispatch_task(&self, task: &mut Task) -> Result<()> {
        let now = self.time.now_utc();
        let old_uuid = std::mem::take(&mut task.uuid);
        let (delay, status) = compute_delay_and_status(task, now)?;

        let new_uuid = self
            .executor
            .submit(&self.appname, &self.queuename, task.id, delay)
            .await?;

        task.uuid = new_uuid;
        task.status = status;

        let meta_key = keys::meta_key(&self.appname, &self.queuename, task.id);
        let uuid_key = keys::uuid_index_key(&self.appname, &self.queuename);
        let mut write_ops = vec![WriteOp::HSet {
            key: meta_key,
            fields: vec![
                (encode::F_UUID.to_string(), asynx_codec::encode(self.codec.as_ref(), &task.uuid)?),
                (encode::F_STATUS.to_string(), asynx_codec::encode(self.codec.as_ref(), &task.status)?),
            ],
        }];
        if !old_uuid.is_empty() {
            write_ops.push(WriteOp::ZRem {
                key: uuid_key.clone(),
                member: old_uuid,
            });
        }
        write_ops.push(WriteOp::ZAdd {
            key: uuid_key,
            member: task.uuid.clone(),
            score: task.id as f64,
        });

        self.store.pipeline_apply(write_ops).await?;
        tracing::debug!(
            task_id = task.id,
            uuid = %task.uuid,
            status = %task.status,
            delay,
            "task (re)submitted to executor"
        );
        Ok(())
    }
}

/// Computes the executor delay and the status `dispatch_task` should set,
/// per spec §4.1's `_dispatch_task` rules. `0.5s` is the cutoff for
/// marking `Scheduled`/`Delayed` rather than submitting as `Enqueued`.
fn compute_delay_and_status(task: &Task, now: DateTime<Utc>) -> Result<(f64, TaskStatus)> {
    if let Some(schedule) = &task.schedule {
        let reference = task.last_run_at.unwrap_or(now);
        let (due, remaining) = schedule.is_due(reference, now)?;
        if due {
            Ok((0.0, TaskStatus::Enqueued))
        } else if remaining > 0.5 {
            Ok((remaining, TaskStatus::Scheduled))
        } else {
            Ok((remaining, TaskStatus::Enqueued))
        }
    } else {
        match task.countdown(now) {
            None => Ok((0.0, TaskStatus::Enqueued)),
            Some(countdown) if countdown <= 0.0 => Ok((0.0, TaskStatus::Enqueued)),
            Some(countdown) if countdown > 0.5 => Ok((countdown, TaskStatus::Delayed)),
            Some(countdown) => Ok((countdown, TaskStatus::Enqueued)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asynx_delayed_executor::InMemoryDelayedExecutor;
    use asynx_keystore::InMemoryKeyStore;
    use asynx_task::HttpRequestSpec;
    use asynx_timesource::FixedTimeSource;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn queue_at(now: DateTime<Utc>) -> (TaskQueue, Arc<FixedTimeSource>) {
        let time = Arc::new(FixedTimeSource::new(now));
        let queue = TaskQueue::new(
            "app",
            "q",
            chrono_tz::UTC,
            Arc::new(InMemoryKeyStore::new()),
            InMemoryDelayedExecutor::new(),
        )
        .with_time_source(time.clone());
        (queue, time)
    }

    #[tokio::test]
    async fn add_delayed_then_view() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let (queue, _time) = queue_at(now);

        let mut args = AddTaskArgs::new(HttpRequestSpec::get("http://x"));
        args.cname = Some("task001".to_string());
        args.countdown = Some(2.718287);

        let view = queue.add_task(args).await.unwrap();
        assert_eq!(view.status, TaskStatus::Delayed);
        assert_eq!(view.cname.as_deref(), Some("task001"));
        let countdown = view.countdown.unwrap();
        assert!(countdown > 2.5 && countdown < 2.71287);
    }

    #[tokio::test]
    async fn duplicate_cname_rejected() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let (queue, _time) = queue_at(now);

        let mut args = AddTaskArgs::new(HttpRequestSpec::get("http://x"));
        args.cname = Some("dup".to_string());
        queue.add_task(args.clone()).await.unwrap();

        let err = queue.add_task(args).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
    }

    #[tokio::test]
    async fn recurring_without_cname_fails() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let (queue, _time) = queue_at(now);

        let mut args = AddTaskArgs::new(HttpRequestSpec::get("http://x"));
        args.schedule = Some(asynx_schedule::ScheduleSpec::Interval(30.0));
        let err = queue.add_task(args).await.unwrap_err();
        assert!(matches!(err, Error::CNameRequired));
    }

    #[tokio::test]
    async fn delete_cleans_indexes_and_counter_stays() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let (queue, _time) = queue_at(now);

        let mut args = AddTaskArgs::new(HttpRequestSpec::get("http://x"));
        args.cname = Some("deletetask".to_string());
        let view = queue.add_task(args).await.unwrap();
        assert_eq!(view.id, 1);

        queue.delete_task(1).await.unwrap();
        let err = queue.get_task(1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));

        let err = queue.delete_task(2).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn status_cas_single_winner() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let (queue, _time) = queue_at(now);

        let args = AddTaskArgs::new(HttpRequestSpec::get("http://x"));
        let view = queue.add_task(args).await.unwrap();
        assert_eq!(view.status, TaskStatus::Enqueued);

        queue
            .update_status(
                view.id,
                TaskStatus::Running,
                &[TaskStatus::Enqueued, TaskStatus::Delayed],
            )
            .await
            .unwrap();

        let err = queue
            .update_status(
                view.id,
                TaskStatus::Running,
                &[TaskStatus::Enqueued, TaskStatus::Delayed],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StatusNotMatched));
    }

    #[tokio::test]
    async fn enumeration_order_over_many_tasks() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let (queue, _time) = queue_at(now);

        for i in 0..102 {
            let method = if i % 2 == 0 { "GET" } else { "POST" };
            let mut request = HttpRequestSpec::get("http://x");
            request.method = method.to_string();
            let mut args = AddTaskArgs::new(request);
            args.cname = Some(format!("task{}", i));
            queue.add_task(args).await.unwrap();
        }

        let mut iter = queue.iter_tasks(93, 10);
        let first = iter.next().await.unwrap();
        assert_eq!(first.cname.as_deref(), Some("task93"));

        let page = queue.list_tasks(17, 83).await.unwrap();
        assert_eq!(page.len(), 83);
        assert_eq!(page.first().unwrap().cname.as_deref(), Some("task17"));
        assert_eq!(page.last().unwrap().cname.as_deref(), Some("task99"));
    }
}
