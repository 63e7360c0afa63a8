//! Pull-based pagination over the uuid index: `per_pipeline` meta fetches
//! per round trip via `KeyStore::hgetall_many`, missing meta rows (races
//! with deletes) skipped silently, iteration stops at the end of the set.

use crate::encode::decode_task;
use crate::keys;
use crate::TaskQueue;
use asynx_task::TaskView;
use std::collections::VecDeque;

pub struct TaskIter<'a> {
    queue: &'a TaskQueue,
    cursor: isize,
    per_pipeline: isize,
    buffer: VecDeque<TaskView>,
    exhausted: bool,
}

impl<'a> TaskIter<'a> {
    pub(crate) fn new(queue: &'a TaskQueue, offset: i64, per_pipeline: i64) -> Self {
        Self {
            queue,
            cursor: offset as isize,
            per_pipeline: per_pipeline.max(1) as isize,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Returns the next view in uuid-index order, fetching another page
    /// from the store when the buffer runs dry. `None` once the index is
    /// exhausted.
    pub async fn next(&mut self) -> Option<TaskView> {
        loop {
            if let Some(view) = self.buffer.pop_front() {
                return Some(view);
            }
            if self.exhausted {
                return None;
            }
            if !self.fill().await {
                self.exhausted = true;
                return None;
            }
        }
    }

    async fn fill(&mut self) -> bool {
        let key = keys::uuid_index_key(&self.queue.appname, &self.queue.queuename);
        let stop = self.cursor + self.per_pipeline - 1;
        let page = match self
            .queue
            .store
            .zrange_withscores(&key, self.cursor, stop)
            .await
        {
            Ok(page) => page,
            Err(_) => return false,
        };
        if page.is_empty() {
            return false;
        }
        let now = self.queue.time.now_utc();
        let advanced = page.len() as isize;
        let ids: Vec<u64> = page.iter().map(|(_, score)| *score as u64).collect();
        let meta_keys: Vec<String> = ids
            .iter()
            .map(|id| keys::meta_key(&self.queue.appname, &self.queue.queuename, *id))
            .collect();
        let pages = match self.queue.store.hgetall_many(&meta_keys).await {
            Ok(pages) => pages,
            Err(_) => return false,
        };
        for (id, fields) in ids.into_iter().zip(pages) {
            if fields.is_empty() {
                continue;
            }
            if let Ok(task) = decode_task(id, fields, self.queue.codec.as_ref()) {
                self.buffer.push_back(TaskView::from_task(&task, now));
            }
        }
        self.cursor += advanced;
        true
    }
}
