//! Field-by-field Task <-> meta-hash encoding. Each field is encoded
//! independently (not the whole struct as one blob) so forward
//! compatibility holds: unknown fields are ignored on read, and a reader
//! only pays for the fields it asks for via `HMGET`.

use crate::error::{Error, Result};
use asynx_codec::Codec;
use asynx_schedule::ScheduleSpec;
use asynx_task::{CallbackSpec, HttpRequestSpec, Task, TaskStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub const F_UUID: &str = "uuid";
pub const F_CNAME: &str = "cname";
pub const F_REQUEST: &str = "request";
pub const F_ETA: &str = "eta";
pub const F_SCHEDULE: &str = "schedule";
pub const F_LAST_RUN_AT: &str = "last_run_at";
pub const F_STATUS: &str = "status";
pub const F_ON_SUCCESS: &str = "on_success";
pub const F_ON_FAILURE: &str = "on_failure";
pub const F_ON_COMPLETE: &str = "on_complete";

/// Encode every field of `task` except `id` and `countdown` (the latter is
/// never stored — it's derived from `eta` on read).
pub fn encode_task_fields(task: &Task, codec: &dyn Codec) -> Result<Vec<(String, Vec<u8>)>> {
    let mut fields = vec![
        (F_UUID.to_string(), asynx_codec::encode(codec, &task.uuid)?),
        (F_REQUEST.to_string(), asynx_codec::encode(codec, &task.request)?),
        (F_STATUS.to_string(), asynx_codec::encode(codec, &task.status)?),
        (F_ON_SUCCESS.to_string(), asynx_codec::encode(codec, &task.on_success)?),
        (F_ON_FAILURE.to_string(), asynx_codec::encode(codec, &task.on_failure)?),
        (F_ON_COMPLETE.to_string(), asynx_codec::encode(codec, &task.on_complete)?),
    ];
    if let Some(cname) = &task.cname {
        fields.push((F_CNAME.to_string(), asynx_codec::encode(codec, cname)?));
    }
    if let Some(eta) = &task.eta {
        fields.push((F_ETA.to_string(), asynx_codec::encode(codec, eta)?));
    }
    if let Some(schedule) = &task.schedule {
        fields.push((F_SCHEDULE.to_string(), asynx_codec::encode(codec, schedule)?));
    }
    if let Some(last_run_at) = &task.last_run_at {
        fields.push((F_LAST_RUN_AT.to_string(), asynx_codec::encode(codec, last_run_at)?));
    }
    Ok(fields)
}

/// Decode a meta hash (as returned by `HGETALL`) into a [`Task`]. Missing
/// optional fields become `None`/defaults; a missing `uuid`, `request`, or
/// `status` is treated as a corrupt/absent row (`Error::NotFound`).
pub fn decode_task(id: u64, raw: Vec<(String, Vec<u8>)>, codec: &dyn Codec) -> Result<Task> {
    let map: HashMap<String, Vec<u8>> = raw.into_iter().collect();

    let uuid: String = map
        .get(F_UUID)
        .map(|b| asynx_codec::decode(codec, b))
        .transpose()?
        .ok_or(Error::NotFound)?;
    let request: HttpRequestSpec = map
        .get(F_REQUEST)
        .map(|b| asynx_codec::decode(codec, b))
        .transpose()?
        .ok_or(Error::NotFound)?;
    let status: TaskStatus = map
        .get(F_STATUS)
        .map(|b| asynx_codec::decode(codec, b))
        .transpose()?
        .ok_or(Error::NotFound)?;

    let cname: Option<String> = map
        .get(F_CNAME)
        .map(|b| asynx_codec::decode(codec, b))
        .transpose()?;
    let eta: Option<DateTime<Utc>> = map
        .get(F_ETA)
        .map(|b| asynx_codec::decode(codec, b))
        .transpose()?;
    let schedule: Option<ScheduleSpec> = map
        .get(F_SCHEDULE)
        .map(|b| asynx_codec::decode(codec, b))
        .transpose()?;
    let last_run_at: Option<DateTime<Utc>> = map
        .get(F_LAST_RUN_AT)
        .map(|b| asynx_codec::decode(codec, b))
        .transpose()?;
    let on_success: CallbackSpec = map
        .get(F_ON_SUCCESS)
        .map(|b| asynx_codec::decode(codec, b))
        .transpose()?
        .unwrap_or(CallbackSpec::None);
    let on_failure: CallbackSpec = map
        .get(F_ON_FAILURE)
        .map(|b| asynx_codec::decode(codec, b))
        .transpose()?
        .unwrap_or_else(CallbackSpec::default_on_failure);
    let on_complete: CallbackSpec = map
        .get(F_ON_COMPLETE)
        .map(|b| asynx_codec::decode(codec, b))
        .transpose()?
        .unwrap_or(CallbackSpec::None);

    Ok(Task {
        id,
        uuid,
        cname,
        request,
        eta,
        schedule,
        last_run_at,
        status,
        on_success,
        on_failure,
        on_complete,
    })
}
