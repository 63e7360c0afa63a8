//! Error taxonomy from spec.md §7.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("a task with this cname already exists")]
    AlreadyExists,

    #[error("task not found")]
    NotFound,

    #[error("status did not match the expected precondition")]
    StatusNotMatched,

    #[error("a recurring task requires a cname")]
    CNameRequired,

    #[error("store error: {0}")]
    TransientStoreError(#[from] asynx_keystore::KeyStoreError),

    #[error("dispatch error: {0}")]
    DispatchError(#[from] asynx_http_fetcher::FetchError),

    #[error("codec error: {0}")]
    Codec(#[from] asynx_codec::CodecError),

    #[error("schedule error: {0}")]
    Schedule(#[from] asynx_schedule::ScheduleError),

    #[error("timesource error: {0}")]
    TimeSource(#[from] asynx_timesource::TimeSourceError),

    #[error("executor error: {0}")]
    Executor(#[from] asynx_delayed_executor::ExecutorError),
}

pub type Result<T> = std::result::Result<T, Error>;
