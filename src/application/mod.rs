//! Application layer - inbound handlers, dispatch, and the worker side.
//!
//! The gateway uses `handlers` and `WorkDispatcher`; the worker runs
//! `Worker` with `ProcessSessionJob`, which streams through
//! `WorkerEventEmitter`.

pub mod dispatcher;
pub mod emitter;
pub mod handlers;
pub mod jobs;
pub mod worker;

pub use dispatcher::{WorkDispatcher, PROCESS_SESSION};
pub use emitter::{RunSummary, WorkerEventEmitter};
pub use handlers::{
    build_registry, DispatchError, HandlerContext, HandlerError, HandlerRegistry, HandlerReply,
    InboundHandler,
};
pub use jobs::ProcessSessionJob;
pub use worker::{JobError, JobFunction, Worker, WorkerConfig, WorkerStats};
