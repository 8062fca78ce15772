//! Job functions executed by the worker.

mod process_session;

pub use process_session::ProcessSessionJob;
