//! Scheduler daemon: interval-triggered reconciliation cycles, a Unix-socket
//! control protocol, and the cycle lease shared with one-shot runs.

mod error;
pub mod lease;
pub mod log_rotation;
pub mod logging;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use lease::CycleLease;
pub use logging::{init_daemon_tracing, init_tracing};
pub use protocol::{
    request_status, request_stop, request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{
    prepare_blocking, run, run_guarded_cycle, run_once_blocking, start_blocking, DaemonState,
    Trigger,
};
