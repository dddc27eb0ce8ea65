//! Domain model: core types, errors, and the session/alert records that the
//! rest of the crate is built around.

pub mod alert;
pub mod errors;
pub mod session;
pub mod types;

pub use alert::{Alert, Severity};
pub use errors::{
    ConfigError, PersistenceError, ProcessError, ReceiverError, SignalError, StoreError,
};
pub use session::{Event, Metric, ProcessMetadata, SessionRecord, SessionStatus};
pub use types::{OpenPort, Pid, Port, SessionId, Timestamp};
