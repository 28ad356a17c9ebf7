//! Session orchestration for compile cloud clients.
//!
//! Provides:
//! - `Session` - Synchronous state machine for one backend connection
//! - `SessionHandle` / `spawn` - Async driver serializing commands and transport events

pub mod driver;
pub mod machine;

pub use driver::{DriverError, SessionHandle, spawn};
pub use machine::{PendingReconnect, Session, SessionSnapshot, Ticket};
