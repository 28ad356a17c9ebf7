//! Core building blocks for remote code-execution sessions.
//!
//! This crate provides:
//! - `codec` - The `TAG:PAYLOAD` wire protocol
//! - `Transport` / `Connection` - Abstract duplex connection capability
//! - `SessionEvent` / `PresentationSink` - Semantic events for the UI layer
//! - `Status` / `Controls` - Projections of session state
//! - `ClientConfig` / `Endpoint` - Configuration
//! - `EventStore` - Broadcast + history sink

pub mod codec;
pub mod config;
pub mod event;
pub mod event_store;
pub mod status;
pub mod traits;

pub use codec::{DecodeFailure, Inbound, Outbound, RunOutcome, Tag};
pub use config::{ClientConfig, ConfigError, Endpoint};
pub use event::SessionEvent;
pub use event_store::EventStore;
pub use status::{ConnectionState, Controls, ExecutionState, Severity, Status, StatusOverride};
pub use traits::{
    Connection, EventReporter, Generation, NullSink, PresentationSink, Transport, TransportError,
    TransportEvent, TransportEventKind, TransportEventReceiver,
};
