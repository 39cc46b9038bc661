//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! init:      Build App → run units and hooks in order → freeze into AppService
//! start:     Bind listener → spawn accept loop → emit Listening
//! shutdown:  Stop accepting → close listener → leave open connections alone
//! ```
//!
//! # Design Decisions
//! - State only moves forward (state.rs)
//! - Shutdown closes the listener but never kills connections; in-flight
//!   requests drain on their own
//! - Connection tasks are detached so they never hold the process open;
//!   draining waits for in-flight requests, not for idle sockets

pub mod events;
pub mod signals;
pub mod state;

pub use events::{Events, LifecycleEvent, RouterBeforeListener};
pub use state::LifecycleState;
