//! Script Host - runs one background script against a prompt-rendering surface
//!
//! Scripts emit commands, the visualization engine turns them into prompts,
//! and the operator's answers flow back as payloads. An optional embedding
//! host is reached through a bridge; without one the loopback bridge stands
//! in so the same script behaves identically.

pub mod assembly;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod prompts;
pub mod protocol;
pub mod resize;
pub mod worker;

pub use assembly::{Assembly, AssemblyBuilder, BridgeMode, SessionOutcome};
pub use error::{ErrorKind, HostError, Result};
