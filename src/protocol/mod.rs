//! JSONL protocol between the background script, the UI and the embedding host
//!
//! Every message is one JSON object per line, tagged by a `type` field.
//!
//! # Message Categories
//!
//! ## Commands (script → host process)
//! - prompts: `consent`, `confirm`, `retry`, `fileInput`, `radio`, `errorPage`, `endPage`
//! - system: `donate`, `exit`, `event`
//! - anything else: extension commands for custom prompt factories
//!
//! ## Payloads (UI → script)
//! - `boolean`, `string`, `file`, `json`, `void`, `error`
//!
//! ## Host bridge
//! - `init` handshake, `command`/`payload` envelopes
//! - `{"action":"resize","height":N}` notices
//!
//! # Module Structure
//!
//! - `command`: the Command tagged union
//! - `payload`: the Payload tagged union
//! - `envelope`: host bridge envelopes and notices
//! - `io`: JSONL parsing with graceful error handling and streaming readers

mod command;
mod envelope;
mod io;
mod payload;

pub use command::*;
pub use envelope::*;
pub use io::*;
pub use payload::*;
