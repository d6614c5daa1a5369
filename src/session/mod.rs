//! # Print Sessions
//!
//! ## Modules
//!
//! - [`machine`]: The print job state machine and its report
//! - [`link`]: Request/reply correlation over a transport
//! - [`clock`]: Real and virtual time
//! - [`config`]: Job settings, loadable from JSON

pub mod clock;
pub mod config;
pub mod link;
pub mod machine;

pub use clock::{Clock, ManualClock, TokioClock};
pub use config::SessionConfig;
pub use link::Link;
pub use machine::{PrintReport, PrintSession, SessionState};
