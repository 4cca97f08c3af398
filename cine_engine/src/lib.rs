//! Cine script engine: byte-code machine, per-tick scheduler and the seam to
//! the host that renders and plays its side effects.

pub mod config;
pub mod host;
pub mod scheduler;
pub mod script;
pub mod state;

pub use config::EngineConfig;
pub use host::{HostEvent, RecordingHost, ScriptHost};
pub use scheduler::{Engine, TickReport};
pub use state::EngineState;
