pub mod actors;
pub mod color;
pub mod config;
pub mod cursor;
pub mod dispatch;
pub mod engine;
pub mod events;
pub mod source;
pub mod stats;
pub mod timing;

pub use actors::{ActorHandle, ActorPool, spawn_logging_performer};
pub use config::{Config, ConfigError};
pub use engine::{Engine, EngineCommand, EngineError, EngineHandle, EngineUpdate, spawn_engine};
pub use events::{ActorCommand, NoteEvent, NoteKind, SourceCommand, SourceEvent};
pub use source::{MidiSource, SmfPlayer, SourceFactory};
pub use stats::StatusSnapshot;
