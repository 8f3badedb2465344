use crate::color::Rgb;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    On,
    Off,
    Other,
}

/// One parsed MIDI instruction as emitted by a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub kind: NoteKind,
    pub pitch: u8,
    /// 0.0 -> 1.0
    pub velocity: f32,
    /// Milliseconds relative to the emission
    pub delay: u64,
}

impl NoteEvent {
    pub fn on(pitch: u8, velocity: f32, delay: u64) -> Self {
        Self {
            kind: NoteKind::On,
            pitch,
            velocity,
            delay,
        }
    }

    pub fn off(pitch: u8, delay: u64) -> Self {
        Self {
            kind: NoteKind::Off,
            pitch,
            velocity: 0.0,
            delay,
        }
    }
}

/// Notifications flowing from a MIDI source to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    MidiEvents(Vec<NoteEvent>),
    LoadingStarted,
    LoadingProgress(f32),
    Loaded {
        load_ms: Option<u64>,
        file: Option<String>,
        duration_secs: Option<f64>,
    },
    Play {
        file: Option<String>,
        duration_secs: Option<f64>,
    },
    Pause,
    Stop,
    Info {
        playing: bool,
        position_secs: f64,
        file: Option<String>,
        duration_secs: Option<f64>,
    },
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceCommand {
    Load { path: PathBuf, fast: bool },
    Play,
    Pause,
    Stop,
}

/// The vocabulary a performer actor accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorCommand {
    NoteStart { key: &'static str, velocity: f32 },
    NoteStop { key: &'static str },
    SetCursor { x: f64, y: f64 },
    SetDisplay {
        name: Option<String>,
        color: Option<Rgb>,
    },
}
