//! MIDI sources run on their own thread and talk to the engine only
//! through a command channel in and an event channel out.

mod smf;

pub use smf::{SmfPlayer, Song, TimedNote};

use crate::events::{SourceCommand, SourceEvent};
use crossbeam::channel::{Receiver, Sender};
use std::thread::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read MIDI file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse MIDI file: {0}")]
    Parse(#[from] midly::Error),

    #[error("no file loaded")]
    NothingLoaded,
}

pub trait MidiSource: Send + 'static {
    /// Runs until `commands` disconnects or the engine stops listening.
    fn run(self: Box<Self>, commands: Receiver<SourceCommand>, events: Sender<SourceEvent>);
}

pub type SourceFactory = Box<dyn Fn() -> Box<dyn MidiSource> + Send>;

/// The engine's end of a running source. Dropping it closes the command
/// channel, which ends the worker.
pub struct SourceLink {
    pub command_tx: Sender<SourceCommand>,
    pub event_rx: Receiver<SourceEvent>,
    _thread: JoinHandle<()>,
}

impl SourceLink {
    pub fn spawn(source: Box<dyn MidiSource>) -> std::io::Result<Self> {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();
        let (event_tx, event_rx) = crossbeam::channel::unbounded();

        let thread = std::thread::Builder::new()
            .name("midi-source".into())
            .spawn(move || source.run(command_rx, event_tx))?;

        Ok(Self {
            command_tx,
            event_rx,
            _thread: thread,
        })
    }

    pub fn send(&self, command: SourceCommand) {
        if self.command_tx.send(command).is_err() {
            tracing::warn!("midi source is gone, command dropped");
        }
    }
}
