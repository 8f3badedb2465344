use super::ActorHandle;
use crate::color::{ColorMode, Rgb};
use crate::events::ActorCommand;
use crossbeam::channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Spawns a performer that logs every command it receives instead of
/// talking to a host. Stands in for a real connection client.
pub fn spawn_logging_performer(
    index: usize,
    base_color: Rgb,
    color_mode: ColorMode,
) -> std::io::Result<ActorHandle> {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let connected = Arc::new(AtomicBool::new(false));

    let flag = connected.clone();
    std::thread::Builder::new()
        .name(format!("performer-{}", index))
        .spawn(move || performer_thread(index, command_rx, flag))?;

    Ok(ActorHandle::new(
        index, base_color, color_mode, command_tx, connected,
    ))
}

fn performer_thread(index: usize, command_rx: Receiver<ActorCommand>, connected: Arc<AtomicBool>) {
    connected.store(true, Ordering::Relaxed);
    tracing::debug!(performer = index, "performer connected");

    for command in command_rx.iter() {
        match command {
            ActorCommand::NoteStart { key, velocity } => {
                tracing::trace!(performer = index, key, velocity, "note start");
            }
            ActorCommand::NoteStop { key } => {
                tracing::trace!(performer = index, key, "note stop");
            }
            ActorCommand::SetCursor { x, y } => {
                tracing::trace!(performer = index, x, y, "cursor");
            }
            ActorCommand::SetDisplay { name, color } => {
                tracing::debug!(
                    performer = index,
                    name = name.as_deref().unwrap_or("-"),
                    color = %color.map(|c| c.to_string()).unwrap_or_default(),
                    "display"
                );
            }
        }
    }

    connected.store(false, Ordering::Relaxed);
    tracing::debug!(performer = index, "performer disconnected");
}
