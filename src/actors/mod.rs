mod performer;

pub use performer::spawn_logging_performer;

use crate::color::{ColorMode, Rgb};
use crate::events::ActorCommand;
use crossbeam::channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("actor {0} is disconnected")]
    Disconnected(usize),
}

/// One performer connection, reachable only through its command channel.
#[derive(Debug, Clone)]
pub struct ActorHandle {
    index: usize,
    base_color: Rgb,
    color_mode: ColorMode,
    cursor: (f64, f64),
    connected: Arc<AtomicBool>,
    command_tx: Sender<ActorCommand>,
}

impl ActorHandle {
    pub fn new(
        index: usize,
        base_color: Rgb,
        color_mode: ColorMode,
        command_tx: Sender<ActorCommand>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            index,
            base_color,
            color_mode,
            cursor: (50.0, 50.0),
            connected,
            command_tx,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn base_color(&self) -> Rgb {
        self.base_color
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn cursor(&self) -> (f64, f64) {
        self.cursor
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Fire-and-forget delivery; nothing waits for the actor.
    pub fn send(&self, command: ActorCommand) -> Result<(), ActorError> {
        self.command_tx.send(command).map_err(|_| {
            self.connected.store(false, Ordering::Relaxed);
            ActorError::Disconnected(self.index)
        })
    }

    pub fn move_cursor(&mut self, x: f64, y: f64) -> Result<(), ActorError> {
        self.cursor = (x, y);
        self.send(ActorCommand::SetCursor { x, y })
    }
}

/// The set of performers. Actor 0 is the primary one.
pub struct ActorPool {
    actors: Vec<ActorHandle>,
    cursor: usize,
}

impl ActorPool {
    pub fn new(actors: Vec<ActorHandle>) -> Self {
        Self { actors, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ActorHandle> {
        self.actors.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ActorHandle> {
        self.actors.get_mut(index)
    }

    pub fn primary(&self) -> Option<&ActorHandle> {
        self.actors.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActorHandle> {
        self.actors.iter()
    }

    /// A valid explicit index wins, otherwise the round-robin cursor
    /// advances and picks the next actor.
    pub fn address_by_policy(&mut self, explicit: Option<usize>) -> Option<&ActorHandle> {
        if self.actors.is_empty() {
            return None;
        }
        if let Some(index) = explicit.filter(|&i| i < self.actors.len()) {
            return self.actors.get(index);
        }
        self.cursor = (self.cursor + 1) % self.actors.len();
        self.actors.get(self.cursor)
    }

    /// Runs `f` on every actor. A failing actor is logged and skipped.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ActorHandle) -> Result<(), ActorError>,
    {
        for actor in &self.actors {
            if let Err(e) = f(actor) {
                tracing::warn!(actor = actor.index, error = %e, "actor send failed");
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_pool(
    modes: &[ColorMode],
) -> (ActorPool, Vec<crossbeam::channel::Receiver<ActorCommand>>) {
    let mut receivers = Vec::new();
    let actors = modes
        .iter()
        .enumerate()
        .map(|(index, mode)| {
            let (tx, rx) = crossbeam::channel::unbounded();
            receivers.push(rx);
            ActorHandle::new(
                index,
                Rgb::new(index as u8 * 10, 0, 0),
                *mode,
                tx,
                Arc::new(AtomicBool::new(true)),
            )
        })
        .collect();
    (ActorPool::new(actors), receivers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_wraps() {
        let (mut pool, _rx) = test_pool(&[ColorMode::Normal; 3]);
        let picked: Vec<usize> = (0..5)
            .map(|_| pool.address_by_policy(None).unwrap().index())
            .collect();
        assert_eq!(picked, vec![1, 2, 0, 1, 2]);
    }

    #[test]
    fn explicit_index_wins_when_valid() {
        let (mut pool, _rx) = test_pool(&[ColorMode::Normal; 3]);
        assert_eq!(pool.address_by_policy(Some(2)).unwrap().index(), 2);
        assert_eq!(pool.address_by_policy(Some(0)).unwrap().index(), 0);
        // out of range falls back to round-robin
        assert_eq!(pool.address_by_policy(Some(7)).unwrap().index(), 1);
    }

    #[test]
    fn empty_pool_addresses_nothing() {
        let mut pool = ActorPool::new(Vec::new());
        assert!(pool.address_by_policy(None).is_none());
        assert!(pool.primary().is_none());
    }

    #[test]
    fn for_each_survives_a_dead_actor() {
        let (pool, mut receivers) = test_pool(&[ColorMode::Normal; 3]);
        drop(receivers.remove(1));

        let mut attempted = 0;
        pool.for_each(|actor| {
            attempted += 1;
            actor.send(ActorCommand::SetDisplay {
                name: None,
                color: Some(actor.base_color()),
            })
        });

        assert_eq!(attempted, 3);
        assert_eq!(receivers[0].len(), 1);
        assert_eq!(receivers[1].len(), 1);
        assert!(!pool.get(1).unwrap().is_connected());
        assert!(pool.get(2).unwrap().is_connected());
    }

    #[test]
    fn move_cursor_records_position() {
        let (mut pool, receivers) = test_pool(&[ColorMode::Normal]);
        pool.get_mut(0).unwrap().move_cursor(12.0, 34.0).unwrap();
        assert_eq!(pool.get(0).unwrap().cursor(), (12.0, 34.0));
        assert_eq!(
            receivers[0].try_recv().unwrap(),
            ActorCommand::SetCursor { x: 12.0, y: 34.0 }
        );
    }
}
