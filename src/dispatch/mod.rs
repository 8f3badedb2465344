mod keys;

pub use keys::{Key, KeyState, Keyboard, NpsMeter};

use crate::actors::ActorPool;
use crate::events::{ActorCommand, NoteEvent, NoteKind};
use crate::timing::RateBudget;
use std::collections::BTreeMap;
use std::time::Instant;

/// Delay in ms -> events in arrival order.
pub type DispatchBatch = BTreeMap<u64, Vec<NoteEvent>>;

/// Groups one source emission by exact delay. Events of unknown kind or
/// with a pitch outside the keyboard never make it into a batch.
pub fn plan_batches<I>(events: I, keyboard: &Keyboard) -> DispatchBatch
where
    I: IntoIterator<Item = NoteEvent>,
{
    let mut batches = DispatchBatch::new();
    for event in events {
        if event.kind == NoteKind::Other || keyboard.key_of(event.pitch).is_none() {
            continue;
        }
        batches.entry(event.delay).or_default().push(event);
    }
    batches
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Budget gate closed, nothing in the batch was sent
    Rejected,
    Played { sent: usize, filtered: usize },
}

/// Routes notes to actors and owns the key state they go through.
pub struct Dispatcher {
    keyboard: Keyboard,
    keys: KeyState,
    pitch_consistent_manual: bool,
}

impl Dispatcher {
    pub fn new(keyboard: Keyboard, keys: KeyState, pitch_consistent_manual: bool) -> Self {
        Self {
            keyboard,
            keys,
            pitch_consistent_manual,
        }
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn keys(&self) -> &KeyState {
        &self.keys
    }

    pub fn keys_mut(&mut self) -> &mut KeyState {
        &mut self.keys
    }

    /// Contiguous equal-width band of `key` when the keyboard is split
    /// across `actors` performers.
    pub fn pitch_band(&self, key: Key, actors: usize) -> usize {
        if actors == 0 {
            return 0;
        }
        let per_actor = self.keyboard.len().div_ceil(actors).max(1);
        (key.index / per_actor).min(actors - 1)
    }

    /// Picks the actor for `key`. Pitch bands while playing, round-robin
    /// (or pitch-consistent if configured) for manual notes.
    pub fn route(&self, key: Key, playing: bool, pool: &mut ActorPool) -> Option<usize> {
        let actors = pool.len();
        match (playing, actors) {
            (_, 0) => None,
            (true, 1) => Some(0),
            (true, _) => Some(self.pitch_band(key, actors)),
            (false, _) => {
                let explicit = self.pitch_consistent_manual.then(|| {
                    let width = self.keyboard.len() as f64 / actors as f64;
                    (key.index as f64 / width).floor() as usize
                });
                pool.address_by_policy(explicit).map(|actor| actor.index())
            }
        }
    }

    /// Plays one batch at its scheduled instant. The budget is checked once
    /// for the whole batch so a chord sounds complete or not at all.
    pub fn fire(
        &mut self,
        batch: &[NoteEvent],
        playing: bool,
        budget: &mut RateBudget,
        pool: &mut ActorPool,
        now: Instant,
    ) -> BatchOutcome {
        if !budget.try_consume(now) {
            tracing::debug!(notes = batch.len(), points = budget.points(), "budget exhausted, batch dropped");
            return BatchOutcome::Rejected;
        }

        let mut sent = 0;
        let mut filtered = 0;
        for event in batch {
            let Some(key) = self.keyboard.key_of(event.pitch) else {
                continue;
            };
            let target = self.route(key, playing, pool);

            let command = match event.kind {
                NoteKind::On => self
                    .keys
                    .note_on(key, event.velocity, budget.fill_ratio())
                    .then_some(ActorCommand::NoteStart {
                        key: key.name,
                        velocity: event.velocity,
                    }),
                NoteKind::Off => self
                    .keys
                    .note_off(key)
                    .then_some(ActorCommand::NoteStop { key: key.name }),
                NoteKind::Other => None,
            };
            let Some(command) = command else {
                filtered += 1;
                continue;
            };

            if let Some(actor) = target.and_then(|index| pool.get(index)) {
                if let Err(e) = actor.send(command) {
                    tracing::debug!(actor = actor.index(), error = %e, "note dropped");
                }
            }
            budget.spend(1.0);
            sent += 1;
        }

        BatchOutcome::Played { sent, filtered }
    }
}
