use crate::actors::ActorPool;
use crate::color::{ColorAnimator, ColorAssignment};
use crate::config::Config;
use crate::cursor::CursorOrbit;
use crate::dispatch::{self, BatchOutcome, Dispatcher, KeyState, Keyboard};
use crate::events::{ActorCommand, NoteEvent, SourceCommand, SourceEvent};
use crate::source::{SourceFactory, SourceLink};
use crate::stats::{StatusSnapshot, format_duration_ms};
use crate::timing::{DelayQueue, PlaybackState, PlaybackStatus, RateBudget, Transition};
use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const METER_PERIOD: Duration = Duration::from_secs(1);
const RESPAWN_DELAY: Duration = Duration::from_millis(500);
const LOAD_PROGRESS_PERIOD: Duration = Duration::from_secs(5);
const IDLE_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub enum EngineCommand {
    Load(PathBuf),
    Play,
    Pause,
    Stop,
    ToggleDeblack,
    ToggleSustain,
    /// Manual notes, routed like a source burst
    Notes(Vec<NoteEvent>),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    Playback { state: PlaybackState },
    Loaded { file: Option<String>, load_time: Duration },
    Toggle { name: &'static str, value: bool },
    Error { message: String },
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
    pub status: Arc<ArcSwap<StatusSnapshot>>,
    thread: JoinHandle<()>,
}

impl EngineHandle {
    pub fn send(&self, command: EngineCommand) {
        let _ = self.command_tx.send(command);
    }

    pub fn snapshot(&self) -> Arc<StatusSnapshot> {
        self.status.load_full()
    }

    pub fn shutdown(self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        let _ = self.thread.join();
    }
}

pub fn spawn_engine(
    config: Config,
    pool: ActorPool,
    factory: SourceFactory,
) -> Result<EngineHandle, EngineError> {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    let now = Instant::now();
    let mut engine = Engine::new(config, pool, update_tx, now).with_source(factory, now);
    engine.start(now);
    let status = engine.status();

    let thread = std::thread::Builder::new()
        .name("engine".into())
        .spawn(move || engine_thread(engine, command_rx))?;

    Ok(EngineHandle {
        command_tx,
        update_rx,
        status,
        thread,
    })
}

fn engine_thread(mut engine: Engine, command_rx: Receiver<EngineCommand>) {
    loop {
        engine.run_due(Instant::now());

        let timeout = engine
            .next_deadline()
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_WAIT);
        let source_rx = engine.source_events();

        crossbeam::select! {
            recv(command_rx) -> msg => match msg {
                Ok(command) => {
                    if !engine.handle_command(command, Instant::now()) {
                        break;
                    }
                }
                Err(crossbeam::channel::RecvError) => break,
            },
            recv(source_rx) -> msg => match msg {
                Ok(event) => engine.handle_source_event(event, Instant::now()),
                Err(crossbeam::channel::RecvError) => engine.source_lost(Instant::now()),
            },
            default(timeout) => {}
        }
    }

    engine.shutdown();
}

/// Deferred work kept in the engine's delay queue.
#[derive(Debug)]
enum Deferred {
    Batch(Vec<NoteEvent>),
    MeterTick,
    ColorTick { generation: u64 },
    CursorTick,
    StatsTick,
    LoadProgressTick,
    RespawnSource,
}

/// Single owner of all dispatch state. Every callback runs on the engine
/// thread, one at a time.
pub struct Engine {
    config: Config,
    pool: ActorPool,
    dispatcher: Dispatcher,
    budget: RateBudget,
    playback: PlaybackStatus,
    animator: ColorAnimator,
    cursor: Option<CursorOrbit>,
    timers: DelayQueue<Deferred>,
    source: Option<SourceLink>,
    factory: Option<SourceFactory>,
    update_tx: Sender<EngineUpdate>,
    status: Arc<ArcSwap<StatusSnapshot>>,
    started: Instant,
}

impl Engine {
    pub fn new(config: Config, pool: ActorPool, update_tx: Sender<EngineUpdate>, now: Instant) -> Self {
        let keyboard = Keyboard::new(config.keyboard.first_note, config.keyboard.key_count);
        let mut keys = KeyState::new(&keyboard, config.nps_decay);
        keys.set_deblack(config.deblack);
        keys.set_sustain(config.sustain);

        let budget = RateBudget::new(
            config.quota.capacity,
            config.quota.window(),
            config.quota.threshold,
            now,
        );

        Self {
            dispatcher: Dispatcher::new(keyboard, keys, config.pitch_consistent_manual),
            budget,
            playback: PlaybackStatus::new(),
            animator: ColorAnimator::new(&config.color),
            cursor: config.cursor.as_ref().map(|_| CursorOrbit::new()),
            timers: DelayQueue::new(),
            source: None,
            factory: None,
            update_tx,
            status: Arc::new(ArcSwap::from_pointee(StatusSnapshot::default())),
            started: now,
            pool,
            config,
        }
    }

    pub fn with_source(mut self, factory: SourceFactory, now: Instant) -> Self {
        self.factory = Some(factory);
        self.spawn_source(now);
        self
    }

    pub fn status(&self) -> Arc<ArcSwap<StatusSnapshot>> {
        self.status.clone()
    }

    pub fn playback(&self) -> &PlaybackStatus {
        &self.playback
    }

    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }

    pub fn keys(&self) -> &KeyState {
        self.dispatcher.keys()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Events of the current source, or a channel that never fires while
    /// the source is down.
    pub fn source_events(&self) -> Receiver<SourceEvent> {
        self.source
            .as_ref()
            .map(|link| link.event_rx.clone())
            .unwrap_or_else(crossbeam::channel::never)
    }

    /// Greets every actor and arms the periodic timers.
    pub fn start(&mut self, now: Instant) {
        let name = self.config.name.clone();
        let colors = self.animator.load_colors(&self.pool);
        self.pool.for_each(|actor| {
            let color = colors
                .iter()
                .find(|c| c.actor == actor.index())
                .map(|c| c.color);
            actor.send(ActorCommand::SetDisplay {
                name: Some(name.clone()),
                color,
            })
        });

        self.timers.push(now + METER_PERIOD, Deferred::MeterTick);
        if let Some(interval) = self.animator.tick_interval() {
            self.timers.push(
                now + interval,
                Deferred::ColorTick {
                    generation: self.animator.generation(),
                },
            );
        }
        if let Some(cursor) = &self.config.cursor {
            self.timers
                .push(now + Duration::from_millis(cursor.interval_ms), Deferred::CursorTick);
        }
        if let Some(stats) = &self.config.stats {
            self.timers
                .push(now + Duration::from_millis(stats.interval_ms), Deferred::StatsTick);
        }

        tracing::info!(
            actors = self.pool.len(),
            keys = self.dispatcher.keyboard().len(),
            animation = ?self.animator.mode(),
            "engine started"
        );
        self.publish(now);
    }

    /// Returns false once the engine should stop.
    pub fn handle_command(&mut self, command: EngineCommand, now: Instant) -> bool {
        match command {
            EngineCommand::Load(path) => self.load(path),
            EngineCommand::Play => self.send_source(SourceCommand::Play),
            EngineCommand::Pause => self.send_source(SourceCommand::Pause),
            EngineCommand::Stop => self.send_source(SourceCommand::Stop),
            EngineCommand::ToggleDeblack => {
                let value = self.dispatcher.keys_mut().toggle_deblack();
                tracing::info!(value, "deblack toggled");
                self.notify(EngineUpdate::Toggle {
                    name: "deblack",
                    value,
                });
                self.publish(now);
            }
            EngineCommand::ToggleSustain => {
                let value = self.dispatcher.keys_mut().toggle_sustain();
                tracing::info!(value, "sustain toggled");
                self.notify(EngineUpdate::Toggle {
                    name: "sustain",
                    value,
                });
                self.publish(now);
            }
            EngineCommand::Notes(events) => self.schedule_emission(events, now),
            EngineCommand::Shutdown => return false,
        }
        true
    }

    pub fn handle_source_event(&mut self, event: SourceEvent, now: Instant) {
        match event {
            SourceEvent::MidiEvents(events) => self.schedule_emission(events, now),
            SourceEvent::Error(message) => {
                tracing::warn!(%message, "midi source error");
                self.notify(EngineUpdate::Error { message });
            }
            other => {
                let transition = self.playback.apply(&other, now, self.config.fast_load);
                match transition {
                    Some(Transition::To(state)) => {
                        tracing::info!(state = state.as_str(), "playback");
                        if state == PlaybackState::Loading && self.config.fast_load {
                            self.timers
                                .push(now + LOAD_PROGRESS_PERIOD, Deferred::LoadProgressTick);
                        }
                        self.notify(EngineUpdate::Playback { state });
                    }
                    Some(Transition::Loaded { file, load_time }) => {
                        tracing::info!(
                            file = file.as_deref().unwrap_or("player"),
                            took = %format_duration_ms(load_time.as_millis() as u64),
                            "loaded"
                        );
                        self.notify(EngineUpdate::Loaded { file, load_time });
                    }
                    None => {}
                }
                self.publish(now);
            }
        }
    }

    /// The source's event channel disconnected: it exited or panicked.
    pub fn source_lost(&mut self, now: Instant) {
        tracing::error!(retry_in = ?RESPAWN_DELAY, "midi source exited");
        self.source = None;
        self.notify(EngineUpdate::Error {
            message: "midi source exited, restarting".into(),
        });
        self.timers.push(now + RESPAWN_DELAY, Deferred::RespawnSource);
    }

    pub fn run_due(&mut self, now: Instant) {
        while let Some((at, item)) = self.timers.pop_due(now) {
            match item {
                Deferred::Batch(batch) => {
                    let playing = self.playback.is_playing();
                    let outcome =
                        self.dispatcher
                            .fire(&batch, playing, &mut self.budget, &mut self.pool, now);
                    if let BatchOutcome::Played { sent, filtered } = outcome {
                        tracing::trace!(sent, filtered, "batch played");
                    }
                }
                Deferred::MeterTick => {
                    let nps = self.dispatcher.keys().nps();
                    match self.animator.retune(nps, &self.pool) {
                        crate::color::ReactiveAction::Retime(interval) => {
                            tracing::debug!(?interval, nps, "color timer retimed");
                            self.timers.push(
                                now + interval,
                                Deferred::ColorTick {
                                    generation: self.animator.generation(),
                                },
                            );
                        }
                        crate::color::ReactiveAction::Idle(colors) => {
                            tracing::debug!("color timer idle");
                            self.paint(&colors);
                        }
                        crate::color::ReactiveAction::Unchanged => {}
                    }
                    self.dispatcher.keys_mut().decay_nps();
                    self.publish(now);
                    self.timers
                        .push(next_period(at, now, METER_PERIOD), Deferred::MeterTick);
                }
                Deferred::ColorTick { generation } => {
                    if generation != self.animator.generation() {
                        continue;
                    }
                    let colors = self.animator.tick(&self.pool);
                    self.paint(&colors);
                    if let Some(interval) = self.animator.tick_interval() {
                        self.timers
                            .push(next_period(at, now, interval), Deferred::ColorTick { generation });
                    }
                }
                Deferred::CursorTick => {
                    if let Some(cursor) = self.cursor.as_mut() {
                        cursor.tick(&mut self.pool);
                    }
                    if let Some(config) = &self.config.cursor {
                        let period = Duration::from_millis(config.interval_ms);
                        self.timers.push(next_period(at, now, period), Deferred::CursorTick);
                    }
                }
                Deferred::StatsTick => {
                    if let Some(config) = &self.config.stats {
                        let name = self.snapshot(now).render(&config.template);
                        if let Some(primary) = self.pool.primary() {
                            if let Err(e) = primary.send(ActorCommand::SetDisplay {
                                name: Some(name),
                                color: None,
                            }) {
                                tracing::warn!(error = %e, "stats update dropped");
                            }
                        }
                        let period = Duration::from_millis(config.interval_ms);
                        self.timers.push(next_period(at, now, period), Deferred::StatsTick);
                    }
                }
                Deferred::LoadProgressTick => {
                    if self.playback.state == PlaybackState::Loading {
                        let waited = self
                            .playback
                            .load_started_at
                            .map(|started| now.saturating_duration_since(started))
                            .unwrap_or_default();
                        tracing::info!(elapsed_secs = waited.as_secs(), "still loading");
                        self.timers
                            .push(now + LOAD_PROGRESS_PERIOD, Deferred::LoadProgressTick);
                    }
                }
                Deferred::RespawnSource => self.spawn_source(now),
            }
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(link) = self.source.take() {
            link.send(SourceCommand::Stop);
        }
        tracing::info!("engine stopped");
    }

    fn load(&mut self, path: PathBuf) {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "file not found");
            self.notify(EngineUpdate::Error {
                message: format!("file not found: {}", path.display()),
            });
            return;
        }
        if self.config.fast_load {
            // Warms the OS cache before the source reads the file.
            let _ = std::fs::read(&path);
        }

        tracing::info!(path = %path.display(), "loading");
        self.send_source(SourceCommand::Stop);
        self.send_source(SourceCommand::Load {
            path,
            fast: self.config.fast_load,
        });

        let colors = self.animator.load_colors(&self.pool);
        self.paint(&colors);
    }

    fn schedule_emission(&mut self, events: Vec<NoteEvent>, now: Instant) {
        let batches = dispatch::plan_batches(events, self.dispatcher.keyboard());
        for (delay, batch) in batches {
            self.timers
                .push(now + Duration::from_millis(delay), Deferred::Batch(batch));
        }
    }

    fn spawn_source(&mut self, now: Instant) {
        let Some(factory) = &self.factory else {
            return;
        };
        match SourceLink::spawn(factory()) {
            Ok(link) => {
                tracing::info!("midi source started");
                self.source = Some(link);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start midi source");
                self.timers.push(now + RESPAWN_DELAY, Deferred::RespawnSource);
            }
        }
    }

    fn send_source(&self, command: SourceCommand) {
        match &self.source {
            Some(link) => link.send(command),
            None => tracing::warn!(?command, "midi source is down, command dropped"),
        }
    }

    fn paint(&self, colors: &[ColorAssignment]) {
        self.pool.for_each(|actor| {
            match colors.iter().find(|c| c.actor == actor.index()) {
                Some(assignment) => actor.send(ActorCommand::SetDisplay {
                    name: None,
                    color: Some(assignment.color),
                }),
                None => Ok(()),
            }
        });
    }

    fn notify(&self, update: EngineUpdate) {
        let _ = self.update_tx.send(update);
    }

    fn snapshot(&self, now: Instant) -> StatusSnapshot {
        let keys = self.dispatcher.keys();
        StatusSnapshot {
            state: self.playback.state,
            file: self.playback.file.clone(),
            elapsed_secs: self.playback.elapsed_secs(now),
            duration_secs: self.playback.duration_secs,
            nps: keys.nps(),
            notes_played: keys.notes_played(),
            deblack: keys.deblack(),
            sustain: keys.sustain(),
            uptime: now.saturating_duration_since(self.started),
        }
    }

    fn publish(&self, now: Instant) {
        self.status.store(Arc::new(self.snapshot(now)));
    }
}

/// Next tick of a periodic timer, skipping ticks missed while busy.
fn next_period(at: Instant, now: Instant, period: Duration) -> Instant {
    let next = at + period;
    if next >= now { next } else { now + period }
}
