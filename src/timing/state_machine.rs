use crate::events::SourceEvent;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    To(PlaybackState),
    /// Load finished; carries the load time shown to users
    Loaded { file: Option<String>, load_time: Duration },
}

/// Playback state as reported by the source. Nothing else writes it.
#[derive(Debug, Clone, Default)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub file: Option<String>,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub started_at: Option<Instant>,
    pub load_started_at: Option<Instant>,
    pub loading_progress: f32,
    pub last_load_time: Option<Duration>,
}

impl PlaybackStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Seconds into the piece, derived from the play anchor while playing.
    pub fn elapsed_secs(&self, now: Instant) -> f64 {
        match (self.state, self.started_at) {
            (PlaybackState::Playing, Some(started)) => {
                now.saturating_duration_since(started).as_secs_f64()
            }
            _ => self.position_secs,
        }
    }

    pub fn apply(&mut self, event: &SourceEvent, now: Instant, fast_load: bool) -> Option<Transition> {
        match event {
            SourceEvent::LoadingStarted => {
                self.load_started_at = Some(now);
                self.duration_secs = 0.0;
                self.position_secs = 0.0;
                self.loading_progress = 0.0;
                self.enter(PlaybackState::Loading)
            }
            SourceEvent::LoadingProgress(ratio) => {
                self.loading_progress = ratio.clamp(0.0, 1.0);
                self.enter(PlaybackState::Loading)
            }
            SourceEvent::Loaded {
                load_ms,
                file,
                duration_secs,
            } => {
                let mut load_time = match load_ms {
                    Some(ms) => Duration::from_millis(*ms),
                    None => self
                        .load_started_at
                        .map(|started| now.saturating_duration_since(started))
                        .unwrap_or_default(),
                };
                if fast_load {
                    load_time = (load_time / 2).max(Duration::from_millis(1));
                }

                if file.is_some() {
                    self.file = file.clone();
                }
                if let Some(duration) = duration_secs {
                    self.duration_secs = *duration;
                }
                self.position_secs = 0.0;
                self.started_at = None;
                self.load_started_at = None;
                self.loading_progress = 1.0;
                self.last_load_time = Some(load_time);
                self.state = PlaybackState::Stopped;
                Some(Transition::Loaded {
                    file: self.file.clone(),
                    load_time,
                })
            }
            SourceEvent::Play {
                file,
                duration_secs,
            } => {
                if file.is_some() {
                    self.file = file.clone();
                }
                if let Some(duration) = duration_secs {
                    self.duration_secs = *duration;
                }
                let offset = Duration::from_secs_f64(self.position_secs.max(0.0));
                self.started_at = Some(now.checked_sub(offset).unwrap_or(now));
                self.enter(PlaybackState::Playing)
            }
            SourceEvent::Pause => {
                self.position_secs = self.elapsed_secs(now);
                self.enter(PlaybackState::Paused)
            }
            SourceEvent::Stop => {
                self.position_secs = 0.0;
                self.started_at = None;
                self.enter(PlaybackState::Stopped)
            }
            SourceEvent::Info {
                playing: _,
                position_secs,
                file,
                duration_secs,
            } => {
                self.position_secs = position_secs.max(0.0);
                if self.state == PlaybackState::Playing {
                    let offset = Duration::from_secs_f64(self.position_secs);
                    self.started_at = Some(now.checked_sub(offset).unwrap_or(now));
                }
                if file.is_some() {
                    self.file = file.clone();
                }
                if let Some(duration) = duration_secs {
                    self.duration_secs = *duration;
                }
                None
            }
            SourceEvent::MidiEvents(_) | SourceEvent::Error(_) => None,
        }
    }

    fn enter(&mut self, state: PlaybackState) -> Option<Transition> {
        if self.state == state {
            return None;
        }
        self.state = state;
        Some(Transition::To(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(load_ms: Option<u64>) -> SourceEvent {
        SourceEvent::Loaded {
            load_ms,
            file: Some("song.mid".into()),
            duration_secs: Some(90.0),
        }
    }

    #[test]
    fn full_lifecycle() {
        let now = Instant::now();
        let mut status = PlaybackStatus::new();

        assert_eq!(
            status.apply(&SourceEvent::LoadingStarted, now, false),
            Some(Transition::To(PlaybackState::Loading))
        );
        assert!(matches!(
            status.apply(&loaded(Some(400)), now, false),
            Some(Transition::Loaded { .. })
        ));
        assert_eq!(status.state, PlaybackState::Stopped);
        assert_eq!(status.file.as_deref(), Some("song.mid"));
        assert_eq!(status.duration_secs, 90.0);

        let play = SourceEvent::Play {
            file: None,
            duration_secs: None,
        };
        assert_eq!(
            status.apply(&play, now, false),
            Some(Transition::To(PlaybackState::Playing))
        );
        assert!(status.is_playing());
        assert_eq!(
            status.apply(&SourceEvent::Pause, now + Duration::from_secs(3), false),
            Some(Transition::To(PlaybackState::Paused))
        );
        assert!((status.position_secs - 3.0).abs() < 1e-6);
        assert_eq!(
            status.apply(&SourceEvent::Stop, now, false),
            Some(Transition::To(PlaybackState::Stopped))
        );
    }

    #[test]
    fn loading_clears_previous_position_and_duration() {
        let now = Instant::now();
        let mut status = PlaybackStatus {
            position_secs: 12.0,
            duration_secs: 40.0,
            ..PlaybackStatus::default()
        };
        status.apply(&SourceEvent::LoadingStarted, now, false);
        assert_eq!(status.position_secs, 0.0);
        assert_eq!(status.duration_secs, 0.0);
        assert_eq!(status.load_started_at, Some(now));
    }

    #[test]
    fn fast_load_halves_reported_load_time() {
        let now = Instant::now();
        let mut status = PlaybackStatus::new();
        match status.apply(&loaded(Some(800)), now, true) {
            Some(Transition::Loaded { load_time, .. }) => {
                assert_eq!(load_time, Duration::from_millis(400))
            }
            other => panic!("unexpected {:?}", other),
        }
        status.apply(&loaded(Some(1)), now, true);
        assert_eq!(status.last_load_time, Some(Duration::from_millis(1)));
    }

    #[test]
    fn load_time_falls_back_to_wall_clock() {
        let start = Instant::now();
        let mut status = PlaybackStatus::new();
        status.apply(&SourceEvent::LoadingStarted, start, false);
        status.apply(&loaded(None), start + Duration::from_millis(250), false);
        assert_eq!(status.last_load_time, Some(Duration::from_millis(250)));
    }

    #[test]
    fn play_anchors_on_last_known_position() {
        let now = Instant::now() + Duration::from_secs(100);
        let mut status = PlaybackStatus {
            position_secs: 10.0,
            ..PlaybackStatus::default()
        };
        status.apply(
            &SourceEvent::Play {
                file: None,
                duration_secs: None,
            },
            now,
            false,
        );
        assert_eq!(status.started_at, Some(now - Duration::from_secs(10)));
        let elapsed = status.elapsed_secs(now + Duration::from_secs(5));
        assert!((elapsed - 15.0).abs() < 1e-6);
    }

    #[test]
    fn info_updates_fields_without_transition() {
        let now = Instant::now();
        let mut status = PlaybackStatus::new();
        let info = SourceEvent::Info {
            playing: true,
            position_secs: 42.0,
            file: Some("other.mid".into()),
            duration_secs: Some(120.0),
        };
        assert_eq!(status.apply(&info, now, false), None);
        assert_eq!(status.state, PlaybackState::Stopped);
        assert_eq!(status.position_secs, 42.0);
        assert_eq!(status.file.as_deref(), Some("other.mid"));
        assert_eq!(status.duration_secs, 120.0);
    }

    #[test]
    fn errors_and_bursts_do_not_transition() {
        let now = Instant::now();
        let mut status = PlaybackStatus::new();
        assert_eq!(status.apply(&SourceEvent::Error("boom".into()), now, false), None);
        assert_eq!(status.apply(&SourceEvent::MidiEvents(vec![]), now, false), None);
        assert_eq!(status.state, PlaybackState::Stopped);
    }
}
