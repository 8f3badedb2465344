use super::{MidiSource, SourceError};
use crate::events::{NoteEvent, NoteKind, SourceCommand, SourceEvent};
use crossbeam::channel::{Receiver, RecvTimeoutError, SendError, Sender};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::Path;
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_millis(10);
const LOOKAHEAD_MS: f64 = 20.0;
const INFO_EVERY: Duration = Duration::from_secs(1);
const DEFAULT_TEMPO_US: f64 = 500_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedNote {
    pub at_ms: f64,
    pub kind: NoteKind,
    pub pitch: u8,
    pub velocity: f32,
}

/// All tracks of a file merged into one tempo-mapped timeline.
#[derive(Debug, Clone, Default)]
pub struct Song {
    pub notes: Vec<TimedNote>,
    pub duration_ms: f64,
}

enum Timed {
    Tempo(u32),
    Note(NoteKind, u8, u8),
    Other,
}

impl Song {
    pub fn parse(bytes: &[u8], mut progress: impl FnMut(f32)) -> Result<Song, SourceError> {
        let smf = Smf::parse(bytes)?;

        let track_count = smf.tracks.len().max(1);
        let mut merged: Vec<(u64, Timed)> = Vec::new();
        for (i, track) in smf.tracks.iter().enumerate() {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                let timed = match event.kind {
                    TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => Timed::Tempo(tempo.as_int()),
                    TrackEventKind::Midi { message, .. } => match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            Timed::Note(NoteKind::On, key.as_int(), vel.as_int())
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            Timed::Note(NoteKind::Off, key.as_int(), 0)
                        }
                        _ => Timed::Other,
                    },
                    _ => Timed::Other,
                };
                merged.push((tick, timed));
            }
            progress((i + 1) as f32 / track_count as f32);
        }
        merged.sort_by_key(|(tick, _)| *tick);

        let mut us_per_beat = DEFAULT_TEMPO_US;
        let us_per_tick = |us_per_beat: f64| match smf.header.timing {
            Timing::Metrical(tpb) => us_per_beat / tpb.as_int().max(1) as f64,
            Timing::Timecode(fps, subframe) => 1_000_000.0 / (fps.as_f32() as f64 * subframe.max(1) as f64),
        };

        let mut notes = Vec::new();
        let mut last_tick = 0u64;
        let mut elapsed_us = 0.0;
        for (tick, timed) in merged {
            elapsed_us += (tick - last_tick) as f64 * us_per_tick(us_per_beat);
            last_tick = tick;
            match timed {
                Timed::Tempo(tempo) => us_per_beat = tempo as f64,
                Timed::Note(kind, pitch, vel) => notes.push(TimedNote {
                    at_ms: elapsed_us / 1000.0,
                    kind,
                    pitch,
                    velocity: vel as f32 / 127.0,
                }),
                Timed::Other => {}
            }
        }

        Ok(Song {
            notes,
            duration_ms: elapsed_us / 1000.0,
        })
    }
}

/// Plays Standard MIDI Files in real time, emitting bursts of notes with
/// delays relative to each emission.
#[derive(Default)]
pub struct SmfPlayer {
    song: Option<Song>,
    file: Option<String>,
    playing: bool,
    position_ms: f64,
    cursor: usize,
    last_advance: Option<Instant>,
    last_info: Option<Instant>,
}

type Sent = Result<(), SendError<SourceEvent>>;

impl SmfPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_song(song: Song, file: impl Into<String>) -> Self {
        Self {
            song: Some(song),
            file: Some(file.into()),
            ..Self::default()
        }
    }

    fn duration_secs(&self) -> Option<f64> {
        self.song.as_ref().map(|s| s.duration_ms / 1000.0)
    }

    /// Notes due within the lookahead, delays relative to the position.
    fn collect_due(&mut self) -> Vec<NoteEvent> {
        let Some(song) = &self.song else {
            return Vec::new();
        };
        let horizon = self.position_ms + LOOKAHEAD_MS;
        let mut burst = Vec::new();
        while let Some(note) = song.notes.get(self.cursor) {
            if note.at_ms >= horizon {
                break;
            }
            burst.push(NoteEvent {
                kind: note.kind,
                pitch: note.pitch,
                velocity: note.velocity,
                delay: (note.at_ms - self.position_ms).max(0.0).round() as u64,
            });
            self.cursor += 1;
        }
        burst
    }

    fn finished(&self) -> bool {
        self.song
            .as_ref()
            .is_none_or(|s| self.cursor >= s.notes.len() && self.position_ms >= s.duration_ms)
    }

    fn rewind(&mut self) {
        self.playing = false;
        self.position_ms = 0.0;
        self.cursor = 0;
        self.last_advance = None;
    }

    fn load(&mut self, path: &Path, fast: bool, events: &Sender<SourceEvent>) -> Sent {
        self.rewind();
        events.send(SourceEvent::LoadingStarted)?;
        let started = Instant::now();

        let song = std::fs::read(path)
            .map_err(SourceError::from)
            .and_then(|bytes| {
                Song::parse(&bytes, |ratio| {
                    if !fast {
                        let _ = events.send(SourceEvent::LoadingProgress(ratio));
                    }
                })
            });

        match song {
            Ok(song) => {
                tracing::info!(path = %path.display(), notes = song.notes.len(), "midi file loaded");
                self.song = Some(song);
                self.file = Some(path.display().to_string());
                events.send(SourceEvent::Loaded {
                    load_ms: Some(started.elapsed().as_millis() as u64),
                    file: self.file.clone(),
                    duration_secs: self.duration_secs(),
                })
            }
            Err(e) => events.send(SourceEvent::Error(e.to_string())),
        }
    }

    fn handle(&mut self, command: SourceCommand, events: &Sender<SourceEvent>) -> Sent {
        match command {
            SourceCommand::Load { path, fast } => self.load(&path, fast, events),
            SourceCommand::Play => {
                if self.song.is_none() {
                    return events.send(SourceEvent::Error(SourceError::NothingLoaded.to_string()));
                }
                self.playing = true;
                self.last_advance = Some(Instant::now());
                events.send(SourceEvent::Play {
                    file: self.file.clone(),
                    duration_secs: self.duration_secs(),
                })
            }
            SourceCommand::Pause => {
                if !self.playing {
                    return Ok(());
                }
                self.advance(Instant::now());
                self.playing = false;
                events.send(SourceEvent::Pause)
            }
            SourceCommand::Stop => {
                self.rewind();
                events.send(SourceEvent::Stop)
            }
        }
    }

    fn advance(&mut self, now: Instant) {
        if let Some(last) = self.last_advance {
            self.position_ms += now.saturating_duration_since(last).as_secs_f64() * 1000.0;
        }
        self.last_advance = Some(now);
    }

    fn pump(&mut self, events: &Sender<SourceEvent>) -> Sent {
        let now = Instant::now();
        if self.playing {
            self.advance(now);
            let burst = self.collect_due();
            if !burst.is_empty() {
                events.send(SourceEvent::MidiEvents(burst))?;
            }
            if self.finished() {
                self.rewind();
                events.send(SourceEvent::Stop)?;
            }
        }

        if self.last_info.is_none_or(|last| now.duration_since(last) >= INFO_EVERY) {
            self.last_info = Some(now);
            events.send(SourceEvent::Info {
                playing: self.playing,
                position_secs: self.position_ms / 1000.0,
                file: self.file.clone(),
                duration_secs: self.duration_secs(),
            })?;
        }
        Ok(())
    }
}

impl MidiSource for SmfPlayer {
    fn run(mut self: Box<Self>, commands: Receiver<SourceCommand>, events: Sender<SourceEvent>) {
        loop {
            let timeout = if self.playing { FRAME } else { INFO_EVERY };
            let sent = match commands.recv_timeout(timeout) {
                Ok(command) => self.handle(command, &events),
                Err(RecvTimeoutError::Timeout) => Ok(()),
                Err(RecvTimeoutError::Disconnected) => return,
            };
            if sent.and_then(|_| self.pump(&events)).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceLink;

    /// Format 0, 96 ticks per beat, 120 bpm: C3 on at 0, off at one beat,
    /// D3 "on" with velocity 0 at the same time, end of track a beat later.
    fn tiny_smf() -> Vec<u8> {
        let mut bytes = b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x00\x60".to_vec();
        let track: &[u8] = &[
            0x00, 0xff, 0x51, 0x03, 0x07, 0xa1, 0x20, // tempo 500000
            0x00, 0x90, 0x3c, 0x40, // on 60
            0x60, 0x80, 0x3c, 0x00, // off 60
            0x00, 0x90, 0x3e, 0x00, // on 62 vel 0
            0x60, 0xff, 0x2f, 0x00, // end of track
        ];
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(track);
        bytes
    }

    #[test]
    fn builds_tempo_mapped_timeline() {
        let mut reported = Vec::new();
        let song = Song::parse(&tiny_smf(), |r| reported.push(r)).unwrap();

        assert_eq!(reported, vec![1.0]);
        assert_eq!(song.notes.len(), 3);
        assert_eq!(song.notes[0].kind, NoteKind::On);
        assert_eq!(song.notes[0].pitch, 60);
        assert!((song.notes[0].velocity - 64.0 / 127.0).abs() < 1e-6);
        assert_eq!(song.notes[1].kind, NoteKind::Off);
        assert!((song.notes[1].at_ms - 500.0).abs() < 1e-6);
        assert_eq!(song.notes[2].kind, NoteKind::Off);
        assert_eq!(song.notes[2].pitch, 62);
        assert!((song.duration_ms - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Song::parse(b"not a midi file", |_| {}),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn bursts_carry_relative_delays() {
        let song = Song::parse(&tiny_smf(), |_| {}).unwrap();
        let mut player = SmfPlayer::with_song(song, "tiny.mid");

        let first = player.collect_due();
        assert_eq!(first, vec![NoteEvent::on(60, 64.0 / 127.0, 0)]);
        assert!(player.collect_due().is_empty());

        player.position_ms = 490.0;
        let second = player.collect_due();
        assert_eq!(second, vec![NoteEvent::off(60, 10), NoteEvent::off(62, 10)]);
        assert!(!player.finished());

        player.position_ms = 1000.0;
        assert!(player.finished());
    }

    #[test]
    fn plays_a_file_to_the_end() {
        let path = std::env::temp_dir().join(format!("manyhands-{}.mid", std::process::id()));
        std::fs::write(&path, tiny_smf()).unwrap();

        let link = SourceLink::spawn(Box::new(SmfPlayer::new())).unwrap();
        link.send(SourceCommand::Load {
            path: path.clone(),
            fast: true,
        });
        link.send(SourceCommand::Play);

        let mut seen = Vec::new();
        while let Ok(event) = link.event_rx.recv_timeout(Duration::from_secs(5)) {
            let done = event == SourceEvent::Stop;
            seen.push(event);
            if done {
                break;
            }
        }
        let _ = std::fs::remove_file(&path);

        assert_eq!(seen.first(), Some(&SourceEvent::LoadingStarted));
        assert!(seen.iter().any(|e| matches!(e, SourceEvent::Loaded { .. })));
        assert!(!seen.iter().any(|e| matches!(e, SourceEvent::LoadingProgress(_))));
        let notes: Vec<NoteEvent> = seen
            .iter()
            .filter_map(|e| match e {
                SourceEvent::MidiEvents(burst) => Some(burst.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(notes.len(), 3);
        assert_eq!(seen.last(), Some(&SourceEvent::Stop));
    }

    #[test]
    fn play_without_file_reports_an_error() {
        let link = SourceLink::spawn(Box::new(SmfPlayer::new())).unwrap();
        link.send(SourceCommand::Play);
        let event = link.event_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, SourceEvent::Error("no file loaded".into()));
    }
}
