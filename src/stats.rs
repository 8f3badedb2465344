use crate::timing::PlaybackState;
use std::time::Duration;

pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms);
    }
    let total_secs = ms / 1000;
    if total_secs < 60 {
        return format!("{}s", total_secs);
    }
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if seconds == 0 {
        format!("{} min", minutes)
    } else {
        format!("{} min {}s", minutes, seconds)
    }
}

/// Player times arrive either in seconds or in milliseconds; anything
/// above 1000 is taken as milliseconds.
pub fn format_player_time(raw: f64) -> String {
    if !raw.is_finite() || raw <= 0.0 {
        return "0s".into();
    }
    let ms = if raw > 1000.0 { raw } else { raw * 1000.0 };
    format_duration_ms(ms.round() as u64)
}

/// Telemetry copy of the engine state, published for readers outside
/// the engine thread.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub state: PlaybackState,
    pub file: Option<String>,
    pub elapsed_secs: f64,
    pub duration_secs: f64,
    pub nps: f64,
    pub notes_played: u64,
    pub deblack: bool,
    pub sustain: bool,
    pub uptime: Duration,
}

impl StatusSnapshot {
    pub fn render(&self, template: &str) -> String {
        let file = self
            .file
            .as_deref()
            .map(|f| {
                std::path::Path::new(f)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| f.to_string())
            })
            .unwrap_or_else(|| "none".into());

        template
            .replace("{state}", self.state.as_str())
            .replace("{file}", &file)
            .replace("{elapsed}", &format_player_time(self.elapsed_secs))
            .replace("{duration}", &format_player_time(self.duration_secs))
            .replace("{nps}", &format!("{:.0}", self.nps))
            .replace("{notes}", &self.notes_played.to_string())
            .replace("{uptime}", &format_duration_ms(self.uptime.as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(format_duration_ms(0), "0ms");
        assert_eq!(format_duration_ms(999), "999ms");
        assert_eq!(format_duration_ms(45_500), "45s");
        assert_eq!(format_duration_ms(120_000), "2 min");
        assert_eq!(format_duration_ms(125_000), "2 min 5s");
    }

    #[test]
    fn player_time_guesses_the_unit() {
        assert_eq!(format_player_time(30.0), "30s");
        assert_eq!(format_player_time(90_000.0), "1 min 30s");
        assert_eq!(format_player_time(0.0), "0s");
        assert_eq!(format_player_time(f64::NAN), "0s");
    }

    #[test]
    fn renders_template() {
        let snapshot = StatusSnapshot {
            state: PlaybackState::Playing,
            file: Some("midi/etude.mid".into()),
            elapsed_secs: 65.0,
            duration_secs: 200.0,
            nps: 41.6,
            notes_played: 1234,
            ..StatusSnapshot::default()
        };
        assert_eq!(
            snapshot.render("[{state}] {file} {elapsed}/{duration} | {nps} nps | {notes}"),
            "[playing] etude.mid 1 min 5s/3 min 20s | 42 nps | 1234"
        );
    }

    #[test]
    fn missing_file_renders_none() {
        let snapshot = StatusSnapshot::default();
        assert_eq!(snapshot.render("{file} {state}"), "none stopped");
    }
}
