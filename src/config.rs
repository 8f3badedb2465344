use crate::color::{AnimationMode, ColorMode, ColorScheme, DARK_PALETTE, LIGHT_PALETTE, Rgb};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display name every actor announces
    pub name: String,
    pub actors: Vec<ActorConfig>,
    pub quota: QuotaConfig,
    pub keyboard: KeyboardConfig,
    pub deblack: bool,
    pub sustain: bool,
    /// Route manual notes by pitch band instead of round-robin
    pub pitch_consistent_manual: bool,
    /// Multiplier applied to the NPS meter once per second
    pub nps_decay: f64,
    pub fast_load: bool,
    /// Directory `load` resolves relative file names against
    pub midi_dir: PathBuf,
    pub color: ColorConfig,
    pub cursor: Option<CursorConfig>,
    pub stats: Option<StatsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "manyhands".into(),
            actors: vec![ActorConfig::default(), ActorConfig::default()],
            quota: QuotaConfig::default(),
            keyboard: KeyboardConfig::default(),
            deblack: false,
            sustain: false,
            pitch_consistent_manual: false,
            nps_decay: 0.85,
            fast_load: false,
            midi_dir: PathBuf::from("midi"),
            color: ColorConfig::default(),
            cursor: None,
            stats: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    pub color: Rgb,
    pub mode: ColorMode,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            color: Rgb::new(0x1e, 0x90, 0xff),
            mode: ColorMode::Normal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Points available per window
    pub capacity: f64,
    pub window_ms: u64,
    /// Minimum balance for a batch to pass
    pub threshold: f64,
}

impl QuotaConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            capacity: 1200.0,
            window_ms: 6000,
            threshold: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    pub first_note: u8,
    pub key_count: usize,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            first_note: 0,
            key_count: 128,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveTuning {
    /// NPS at which the color timer reaches `floor_ms`
    pub ceiling_nps: f64,
    pub floor_ms: u64,
    pub idle_ms: u64,
    /// Interval changes up to this size keep the running timer
    pub hysteresis_ms: u64,
    /// Below this NPS the animation halts
    pub idle_threshold: f64,
}

impl Default for ReactiveTuning {
    fn default() -> Self {
        Self {
            ceiling_nps: 20.0,
            floor_ms: 50,
            idle_ms: 2000,
            hysteresis_ms: 20,
            idle_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub mode: AnimationMode,
    pub scheme: ColorScheme,
    /// Overrides the dark palette when non-empty
    pub palette: Vec<Rgb>,
    pub cycle_ms: u64,
    pub speed: f64,
    pub idle_color: Rgb,
    pub reactive: ReactiveTuning,
}

impl ColorConfig {
    pub fn resolved_palette(&self) -> Vec<Rgb> {
        match self.scheme {
            ColorScheme::Light => LIGHT_PALETTE.to_vec(),
            ColorScheme::Dark if !self.palette.is_empty() => self.palette.clone(),
            ColorScheme::Dark => DARK_PALETTE.to_vec(),
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            mode: AnimationMode::Global,
            scheme: ColorScheme::Dark,
            palette: Vec::new(),
            cycle_ms: 2000,
            speed: 1.0,
            idle_color: Rgb::new(0x80, 0x80, 0x80),
            reactive: ReactiveTuning::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    pub interval_ms: u64,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self { interval_ms: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub interval_ms: u64,
    /// Placeholders: {state} {file} {elapsed} {duration} {nps} {notes} {uptime}
    pub template: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            template: "[{state}] {file} {elapsed}/{duration} | {nps} nps".into(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Config = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.actors.is_empty() {
            return Err(ConfigError::Invalid("at least one actor is required".into()));
        }
        if self.quota.capacity <= 0.0 {
            return Err(ConfigError::Invalid("quota capacity must be positive".into()));
        }
        if self.quota.window_ms == 0 {
            return Err(ConfigError::Invalid("quota window must be positive".into()));
        }
        if self.keyboard.key_count == 0 || self.keyboard.first_note > 127 {
            return Err(ConfigError::Invalid("keyboard range is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.nps_decay) {
            return Err(ConfigError::Invalid("nps_decay must be within 0.0 -> 1.0".into()));
        }
        if self.color.resolved_palette().is_empty() {
            return Err(ConfigError::Invalid("color palette is empty".into()));
        }
        if self.color.cycle_ms == 0 {
            return Err(ConfigError::Invalid("color cycle must be positive".into()));
        }
        if self.color.reactive.ceiling_nps <= 0.0 {
            return Err(ConfigError::Invalid("reactive ceiling_nps must be positive".into()));
        }
        if self.color.reactive.floor_ms == 0 || self.color.reactive.idle_ms == 0 {
            return Err(ConfigError::Invalid("reactive intervals must be positive".into()));
        }
        if self.cursor.as_ref().is_some_and(|c| c.interval_ms == 0) {
            return Err(ConfigError::Invalid("cursor interval must be positive".into()));
        }
        if self.stats.as_ref().is_some_and(|s| s.interval_ms == 0) {
            return Err(ConfigError::Invalid("stats interval must be positive".into()));
        }
        Ok(())
    }

    /// Resolves a user-supplied file name against `midi_dir`.
    pub fn midi_path(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.midi_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_ron("()").unwrap();
        assert_eq!(config.actors.len(), 2);
        assert_eq!(config.quota.window_ms, 6000);
        assert_eq!(config.keyboard.key_count, 128);
        assert_eq!(config.color.mode, AnimationMode::Global);
        assert_eq!(config.nps_decay, 0.85);
    }

    #[test]
    fn parses_actor_colors_and_modes() {
        let config = Config::from_ron(
            r##"(
                name: "duo",
                actors: [
                    (color: "#ff0000", mode: rainbow),
                    (color: "00ff00", mode: animated),
                ],
                quota: (capacity: 60.0, window_ms: 1000, threshold: 1.0),
                color: (mode: reactive, scheme: light),
                cursor: Some((interval_ms: 30)),
            )"##,
        )
        .unwrap();

        assert_eq!(config.name, "duo");
        assert_eq!(config.actors[0].color, Rgb::new(255, 0, 0));
        assert_eq!(config.actors[0].mode, ColorMode::Rainbow);
        assert_eq!(config.actors[1].mode, ColorMode::Animated);
        assert_eq!(config.color.mode, AnimationMode::Reactive);
        assert_eq!(config.color.resolved_palette(), LIGHT_PALETTE.to_vec());
        assert_eq!(config.cursor.unwrap().interval_ms, 30);
    }

    #[test]
    fn unknown_animation_mode_is_fatal() {
        let err = Config::from_ron("(color: (mode: sparkle))").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn bad_color_is_fatal() {
        let err = Config::from_ron(r##"(actors: [(color: "#12")])"##).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_empty_pool_and_empty_budget() {
        assert!(matches!(
            Config::from_ron("(actors: [])").unwrap_err(),
            ConfigError::Invalid(_)
        ));
        assert!(matches!(
            Config::from_ron("(quota: (window_ms: 0))").unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn rejects_zero_reactive_intervals() {
        assert!(matches!(
            Config::from_ron("(color: (mode: reactive, reactive: (floor_ms: 0)))").unwrap_err(),
            ConfigError::Invalid(_)
        ));
        assert!(matches!(
            Config::from_ron("(color: (reactive: (idle_ms: 0)))").unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn custom_dark_palette_overrides_builtin() {
        let config = Config::from_ron(r##"(color: (palette: ["#010203", "#040506"]))"##).unwrap();
        assert_eq!(
            config.color.resolved_palette(),
            vec![Rgb::new(1, 2, 3), Rgb::new(4, 5, 6)]
        );
    }

    #[test]
    fn midi_path_joins_relative_names() {
        let config = Config {
            midi_dir: PathBuf::from("/songs"),
            ..Config::default()
        };
        assert_eq!(config.midi_path("a.mid"), PathBuf::from("/songs/a.mid"));
        assert_eq!(config.midi_path("/tmp/b.mid"), PathBuf::from("/tmp/b.mid"));
    }
}
