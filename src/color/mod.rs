mod animator;

pub use animator::{AnimationMode, ColorAnimator, ColorAssignment, ReactiveAction};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn parse(hex: &str) -> Result<Self, String> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(format!("invalid color '{}'", hex));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| format!("invalid color '{}'", hex))
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    /// Linear interpolation, `t` in 0.0 -> 1.0
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let mix = |a: u8, b: u8| {
            let v = a as f64 + (b as f64 - a as f64) * t;
            v.round().clamp(0.0, 255.0) as u8
        };
        Rgb {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::parse(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Normal,
    Rainbow,
    Animated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Dark,
    Light,
}

pub const DARK_PALETTE: [Rgb; 8] = [
    Rgb::new(0x6b, 0x00, 0x00),
    Rgb::new(0x7a, 0x3e, 0x00),
    Rgb::new(0x6b, 0x6b, 0x00),
    Rgb::new(0x00, 0x64, 0x00),
    Rgb::new(0x00, 0x33, 0x66),
    Rgb::new(0x3b, 0x1f, 0x6b),
    Rgb::new(0x2b, 0x2b, 0x2b),
    Rgb::new(0x11, 0x11, 0x11),
];

pub const LIGHT_PALETTE: [Rgb; 8] = [
    Rgb::new(0xff, 0xcc, 0xcc),
    Rgb::new(0xff, 0xe5, 0xb4),
    Rgb::new(0xff, 0xff, 0xcc),
    Rgb::new(0xcc, 0xff, 0xcc),
    Rgb::new(0xd0, 0xf0, 0xfd),
    Rgb::new(0xcc, 0xcc, 0xff),
    Rgb::new(0xb0, 0xc4, 0xde),
    Rgb::new(0xe6, 0xcc, 0xff),
];

/// An ordered color loop with a continuously advancing phase.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<Rgb>,
    phase: f64,
    cursor: usize,
}

impl Palette {
    /// `colors` must not be empty; config validation guarantees it.
    pub fn new(colors: Vec<Rgb>) -> Self {
        Self {
            colors,
            phase: 0.0,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Advances the phase by `delta` palette entries, wrapping modulo length.
    pub fn advance(&mut self, delta: f64) {
        let len = self.colors.len() as f64;
        if len == 0.0 {
            return;
        }
        self.phase = (self.phase + delta).rem_euclid(len);
    }

    /// Color between the two entries bracketing `phase`.
    pub fn sample(&self, phase: f64) -> Rgb {
        let len = self.colors.len();
        if len == 0 {
            return Rgb::default();
        }
        let p = phase.rem_euclid(len as f64);
        let i0 = p.floor() as usize % len;
        let i1 = (i0 + 1) % len;
        self.colors[i0].lerp(self.colors[i1], p - p.floor())
    }

    /// Steps the discrete cursor and returns the color it lands on.
    pub fn next_color(&mut self) -> Rgb {
        let len = self.colors.len();
        if len == 0 {
            return Rgb::default();
        }
        self.cursor = (self.cursor + 1) % len;
        self.colors[self.cursor]
    }

    /// Entry `offset` places after the discrete cursor.
    pub fn at_cursor(&self, offset: usize) -> Rgb {
        let len = self.colors.len();
        if len == 0 {
            return Rgb::default();
        }
        self.colors[(self.cursor + offset) % len]
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::new(0x80, 0x80, 0x80)
    }
}
