/// Names for all 128 MIDI notes, `c-2` is note 0.
const KEY_NAMES: [&str; 128] = [
    "c-2", "cs-2", "d-2", "ds-2", "e-2", "f-2", "fs-2", "g-2", "gs-2", "a-2", "as-2", "b-2",
    "c-1", "cs-1", "d-1", "ds-1", "e-1", "f-1", "fs-1", "g-1", "gs-1", "a-1", "as-1", "b-1",
    "c0", "cs0", "d0", "ds0", "e0", "f0", "fs0", "g0", "gs0", "a0", "as0", "b0",
    "c1", "cs1", "d1", "ds1", "e1", "f1", "fs1", "g1", "gs1", "a1", "as1", "b1",
    "c2", "cs2", "d2", "ds2", "e2", "f2", "fs2", "g2", "gs2", "a2", "as2", "b2",
    "c3", "cs3", "d3", "ds3", "e3", "f3", "fs3", "g3", "gs3", "a3", "as3", "b3",
    "c4", "cs4", "d4", "ds4", "e4", "f4", "fs4", "g4", "gs4", "a4", "as4", "b4",
    "c5", "cs5", "d5", "ds5", "e5", "f5", "fs5", "g5", "gs5", "a5", "as5", "b5",
    "c6", "cs6", "d6", "ds6", "e6", "f6", "fs6", "g6", "gs6", "a6", "as6", "b6",
    "c7", "cs7", "d7", "ds7", "e7", "f7", "fs7", "g7", "gs7", "a7", "as7", "b7",
    "c8", "cs8", "d8", "ds8", "e8", "f8", "fs8", "g8",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    /// Position on the instrument, 0 is the lowest key
    pub index: usize,
    pub name: &'static str,
}

/// A contiguous run of instrument keys starting at `first_note`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyboard {
    first_note: u8,
    len: usize,
}

impl Keyboard {
    pub fn new(first_note: u8, len: usize) -> Self {
        let len = len.min(KEY_NAMES.len().saturating_sub(first_note as usize));
        Self { first_note, len }
    }

    pub fn full() -> Self {
        Self::new(0, KEY_NAMES.len())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn key_of(&self, pitch: u8) -> Option<Key> {
        let index = (pitch as usize).checked_sub(self.first_note as usize)?;
        if index >= self.len {
            return None;
        }
        Some(Key {
            index,
            name: KEY_NAMES[pitch as usize],
        })
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::full()
    }
}

/// Exponentially decayed notes-per-second estimate.
#[derive(Debug, Clone)]
pub struct NpsMeter {
    value: f64,
    decay: f64,
}

impl NpsMeter {
    pub fn new(decay: f64) -> Self {
        Self {
            value: 0.0,
            decay: decay.clamp(0.0, 1.0),
        }
    }

    pub fn record(&mut self) {
        self.value += 1.0;
    }

    /// Once per second.
    pub fn decay(&mut self) {
        self.value *= self.decay;
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Per-key press state plus the sustain and deblack filters.
#[derive(Debug, Clone)]
pub struct KeyState {
    pressed: Vec<bool>,
    sustain: bool,
    deblack: bool,
    nps: NpsMeter,
    notes_played: u64,
}

impl KeyState {
    pub fn new(keyboard: &Keyboard, nps_decay: f64) -> Self {
        Self {
            pressed: vec![false; keyboard.len()],
            sustain: false,
            deblack: false,
            nps: NpsMeter::new(nps_decay),
            notes_played: 0,
        }
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.pressed.get(key.index).copied().unwrap_or(false)
    }

    /// Returns false when the deblack gate suppresses the note. Quiet notes
    /// lose to the budget's fill ratio.
    pub fn note_on(&mut self, key: Key, velocity: f32, fill_ratio: f64) -> bool {
        if self.deblack && (velocity as f64) < fill_ratio {
            return false;
        }
        let Some(pressed) = self.pressed.get_mut(key.index) else {
            return false;
        };
        *pressed = true;
        self.nps.record();
        self.notes_played += 1;
        true
    }

    /// Returns false when sustain holds the key or it is not pressed.
    pub fn note_off(&mut self, key: Key) -> bool {
        if self.sustain {
            return false;
        }
        match self.pressed.get_mut(key.index) {
            Some(pressed) if *pressed => {
                *pressed = false;
                true
            }
            _ => false,
        }
    }

    pub fn sustain(&self) -> bool {
        self.sustain
    }

    pub fn set_sustain(&mut self, on: bool) {
        self.sustain = on;
    }

    pub fn toggle_sustain(&mut self) -> bool {
        self.sustain = !self.sustain;
        self.sustain
    }

    pub fn deblack(&self) -> bool {
        self.deblack
    }

    pub fn set_deblack(&mut self, on: bool) {
        self.deblack = on;
    }

    pub fn toggle_deblack(&mut self) -> bool {
        self.deblack = !self.deblack;
        self.deblack
    }

    pub fn nps(&self) -> f64 {
        self.nps.value()
    }

    pub fn decay_nps(&mut self) {
        self.nps.decay();
    }

    pub fn notes_played(&self) -> u64 {
        self.notes_played
    }
}
