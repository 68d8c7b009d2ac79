/// Instrument reference data. The sequencer reads it, never mutates it.
use std::path::PathBuf;

/// Row index of an instrument in the grid
pub type InstrumentId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub id: InstrumentId,
    pub name: String,
    /// General MIDI percussion note sent on trigger
    pub midi_note: u8,
    /// WAV file to play; a synthesized fallback is used when absent
    pub sample: Option<PathBuf>,
}

impl Instrument {
    pub fn new(id: InstrumentId, name: impl Into<String>, midi_note: u8) -> Self {
        Self {
            id,
            name: name.into(),
            midi_note,
            sample: None,
        }
    }

    pub fn with_sample(mut self, path: impl Into<PathBuf>) -> Self {
        self.sample = Some(path.into());
        self
    }
}

/// The stock six-piece kit
pub fn default_kit() -> Vec<Instrument> {
    [
        ("Hi Hat", 42),
        ("Snare", 38),
        ("Bass drum", 36),
        ("Crash", 49),
        ("Clap", 39),
        ("Floor Tom", 41),
    ]
    .into_iter()
    .enumerate()
    .map(|(id, (name, note))| Instrument::new(id, name, note))
    .collect()
}
