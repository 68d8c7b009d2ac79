/// beatgrid - a grid step sequencer ("beat maker") library
///
/// This library provides the core components for building a beat maker:
/// - Instrument x beat grid of armed slots
/// - Frame-driven sequencer engine that quantizes ticks into beats
/// - Host loop that ticks the engine at a fixed frame rate
/// - Sample playback and MIDI output for trigger events
/// - TOML configuration

pub mod audio;
pub mod config;
pub mod error;
pub mod instrument;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioHandle, AudioOutput, Mixer, Sample};
pub use config::{Config, MidiConfig, SequencerConfig};
pub use error::{Error, Result};
pub use instrument::{Instrument, InstrumentId};
pub use midi::{midi_note_name, MidiOutputDevice};
pub use sequencer::playback::{PlaybackEngine, PlaybackEvent, TriggerSink};
pub use sequencer::{BeatAdvance, GridState, Sequencer, SequencerEngine, TransportState};
