use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::instrument::{default_kit, Instrument};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

pub const DEFAULT_FRAME_RATE: u32 = 144;
pub const DEFAULT_TEMPO_BPM: u32 = 240;
pub const DEFAULT_BEAT_COUNT: usize = 8;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    transport: TransportSection,
    #[serde(default)]
    grid: GridSection,
    #[serde(default)]
    midi: MidiSection,
    #[serde(default, rename = "instrument")]
    instruments: Option<Vec<InstrumentEntry>>,
}

#[derive(Deserialize, Default)]
struct TransportSection {
    frame_rate: Option<u32>,
    tempo_bpm: Option<u32>,
    autoplay: Option<bool>,
}

#[derive(Deserialize, Default)]
struct GridSection {
    beat_count: Option<usize>,
}

#[derive(Deserialize, Default)]
struct MidiSection {
    channel: Option<u8>,
    velocity: Option<u8>,
    port: Option<String>,
}

#[derive(Deserialize)]
struct InstrumentEntry {
    name: String,
    midi_note: u8,
    sample: Option<PathBuf>,
}

/// Everything needed to build a [`crate::Sequencer`]
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub frame_rate: u32,
    pub tempo_bpm: u32,
    pub beat_count: usize,
    /// Initial transport state: playing when true, paused otherwise
    pub autoplay: bool,
    pub instruments: Vec<Instrument>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            tempo_bpm: DEFAULT_TEMPO_BPM,
            beat_count: DEFAULT_BEAT_COUNT,
            autoplay: false,
            instruments: default_kit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiConfig {
    /// 1-based MIDI channel
    pub channel: u8,
    pub velocity: u8,
    /// Substring of the output port name to auto-connect to
    pub port: Option<String>,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            channel: 10,
            velocity: 100,
            port: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sequencer: SequencerConfig,
    pub midi: MidiConfig,
}

impl Config {
    /// Embedded defaults overlaid with a user file.
    ///
    /// An explicit `path` must exist and parse. Without one, the per-user
    /// config is used when present and skipped with a warning when broken.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut base = parse(DEFAULT_CONFIG, Path::new("<embedded config.toml>"), None)?;

        match path {
            Some(path) => {
                let user = read_file(path)?;
                merge(&mut base, user);
            }
            None => {
                if let Some(path) = user_config_path() {
                    overlay_user_file(&mut base, &path);
                }
            }
        }

        build(base)
    }

    /// Parse a TOML document over the embedded defaults. Relative sample
    /// paths resolve against `base_dir`.
    pub fn from_toml_str(contents: &str, base_dir: &Path) -> Result<Self> {
        let mut base = parse(DEFAULT_CONFIG, Path::new("<embedded config.toml>"), None)?;
        let user = parse(contents, Path::new("<string>"), Some(base_dir))?;
        merge(&mut base, user);
        build(base)
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("beatgrid").join("config.toml"))
}

/// Merge an optional per-user file. Missing is fine; unreadable or
/// malformed is logged and skipped.
fn overlay_user_file(base: &mut ConfigFile, path: &Path) {
    if !path.exists() {
        return;
    }
    match read_file(path) {
        Ok(user) => {
            log::info!(target: "config", "using {}", path.display());
            merge(base, user);
        }
        Err(e) => {
            log::warn!(target: "config", "ignoring config {}: {}", path.display(), e)
        }
    }
}

fn read_file(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, path, path.parent())
}

fn parse(contents: &str, origin: &Path, base_dir: Option<&Path>) -> Result<ConfigFile> {
    let mut file: ConfigFile = toml::from_str(contents).map_err(|source| Error::ConfigParse {
        path: origin.to_path_buf(),
        source,
    })?;

    if let Some(dir) = base_dir {
        for entry in file.instruments.iter_mut().flatten() {
            if let Some(sample) = entry.sample.as_mut() {
                if sample.is_relative() {
                    *sample = dir.join(&*sample);
                }
            }
        }
    }
    Ok(file)
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    let t = user.transport;
    base.transport.frame_rate = t.frame_rate.or(base.transport.frame_rate);
    base.transport.tempo_bpm = t.tempo_bpm.or(base.transport.tempo_bpm);
    base.transport.autoplay = t.autoplay.or(base.transport.autoplay);

    base.grid.beat_count = user.grid.beat_count.or(base.grid.beat_count);

    let m = user.midi;
    base.midi.channel = m.channel.or(base.midi.channel);
    base.midi.velocity = m.velocity.or(base.midi.velocity);
    base.midi.port = m.port.or(base.midi.port.take());

    // An instrument list is replaced wholesale, never merged row by row
    if user.instruments.is_some() {
        base.instruments = user.instruments;
    }
}

fn build(file: ConfigFile) -> Result<Config> {
    let fallback = SequencerConfig::default();
    let instruments = match file.instruments {
        None => fallback.instruments,
        Some(entries) if entries.is_empty() => {
            return Err(Error::InvalidConfiguration(
                "instrument list is empty".into(),
            ));
        }
        Some(entries) => entries
            .into_iter()
            .enumerate()
            .map(|(id, entry)| Instrument {
                id,
                name: entry.name,
                midi_note: entry.midi_note,
                sample: entry.sample,
            })
            .collect(),
    };

    for instrument in &instruments {
        if instrument.midi_note > 127 {
            return Err(Error::InvalidConfiguration(format!(
                "instrument '{}' has MIDI note {} (expected 0-127)",
                instrument.name, instrument.midi_note
            )));
        }
    }

    let midi_fallback = MidiConfig::default();
    let midi = MidiConfig {
        channel: file.midi.channel.unwrap_or(midi_fallback.channel),
        velocity: file.midi.velocity.unwrap_or(midi_fallback.velocity),
        port: file.midi.port,
    };
    if !(1..=16).contains(&midi.channel) {
        return Err(Error::InvalidConfiguration(format!(
            "MIDI channel {} (expected 1-16)",
            midi.channel
        )));
    }
    if !(1..=127).contains(&midi.velocity) {
        return Err(Error::InvalidConfiguration(format!(
            "MIDI velocity {} (expected 1-127)",
            midi.velocity
        )));
    }

    Ok(Config {
        sequencer: SequencerConfig {
            frame_rate: file.transport.frame_rate.unwrap_or(fallback.frame_rate),
            tempo_bpm: file.transport.tempo_bpm.unwrap_or(fallback.tempo_bpm),
            beat_count: file.grid.beat_count.unwrap_or(fallback.beat_count),
            autoplay: file.transport.autoplay.unwrap_or(fallback.autoplay),
            instruments,
        },
        midi,
    })
}
