/// One-shot drum samples: WAV loading and synthesized fallbacks
use std::f32::consts::TAU;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::instrument::Instrument;

/// Rate used for synthesized samples
pub const SYNTH_SAMPLE_RATE: u32 = 44_100;

/// Mono audio, normalized to [-1, 1]
#[derive(Debug, Clone)]
pub struct Sample {
    frames: Arc<[f32]>,
    sample_rate: u32,
}

impl Sample {
    pub fn new(frames: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            frames: frames.into(),
            sample_rate,
        }
    }

    pub fn frames(&self) -> &[f32] {
        &self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Load a WAV file, downmixing to mono
    pub fn load(path: &Path) -> Result<Self> {
        let wrap = |source: hound::Error| Error::Sample {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = hound::WavReader::open(path).map_err(wrap)?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(wrap)?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(wrap)?
            }
        };

        let frames = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self::new(frames, spec.sample_rate))
    }

    /// The instrument's WAV, or a synthesized stand-in when it has none or
    /// the file cannot be read
    pub fn for_instrument(instrument: &Instrument) -> Self {
        if let Some(path) = &instrument.sample {
            match Self::load(path) {
                Ok(sample) => {
                    log::info!("Loaded '{}' from {}", instrument.name, path.display());
                    return sample;
                }
                Err(e) => log::warn!("'{}': {}, using synthesized sound", instrument.name, e),
            }
        }
        DrumPreset::for_note(instrument.midi_note).render(SYNTH_SAMPLE_RATE)
    }
}

/// Parameters for a synthesized percussive hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrumPreset {
    pub freq: f32,
    /// Extra Hz at the start of the hit, decaying away
    pub pitch_sweep: f32,
    /// 0 = pure tone, 1 = pure noise
    pub noise: f32,
    /// Seconds to fall to roughly -60 dB
    pub decay: f32,
}

impl DrumPreset {
    pub const KICK: Self = Self { freq: 55.0, pitch_sweep: 200.0, noise: 0.05, decay: 0.35 };
    pub const SNARE: Self = Self { freq: 180.0, pitch_sweep: 80.0, noise: 0.6, decay: 0.2 };
    pub const HAT: Self = Self { freq: 800.0, pitch_sweep: 0.0, noise: 0.95, decay: 0.08 };
    pub const CRASH: Self = Self { freq: 500.0, pitch_sweep: 0.0, noise: 0.9, decay: 1.2 };
    pub const CLAP: Self = Self { freq: 400.0, pitch_sweep: 50.0, noise: 0.8, decay: 0.12 };
    pub const TOM: Self = Self { freq: 100.0, pitch_sweep: 150.0, noise: 0.1, decay: 0.25 };
    pub const BLIP: Self = Self { freq: 600.0, pitch_sweep: 100.0, noise: 0.3, decay: 0.06 };

    /// Closest preset for a General MIDI percussion note
    pub fn for_note(note: u8) -> Self {
        match note {
            35 | 36 => Self::KICK,
            38 | 40 => Self::SNARE,
            42 | 44 | 46 => Self::HAT,
            49 | 52 | 55 | 57 => Self::CRASH,
            39 => Self::CLAP,
            41 | 43 | 45 | 47 | 48 | 50 => Self::TOM,
            _ => Self::BLIP,
        }
    }

    pub fn render(&self, sample_rate: u32) -> Sample {
        let rate = sample_rate as f32;
        let len = (self.decay * rate).ceil() as usize;
        // e^-6.9 ~ 0.001
        let amp_k = (-6.9 / (self.decay * rate)).exp();
        let pitch_k = (-6.9 / (0.05 * rate)).exp();

        let mut frames = Vec::with_capacity(len);
        let mut phase = 0.0_f32;
        let mut env = 1.0_f32;
        let mut pitch_env = 1.0_f32;
        let mut noise_state: u32 = 0x1234_5678;

        for _ in 0..len {
            let osc = (phase * TAU).sin();
            phase = (phase + (self.freq + self.pitch_sweep * pitch_env) / rate).fract();

            noise_state = noise_state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let noise = (noise_state as f32 / u32::MAX as f32) * 2.0 - 1.0;

            frames.push((osc * (1.0 - self.noise) + noise * self.noise) * env);
            env *= amp_k;
            pitch_env *= pitch_k;
        }

        Sample::new(frames, sample_rate)
    }
}
