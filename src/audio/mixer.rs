/// Polyphonic one-shot sample mixer
use super::sample::Sample;
use crate::instrument::InstrumentId;

const MASTER_GAIN: f32 = 0.5;

#[derive(Debug, Clone)]
struct Voice {
    instrument: InstrumentId,
    /// Read position in source frames
    position: f64,
    /// Source frames per output frame
    step: f64,
}

/// Every trigger starts its own voice. Voices of the same instrument
/// overlap; nothing is stolen, a voice ends only when its sample does.
pub struct Mixer {
    samples: Vec<Sample>,
    voices: Vec<Voice>,
    output_rate: u32,
}

impl Mixer {
    /// `samples[i]` is played for instrument `i`
    pub fn new(samples: Vec<Sample>, output_rate: u32) -> Self {
        Self {
            samples,
            voices: Vec::new(),
            output_rate,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn trigger(&mut self, instrument: InstrumentId) {
        let Some(sample) = self.samples.get(instrument) else {
            log::warn!("No sample for instrument {}", instrument);
            return;
        };
        if sample.is_empty() {
            return;
        }
        self.voices.push(Voice {
            instrument,
            position: 0.0,
            step: f64::from(sample.sample_rate()) / f64::from(self.output_rate.max(1)),
        });
    }

    /// Fill interleaved `out` with `channels` channels, overwriting it
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let mut mix = 0.0_f32;
            for voice in &mut self.voices {
                let frames = self.samples[voice.instrument].frames();
                // nearest-frame read; finished voices are pruned below
                if let Some(&s) = frames.get(voice.position as usize) {
                    mix += s;
                }
                voice.position += voice.step;
            }
            let value = (mix * MASTER_GAIN).clamp(-1.0, 1.0);
            for sample in frame.iter_mut() {
                *sample = value;
            }
        }

        let samples = &self.samples;
        self.voices
            .retain(|v| (v.position as usize) < samples[v.instrument].len());
    }
}
