/// Audio output using cpal
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex, PoisonError};

mod mixer;
mod sample;

pub use mixer::Mixer;
pub use sample::{DrumPreset, Sample, SYNTH_SAMPLE_RATE};

use crate::error::{Error, Result};
use crate::instrument::Instrument;
use crate::sequencer::playback::TriggerSink;

pub struct AudioOutput {
    _stream: Option<cpal::Stream>,
    mixer: Option<Arc<Mutex<Mixer>>>,
}

impl AudioOutput {
    /// Open the default output device and load one sample per instrument
    pub fn new(instruments: &[Instrument]) -> Result<Self> {
        let samples = instruments.iter().map(Sample::for_instrument).collect();

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| Error::Audio(format!("no output config: {}", e)))?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(Error::Audio(format!(
                "unsupported sample format {:?}",
                config.sample_format()
            )));
        }

        let sample_rate = config.sample_rate().0;
        let channels = usize::from(config.channels());
        let mixer = Arc::new(Mutex::new(Mixer::new(samples, sample_rate)));
        let mixer_clone = Arc::clone(&mixer);

        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mixer_clone
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .render(data, channels);
                },
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Audio(format!("failed to build stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| Error::Audio(format!("failed to start stream: {}", e)))?;

        log::info!(
            "Audio output running: {} Hz, {} channels, {} instruments",
            sample_rate,
            channels,
            instruments.len()
        );

        Ok(Self {
            _stream: Some(stream),
            mixer: Some(mixer),
        })
    }

    /// Output that plays nothing, for hosts without a sound device
    pub fn disabled() -> Self {
        Self {
            _stream: None,
            mixer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mixer.is_some()
    }

    /// Sendable trigger handle for the host loop
    pub fn handle(&self) -> AudioHandle {
        AudioHandle {
            mixer: self.mixer.clone(),
        }
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Starts voices on the shared mixer. Cheap to clone.
#[derive(Clone)]
pub struct AudioHandle {
    mixer: Option<Arc<Mutex<Mixer>>>,
}

impl AudioHandle {
    pub fn new(mixer: Arc<Mutex<Mixer>>) -> Self {
        Self { mixer: Some(mixer) }
    }
}

impl TriggerSink for AudioHandle {
    fn trigger(&mut self, instrument: &Instrument) {
        if let Some(mixer) = &self.mixer {
            mixer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .trigger(instrument.id);
        }
    }
}
