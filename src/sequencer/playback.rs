/// Playback engine - the fixed time step host loop
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::Sequencer;
use crate::instrument::{Instrument, InstrumentId};

/// Frames the loop may fall behind before it gives up catching up
const MAX_CATCH_UP_FRAMES: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    BeatAdvanced(usize),
    Triggered(InstrumentId),
}

/// Receives "play this instrument now". Fire and forget: implementations
/// must not block the host loop and must let repeated triggers overlap.
pub trait TriggerSink {
    fn trigger(&mut self, instrument: &Instrument);
}

impl<S: TriggerSink> TriggerSink for Arc<Mutex<S>> {
    fn trigger(&mut self, instrument: &Instrument) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .trigger(instrument);
    }
}

pub type SharedSequencer = Arc<Mutex<Sequencer>>;

pub struct PlaybackEngine {
    sender: Sender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    is_running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            sender,
            receiver,
            is_running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Spawn the host loop. It ticks `sequencer` once per frame for as long
    /// as the engine runs; the transport decides whether a tick does anything.
    pub fn start(
        &mut self,
        sequencer: SharedSequencer,
        mut sinks: Vec<Box<dyn TriggerSink + Send>>,
    ) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let (frame_rate, instruments) = {
            let seq = sequencer.lock().unwrap_or_else(PoisonError::into_inner);
            (seq.engine().frame_rate(), seq.instruments().to_vec())
        };
        let is_running = Arc::clone(&self.is_running);
        let sender = self.sender.clone();

        log::info!("Host loop starting at {} fps", frame_rate);

        self.handle = Some(thread::spawn(move || {
            let frame = Duration::from_secs_f64(1.0 / f64::from(frame_rate));
            let mut deadline = Instant::now();

            while is_running.load(Ordering::SeqCst) {
                run_frame(&sequencer, &instruments, &mut sinks, &sender);

                deadline += frame;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                } else if now - deadline > frame * MAX_CATCH_UP_FRAMES {
                    log::warn!(
                        "Host loop fell {:?} behind, skipping ahead",
                        now - deadline
                    );
                    deadline = now;
                }
            }

            log::info!("Host loop stopped");
        }));
    }

    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Host loop thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One host frame. The sequencer lock is released before any sink runs.
fn run_frame(
    sequencer: &Mutex<Sequencer>,
    instruments: &[Instrument],
    sinks: &mut [Box<dyn TriggerSink + Send>],
    sender: &Sender<PlaybackEvent>,
) {
    let advance = sequencer
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .tick();
    let Some(advance) = advance else {
        return;
    };

    log::debug!("beat {} -> {:?}", advance.beat, advance.triggers);
    let _ = sender.send(PlaybackEvent::BeatAdvanced(advance.beat));

    for id in advance.triggers {
        let Some(instrument) = instruments.get(id) else {
            continue;
        };
        for sink in sinks.iter_mut() {
            sink.trigger(instrument);
        }
        let _ = sender.send(PlaybackEvent::Triggered(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SequencerConfig;

    #[derive(Default)]
    struct Recorder {
        hits: Vec<InstrumentId>,
    }

    impl TriggerSink for Recorder {
        fn trigger(&mut self, instrument: &Instrument) {
            self.hits.push(instrument.id);
        }
    }

    fn shared(config: &SequencerConfig) -> SharedSequencer {
        Arc::new(Mutex::new(Sequencer::new(config).unwrap()))
    }

    #[test]
    fn run_frame_fans_out_triggers_and_events() {
        let seq = shared(&SequencerConfig {
            autoplay: true,
            ..SequencerConfig::default()
        });
        {
            let mut s = seq.lock().unwrap();
            s.toggle(1, 1).unwrap();
            s.toggle(4, 1).unwrap();
        }
        let instruments = seq.lock().unwrap().instruments().to_vec();
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let mut sinks: Vec<Box<dyn TriggerSink + Send>> = vec![Box::new(Arc::clone(&recorder))];
        let (sender, receiver) = channel();

        run_frame(&seq, &instruments, &mut sinks, &sender);
        // mid-beat frame: nothing new
        run_frame(&seq, &instruments, &mut sinks, &sender);

        assert_eq!(recorder.lock().unwrap().hits, vec![1, 4]);
        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(
            events,
            vec![
                PlaybackEvent::BeatAdvanced(1),
                PlaybackEvent::Triggered(1),
                PlaybackEvent::Triggered(4),
            ]
        );
    }

    #[test]
    fn repeated_triggers_are_all_delivered() {
        let seq = shared(&SequencerConfig {
            autoplay: true,
            beat_count: 1,
            frame_rate: 60,
            tempo_bpm: 3600,
            ..SequencerConfig::default()
        });
        seq.lock().unwrap().toggle(0, 0).unwrap();
        let instruments = seq.lock().unwrap().instruments().to_vec();
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let mut sinks: Vec<Box<dyn TriggerSink + Send>> = vec![Box::new(Arc::clone(&recorder))];
        let (sender, _receiver) = channel();

        // one frame per beat, single-beat loop: every frame fires
        for _ in 0..5 {
            run_frame(&seq, &instruments, &mut sinks, &sender);
        }
        assert_eq!(recorder.lock().unwrap().hits, vec![0; 5]);
    }

    #[test]
    fn paused_sequencer_emits_nothing() {
        let seq = shared(&SequencerConfig::default());
        seq.lock().unwrap().toggle(0, 1).unwrap();
        let instruments = seq.lock().unwrap().instruments().to_vec();
        let mut sinks: Vec<Box<dyn TriggerSink + Send>> = Vec::new();
        let (sender, receiver) = channel();

        for _ in 0..100 {
            run_frame(&seq, &instruments, &mut sinks, &sender);
        }
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn engine_thread_starts_and_stops() {
        let seq = shared(&SequencerConfig {
            autoplay: true,
            frame_rate: 1000,
            tempo_bpm: 6000,
            ..SequencerConfig::default()
        });
        let mut engine = PlaybackEngine::new();
        engine.start(Arc::clone(&seq), Vec::new());
        assert!(engine.is_running());
        // second start is a no-op
        engine.start(Arc::clone(&seq), Vec::new());

        thread::sleep(Duration::from_millis(100));
        engine.stop();
        assert!(!engine.is_running());

        let events = engine.poll_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, PlaybackEvent::BeatAdvanced(_))));
    }
}
