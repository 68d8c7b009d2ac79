#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use beatgrid::{
    midi_note_name, AudioOutput, Config, MidiOutputDevice, PlaybackEngine, PlaybackEvent,
    Sequencer, TriggerSink,
};
#[cfg(feature = "gui")]
use std::path::PathBuf;
#[cfg(feature = "gui")]
use std::sync::{Arc, Mutex, PoisonError};
#[cfg(feature = "gui")]
use std::time::{Duration, Instant};

#[cfg(feature = "gui")]
const HIT_FLASH: Duration = Duration::from_millis(120);

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    // RUST_LOG=debug shows every beat advance
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config_path = config_path_arg(std::env::args().skip(1));
    let app = match SequencerApp::new(config_path) {
        Ok(app) => app,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 800.0])
            .with_title("Beat Maker"),
        ..Default::default()
    };

    eframe::run_native(
        "beatgrid",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

/// `--config <path>` or `--config=<path>`
#[cfg(feature = "gui")]
fn config_path_arg(mut args: impl Iterator<Item = String>) -> Option<PathBuf> {
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[cfg(feature = "gui")]
struct SequencerApp {
    sequencer: Arc<Mutex<Sequencer>>,
    midi_output: Arc<Mutex<MidiOutputDevice>>,
    playback_engine: PlaybackEngine,
    // Owns the cpal stream; must outlive playback
    _audio_output: AudioOutput,

    // UI state
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    last_hit: Vec<Option<Instant>>,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new(config_path: Option<PathBuf>) -> beatgrid::Result<Self> {
        let config = Config::load(config_path.as_deref())?;
        let sequencer = Sequencer::new(&config.sequencer)?;
        let instrument_count = sequencer.instruments().len();

        let audio_output = match AudioOutput::new(sequencer.instruments()) {
            Ok(output) => output,
            Err(e) => {
                log::warn!("{}; continuing without sound", e);
                AudioOutput::disabled()
            }
        };

        let available_midi_ports = MidiOutputDevice::available_ports();
        let mut midi_output = MidiOutputDevice::new(&config.midi);
        let mut selected_port = None;
        if let Some(pattern) = &config.midi.port {
            match midi_output.connect_matching(pattern) {
                Ok(()) => {
                    selected_port = available_midi_ports
                        .iter()
                        .position(|name| name.contains(pattern.as_str()));
                }
                Err(e) => log::warn!("{}", e),
            }
        }

        let sequencer = Arc::new(Mutex::new(sequencer));
        let midi_output = Arc::new(Mutex::new(midi_output));

        let sinks: Vec<Box<dyn TriggerSink + Send>> = vec![
            Box::new(audio_output.handle()),
            Box::new(Arc::clone(&midi_output)),
        ];
        let mut playback_engine = PlaybackEngine::new();
        playback_engine.start(Arc::clone(&sequencer), sinks);

        Ok(Self {
            sequencer,
            midi_output,
            playback_engine,
            _audio_output: audio_output,
            available_midi_ports,
            selected_port,
            last_hit: vec![None; instrument_count],
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sequencer> {
        self.sequencer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_playback_events(&mut self) {
        let now = Instant::now();
        for event in self.playback_engine.poll_events() {
            if let PlaybackEvent::Triggered(id) = event {
                if let Some(slot) = self.last_hit.get_mut(id) {
                    *slot = Some(now);
                }
            }
        }
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_playback_events();

        // Snapshot under the lock, draw without it
        let (grid, instruments, current_beat, is_playing, tempo_bpm) = {
            let seq = self.lock();
            (
                seq.grid().clone(),
                seq.instruments().to_vec(),
                seq.current_beat_index(),
                seq.is_playing(),
                seq.engine().tempo_bpm(),
            )
        };

        let mut toggled = Vec::new();
        let mut play_clicked = false;
        let mut clear_clicked = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Beat Maker");
            ui.add_space(10.0);

            // Transport controls
            ui.horizontal(|ui| {
                let label = if is_playing { "⏸ Pause" } else { "▶ Play" };
                if ui
                    .add(egui::Button::new(label).min_size(egui::vec2(100.0, 40.0)))
                    .clicked()
                {
                    play_clicked = true;
                }

                if ui
                    .add(egui::Button::new("Clear").min_size(egui::vec2(80.0, 40.0)))
                    .clicked()
                {
                    clear_clicked = true;
                }

                ui.add_space(20.0);
                ui.label(format!(
                    "Beat {}/{}   {} BPM",
                    current_beat + 1,
                    grid.beat_count(),
                    tempo_bpm
                ));
            });

            ui.add_space(10.0);

            // MIDI Port Selection
            let mut selected_port_changed = None;
            ui.horizontal(|ui| {
                ui.label("MIDI Output:");
                if self.available_midi_ports.is_empty() {
                    ui.label("No MIDI ports available");
                } else {
                    egui::ComboBox::from_label("")
                        .selected_text(
                            self.selected_port
                                .and_then(|i| self.available_midi_ports.get(i))
                                .map(String::as_str)
                                .unwrap_or("Select port..."),
                        )
                        .show_ui(ui, |ui| {
                            for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                                if ui
                                    .selectable_label(self.selected_port == Some(i), port_name)
                                    .clicked()
                                {
                                    selected_port_changed = Some(i);
                                }
                            }
                        });
                }
            });

            if let Some(port_idx) = selected_port_changed {
                let mut midi = self.midi_output.lock().unwrap_or_else(PoisonError::into_inner);
                match midi.connect(port_idx) {
                    Ok(()) => self.selected_port = Some(port_idx),
                    Err(e) => log::warn!("{}", e),
                }
            }

            ui.add_space(20.0);

            // Instrument rows x beat columns
            let now = Instant::now();
            egui::Grid::new("beat_grid")
                .spacing([6.0, 6.0])
                .show(ui, |ui| {
                    for instrument in &instruments {
                        let flashing = self
                            .last_hit
                            .get(instrument.id)
                            .copied()
                            .flatten()
                            .is_some_and(|hit| now.duration_since(hit) < HIT_FLASH);
                        let color = if flashing {
                            egui::Color32::from_rgb(212, 175, 55)
                        } else {
                            egui::Color32::WHITE
                        };
                        ui.label(
                            egui::RichText::new(format!(
                                "{} ({})",
                                instrument.name,
                                midi_note_name(instrument.midi_note)
                            ))
                            .size(18.0)
                            .color(color),
                        );

                        for beat in 0..grid.beat_count() {
                            let armed = match grid.is_armed(instrument.id, beat) {
                                Ok(armed) => armed,
                                Err(e) => {
                                    log::error!("{}", e);
                                    false
                                }
                            };
                            let is_current = beat == current_beat;

                            let button = egui::Button::new("")
                                .min_size(egui::vec2(120.0, 70.0))
                                .rounding(5.0)
                                .fill(if armed {
                                    egui::Color32::from_rgb(0, 200, 0)
                                } else {
                                    egui::Color32::from_rgb(70, 70, 70)
                                })
                                .stroke(if is_current {
                                    egui::Stroke::new(4.0, egui::Color32::from_rgb(0, 255, 255))
                                } else {
                                    egui::Stroke::new(2.0, egui::Color32::from_rgb(212, 175, 55))
                                });

                            if ui.add(button).clicked() {
                                toggled.push((instrument.id, beat));
                            }
                        }
                        ui.end_row();
                    }
                });

            // Info
            ui.separator();
            ui.label("Click a slot to arm or disarm it");
            if !self
                .midi_output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_connected()
            {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    "⚠ No MIDI output connected - audio playback only",
                );
            }
        });

        if play_clicked || clear_clicked || !toggled.is_empty() {
            let mut seq = self.lock();
            if play_clicked {
                seq.toggle_play();
                log::info!("{}", if seq.is_playing() { "Playing" } else { "Paused" });
            }
            if clear_clicked {
                seq.clear();
            }
            for (instrument, beat) in toggled {
                if let Err(e) = seq.toggle(instrument, beat) {
                    log::error!("{}", e);
                }
            }
        }
    }
}
