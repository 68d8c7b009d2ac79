/// MIDI output using midir
use midir::{MidiOutput, MidiOutputConnection};

use crate::config::MidiConfig;
use crate::error::{Error, Result};
use crate::instrument::Instrument;
use crate::sequencer::playback::TriggerSink;

const CLIENT_NAME: &str = "beatgrid MIDI Output";

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    port_name: Option<String>,
    /// 0-based channel nibble
    channel: u8,
    velocity: u8,
}

impl MidiOutputDevice {
    pub fn new(config: &MidiConfig) -> Self {
        Self {
            connection: None,
            port_name: None,
            channel: config.channel.saturating_sub(1) & 0x0F,
            velocity: config.velocity.min(127),
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<()> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| Error::Midi(format!("failed to create MIDI output: {}", e)))?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| Error::Midi(format!("invalid port index {}", port_index)))?;
        let name = midi_out.port_name(port).unwrap_or_else(|_| format!("port {}", port_index));

        let connection = midi_out
            .connect(port, "beatgrid")
            .map_err(|e| Error::Midi(format!("failed to connect to {}: {}", name, e)))?;

        log::info!("MIDI output connected to {}", name);
        self.connection = Some(connection);
        self.port_name = Some(name);
        Ok(())
    }

    /// Connect to the first port whose name contains `pattern`
    pub fn connect_matching(&mut self, pattern: &str) -> Result<()> {
        let index = Self::available_ports()
            .iter()
            .position(|name| name.contains(pattern))
            .ok_or_else(|| Error::Midi(format!("no MIDI output port matching '{}'", pattern)))?;
        self.connect(index)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn send_note_on(&mut self, note: u8, velocity: u8) -> Result<()> {
        let message = note_on(self.channel, note, velocity);
        self.send(&message)
    }

    pub fn send_note_off(&mut self, note: u8) -> Result<()> {
        let message = note_off(self.channel, note);
        self.send(&message)
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        if let Some(ref mut conn) = self.connection {
            conn.send(message)
                .map_err(|e| Error::Midi(format!("failed to send {:02X?}: {}", message, e)))?;
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.port_name = None;
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new(&MidiConfig::default())
    }
}

impl TriggerSink for MidiOutputDevice {
    /// Percussion hit: note-on immediately followed by note-off
    fn trigger(&mut self, instrument: &Instrument) {
        let velocity = self.velocity;
        let result = self
            .send_note_on(instrument.midi_note, velocity)
            .and_then(|()| self.send_note_off(instrument.midi_note));
        if let Err(e) = result {
            log::warn!("{}: {}", instrument.name, e);
        }
    }
}

fn note_on(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

fn note_off(channel: u8, note: u8) -> [u8; 3] {
    [0x80 | (channel & 0x0F), note & 0x7F, 0]
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}
