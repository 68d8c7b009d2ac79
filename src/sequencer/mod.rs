/// Core sequencer logic - grid state and beat timing
/// Pure logic with no rendering or audio dependency
use crate::config::SequencerConfig;
use crate::error::{Error, Result};
use crate::instrument::{Instrument, InstrumentId};

pub mod playback;

/// Which (instrument, beat) slots are armed.
///
/// Rows are instruments, columns are beats. Every slot starts unarmed and
/// the dimensions never change after construction.
#[derive(Debug, Clone)]
pub struct GridState {
    cells: Vec<Vec<bool>>,
    instrument_count: usize,
    beat_count: usize,
}

impl GridState {
    pub fn new(instrument_count: usize, beat_count: usize) -> Result<Self> {
        if instrument_count == 0 {
            return Err(Error::InvalidConfiguration(
                "instrument count must be at least 1".into(),
            ));
        }
        if beat_count == 0 {
            return Err(Error::InvalidConfiguration(
                "beat count must be at least 1".into(),
            ));
        }

        Ok(Self {
            cells: vec![vec![false; beat_count]; instrument_count],
            instrument_count,
            beat_count,
        })
    }

    pub fn instrument_count(&self) -> usize {
        self.instrument_count
    }

    pub fn beat_count(&self) -> usize {
        self.beat_count
    }

    fn check(&self, instrument: InstrumentId, beat: usize) -> Result<()> {
        if instrument < self.instrument_count && beat < self.beat_count {
            Ok(())
        } else {
            Err(Error::InvalidIndex { instrument, beat })
        }
    }

    pub fn is_armed(&self, instrument: InstrumentId, beat: usize) -> Result<bool> {
        self.check(instrument, beat)?;
        Ok(self.cells[instrument][beat])
    }

    pub fn set(&mut self, instrument: InstrumentId, beat: usize, armed: bool) -> Result<()> {
        self.check(instrument, beat)?;
        self.cells[instrument][beat] = armed;
        Ok(())
    }

    /// Flip one slot and return its new state
    pub fn toggle(&mut self, instrument: InstrumentId, beat: usize) -> Result<bool> {
        self.check(instrument, beat)?;
        let cell = &mut self.cells[instrument][beat];
        *cell = !*cell;
        Ok(*cell)
    }

    pub fn clear(&mut self) {
        for row in &mut self.cells {
            for cell in row {
                *cell = false;
            }
        }
    }

    /// Instruments armed at `beat`, in ascending id order.
    /// An out-of-range beat has nothing armed.
    pub fn armed_instruments(&self, beat: usize) -> impl Iterator<Item = InstrumentId> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, row)| row.get(beat).copied().unwrap_or(false))
            .map(|(instrument, _)| instrument)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Paused,
    Playing,
}

/// Emitted by [`SequencerEngine::tick`] on the tick a beat becomes current
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeatAdvance {
    pub beat: usize,
    /// Instruments to fire, ascending
    pub triggers: Vec<InstrumentId>,
}

/// Ticks needed for one beat: `floor(frame_rate * 60 / tempo_bpm)`
pub fn frames_per_beat(frame_rate: u32, tempo_bpm: u32) -> Result<u32> {
    if frame_rate == 0 {
        return Err(Error::InvalidConfiguration(
            "frame rate must be at least 1".into(),
        ));
    }
    if tempo_bpm == 0 {
        return Err(Error::InvalidConfiguration("tempo must be at least 1 BPM".into()));
    }

    let frames = u64::from(frame_rate) * 60 / u64::from(tempo_bpm);
    if frames == 0 {
        return Err(Error::InvalidConfiguration(format!(
            "tempo {} BPM is too fast for {} frames per second",
            tempo_bpm, frame_rate
        )));
    }
    // frame_rate * 60 can exceed u32
    u32::try_from(frames).map_err(|_| {
        Error::InvalidConfiguration(format!("{} frames per beat is out of range", frames))
    })
}

/// Transport and beat clock. Converts a fixed-rate tick into beat advances.
#[derive(Debug, Clone)]
pub struct SequencerEngine {
    frame_rate: u32,
    tempo_bpm: u32,
    frames_per_beat: u32,
    beat_count: usize,
    state: TransportState,
    current_beat: usize,
    frames_into_beat: u32,
}

impl SequencerEngine {
    pub fn new(
        frame_rate: u32,
        tempo_bpm: u32,
        beat_count: usize,
        initial: TransportState,
    ) -> Result<Self> {
        if beat_count == 0 {
            return Err(Error::InvalidConfiguration(
                "beat count must be at least 1".into(),
            ));
        }
        let frames_per_beat = frames_per_beat(frame_rate, tempo_bpm)?;

        Ok(Self {
            frame_rate,
            tempo_bpm,
            frames_per_beat,
            beat_count,
            state: initial,
            current_beat: 0,
            frames_into_beat: 0,
        })
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn tempo_bpm(&self) -> u32 {
        self.tempo_bpm
    }

    pub fn frames_per_beat(&self) -> u32 {
        self.frames_per_beat
    }

    pub fn beat_count(&self) -> usize {
        self.beat_count
    }

    pub fn current_beat_index(&self) -> usize {
        self.current_beat
    }

    pub fn frames_into_beat(&self) -> u32 {
        self.frames_into_beat
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.state = if playing {
            TransportState::Playing
        } else {
            TransportState::Paused
        };
    }

    /// Change tempo. The phase is clamped into the new beat length so the
    /// next advance is never skipped past. On error nothing changes.
    pub fn set_tempo(&mut self, tempo_bpm: u32) -> Result<()> {
        let frames = frames_per_beat(self.frame_rate, tempo_bpm)?;
        self.tempo_bpm = tempo_bpm;
        self.frames_per_beat = frames;
        self.frames_into_beat = self.frames_into_beat.min(frames - 1);
        Ok(())
    }

    /// Advance one frame. While paused this does nothing, so resuming
    /// continues mid-beat instead of restarting the beat.
    pub fn tick(&mut self, grid: &GridState) -> Option<BeatAdvance> {
        if self.state == TransportState::Paused {
            return None;
        }

        let advance = if self.frames_into_beat == 0 {
            self.current_beat = (self.current_beat + 1) % self.beat_count;
            Some(BeatAdvance {
                beat: self.current_beat,
                triggers: grid.armed_instruments(self.current_beat).collect(),
            })
        } else {
            None
        };

        self.frames_into_beat = (self.frames_into_beat + 1) % self.frames_per_beat;
        advance
    }
}

/// Grid, engine and instrument list with matching dimensions.
///
/// Not synchronized. A host that ticks and edits from different threads
/// must put the whole `Sequencer` behind one lock.
pub struct Sequencer {
    grid: GridState,
    engine: SequencerEngine,
    instruments: Vec<Instrument>,
}

impl Sequencer {
    pub fn new(config: &SequencerConfig) -> Result<Self> {
        // The engine reports rows; collaborators look instruments up by id
        if let Some((row, instrument)) = config
            .instruments
            .iter()
            .enumerate()
            .find(|(row, instrument)| instrument.id != *row)
        {
            return Err(Error::InvalidConfiguration(format!(
                "instrument '{}' in row {} has id {}",
                instrument.name, row, instrument.id
            )));
        }
        let grid = GridState::new(config.instruments.len(), config.beat_count)?;
        let initial = if config.autoplay {
            TransportState::Playing
        } else {
            TransportState::Paused
        };
        let engine = SequencerEngine::new(
            config.frame_rate,
            config.tempo_bpm,
            config.beat_count,
            initial,
        )?;

        log::info!(
            "Sequencer ready: {} instruments x {} beats, {} BPM at {} fps ({} frames per beat)",
            grid.instrument_count(),
            grid.beat_count(),
            engine.tempo_bpm(),
            engine.frame_rate(),
            engine.frames_per_beat()
        );

        Ok(Self {
            grid,
            engine,
            instruments: config.instruments.clone(),
        })
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn engine(&self) -> &SequencerEngine {
        &self.engine
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn toggle(&mut self, instrument: InstrumentId, beat: usize) -> Result<bool> {
        self.grid.toggle(instrument, beat)
    }

    pub fn is_armed(&self, instrument: InstrumentId, beat: usize) -> Result<bool> {
        self.grid.is_armed(instrument, beat)
    }

    pub fn clear(&mut self) {
        self.grid.clear();
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.engine.set_playing(playing);
    }

    pub fn toggle_play(&mut self) {
        let playing = !self.engine.is_playing();
        self.engine.set_playing(playing);
    }

    pub fn current_beat_index(&self) -> usize {
        self.engine.current_beat_index()
    }

    pub fn set_tempo(&mut self, tempo_bpm: u32) -> Result<()> {
        self.engine.set_tempo(tempo_bpm)
    }

    pub fn tick(&mut self) -> Option<BeatAdvance> {
        self.engine.tick(&self.grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::default_kit;

    fn playing_engine(beat_count: usize) -> SequencerEngine {
        SequencerEngine::new(144, 240, beat_count, TransportState::Playing).unwrap()
    }

    #[test]
    fn test_grid_starts_unarmed() {
        let grid = GridState::new(6, 8).unwrap();
        for instrument in 0..6 {
            for beat in 0..8 {
                assert!(!grid.is_armed(instrument, beat).unwrap());
            }
        }
    }

    #[test]
    fn test_grid_toggle_flips_only_that_slot() {
        let mut grid = GridState::new(4, 4).unwrap();
        assert!(grid.toggle(1, 2).unwrap());
        for instrument in 0..4 {
            for beat in 0..4 {
                let expected = instrument == 1 && beat == 2;
                assert_eq!(grid.is_armed(instrument, beat).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_double_toggle_restores_state() {
        let mut grid = GridState::new(3, 5).unwrap();
        grid.set(2, 4, true).unwrap();
        for instrument in 0..3 {
            for beat in 0..5 {
                let before = grid.is_armed(instrument, beat).unwrap();
                grid.toggle(instrument, beat).unwrap();
                grid.toggle(instrument, beat).unwrap();
                assert_eq!(grid.is_armed(instrument, beat).unwrap(), before);
            }
        }
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut grid = GridState::new(6, 8).unwrap();
        assert!(matches!(
            grid.toggle(6, 0),
            Err(Error::InvalidIndex { instrument: 6, beat: 0 })
        ));
        assert!(matches!(
            grid.is_armed(0, 8),
            Err(Error::InvalidIndex { instrument: 0, beat: 8 })
        ));
        assert!(matches!(grid.set(0, 9, true), Err(Error::InvalidIndex { .. })));
    }

    #[test]
    fn test_clear_disarms_everything() {
        let mut grid = GridState::new(2, 2).unwrap();
        grid.set(0, 0, true).unwrap();
        grid.set(1, 1, true).unwrap();
        grid.clear();
        assert_eq!(grid.armed_instruments(0).count(), 0);
        assert_eq!(grid.armed_instruments(1).count(), 0);
    }

    #[test]
    fn test_empty_grid_rejected() {
        assert!(matches!(GridState::new(0, 8), Err(Error::InvalidConfiguration(_))));
        assert!(matches!(GridState::new(6, 0), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_frames_per_beat() {
        assert_eq!(frames_per_beat(144, 240).unwrap(), 36);
        assert_eq!(frames_per_beat(144, 120).unwrap(), 72);
        // floor, not round
        assert_eq!(frames_per_beat(60, 7).unwrap(), 514);
    }

    #[test]
    fn test_tempo_too_fast_rejected() {
        // 144 * 60 / 9000 == 0
        assert!(matches!(
            SequencerEngine::new(144, 9000, 8, TransportState::Playing),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(SequencerEngine::new(0, 120, 8, TransportState::Playing).is_err());
        assert!(SequencerEngine::new(144, 0, 8, TransportState::Playing).is_err());
        assert!(SequencerEngine::new(144, 120, 0, TransportState::Playing).is_err());
    }

    #[test]
    fn test_beat_wraparound_visits_every_beat_in_order() {
        let grid = GridState::new(1, 8).unwrap();
        let mut engine = playing_engine(8);
        let fpb = engine.frames_per_beat() as usize;

        let mut visited = vec![engine.current_beat_index()];
        for _ in 0..8 * fpb {
            if let Some(advance) = engine.tick(&grid) {
                assert_eq!(advance.beat, engine.current_beat_index());
                visited.push(advance.beat);
            }
        }

        assert_eq!(visited, vec![0, 1, 2, 3, 4, 5, 6, 7, 0]);
        assert_eq!(engine.current_beat_index(), 0);
    }

    #[test]
    fn test_advance_fires_once_per_beat() {
        let grid = GridState::new(1, 4).unwrap();
        let mut engine = playing_engine(4);
        let fpb = engine.frames_per_beat() as usize;

        let mut advances = Vec::new();
        for frame in 0..3 * fpb {
            if engine.tick(&grid).is_some() {
                advances.push(frame);
            }
        }
        assert_eq!(advances, vec![0, fpb, 2 * fpb]);
    }

    #[test]
    fn test_pause_freezes_phase() {
        let grid = GridState::new(1, 8).unwrap();
        let mut engine = playing_engine(8);
        for _ in 0..10 {
            engine.tick(&grid);
        }
        engine.set_playing(false);

        let beat = engine.current_beat_index();
        let phase = engine.frames_into_beat();
        for _ in 0..100 {
            assert!(engine.tick(&grid).is_none());
        }
        assert_eq!(engine.current_beat_index(), beat);
        assert_eq!(engine.frames_into_beat(), phase);
    }

    #[test]
    fn test_resume_continues_phase() {
        let grid = GridState::new(1, 8).unwrap();
        let mut engine = playing_engine(8);
        let fpb = engine.frames_per_beat();

        for _ in 0..10 {
            engine.tick(&grid);
        }
        let k = engine.frames_into_beat();
        assert_eq!(k, 10);

        engine.set_playing(false);
        for _ in 0..50 {
            engine.tick(&grid);
        }
        engine.set_playing(true);

        for _ in 0..fpb - k {
            assert!(engine.tick(&grid).is_none());
        }
        assert_eq!(engine.frames_into_beat(), 0);
        let advance = engine.tick(&grid).expect("beat boundary reached");
        assert_eq!(advance.beat, 2);
    }

    #[test]
    fn test_trigger_correctness() {
        let mut grid = GridState::new(6, 8).unwrap();
        grid.set(2, 3, true).unwrap();
        let mut engine = playing_engine(8);
        assert_eq!(engine.frames_per_beat(), 36);

        let mut fired = Vec::new();
        while engine.current_beat_index() != 3 {
            if let Some(advance) = engine.tick(&grid) {
                fired.push(advance);
            }
        }

        let last = fired.pop().unwrap();
        assert_eq!(last, BeatAdvance { beat: 3, triggers: vec![2] });
        assert!(fired.iter().all(|advance| advance.triggers.is_empty()));
    }

    #[test]
    fn test_triggers_in_instrument_order() {
        let mut grid = GridState::new(4, 2).unwrap();
        grid.set(3, 1, true).unwrap();
        grid.set(0, 1, true).unwrap();
        grid.set(2, 0, true).unwrap();
        let mut engine = playing_engine(2);

        let advance = engine.tick(&grid).unwrap();
        assert_eq!(advance.beat, 1);
        assert_eq!(advance.triggers, vec![0, 3]);
    }

    #[test]
    fn test_set_tempo_clamps_phase() {
        let grid = GridState::new(1, 8).unwrap();
        let mut engine = playing_engine(8);
        for _ in 0..30 {
            engine.tick(&grid);
        }
        assert_eq!(engine.frames_into_beat(), 30);

        // 144 fps at 480 BPM -> 18 frames per beat
        engine.set_tempo(480).unwrap();
        assert_eq!(engine.frames_per_beat(), 18);
        assert_eq!(engine.frames_into_beat(), 17);

        engine.tick(&grid);
        assert_eq!(engine.frames_into_beat(), 0);
    }

    #[test]
    fn test_set_tempo_rejects_and_keeps_state() {
        let mut engine = playing_engine(8);
        assert!(engine.set_tempo(100_000).is_err());
        assert_eq!(engine.tempo_bpm(), 240);
        assert_eq!(engine.frames_per_beat(), 36);
    }

    #[test]
    fn test_sequencer_initial_state_follows_autoplay() {
        let mut config = SequencerConfig::default();
        config.autoplay = false;
        assert!(!Sequencer::new(&config).unwrap().is_playing());

        config.autoplay = true;
        assert!(Sequencer::new(&config).unwrap().is_playing());
    }

    #[test]
    fn test_sequencer_dimensions_follow_kit() {
        let config = SequencerConfig {
            instruments: default_kit(),
            beat_count: 16,
            ..SequencerConfig::default()
        };
        let mut seq = Sequencer::new(&config).unwrap();
        assert_eq!(seq.grid().instrument_count(), 6);
        assert_eq!(seq.grid().beat_count(), 16);
        assert!(seq.toggle(5, 15).unwrap());
        assert!(seq.toggle(6, 0).is_err());
    }

    #[test]
    fn test_sequencer_rejects_ids_that_do_not_match_rows() {
        let config = SequencerConfig {
            instruments: vec![Instrument::new(7, "Kick", 36)],
            ..SequencerConfig::default()
        };
        assert!(matches!(
            Sequencer::new(&config),
            Err(Error::InvalidConfiguration(_))
        ));

        let mut kit = default_kit();
        kit.swap(0, 1);
        let config = SequencerConfig {
            instruments: kit,
            ..SequencerConfig::default()
        };
        assert!(Sequencer::new(&config).is_err());
    }

    #[test]
    fn test_sequencer_toggle_play() {
        let mut seq = Sequencer::new(&SequencerConfig::default()).unwrap();
        seq.set_playing(true);
        seq.toggle_play();
        assert!(!seq.is_playing());
        seq.toggle_play();
        assert!(seq.is_playing());
        seq.toggle(0, 1).unwrap();
        assert_eq!(seq.tick().unwrap().triggers, vec![0]);
    }
}
