//! Subtractive synth voice for the bass and synth tracks

use std::f64::consts::TAU;
use std::fmt;

use fundsp::hacker::*;
use tracing::trace;

use super::{AudioInstrument, NoteEvent, MAX_BLOCK_SIZE};

const MAX_VOICES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Saw,
    Square,
    Triangle,
}

impl Waveform {
    fn sample(self, phase: f64) -> f64 {
        let t = phase.fract();
        match self {
            Self::Saw => 2.0 * t - 1.0,
            Self::Square => {
                if t < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::Triangle => 1.0 - 4.0 * (t - 0.5).abs(),
        }
    }
}

/// Voice settings for one melodic track
#[derive(Debug, Clone, PartialEq)]
pub struct SynthPreset {
    pub name: &'static str,
    pub waveform: Waveform,
    /// Second oscillator detune in cents, 0 disables it
    pub detune_cents: f64,
    pub cutoff_hz: f32,
    pub attack_secs: f64,
    pub release_secs: f64,
    pub level: f32,
}

impl SynthPreset {
    pub fn bass() -> Self {
        Self {
            name: "Bass",
            waveform: Waveform::Saw,
            detune_cents: 0.0,
            cutoff_hz: 700.0,
            attack_secs: 0.005,
            release_secs: 0.06,
            level: 0.6,
        }
    }

    pub fn lead() -> Self {
        Self {
            name: "Synth",
            waveform: Waveform::Square,
            detune_cents: 7.0,
            cutoff_hz: 2800.0,
            attack_secs: 0.01,
            release_secs: 0.12,
            level: 0.35,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ToneVoice {
    active: bool,
    frequency: f64,
    phase: f64,
    phase2: f64,
    env: f64,
    /// Frames left before release starts
    gate: u32,
    age: usize,
}

impl ToneVoice {
    fn start(&mut self, frequency: f64, duration_frames: u32) {
        *self = Self {
            active: true,
            frequency,
            gate: std::cmp::Ord::max(duration_frames, 1),
            // Keep the level of a stolen voice to avoid a click
            env: self.env,
            ..Self::default()
        };
    }

    fn tick(&mut self, sample_rate: f64, preset: &SynthPreset) -> f64 {
        if !self.active {
            return 0.0;
        }
        self.age += 1;

        if self.gate > 0 {
            self.gate -= 1;
            let rise = 1.0 / (preset.attack_secs * sample_rate).max(1.0);
            self.env = (self.env + rise).min(1.0);
        } else {
            self.env *= (-1.0 / (preset.release_secs * sample_rate).max(1.0)).exp();
            if self.env < 0.0001 {
                self.active = false;
            }
        }

        self.phase += self.frequency / sample_rate;
        let mut osc = preset.waveform.sample(self.phase);
        if preset.detune_cents != 0.0 {
            let ratio = 2f64.powf(preset.detune_cents / 1200.0);
            self.phase2 += self.frequency * ratio / sample_rate;
            osc = (osc + preset.waveform.sample(self.phase2)) * 0.5;
        }

        // Faint sine sub keeps low notes audible on small speakers
        let sub = (self.phase * TAU * 0.5).sin() * 0.2;
        (osc + sub) * self.env
    }
}

/// Small polyphonic synth with a shared lowpass
pub struct MonoSynth {
    sample_rate: f32,
    preset: SynthPreset,
    voices: Vec<ToneVoice>,
    pending: Vec<(f64, u32, u32)>, // (frequency, duration_frames, offset)
    filter: An<FixedSvf<f64, LowpassMode<f64>>>,
    output: Vec<f32>,
}

impl fmt::Debug for MonoSynth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonoSynth")
            .field("preset", &self.preset.name)
            .field("sample_rate", &self.sample_rate)
            .field("active_voices", &self.active_voices())
            .finish()
    }
}

impl MonoSynth {
    pub fn new(preset: SynthPreset, sample_rate: f32) -> Self {
        let mut filter = lowpass_hz(preset.cutoff_hz, 0.707);
        filter.set_sample_rate(sample_rate as f64);
        Self {
            sample_rate,
            preset,
            voices: vec![ToneVoice::default(); MAX_VOICES],
            pending: Vec::new(),
            filter,
            output: vec![0.0; MAX_BLOCK_SIZE],
        }
    }

    pub fn preset(&self) -> &SynthPreset {
        &self.preset
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    fn note_on(&mut self, frequency: f64, duration_frames: u32) {
        let index = self
            .voices
            .iter()
            .position(|v| !v.active)
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, v)| v.age)
                    .map(|(i, _)| i)
            })
            .unwrap_or(0);

        trace!(preset = self.preset.name, frequency, duration_frames, voice = index, "Note on");
        self.voices[index].start(frequency, duration_frames);
    }
}

impl AudioInstrument for MonoSynth {
    fn name(&self) -> &str {
        self.preset.name
    }

    fn queue_note(&mut self, note: NoteEvent, sample_offset: u32) {
        if let NoteEvent::Tone { frequency, duration_frames } = note {
            self.pending.push((frequency, duration_frames, sample_offset));
        }
    }

    fn all_notes_off(&mut self) {
        self.pending.clear();
        for voice in &mut self.voices {
            voice.active = false;
            voice.env = 0.0;
        }
    }

    fn process(&mut self, num_frames: usize) -> &[f32] {
        let frames = std::cmp::Ord::min(num_frames, MAX_BLOCK_SIZE);
        let sample_rate = self.sample_rate as f64;
        self.pending.sort_by_key(|&(_, _, offset)| offset);

        let mut next = 0;
        for frame in 0..frames {
            while let Some(&(frequency, duration, offset)) = self.pending.get(next) {
                if offset as usize > frame {
                    break;
                }
                self.note_on(frequency, duration);
                next += 1;
            }

            let mix: f64 = self
                .voices
                .iter_mut()
                .map(|voice| voice.tick(sample_rate, &self.preset))
                .sum();
            let input = Frame::from([mix as f32]);
            let filtered = self.filter.tick(&input);
            self.output[frame] = filtered[0] * self.preset.level;
        }

        self.pending.drain(..next);
        for (_, _, offset) in &mut self.pending {
            *offset -= frames as u32;
        }

        &self.output[..frames]
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.filter.set_sample_rate(sample_rate as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_tone_sounds_then_releases() {
        let mut synth = MonoSynth::new(SynthPreset::bass(), 44_100.0);
        synth.queue_note(NoteEvent::Tone { frequency: 65.4, duration_frames: 2048 }, 0);
        let during = energy(synth.process(2048));
        assert!(during > 0.1);

        for _ in 0..20 {
            synth.process(2048);
        }
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn test_offset_delays_note() {
        let mut synth = MonoSynth::new(SynthPreset::lead(), 48_000.0);
        synth.queue_note(NoteEvent::Tone { frequency: 440.0, duration_frames: 4800 }, 1000);
        let out = synth.process(1024);
        assert_eq!(energy(&out[..1000]), 0.0);
        assert_eq!(synth.active_voices(), 1);
    }

    #[test]
    fn test_hits_are_ignored() {
        let mut synth = MonoSynth::new(SynthPreset::lead(), 44_100.0);
        synth.queue_note(NoteEvent::Hit(stepcode_core::DrumHit::Kick), 0);
        assert_eq!(energy(synth.process(512)), 0.0);
    }

    #[test]
    fn test_voice_stealing_caps_polyphony() {
        let mut synth = MonoSynth::new(SynthPreset::lead(), 44_100.0);
        for i in 0..8 {
            synth.queue_note(NoteEvent::Tone { frequency: 220.0 + i as f64, duration_frames: 44_100 }, 0);
        }
        synth.process(16);
        assert_eq!(synth.active_voices(), MAX_VOICES);
    }

    #[test]
    fn test_waveforms_stay_in_range() {
        for waveform in [Waveform::Saw, Waveform::Square, Waveform::Triangle] {
            for i in 0..100 {
                let value = waveform.sample(i as f64 * 0.0137);
                assert!((-1.0..=1.0).contains(&value));
            }
        }
    }
}
