//! Analog-style drum kit for the percussion track

use std::f64::consts::TAU;

use stepcode_core::DrumHit;
use tracing::trace;

use super::{AudioInstrument, NoteEvent, MAX_BLOCK_SIZE};

const MAX_VOICES: usize = 12;
const SILENCE: f64 = 0.0001;

/// Kit-wide levels and decays, all normalized 0..1
#[derive(Debug, Clone)]
pub struct DrumKitParams {
    pub master: f32,
    pub kick_level: f32,
    pub kick_decay: f32,
    pub snare_level: f32,
    pub snare_tone: f32,
    pub hat_level: f32,
    pub hat_decay: f32,
    pub clap_level: f32,
    pub tom_level: f32,
    pub cymbal_level: f32,
    /// Rim and cowbell
    pub perc_level: f32,
}

impl Default for DrumKitParams {
    fn default() -> Self {
        Self {
            master: 0.8,
            kick_level: 0.9,
            kick_decay: 0.5,
            snare_level: 0.8,
            snare_tone: 0.4,
            hat_level: 0.5,
            hat_decay: 0.3,
            clap_level: 0.7,
            tom_level: 0.7,
            cymbal_level: 0.5,
            perc_level: 0.6,
        }
    }
}

#[derive(Debug, Clone)]
struct DrumVoice {
    hit: DrumHit,
    active: bool,
    age: usize,
    phase: f64,
    phase2: f64,
    amp_env: f64,
    pitch_env: f64,
    noise_env: f64,
    /// Remaining clap re-triggers and frames until the next one
    bursts: usize,
    burst_timer: usize,
    lp: f64,
    lp2: f64,
}

impl DrumVoice {
    fn idle() -> Self {
        Self {
            hit: DrumHit::Kick,
            active: false,
            age: 0,
            phase: 0.0,
            phase2: 0.0,
            amp_env: 0.0,
            pitch_env: 0.0,
            noise_env: 0.0,
            bursts: 0,
            burst_timer: 0,
            lp: 0.0,
            lp2: 0.0,
        }
    }

    fn trigger(&mut self, hit: DrumHit) {
        *self = Self {
            hit,
            active: true,
            amp_env: 1.0,
            pitch_env: 1.0,
            noise_env: 1.0,
            bursts: if hit == DrumHit::Clap { 3 } else { 0 },
            ..Self::idle()
        };
    }

    fn is_hat(&self) -> bool {
        matches!(self.hit, DrumHit::HiHat | DrumHit::OpenHat)
    }

    fn tick(&mut self, sample_rate: f32, params: &DrumKitParams) -> f32 {
        if !self.active {
            return 0.0;
        }

        self.age += 1;
        let dt = 1.0 / sample_rate as f64;

        let sample = match self.hit {
            DrumHit::Kick => self.tick_kick(dt, params),
            DrumHit::Snare => self.tick_snare(dt, params),
            DrumHit::Clap => self.tick_clap(dt, sample_rate, params),
            DrumHit::HiHat => self.tick_metal(dt, 0.02 + params.hat_decay as f64 * 0.03, params.hat_level),
            DrumHit::OpenHat => self.tick_metal(dt, 0.2 + params.hat_decay as f64 * 0.3, params.hat_level),
            DrumHit::Crash => self.tick_metal(dt, 1.2, params.cymbal_level),
            DrumHit::Tom => self.tick_tom(dt, params),
            DrumHit::Rim => self.tick_rim(dt, params),
            DrumHit::Cowbell => self.tick_cowbell(dt, params),
        };

        if self.amp_env < SILENCE && self.noise_env < SILENCE {
            self.active = false;
        }

        sample as f32
    }

    fn tick_kick(&mut self, dt: f64, params: &DrumKitParams) -> f64 {
        self.pitch_env *= (-dt / 0.03).exp();
        // 55 Hz body with a 4x pitch sweep at the attack
        let freq = 55.0 * (1.0 + self.pitch_env * 3.0);
        self.phase += freq * dt;

        let decay = 0.1 + params.kick_decay as f64 * 0.4;
        self.amp_env *= (-dt / decay).exp();
        self.noise_env = 0.0;

        (self.phase * TAU).sin() * self.amp_env * params.kick_level as f64
    }

    fn tick_snare(&mut self, dt: f64, params: &DrumKitParams) -> f64 {
        self.phase += 185.0 * dt;
        self.phase2 += 330.0 * dt;
        let body = (self.phase * TAU).sin() * 0.6 + (self.phase2 * TAU).sin() * 0.4;
        self.amp_env *= (-dt / 0.03).exp();

        let noise = fastrand::f64() * 2.0 - 1.0;
        self.lp += 0.15 * (noise - self.lp);
        self.lp2 += 0.1 * (self.lp - self.lp2);
        let rattle = self.lp - self.lp2;
        self.noise_env *= (-dt / 0.1).exp();

        let tone = params.snare_tone as f64;
        let mix = body * self.amp_env * tone + rattle * self.noise_env * 1.5 * (1.0 - tone * 0.3);
        mix * params.snare_level as f64
    }

    fn tick_clap(&mut self, dt: f64, sample_rate: f32, params: &DrumKitParams) -> f64 {
        if self.bursts > 0 {
            self.burst_timer += 1;
            // Re-trigger roughly every 17 ms
            if self.burst_timer as f32 > sample_rate * 0.017 {
                self.burst_timer = 0;
                self.bursts -= 1;
                self.noise_env = 0.9;
            }
        }

        let noise = fastrand::f64() * 2.0 - 1.0;
        self.lp += 0.12 * (noise - self.lp);
        let band = noise - self.lp * 1.8;

        let decay = if self.bursts > 0 { 0.004 } else { 0.15 };
        self.noise_env *= (-dt / decay).exp();
        self.amp_env = 0.0;

        (band * 1.5).tanh() * self.noise_env * params.clap_level as f64
    }

    fn tick_metal(&mut self, dt: f64, decay: f64, level: f32) -> f64 {
        let noise = fastrand::f64() * 2.0 - 1.0;
        self.lp += 0.3 * (noise - self.lp);
        let highpassed = noise - self.lp;

        self.amp_env *= (-dt / decay).exp();
        self.noise_env = 0.0;

        highpassed * self.amp_env * level as f64
    }

    fn tick_tom(&mut self, dt: f64, params: &DrumKitParams) -> f64 {
        self.pitch_env *= (-dt / 0.05).exp();
        let freq = 120.0 * (1.0 + self.pitch_env * 0.5);
        self.phase += freq * dt;

        self.amp_env *= (-dt / 0.3).exp();
        self.noise_env = 0.0;

        (self.phase * TAU).sin() * self.amp_env * params.tom_level as f64
    }

    fn tick_rim(&mut self, dt: f64, params: &DrumKitParams) -> f64 {
        self.phase += 500.0 * dt;
        let tone = (self.phase * TAU).sin();
        self.amp_env *= (-dt / 0.015).exp();

        let noise = fastrand::f64() * 2.0 - 1.0;
        self.noise_env *= (-dt / 0.005).exp();

        (tone * 0.7 + noise * self.noise_env * 0.3) * self.amp_env * params.perc_level as f64
    }

    fn tick_cowbell(&mut self, dt: f64, params: &DrumKitParams) -> f64 {
        // Two detuned squares
        self.phase += 560.0 * dt;
        self.phase2 += 845.0 * dt;
        let square = |phase: f64| if (phase * TAU).sin() > 0.0 { 1.0 } else { -1.0 };
        let mix = (square(self.phase) + square(self.phase2)) * 0.3;

        self.amp_env *= (-dt / 0.15).exp();
        self.noise_env = 0.0;

        mix * self.amp_env * params.perc_level as f64
    }
}

/// One-shot drum voices keyed by hit name
pub struct DrumKit {
    sample_rate: f32,
    voices: Vec<DrumVoice>,
    pending: Vec<(DrumHit, u32)>,
    output: Vec<f32>,
    params: DrumKitParams,
}

impl std::fmt::Debug for DrumKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrumKit")
            .field("sample_rate", &self.sample_rate)
            .field("active_voices", &self.active_voices())
            .finish()
    }
}

impl DrumKit {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: vec![DrumVoice::idle(); MAX_VOICES],
            pending: Vec::new(),
            output: vec![0.0; MAX_BLOCK_SIZE],
            params: DrumKitParams::default(),
        }
    }

    pub fn params_mut(&mut self) -> &mut DrumKitParams {
        &mut self.params
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    fn trigger(&mut self, hit: DrumHit) {
        // Open and closed hats choke each other
        if matches!(hit, DrumHit::HiHat | DrumHit::OpenHat) {
            for voice in self.voices.iter_mut().filter(|v| v.is_hat()) {
                voice.active = false;
            }
        }

        // Same hit retriggers, then a free voice, then steal the oldest
        let index = self
            .voices
            .iter()
            .position(|v| v.active && v.hit == hit)
            .or_else(|| self.voices.iter().position(|v| !v.active))
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, v)| v.age)
                    .map(|(i, _)| i)
            })
            .unwrap_or(0);

        trace!(hit = hit.name(), voice = index, "Drum trigger");
        self.voices[index].trigger(hit);
    }
}

impl AudioInstrument for DrumKit {
    fn name(&self) -> &str {
        "Drum Kit"
    }

    fn queue_note(&mut self, note: NoteEvent, sample_offset: u32) {
        if let NoteEvent::Hit(hit) = note {
            self.pending.push((hit, sample_offset));
        }
    }

    fn all_notes_off(&mut self) {
        self.pending.clear();
        for voice in &mut self.voices {
            voice.active = false;
        }
    }

    fn process(&mut self, num_frames: usize) -> &[f32] {
        let frames = num_frames.min(MAX_BLOCK_SIZE);
        self.pending.sort_by_key(|&(_, offset)| offset);

        let mut next = 0;
        for frame in 0..frames {
            while let Some(&(hit, offset)) = self.pending.get(next) {
                if offset as usize > frame {
                    break;
                }
                self.trigger(hit);
                next += 1;
            }

            let mix: f32 = self
                .voices
                .iter_mut()
                .map(|voice| voice.tick(self.sample_rate, &self.params))
                .sum();
            self.output[frame] = (mix * self.params.master).tanh();
        }

        self.pending.drain(..next);
        for (_, offset) in &mut self.pending {
            *offset -= frames as u32;
        }

        &self.output[..frames]
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn test_every_hit_makes_sound() {
        for hit in DrumHit::ALL {
            let mut kit = DrumKit::new(44_100.0);
            kit.queue_note(NoteEvent::Hit(hit), 0);
            let out = kit.process(1024);
            assert!(peak(out) > 0.01, "{} is silent", hit.name());
        }
    }

    #[test]
    fn test_hit_waits_for_offset() {
        let mut kit = DrumKit::new(44_100.0);
        kit.queue_note(NoteEvent::Hit(DrumHit::Kick), 300);
        let out = kit.process(256).to_vec();
        assert_eq!(peak(&out), 0.0);
        // Remaining offset carried into the next block
        let out = kit.process(256);
        assert_eq!(peak(&out[..44]), 0.0);
        assert!(peak(&out[44..]) > 0.0);
    }

    #[test]
    fn test_tones_are_ignored() {
        let mut kit = DrumKit::new(44_100.0);
        kit.queue_note(NoteEvent::Tone { frequency: 440.0, duration_frames: 100 }, 0);
        assert_eq!(peak(kit.process(512)), 0.0);
    }

    #[test]
    fn test_hats_choke_each_other() {
        let mut kit = DrumKit::new(44_100.0);
        kit.queue_note(NoteEvent::Hit(DrumHit::OpenHat), 0);
        kit.process(64);
        kit.queue_note(NoteEvent::Hit(DrumHit::HiHat), 0);
        kit.process(1);
        assert_eq!(kit.active_voices(), 1);
    }

    #[test]
    fn test_voices_decay_to_idle() {
        let mut kit = DrumKit::new(44_100.0);
        kit.queue_note(NoteEvent::Hit(DrumHit::Rim), 0);
        for _ in 0..40 {
            kit.process(1024);
        }
        assert_eq!(kit.active_voices(), 0);
    }

    #[test]
    fn test_all_notes_off_drops_pending() {
        let mut kit = DrumKit::new(44_100.0);
        kit.queue_note(NoteEvent::Hit(DrumHit::Snare), 10);
        kit.all_notes_off();
        assert_eq!(peak(kit.process(512)), 0.0);
    }
}
