//! Shot sound using the Web Audio API
//!
//! The "lol" cue is synthesized with an oscillator, no sample files needed.
//! Fast autofire overlaps many cues, so voices are capped (the oldest one is
//! cut) and the master gain ducks as more voices play at once.

use std::collections::VecDeque;

/// Lowest master gain ducking goes down to
pub const DUCK_FLOOR: f32 = 0.3;

/// Master gain for `active` overlapping voices
pub fn ducked_gain(master: f32, active: usize) -> f32 {
    if active <= 1 {
        return master;
    }
    (master / (active as f32 * 0.7).sqrt()).max(DUCK_FLOOR.min(master))
}

/// Playing voices, oldest first
#[derive(Debug)]
pub struct VoicePool<V> {
    max: usize,
    voices: VecDeque<(V, f64)>,
}

impl<V> VoicePool<V> {
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            voices: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Drop voices that finished by `now` (audio clock seconds)
    pub fn prune(&mut self, now: f64) -> Vec<V> {
        let mut done = Vec::new();
        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].1 <= now {
                if let Some((voice, _)) = self.voices.remove(i) {
                    done.push(voice);
                }
            } else {
                i += 1;
            }
        }
        done
    }

    /// Track a new voice. Returns the voice cut to make room, if any.
    pub fn push(&mut self, voice: V, ends_at: f64) -> Option<V> {
        let cut = if self.voices.len() >= self.max {
            self.voices.pop_front().map(|(v, _)| v)
        } else {
            None
        };
        self.voices.push_back((voice, ends_at));
        cut
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::AudioManager;

#[cfg(target_arch = "wasm32")]
mod web {
    use web_sys::{AudioContext, AudioContextState, GainNode, OscillatorNode, OscillatorType};

    use super::{VoicePool, ducked_gain};
    use crate::settings::AudioSettings;
    use crate::stage::HookError;

    /// Length of one cue (s)
    const CUE_SECONDS: f64 = 0.22;

    pub struct AudioManager {
        ctx: Option<AudioContext>,
        master: Option<GainNode>,
        voices: VoicePool<OscillatorNode>,
        settings: AudioSettings,
    }

    impl AudioManager {
        pub fn new(settings: AudioSettings) -> Self {
            // May fail outside a secure context
            let ctx = AudioContext::new().ok();
            let master = ctx.as_ref().and_then(|ctx| {
                let gain = ctx.create_gain().ok()?;
                gain.gain().set_value(settings.master_volume);
                gain.connect_with_audio_node(&ctx.destination()).ok()?;
                Some(gain)
            });
            if master.is_none() {
                log::warn!("Failed to create AudioContext - audio disabled");
            }
            Self {
                ctx,
                master,
                voices: VoicePool::new(settings.max_voices),
                settings,
            }
        }

        /// Resume audio context (required after user gesture)
        pub fn resume(&self) {
            if let Some(ctx) = &self.ctx
                && ctx.state() == AudioContextState::Suspended
            {
                let _ = ctx.resume();
            }
        }

        /// Play one "lol" cue
        pub fn play_lol(&mut self) -> Result<(), HookError> {
            let (Some(ctx), Some(master)) = (&self.ctx, &self.master) else {
                return Err(HookError::Unavailable("audio"));
            };
            if self.settings.muted || self.settings.master_volume <= 0.0 {
                return Ok(());
            }
            self.resume();

            let t = ctx.current_time();
            for finished in self.voices.prune(t) {
                let _ = finished.disconnect();
            }

            let js = |e: wasm_bindgen::JsValue| HookError::Js(format!("{e:?}"));
            let osc = ctx.create_oscillator().map_err(js)?;
            let env = ctx.create_gain().map_err(js)?;
            osc.set_type(OscillatorType::Triangle);
            osc.connect_with_audio_node(&env).map_err(js)?;
            env.connect_with_audio_node(master).map_err(js)?;

            // "L-O-L": up, down, up
            let freq = osc.frequency();
            freq.set_value_at_time(520.0, t).map_err(js)?;
            freq.set_value_at_time(390.0, t + 0.07).map_err(js)?;
            freq.set_value_at_time(560.0, t + 0.14).map_err(js)?;

            let gain = env.gain();
            gain.set_value_at_time(0.5, t).map_err(js)?;
            gain.exponential_ramp_to_value_at_time(0.01, t + CUE_SECONDS)
                .map_err(js)?;

            osc.start().map_err(js)?;
            osc.stop_with_when(t + CUE_SECONDS).map_err(js)?;

            if let Some(cut) = self.voices.push(osc, t + CUE_SECONDS) {
                let _ = cut.stop();
                let _ = cut.disconnect();
            }

            let target = ducked_gain(self.settings.master_volume, self.voices.len());
            master
                .gain()
                .set_target_at_time(target, t, 0.05)
                .map_err(js)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ducking_curve() {
        assert_eq!(ducked_gain(0.8, 0), 0.8);
        assert_eq!(ducked_gain(0.8, 1), 0.8);
        assert!((ducked_gain(0.8, 2) - 0.676).abs() < 1e-3);
        assert_eq!(ducked_gain(0.8, 15), DUCK_FLOOR);
        // Never louder than the master volume
        assert_eq!(ducked_gain(0.2, 15), 0.2);
    }

    #[test]
    fn test_voice_cap_cuts_oldest() {
        let mut pool = VoicePool::new(3);
        for v in 0..3 {
            assert_eq!(pool.push(v, 1.0), None);
        }
        assert_eq!(pool.push(3, 1.0), Some(0));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_prune_finished_voices() {
        let mut pool = VoicePool::new(15);
        pool.push("a", 0.2);
        pool.push("b", 0.5);
        pool.push("c", 0.3);
        assert_eq!(pool.prune(0.3), vec!["a", "c"]);
        assert_eq!(pool.len(), 1);
        assert!(!pool.is_empty());
    }
}
