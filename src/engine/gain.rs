//! Shared gain parameter with exponential ramps
//!
//! Single point of audible volume control. Exponential (not linear) ramps
//! match logarithmic loudness perception, which means neither endpoint may
//! be zero: every target is clamped to [`RAMP_EPSILON`].
//!
//! At most one ramp is in flight; a new set or ramp replaces it, sampling
//! the current curve value as the new starting point (last-write-wins).

use crate::config::RAMP_EPSILON;

#[derive(Debug, Clone)]
struct Ramp {
    from: f32,
    to: f32,
    start: f64,
    end: f64,
}

/// Automatable gain value on the engine clock.
#[derive(Debug)]
pub struct GainParam {
    /// Value once any ramp completes.
    value: f32,
    ramp: Option<Ramp>,
}

impl GainParam {
    pub fn new(initial: f32) -> Self {
        Self {
            value: initial.clamp(RAMP_EPSILON, 1.0),
            ramp: None,
        }
    }

    /// Gain at clock time `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        match &self.ramp {
            None => self.value,
            Some(r) if t <= r.start => r.from,
            Some(r) if t >= r.end => r.to,
            Some(r) => {
                let k = ((t - r.start) / (r.end - r.start)) as f32;
                // Exponential interpolation: v(t) = v0 * (v1/v0)^k
                r.from * (r.to / r.from).powf(k)
            }
        }
    }

    /// Jump immediately to `v`, cancelling any ramp.
    pub fn set_value(&mut self, v: f32) {
        self.value = v.clamp(RAMP_EPSILON, 1.0);
        self.ramp = None;
    }

    /// Ramp exponentially from the current curve value to `target`,
    /// finishing `duration` seconds after `now`. Replaces any prior ramp.
    pub fn ramp_to(&mut self, target: f32, now: f64, duration: f64) {
        let from = self.value_at(now).clamp(RAMP_EPSILON, 1.0);
        let to = target.clamp(RAMP_EPSILON, 1.0);
        self.value = to;
        if duration <= 0.0 {
            self.ramp = None;
            return;
        }
        self.ramp = Some(Ramp {
            from,
            to,
            start: now,
            end: now + duration,
        });
    }

    /// The value the parameter is heading toward (or sitting at).
    pub fn target(&self) -> f32 {
        self.value
    }
}
