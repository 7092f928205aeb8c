use serde::{Deserialize, Serialize};

const TIME_EPSILON: f64 = 1e-6;

/// Auto-repeat shape for one held action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeatPolicy {
    pub trigger_on_start: bool,
    /// Seconds held before the first repeat.
    pub initial_delay: f32,
    /// Seconds between repeats after the first; zero or less repeats every tick.
    pub repeat_interval: f32,
    /// Maximum triggers per hold; zero is unbounded.
    pub trigger_limit: u32,
    pub affected_by_time_dilation: bool,
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        Self {
            trigger_on_start: true,
            initial_delay: 0.5,
            repeat_interval: 0.1,
            trigger_limit: 0,
            affected_by_time_dilation: false,
        }
    }
}

impl RepeatPolicy {
    /// Fires once on press and never repeats.
    pub fn single_shot() -> Self {
        Self {
            trigger_on_start: true,
            initial_delay: 0.0,
            repeat_interval: 0.0,
            trigger_limit: 1,
            affected_by_time_dilation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStep {
    pub pressed: bool,
    pub released: bool,
    /// Trigger number fired this tick, counted from 1 within the current hold.
    pub triggered: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RepeatTimer {
    held: f64,
    count: u32,
    triggered_on_start: bool,
    was_down: bool,
    suppressed: bool,
}

impl RepeatTimer {
    pub fn held_duration(&self) -> f64 {
        self.held
    }

    pub fn trigger_count(&self) -> u32 {
        self.count
    }

    pub fn is_held(&self) -> bool {
        self.was_down
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Ignores the current hold; the next press after a release starts fresh.
    pub fn suppress_until_release(&mut self) {
        *self = Self {
            suppressed: true,
            ..Self::default()
        };
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Advances one tick. Held time stays at zero on the press tick and
    /// grows by `dt` (times `time_dilation` when the policy asks) afterwards.
    /// At most one trigger fires per tick.
    pub fn update(
        &mut self,
        is_down: bool,
        dt: f32,
        time_dilation: f32,
        policy: &RepeatPolicy,
    ) -> TimerStep {
        if !is_down {
            let released = self.was_down;
            self.reset();
            return TimerStep {
                released,
                ..TimerStep::default()
            };
        }
        if self.suppressed {
            return TimerStep::default();
        }

        let pressed = !self.was_down;
        if pressed {
            self.was_down = true;
            self.held = 0.0;
        } else {
            let scale = if policy.affected_by_time_dilation {
                f64::from(time_dilation.max(0.0))
            } else {
                1.0
            };
            self.held += f64::from(dt.max(0.0)) * scale;
        }

        TimerStep {
            pressed,
            released: false,
            triggered: self.evaluate(pressed, policy),
        }
    }

    fn evaluate(&mut self, pressed: bool, policy: &RepeatPolicy) -> Option<u32> {
        if policy.trigger_limit > 0 && self.count >= policy.trigger_limit {
            return None;
        }

        if pressed && policy.trigger_on_start {
            self.triggered_on_start = true;
            return Some(self.fire());
        }

        let initial_delay = f64::from(policy.initial_delay.max(0.0));
        if self.held + TIME_EPSILON < initial_delay {
            return None;
        }

        let interval = f64::from(policy.repeat_interval);
        let start_fires = u32::from(self.triggered_on_start);
        let due = if interval <= 0.0 {
            u32::MAX
        } else {
            let repeats = ((self.held - initial_delay + TIME_EPSILON) / interval).floor();
            (repeats as u32).saturating_add(1).saturating_add(start_fires)
        };

        if self.count < due {
            Some(self.fire())
        } else {
            None
        }
    }

    fn fire(&mut self) -> u32 {
        self.count += 1;
        self.count
    }
}
