//! Parameter automation timelines.
//!
//! A parameter holds a default value until its first event. Events are kept
//! sorted by time; events at the same time keep their insertion order, so
//! the last one written wins. Ramps interpolate from the previous event's
//! `(time, value)` (or from `(0, default)` when there is none) and reach
//! their target exactly at their own time, matching WebAudio `AudioParam`.

/// How a parameter approaches an event's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ramp {
    /// Jump to the value at the event time.
    Set,
    /// Linear interpolation ending at the event time.
    Linear,
    /// Exponential interpolation ending at the event time.
    Exponential,
}

/// One scheduled change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub time: f64,
    pub value: f64,
    pub ramp: Ramp,
}

/// A time-ordered list of parameter changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Automation {
    default_value: f64,
    events: Vec<AutomationEvent>,
}

impl Automation {
    pub fn new(default_value: f64) -> Self {
        Automation {
            default_value,
            events: Vec::new(),
        }
    }

    /// Schedule an immediate jump to `value` at `time`.
    pub fn set_value_at_time(&mut self, value: f64, time: f64) -> &mut Self {
        self.insert(AutomationEvent {
            time,
            value,
            ramp: Ramp::Set,
        })
    }

    /// Ramp linearly from the previous event to `value` at `time`.
    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) -> &mut Self {
        self.insert(AutomationEvent {
            time,
            value,
            ramp: Ramp::Linear,
        })
    }

    /// Ramp exponentially from the previous event to `value` at `time`.
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, time: f64) -> &mut Self {
        self.insert(AutomationEvent {
            time,
            value,
            ramp: Ramp::Exponential,
        })
    }

    fn insert(&mut self, event: AutomationEvent) -> &mut Self {
        let idx = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(idx, event);
        self
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    /// True when no event was ever scheduled.
    pub fn is_constant(&self) -> bool {
        self.events.is_empty()
    }

    /// Parameter value at `time` seconds.
    pub fn value_at(&self, time: f64) -> f64 {
        let idx = self.events.partition_point(|e| e.time <= time);
        self.value_before(idx, time)
    }

    /// Value at `time`, given `idx` = number of events at or before `time`.
    fn value_before(&self, idx: usize, time: f64) -> f64 {
        let (start_time, start_value) = match idx {
            0 => (0.0, self.default_value),
            _ => {
                let e = &self.events[idx - 1];
                (e.time, e.value)
            }
        };

        let Some(next) = self.events.get(idx) else {
            return start_value;
        };

        let span = next.time - start_time;
        if span <= 0.0 || time < start_time {
            return start_value;
        }
        let progress = (time - start_time) / span;

        match next.ramp {
            Ramp::Set => start_value,
            Ramp::Linear => start_value + (next.value - start_value) * progress,
            Ramp::Exponential => {
                // Undefined across zero or a sign change: hold until the event.
                if start_value * next.value <= 0.0 {
                    start_value
                } else {
                    start_value * (next.value / start_value).powf(progress)
                }
            }
        }
    }

    /// Render one value per sample frame starting at time zero.
    pub fn render(&self, frames: usize, sample_rate: f64) -> Vec<f64> {
        if self.events.is_empty() {
            return vec![self.default_value; frames];
        }

        let mut out = Vec::with_capacity(frames);
        let mut idx = 0;
        for i in 0..frames {
            let t = i as f64 / sample_rate;
            while idx < self.events.len() && self.events[idx].time <= t {
                idx += 1;
            }
            out.push(self.value_before(idx, t));
        }
        out
    }
}
