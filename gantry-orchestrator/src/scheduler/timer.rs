//! Runtime timer events

use chrono::{DateTime, TimeDelta, Utc};
use gantry_core::error::GantryError;

/// In-memory counterpart of a persisted scheduled event.
///
/// Created when the event is activated or loaded at startup, advanced after
/// each fire when recurrent, discarded after a one-shot fire.
#[derive(Debug, Clone)]
pub struct TimeEvent {
    label: String,
    recurrence: Option<TimeDelta>,
    next_fire: DateTime<Utc>,
}

impl TimeEvent {
    /// Builds a timer from its base trigger instant.
    ///
    /// A one-shot trigger that has already elapsed is rejected outright; a
    /// recurrent base in the past rolls forward to the first instant after
    /// `now` on the recurrence grid.
    pub fn new(
        label: impl Into<String>,
        trigger: DateTime<Utc>,
        recurrence: Option<TimeDelta>,
        now: DateTime<Utc>,
    ) -> Result<Self, GantryError> {
        let label = label.into();
        let next_fire = match recurrence {
            None => {
                if trigger <= now {
                    return Err(GantryError::SchedulingPast {
                        label,
                        time: trigger,
                    });
                }
                trigger
            }
            Some(step) => {
                if step <= TimeDelta::zero() {
                    return Err(GantryError::InvalidArgument(format!(
                        "recurrence for {label} must be positive"
                    )));
                }
                next_on_grid(trigger, step, now)
            }
        };
        Ok(Self {
            label,
            recurrence,
            next_fire,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_recurrent(&self) -> bool {
        self.recurrence.is_some()
    }

    pub fn next_fire(&self) -> DateTime<Utc> {
        self.next_fire
    }

    /// True once the fire instant has passed.
    pub fn due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire <= now
    }

    /// Recomputes the next fire instant after a fire at `now`.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        if let Some(step) = self.recurrence {
            self.next_fire = next_on_grid(self.next_fire, step, now);
        }
    }
}

/// First instant strictly after `now` on the grid `base + k * step`.
fn next_on_grid(base: DateTime<Utc>, step: TimeDelta, now: DateTime<Utc>) -> DateTime<Utc> {
    if base > now {
        return base;
    }
    let elapsed_ms = (now - base).num_milliseconds();
    let step_ms = step.num_milliseconds().max(1);
    let periods = elapsed_ms / step_ms + 1;
    base + TimeDelta::milliseconds(periods * step_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_in_the_past_is_rejected() {
        let now = Utc::now();
        let err = TimeEvent::new("late", now - TimeDelta::seconds(1), None, now).unwrap_err();
        assert!(matches!(err, GantryError::SchedulingPast { .. }));

        // a trigger at exactly "now" has already elapsed
        let err = TimeEvent::new("exact", now, None, now).unwrap_err();
        assert!(matches!(err, GantryError::SchedulingPast { .. }));
    }

    #[test]
    fn test_one_shot_in_the_future() {
        let now = Utc::now();
        let trigger = now + TimeDelta::seconds(30);
        let event = TimeEvent::new("soon", trigger, None, now).unwrap();

        assert!(!event.is_recurrent());
        assert_eq!(event.next_fire(), trigger);
        assert!(!event.due(now));
        assert!(event.due(trigger));
    }

    #[test]
    fn test_recurrent_past_base_rolls_forward() {
        let now = Utc::now();
        let base = now - TimeDelta::seconds(7);
        let event = TimeEvent::new("beat", base, Some(TimeDelta::seconds(3)), now).unwrap();

        // grid: base+3, base+6 (past), base+9 is the first after now
        assert_eq!(event.next_fire(), base + TimeDelta::seconds(9));
    }

    #[test]
    fn test_recurrent_future_base_fires_at_base_plus_step() {
        let now = Utc::now();
        let event = TimeEvent::new("beat", now, Some(TimeDelta::seconds(2)), now).unwrap();
        assert_eq!(event.next_fire(), now + TimeDelta::seconds(2));
    }

    #[test]
    fn test_advance_skips_missed_periods() {
        let now = Utc::now();
        let mut event = TimeEvent::new("beat", now, Some(TimeDelta::seconds(2)), now).unwrap();

        // a long stall advances past every missed period in one step
        let late = now + TimeDelta::seconds(61);
        event.advance(late);
        assert!(event.next_fire() > late);
        assert!(event.next_fire() <= late + TimeDelta::seconds(2));
    }

    #[test]
    fn test_zero_recurrence_is_rejected() {
        let now = Utc::now();
        let err = TimeEvent::new("bad", now, Some(TimeDelta::zero()), now).unwrap_err();
        assert!(matches!(err, GantryError::InvalidArgument(_)));
    }
}
