//! Time-based trigger machinery
//!
//! The timer wheel holds the runtime counterparts of persisted scheduled
//! events and is polled at a fixed resolution; due timers raise
//! `TimerFired` events on the orchestration channel.

pub mod timeparse;
mod timer;

pub use timer::TimeEvent;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::events::{EventSender, OrchestrationEvent};

/// A timer that fired during one polling tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFire {
    pub label: String,
    pub recurrent: bool,
}

/// Runtime timers keyed by label.
#[derive(Default)]
pub struct TimerWheel {
    events: HashMap<String, TimeEvent>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: TimeEvent) {
        self.events.insert(event.label().to_string(), event);
    }

    /// Removes the timer; idempotent.
    pub fn remove(&mut self, label: &str) -> bool {
        self.events.remove(label).is_some()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.events.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Collects every due timer, advancing recurrent ones and discarding
    /// one-shots.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<TimerFire> {
        let due: Vec<String> = self
            .events
            .iter()
            .filter(|(_, event)| event.due(now))
            .map(|(label, _)| label.clone())
            .collect();

        let mut fired = Vec::with_capacity(due.len());
        for label in due {
            let recurrent = self
                .events
                .get(&label)
                .map(TimeEvent::is_recurrent)
                .unwrap_or(false);
            if recurrent {
                if let Some(event) = self.events.get_mut(&label) {
                    event.advance(now);
                }
            } else {
                self.events.remove(&label);
            }
            fired.push(TimerFire { label, recurrent });
        }
        fired
    }
}

/// Spawns the polling loop over a shared wheel.
pub fn start_polling(
    wheel: Arc<Mutex<TimerWheel>>,
    resolution: Duration,
    events: EventSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("timer wheel polling every {:?}", resolution);
        let mut interval = tokio::time::interval(resolution);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let fired = wheel.lock().expect("timer wheel lock").tick(Utc::now());
            for fire in fired {
                tracing::debug!("timer fired: {}", fire.label);
                if events
                    .send(OrchestrationEvent::TimerFired {
                        label: fire.label,
                        recurrent: fire.recurrent,
                    })
                    .is_err()
                {
                    tracing::info!("event channel closed, stopping timer loop");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_recurring_two_second_timer_over_five_ticks() {
        let base = Utc::now();
        let mut wheel = TimerWheel::new();
        wheel.add(TimeEvent::new("beat", base, Some(TimeDelta::seconds(2)), base).unwrap());

        let mut fired_at = Vec::new();
        for tick in 1..=5 {
            let now = base + TimeDelta::seconds(tick);
            if !wheel.tick(now).is_empty() {
                fired_at.push(tick);
            }
        }

        assert_eq!(fired_at, vec![2, 4]);
        assert!(wheel.contains("beat"));
    }

    #[test]
    fn test_one_shot_is_discarded_after_firing() {
        let base = Utc::now();
        let mut wheel = TimerWheel::new();
        wheel.add(TimeEvent::new("once", base + TimeDelta::seconds(1), None, base).unwrap());

        assert!(wheel.tick(base).is_empty());
        let fired = wheel.tick(base + TimeDelta::seconds(1));
        assert_eq!(
            fired,
            vec![TimerFire {
                label: "once".to_string(),
                recurrent: false
            }]
        );
        assert!(!wheel.contains("once"));
        assert!(wheel.tick(base + TimeDelta::seconds(2)).is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let base = Utc::now();
        let mut wheel = TimerWheel::new();
        wheel.add(TimeEvent::new("x", base + TimeDelta::seconds(5), None, base).unwrap());

        assert!(wheel.remove("x"));
        assert!(!wheel.remove("x"));
        assert!(!wheel.remove("never-added"));
    }
}
