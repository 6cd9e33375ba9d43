//! Obstacle proximity monitor
//!
//! Owns the safety override record. A valid sample below the threshold sets
//! the override; a valid sample at or above it clears it. A failed sample
//! leaves the record untouched: a sensor that stops answering keeps the
//! last known override until a valid reading says otherwise.

use std::time::Instant;

/// Override set by a below-threshold sample
#[derive(Debug, Clone, Copy)]
pub struct OverrideRecord {
    /// Distance that tripped the override (cm)
    pub distance_cm: f64,
    /// When the tripping sample arrived
    pub recorded_at: Instant,
}

/// Tracks the obstacle override from proximity samples
#[derive(Debug, Default)]
pub struct ObstacleMonitor {
    active: Option<OverrideRecord>,
    samples: u64,
    timeouts: u64,
}

impl ObstacleMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one valid sample; returns true iff the override is now active
    pub fn sample(&mut self, distance_cm: f64, threshold_cm: f64, now: Instant) -> bool {
        self.samples += 1;
        if distance_cm < threshold_cm {
            self.active = Some(OverrideRecord {
                distance_cm,
                recorded_at: now,
            });
            true
        } else {
            self.active = None;
            false
        }
    }

    /// Record a failed sample; the override state does not change
    pub fn note_timeout(&mut self) {
        self.timeouts += 1;
    }

    /// Current override, if any
    pub fn active(&self) -> Option<&OverrideRecord> {
        self.active.as_ref()
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_sets_override() {
        let mut monitor = ObstacleMonitor::new();
        assert!(monitor.sample(15.0, 30.0, Instant::now()));
        let record = monitor.active().unwrap();
        assert_eq!(record.distance_cm, 15.0);
    }

    #[test]
    fn test_clear_requires_valid_sample() {
        let mut monitor = ObstacleMonitor::new();
        let now = Instant::now();
        monitor.sample(10.0, 30.0, now);

        // timeouts must not clear the override
        monitor.note_timeout();
        monitor.note_timeout();
        assert!(monitor.active().is_some());
        assert_eq!(monitor.timeouts(), 2);

        // a valid far reading does
        assert!(!monitor.sample(120.0, 30.0, now));
        assert!(monitor.active().is_none());
    }

    #[test]
    fn test_timeout_does_not_set_override() {
        let mut monitor = ObstacleMonitor::new();
        monitor.note_timeout();
        assert!(monitor.active().is_none());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut monitor = ObstacleMonitor::new();
        assert!(!monitor.sample(30.0, 30.0, Instant::now()));
        assert!(monitor.active().is_none());
    }
}
