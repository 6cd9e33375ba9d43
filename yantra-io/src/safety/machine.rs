//! Actuator safety state machine
//!
//! All drive output mutations go through [`SafetyCore`]. The core is not
//! thread-safe by itself; [`super::SafetyController`] wraps it in a mutex so
//! command intake, watchdog expiry, and obstacle samples apply as a strict
//! sequence of transitions.
//!
//! Transition rules:
//! - Issuing any command first supersedes the active one (outputs deasserted
//!   before the new command is even evaluated).
//! - A drive command is refused while the obstacle override is set.
//! - An obstacle sample below the threshold stops an active drive
//!   immediately, regardless of remaining duration.
//! - A timed drive is expired by the watchdog; the arm token is the
//!   transition generation, so an expiry racing a newer command is a no-op.
//! - A failed output write is answered with a deassert attempt; if that
//!   also fails the core latches `halted` and the daemon must shut down.

use std::time::{Duration, Instant};

use setu_link::{Direction, DriveCommand, Event};

use super::monitor::ObstacleMonitor;
use crate::drive::{DriveOutputs, DriveSignals};
use crate::error::{Error, Result};

/// Coarse machine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
    Idle,
    Driving,
}

impl ActuatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Driving => "driving",
        }
    }
}

/// Bookkeeping for the command currently driving the outputs
#[derive(Debug, Clone, Copy)]
pub struct ActiveCommand {
    pub direction: Direction,
    pub duration_s: f64,
    pub speed_pct: u8,
    /// Transition generation at accept time; watchdog arm token
    pub generation: u64,
    pub started_at: Instant,
    /// None for an indefinite drive (no watchdog)
    pub deadline: Option<Instant>,
}

/// What the caller must do with the watchdog after an issue
#[derive(Debug, Clone, PartialEq)]
pub enum IssueDecision {
    /// Drive accepted; arm the watchdog iff `deadline` is set
    Drive {
        generation: u64,
        deadline: Option<Instant>,
    },
    /// Explicit stop accepted; disarm the watchdog
    Stop,
    /// Command refused; outputs are deasserted
    Rejected { reason: String },
}

/// Lifetime transition counters for status reporting
#[derive(Debug, Default, Clone, Copy)]
pub struct SafetyStats {
    pub accepted: u64,
    pub rejected: u64,
    pub completions: u64,
    pub obstacle_stops: u64,
    pub faults: u64,
}

/// The single owner of the drive outputs
pub struct SafetyCore {
    state: ActuatorState,
    active: Option<ActiveCommand>,
    /// Bumped on every transition; stale watchdog tokens die against it
    generation: u64,
    monitor: ObstacleMonitor,
    outputs: Box<dyn DriveOutputs>,
    threshold_cm: f64,
    /// Set when outputs could not be deasserted; terminal
    halted: bool,
    stats: SafetyStats,
}

impl SafetyCore {
    pub fn new(outputs: Box<dyn DriveOutputs>, threshold_cm: f64) -> Self {
        Self {
            state: ActuatorState::Idle,
            active: None,
            generation: 0,
            monitor: ObstacleMonitor::new(),
            outputs,
            threshold_cm,
            halted: false,
            stats: SafetyStats::default(),
        }
    }

    /// Apply one command. Events produced by the transition are appended to
    /// `events`; the decision tells the caller how to (dis)arm the watchdog.
    pub fn issue(&mut self, cmd: &DriveCommand, now: Instant, events: &mut Vec<Event>) -> IssueDecision {
        if self.halted {
            return self.reject(cmd.direction, "actuator halted".to_string(), events);
        }

        // Supersede before evaluating: an incoming command always ends the
        // current drive, even if the new one is then refused.
        if self.state == ActuatorState::Driving {
            if let Err(e) = self.drive_idle() {
                self.stats.faults += 1;
                return self.reject(cmd.direction, format!("actuator fault: {}", e), events);
            }
        }

        if cmd.direction == Direction::Stop {
            // idempotent deassert even when already idle
            if let Err(e) = self.drive_idle() {
                self.stats.faults += 1;
                return self.reject(cmd.direction, format!("actuator fault: {}", e), events);
            }
            self.stats.accepted += 1;
            log::info!("Safety: stop");
            return IssueDecision::Stop;
        }

        if !cmd.duration_s.is_finite() || cmd.duration_s < 0.0 {
            return self.reject(
                cmd.direction,
                format!("invalid duration {}", cmd.duration_s),
                events,
            );
        }

        if let Some(record) = self.monitor.active().copied() {
            let reason = Error::BlockedByObstacle {
                distance_cm: record.distance_cm,
            }
            .to_string();
            return self.reject(cmd.direction, reason, events);
        }

        if let Err(e) = self.outputs.apply(DriveSignals::for_direction(cmd.direction)) {
            self.stats.faults += 1;
            self.recover_outputs();
            return self.reject(cmd.direction, format!("actuator fault: {}", e), events);
        }

        self.generation += 1;
        let speed_pct = cmd.speed_pct.min(100);
        let deadline = if cmd.duration_s > 0.0 {
            Some(now + Duration::from_secs_f64(cmd.duration_s))
        } else {
            None
        };
        self.state = ActuatorState::Driving;
        self.active = Some(ActiveCommand {
            direction: cmd.direction,
            duration_s: cmd.duration_s,
            speed_pct,
            generation: self.generation,
            started_at: now,
            deadline,
        });
        self.stats.accepted += 1;
        if deadline.is_some() {
            log::info!(
                "Safety: drive {} for {:.2} s at {}%",
                cmd.direction,
                cmd.duration_s,
                speed_pct
            );
        } else {
            log::info!("Safety: drive {} until stopped at {}%", cmd.direction, speed_pct);
        }
        IssueDecision::Drive {
            generation: self.generation,
            deadline,
        }
    }

    /// Watchdog expiry for the given arm token. Returns true if it ended a
    /// drive, false if the token was stale.
    pub fn watchdog_fired(&mut self, generation: u64, events: &mut Vec<Event>) -> Result<bool> {
        if self.halted || self.state != ActuatorState::Driving {
            return Ok(false);
        }
        let current = match self.active {
            Some(cmd) if cmd.generation == generation => cmd,
            _ => return Ok(false),
        };
        self.drive_idle()?;
        self.stats.completions += 1;
        log::info!(
            "Safety: {} completed after {:.2} s",
            current.direction,
            current.duration_s
        );
        events.push(Event::CommandCompleted {
            direction: current.direction,
            duration_s: current.duration_s,
        });
        Ok(true)
    }

    /// Feed one valid proximity sample. Sets or clears the override and
    /// stops an active drive when the override fires.
    pub fn proximity_sample(
        &mut self,
        distance_cm: f64,
        now: Instant,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        let was_active = self.monitor.active().is_some();
        let active = self.monitor.sample(distance_cm, self.threshold_cm, now);
        if active && !was_active {
            log::warn!(
                "Safety: obstacle override set ({:.1} cm < {:.1} cm)",
                distance_cm,
                self.threshold_cm
            );
        } else if !active && was_active {
            log::info!("Safety: obstacle override cleared ({:.1} cm)", distance_cm);
        }

        if active && self.state == ActuatorState::Driving {
            self.drive_idle()?;
            self.stats.obstacle_stops += 1;
            log::warn!("Safety: obstacle stop at {:.1} cm", distance_cm);
            events.push(Event::ObstacleStop { distance_cm });
        }
        Ok(())
    }

    /// A proximity read failed. The override state persists unchanged; a
    /// stuck sensor must never read as "clear".
    pub fn proximity_timeout(&mut self) {
        self.monitor.note_timeout();
    }

    /// Unconditional stop, used at session teardown and shutdown. Emits no
    /// completion event.
    pub fn force_stop(&mut self) -> Result<()> {
        if self.state == ActuatorState::Driving {
            if let Some(cmd) = self.active {
                log::warn!("Safety: forced stop while driving {}", cmd.direction);
            }
        }
        self.drive_idle()
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn active(&self) -> Option<ActiveCommand> {
        self.active
    }

    pub fn override_distance_cm(&self) -> Option<f64> {
        self.monitor.active().map(|r| r.distance_cm)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn stats(&self) -> SafetyStats {
        self.stats
    }

    /// Deassert and return to Idle, bumping the generation so any armed
    /// watchdog token goes stale.
    fn drive_idle(&mut self) -> Result<()> {
        let result = self.outputs.apply(DriveSignals::stop());
        self.state = ActuatorState::Idle;
        self.active = None;
        self.generation += 1;
        if let Err(e) = result {
            self.recover_outputs();
            return Err(e);
        }
        Ok(())
    }

    /// Last-resort deassert after a failed write. Failure here latches the
    /// halted flag: the output state is unknown and the daemon must exit.
    fn recover_outputs(&mut self) {
        if let Err(e) = self.outputs.deassert_all() {
            self.halted = true;
            log::error!("Safety: deassert failed after output fault, halting: {}", e);
        }
    }

    fn reject(&mut self, direction: Direction, reason: String, events: &mut Vec<Event>) -> IssueDecision {
        self.stats.rejected += 1;
        log::warn!("Safety: rejected {}: {}", direction, reason);
        events.push(Event::CommandRejected {
            reason: reason.clone(),
        });
        IssueDecision::Rejected { reason }
    }
}
