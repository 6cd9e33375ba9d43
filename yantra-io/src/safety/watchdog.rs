//! Drive watchdog
//!
//! One thread holding at most one armed deadline. Arming replaces any
//! previous deadline; each arm carries the transition generation, and the
//! expiry callback receives it so a fire that lost a race against a newer
//! command can be recognized as stale and dropped.

use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::Result;

enum WatchdogMsg {
    Arm { generation: u64, deadline: Instant },
    Cancel,
    Shutdown,
}

/// Handle to the watchdog thread
pub struct Watchdog {
    tx: Sender<WatchdogMsg>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Spawn the watchdog thread. `on_expire` runs on that thread with the
    /// generation of the expired arm.
    pub fn spawn<F>(on_expire: F) -> Result<Self>
    where
        F: Fn(u64) + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("drive-watchdog".to_string())
            .spawn(move || watchdog_loop(rx, on_expire))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Arm (or re-arm) the deadline for the given generation
    pub fn arm(&self, generation: u64, deadline: Instant) {
        let _ = self.tx.send(WatchdogMsg::Arm {
            generation,
            deadline,
        });
    }

    /// Disarm without firing
    pub fn cancel(&self) {
        let _ = self.tx.send(WatchdogMsg::Cancel);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let _ = self.tx.send(WatchdogMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn watchdog_loop<F: Fn(u64)>(rx: Receiver<WatchdogMsg>, on_expire: F) {
    let mut armed: Option<(u64, Instant)> = None;
    loop {
        let msg = match armed {
            Some((generation, deadline)) => {
                let now = Instant::now();
                if now >= deadline {
                    armed = None;
                    on_expire(generation);
                    continue;
                }
                match rx.recv_timeout(deadline - now) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => {
                        armed = None;
                        on_expire(generation);
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            },
        };

        match msg {
            WatchdogMsg::Arm {
                generation,
                deadline,
            } => armed = Some((generation, deadline)),
            WatchdogMsg::Cancel => armed = None,
            WatchdogMsg::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fires_at_deadline() {
        let (fired_tx, fired_rx) = crossbeam_channel::unbounded();
        let watchdog = Watchdog::spawn(move |generation| {
            let _ = fired_tx.send(generation);
        })
        .unwrap();

        watchdog.arm(7, Instant::now() + Duration::from_millis(30));
        let generation = fired_rx
            .recv_timeout(Duration::from_millis(500))
            .expect("watchdog did not fire");
        assert_eq!(generation, 7);
    }

    #[test]
    fn test_cancel_suppresses_fire() {
        let (fired_tx, fired_rx) = crossbeam_channel::unbounded();
        let watchdog = Watchdog::spawn(move |generation| {
            let _ = fired_tx.send(generation);
        })
        .unwrap();

        watchdog.arm(1, Instant::now() + Duration::from_millis(60));
        watchdog.cancel();
        assert!(fired_rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let (fired_tx, fired_rx) = crossbeam_channel::unbounded();
        let watchdog = Watchdog::spawn(move |generation| {
            let _ = fired_tx.send(generation);
        })
        .unwrap();

        watchdog.arm(1, Instant::now() + Duration::from_millis(400));
        watchdog.arm(2, Instant::now() + Duration::from_millis(30));

        let generation = fired_rx
            .recv_timeout(Duration::from_millis(500))
            .expect("replacement arm did not fire");
        assert_eq!(generation, 2);
        // the first arm was replaced, so only one fire total
        assert!(fired_rx.recv_timeout(Duration::from_millis(500)).is_err());
    }
}
