//! Session-bound telemetry and event publisher
//!
//! Producers push into bounded lock-free queues; the publisher thread of
//! the live session drains them onto the socket. Telemetry queues are
//! small on purpose: force-push keeps the newest frames, so a controller
//! that falls behind skips data instead of receiving a backlog. The event
//! queue is deeper and an event that fails to send is pushed back, so a
//! completion or rejection survives until some session reads it.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;

use setu_link::{write_frame, Event, Frame, ProximityReading, ScanFrame, Serializer, Telemetry};

use crate::error::Result;

/// Scan frames kept for a lagging or absent controller
const SCAN_QUEUE_CAPACITY: usize = 8;
/// Proximity readings kept
const PROXIMITY_QUEUE_CAPACITY: usize = 32;
/// Events kept across session gaps
const EVENT_QUEUE_CAPACITY: usize = 100;

/// Frames written per queue per iteration, so one queue cannot starve the
/// others
const EVENT_BATCH_LIMIT: usize = 20;
const SCAN_BATCH_LIMIT: usize = 4;
const PROXIMITY_BATCH_LIMIT: usize = 20;

/// Idle pause when all queues are empty
const IDLE_PAUSE: Duration = Duration::from_millis(10);

/// The three publish queues shared by producers, the safety layer, and
/// the live session's publisher
#[derive(Clone)]
pub struct TelemetryQueues {
    pub scans: Arc<ArrayQueue<ScanFrame>>,
    pub proximity: Arc<ArrayQueue<ProximityReading>>,
    pub events: Arc<ArrayQueue<Event>>,
}

impl TelemetryQueues {
    pub fn new() -> Self {
        Self {
            scans: Arc::new(ArrayQueue::new(SCAN_QUEUE_CAPACITY)),
            proximity: Arc::new(ArrayQueue::new(PROXIMITY_QUEUE_CAPACITY)),
            events: Arc::new(ArrayQueue::new(EVENT_QUEUE_CAPACITY)),
        }
    }
}

impl Default for TelemetryQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer half of one controller session
pub struct SessionPublisher {
    serializer: Serializer,
    queues: TelemetryQueues,
    running: Arc<AtomicBool>,
    conn_alive: Arc<AtomicBool>,
}

impl SessionPublisher {
    pub fn new(
        serializer: Serializer,
        queues: TelemetryQueues,
        running: Arc<AtomicBool>,
        conn_alive: Arc<AtomicBool>,
    ) -> Self {
        Self {
            serializer,
            queues,
            running,
            conn_alive,
        }
    }

    /// Drain queues onto the stream until the session or the daemon ends
    pub fn run(&mut self, mut stream: TcpStream) {
        log::debug!("Publisher: started for {:?}", stream.peer_addr());

        let result = self.pump(&mut stream);

        self.conn_alive.store(false, Ordering::Relaxed);
        let _ = stream.shutdown(std::net::Shutdown::Both);
        match result {
            Ok(()) => log::debug!("Publisher: stopped"),
            Err(e) => log::info!("Publisher: session write ended: {}", e),
        }
    }

    fn pump(&mut self, stream: &mut TcpStream) -> Result<()> {
        while self.running.load(Ordering::Relaxed) && self.conn_alive.load(Ordering::Relaxed) {
            let mut wrote = false;

            // events first: a completion must not wait behind scan frames
            let mut batch = 0;
            while let Some(event) = self.queues.events.pop() {
                if let Err(e) = self.send(stream, &Frame::Event(event.clone())) {
                    // keep the event for the next session
                    let _ = self.queues.events.force_push(event);
                    return Err(e);
                }
                wrote = true;
                batch += 1;
                if batch >= EVENT_BATCH_LIMIT {
                    break;
                }
            }

            let mut batch = 0;
            while let Some(frame) = self.queues.scans.pop() {
                self.send(stream, &Frame::Telemetry(Telemetry::Scan(frame)))?;
                wrote = true;
                batch += 1;
                if batch >= SCAN_BATCH_LIMIT {
                    break;
                }
            }

            let mut batch = 0;
            while let Some(reading) = self.queues.proximity.pop() {
                self.send(stream, &Frame::Telemetry(Telemetry::Proximity(reading)))?;
                wrote = true;
                batch += 1;
                if batch >= PROXIMITY_BATCH_LIMIT {
                    break;
                }
            }

            if !wrote {
                thread::sleep(IDLE_PAUSE);
            }
        }
        Ok(())
    }

    fn send(&self, stream: &mut TcpStream, frame: &Frame) -> Result<()> {
        let payload = self.serializer.serialize(frame)?;
        write_frame(stream, &payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_latest_value_semantics() {
        let queues = TelemetryQueues::new();
        for i in 0..SCAN_QUEUE_CAPACITY as u64 + 3 {
            let frame = ScanFrame {
                timestamp_us: i,
                scan_number: i,
                ranges: vec![],
                angles_deg: vec![],
            };
            queues.scans.force_push(frame);
        }
        // the oldest three were displaced
        assert_eq!(queues.scans.len(), SCAN_QUEUE_CAPACITY);
        assert_eq!(queues.scans.pop().unwrap().scan_number, 3);
    }
}
