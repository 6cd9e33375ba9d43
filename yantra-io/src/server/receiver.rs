//! Command receiver for the controller session
//!
//! Reads post-handshake frames from the socket and feeds drive commands
//! into the safety machine. The read loop wakes every 500 ms so shutdown
//! and displacement flags are honored even on a silent link. Losing the
//! link forces a stop before the thread exits; the session server repeats
//! that on teardown, which is harmless because the stop is idempotent.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use setu_link::{read_frame, Frame, LinkError, Serializer};

use crate::safety::SafetyController;

/// Typical command frame size
const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Reader half of one controller session
pub struct CommandReceiver {
    serializer: Serializer,
    safety: Arc<SafetyController>,
    /// Daemon shutdown flag
    running: Arc<AtomicBool>,
    /// Shared with the publisher and the session server
    conn_alive: Arc<AtomicBool>,
    read_buffer: Vec<u8>,
}

impl CommandReceiver {
    pub fn new(
        serializer: Serializer,
        safety: Arc<SafetyController>,
        running: Arc<AtomicBool>,
        conn_alive: Arc<AtomicBool>,
    ) -> Self {
        Self {
            serializer,
            safety,
            running,
            conn_alive,
            read_buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Run the receive loop until disconnect or shutdown
    pub fn run(&mut self, mut stream: TcpStream) {
        if let Err(e) = stream.set_read_timeout(Some(Duration::from_millis(500))) {
            log::warn!("Receiver: failed to set read timeout: {}", e);
        }

        loop {
            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            if !self.conn_alive.load(Ordering::Relaxed) {
                break;
            }

            match self.read_next(&mut stream) {
                Ok(Some(Frame::Command(cmd))) => {
                    log::debug!("Receiver: {} command, {:.2} s", cmd.direction, cmd.duration_s);
                    // decision and events are handled inside the machine
                    self.safety.issue(&cmd);
                }
                Ok(Some(frame)) => {
                    log::warn!("Receiver: unexpected {} frame, dropped", frame.name());
                }
                Ok(None) => {
                    // read timeout tick
                }
                Err(e) => {
                    self.conn_alive.store(false, Ordering::Relaxed);
                    let _ = stream.shutdown(std::net::Shutdown::Both);
                    match e {
                        LinkError::Disconnected => log::info!("Receiver: controller disconnected"),
                        other => log::error!("Receiver: read failed: {}", other),
                    }
                    // stop immediately rather than waiting for teardown
                    if let Err(e) = self.safety.force_stop() {
                        log::error!("Receiver: forced stop failed: {}", e);
                    }
                    return;
                }
            }
        }

        self.conn_alive.store(false, Ordering::Relaxed);
        let _ = stream.shutdown(std::net::Shutdown::Both);
        log::debug!("Receiver: stopped");
    }

    fn read_next(&mut self, stream: &mut TcpStream) -> setu_link::Result<Option<Frame>> {
        match read_frame(stream, &mut self.read_buffer) {
            Ok(len) => {
                let frame = self.serializer.deserialize(&self.read_buffer[..len])?;
                Ok(Some(frame))
            }
            Err(LinkError::Io(ref e))
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
