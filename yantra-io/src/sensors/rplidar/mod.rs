//! RPLIDAR A1 range scanner driver
//!
//! Serial request/response at 115200 baud. `start` puts the sensor in
//! continuous scan mode; after that the stream is a run of 5-byte
//! measurement nodes, assembled here into one frame per revolution
//! (start flag to start flag). A node that fails its validity bits means
//! the stream is misaligned; the driver resynchronizes by sliding one
//! byte at a time until a node parses again.

mod protocol;

pub use protocol::{Descriptor, MeasurementNode};

use std::time::{Duration, Instant};

use setu_link::{now_micros, ScanFrame};

use super::Scanner;
use crate::error::{Error, Result};
use crate::transport::Transport;
use protocol::{
    CMD_SCAN, CMD_STOP, DESCRIPTOR_LEN, DESCRIPTOR_SYNC, NODE_LEN, SCAN_DATA_TYPE, SYNC_BYTE,
};

/// A revolution that misses its closing start flag is discarded past this
const MAX_NODES_PER_REVOLUTION: usize = 2048;
/// Partial revolutions (joined mid-stream) below this are dropped
const MIN_NODES_PER_REVOLUTION: usize = 5;
/// Descriptor hunt gives up after this many stale bytes
const MAX_DESCRIPTOR_SKIP: usize = 512;

/// RPLIDAR A1 driver over a byte transport
pub struct RplidarScanner {
    transport: Box<dyn Transport>,
    response_timeout: Duration,
    scanning: bool,
    scan_number: u64,
    ranges: Vec<f64>,
    angles_deg: Vec<f64>,
    resync_bytes: u64,
}

impl RplidarScanner {
    pub fn new(transport: Box<dyn Transport>, response_timeout: Duration) -> Self {
        Self {
            transport,
            response_timeout,
            scanning: false,
            scan_number: 0,
            ranges: Vec::new(),
            angles_deg: Vec::new(),
            resync_bytes: 0,
        }
    }

    fn read_exact_deadline(&mut self, buf: &mut [u8], deadline: Instant) -> Result<()> {
        let mut offset = 0;
        while offset < buf.len() {
            let read = self.transport.read(&mut buf[offset..])?;
            if read == 0 && Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            offset += read;
        }
        Ok(())
    }

    /// Read the response descriptor, hunting for the sync pair so stale
    /// bytes from a previous scan cannot derail the request.
    fn read_descriptor(&mut self) -> Result<Descriptor> {
        let deadline = Instant::now() + self.response_timeout;

        let mut window = [0u8; 2];
        self.read_exact_deadline(&mut window, deadline)?;
        let mut skipped = 0;
        while !(window[0] == SYNC_BYTE && window[1] == DESCRIPTOR_SYNC) {
            skipped += 1;
            if skipped > MAX_DESCRIPTOR_SKIP {
                return Err(Error::InvalidPacket(
                    "no response descriptor in stream".to_string(),
                ));
            }
            window[0] = window[1];
            let mut byte = [0u8; 1];
            self.read_exact_deadline(&mut byte, deadline)?;
            window[1] = byte[0];
        }
        if skipped > 0 {
            log::debug!("Rplidar: skipped {} stale bytes before descriptor", skipped);
        }

        let mut buf = [0u8; DESCRIPTOR_LEN];
        buf[0] = SYNC_BYTE;
        buf[1] = DESCRIPTOR_SYNC;
        self.read_exact_deadline(&mut buf[2..], deadline)?;
        Descriptor::parse(&buf)
    }

    /// Read one measurement node, sliding byte-by-byte past any corruption
    fn read_node(&mut self, deadline: Instant) -> Result<MeasurementNode> {
        let mut buf = [0u8; NODE_LEN];
        self.read_exact_deadline(&mut buf, deadline)?;
        loop {
            match MeasurementNode::parse(&buf) {
                Ok(node) => return Ok(node),
                Err(_) => {
                    self.resync_bytes += 1;
                    if self.resync_bytes % 1000 == 0 {
                        log::warn!("Rplidar: {} bytes dropped in resync so far", self.resync_bytes);
                    }
                    buf.copy_within(1.., 0);
                    let mut byte = [0u8; 1];
                    self.read_exact_deadline(&mut byte, deadline)?;
                    buf[NODE_LEN - 1] = byte[0];
                }
            }
        }
    }
}

impl Scanner for RplidarScanner {
    fn start(&mut self) -> Result<()> {
        // leave any previous scan mode before requesting a new one
        self.transport.write(&[SYNC_BYTE, CMD_STOP])?;
        self.transport.flush()?;
        std::thread::sleep(Duration::from_millis(10));

        self.transport.write(&[SYNC_BYTE, CMD_SCAN])?;
        self.transport.flush()?;

        let descriptor = self.read_descriptor()?;
        if descriptor.data_type != SCAN_DATA_TYPE || descriptor.payload_len as usize != NODE_LEN {
            return Err(Error::InvalidPacket(format!(
                "unexpected scan descriptor: type 0x{:02X}, len {}",
                descriptor.data_type, descriptor.payload_len
            )));
        }

        self.scanning = true;
        self.ranges.clear();
        self.angles_deg.clear();
        log::info!("Rplidar: scan mode entered");
        Ok(())
    }

    fn read_scan(&mut self) -> Result<Option<ScanFrame>> {
        if !self.scanning {
            return Ok(None);
        }

        let deadline = Instant::now() + self.response_timeout;
        loop {
            let node = self.read_node(deadline)?;

            if node.start_flag && !self.ranges.is_empty() {
                let ranges = std::mem::take(&mut self.ranges);
                let angles_deg = std::mem::take(&mut self.angles_deg);
                if node.is_valid() {
                    self.ranges.push(node.distance_m);
                    self.angles_deg.push(node.angle_deg);
                }
                // a too-short run means we joined the stream mid-revolution
                if ranges.len() >= MIN_NODES_PER_REVOLUTION {
                    let frame = ScanFrame {
                        timestamp_us: now_micros(),
                        scan_number: self.scan_number,
                        ranges,
                        angles_deg,
                    };
                    self.scan_number += 1;
                    return Ok(Some(frame));
                }
                continue;
            }

            if node.is_valid() {
                self.ranges.push(node.distance_m);
                self.angles_deg.push(node.angle_deg);
            }
            if self.ranges.len() > MAX_NODES_PER_REVOLUTION {
                log::warn!(
                    "Rplidar: {} nodes without a start flag, dropping revolution",
                    self.ranges.len()
                );
                self.ranges.clear();
                self.angles_deg.clear();
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.transport.write(&[SYNC_BYTE, CMD_STOP])?;
        self.transport.flush()?;
        self.scanning = false;
        log::info!("Rplidar: scan mode left");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    const SCAN_DESCRIPTOR: [u8; 7] = [0xA5, 0x5A, 0x05, 0x00, 0x00, 0x40, 0x81];

    fn node_bytes(start: bool, quality: u8, angle_deg: f64, distance_m: f64) -> [u8; 5] {
        let b0 = (quality << 2) | if start { 0x01 } else { 0x02 };
        let angle_q6 = (angle_deg * 64.0).round() as u16;
        let b1 = (((angle_q6 & 0x7F) as u8) << 1) | 0x01;
        let b2 = (angle_q6 >> 7) as u8;
        let dist_q2 = (distance_m * 4000.0).round() as u16;
        [b0, b1, b2, dist_q2 as u8, (dist_q2 >> 8) as u8]
    }

    fn inject_revolution(mock: &MockTransport, samples: usize, distance_m: f64) {
        for i in 0..samples {
            let angle = i as f64 * (360.0 / samples as f64);
            mock.inject_read(&node_bytes(i == 0, 40, angle, distance_m));
        }
    }

    fn scanner_on(mock: &MockTransport) -> RplidarScanner {
        RplidarScanner::new(Box::new(mock.clone()), Duration::from_millis(200))
    }

    #[test]
    fn test_start_sends_stop_then_scan() {
        let mock = MockTransport::new();
        mock.inject_read(&SCAN_DESCRIPTOR);

        let mut scanner = scanner_on(&mock);
        scanner.start().unwrap();
        assert_eq!(mock.get_written(), vec![0xA5, 0x25, 0xA5, 0x20]);
    }

    #[test]
    fn test_start_rejects_wrong_descriptor() {
        let mock = MockTransport::new();
        // wrong data type
        mock.inject_read(&[0xA5, 0x5A, 0x05, 0x00, 0x00, 0x40, 0x04]);

        let mut scanner = scanner_on(&mock);
        assert!(scanner.start().is_err());
    }

    #[test]
    fn test_descriptor_found_after_stale_bytes() {
        let mock = MockTransport::new();
        mock.inject_read(&[0x11, 0x22, 0x33]);
        mock.inject_read(&SCAN_DESCRIPTOR);

        let mut scanner = scanner_on(&mock);
        scanner.start().unwrap();
    }

    #[test]
    fn test_revolution_assembly() {
        let mock = MockTransport::new();
        mock.inject_read(&SCAN_DESCRIPTOR);
        inject_revolution(&mock, 8, 1.5);
        // next revolution's start node closes the first
        mock.inject_read(&node_bytes(true, 40, 0.0, 1.5));

        let mut scanner = scanner_on(&mock);
        scanner.start().unwrap();
        let frame = scanner.read_scan().unwrap().expect("no frame assembled");

        assert_eq!(frame.scan_number, 0);
        assert_eq!(frame.ranges.len(), 8);
        assert_eq!(frame.angles_deg.len(), 8);
        assert!((frame.ranges[0] - 1.5).abs() < 1e-3);
        assert!((frame.angles_deg[2] - 90.0).abs() < 0.1);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mock = MockTransport::new();
        mock.inject_read(&SCAN_DESCRIPTOR);
        // three bytes of line noise before the revolution; 0xFF can never
        // parse (both start-flag bits set)
        mock.inject_read(&[0xFF, 0xFF, 0xFF]);
        inject_revolution(&mock, 6, 0.8);
        mock.inject_read(&node_bytes(true, 40, 0.0, 0.8));

        let mut scanner = scanner_on(&mock);
        scanner.start().unwrap();
        let frame = scanner.read_scan().unwrap().expect("no frame after resync");
        assert_eq!(frame.ranges.len(), 6);
    }

    #[test]
    fn test_short_partial_revolution_dropped() {
        let mock = MockTransport::new();
        mock.inject_read(&SCAN_DESCRIPTOR);
        // two samples joined mid-revolution, then a full revolution
        mock.inject_read(&node_bytes(false, 40, 350.0, 1.0));
        mock.inject_read(&node_bytes(false, 40, 355.0, 1.0));
        inject_revolution(&mock, 6, 1.0);
        mock.inject_read(&node_bytes(true, 40, 0.0, 1.0));

        let mut scanner = scanner_on(&mock);
        scanner.start().unwrap();
        let frame = scanner.read_scan().unwrap().expect("no frame");
        // the 2-sample fragment was discarded, not published
        assert_eq!(frame.ranges.len(), 6);
        assert_eq!(frame.scan_number, 0);
    }

    #[test]
    fn test_read_times_out_when_stream_stalls() {
        let mock = MockTransport::new();
        mock.inject_read(&SCAN_DESCRIPTOR);
        inject_revolution(&mock, 4, 1.0);
        // stream ends without the next start flag

        let mut scanner = RplidarScanner::new(Box::new(mock.clone()), Duration::from_millis(50));
        scanner.start().unwrap();
        assert!(matches!(scanner.read_scan(), Err(Error::Timeout)));
    }

    #[test]
    fn test_zero_quality_nodes_skipped() {
        let mock = MockTransport::new();
        mock.inject_read(&SCAN_DESCRIPTOR);
        inject_revolution(&mock, 6, 1.0);
        mock.inject_read(&node_bytes(false, 0, 123.0, 0.0));
        mock.inject_read(&node_bytes(false, 40, 124.0, 1.0));
        mock.inject_read(&node_bytes(true, 40, 0.0, 1.0));

        let mut scanner = scanner_on(&mock);
        scanner.start().unwrap();
        let frame = scanner.read_scan().unwrap().expect("no frame");
        // 6 + 1 valid samples; the quality-0 node is not in the frame
        assert_eq!(frame.ranges.len(), 7);
        assert!(frame.angles_deg.iter().all(|a| (a - 123.0).abs() > 0.5));
    }
}
