//! RPLIDAR A1 protocol implementation
//!
//! Request format (host → sensor): `[0xA5, command]`, no payload for the
//! commands used here.
//!
//! Response descriptor (sensor → host, once per request):
//! - Sync bytes (2 bytes): 0xA5 0x5A
//! - Response length + send mode (4 bytes LE): bits 0..29 length,
//!   bits 30..31 send mode (1 = multiple response)
//! - Data type (1 byte): 0x81 for scan measurements
//!
//! Measurement node (5 bytes, repeated while scanning):
//! - byte 0: quality (bits 2..7), inverted start flag (bit 1), start
//!   flag (bit 0) — exactly one of the two flag bits must be set
//! - byte 1: angle low bits (bits 1..7), check bit (bit 0, always 1)
//! - byte 2: angle high bits; angle = q6 fixed point, degrees
//! - bytes 3-4: distance (LE), q2 fixed point, millimeters

use crate::error::{Error, Result};

/// Every request starts with this byte
pub const SYNC_BYTE: u8 = 0xA5;
/// Second sync byte of a response descriptor
pub const DESCRIPTOR_SYNC: u8 = 0x5A;

/// Begin standard scan
pub const CMD_SCAN: u8 = 0x20;
/// Exit scan mode
pub const CMD_STOP: u8 = 0x25;

/// Response descriptor length on the wire
pub const DESCRIPTOR_LEN: usize = 7;
/// Measurement node length on the wire
pub const NODE_LEN: usize = 5;
/// Data type byte for standard scan responses
pub const SCAN_DATA_TYPE: u8 = 0x81;

/// Parsed response descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// Length of each response payload
    pub payload_len: u32,
    /// 0 = single response, 1 = multiple responses
    pub send_mode: u8,
    pub data_type: u8,
}

impl Descriptor {
    /// Parse a 7-byte response descriptor
    pub fn parse(buf: &[u8; DESCRIPTOR_LEN]) -> Result<Self> {
        if buf[0] != SYNC_BYTE || buf[1] != DESCRIPTOR_SYNC {
            return Err(Error::InvalidPacket(format!(
                "bad descriptor sync: 0x{:02X} 0x{:02X}",
                buf[0], buf[1]
            )));
        }
        let word = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);
        Ok(Descriptor {
            payload_len: word & 0x3FFF_FFFF,
            send_mode: (word >> 30) as u8,
            data_type: buf[6],
        })
    }
}

/// One decoded measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementNode {
    /// Set on the first node of a new revolution
    pub start_flag: bool,
    /// 0 means no return signal
    pub quality: u8,
    /// Bearing in degrees, 0-360
    pub angle_deg: f64,
    /// Range in meters; 0 means no valid measurement
    pub distance_m: f64,
}

impl MeasurementNode {
    /// Parse a 5-byte measurement node. Fails on flag or check-bit
    /// violations, which indicate the byte stream is misaligned.
    pub fn parse(buf: &[u8; NODE_LEN]) -> Result<Self> {
        let start = buf[0] & 0x01 != 0;
        let inverted = buf[0] & 0x02 != 0;
        if start == inverted {
            return Err(Error::InvalidPacket(format!(
                "start flag pair invalid: 0x{:02X}",
                buf[0]
            )));
        }
        if buf[1] & 0x01 == 0 {
            return Err(Error::InvalidPacket(format!(
                "check bit clear: 0x{:02X}",
                buf[1]
            )));
        }

        let quality = buf[0] >> 2;
        let angle_q6 = ((buf[2] as u16) << 7) | ((buf[1] as u16) >> 1);
        let dist_q2 = u16::from_le_bytes([buf[3], buf[4]]);

        Ok(MeasurementNode {
            start_flag: start,
            quality,
            angle_deg: angle_q6 as f64 / 64.0,
            distance_m: dist_q2 as f64 / 4.0 / 1000.0,
        })
    }

    /// True if this node carries a usable range sample
    pub fn is_valid(&self) -> bool {
        self.quality > 0 && self.distance_m > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_parse() {
        // standard scan descriptor: 5-byte payloads, multiple response, 0x81
        let buf = [0xA5, 0x5A, 0x05, 0x00, 0x00, 0x40, 0x81];
        let descriptor = Descriptor::parse(&buf).unwrap();
        assert_eq!(descriptor.payload_len, 5);
        assert_eq!(descriptor.send_mode, 1);
        assert_eq!(descriptor.data_type, SCAN_DATA_TYPE);
    }

    #[test]
    fn test_descriptor_bad_sync() {
        let buf = [0xA5, 0x00, 0x05, 0x00, 0x00, 0x40, 0x81];
        assert!(Descriptor::parse(&buf).is_err());
    }

    #[test]
    fn test_node_parse() {
        // start flag set, quality 15, angle 90.0°, distance 2.000 m
        let buf = [0x3D, 0x01, 0x2D, 0x40, 0x1F];
        let node = MeasurementNode::parse(&buf).unwrap();
        assert!(node.start_flag);
        assert_eq!(node.quality, 15);
        assert!((node.angle_deg - 90.0).abs() < 1e-9);
        assert!((node.distance_m - 2.0).abs() < 1e-9);
        assert!(node.is_valid());
    }

    #[test]
    fn test_node_flag_pair_must_disagree() {
        // both flag bits set
        assert!(MeasurementNode::parse(&[0x03, 0x01, 0x00, 0x00, 0x00]).is_err());
        // both flag bits clear
        assert!(MeasurementNode::parse(&[0x00, 0x01, 0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_node_check_bit_required() {
        assert!(MeasurementNode::parse(&[0x01, 0x00, 0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_zero_distance_is_invalid_sample() {
        // valid framing, but no return signal
        let buf = [0x01, 0x01, 0x00, 0x00, 0x00];
        let node = MeasurementNode::parse(&buf).unwrap();
        assert!(!node.is_valid());
    }
}
