//! Session client for the actuator node.
//!
//! Connects over TCP, performs the hello/welcome handshake, then receives
//! telemetry and event frames and sends drive commands. The handshake is
//! always JSON; afterwards the client speaks whatever wire format the
//! actuator advertised in its welcome.
//!
//! # Example
//!
//! ```ignore
//! use drishti_map::io::SessionClient;
//! use std::time::Duration;
//!
//! let mut client = SessionClient::connect("192.168.68.90:5560", "drishti-map")?;
//! client.set_timeout(Some(Duration::from_secs(5)))?;
//!
//! loop {
//!     let frame = client.recv()?;
//!     // match on Frame::Telemetry / Frame::Event ...
//! }
//! ```

use std::io;
use std::net::TcpStream;
use std::time::Duration;

use thiserror::Error;

use setu_link::{
    read_frame, write_frame, DriveCommand, Frame, Hello, LinkError, Role, Serializer, WireFormat,
    PROTOCOL_VERSION,
};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connection(#[from] io::Error),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Handshake failed: {0}")]
    Handshake(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Socket timeout while waiting for the welcome frame
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Typical telemetry frame size
const INITIAL_BUFFER_CAPACITY: usize = 4096;

/// TCP client for one controller session against the actuator daemon.
pub struct SessionClient {
    stream: TcpStream,
    serializer: Serializer,
    session_id: u64,
    wire_format: WireFormat,
    read_buffer: Vec<u8>,
}

impl SessionClient {
    /// Connect and complete the handshake.
    ///
    /// Sends `Hello` with the controller role and `node_name`, waits for
    /// `Welcome`, and switches to the advertised wire format. The socket is
    /// left blocking; call [`set_timeout`](Self::set_timeout) afterwards.
    pub fn connect(addr: &str, node_name: &str) -> Result<Self> {
        let mut stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let handshake = Serializer::new(WireFormat::Json);
        let hello = Frame::Hello(Hello {
            role: Role::Controller,
            node_name: node_name.to_string(),
            version: PROTOCOL_VERSION,
        });
        write_frame(&mut stream, &handshake.serialize(&hello)?)?;

        let mut read_buffer = Vec::with_capacity(INITIAL_BUFFER_CAPACITY);
        let len = read_frame(&mut stream, &mut read_buffer)?;
        let welcome = match handshake.deserialize(&read_buffer[..len])? {
            Frame::Welcome(welcome) => welcome,
            other => {
                return Err(ClientError::Handshake(format!(
                    "expected welcome, got {}",
                    other.name()
                )));
            }
        };

        log::info!(
            "Session {} established with {} ({:?} frames)",
            welcome.session_id,
            addr,
            welcome.wire_format
        );

        stream.set_read_timeout(None)?;
        Ok(Self {
            stream,
            serializer: Serializer::new(welcome.wire_format),
            session_id: welcome.session_id,
            wire_format: welcome.wire_format,
            read_buffer,
        })
    }

    /// Session id assigned by the actuator.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Wire format in effect after the handshake.
    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    /// Set read timeout for the connection.
    ///
    /// Pass `None` to disable timeout (blocking reads).
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Get the local address of this connection.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    /// Get the peer address of this connection.
    pub fn peer_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Receive the next frame, subject to the configured socket timeout.
    pub fn recv(&mut self) -> Result<Frame> {
        let len = read_frame(&mut self.stream, &mut self.read_buffer)?;
        Ok(self.serializer.deserialize(&self.read_buffer[..len])?)
    }

    /// Receive with a timeout; returns `None` if nothing arrived in time.
    ///
    /// The previously configured socket timeout is restored afterwards.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let old_timeout = self.stream.read_timeout()?;
        self.stream.set_read_timeout(Some(timeout))?;

        let result = match read_frame(&mut self.stream, &mut self.read_buffer) {
            Ok(len) => Ok(Some(self.serializer.deserialize(&self.read_buffer[..len])?)),
            Err(LinkError::Io(ref e))
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(ClientError::Link(e)),
        };

        self.stream.set_read_timeout(old_timeout)?;
        result
    }

    /// Send a drive command to the actuator.
    pub fn send_command(&mut self, command: &DriveCommand) -> Result<()> {
        let frame = Frame::Command(command.clone());
        let payload = self.serializer.serialize(&frame)?;
        write_frame(&mut self.stream, &payload)?;
        Ok(())
    }
}
