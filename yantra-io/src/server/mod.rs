//! Controller session server
//!
//! One listener thread accepts TCP connections and runs the handshake.
//! At most one session is live; a new connection while one is Connected
//! is a reconnection, so the old session is torn down first. Every
//! teardown path forces the safety machine to stop and queues a
//! connectivity event.
//!
//! The handshake is always JSON: the client cannot know the configured
//! wire format before the Welcome advertises it. Everything after the
//! Welcome uses that format.

mod publisher;
mod receiver;

pub use publisher::{SessionPublisher, TelemetryQueues};
pub use receiver::CommandReceiver;

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use setu_link::{
    read_frame, write_frame, Event, Frame, LinkError, Role, Serializer, Session, Welcome,
    WireFormat, PROTOCOL_VERSION,
};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::safety::SafetyController;

/// Accept poll interval while no connection is pending
const ACCEPT_PAUSE: Duration = Duration::from_millis(10);

/// One established session and its two I/O threads
struct ActiveSession {
    session: Session,
    conn_alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Everything the accept loop needs per connection
struct ServerContext {
    wire_format: WireFormat,
    handshake_timeout: Duration,
    safety: Arc<SafetyController>,
    queues: TelemetryQueues,
    running: Arc<AtomicBool>,
}

/// Owns the listener thread. Dropping the server stops and joins it.
pub struct SessionServer {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SessionServer {
    pub fn start(
        config: &ServerConfig,
        safety: Arc<SafetyController>,
        queues: TelemetryQueues,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let wire_format = WireFormat::from_name(&config.wire_format).ok_or_else(|| {
            Error::InvalidParameter(format!("unknown wire format '{}'", config.wire_format))
        })?;

        let listener = TcpListener::bind(&config.bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        log::info!(
            "Server: listening on {} ({} frames after handshake)",
            local_addr,
            config.wire_format
        );

        let context = ServerContext {
            wire_format,
            handshake_timeout: Duration::from_millis(config.handshake_timeout_ms),
            safety,
            queues,
            running,
        };
        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("session-server".to_string())
            .spawn(move || accept_loop(listener, context, loop_shutdown))?;

        Ok(Self {
            local_addr,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Address the listener actually bound, useful with port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for SessionServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(listener: TcpListener, context: ServerContext, shutdown: Arc<AtomicBool>) {
    let mut active: Option<ActiveSession> = None;
    let mut next_session_id: u64 = 1;

    while context.running.load(Ordering::Relaxed) && !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                // reconnection: the newcomer wins, the old session goes
                if let Some(old) = active.take() {
                    log::warn!(
                        "Server: connection from {} displaces session {}",
                        peer,
                        old.session.id()
                    );
                    teardown(old, &context);
                }
                match establish(&context, stream, peer, next_session_id) {
                    Ok(session) => {
                        next_session_id += 1;
                        active = Some(session);
                    }
                    Err(e) => log::warn!("Server: handshake with {} failed: {}", peer, e),
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_PAUSE);
            }
            Err(e) => {
                log::error!("Server: accept failed: {}", e);
                thread::sleep(ACCEPT_PAUSE);
            }
        }

        // collect a session whose threads ended on their own
        let ended = active
            .as_ref()
            .map(|s| s.reader.is_finished() || s.writer.is_finished())
            .unwrap_or(false);
        if ended {
            if let Some(old) = active.take() {
                teardown(old, &context);
            }
        }
    }

    if let Some(old) = active.take() {
        teardown(old, &context);
    }
    log::info!("Server: stopped");
}

/// Handshake a fresh connection and spawn its I/O threads
fn establish(
    context: &ServerContext,
    mut stream: TcpStream,
    peer: SocketAddr,
    session_id: u64,
) -> Result<ActiveSession> {
    stream.set_read_timeout(Some(context.handshake_timeout))?;

    let handshake = Serializer::new(WireFormat::Json);
    let mut session = Session::accept(session_id, peer);

    let mut buffer = Vec::with_capacity(256);
    let len = read_frame(&mut stream, &mut buffer)?;
    let hello = match handshake.deserialize(&buffer[..len])? {
        Frame::Hello(hello) => hello,
        other => {
            return Err(Error::Link(LinkError::Handshake(format!(
                "expected hello, got {}",
                other.name()
            ))))
        }
    };
    if hello.version != PROTOCOL_VERSION {
        return Err(Error::Link(LinkError::UnsupportedVersion(hello.version)));
    }
    if hello.role != Role::Controller {
        return Err(Error::Link(LinkError::Handshake(format!(
            "actuator serves controllers, peer declared {:?}",
            hello.role
        ))));
    }

    let welcome = Frame::Welcome(Welcome {
        session_id,
        wire_format: context.wire_format,
    });
    let payload = handshake.serialize(&welcome)?;
    write_frame(&mut stream, &payload)?;

    session.complete_handshake(&hello.node_name)?;
    log::info!(
        "Server: session {} connected, {} at {}",
        session_id,
        hello.node_name,
        peer
    );

    let conn_alive = Arc::new(AtomicBool::new(true));
    let writer_stream = stream.try_clone()?;

    let reader = {
        let mut command_receiver = CommandReceiver::new(
            Serializer::new(context.wire_format),
            Arc::clone(&context.safety),
            Arc::clone(&context.running),
            Arc::clone(&conn_alive),
        );
        thread::Builder::new()
            .name(format!("session-{}-recv", session_id))
            .spawn(move || command_receiver.run(stream))?
    };
    let writer = {
        let mut session_publisher = SessionPublisher::new(
            Serializer::new(context.wire_format),
            context.queues.clone(),
            Arc::clone(&context.running),
            Arc::clone(&conn_alive),
        );
        thread::Builder::new()
            .name(format!("session-{}-send", session_id))
            .spawn(move || session_publisher.run(writer_stream))?
    };

    push_event(&context.queues, Event::Connectivity { connected: true });

    Ok(ActiveSession {
        session,
        conn_alive,
        reader,
        writer,
    })
}

/// End a session: stop its threads, force the machine to Idle, queue the
/// connectivity event
fn teardown(mut active: ActiveSession, context: &ServerContext) {
    active.conn_alive.store(false, Ordering::Relaxed);
    let _ = active.reader.join();
    let _ = active.writer.join();

    if let Err(e) = context.safety.force_stop() {
        log::error!("Server: forced stop on teardown failed: {}", e);
    }
    push_event(&context.queues, Event::Connectivity { connected: false });

    active.session.close();
    log::info!("Server: session {} closed", active.session.id());
}

fn push_event(queues: &TelemetryQueues, event: Event) {
    if queues.events.force_push(event).is_some() {
        log::warn!("Server: event queue full, dropped oldest event");
    }
}
