//! Network Reactor
//!
//! One background thread owns every peer socket in the process. It runs a single-threaded
//! event loop that multiplexes all links; callers never touch a socket themselves; they
//! enqueue requests through a `ReactorHandle` and block on the completions the reactor
//! hands back.
//!
//! ## Request flow
//! - **Connect**: the reactor dials the address, then signals the waiting constructor.
//! - **Read**: marks the link as wanting input. Every complete frame decoded off the wire is
//!   delivered, in wire order, to the link's completion channel.
//! - **Write**: moves the link's queued outbound batch to the socket.
//!
//! A transport failure is logged and isolates the one link: its completion channel closes
//! and the link is abandoned. The loop itself keeps serving every other link.

use super::frame::{InboundFrames, OutboundFrames};
use super::types::{ConnectionKind, LinkState, NetError, Result};

use bytes::{Buf, Bytes, BytesMut};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, oneshot};

const READ_CHUNK: usize = 16 * 1024;

/// State of one link shared between its `Connection` and the reactor thread.
pub(crate) struct Link {
    pub(crate) kind: ConnectionKind,
    pub(crate) addr: SocketAddr,
    outbound: Mutex<OutboundFrames>,
    read_requested: AtomicBool,
    write_requested: AtomicBool,
    wake: Notify,
    state: Mutex<LinkState>,
}

impl Link {
    pub(crate) fn new(kind: ConnectionKind, addr: SocketAddr, batch_size: usize) -> Self {
        Self {
            kind,
            addr,
            outbound: Mutex::new(OutboundFrames::new(batch_size)),
            read_requested: AtomicBool::new(false),
            write_requested: AtomicBool::new(false),
            wake: Notify::new(),
            state: Mutex::new(LinkState::Connecting),
        }
    }

    pub(crate) fn outbound(&self) -> MutexGuard<'_, OutboundFrames> {
        self.outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: LinkState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }
}

enum Request {
    Connect {
        link: Arc<Link>,
        frames: mpsc::UnboundedSender<Bytes>,
        connected: oneshot::Sender<Result<()>>,
    },
    Read(Arc<Link>),
    Write(Arc<Link>),
}

/// Cloneable, thread-safe entry point into the reactor's request queue.
#[derive(Clone)]
pub struct ReactorHandle {
    requests: mpsc::UnboundedSender<Request>,
}

impl ReactorHandle {
    pub(crate) fn request_connect(
        &self,
        link: Arc<Link>,
        frames: mpsc::UnboundedSender<Bytes>,
        connected: oneshot::Sender<Result<()>>,
    ) -> Result<()> {
        self.send(Request::Connect {
            link,
            frames,
            connected,
        })
    }

    pub(crate) fn request_read(&self, link: &Arc<Link>) -> Result<()> {
        self.send(Request::Read(link.clone()))
    }

    pub(crate) fn request_write(&self, link: &Arc<Link>) -> Result<()> {
        self.send(Request::Write(link.clone()))
    }

    fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| NetError::ReactorStopped)
    }
}

pub struct Reactor {
    handle: ReactorHandle,
    thread: JoinHandle<()>,
}

impl Reactor {
    /// Spawns the reactor thread. The loop runs until every handle is dropped.
    pub fn start() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()?;
        let (requests, inbox) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("cumulus-reactor".to_string())
            .spawn(move || runtime.block_on(event_loop(inbox)))?;

        Ok(Self {
            handle: ReactorHandle { requests },
            thread,
        })
    }

    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }
}

async fn event_loop(mut inbox: mpsc::UnboundedReceiver<Request>) {
    tracing::info!("Reactor started");

    while let Some(request) = inbox.recv().await {
        match request {
            Request::Connect {
                link,
                frames,
                connected,
            } => {
                tokio::spawn(drive_link(link, frames, connected));
            }
            Request::Read(link) => {
                link.read_requested.store(true, Ordering::SeqCst);
                link.wake.notify_one();
            }
            Request::Write(link) => {
                link.write_requested.store(true, Ordering::SeqCst);
                link.wake.notify_one();
            }
        }
    }

    tracing::info!("Reactor stopped");
}

async fn drive_link(
    link: Arc<Link>,
    frames: mpsc::UnboundedSender<Bytes>,
    connected: oneshot::Sender<Result<()>>,
) {
    let stream = match TcpStream::connect(link.addr).await {
        Ok(stream) => stream,
        Err(source) => {
            tracing::warn!("Failed to connect {} link to {}: {}", link.kind, link.addr, source);
            link.set_state(LinkState::Abandoned);
            let _ = connected.send(Err(NetError::Connect {
                addr: link.addr,
                source,
            }));
            return;
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Could not disable Nagle for {}: {}", link.addr, e);
    }

    link.set_state(LinkState::Connected);
    tracing::debug!("Connected {} link to {}", link.kind, link.addr);
    if connected.send(Ok(())).is_err() {
        tracing::debug!("Constructor for {} went away before the handshake finished", link.addr);
    }

    if let Err(e) = pump(&link, &stream, &frames).await {
        tracing::error!("Abandoning {} link to {}: {}", link.kind, link.addr, e);
    }
    link.set_state(LinkState::Abandoned);
}

/// Services one connected link until its transport fails.
async fn pump(
    link: &Link,
    stream: &TcpStream,
    frames: &mpsc::UnboundedSender<Bytes>,
) -> Result<()> {
    let mut inbound = InboundFrames::new();
    let mut pending = BytesMut::new();

    loop {
        if link.write_requested.swap(false, Ordering::SeqCst) {
            let batch = link.outbound().take();
            pending.extend_from_slice(&batch);
        }

        let mut interest = None;
        if link.read_requested.load(Ordering::SeqCst) {
            interest = Some(Interest::READABLE);
        }
        if !pending.is_empty() {
            interest = Some(match interest {
                Some(read) => read | Interest::WRITABLE,
                None => Interest::WRITABLE,
            });
        }

        let Some(interest) = interest else {
            link.wake.notified().await;
            continue;
        };

        tokio::select! {
            ready = stream.ready(interest) => {
                let ready = ready?;
                if ready.is_readable() {
                    handle_read(link, stream, &mut inbound, frames)?;
                }
                if ready.is_writable() && !pending.is_empty() {
                    handle_write(stream, &mut pending)?;
                }
            }
            _ = link.wake.notified() => {}
        }
    }
}

/// Reads what is available and completes one unit per decoded frame.
fn handle_read(
    link: &Link,
    stream: &TcpStream,
    inbound: &mut InboundFrames,
    frames: &mpsc::UnboundedSender<Bytes>,
) -> Result<usize> {
    inbound.buffer_mut().reserve(READ_CHUNK);
    match stream.try_read_buf(inbound.buffer_mut()) {
        Ok(0) => {
            return Err(NetError::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "peer closed the connection",
            )));
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(0),
        Err(e) => return Err(e.into()),
    }

    let mut completed = 0;
    while let Some(frame) = inbound.next_frame()? {
        if frames.send(frame).is_err() {
            tracing::debug!("Dropping frame from {}: connection released", link.addr);
        }
        completed += 1;
    }
    if completed > 0 {
        tracing::trace!("Decoded {} frame(s) from {}", completed, link.addr);
    }
    Ok(completed)
}

fn handle_write(stream: &TcpStream, pending: &mut BytesMut) -> Result<()> {
    match stream.try_write(pending) {
        Ok(written) => {
            pending.advance(written);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(e.into()),
    }
}
