//! Protocol client
//!
//! One [`Connection`] runs four tasks: a writer owning the transport's
//! outbound half, a reader feeding the [`EventRouter`], a keepalive timer
//! and a supervisor that releases the device once the connection ends.
//! Everything that wants to write goes through [`Outbound`], so the writer
//! is the only place frames reach the wire.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use printeremu_core::constants::{
    JOB_QUEUE_CAPACITY, KEEPALIVE_DATA, KEEPALIVE_INTERVAL, SEND_QUEUE_CAPACITY,
};
use printeremu_core::{names, Event, Frame, PacketType, Session};
use printeremu_transport::{
    connect_with_retry, FrameReader, FrameWriter, FramedConnection, RetryPolicy, TcpTransport,
    Transport, WsTransport,
};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::jobs::{self, JobQueue};
use crate::router::EventRouter;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Where inbound `command` events are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// On the reader task, before the next frame is read
    #[default]
    Inline,
    
    /// On a job consumer task; responses of distinct commands may reorder
    Queued,
}

/// Protocol client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub send_queue_capacity: usize,
    pub job_queue_capacity: usize,
    
    /// Zero disables the keepalive, and the inbound timeout with it
    pub keepalive_interval: Duration,
    
    /// Close the connection when nothing arrived for this long
    pub keepalive_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub dispatch: DispatchMode,
    
    /// Parent of every connection's shutdown token
    pub shutdown: Option<CancellationToken>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: SEND_QUEUE_CAPACITY,
            job_queue_capacity: JOB_QUEUE_CAPACITY,
            keepalive_interval: Duration::from_secs(KEEPALIVE_INTERVAL),
            keepalive_timeout: None,
            retry: RetryPolicy::default(),
            dispatch: DispatchMode::default(),
            shutdown: None,
        }
    }
}

impl ClientConfig {
    /// Frames waiting for the writer; at least one
    pub fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity.max(1);
        self
    }
    
    /// Commands waiting in queued dispatch; at least one
    pub fn with_job_queue_capacity(mut self, capacity: usize) -> Self {
        self.job_queue_capacity = capacity.max(1);
        self
    }
    
    /// Time between `ping` events; zero turns the keepalive off
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }
    
    /// Checked on each keepalive tick, so never enforced below the interval
    pub fn with_keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = Some(timeout);
        self
    }
    
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
    
    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }
    
    /// Cancelling `token` closes every connection opened with this config
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }
}

/// Producer side of a connection's send queue
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Frame>,
}

impl Outbound {
    /// Bounded queue and the receiver the writer drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
    
    /// Enqueue, waiting for room
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.tx.send(frame).await.map_err(|_| Error::QueueClosed)
    }
    
    pub async fn send_event(&self, event: &Event) -> Result<()> {
        self.send(Frame::message(event)?).await
    }
    
    /// Enqueue without waiting
    ///
    /// Returns `Ok(false)` when the queue is full and the frame was dropped.
    pub fn try_send(&self, frame: Frame) -> Result<bool> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => Err(Error::QueueClosed),
        }
    }
    
    pub fn try_send_event(&self, event: &Event) -> Result<bool> {
        self.try_send(Frame::message(event)?)
    }
    
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// What a device keeps of the connection it is bound to
#[derive(Debug, Clone)]
pub(crate) struct ConnectionHandle {
    pub(crate) id: u64,
    pub(crate) outbound: Outbound,
    pub(crate) shutdown: CancellationToken,
}

/// Connects devices to a fleet server
///
/// # Examples
///
/// ```no_run
/// use printeremu::{Device, ProtocolClient};
/// use printeremu_types::{DeviceInfo, Extruder, Heatbed};
///
/// #[tokio::main]
/// async fn main() -> printeremu::Result<()> {
///     let device = Device::builder(DeviceInfo::new(1, "Prusa MK4", "Printer1"))
///         .extruder(Extruder::default())
///         .heatbed(Heatbed::default())
///         .build()?;
///
///     let client = ProtocolClient::websocket("ws://localhost:8001")?;
///     let connection = client.connect(&device).await?;
///     connection.closed().await;
///     Ok(())
/// }
/// ```
pub struct ProtocolClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl ProtocolClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            config: ClientConfig::default(),
        }
    }
    
    /// Client over a WebSocket (`ws://` or `wss://`) URL
    pub fn websocket(url: impl Into<String>) -> Result<Self> {
        Ok(Self::new(WsTransport::new(url)?))
    }
    
    /// Client over line-delimited TCP
    pub fn tcp(addr: impl Into<String>, port: u16) -> Self {
        Self::new(TcpTransport::new(addr, port))
    }
    
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }
    
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
    
    pub fn remote_addr(&self) -> String {
        self.transport.remote_addr()
    }
    
    /// Connect `device` and start serving it
    ///
    /// The open frame is written before any task starts, so it is always
    /// the first frame on the wire.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The device already has a live connection
    /// - Every connect attempt failed
    /// - The open frame could not be written
    pub async fn connect(&self, device: &Device) -> Result<Connection> {
        if device.is_connected() {
            return Err(Error::AlreadyConnected(device.id()));
        }
        
        info!("Connecting device {} to {}...", device.id(), self.transport.remote_addr());
        
        let parent = self.config.shutdown.clone().unwrap_or_default();
        let FramedConnection {
            mut writer,
            reader,
            remote_addr,
        } = connect_with_retry(self.transport.as_ref(), &self.config.retry, &parent).await?;
        
        let session = Session::new();
        writer.send(&Frame::open()).await?;
        session.open()?;
        session.record_outbound();
        
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let shutdown = parent.child_token();
        let (outbound, rx) = Outbound::channel(self.config.send_queue_capacity);
        
        device.attach(ConnectionHandle {
            id,
            outbound: outbound.clone(),
            shutdown: shutdown.clone(),
        })?;
        
        let mut tasks = Vec::with_capacity(5);
        
        let jobs = match self.config.dispatch {
            DispatchMode::Inline => None,
            DispatchMode::Queued => {
                let (queue, receiver) = JobQueue::new(self.config.job_queue_capacity);
                tasks.push(jobs::spawn_consumer(
                    receiver,
                    device.clone(),
                    outbound.clone(),
                    shutdown.clone(),
                ));
                Some(queue)
            }
        };
        let router = EventRouter::new(device.clone(), outbound.clone(), jobs, shutdown.clone());
        
        tasks.push(tokio::spawn(write_loop(
            writer,
            rx,
            session.clone(),
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(read_loop(
            reader,
            router,
            session.clone(),
            outbound.clone(),
            shutdown.clone(),
        )));
        if self.config.keepalive_interval.is_zero() {
            debug!("Keepalive disabled for connection {}", id);
        } else {
            tasks.push(tokio::spawn(keepalive_loop(
                outbound.clone(),
                session.clone(),
                self.config.keepalive_interval,
                self.config.keepalive_timeout,
                shutdown.clone(),
            )));
        }
        tasks.push(tokio::spawn(supervise(
            device.clone(),
            id,
            session.clone(),
            shutdown.clone(),
        )));
        
        info!("Connection {} open to {} (device {})", id, remote_addr, device.id());
        
        Ok(Connection {
            id,
            device: device.clone(),
            remote_addr,
            session,
            outbound,
            shutdown,
            tasks,
        })
    }
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("remote_addr", &self.transport.remote_addr())
            .field("config", &self.config)
            .finish()
    }
}

/// A live connection serving one device
///
/// Dropping it closes the connection.
pub struct Connection {
    id: u64,
    device: Device,
    remote_addr: String,
    session: Session,
    outbound: Outbound,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.id
    }
    
    pub fn device(&self) -> &Device {
        &self.device
    }
    
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }
    
    pub fn session(&self) -> &Session {
        &self.session
    }
    
    /// Handle for queueing frames on this connection
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }
    
    /// Signal every connection task to stop; safe to call repeatedly
    ///
    /// The device is released before this returns, so it can be connected
    /// again right away.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Closing connection {}", self.id);
        }
        self.shutdown.cancel();
        self.release();
    }
    
    fn release(&self) {
        if self.device.detach(self.id) {
            self.device.stop_telemetry();
        }
    }
    
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
    
    /// Resolves once the connection started shutting down
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }
    
    /// Wait for every connection task to finish
    ///
    /// Does not close the connection by itself.
    pub async fn join(mut self) {
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                error!("Connection {} task failed: {}", self.id, e);
            }
        }
    }
    
    /// Close, then wait for the tasks to finish
    pub async fn shutdown(self) {
        self.close();
        self.join().await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.release();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("device", &self.device.id())
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.session.state())
            .finish()
    }
}

async fn write_loop(
    mut writer: Box<dyn FrameWriter>,
    mut rx: mpsc::Receiver<Frame>,
    session: Session,
    shutdown: CancellationToken,
) {
    let mut healthy = true;
    
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        
        trace!(">> {}", frame);
        if let Err(e) = writer.send(&frame).await {
            error!("Write failed: {}", e);
            healthy = false;
            break;
        }
        session.record_outbound();
    }
    
    // Producers see `QueueClosed` from here on
    rx.close();
    
    if healthy {
        while let Ok(frame) = rx.try_recv() {
            if writer.send(&frame).await.is_err() {
                break;
            }
            session.record_outbound();
        }
        if let Err(e) = writer.send(&Frame::close()).await {
            debug!("Close frame not sent: {}", e);
        }
    }
    if let Err(e) = writer.close().await {
        debug!("Writer close failed: {}", e);
    }
    
    shutdown.cancel();
    debug!("Writer stopped");
}

async fn read_loop(
    mut reader: Box<dyn FrameReader>,
    router: EventRouter,
    session: Session,
    outbound: Outbound,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = reader.recv() => received,
        };
        
        let text = match received {
            Ok(Some(text)) => text,
            Ok(None) => {
                info!("Peer closed the connection");
                break;
            }
            Err(e) => {
                error!("Read failed: {}", e);
                break;
            }
        };
        
        session.touch();
        trace!("<< {}", text);
        
        let frame = match Frame::decode(&text) {
            Ok(frame) => frame,
            Err(e) if e.is_recoverable() => {
                warn!("Dropping undecodable frame: {}", e);
                continue;
            }
            Err(e) => {
                error!("Frame decode failed: {}", e);
                break;
            }
        };
        
        match frame.packet_type {
            PacketType::Open => match frame.handshake() {
                Some(handshake) => {
                    debug!("Peer handshake: {:?}", handshake);
                    session.handshake(&handshake);
                }
                None => debug!("Peer acknowledged open"),
            },
            PacketType::Close => {
                info!("Peer sent close");
                break;
            }
            PacketType::Ping => {
                if outbound.send(Frame::pong_for(&frame)).await.is_err() {
                    break;
                }
            }
            PacketType::Pong => trace!("Pong received"),
            PacketType::Message => {
                let event = match frame.event() {
                    Ok(event) => event,
                    Err(e) if e.is_recoverable() => {
                        warn!("Dropping malformed message: {}", e);
                        continue;
                    }
                    Err(e) => {
                        error!("Message decode failed: {}", e);
                        break;
                    }
                };
                match router.dispatch(event).await {
                    Ok(()) => {}
                    Err(Error::QueueClosed) => break,
                    Err(e) => warn!("Event handling failed: {}", e),
                }
            }
        }
    }
    
    shutdown.cancel();
    debug!("Reader stopped");
}

/// Periodic `ping` event; enforces the inbound timeout when configured
///
/// The timeout is checked on each tick, so it fires up to one interval late.
async fn keepalive_loop(
    outbound: Outbound,
    session: Session,
    interval: Duration,
    timeout: Option<Duration>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    
    let mut frames_seen = session.frames_in();
    let mut last_inbound = Instant::now();
    
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        
        let frames_in = session.frames_in();
        if frames_in != frames_seen {
            frames_seen = frames_in;
            last_inbound = Instant::now();
        } else if let Some(timeout) = timeout {
            if last_inbound.elapsed() >= timeout {
                warn!("Nothing received for {:?}, closing connection", last_inbound.elapsed());
                shutdown.cancel();
                break;
            }
        }
        
        match outbound.try_send_event(&Event::new(names::PING, KEEPALIVE_DATA)) {
            Ok(true) => trace!("Keepalive sent"),
            Ok(false) => trace!("Send queue full, keepalive skipped"),
            Err(_) => break,
        }
    }
}

async fn supervise(device: Device, connection_id: u64, session: Session, shutdown: CancellationToken) {
    shutdown.cancelled().await;
    
    if device.detach(connection_id) {
        device.stop_telemetry();
    }
    if session.close() {
        info!(
            "Connection {} closed ({} frames in, {} out)",
            connection_id,
            session.frames_in(),
            session.frames_out()
        );
    }
}
