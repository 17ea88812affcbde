//! Periodic temperature reports
//!
//! At most one streamer task runs per device. Samples are sent with
//! `try_send`; when the send queue is full the sample is dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use printeremu_core::{CommandResponse, DeviceId, Frame};
use printeremu_types::DeviceState;

use crate::client::Outbound;
use crate::error::{Error, Result};

/// Status line: `T:<cur> /<target> B:<cur> /<target> @:0 B@:0`
pub fn format_status(state: &DeviceState) -> String {
    format!(
        "T:{:6.2} /{:6.2} B:{:6.2} /{:6.2} @:0 B@:0",
        state.hotend_temperature(),
        state.hotend_target(),
        state.bed_temperature(),
        state.bed_target(),
    )
}

#[derive(Default)]
struct StreamerState {
    interval: Option<Duration>,
    stop: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    
    /// Bumped per start so a finishing task only clears its own run
    generation: u64,
}

/// Telemetry streamer: Idle or Running
#[derive(Clone, Default)]
pub struct TelemetryStreamer {
    state: Arc<Mutex<StreamerState>>,
}

impl TelemetryStreamer {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn is_running(&self) -> bool {
        self.state.lock().stop.is_some()
    }
    
    /// Interval of the running streamer
    pub fn interval(&self) -> Option<Duration> {
        self.state.lock().interval
    }
    
    /// Start streaming unless already running
    ///
    /// The task stops on [`stop`](Self::stop) or when `parent` is cancelled.
    /// Returns `false` if a streamer was already running.
    pub(crate) fn start(
        &self,
        interval: Duration,
        device_id: u32,
        device_state: Arc<Mutex<DeviceState>>,
        outbound: Outbound,
        parent: &CancellationToken,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        if state.stop.is_some() {
            return Ok(false);
        }
        
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        
        state.generation += 1;
        let stop = parent.child_token();
        let task = run(
            interval,
            DeviceId::from(device_id),
            device_state,
            outbound,
            stop.clone(),
            self.state.clone(),
            state.generation,
        );
        
        state.handle = Some(runtime.spawn(task));
        state.stop = Some(stop);
        state.interval = Some(interval);
        
        debug!("Telemetry started for device {} every {:?}", device_id, interval);
        Ok(true)
    }
    
    /// Stop the running streamer; a no-op when idle
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        state.interval = None;
        state.handle = None;
        match state.stop.take() {
            Some(stop) => {
                stop.cancel();
                debug!("Telemetry stopped");
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for TelemetryStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryStreamer")
            .field("interval", &self.interval())
            .finish()
    }
}

async fn run(
    interval: Duration,
    device_id: DeviceId,
    device_state: Arc<Mutex<DeviceState>>,
    outbound: Outbound,
    stop: CancellationToken,
    shared: Arc<Mutex<StreamerState>>,
    generation: u64,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        
        let response = format_status(&device_state.lock());
        let frame = CommandResponse {
            device_id: device_id.clone(),
            response,
        }
        .into_event()
        .and_then(|event| Frame::message(&event));
        
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Telemetry sample not encodable: {}", e);
                continue;
            }
        };
        
        match outbound.try_send(frame) {
            Ok(true) => {}
            Ok(false) => trace!("Send queue full, telemetry sample dropped"),
            Err(_) => break,
        }
    }
    
    let mut state = shared.lock();
    if state.generation == generation {
        state.stop = None;
        state.handle = None;
        state.interval = None;
    }
}
