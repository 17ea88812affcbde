//! Job queue for offloaded command execution

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use printeremu_core::{CommandRequest, DeviceId};

use crate::client::Outbound;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::router;

/// An instruction waiting for the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub device_id: DeviceId,
    pub instruction: String,
}

impl From<CommandRequest> for Job {
    fn from(request: CommandRequest) -> Self {
        Self {
            device_id: request.device_id,
            instruction: request.instruction,
        }
    }
}

/// Producer side of a connection's job queue
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

/// Consumer side, handed to [`spawn_consumer`]
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::Receiver<Job>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, JobReceiver { rx })
    }
    
    /// Enqueue without waiting
    ///
    /// # Errors
    ///
    /// `QueueFull` when at capacity, `QueueClosed` once the consumer stopped.
    pub fn submit(&self, job: Job) -> Result<()> {
        self.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => Error::QueueFull,
            TrySendError::Closed(_) => Error::QueueClosed,
        })
    }
    
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl JobReceiver {
    async fn recv(&mut self) -> Option<Job> {
        self.rx.recv().await
    }
}

/// Drain jobs in order until `shutdown` fires or the send queue closes
pub fn spawn_consumer(
    mut receiver: JobReceiver,
    device: Device,
    outbound: Outbound,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = receiver.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            
            debug!(device_id = %job.device_id, "Running queued job");
            if let Err(e) = router::respond(&device, &outbound, job.device_id, &job.instruction).await {
                debug!("Job consumer stopping: {}", e);
                break;
            }
        }
        
        receiver.rx.close();
        debug!("Job consumer stopped");
    })
}
