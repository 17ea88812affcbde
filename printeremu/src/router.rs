//! Inbound event routing

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use printeremu_core::{
    names, CommandRequest, CommandResponse, DeviceId, ErrorPayload, Event, EventKind,
};

use crate::client::Outbound;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::jobs::{Job, JobQueue};

/// Binds inbound application events to their handlers
///
/// With a [`JobQueue`] attached, `command` events are queued instead of
/// executed on the caller's task.
pub struct EventRouter {
    device: Device,
    outbound: Outbound,
    jobs: Option<JobQueue>,
    shutdown: CancellationToken,
}

impl EventRouter {
    pub fn new(
        device: Device,
        outbound: Outbound,
        jobs: Option<JobQueue>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            device,
            outbound,
            jobs,
            shutdown,
        }
    }
    
    /// Handle one inbound event
    ///
    /// Malformed payloads are logged and dropped. Errors returned here come
    /// from the send queue only.
    pub async fn dispatch(&self, event: Event) -> Result<()> {
        match event.kind() {
            EventKind::RegistrationRequest => {
                debug!(device_id = self.device.id(), "Registration requested");
                let registration = self.device.registration_event()?;
                self.outbound.send_event(&registration).await
            }
            EventKind::Command => self.on_command(&event).await,
            EventKind::Ping => {
                trace!("Ping event, answering");
                self.outbound
                    .send_event(&Event::new(names::PONG, event.data))
                    .await
            }
            EventKind::Pong => {
                trace!("Pong event");
                Ok(())
            }
            EventKind::Info => {
                info!(
                    event = %event.event,
                    text = event.text().unwrap_or_default(),
                    "Peer info"
                );
                Ok(())
            }
            EventKind::Error => {
                warn!(
                    event = %event.event,
                    text = event.text().unwrap_or_default(),
                    "Peer reported error"
                );
                Ok(())
            }
            EventKind::Disconnect => {
                info!(device_id = self.device.id(), "Peer requested disconnect");
                self.shutdown.cancel();
                Ok(())
            }
            EventKind::SerialPortRequest => {
                let reply = match self.device.serial_port_info() {
                    Ok(info) => info.into_event()?,
                    Err(e) => {
                        warn!(device_id = self.device.id(), "Serial port query failed: {}", e);
                        ErrorPayload::for_device(DeviceId::from(self.device.id()), e.to_string())
                            .into_event()?
                    }
                };
                self.outbound.send_event(&reply).await
            }
            EventKind::Unknown => {
                debug!(event = %event.event, "No handler for event");
                Ok(())
            }
        }
    }
    
    async fn on_command(&self, event: &Event) -> Result<()> {
        let request = match CommandRequest::from_event(event) {
            Ok(request) => request,
            Err(e) => {
                warn!(event = %event.event, "Dropping malformed command: {}", e);
                return Ok(());
            }
        };
        
        if !request.device_id.matches(self.device.id()) {
            warn!(
                device_id = %request.device_id,
                "Command addressed to another device"
            );
            let message = format!("device {} is not served by this connection", request.device_id);
            let reply = ErrorPayload::for_device(request.device_id, message).into_event()?;
            return self.outbound.send_event(&reply).await;
        }
        
        let Some(jobs) = &self.jobs else {
            return respond(&self.device, &self.outbound, request.device_id, &request.instruction)
                .await;
        };
        
        let device_id = request.device_id.clone();
        match jobs.submit(Job::from(request)) {
            Ok(()) => Ok(()),
            Err(Error::QueueFull) => {
                warn!(device_id = %device_id, "Job queue full, command rejected");
                let reply = ErrorPayload::for_device(device_id, Error::QueueFull.to_string())
                    .into_event()?;
                self.outbound.send_event(&reply).await
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("device", &self.device.id())
            .field("queued", &self.jobs.is_some())
            .finish()
    }
}

/// Interpret `instruction` line by line, one `command-response` per answer
pub(crate) async fn respond(
    device: &Device,
    outbound: &Outbound,
    device_id: DeviceId,
    instruction: &str,
) -> Result<()> {
    for line in instruction.lines() {
        let response = device.execute(line);
        if response.is_empty() {
            continue;
        }
        
        debug!(device_id = %device_id, instruction = line.trim(), "Command executed");
        let event = CommandResponse {
            device_id: device_id.clone(),
            response,
        }
        .into_event()?;
        outbound.send_event(&event).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use printeremu_core::Frame;
    use printeremu_types::{DeviceInfo, Extruder, Heatbed};
    use serde_json::json;
    use tokio::sync::mpsc;
    
    fn device() -> Device {
        Device::builder(DeviceInfo::new(1, "Prusa MK4", "Printer1"))
            .extruder(Extruder::default())
            .heatbed(Heatbed::default())
            .build()
            .unwrap()
    }
    
    fn router(jobs: Option<JobQueue>) -> (EventRouter, mpsc::Receiver<Frame>, CancellationToken) {
        let (outbound, rx) = Outbound::channel(16);
        let shutdown = CancellationToken::new();
        (EventRouter::new(device(), outbound, jobs, shutdown.clone()), rx, shutdown)
    }
    
    fn next_event(rx: &mut mpsc::Receiver<Frame>) -> Event {
        rx.try_recv().unwrap().event().unwrap()
    }
    
    fn command(device_id: &str, instruction: &str) -> Event {
        CommandRequest::new(device_id, instruction).into_event().unwrap()
    }
    
    #[tokio::test]
    async fn test_pause_then_move_is_rejected() {
        let (router, mut rx, _shutdown) = router(None);
        
        router.dispatch(command("1", "PAUSE")).await.unwrap();
        router.dispatch(command("1", "MOVE-LINEAR X0")).await.unwrap();
        
        let paused: CommandResponse = next_event(&mut rx).payload().unwrap();
        assert_eq!(paused.response, "Printer paused\n");
        
        let rejected = next_event(&mut rx);
        assert_eq!(rejected.event, names::COMMAND_RESPONSE);
        let rejected: CommandResponse = rejected.payload().unwrap();
        assert_eq!(rejected.device_id, DeviceId::from("1"));
        assert_eq!(rejected.response, "Error: printer is paused\n");
    }
    
    #[tokio::test]
    async fn test_multi_line_command() {
        let (router, mut rx, _shutdown) = router(None);
        
        router
            .dispatch(command("1", "G28\n; comment\n\nG1 X5\r\nM114"))
            .await
            .unwrap();
        
        let responses: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|frame| frame.event().unwrap().payload::<CommandResponse>().unwrap().response)
            .collect();
        assert_eq!(
            responses,
            vec![
                "ok\nX:0.00 Y:0.00 Z:0.00\nok\n".to_string(),
                "Moved to X:5.00 Y:0.00 Z:0.00\n".to_string(),
                "X:5.00 Y:0.00 Z:0.00\nok\n".to_string(),
            ]
        );
    }
    
    #[tokio::test]
    async fn test_legacy_command_names() {
        let (router, mut rx, _shutdown) = router(None);
        
        let event = Event::new("send_gcode", json!({"printerid": 1, "gcode": "M115"}));
        router.dispatch(event).await.unwrap();
        
        let response: CommandResponse = next_event(&mut rx).payload().unwrap();
        assert_eq!(response.response, "Firmware: TotallyRealMarlin 2.1.2.5\n");
    }
    
    #[tokio::test]
    async fn test_malformed_command_is_dropped() {
        let (router, mut rx, shutdown) = router(None);
        
        router
            .dispatch(Event::new(names::COMMAND, json!({"deviceId": "1"})))
            .await
            .unwrap();
        router
            .dispatch(Event::new(names::COMMAND, json!({"deviceId": "", "instruction": "G28"})))
            .await
            .unwrap();
        
        assert!(rx.try_recv().is_err());
        assert!(!shutdown.is_cancelled());
    }
    
    #[tokio::test]
    async fn test_foreign_device_gets_error_event() {
        let (router, mut rx, _shutdown) = router(None);
        
        router.dispatch(command("7", "G1 X10")).await.unwrap();
        
        let event = next_event(&mut rx);
        assert_eq!(event.event, names::ERROR);
        let error: ErrorPayload = event.payload().unwrap();
        assert_eq!(error.device_id, Some(DeviceId::from("7")));
        assert_eq!(router.device.with_state(|s| s.position().x), 0.0);
    }
    
    #[tokio::test]
    async fn test_ping_event_gets_pong() {
        let (router, mut rx, _shutdown) = router(None);
        
        router.dispatch(Event::new(names::PING, "probe")).await.unwrap();
        
        assert_eq!(next_event(&mut rx), Event::new(names::PONG, "probe"));
    }
    
    #[tokio::test]
    async fn test_registration_request() {
        let (router, mut rx, _shutdown) = router(None);
        
        router
            .dispatch(Event::new(names::REGISTRATION_REQUEST, json!(null)))
            .await
            .unwrap();
        
        let event = next_event(&mut rx);
        assert_eq!(event.event, names::REGISTRATION);
        assert_eq!(event, router.device.registration_event().unwrap());
    }
    
    #[tokio::test]
    async fn test_diagnostics_and_unknown_are_silent() {
        let (router, mut rx, shutdown) = router(None);
        
        let mut info = Event::new(names::INFO, json!(null));
        info.message = Some("hello".into());
        router.dispatch(info).await.unwrap();
        router.dispatch(Event::new(names::ERROR, "bad")).await.unwrap();
        router.dispatch(Event::new("firmware-update", json!({}))).await.unwrap();
        
        assert!(rx.try_recv().is_err());
        assert!(!shutdown.is_cancelled());
    }
    
    #[tokio::test]
    async fn test_disconnect_cancels() {
        let (router, _rx, shutdown) = router(None);
        
        router.dispatch(Event::new("printer_disconnect", json!({}))).await.unwrap();
        assert!(shutdown.is_cancelled());
    }
    
    #[tokio::test]
    async fn test_serial_port_without_product_id() {
        let (router, mut rx, _shutdown) = router(None);
        
        router
            .dispatch(Event::new(names::SERIAL_PORT_REQUEST, json!(null)))
            .await
            .unwrap();
        
        assert_eq!(next_event(&mut rx).event, names::ERROR);
    }
    
    #[tokio::test]
    async fn test_full_job_queue_rejects() {
        let (jobs, _receiver) = JobQueue::new(1);
        let (router, mut rx, _shutdown) = router(Some(jobs));
        
        router.dispatch(command("1", "G28")).await.unwrap();
        router.dispatch(command("1", "G28")).await.unwrap();
        
        let event = next_event(&mut rx);
        assert_eq!(event.event, names::ERROR);
        let error: ErrorPayload = event.payload().unwrap();
        assert_eq!(error.message, "Job queue full");
    }
    
    #[tokio::test]
    async fn test_closed_queue_propagates() {
        let (router, rx, _shutdown) = router(None);
        drop(rx);
        
        let result = router.dispatch(command("1", "G28")).await;
        assert!(matches!(result, Err(Error::QueueClosed)));
    }
}
