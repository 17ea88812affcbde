//! End-to-end connection tests against an in-memory peer

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use printeremu::{ClientConfig, Device, DispatchMode, Error, ProtocolClient, RetryPolicy};
use printeremu_core::{names, CommandRequest, CommandResponse, Event, Frame, PacketType};
use printeremu_transport::memory::{self, MemoryPeer};
use printeremu_types::{DeviceInfo, DeviceState, Extruder, Heatbed};

fn device() -> Device {
    Device::builder(DeviceInfo::new(1, "Prusa MK4", "Printer1"))
        .extruder(Extruder::default())
        .heatbed(Heatbed::default())
        .build()
        .unwrap()
}

fn command(instruction: &str) -> Event {
    CommandRequest::new("1", instruction).into_event().unwrap()
}

async fn response(peer: &mut MemoryPeer) -> String {
    let event = peer.recv_named(names::COMMAND_RESPONSE).await.unwrap();
    event.payload::<CommandResponse>().unwrap().response
}

async fn connect(config: ClientConfig) -> (Device, printeremu::Connection, MemoryPeer) {
    let device = device();
    let (transport, peer) = memory::channel();
    let client = ProtocolClient::new(transport).with_config(config);
    let connection = client.connect(&device).await.unwrap();
    (device, connection, peer)
}

#[tokio::test]
async fn test_open_frame_is_first() {
    let (device, connection, mut peer) = connect(ClientConfig::default()).await;
    
    assert_eq!(peer.recv_text().await.as_deref(), Some("0"));
    assert!(device.is_connected());
    assert!(connection.session().is_open());
}

#[tokio::test]
async fn test_ping_frame_gets_pong() {
    let (_device, _connection, mut peer) = connect(ClientConfig::default()).await;
    
    peer.send_text("2probe").await.unwrap();
    
    let pong = loop {
        let frame = peer.recv_frame().await.unwrap();
        if frame.packet_type == PacketType::Pong {
            break frame;
        }
    };
    assert_eq!(pong.payload.as_deref(), Some("probe"));
}

#[tokio::test]
async fn test_peer_open_frame_is_consumed() {
    let (_device, connection, mut peer) = connect(ClientConfig::default()).await;
    
    peer.send_text(r#"0{"sid":"abc123","pingInterval":25000,"pingTimeout":5000}"#)
        .await
        .unwrap();
    peer.send_event(&command("M115")).await.unwrap();
    
    assert_eq!(response(&mut peer).await, "Firmware: TotallyRealMarlin 2.1.2.5\n");
    assert_eq!(connection.session().sid().as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_registration_reproduces_snapshot() {
    let (device, _connection, mut peer) = connect(ClientConfig::default()).await;
    device.execute("G1 X12.5 Y3");
    device.execute("M104 S215");
    
    peer.send_event(&Event::new(names::REGISTRATION_REQUEST, Value::Null))
        .await
        .unwrap();
    
    let event = peer.recv_named(names::REGISTRATION).await.unwrap();
    let snapshot: DeviceState = event.payload().unwrap();
    assert_eq!(snapshot, device.snapshot());
}

#[tokio::test]
async fn test_move_while_paused_is_rejected() {
    let (device, _connection, mut peer) = connect(ClientConfig::default()).await;
    
    peer.send_event(&command("PAUSE")).await.unwrap();
    peer.send_event(&command("MOVE-LINEAR X0")).await.unwrap();
    
    assert_eq!(response(&mut peer).await, "Printer paused\n");
    assert_eq!(response(&mut peer).await, "Error: printer is paused\n");
    assert!(device.with_state(|s| s.is_paused()));
}

#[tokio::test]
async fn test_malformed_frames_do_not_close() {
    let (_device, connection, mut peer) = connect(ClientConfig::default()).await;
    
    peer.send_text("9garbage").await.unwrap();
    peer.send_text("4{not json").await.unwrap();
    peer.send_text("4").await.unwrap();
    peer.send_text("4{'event':'command','data':{'deviceId':'1','instruction':'M114'}}")
        .await
        .unwrap();
    
    assert_eq!(response(&mut peer).await, "X:0.00 Y:0.00 Z:0.00\nok\n");
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn test_foreign_device_id() {
    let (_device, _connection, mut peer) = connect(ClientConfig::default()).await;
    
    let event = CommandRequest::new("2", "G28").into_event().unwrap();
    peer.send_event(&event).await.unwrap();
    
    let error = peer.recv_named(names::ERROR).await.unwrap();
    assert_eq!(error.data["deviceId"], json!("2"));
}

#[tokio::test]
async fn test_disconnect_event_closes_and_detaches() {
    let (device, connection, mut peer) = connect(ClientConfig::default()).await;
    
    peer.send_event(&command("M113")).await.unwrap();
    peer.send_event(&Event::new(names::DISCONNECT, Value::Null)).await.unwrap();
    
    connection.closed().await;
    connection.join().await;
    assert!(!device.is_connected());
    
    // Everything queued before the disconnect is flushed, then the close frame
    let mut frames = Vec::new();
    while let Some(text) = peer.recv_text().await {
        frames.push(Frame::decode(&text).unwrap());
    }
    let last = frames.pop().unwrap();
    assert_eq!(last.packet_type, PacketType::Close);
    assert!(frames.iter().any(|frame| {
        frame
            .event()
            .map(|event| event.event == names::COMMAND_RESPONSE)
            .unwrap_or(false)
    }));
}

#[tokio::test]
async fn test_peer_close_frames() {
    for close in ["1", "close"] {
        let (device, connection, peer) = connect(ClientConfig::default()).await;
        
        peer.send_text(close).await.unwrap();
        connection.closed().await;
        connection.join().await;
        assert!(!device.is_connected());
    }
}

#[tokio::test]
async fn test_peer_hangup_closes() {
    let (device, connection, peer) = connect(ClientConfig::default()).await;
    
    drop(peer);
    connection.closed().await;
    connection.join().await;
    assert!(!device.is_connected());
}

#[tokio::test]
async fn test_double_close() {
    let (device, connection, _peer) = connect(ClientConfig::default()).await;
    let outbound = connection.outbound();
    
    connection.close();
    connection.close();
    assert!(connection.is_closed());
    connection.shutdown().await;
    
    assert!(!device.is_connected());
    assert!(outbound.is_closed());
    assert!(matches!(
        outbound.send(Frame::close()).await,
        Err(Error::QueueClosed)
    ));
}

#[tokio::test]
async fn test_device_reconnects_after_close() {
    let (device, connection, _peer) = connect(ClientConfig::default()).await;
    
    let (transport, mut second_peer) = memory::channel();
    let client = ProtocolClient::new(transport);
    assert!(matches!(
        client.connect(&device).await,
        Err(Error::AlreadyConnected(1))
    ));
    
    connection.shutdown().await;
    let _second = client.connect(&device).await.unwrap();
    assert_eq!(second_peer.recv_text().await.as_deref(), Some("0"));
    assert!(device.is_connected());
}

#[tokio::test]
async fn test_close_releases_device_immediately() {
    let (device, connection, mut peer) = connect(ClientConfig::default()).await;
    
    peer.send_event(&command("M155 S2")).await.unwrap();
    while response(&mut peer).await != "ok\n" {}
    
    connection.close();
    assert!(!device.is_connected());
    assert!(!device.telemetry().is_running());
    
    let (transport, mut second_peer) = memory::channel();
    let second = ProtocolClient::new(transport).connect(&device).await.unwrap();
    assert_eq!(second_peer.recv_text().await.as_deref(), Some("0"));
    
    // The stale connection no longer owns the device
    connection.join().await;
    assert!(device.is_connected());
    assert!(!second.is_closed());
}

#[tokio::test]
async fn test_transport_connects_once() {
    let device = device();
    let (transport, _peer) = memory::channel();
    let client = ProtocolClient::new(transport)
        .with_config(ClientConfig::default().with_retry(RetryPolicy::once()));
    
    let first = client.connect(&device).await.unwrap();
    first.shutdown().await;
    
    assert!(client.connect(&device).await.is_err());
    assert!(!device.is_connected());
}

#[tokio::test]
async fn test_cancelled_before_connect() {
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    
    let device = device();
    let (transport, _peer) = memory::channel();
    let client = ProtocolClient::new(transport)
        .with_config(ClientConfig::default().with_shutdown(shutdown));
    
    assert!(matches!(
        client.connect(&device).await,
        Err(Error::Transport(printeremu_transport::Error::Cancelled))
    ));
}

#[tokio::test]
async fn test_external_shutdown_closes_connection() {
    let shutdown = CancellationToken::new();
    let (device, connection, _peer) =
        connect(ClientConfig::default().with_shutdown(shutdown.clone())).await;
    
    shutdown.cancel();
    connection.closed().await;
    connection.join().await;
    assert!(!device.is_connected());
}

#[tokio::test]
async fn test_queued_dispatch() {
    let config = ClientConfig::default().with_dispatch(DispatchMode::Queued);
    let (device, _connection, mut peer) = connect(config).await;
    
    peer.send_event(&command("G28\nG1 X20 Y30\nM114")).await.unwrap();
    
    assert_eq!(response(&mut peer).await, "ok\nX:0.00 Y:0.00 Z:0.00\nok\n");
    assert_eq!(response(&mut peer).await, "Moved to X:20.00 Y:30.00 Z:0.00\n");
    assert_eq!(response(&mut peer).await, "X:20.00 Y:30.00 Z:0.00\nok\n");
    assert_eq!(device.with_state(|s| s.position().y), 30.0);
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_started_twice_streams_once() {
    let (device, _connection, mut peer) = connect(ClientConfig::default()).await;
    
    peer.send_event(&command("M155 S1\nPERIODIC-TELEMETRY S1")).await.unwrap();
    
    let mut acks = 0;
    let mut samples = 0;
    let _ = timeout(Duration::from_millis(3500), async {
        loop {
            let text = response(&mut peer).await;
            if text.starts_with("T:") {
                samples += 1;
            } else if text == "ok\n" {
                acks += 1;
            }
        }
    })
    .await;
    
    assert_eq!(acks, 2);
    assert_eq!(samples, 4);
    assert!(device.telemetry().is_running());
    
    peer.send_event(&command("M155 S0")).await.unwrap();
    while response(&mut peer).await != "ok\n" {}
    assert!(!device.telemetry().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_stops_with_connection() {
    let (device, connection, mut peer) = connect(ClientConfig::default()).await;
    
    peer.send_event(&command("M155 S2")).await.unwrap();
    while response(&mut peer).await != "ok\n" {}
    assert!(device.telemetry().is_running());
    
    connection.shutdown().await;
    assert!(!device.telemetry().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_ping() {
    let (_device, _connection, mut peer) = connect(ClientConfig::default()).await;
    let start = Instant::now();
    
    assert_eq!(peer.recv_text().await.as_deref(), Some("0"));
    let ping = peer.recv_event().await.unwrap();
    
    assert_eq!(ping, Event::new(names::PING, "alive"));
    assert!(start.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_zero_keepalive_interval_disables_keepalive() {
    let config = ClientConfig::default()
        .with_keepalive_interval(Duration::ZERO)
        .with_keepalive_timeout(Duration::from_secs(1));
    let (device, connection, mut peer) = connect(config).await;
    
    assert_eq!(peer.recv_text().await.as_deref(), Some("0"));
    assert!(timeout(Duration::from_secs(30), peer.recv_text()).await.is_err());
    assert!(!connection.is_closed());
    
    peer.send_event(&command("M997")).await.unwrap();
    assert_eq!(response(&mut peer).await, "Machine name: Prusa MK4\n");
    assert!(device.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_timeout_closes() {
    let config = ClientConfig::default()
        .with_keepalive_interval(Duration::from_secs(1))
        .with_keepalive_timeout(Duration::from_secs(3));
    let (device, connection, _peer) = connect(config).await;
    let start = Instant::now();
    
    timeout(Duration::from_secs(10), connection.closed())
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_secs(3));
    
    connection.join().await;
    assert!(!device.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_inbound_traffic_defers_timeout() {
    let config = ClientConfig::default()
        .with_keepalive_interval(Duration::from_secs(1))
        .with_keepalive_timeout(Duration::from_secs(3));
    let (_device, connection, peer) = connect(config).await;
    
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        peer.send_text("3").await.unwrap();
    }
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn test_tcp_loopback() {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        
        let open = lines.next_line().await.unwrap().unwrap();
        let request = Frame::message(&command("M997")).unwrap().encode();
        write.write_all(format!("{}\n", request).as_bytes()).await.unwrap();
        
        let reply = loop {
            let line = lines.next_line().await.unwrap().unwrap();
            let frame = Frame::decode(&line).unwrap();
            if let Ok(event) = frame.event() {
                if event.event == names::COMMAND_RESPONSE {
                    break event.payload::<CommandResponse>().unwrap().response;
                }
            }
        };
        (open, reply)
    });
    
    let device = device();
    let connection = ProtocolClient::tcp("127.0.0.1", port)
        .connect(&device)
        .await
        .unwrap();
    
    let (open, reply) = server.await.unwrap();
    assert_eq!(open, "0");
    assert_eq!(reply, "Machine name: Prusa MK4\n");
    
    connection.shutdown().await;
    assert!(!device.is_connected());
}
