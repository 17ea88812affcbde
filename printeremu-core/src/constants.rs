//! Protocol constants

/// Default connection timeout (seconds)
pub const DEFAULT_TIMEOUT: u64 = 5;

/// Keepalive cadence (seconds)
pub const KEEPALIVE_INTERVAL: u64 = 5;

/// Payload of the keepalive `ping` event
pub const KEEPALIVE_DATA: &str = "alive";

/// Outbound frames buffered ahead of the writer task
pub const SEND_QUEUE_CAPACITY: usize = 64;

/// Pending jobs buffered ahead of the job consumer
pub const JOB_QUEUE_CAPACITY: usize = 32;

/// Maximum connect attempts before giving up
pub const MAX_RETRIES: usize = 3;

/// First retry delay (milliseconds), doubled per attempt
pub const RETRY_BASE_DELAY_MS: u64 = 100;

/// Retry delay ceiling (milliseconds)
pub const RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Reported by REPORT-FIRMWARE
pub const FIRMWARE_NAME: &str = "TotallyRealMarlin 2.1.2.5";

/// Response to any line that resolves to no instruction
pub const UNKNOWN_COMMAND: &str = "Unknown command\n";

/// Serial number suffix of emulated hardware ids
pub const HWID_SERIAL: &str = "2024-QView3DEmulator";
