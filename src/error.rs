use std::time::Duration;

use thiserror::Error;

use crate::sdk::HeartRateDecodeError;

/// Errors reported by the sensor SDK boundary.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("device `{device_id}` is not known to the SDK; search for it first")]
    DeviceNotFound { device_id: String },
    #[error("device `{device_id}` is not connected")]
    NotConnected { device_id: String },
    #[error("device `{device_id}` disconnected")]
    Disconnected { device_id: String },
    #[error("`{operation}` is not supported by this SDK backend")]
    Unsupported { operation: &'static str },
    #[error("required characteristic `{name}` is missing on device `{device_id}`")]
    MissingCharacteristic {
        device_id: String,
        name: &'static str,
    },
    #[error("exercise `{entry_id}` does not exist on the device")]
    ExerciseNotFound { entry_id: String },
    #[error("SDK transport failure: {message}")]
    Transport { message: String },
    #[error(transparent)]
    HeartRateDecode(#[from] HeartRateDecodeError),
}

/// Errors returned when parsing fake SDK fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
}

/// Errors raised by the command-line host while waiting on the bridge.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
    #[error(
        "timed out after {elapsed} waiting for {waiting_for}",
        elapsed = humantime::format_duration(*timeout)
    )]
    Timeout {
        waiting_for: String,
        timeout: Duration,
    },
    #[error("the bridge stopped before {waiting_for} arrived")]
    BridgeStopped { waiting_for: String },
    #[error("failed while waiting for Ctrl+C")]
    CtrlC { source: std::io::Error },
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
