//! Bridge between a BLE heart-rate strap SDK and a host runtime, plus the
//! `hrstrap` command-line host.

mod app;
pub mod bridge;
mod cli;
mod error;
pub mod sdk;
mod telemetry;
mod terminal;

pub use app::{fake_sdk, real_sdk, run, run_with_clients, run_with_log_level};
pub use cli::{
    Args, Command, DeviceArgs, ExerciseAction, ExerciseArgs, FakeArgs, LogLevel, OutputFormat,
    RecordAction, RecordArgs, ScanArgs, StartRecordingArgs, StreamArgs,
};
pub use error::{FixtureError, SdkError};
pub use terminal::TerminalClient;
