use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::exercise::ExerciseArgs;
use crate::cli::record::RecordArgs;
use crate::cli::scan::ScanArgs;
use crate::cli::stream::StreamArgs;
use crate::error::{CliError, FixtureError};
use crate::sdk::{FakeSdkConfig, ScanFixture};

const DEFAULT_FAKE_INTERVAL: Duration = Duration::from_millis(100);
pub(crate) const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(20);

/// Command-line options for the heart-rate strap bridge.
#[derive(Debug, Parser)]
#[command(
    name = "hrstrap",
    about = "Drive a BLE heart-rate strap through the sensor bridge and print its events."
)]
pub struct Args {
    /// Log verbosity; overrides `RUST_LOG`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Uses the scripted fake SDK instead of the BLE backend.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `device_id|address|name|rssi;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Interval between synthetic fake stream batches (e.g. `100ms`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_interval: Option<Duration>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            output: None,
            fake: false,
            fake_scan: None,
            fake_interval: None,
            command,
        }
    }

    /// Enables fake SDK mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scan_fixture,
            interval,
        } = fake;

        self.fake = true;
        self.fake_scan = Some(scan_fixture);
        self.fake_interval = Some(interval);
        self
    }

    /// Returns the requested log level override.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the requested output format, if one was given.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Splits parsed CLI arguments into command and optional fake-SDK settings.
    ///
    /// # Errors
    ///
    /// Returns an error if fake mode is enabled without a scan fixture.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scan,
            fake_interval,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                interval: fake_interval.unwrap_or(DEFAULT_FAKE_INTERVAL),
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Fake SDK arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    #[builder(default = DEFAULT_FAKE_INTERVAL)]
    interval: Duration,
}

impl FakeArgs {
    pub(crate) fn into_sdk_config(self) -> FakeSdkConfig {
        FakeSdkConfig::from_fixture(self.scan_fixture, self.interval)
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// How forwarded events are printed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines and tables.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search for straps and print each one found.
    Scan(ScanArgs),
    /// Connect to a strap and print live sensor data.
    Stream(StreamArgs),
    /// Query or control on-device exercise recording.
    Record(RecordArgs),
    /// List, read or remove exercises stored on a strap.
    Exercise(ExerciseArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Scan(_args) => "scan",
            Self::Stream(_args) => "stream",
            Self::Record(_args) => "record",
            Self::Exercise(_args) => "exercise",
        }
    }
}

/// Target device options shared by the device commands.
#[derive(Debug, Clone, clap::Args)]
pub struct DeviceArgs {
    /// Device id to connect to.
    #[arg(long)]
    device: String,
    /// How long to wait for each step (discovery, connection, replies).
    #[arg(long, default_value = "20s", value_parser = parse_duration)]
    timeout: Duration,
}

impl DeviceArgs {
    #[must_use]
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub(crate) fn device(&self) -> &str {
        &self.device
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fake_mode_requires_scan_fixture() {
        let result = Args::try_parse_from(["hrstrap", "--fake", "scan"]);

        let error = result.expect_err("missing --fake-scan should fail argument parsing");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_scan_requires_fake_mode() {
        let result = Args::try_parse_from([
            "hrstrap",
            "--fake-scan",
            "A1|AA:BB|Polar H10 A1|-43",
            "scan",
        ]);

        let error = result.expect_err("--fake-scan should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn malformed_fake_scan_is_rejected_while_parsing() {
        let result = Args::try_parse_from([
            "hrstrap",
            "--fake",
            "--fake-scan",
            "A1|AA:BB|Polar H10 A1",
            "scan",
        ]);

        let error = result.expect_err("three-field fixture should be rejected");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }

    #[test]
    fn fake_mode_builds_fake_settings() {
        let cli = Args::try_parse_from([
            "hrstrap",
            "--log-level",
            "debug",
            "--output",
            "json",
            "--fake",
            "--fake-scan",
            "A1|AA:BB|Polar H10 A1|-43",
            "--fake-interval",
            "50ms",
            "scan",
        ])
        .expect("valid fake arguments should parse");

        assert_eq!(Some(LogLevel::Debug), cli.log_level());
        assert_eq!(Some(OutputFormat::Json), cli.output_format());
        let (command, fake_args) = cli
            .into_command_and_fake_args()
            .expect("valid fake arguments should resolve fake settings");
        assert_matches!(command, Command::Scan(_));
        assert_matches!(fake_args, Some(FakeArgs { interval, .. }) if interval == Duration::from_millis(50));
    }

    #[test]
    fn stream_requires_device_and_capability() {
        let result = Args::try_parse_from(["hrstrap", "stream", "--device", "A1"]);

        let error = result.expect_err("stream without capabilities should fail");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }
}
