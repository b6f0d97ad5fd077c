use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::instrument;

use crate::cli::output::EventPrinter;
use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::sdk::{FakeSdk, GattSdk, SensorSdk};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates an SDK backed by the host's BLE adapter.
///
/// # Errors
///
/// Returns an error if the BLE manager cannot be created.
pub async fn real_sdk() -> Result<Arc<dyn SensorSdk>> {
    Ok(Arc::new(GattSdk::new().await?))
}

/// Creates an SDK backed by scripted fixtures.
#[must_use]
pub fn fake_sdk(fake_args: FakeArgs) -> Arc<dyn SensorSdk> {
    Arc::new(FakeSdk::new(fake_args.into_sdk_config()))
}

/// Runs a CLI command against `sdk`, printing events to `out`.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = hrstrap::Args::try_parse_from([
///     "hrstrap",
///     "--output",
///     "json",
///     "--fake",
///     "--fake-scan",
///     "A1|AA:BB:CC|Polar H10 A1|-43",
///     "scan",
///     "--duration",
///     "100ms",
/// ])?;
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let sdk = match maybe_fake_args {
///     Some(fake_args) => hrstrap::fake_sdk(fake_args),
///     None => hrstrap::real_sdk().await?,
/// };
/// let mut out = Vec::new();
/// hrstrap::run(command, &mut out, sdk).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device does not
/// respond in time, or output writing fails.
pub async fn run<W>(command: Command, out: &mut W, sdk: Arc<dyn SensorSdk>) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, sdk, None, None).await
}

/// Runs a CLI command with explicit log level and output format overrides.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device does not
/// respond in time, or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    sdk: Arc<dyn SensorSdk>,
    log_level: Option<LogLevel>,
    output_format: Option<OutputFormat>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(
        command,
        out,
        &SystemTerminalClient,
        sdk,
        log_level,
        output_format,
    )
    .await
}

/// Runs a CLI command with an injected terminal client.
///
/// Without an explicit format, output is pretty on a terminal and JSON lines otherwise.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device does not
/// respond in time, or output writing fails.
#[instrument(
    skip(command, out, terminal_client, sdk),
    level = "info",
    fields(command = command.name(), ?log_level, ?output_format)
)]
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    sdk: Arc<dyn SensorSdk>,
    log_level: Option<LogLevel>,
    output_format: Option<OutputFormat>,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "hrstrap",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    let stdout_is_terminal = terminal_client.stdout_is_terminal();
    let format = output_format.unwrap_or(if stdout_is_terminal {
        OutputFormat::Pretty
    } else {
        OutputFormat::Json
    });
    let mut printer = EventPrinter::new(out, format, stdout_is_terminal);

    match command {
        Command::Scan(args) => crate::cli::scan::run(sdk, &args, &mut printer).await,
        Command::Stream(args) => crate::cli::stream::run(sdk, &args, &mut printer).await,
        Command::Record(args) => crate::cli::record::run(sdk, &args, &mut printer).await,
        Command::Exercise(args) => crate::cli::exercise::run(sdk, &args, &mut printer).await,
    }
}
