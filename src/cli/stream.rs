use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::bridge::{BridgeEvent, Capability};
use crate::error::CliError;
use crate::sdk::SensorSdk;

use super::command::{DEFAULT_STEP_TIMEOUT, parse_duration};
use super::output::EventPrinter;
use super::session::HostSession;

/// Arguments for the `stream` command.
#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Device id to connect to.
    #[arg(long)]
    device: String,
    /// Streams to start; repeat for several.
    #[arg(long = "capability", value_enum, required = true)]
    capabilities: Vec<Capability>,
    /// Stop after streaming for this long (e.g. `30s`). If omitted, stream until Ctrl+C.
    #[arg(long, value_parser = parse_duration, conflicts_with = "max_events")]
    duration: Option<Duration>,
    /// Stop after this many data events.
    #[arg(long)]
    max_events: Option<usize>,
    /// How long to wait for discovery, connection and readiness.
    #[arg(long, default_value = "20s", value_parser = parse_duration)]
    timeout: Duration,
}

impl StreamArgs {
    #[must_use]
    pub fn new(device: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        Self {
            device: device.into(),
            capabilities,
            duration: None,
            max_events: None,
            timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = Some(max_events);
        self.duration = None;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self.max_events = None;
        self
    }
}

/// Why streaming stopped.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum StopReason {
    ReachedLimit,
    Elapsed,
    Interrupted,
    Disconnected,
}

impl StopReason {
    fn describe(self) -> &'static str {
        match self {
            Self::ReachedLimit => "reached event limit",
            Self::Elapsed => "duration elapsed",
            Self::Interrupted => "interrupted",
            Self::Disconnected => "device disconnected",
        }
    }
}

/// Connects, waits for every requested capability, streams, then tears down.
#[instrument(skip_all, fields(device_id = %args.device, capabilities = ?args.capabilities))]
pub(crate) async fn run<W>(
    sdk: Arc<dyn SensorSdk>,
    args: &StreamArgs,
    printer: &mut EventPrinter<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let mut session = HostSession::start(sdk, args.timeout);
    let outcome = stream_on(&mut session, args, printer).await;
    session.close().await;
    let (received, reason) = outcome?;

    info!(received, reason = reason.describe(), "streaming finished");
    let painter = printer.painter();
    let summary = format!(
        "{} {} {}",
        painter.heading("Received"),
        painter.value(received.to_string()),
        painter.muted(format!("data events ({})", reason.describe())),
    );
    printer.summary(summary)
}

async fn stream_on<W>(
    session: &mut HostSession,
    args: &StreamArgs,
    printer: &mut EventPrinter<'_, W>,
) -> Result<(usize, StopReason)>
where
    W: io::Write,
{
    let device_id = args.device.as_str();
    session
        .connect(device_id, |event| printer.event(event))
        .await?;

    let outcome = stream_connected(session, args, printer).await;
    if matches!(outcome, Ok((_, StopReason::Disconnected))) {
        return outcome;
    }
    session
        .disconnect_after(device_id, outcome, |event| printer.event(event))
        .await
}

async fn stream_connected<W>(
    session: &mut HostSession,
    args: &StreamArgs,
    printer: &mut EventPrinter<'_, W>,
) -> Result<(usize, StopReason)>
where
    W: io::Write,
{
    let device_id = args.device.as_str();
    let requested: BTreeSet<Capability> = args.capabilities.iter().copied().collect();

    let mut pending = requested.clone();
    while !pending.is_empty() {
        let waiting_for = format!("{pending:?} to become ready on {device_id}");
        let ready = session
            .wait_for(&waiting_for, |event| printer.event(event), |event| {
                matches!(
                    event,
                    BridgeEvent::FeatureReady { capability, device_id: ready_on }
                        if ready_on == device_id && pending.contains(capability)
                )
            })
            .await?;
        if let BridgeEvent::FeatureReady { capability, .. } = ready {
            pending.remove(&capability);
        }
    }

    for capability in &requested {
        session.handle().start_streaming(*capability, device_id);
    }

    let result = receive_data(session, args, printer).await;

    for capability in &requested {
        session.handle().stop_streaming(*capability, device_id);
    }
    result
}

async fn receive_data<W>(
    session: &mut HostSession,
    args: &StreamArgs,
    printer: &mut EventPrinter<'_, W>,
) -> Result<(usize, StopReason)>
where
    W: io::Write,
{
    let device_id = args.device.as_str();
    let deadline = args.duration.map(|duration| Instant::now() + duration);
    let mut received = 0;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        if args.max_events.is_some_and(|limit| received >= limit) {
            return Ok((received, StopReason::ReachedLimit));
        }

        let event = tokio::select! {
            result = &mut ctrl_c => {
                result.map_err(|source| CliError::CtrlC { source })?;
                return Ok((received, StopReason::Interrupted));
            }
            () = sleep_until(deadline) => return Ok((received, StopReason::Elapsed)),
            event = session.next_event() => event,
        };
        let Some(event) = event else {
            return Err(CliError::BridgeStopped {
                waiting_for: "stream data".to_string(),
            }
            .into());
        };

        printer.event(&event)?;
        match &event {
            BridgeEvent::HrData(_)
            | BridgeEvent::EcgData(_)
            | BridgeEvent::AccData(_)
            | BridgeEvent::PpgData(_)
            | BridgeEvent::PpiData(_) => received += 1,
            BridgeEvent::DeviceDisconnected(device) if device.device_id() == device_id => {
                return Ok((received, StopReason::Disconnected));
            }
            other => debug!(event = other.name(), "non-data event while streaming"),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
