use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::instrument;

use crate::bridge::{BridgeEvent, RecordStatusEvent};
use crate::sdk::SensorSdk;

use super::command::DeviceArgs;
use super::output::EventPrinter;
use super::session::{HostSession, SETTLE};
use super::ui::RecordStatusView;

/// Arguments for the `record` command.
#[derive(Debug, Args)]
pub struct RecordArgs {
    #[command(subcommand)]
    action: RecordAction,
}

impl RecordArgs {
    #[must_use]
    pub fn new(action: RecordAction) -> Self {
        Self { action }
    }
}

/// Recording operations.
#[derive(Debug, Clone, Subcommand)]
pub enum RecordAction {
    /// Print whether the strap is recording.
    Status(DeviceArgs),
    /// Start an on-device recording.
    Start(StartRecordingArgs),
    /// Stop the ongoing recording.
    Stop(DeviceArgs),
}

impl RecordAction {
    fn device(&self) -> &DeviceArgs {
        match self {
            Self::Status(device) | Self::Stop(device) => device,
            Self::Start(args) => &args.device,
        }
    }
}

/// Arguments for `record start`.
#[derive(Debug, Clone, Args)]
pub struct StartRecordingArgs {
    #[command(flatten)]
    device: DeviceArgs,
    /// Name stored with the recording.
    #[arg(long)]
    exercise_id: String,
    /// Sample type: `hr` for heart rate, `rr` for RR intervals.
    #[arg(long, default_value = "hr", value_parser = ["hr", "rr"])]
    sample_type: String,
}

impl StartRecordingArgs {
    #[must_use]
    pub fn new(device: DeviceArgs, exercise_id: impl Into<String>, sample_type: impl Into<String>) -> Self {
        Self {
            device,
            exercise_id: exercise_id.into(),
            sample_type: sample_type.into(),
        }
    }
}

/// Connects, applies the recording action, then prints the resulting status.
#[instrument(skip_all, fields(device_id = %args.action.device().device()))]
pub(crate) async fn run<W>(
    sdk: Arc<dyn SensorSdk>,
    args: &RecordArgs,
    printer: &mut EventPrinter<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let device = args.action.device();
    let mut session = HostSession::start(sdk, device.timeout());
    let outcome = record_on(&mut session, &args.action, printer).await;
    session.close().await;
    outcome
}

async fn record_on<W>(
    session: &mut HostSession,
    action: &RecordAction,
    printer: &mut EventPrinter<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let device_id = action.device().device();
    session
        .connect(device_id, |event| printer.event(event))
        .await?;
    let outcome = apply(session, action, printer).await;
    let status = session
        .disconnect_after(device_id, outcome, |event| printer.event(event))
        .await?;

    let view = RecordStatusView::new(device_id, &status, printer.painter()).to_string();
    printer.summary(view)
}

async fn apply<W>(
    session: &mut HostSession,
    action: &RecordAction,
    printer: &mut EventPrinter<'_, W>,
) -> Result<RecordStatusEvent>
where
    W: io::Write,
{
    let device_id = action.device().device();
    // Lets the status query issued on connect land before ours.
    session.drain(SETTLE, |event| printer.event(event)).await?;

    let handle = session.handle().clone();
    match action {
        RecordAction::Status(_device) => {}
        RecordAction::Start(args) => {
            handle.start_recording(device_id, &args.exercise_id, &args.sample_type);
        }
        RecordAction::Stop(_device) => handle.stop_recording(device_id),
    }
    handle.get_recording_status(device_id);

    let event = session
        .wait_for(
            "recording status",
            |event| printer.event(event),
            |event| matches!(event, BridgeEvent::RecordStatus(_)),
        )
        .await?;
    let BridgeEvent::RecordStatus(status) = event else {
        anyhow::bail!("unexpected {} event while waiting for the recording status", event.name());
    };
    Ok(status)
}
