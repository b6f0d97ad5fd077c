use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::time::Instant;
use tracing::{info, instrument};

use crate::bridge::BridgeEvent;
use crate::sdk::{DeviceInfo, SensorSdk};

use super::command::parse_duration;
use super::output::EventPrinter;
use super::session::HostSession;
use super::ui::DeviceTableView;

/// Arguments for the `scan` command.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// How long to search for devices (e.g. `5s`).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    duration: Duration,
}

impl ScanArgs {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

/// Searches for the scan window and prints every device found.
#[instrument(skip_all, fields(duration = %humantime::format_duration(args.duration)))]
pub(crate) async fn run<W>(
    sdk: Arc<dyn SensorSdk>,
    args: &ScanArgs,
    printer: &mut EventPrinter<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let mut session = HostSession::start(sdk, args.duration);
    session.handle().search_for_device();

    let deadline = Instant::now() + args.duration;
    let mut devices: Vec<DeviceInfo> = Vec::new();
    let outcome = async {
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, session.next_event()).await {
            printer.event(&event)?;
            if let BridgeEvent::DeviceFound(device) = event
                && !devices
                    .iter()
                    .any(|known| known.device_id() == device.device_id())
            {
                devices.push(device);
            }
        }
        anyhow::Ok(())
    }
    .await;
    session.close().await;
    outcome?;

    info!(found = devices.len(), "scan finished");
    let view = DeviceTableView::new(&devices, printer.painter());
    let summary = view.to_string();
    printer.summary(summary)
}
