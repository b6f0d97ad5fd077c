use std::io;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use tracing::{info, instrument};

use crate::bridge::{BridgeEvent, ExerciseEntryEvent};
use crate::sdk::SensorSdk;

use super::command::DeviceArgs;
use super::output::EventPrinter;
use super::session::{HostSession, SETTLE};
use super::ui::{ExerciseReadView, ExerciseTableView};

/// Arguments for the `exercise` command.
#[derive(Debug, Args)]
pub struct ExerciseArgs {
    #[command(subcommand)]
    action: ExerciseAction,
}

impl ExerciseArgs {
    #[must_use]
    pub fn new(action: ExerciseAction) -> Self {
        Self { action }
    }
}

/// Stored-exercise operations. `read` and `remove` act on the last entry listed.
#[derive(Debug, Clone, Subcommand)]
pub enum ExerciseAction {
    /// List the exercises stored on the strap.
    List(DeviceArgs),
    /// Download the most recently listed exercise.
    Read(DeviceArgs),
    /// Delete the most recently listed exercise.
    Remove(DeviceArgs),
}

impl ExerciseAction {
    fn device(&self) -> &DeviceArgs {
        match self {
            Self::List(device) | Self::Read(device) | Self::Remove(device) => device,
        }
    }
}

#[instrument(skip_all, fields(device_id = %args.action.device().device()))]
pub(crate) async fn run<W>(
    sdk: Arc<dyn SensorSdk>,
    args: &ExerciseArgs,
    printer: &mut EventPrinter<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let mut session = HostSession::start(sdk, args.action.device().timeout());
    let outcome = exercise_on(&mut session, &args.action, printer).await;
    session.close().await;
    outcome
}

async fn exercise_on<W>(
    session: &mut HostSession,
    action: &ExerciseAction,
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
    session
        .disconnect_after(device_id, outcome, |event| printer.event(event))
        .await
}

async fn apply<W>(
    session: &mut HostSession,
    action: &ExerciseAction,
    printer: &mut EventPrinter<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let device_id = action.device().device();
    session.drain(SETTLE, |event| printer.event(event)).await?;

    let entries = list(session, device_id, printer).await?;
    match action {
        ExerciseAction::List(_device) => {
            let view = ExerciseTableView::new(&entries, printer.painter()).to_string();
            printer.summary(view)?;
        }
        ExerciseAction::Read(_device) => {
            let Some(selected) = entries.last() else {
                bail!("no exercises are stored on {device_id}");
            };
            info!(entry_id = %selected.id, "reading exercise");
            session.handle().read_exercise(device_id);
            let read = session
                .wait_for(
                    &format!("exercise {} to download", selected.id),
                    |event| printer.event(event),
                    |event| matches!(event, BridgeEvent::ReadExercise(_)),
                )
                .await?;
            if let BridgeEvent::ReadExercise(read) = read {
                let view = ExerciseReadView::new(&read, printer.painter()).to_string();
                printer.summary(view)?;
            }
        }
        ExerciseAction::Remove(_device) => {
            let Some(selected) = entries.last() else {
                bail!("no exercises are stored on {device_id}");
            };
            info!(entry_id = %selected.id, "removing exercise");
            session.handle().remove_exercise(device_id);
            session.drain(SETTLE, |event| printer.event(event)).await?;
            let remaining = list(session, device_id, printer).await?;
            if remaining.iter().any(|entry| entry.id == selected.id) {
                bail!("exercise {} is still stored on {device_id}", selected.id);
            }
            let view = ExerciseTableView::new(&remaining, printer.painter()).to_string();
            printer.summary(view)?;
        }
    }
    Ok(())
}

/// Lists exercises and collects the entries until the listing goes quiet.
async fn list<W>(
    session: &mut HostSession,
    device_id: &str,
    printer: &mut EventPrinter<'_, W>,
) -> Result<Vec<ExerciseEntryEvent>>
where
    W: io::Write,
{
    session.handle().list_exercises(device_id);
    let mut entries = Vec::new();
    session
        .drain(SETTLE, |event| {
            if let BridgeEvent::ExerciseEntry(entry) = event {
                entries.push(entry.clone());
            }
            printer.event(event)
        })
        .await?;
    Ok(entries)
}
