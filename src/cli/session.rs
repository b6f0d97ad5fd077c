use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use owo_colors::OwoColorize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::bridge::{Bridge, BridgeEvent, BridgeHandle};
use crate::error::CliError;
use crate::sdk::{DeviceInfo, SensorSdk};

/// Quiet period that ends a burst of events with no terminating event.
pub(crate) const SETTLE: Duration = Duration::from_millis(500);

/// A running bridge plus the receiving end of its event channel.
pub(crate) struct HostSession {
    handle: BridgeHandle,
    events: mpsc::UnboundedReceiver<BridgeEvent>,
    task: JoinHandle<()>,
    timeout: Duration,
}

impl HostSession {
    /// Spawns a bridge over `sdk`. `timeout` bounds every wait on a single event.
    pub(crate) fn start(sdk: Arc<dyn SensorSdk>, timeout: Duration) -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        let (bridge, handle) = Bridge::new(sdk, Arc::new(sender));
        let task = tokio::spawn(bridge.run());
        Self {
            handle,
            events,
            task,
            timeout,
        }
    }

    pub(crate) fn handle(&self) -> &BridgeHandle {
        &self.handle
    }

    /// Receives the next event, or `None` once the bridge has dropped its emitter.
    pub(crate) async fn next_event(&mut self) -> Option<BridgeEvent> {
        self.events.recv().await
    }

    /// Passes events to `on_event` until one matches `predicate`, which is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Timeout`] when nothing matches in time, [`CliError::BridgeStopped`]
    /// when the event channel closes, or the first error from `on_event`.
    pub(crate) async fn wait_for<F, P>(
        &mut self,
        waiting_for: &str,
        mut on_event: F,
        mut predicate: P,
    ) -> Result<BridgeEvent>
    where
        F: FnMut(&BridgeEvent) -> Result<()>,
        P: FnMut(&BridgeEvent) -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            let event = match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return Err(CliError::BridgeStopped {
                        waiting_for: waiting_for.to_string(),
                    }
                    .into());
                }
                Err(_elapsed) => {
                    return Err(CliError::Timeout {
                        waiting_for: waiting_for.to_string(),
                        timeout: self.timeout,
                    }
                    .into());
                }
            };
            on_event(&event)?;
            if predicate(&event) {
                return Ok(event);
            }
        }
    }

    /// Passes events to `on_event` until none arrives for `quiet`.
    ///
    /// # Errors
    ///
    /// Returns the first error from `on_event`.
    pub(crate) async fn drain<F>(&mut self, quiet: Duration, mut on_event: F) -> Result<usize>
    where
        F: FnMut(&BridgeEvent) -> Result<()>,
    {
        let mut seen = 0;
        while let Ok(Some(event)) = tokio::time::timeout(quiet, self.events.recv()).await {
            on_event(&event)?;
            seen += 1;
        }
        Ok(seen)
    }

    /// Searches until `device_id` is found, then connects and waits for the link.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is not found or does not connect in time.
    #[instrument(skip(self, device_id, on_event), level = "info", fields(%device_id))]
    pub(crate) async fn connect<F>(&mut self, device_id: &str, mut on_event: F) -> Result<DeviceInfo>
    where
        F: FnMut(&BridgeEvent) -> Result<()>,
    {
        let span = tracing::Span::current();
        span.pb_set_message(&format!("Searching for {device_id}"));
        self.handle.search_for_device();
        self.wait_for(
            &format!("device {device_id} to be found"),
            &mut on_event,
            |event| matches!(event, BridgeEvent::DeviceFound(device) if device.device_id() == device_id),
        )
        .await
        .inspect_err(|_error| span.pb_set_finish_message(&format!("{} Not found", "✗".red())))?;

        span.pb_set_message(&format!("Connecting to {device_id}"));
        self.handle.connect_to_device(device_id);
        let connected = self
            .wait_for(
                &format!("device {device_id} to connect"),
                &mut on_event,
                |event| matches!(event, BridgeEvent::DeviceConnected(device) if device.device_id() == device_id),
            )
            .await
            .inspect_err(|_error| {
                span.pb_set_finish_message(&format!("{} Connection failed", "✗".red()));
            })?;
        span.pb_set_finish_message(&format!("{} Connected", "✓".green()));

        let BridgeEvent::DeviceConnected(device) = connected else {
            anyhow::bail!("unexpected {} event while connecting", connected.name());
        };
        Ok(device)
    }

    /// Disconnects `device_id` and waits for the link to drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the disconnect is not confirmed in time.
    pub(crate) async fn disconnect<F>(&mut self, device_id: &str, on_event: F) -> Result<()>
    where
        F: FnMut(&BridgeEvent) -> Result<()>,
    {
        self.handle.disconnect_from_device(device_id);
        self.wait_for(
            &format!("device {device_id} to disconnect"),
            on_event,
            |event| matches!(event, BridgeEvent::DeviceDisconnected(device) if device.device_id() == device_id),
        )
        .await?;
        Ok(())
    }

    /// Disconnects `device_id` whatever `outcome` is, and returns `outcome`'s error first.
    ///
    /// # Errors
    ///
    /// Returns the error in `outcome`, or else the disconnect error.
    pub(crate) async fn disconnect_after<T, F>(
        &mut self,
        device_id: &str,
        outcome: Result<T>,
        on_event: F,
    ) -> Result<T>
    where
        F: FnMut(&BridgeEvent) -> Result<()>,
    {
        let disconnected = self.disconnect(device_id, on_event).await;
        match (outcome, disconnected) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(error)) | (Err(error), Ok(())) => Err(error),
            (Err(error), Err(disconnect_error)) => {
                warn!(error = %disconnect_error, "disconnect after a failed command also failed");
                Err(error)
            }
        }
    }

    /// Shuts the bridge down and waits for its loop to finish.
    #[instrument(skip(self))]
    pub(crate) async fn close(self) {
        self.handle.shutdown();
        if let Err(error) = self.task.await {
            warn!(%error, "bridge task ended abnormally");
        } else {
            debug!("bridge closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::sdk::{FakeSdk, FakeSdkConfig, SdkCall};

    fn device(device_id: &str) -> DeviceInfo {
        DeviceInfo::new(device_id, "AA:BB", -40, format!("Polar H10 {device_id}"), true)
    }

    fn session_with(devices: Vec<DeviceInfo>) -> (FakeSdk, HostSession) {
        let sdk = FakeSdk::new(FakeSdkConfig::builder().devices(devices).build());
        let session = HostSession::start(Arc::new(sdk.clone()), Duration::from_secs(2));
        (sdk, session)
    }

    #[tokio::test(start_paused = true)]
    async fn connect_searches_then_connects() {
        let (_sdk, mut session) = session_with(vec![device("A1")]);
        let mut seen = Vec::new();

        let connected = session
            .connect("A1", |event| {
                seen.push(event.name());
                Ok(())
            })
            .await
            .expect("known device should connect");

        assert_eq!("A1", connected.device_id());
        assert_eq!(Some(&"DEVICE_FOUND"), seen.first());
        assert_eq!(Some(&"DEVICE_CONNECTED"), seen.last());
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn missing_device_times_out() {
        let (_sdk, mut session) = session_with(vec![device("A1")]);

        let error = session
            .connect("B2", |_event| Ok(()))
            .await
            .expect_err("unknown device should not be found");

        assert_matches!(
            error.downcast_ref::<CliError>(),
            Some(CliError::Timeout { waiting_for, .. }) if waiting_for == "device B2 to be found"
        );
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_command_still_disconnects_the_device() {
        let (sdk, mut session) = session_with(vec![device("A1")]);
        session
            .connect("A1", |_event| Ok(()))
            .await
            .expect("known device should connect");
        let mut seen = Vec::new();

        let error = session
            .disconnect_after(
                "A1",
                Err::<(), _>(anyhow::anyhow!("capability never became ready")),
                |event| {
                    seen.push(event.name());
                    Ok(())
                },
            )
            .await
            .expect_err("the command error is kept");

        assert_eq!("capability never became ready", error.to_string());
        assert_eq!(Some(&"DEVICE_DISCONNECTED"), seen.last());
        assert_eq!(
            1,
            sdk.count_calls(|call| matches!(call, SdkCall::Disconnect { .. }))
        );
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn on_event_errors_stop_the_wait() {
        let (_sdk, mut session) = session_with(vec![device("A1")]);
        session.handle().search_for_device();

        let error = session
            .wait_for(
                "anything",
                |_event| Err(anyhow::anyhow!("sink closed")),
                |_event| false,
            )
            .await
            .expect_err("callback error should propagate");

        assert_eq!("sink closed", error.to_string());
        session.close().await;
    }
}
