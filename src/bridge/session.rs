use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryFutureExt};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, info, info_span, instrument, trace, warn};
use uuid::Uuid;

use super::command::{BridgeCommand, BridgeHandle};
use super::event::{
    BatteryLevel, BridgeEvent, DisInformation, ExerciseEntryEvent, ExerciseRead,
    RecordStatusEvent, StreamingFeatures,
};
use super::readiness::FeatureReadiness;
use super::streams::{StreamLease, StreamSessions};
use super::{Capability, EventEmitter};
use crate::error::SdkError;
use crate::sdk::{
    ConnectionObserver, DataType, DeviceInfo, DeviceInfoObserver, ExerciseData, ExerciseEntry,
    FeaturesObserver, PowerStateObserver, RecordingInterval, SdkFeature, SdkLogger, SdkObservers,
    SdkFuture, SdkStream, SensorSdk, SensorSettings,
};

/// Device family the auto-connect search and the recording check look for.
const RECORDING_DEVICE_TYPE: &str = "H10";

/// Connection progress of the tracked strap.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Discovering,
    Connecting {
        device_id: String,
    },
    Connected {
        device_id: String,
    },
    Disconnected {
        device_id: String,
    },
}

/// Everything the bridge tracks between commands.
#[derive(Debug, Default)]
pub struct SessionState {
    connection: ConnectionState,
    readiness: FeatureReadiness,
    streams: StreamSessions,
    recording_supported: bool,
    selected_exercise: Option<ExerciseEntry>,
    fetch_in_progress: bool,
    listing_generation: u64,
    disconnect_epoch: u64,
    search: Option<DropGuard>,
    auto_connect: Option<DropGuard>,
    listing: Option<DropGuard>,
}

impl SessionState {
    #[must_use]
    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    #[must_use]
    pub fn readiness(&self) -> &FeatureReadiness {
        &self.readiness
    }

    #[must_use]
    pub fn streams(&self) -> &StreamSessions {
        &self.streams
    }

    /// Returns whether the connected strap can record exercises on-device.
    #[must_use]
    pub fn recording_supported(&self) -> bool {
        self.recording_supported
    }

    /// Returns the entry that read and remove operate on.
    #[must_use]
    pub fn selected_exercise(&self) -> Option<&ExerciseEntry> {
        self.selected_exercise.as_ref()
    }

    #[must_use]
    pub fn exercise_fetch_in_progress(&self) -> bool {
        self.fetch_in_progress
    }
}

/// Inputs consumed by the bridge loop.
#[derive(Debug)]
pub(crate) enum BridgeInput {
    Command(BridgeCommand),
    Sdk(SdkNotification),
    Completion(Completion),
}

/// SDK callbacks, re-posted onto the bridge inbox.
#[derive(Debug)]
pub(crate) enum SdkNotification {
    Connecting(DeviceInfo),
    Connected(DeviceInfo),
    Disconnected(DeviceInfo),
    BatteryLevel {
        device_id: String,
        level: u8,
    },
    DisInformation {
        device_id: String,
        uuid: Uuid,
        value: String,
    },
    PowerOn,
    PowerOff,
    FeatureReady {
        device_id: String,
        feature: SdkFeature,
    },
}

/// How a stream task finished.
#[derive(Debug)]
pub(crate) enum StreamEnd {
    Completed,
    Failed(SdkError),
    Cancelled,
}

/// Results of spawned operations that change bridge state.
#[derive(Debug)]
pub(crate) enum Completion {
    StreamEnded {
        capability: Capability,
        device_id: String,
        generation: u64,
        end: StreamEnd,
    },
    StreamTypes {
        device_id: String,
        epoch: u64,
        result: Result<BTreeSet<DataType>, SdkError>,
    },
    ExerciseListed {
        generation: u64,
        entry: ExerciseEntry,
    },
    ExerciseFetched {
        device_id: String,
        outcome: Option<Result<ExerciseData, SdkError>>,
    },
    ExerciseRemoved {
        device_id: String,
        entry: ExerciseEntry,
        result: Result<(), SdkError>,
    },
}

/// Forwards SDK callbacks into the bridge inbox.
#[derive(Debug)]
struct SdkForwarder {
    inbox: mpsc::UnboundedSender<BridgeInput>,
}

impl SdkForwarder {
    fn forward(&self, notification: SdkNotification) {
        if let Err(error) = self.inbox.send(BridgeInput::Sdk(notification)) {
            trace!(input = ?error.0, "bridge stopped; dropping SDK callback");
        }
    }
}

impl ConnectionObserver for SdkForwarder {
    fn device_connecting(&self, device: &DeviceInfo) {
        self.forward(SdkNotification::Connecting(device.clone()));
    }

    fn device_connected(&self, device: &DeviceInfo) {
        self.forward(SdkNotification::Connected(device.clone()));
    }

    fn device_disconnected(&self, device: &DeviceInfo) {
        self.forward(SdkNotification::Disconnected(device.clone()));
    }
}

impl DeviceInfoObserver for SdkForwarder {
    fn battery_level_received(&self, device_id: &str, level: u8) {
        self.forward(SdkNotification::BatteryLevel {
            device_id: device_id.to_string(),
            level,
        });
    }

    fn dis_information_received(&self, device_id: &str, uuid: Uuid, value: &str) {
        self.forward(SdkNotification::DisInformation {
            device_id: device_id.to_string(),
            uuid,
            value: value.to_string(),
        });
    }
}

impl PowerStateObserver for SdkForwarder {
    fn ble_power_on(&self) {
        self.forward(SdkNotification::PowerOn);
    }

    fn ble_power_off(&self) {
        self.forward(SdkNotification::PowerOff);
    }
}

impl FeaturesObserver for SdkForwarder {
    fn ble_sdk_feature_ready(&self, device_id: &str, feature: SdkFeature) {
        self.forward(SdkNotification::FeatureReady {
            device_id: device_id.to_string(),
            feature,
        });
    }
}

impl SdkLogger for SdkForwarder {
    fn message(&self, message: &str) {
        trace!(target: "hrstrap::sdk", message);
    }
}

/// Adapter between the sensor SDK and the host.
///
/// The bridge owns all adapter state and is driven by a single loop. Commands,
/// SDK callbacks and the results of spawned SDK operations all arrive through
/// one inbox, so state is only ever touched from [`Bridge::step`].
pub struct Bridge {
    sdk: Arc<dyn SensorSdk>,
    emitter: Arc<dyn EventEmitter>,
    state: SessionState,
    inbox_tx: mpsc::UnboundedSender<BridgeInput>,
    inbox: mpsc::UnboundedReceiver<BridgeInput>,
    shutdown: CancellationToken,
    stopped: bool,
    teardown: Option<SdkFuture<()>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Creates a bridge and registers its observers with the SDK.
    pub fn new(sdk: Arc<dyn SensorSdk>, emitter: Arc<dyn EventEmitter>) -> (Self, BridgeHandle) {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let forwarder = Arc::new(SdkForwarder {
            inbox: inbox_tx.clone(),
        });
        sdk.set_observers(SdkObservers {
            connection: forwarder.clone(),
            device_info: forwarder.clone(),
            power_state: forwarder.clone(),
            features: forwarder.clone(),
            logger: forwarder,
        });

        let handle = BridgeHandle::new(inbox_tx.clone());
        let bridge = Self {
            sdk,
            emitter,
            state: SessionState::default(),
            inbox_tx,
            inbox,
            shutdown: CancellationToken::new(),
            stopped: false,
            teardown: None,
        };
        (bridge, handle)
    }

    /// Returns another command handle for this bridge.
    #[must_use]
    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle::new(self.inbox_tx.clone())
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns whether a shutdown command has been processed.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Processes inputs until the bridge is shut down, then waits for the SDK teardown.
    pub async fn run(mut self) {
        while self.step().await {}
        self.finish_teardown().await;
        debug!("bridge loop finished");
    }

    /// Waits for one input and processes it. Returns `false` once the bridge has stopped.
    pub async fn step(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        match self.inbox.recv().await {
            Some(input) => {
                self.process(input);
                !self.stopped
            }
            None => false,
        }
    }

    /// Processes inputs until none arrives for `quiet`, or the bridge stops.
    pub async fn run_until_idle(&mut self, quiet: Duration) {
        while !self.stopped {
            match tokio::time::timeout(quiet, self.inbox.recv()).await {
                Ok(Some(input)) => self.process(input),
                Ok(None) | Err(_) => break,
            }
        }
        self.finish_teardown().await;
    }

    async fn finish_teardown(&mut self) {
        let Some(teardown) = self.teardown.take() else {
            return;
        };
        match teardown.await {
            Ok(()) => debug!("SDK teardown finished"),
            Err(error) => warn!(error = %error, "SDK teardown failed"),
        }
    }

    /// Processes one command immediately, bypassing the inbox.
    pub fn dispatch(&mut self, command: BridgeCommand) {
        self.process(BridgeInput::Command(command));
    }

    fn process(&mut self, input: BridgeInput) {
        match input {
            BridgeInput::Command(command) => self.on_command(command),
            BridgeInput::Sdk(notification) => self.on_sdk_notification(notification),
            BridgeInput::Completion(completion) => self.on_completion(completion),
        }
    }

    fn on_command(&mut self, command: BridgeCommand) {
        if self.stopped {
            debug!(?command, "bridge stopped; ignoring command");
            return;
        }
        match command {
            BridgeCommand::SearchForDevice => self.search_for_device(),
            BridgeCommand::StartAutoConnect { rssi } => self.start_auto_connect(rssi),
            BridgeCommand::Connect { device_id } => self.connect_to_device(&device_id),
            BridgeCommand::Disconnect { device_id } => self.disconnect_from_device(&device_id),
            BridgeCommand::StartStreaming {
                capability,
                device_id,
            } => self.start_streaming(capability, &device_id),
            BridgeCommand::StopStreaming {
                capability,
                device_id,
            } => self.stop_streaming(capability, &device_id),
            BridgeCommand::GetRecordingStatus { device_id } => self.get_recording_status(&device_id),
            BridgeCommand::StartRecording {
                device_id,
                exercise_id,
                sample_type,
            } => {
                let future = self.sdk.start_recording(
                    &device_id,
                    &exercise_id,
                    RecordingInterval::Interval1s,
                    sample_type,
                );
                self.spawn_logged("start_recording", device_id, future);
            }
            BridgeCommand::StopRecording { device_id } => {
                let future = self.sdk.stop_recording(&device_id);
                self.spawn_logged("stop_recording", device_id, future);
            }
            BridgeCommand::ListExercises { device_id } => self.list_exercises(&device_id),
            BridgeCommand::ReadExercise { device_id } => self.read_exercise(&device_id),
            BridgeCommand::RemoveExercise { device_id } => self.remove_exercise(&device_id),
            BridgeCommand::ForegroundEntered => self.sdk.foreground_entered(),
            BridgeCommand::Shutdown => self.shut_down(),
        }
    }

    #[instrument(skip(self))]
    fn search_for_device(&mut self) {
        // Dropping the previous guard cancels the previous search.
        let cancel = self.shutdown.child_token();
        self.state.search = Some(cancel.clone().drop_guard());
        if matches!(
            self.state.connection,
            ConnectionState::Idle | ConnectionState::Disconnected { .. }
        ) {
            self.state.connection = ConnectionState::Discovering;
        }

        let mut devices = self.sdk.search_for_device();
        let emitter = Arc::clone(&self.emitter);
        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!("search cancelled");
                            break;
                        }
                        next = devices.next() => match next {
                            Some(Ok(device)) => emitter.emit(BridgeEvent::DeviceFound(device)),
                            Some(Err(error)) => {
                                warn!(error = %error, "device search failed");
                                break;
                            }
                            None => {
                                debug!("device search completed");
                                break;
                            }
                        },
                    }
                }
            }
            .instrument(info_span!("search")),
        );
    }

    #[instrument(skip(self))]
    fn start_auto_connect(&mut self, rssi: i16) {
        let cancel = self.shutdown.child_token();
        self.state.auto_connect = Some(cancel.clone().drop_guard());
        let future = self
            .sdk
            .start_auto_connect_to_device(rssi, RECORDING_DEVICE_TYPE);
        tokio::spawn(
            async move {
                match cancel.run_until_cancelled(future).await {
                    Some(Ok(())) => info!("auto-connect succeeded"),
                    Some(Err(error)) => warn!(error = %error, "auto-connect failed"),
                    None => debug!("auto-connect cancelled"),
                }
            }
            .instrument(info_span!("auto_connect", rssi)),
        );
    }

    #[instrument(skip(self))]
    fn connect_to_device(&mut self, device_id: &str) {
        if let Err(error) = self.sdk.connect_to_device(device_id) {
            warn!(error = %error, "connect failed");
        }
    }

    #[instrument(skip(self))]
    fn disconnect_from_device(&mut self, device_id: &str) {
        if let Err(error) = self.sdk.disconnect_from_device(device_id) {
            warn!(error = %error, "disconnect failed");
        }
    }

    #[instrument(skip(self, capability), fields(%capability))]
    fn start_streaming(&mut self, capability: Capability, device_id: &str) {
        if !self.state.readiness.is_ready(capability) {
            debug!("capability not ready; ignoring start");
            return;
        }
        let Some(lease) = self
            .state
            .streams
            .acquire(capability, device_id, &self.shutdown)
        else {
            debug!("stream already active; ignoring start");
            return;
        };

        info!("starting stream");
        let sdk = &self.sdk;
        match capability {
            Capability::Hr => {
                let stream = open_stream(sdk, capability, device_id, |sdk, id, _settings| {
                    sdk.start_hr_streaming(id)
                });
                self.spawn_stream(capability, device_id, lease, stream, BridgeEvent::from_hr);
            }
            Capability::Ecg => {
                let stream = open_stream(sdk, capability, device_id, |sdk, id, settings| {
                    sdk.start_ecg_streaming(id, settings.unwrap_or_default())
                });
                self.spawn_stream(capability, device_id, lease, stream, BridgeEvent::from_ecg);
            }
            Capability::Acc => {
                let stream = open_stream(sdk, capability, device_id, |sdk, id, settings| {
                    sdk.start_acc_streaming(id, settings.unwrap_or_default())
                });
                self.spawn_stream(capability, device_id, lease, stream, BridgeEvent::from_acc);
            }
            Capability::Ppg => {
                let stream = open_stream(sdk, capability, device_id, |sdk, id, settings| {
                    sdk.start_ppg_streaming(id, settings.unwrap_or_default())
                });
                self.spawn_stream(capability, device_id, lease, stream, BridgeEvent::from_ppg);
            }
            Capability::Ppi => {
                let stream = open_stream(sdk, capability, device_id, |sdk, id, _settings| {
                    sdk.start_ppi_streaming(id)
                });
                self.spawn_stream(capability, device_id, lease, stream, BridgeEvent::from_ppi);
            }
        }
    }

    #[instrument(skip(self, capability), fields(%capability))]
    fn stop_streaming(&mut self, capability: Capability, device_id: &str) {
        if !self.state.readiness.is_ready(capability) {
            debug!("capability not ready; ignoring stop");
            return;
        }
        if self.state.streams.release(capability) {
            info!("stream stopped");
        } else {
            debug!("no active stream; ignoring stop");
        }
    }

    fn spawn_stream<T>(
        &self,
        capability: Capability,
        device_id: &str,
        lease: StreamLease,
        stream: SdkStream<T>,
        to_event: fn(&str, T) -> Option<BridgeEvent>,
    ) where
        T: Send + 'static,
    {
        let emitter = Arc::clone(&self.emitter);
        let inbox = self.inbox_tx.clone();
        let device_id = device_id.to_string();
        let span = info_span!("stream", %capability, %device_id, generation = lease.generation);
        tokio::spawn(
            async move {
                let end =
                    drive_stream(&device_id, stream, &lease.cancel, emitter.as_ref(), to_event)
                        .await;
                post(
                    &inbox,
                    Completion::StreamEnded {
                        capability,
                        device_id,
                        generation: lease.generation,
                        end,
                    },
                );
            }
            .instrument(span),
        );
    }

    #[instrument(skip(self))]
    fn get_recording_status(&self, device_id: &str) {
        let future = self.sdk.request_recording_status(device_id);
        let emitter = Arc::clone(&self.emitter);
        let cancel = self.shutdown.child_token();
        tokio::spawn(
            async move {
                match cancel.run_until_cancelled(future).await {
                    Some(Ok(status)) => {
                        emitter.emit(BridgeEvent::RecordStatus(RecordStatusEvent::from(status)));
                    }
                    Some(Err(error)) => warn!(error = %error, "recording status request failed"),
                    None => debug!("recording status request cancelled"),
                }
            }
            .instrument(info_span!("recording_status")),
        );
    }

    fn spawn_logged(&self, operation: &'static str, device_id: String, future: SdkFuture<()>) {
        let cancel = self.shutdown.child_token();
        tokio::spawn(
            async move {
                match cancel.run_until_cancelled(future).await {
                    Some(Ok(())) => info!("{operation} succeeded"),
                    Some(Err(error)) => warn!(error = %error, "{operation} failed"),
                    None => debug!("{operation} cancelled"),
                }
            }
            .instrument(info_span!("recording", operation, %device_id)),
        );
    }

    #[instrument(skip(self))]
    fn list_exercises(&mut self, device_id: &str) {
        self.state.selected_exercise = None;
        self.state.listing_generation += 1;
        let generation = self.state.listing_generation;
        let cancel = self.shutdown.child_token();
        self.state.listing = Some(cancel.clone().drop_guard());

        let mut entries = self.sdk.list_exercises(device_id);
        let inbox = self.inbox_tx.clone();
        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!("exercise listing superseded");
                            break;
                        }
                        next = entries.next() => match next {
                            Some(Ok(entry)) => {
                                post(&inbox, Completion::ExerciseListed { generation, entry });
                            }
                            Some(Err(error)) => {
                                warn!(error = %error, "listing exercises failed");
                                break;
                            }
                            None => {
                                debug!("exercise listing completed");
                                break;
                            }
                        },
                    }
                }
            }
            .instrument(info_span!("list_exercises", generation)),
        );
    }

    #[instrument(skip(self))]
    fn read_exercise(&mut self, device_id: &str) {
        let Some(entry) = self.state.selected_exercise.clone() else {
            info!("no exercise selected; list exercises first");
            return;
        };
        if self.state.fetch_in_progress {
            debug!("exercise fetch already in progress; ignoring read");
            return;
        }
        self.state.fetch_in_progress = true;

        let future = self.sdk.fetch_exercise(device_id, &entry);
        let inbox = self.inbox_tx.clone();
        let cancel = self.shutdown.child_token();
        let device_id = device_id.to_string();
        tokio::spawn(
            async move {
                let outcome = cancel.run_until_cancelled(future).await;
                post(&inbox, Completion::ExerciseFetched { device_id, outcome });
            }
            .instrument(info_span!("fetch_exercise", entry_id = %entry.entry_id)),
        );
    }

    #[instrument(skip(self))]
    fn remove_exercise(&mut self, device_id: &str) {
        let Some(entry) = self.state.selected_exercise.clone() else {
            info!("no exercise selected; list exercises first");
            return;
        };

        let future = self.sdk.remove_exercise(device_id, &entry);
        let inbox = self.inbox_tx.clone();
        let cancel = self.shutdown.child_token();
        let device_id = device_id.to_string();
        tokio::spawn(
            async move {
                if let Some(result) = cancel.run_until_cancelled(future).await {
                    post(
                        &inbox,
                        Completion::ExerciseRemoved {
                            device_id,
                            entry,
                            result,
                        },
                    );
                }
            }
            .instrument(info_span!("remove_exercise")),
        );
    }

    #[instrument(skip(self))]
    fn shut_down(&mut self) {
        info!("shutting down bridge");
        self.state.streams.release_all();
        self.state.search = None;
        self.state.auto_connect = None;
        self.state.listing = None;
        self.shutdown.cancel();
        self.teardown = Some(self.sdk.shut_down());
        self.stopped = true;
    }

    fn on_sdk_notification(&mut self, notification: SdkNotification) {
        match notification {
            SdkNotification::Connecting(device) => {
                info!(device_id = device.device_id(), "device connecting");
                self.state.connection = ConnectionState::Connecting {
                    device_id: device.device_id().to_string(),
                };
                self.emitter.emit(BridgeEvent::DeviceConnecting(device));
            }
            SdkNotification::Connected(device) => self.on_device_connected(device),
            SdkNotification::Disconnected(device) => self.on_device_disconnected(device),
            SdkNotification::BatteryLevel { device_id, level } => {
                self.emitter
                    .emit(BridgeEvent::BatteryLevelReceived(BatteryLevel {
                        identifier: device_id,
                        battery_level: level,
                    }));
            }
            SdkNotification::DisInformation {
                device_id,
                uuid,
                value,
            } => {
                self.emitter
                    .emit(BridgeEvent::DisInformationReceived(DisInformation {
                        identifier: device_id,
                        uuid: uuid.to_string(),
                        value,
                    }));
            }
            SdkNotification::PowerOn => {
                info!("BLE powered on");
                self.emitter.emit(BridgeEvent::BlePowerOn);
            }
            SdkNotification::PowerOff => {
                info!("BLE powered off");
                self.emitter.emit(BridgeEvent::BlePowerOff);
            }
            SdkNotification::FeatureReady { device_id, feature } => {
                self.on_sdk_feature_ready(&device_id, feature);
            }
        }
    }

    #[instrument(skip_all, fields(device_id = device.device_id()))]
    fn on_device_connected(&mut self, device: DeviceInfo) {
        info!(name = device.name(), "device connected");
        let device_id = device.device_id().to_string();
        self.state.connection = ConnectionState::Connected {
            device_id: device_id.clone(),
        };
        let supports_recording = device.name().contains(RECORDING_DEVICE_TYPE);
        self.emitter.emit(BridgeEvent::DeviceConnected(device));

        if supports_recording {
            self.state.recording_supported = true;
            self.get_recording_status(&device_id);
        }
    }

    #[instrument(skip_all, fields(device_id = device.device_id()))]
    fn on_device_disconnected(&mut self, device: DeviceInfo) {
        info!("device disconnected");
        let device_id = device.device_id().to_string();
        self.state.connection = ConnectionState::Disconnected {
            device_id: device_id.clone(),
        };
        self.state.disconnect_epoch += 1;
        self.state.readiness.clear();
        self.state.recording_supported = false;
        self.state.selected_exercise = None;
        self.state.listing = None;
        self.state.listing_generation += 1;

        let released = self.state.streams.release_device(&device_id);
        if !released.is_empty() {
            debug!(?released, "released streams of disconnected device");
        }
        self.emitter.emit(BridgeEvent::DeviceDisconnected(device));
    }

    #[instrument(skip(self, feature), fields(%feature))]
    fn on_sdk_feature_ready(&mut self, device_id: &str, feature: SdkFeature) {
        match feature {
            SdkFeature::Hr => self.on_feature_available(Capability::Hr, device_id),
            SdkFeature::OnlineStreaming => {
                let future = self.sdk.available_online_stream_data_types(device_id);
                let inbox = self.inbox_tx.clone();
                let cancel = self.shutdown.child_token();
                let device_id = device_id.to_string();
                let epoch = self.state.disconnect_epoch;
                tokio::spawn(
                    async move {
                        if let Some(result) = cancel.run_until_cancelled(future).await {
                            post(
                                &inbox,
                                Completion::StreamTypes {
                                    device_id,
                                    epoch,
                                    result,
                                },
                            );
                        }
                    }
                    .instrument(info_span!("stream_types")),
                );
            }
            _ => debug!("feature ready"),
        }
    }

    fn on_feature_available(&mut self, capability: Capability, device_id: &str) {
        if self.state.readiness.mark_ready(capability) {
            info!(%capability, device_id, "capability ready");
        }
        self.emitter.emit(BridgeEvent::FeatureReady {
            capability,
            device_id: device_id.to_string(),
        });
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::StreamEnded {
                capability,
                device_id,
                generation,
                end,
            } => {
                match &end {
                    StreamEnd::Completed => info!(%capability, %device_id, "stream completed"),
                    StreamEnd::Failed(error) => {
                        warn!(%capability, %device_id, error = %error, "stream failed");
                    }
                    StreamEnd::Cancelled => debug!(%capability, %device_id, "stream cancelled"),
                }
                self.state.streams.release_if_current(capability, generation);
            }
            Completion::StreamTypes {
                device_id,
                epoch,
                result,
            } => self.on_stream_types(&device_id, epoch, result),
            Completion::ExerciseListed { generation, entry } => {
                if generation != self.state.listing_generation {
                    debug!(entry_id = %entry.entry_id, "dropping entry from superseded listing");
                    return;
                }
                self.emitter
                    .emit(BridgeEvent::ExerciseEntry(ExerciseEntryEvent::from(&entry)));
                self.state.selected_exercise = Some(entry);
            }
            Completion::ExerciseFetched { device_id, outcome } => {
                self.state.fetch_in_progress = false;
                match outcome {
                    Some(Ok(data)) => {
                        info!(%device_id, samples = data.samples.len(), "exercise fetched");
                        self.emitter
                            .emit(BridgeEvent::ReadExercise(ExerciseRead::from(data)));
                    }
                    Some(Err(error)) => {
                        warn!(%device_id, error = %error, "fetching exercise failed");
                    }
                    None => debug!(%device_id, "exercise fetch cancelled"),
                }
            }
            Completion::ExerciseRemoved {
                device_id,
                entry,
                result,
            } => match result {
                Ok(()) => {
                    info!(%device_id, entry_id = %entry.entry_id, "exercise removed");
                    if self.state.selected_exercise.as_ref() == Some(&entry) {
                        self.state.selected_exercise = None;
                    }
                }
                Err(error) => warn!(%device_id, error = %error, "removing exercise failed"),
            },
        }
    }

    #[instrument(skip(self, result))]
    fn on_stream_types(
        &mut self,
        device_id: &str,
        epoch: u64,
        result: Result<BTreeSet<DataType>, SdkError>,
    ) {
        if epoch != self.state.disconnect_epoch {
            debug!("device disconnected before stream types arrived; dropping result");
            return;
        }
        let data_types = match result {
            Ok(data_types) => data_types,
            Err(error) => {
                warn!(error = %error, "querying online stream types failed");
                return;
            }
        };

        self.emitter
            .emit(BridgeEvent::StreamingFeaturesReady(StreamingFeatures {
                identifier: device_id.to_string(),
                streaming_features: data_types.iter().copied().collect(),
            }));
        for capability in data_types.into_iter().filter_map(Capability::from_data_type) {
            self.on_feature_available(capability, device_id);
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Starts one SDK stream. `settings` is `None` unless the capability negotiates settings.
type StartStream<T> = fn(&dyn SensorSdk, &str, Option<SensorSettings>) -> SdkStream<T>;

/// Opens the capability's stream, negotiating settings first when the capability needs them.
fn open_stream<T>(
    sdk: &Arc<dyn SensorSdk>,
    capability: Capability,
    device_id: &str,
    start: StartStream<T>,
) -> SdkStream<T>
where
    T: Send + 'static,
{
    if capability.negotiates_settings() {
        negotiated(sdk, device_id, capability.data_type(), start)
    } else {
        start(sdk.as_ref(), device_id, None)
    }
}

/// Requests the device's stream settings, then starts the stream with the largest of each.
fn negotiated<T>(
    sdk: &Arc<dyn SensorSdk>,
    device_id: &str,
    data_type: DataType,
    start: StartStream<T>,
) -> SdkStream<T>
where
    T: Send + 'static,
{
    let starter = Arc::clone(sdk);
    let device_id_for_start = device_id.to_string();
    sdk.request_stream_settings(device_id, data_type)
        .map_ok(move |settings| {
            let settings = settings.max_settings();
            debug!(%data_type, ?settings, "starting stream with negotiated settings");
            start(starter.as_ref(), &device_id_for_start, Some(settings))
        })
        .try_flatten_stream()
        .boxed()
}

async fn drive_stream<T>(
    device_id: &str,
    mut stream: SdkStream<T>,
    cancel: &CancellationToken,
    emitter: &dyn EventEmitter,
    to_event: fn(&str, T) -> Option<BridgeEvent>,
) -> StreamEnd {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return StreamEnd::Cancelled,
            next = stream.next() => match next {
                Some(Ok(batch)) => {
                    if let Some(event) = to_event(device_id, batch) {
                        emitter.emit(event);
                    }
                }
                Some(Err(error)) => return StreamEnd::Failed(error),
                None => return StreamEnd::Completed,
            },
        }
    }
}

fn post(inbox: &mpsc::UnboundedSender<BridgeInput>, completion: Completion) {
    if let Err(error) = inbox.send(BridgeInput::Completion(completion)) {
        trace!(input = ?error.0, "bridge stopped; dropping completion");
    }
}
