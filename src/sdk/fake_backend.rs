use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bon::Builder;
use futures::{FutureExt, StreamExt, stream};
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::wrappers::{IntervalStream, UnboundedReceiverStream};
use tracing::{debug, info, instrument};

use super::model::{
    AccData, AccSample, DataType, DeviceInfo, EcgData, EcgSample, ExerciseData, ExerciseEntry,
    HrData, HrSample, PpgData, PpgSample, PpiData, PpiSample, RecordingInterval,
    RecordingStatus, SampleType, SdkFeature, SensorSettings, SettingType,
};
use super::{SdkFuture, SdkObservers, SdkStream, SensorSdk, gatt};
use crate::error::{FixtureError, SdkError};

/// Parsed fake scan fixture records: `device_id|address|name|rssi;...`.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct ScanFixture {
    devices: Vec<DeviceInfo>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// Settings for constructing a fake SDK.
#[derive(Debug, Clone, Builder)]
pub struct FakeSdkConfig {
    /// Devices reported by search, in order.
    #[builder(default)]
    devices: Vec<DeviceInfo>,
    /// Features reported ready after a device connects.
    #[builder(default = vec![SdkFeature::Hr, SdkFeature::OnlineStreaming])]
    features: Vec<SdkFeature>,
    /// Data types reported by the online streaming feature.
    #[builder(default = default_stream_types())]
    stream_types: BTreeSet<DataType>,
    /// Settings offered for every negotiated stream.
    #[builder(default = default_settings())]
    settings: SensorSettings,
    /// Battery level reported after a device connects.
    battery_level: Option<u8>,
    #[builder(default)]
    recording_status: RecordingStatus,
    /// Exercises stored on the device.
    #[builder(default)]
    exercises: Vec<ExerciseEntry>,
    #[builder(default = default_exercise_data())]
    exercise_data: ExerciseData,
    /// When set, streams produce synthetic batches at this interval instead of
    /// waiting for batches pushed through [`FakeSdk::emit_hr`] and friends.
    synthetic_interval: Option<Duration>,
    #[builder(default)]
    fetch_delay: Duration,
}

impl FakeSdkConfig {
    /// Builds a config around the devices from a scan fixture.
    pub(crate) fn from_fixture(fixture: ScanFixture, synthetic_interval: Duration) -> Self {
        Self::builder()
            .devices(fixture.into())
            .battery_level(87)
            .exercises(default_exercises())
            .synthetic_interval(synthetic_interval)
            .build()
    }
}

/// One SDK call observed by the fake.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SdkCall {
    SetObservers,
    SearchForDevice,
    StartAutoConnect {
        rssi: i16,
        device_type: String,
    },
    Connect {
        device_id: String,
    },
    Disconnect {
        device_id: String,
    },
    AvailableStreamTypes {
        device_id: String,
    },
    RequestStreamSettings {
        device_id: String,
        data_type: DataType,
    },
    StartStreaming {
        device_id: String,
        data_type: DataType,
        settings: Option<SensorSettings>,
    },
    RequestRecordingStatus {
        device_id: String,
    },
    StartRecording {
        device_id: String,
        exercise_id: String,
        interval: RecordingInterval,
        sample_type: SampleType,
    },
    StopRecording {
        device_id: String,
    },
    ListExercises {
        device_id: String,
    },
    FetchExercise {
        device_id: String,
        entry_id: String,
    },
    RemoveExercise {
        device_id: String,
        entry_id: String,
    },
    ForegroundEntered,
    ShutDown,
}

/// Operations whose next invocation can be made to fail.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum FailPoint {
    Connect,
    StreamTypes,
    StreamSettings,
    FetchExercise,
}

type Feed<T> = mpsc::UnboundedSender<Result<T, SdkError>>;

#[derive(Debug, Default)]
struct LiveFeeds {
    hr: Option<Feed<HrData>>,
    ecg: Option<Feed<EcgData>>,
    acc: Option<Feed<AccData>>,
    ppg: Option<Feed<PpgData>>,
    ppi: Option<Feed<PpiData>>,
}

#[derive(Debug)]
struct FakeState {
    config: FakeSdkConfig,
    observers: Option<SdkObservers>,
    connected: BTreeMap<String, DeviceInfo>,
    calls: Vec<SdkCall>,
    feeds: LiveFeeds,
    failures: BTreeMap<FailPoint, String>,
}

/// Scripted SDK used in tests and non-hardware environments.
///
/// Every operation is recorded when it is invoked, before its future or stream
/// is polled. Callbacks are delivered synchronously from the invoking call.
#[derive(Debug, Clone)]
pub struct FakeSdk {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSdk {
    /// Creates a fake SDK from explicit settings.
    #[must_use]
    pub fn new(config: FakeSdkConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                config,
                observers: None,
                connected: BTreeMap::new(),
                calls: Vec::new(),
                feeds: LiveFeeds::default(),
                failures: BTreeMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: SdkCall) {
        debug!(?call, "fake SDK call");
        self.lock().calls.push(call);
    }

    fn observers(&self) -> Option<SdkObservers> {
        self.lock().observers.clone()
    }

    /// Returns every call observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<SdkCall> {
        self.lock().calls.clone()
    }

    /// Counts observed calls matching a predicate.
    pub fn count_calls(&self, predicate: impl Fn(&SdkCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Returns the exercises currently stored on the fake device.
    #[must_use]
    pub fn exercises(&self) -> Vec<ExerciseEntry> {
        self.lock().config.exercises.clone()
    }

    /// Returns the ids of devices with an open link.
    #[must_use]
    pub fn connected_devices(&self) -> Vec<String> {
        self.lock().connected.keys().cloned().collect()
    }

    /// Replaces the exercises stored on the fake device.
    pub fn set_exercises(&self, exercises: Vec<ExerciseEntry>) {
        self.lock().config.exercises = exercises;
    }

    /// Makes the next call at `point` fail with a transport error.
    pub fn fail_next(&self, point: FailPoint, message: impl Into<String>) {
        self.lock().failures.insert(point, message.into());
    }

    fn take_failure(&self, point: FailPoint) -> Option<SdkError> {
        self.lock()
            .failures
            .remove(&point)
            .map(|message| SdkError::Transport { message })
    }

    /// Reports a feature as ready for a device.
    pub fn report_feature(&self, device_id: &str, feature: SdkFeature) {
        if let Some(observers) = self.observers() {
            observers.features.ble_sdk_feature_ready(device_id, feature);
        }
    }

    /// Reports a change of the host Bluetooth radio state.
    pub fn report_power(&self, powered_on: bool) {
        if let Some(observers) = self.observers() {
            if powered_on {
                observers.power_state.ble_power_on();
            } else {
                observers.power_state.ble_power_off();
            }
        }
    }

    /// Reports a link loss for a connected device.
    pub fn report_link_lost(&self, device_id: &str) {
        let device = self.lock().connected.remove(device_id);
        if let (Some(device), Some(observers)) = (device, self.observers()) {
            observers.connection.device_disconnected(&device);
        }
    }

    /// Pushes one HR batch into the live HR stream. Returns `false` when no stream is live.
    pub fn emit_hr(&self, data: HrData) -> bool {
        push(&self.lock().feeds.hr, Ok(data))
    }

    pub fn emit_ecg(&self, data: EcgData) -> bool {
        push(&self.lock().feeds.ecg, Ok(data))
    }

    pub fn emit_acc(&self, data: AccData) -> bool {
        push(&self.lock().feeds.acc, Ok(data))
    }

    pub fn emit_ppg(&self, data: PpgData) -> bool {
        push(&self.lock().feeds.ppg, Ok(data))
    }

    pub fn emit_ppi(&self, data: PpiData) -> bool {
        push(&self.lock().feeds.ppi, Ok(data))
    }

    /// Terminates a live stream with an error.
    pub fn fail_stream(&self, data_type: DataType, message: &str) -> bool {
        let error = || SdkError::Transport {
            message: message.to_string(),
        };
        let mut state = self.lock();
        let feeds = &mut state.feeds;
        match data_type {
            DataType::Hr => push(&feeds.hr.take(), Err(error())),
            DataType::Ecg => push(&feeds.ecg.take(), Err(error())),
            DataType::Acc => push(&feeds.acc.take(), Err(error())),
            DataType::Ppg => push(&feeds.ppg.take(), Err(error())),
            DataType::Ppi => push(&feeds.ppi.take(), Err(error())),
            DataType::Gyro | DataType::Magnetometer => false,
        }
    }

    /// Ends a live stream normally.
    pub fn complete_stream(&self, data_type: DataType) -> bool {
        let mut state = self.lock();
        let feeds = &mut state.feeds;
        match data_type {
            DataType::Hr => feeds.hr.take().is_some(),
            DataType::Ecg => feeds.ecg.take().is_some(),
            DataType::Acc => feeds.acc.take().is_some(),
            DataType::Ppg => feeds.ppg.take().is_some(),
            DataType::Ppi => feeds.ppi.take().is_some(),
            DataType::Gyro | DataType::Magnetometer => false,
        }
    }

    fn remove_stored(&self, entry: &ExerciseEntry) -> Result<(), SdkError> {
        let mut state = self.lock();
        let before = state.config.exercises.len();
        state.config.exercises.retain(|stored| stored != entry);
        if state.config.exercises.len() == before {
            return Err(SdkError::ExerciseNotFound {
                entry_id: entry.entry_id.clone(),
            });
        }
        Ok(())
    }

    fn known_device(&self, device_id: &str) -> Option<DeviceInfo> {
        self.lock()
            .config
            .devices
            .iter()
            .find(|device| device.device_id() == device_id)
            .cloned()
    }

    fn open_stream<T>(
        &self,
        device_id: &str,
        data_type: DataType,
        settings: Option<SensorSettings>,
        select: fn(&mut LiveFeeds) -> &mut Option<Feed<T>>,
        synthesize: fn(u64) -> T,
    ) -> SdkStream<T>
    where
        T: Send + 'static,
    {
        self.record(SdkCall::StartStreaming {
            device_id: device_id.to_string(),
            data_type,
            settings,
        });

        let mut state = self.lock();
        if !state.connected.contains_key(device_id) {
            let device_id = device_id.to_string();
            return stream::once(async move { Err(SdkError::NotConnected { device_id }) }).boxed();
        }

        if let Some(interval) = state.config.synthetic_interval {
            return IntervalStream::new(tokio::time::interval(interval))
                .zip(stream::iter(0u64..))
                .map(move |(_, tick)| Ok(synthesize(tick)))
                .boxed();
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        *select(&mut state.feeds) = Some(sender);
        UnboundedReceiverStream::new(receiver).boxed()
    }

    fn connect(&self, device: &DeviceInfo) {
        let device_id = device.device_id();
        let Some(observers) = self.observers() else {
            self.lock()
                .connected
                .insert(device_id.to_string(), device.clone());
            return;
        };
        observers.connection.device_connecting(device);
        self.lock()
            .connected
            .insert(device_id.to_string(), device.clone());
        observers.connection.device_connected(device);

        let (features, battery_level) = {
            let state = self.lock();
            (state.config.features.clone(), state.config.battery_level)
        };
        if let Some(level) = battery_level {
            observers
                .device_info
                .battery_level_received(device_id, level);
        }
        observers
            .device_info
            .dis_information_received(device_id, gatt::MANUFACTURER_NAME, "Polar Electro Oy");
        observers
            .device_info
            .dis_information_received(device_id, gatt::FIRMWARE_REVISION, "3.1.1");
        for feature in features {
            observers.features.ble_sdk_feature_ready(device_id, feature);
        }
        observers
            .logger
            .message(&format!("fake link established with {device_id}"));
    }
}

impl SensorSdk for FakeSdk {
    fn set_observers(&self, observers: SdkObservers) {
        self.record(SdkCall::SetObservers);
        self.lock().observers = Some(observers);
    }

    fn search_for_device(&self) -> SdkStream<DeviceInfo> {
        self.record(SdkCall::SearchForDevice);
        let devices = self.lock().config.devices.clone();
        stream::iter(devices.into_iter().map(Ok)).boxed()
    }

    #[instrument(skip(self))]
    fn start_auto_connect_to_device(&self, rssi: i16, device_type: &str) -> SdkFuture<()> {
        self.record(SdkCall::StartAutoConnect {
            rssi,
            device_type: device_type.to_string(),
        });
        let candidate = self
            .lock()
            .config
            .devices
            .iter()
            .find(|device| device.name().contains(device_type) && device.rssi() >= rssi)
            .cloned();
        let sdk = self.clone();
        let device_type = device_type.to_string();
        async move {
            let device = candidate.ok_or(SdkError::DeviceNotFound {
                device_id: device_type,
            })?;
            info!(device_id = device.device_id(), "fake auto-connect");
            sdk.connect(&device);
            Ok(())
        }
        .boxed()
    }

    fn connect_to_device(&self, device_id: &str) -> Result<(), SdkError> {
        self.record(SdkCall::Connect {
            device_id: device_id.to_string(),
        });
        if let Some(error) = self.take_failure(FailPoint::Connect) {
            return Err(error);
        }
        let device = self
            .known_device(device_id)
            .ok_or_else(|| SdkError::DeviceNotFound {
                device_id: device_id.to_string(),
            })?;
        self.connect(&device);
        Ok(())
    }

    fn disconnect_from_device(&self, device_id: &str) -> Result<(), SdkError> {
        self.record(SdkCall::Disconnect {
            device_id: device_id.to_string(),
        });
        let device =
            self.lock()
                .connected
                .remove(device_id)
                .ok_or_else(|| SdkError::NotConnected {
                    device_id: device_id.to_string(),
                })?;
        self.lock().feeds = LiveFeeds::default();
        if let Some(observers) = self.observers() {
            observers.connection.device_disconnected(&device);
        }
        Ok(())
    }

    fn available_online_stream_data_types(
        &self,
        device_id: &str,
    ) -> SdkFuture<BTreeSet<DataType>> {
        self.record(SdkCall::AvailableStreamTypes {
            device_id: device_id.to_string(),
        });
        let result = match self.take_failure(FailPoint::StreamTypes) {
            Some(error) => Err(error),
            None => Ok(self.lock().config.stream_types.clone()),
        };
        async move { result }.boxed()
    }

    fn request_stream_settings(
        &self,
        device_id: &str,
        data_type: DataType,
    ) -> SdkFuture<SensorSettings> {
        self.record(SdkCall::RequestStreamSettings {
            device_id: device_id.to_string(),
            data_type,
        });
        let result = match self.take_failure(FailPoint::StreamSettings) {
            Some(error) => Err(error),
            None => Ok(self.lock().config.settings.clone()),
        };
        async move { result }.boxed()
    }

    fn start_hr_streaming(&self, device_id: &str) -> SdkStream<HrData> {
        self.open_stream(device_id, DataType::Hr, None, |feeds| &mut feeds.hr, synthetic_hr)
    }

    fn start_ecg_streaming(&self, device_id: &str, settings: SensorSettings) -> SdkStream<EcgData> {
        self.open_stream(
            device_id,
            DataType::Ecg,
            Some(settings),
            |feeds| &mut feeds.ecg,
            synthetic_ecg,
        )
    }

    fn start_acc_streaming(&self, device_id: &str, settings: SensorSettings) -> SdkStream<AccData> {
        self.open_stream(
            device_id,
            DataType::Acc,
            Some(settings),
            |feeds| &mut feeds.acc,
            synthetic_acc,
        )
    }

    fn start_ppg_streaming(&self, device_id: &str, settings: SensorSettings) -> SdkStream<PpgData> {
        self.open_stream(
            device_id,
            DataType::Ppg,
            Some(settings),
            |feeds| &mut feeds.ppg,
            synthetic_ppg,
        )
    }

    fn start_ppi_streaming(&self, device_id: &str) -> SdkStream<PpiData> {
        self.open_stream(device_id, DataType::Ppi, None, |feeds| &mut feeds.ppi, synthetic_ppi)
    }

    fn request_recording_status(&self, device_id: &str) -> SdkFuture<RecordingStatus> {
        self.record(SdkCall::RequestRecordingStatus {
            device_id: device_id.to_string(),
        });
        let status = self.lock().config.recording_status.clone();
        async move { Ok(status) }.boxed()
    }

    fn start_recording(
        &self,
        device_id: &str,
        exercise_id: &str,
        interval: RecordingInterval,
        sample_type: SampleType,
    ) -> SdkFuture<()> {
        self.record(SdkCall::StartRecording {
            device_id: device_id.to_string(),
            exercise_id: exercise_id.to_string(),
            interval,
            sample_type,
        });
        self.lock().config.recording_status = RecordingStatus {
            ongoing: true,
            entry_id: exercise_id.to_string(),
        };
        async { Ok(()) }.boxed()
    }

    fn stop_recording(&self, device_id: &str) -> SdkFuture<()> {
        self.record(SdkCall::StopRecording {
            device_id: device_id.to_string(),
        });
        self.lock().config.recording_status.ongoing = false;
        async { Ok(()) }.boxed()
    }

    fn list_exercises(&self, device_id: &str) -> SdkStream<ExerciseEntry> {
        self.record(SdkCall::ListExercises {
            device_id: device_id.to_string(),
        });
        let exercises = self.lock().config.exercises.clone();
        stream::iter(exercises.into_iter().map(Ok)).boxed()
    }

    fn fetch_exercise(&self, device_id: &str, entry: &ExerciseEntry) -> SdkFuture<ExerciseData> {
        self.record(SdkCall::FetchExercise {
            device_id: device_id.to_string(),
            entry_id: entry.entry_id.clone(),
        });
        let (delay, result) = {
            let state = self.lock();
            let result = if state.config.exercises.contains(entry) {
                Ok(state.config.exercise_data.clone())
            } else {
                Err(SdkError::ExerciseNotFound {
                    entry_id: entry.entry_id.clone(),
                })
            };
            (state.config.fetch_delay, result)
        };
        let result = match self.take_failure(FailPoint::FetchExercise) {
            Some(error) => Err(error),
            None => result,
        };
        async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            result
        }
        .boxed()
    }

    fn remove_exercise(&self, device_id: &str, entry: &ExerciseEntry) -> SdkFuture<()> {
        self.record(SdkCall::RemoveExercise {
            device_id: device_id.to_string(),
            entry_id: entry.entry_id.clone(),
        });
        let sdk = self.clone();
        let entry = entry.clone();
        async move { sdk.remove_stored(&entry) }.boxed()
    }

    fn foreground_entered(&self) {
        self.record(SdkCall::ForegroundEntered);
    }

    fn shut_down(&self) -> SdkFuture<()> {
        self.record(SdkCall::ShutDown);
        self.lock().feeds = LiveFeeds::default();
        let sdk = self.clone();
        async move {
            let links = std::mem::take(&mut sdk.lock().connected);
            debug!(links = links.len(), "fake SDK dropped its links");
            Ok(())
        }
        .boxed()
    }
}

fn push<T>(feed: &Option<Feed<T>>, item: Result<T, SdkError>) -> bool {
    feed.as_ref().is_some_and(|sender| sender.send(item).is_ok())
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<DeviceInfo>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

fn parse_scan_record(raw_record: &str) -> Result<DeviceInfo, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [device_id, address, name, rssi] = fields[..] else {
        return Err(FixtureError::InvalidRecordFieldCount);
    };
    if [device_id, address, name, rssi].iter().any(|field| field.is_empty()) {
        return Err(FixtureError::EmptyRecordField);
    }

    Ok(DeviceInfo::new(device_id, address, rssi.parse::<i16>()?, name, true))
}

fn default_stream_types() -> BTreeSet<DataType> {
    BTreeSet::from([DataType::Hr, DataType::Ecg, DataType::Acc])
}

fn default_settings() -> SensorSettings {
    SensorSettings::default()
        .with(SettingType::SampleRate, [25, 50, 100, 130, 200])
        .with(SettingType::Resolution, [14, 16])
        .with(SettingType::Range, [2, 4, 8])
}

fn default_exercise_data() -> ExerciseData {
    ExerciseData {
        interval: 1,
        samples: vec![62, 64, 67, 71, 74, 73, 70],
    }
}

fn default_exercises() -> Vec<ExerciseEntry> {
    vec![exercise_entry("E1", datetime!(2024-03-01 08:15:00 UTC))]
}

fn exercise_entry(entry_id: &str, date: OffsetDateTime) -> ExerciseEntry {
    ExerciseEntry {
        entry_id: entry_id.to_string(),
        date,
        path: format!("/U/0/{}/E/{entry_id}/00/SAMPLES.BPB", date.date()),
    }
}

fn synthetic_hr(tick: u64) -> HrData {
    let hr = 60 + u16::try_from(tick % 20).unwrap_or_default();
    HrData {
        samples: vec![HrSample {
            hr,
            rrs_ms: vec![60_000 / hr],
            rr_available: true,
            contact_status: true,
            contact_status_supported: true,
        }],
    }
}

fn synthetic_ecg(tick: u64) -> EcgData {
    EcgData {
        samples: (0..4)
            .map(|offset| {
                let index = tick * 4 + offset;
                EcgSample {
                    time_stamp: index * 7_692_307,
                    voltage: i32::try_from(index % 50).unwrap_or_default() * 20 - 500,
                }
            })
            .collect(),
    }
}

fn synthetic_acc(tick: u64) -> AccData {
    let wobble = i32::try_from(tick % 10).unwrap_or_default();
    AccData {
        samples: vec![AccSample {
            time_stamp: tick * 5_000_000,
            x: wobble,
            y: -wobble,
            z: 1000,
        }],
    }
}

fn synthetic_ppg(tick: u64) -> PpgData {
    let base = i32::try_from(tick % 100).unwrap_or_default();
    PpgData {
        samples: vec![PpgSample {
            time_stamp: tick * 7_000_000,
            channel_samples: vec![base, base + 1, base + 2, 3],
        }],
    }
}

fn synthetic_ppi(tick: u64) -> PpiData {
    PpiData {
        time_stamp: tick * 1_000_000_000,
        samples: vec![PpiSample {
            pp_in_ms: 900,
            pp_error_estimate: 10,
            hr: 66,
            blocker_bit: false,
            skin_contact_status: true,
            skin_contact_supported: true,
        }],
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("A1|AA:BB|Polar H10 A1|-43", 1)]
    #[case("A1|AA:BB|Polar H10 A1|-43;B2|CC:DD|Polar OH1 B2|-70", 2)]
    fn parse_scan_fixture_parses_records(#[case] fixture: &str, #[case] expected_count: usize) {
        let devices = parse_scan_fixture(fixture).expect("fixture should parse");
        assert_eq!(expected_count, devices.len());
    }

    #[test]
    fn parse_scan_fixture_builds_device_identity() {
        let ScanFixture { devices } = "A1|AA:BB|Polar H10 A1|-43"
            .parse()
            .expect("fixture should parse");

        assert_eq!(
            vec![DeviceInfo::new("A1", "AA:BB", -43, "Polar H10 A1", true)],
            devices
        );
    }

    #[rstest]
    #[case("", FixtureError::EmptyFixture)]
    #[case("A1|AA:BB|Polar H10", FixtureError::InvalidRecordFieldCount)]
    #[case("A1||Polar H10|-40", FixtureError::EmptyRecordField)]
    fn parse_scan_fixture_rejects_malformed_records(
        #[case] fixture: &str,
        #[case] expected: FixtureError,
    ) {
        let error = parse_scan_fixture(fixture).expect_err("fixture should be rejected");
        assert_eq!(expected.to_string(), error.to_string());
    }

    #[test]
    fn parse_scan_fixture_rejects_non_numeric_rssi() {
        assert_matches!(
            parse_scan_fixture("A1|AA:BB|Polar H10|loud"),
            Err(FixtureError::InvalidRssi(_))
        );
    }

    #[tokio::test]
    async fn calls_are_recorded_before_polling() {
        let sdk = FakeSdk::new(FakeSdkConfig::builder().build());

        let _pending = sdk.request_stream_settings("A1", DataType::Ecg);

        assert_eq!(
            vec![SdkCall::RequestStreamSettings {
                device_id: "A1".into(),
                data_type: DataType::Ecg,
            }],
            sdk.calls()
        );
    }

    #[tokio::test]
    async fn streaming_requires_a_connected_device() {
        let sdk = FakeSdk::new(FakeSdkConfig::builder().build());

        let mut stream = sdk.start_hr_streaming("A1");

        assert_matches!(
            stream.next().await,
            Some(Err(SdkError::NotConnected { device_id })) if device_id == "A1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn synthetic_streams_tick_at_the_configured_interval() {
        let sdk = FakeSdk::new(
            FakeSdkConfig::builder()
                .devices(vec![DeviceInfo::new("A1", "AA:BB", -40, "Polar H10 A1", true)])
                .synthetic_interval(Duration::from_millis(100))
                .build(),
        );
        sdk.connect_to_device("A1").expect("known device connects");

        let batches: Vec<_> = sdk.start_hr_streaming("A1").take(3).collect().await;

        assert_eq!(3, batches.len());
        assert_matches!(&batches[0], Ok(HrData { samples }) if samples[0].hr == 60);
    }

    #[tokio::test]
    async fn remove_exercise_forgets_the_entry() {
        let sdk = FakeSdk::new(
            FakeSdkConfig::builder()
                .exercises(default_exercises())
                .build(),
        );
        let entry = sdk.exercises()[0].clone();

        sdk.remove_exercise("A1", &entry)
            .await
            .expect("stored entry is removed");

        assert!(sdk.exercises().is_empty());
        assert_matches!(
            sdk.remove_exercise("A1", &entry).await,
            Err(SdkError::ExerciseNotFound { .. })
        );
    }
}
