//! Boundary with the vendor sensor SDK.
//!
//! The SDK owns BLE transport, framing and sensor decoding. Operations return
//! cold futures and streams: nothing happens until the bridge polls them, and
//! dropping them releases the underlying subscription.

mod btleplug_backend;
mod fake_backend;
mod gatt;
mod heart_rate;
mod model;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::SdkError;

pub(crate) use self::btleplug_backend::GattSdk;
pub use self::fake_backend::{FailPoint, FakeSdk, FakeSdkConfig, SdkCall};
pub(crate) use self::fake_backend::ScanFixture;
pub use self::heart_rate::{HeartRateDecodeError, decode_heart_rate_measurement};
pub use self::model::{
    AccData, AccSample, DataType, DeviceInfo, EcgData, EcgSample, ExerciseData, ExerciseEntry,
    HrData, HrSample, PpgData, PpgSample, PpiData, PpiSample, RecordingInterval,
    RecordingStatus, SampleType, SdkFeature, SensorSettings, SettingType,
};

/// A single-result SDK operation.
pub type SdkFuture<T> = BoxFuture<'static, Result<T, SdkError>>;

/// A multi-result SDK operation; an `Err` item terminates the sequence.
pub type SdkStream<T> = BoxStream<'static, Result<T, SdkError>>;

/// Connection-state callbacks.
pub trait ConnectionObserver: Send + Sync {
    fn device_connecting(&self, device: &DeviceInfo);
    fn device_connected(&self, device: &DeviceInfo);
    fn device_disconnected(&self, device: &DeviceInfo);
}

/// Battery and Device Information Service callbacks.
pub trait DeviceInfoObserver: Send + Sync {
    fn battery_level_received(&self, device_id: &str, level: u8);
    fn dis_information_received(&self, device_id: &str, uuid: Uuid, value: &str);
}

/// Host Bluetooth radio state callbacks.
pub trait PowerStateObserver: Send + Sync {
    fn ble_power_on(&self);
    fn ble_power_off(&self);
}

/// Feature readiness callbacks.
pub trait FeaturesObserver: Send + Sync {
    fn ble_sdk_feature_ready(&self, device_id: &str, feature: SdkFeature);
}

/// Receives the SDK's internal log lines.
pub trait SdkLogger: Send + Sync {
    fn message(&self, message: &str);
}

/// The callback roles registered with an SDK instance.
#[derive(Clone)]
pub struct SdkObservers {
    pub connection: Arc<dyn ConnectionObserver>,
    pub device_info: Arc<dyn DeviceInfoObserver>,
    pub power_state: Arc<dyn PowerStateObserver>,
    pub features: Arc<dyn FeaturesObserver>,
    pub logger: Arc<dyn SdkLogger>,
}

impl fmt::Debug for SdkObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkObservers").finish_non_exhaustive()
    }
}

/// Operations offered by the vendor SDK.
pub trait SensorSdk: Send + Sync {
    /// Registers the callback roles; replaces any earlier registration.
    fn set_observers(&self, observers: SdkObservers);

    /// Scans for straps until the stream is dropped.
    fn search_for_device(&self) -> SdkStream<DeviceInfo>;

    /// Connects to the first device of `device_type` seen at or above `rssi`.
    fn start_auto_connect_to_device(&self, rssi: i16, device_type: &str) -> SdkFuture<()>;

    /// Starts connecting; progress is reported through [`ConnectionObserver`].
    ///
    /// # Errors
    ///
    /// Returns an error when the connection attempt cannot be started.
    fn connect_to_device(&self, device_id: &str) -> Result<(), SdkError>;

    /// Starts disconnecting; completion is reported through [`ConnectionObserver`].
    ///
    /// # Errors
    ///
    /// Returns an error when the device is unknown to the SDK.
    fn disconnect_from_device(&self, device_id: &str) -> Result<(), SdkError>;

    fn available_online_stream_data_types(&self, device_id: &str)
    -> SdkFuture<BTreeSet<DataType>>;

    fn request_stream_settings(&self, device_id: &str, data_type: DataType)
    -> SdkFuture<SensorSettings>;

    fn start_hr_streaming(&self, device_id: &str) -> SdkStream<HrData>;

    fn start_ecg_streaming(&self, device_id: &str, settings: SensorSettings)
    -> SdkStream<EcgData>;

    fn start_acc_streaming(&self, device_id: &str, settings: SensorSettings)
    -> SdkStream<AccData>;

    fn start_ppg_streaming(&self, device_id: &str, settings: SensorSettings)
    -> SdkStream<PpgData>;

    fn start_ppi_streaming(&self, device_id: &str) -> SdkStream<PpiData>;

    fn request_recording_status(&self, device_id: &str) -> SdkFuture<RecordingStatus>;

    fn start_recording(
        &self,
        device_id: &str,
        exercise_id: &str,
        interval: RecordingInterval,
        sample_type: SampleType,
    ) -> SdkFuture<()>;

    fn stop_recording(&self, device_id: &str) -> SdkFuture<()>;

    fn list_exercises(&self, device_id: &str) -> SdkStream<ExerciseEntry>;

    fn fetch_exercise(&self, device_id: &str, entry: &ExerciseEntry) -> SdkFuture<ExerciseData>;

    fn remove_exercise(&self, device_id: &str, entry: &ExerciseEntry) -> SdkFuture<()>;

    /// Notifies the SDK that the host application returned to the foreground.
    fn foreground_entered(&self);

    /// Releases SDK resources. The returned future disconnects every device.
    fn shut_down(&self) -> SdkFuture<()>;
}
