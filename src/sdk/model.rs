use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use strum_macros::{Display, EnumIter};
use time::OffsetDateTime;

/// A strap discovered or tracked by the SDK.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    device_id: String,
    address: String,
    rssi: i16,
    name: String,
    connectable: bool,
}

impl DeviceInfo {
    /// Creates a device record.
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        address: impl Into<String>,
        rssi: i16,
        name: impl Into<String>,
        connectable: bool,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            address: address.into(),
            rssi,
            name: name.into(),
            connectable,
        }
    }

    /// Returns the SDK device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the transport-level address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the last observed signal strength.
    #[must_use]
    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    /// Returns the advertised name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the device accepts connections.
    #[must_use]
    pub fn connectable(&self) -> bool {
        self.connectable
    }
}

/// SDK-level features a connected device can report as ready.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SdkFeature {
    Hr,
    BatteryInfo,
    DeviceInfo,
    SdkMode,
    H10ExerciseRecording,
    OfflineRecording,
    OnlineStreaming,
    DeviceTimeSetup,
}

/// Online stream data types offered by a device.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Display, EnumIter, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Hr,
    Ecg,
    Acc,
    Ppg,
    Ppi,
    Gyro,
    Magnetometer,
}

/// Kinds of stream settings a device negotiates.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SettingType {
    SampleRate,
    Resolution,
    Range,
    Channels,
}

/// Stream settings offered by a device for one data type.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SensorSettings {
    values: BTreeMap<SettingType, BTreeSet<u32>>,
}

impl SensorSettings {
    /// Creates settings from the offered values per setting type.
    #[must_use]
    pub fn new(values: BTreeMap<SettingType, BTreeSet<u32>>) -> Self {
        Self { values }
    }

    /// Adds one offered setting.
    #[must_use]
    pub fn with(mut self, setting: SettingType, offered: impl IntoIterator<Item = u32>) -> Self {
        self.values.entry(setting).or_default().extend(offered);
        self
    }

    /// Returns the offered values for one setting type.
    #[must_use]
    pub fn offered(&self, setting: SettingType) -> Option<&BTreeSet<u32>> {
        self.values.get(&setting)
    }

    /// Narrows every setting type to its largest offered value.
    #[must_use]
    pub fn max_settings(&self) -> Self {
        let values = self
            .values
            .iter()
            .filter_map(|(setting, offered)| {
                offered
                    .last()
                    .map(|max| (*setting, BTreeSet::from([*max])))
            })
            .collect();
        Self { values }
    }
}

/// One heart-rate sample.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct HrSample {
    pub hr: u16,
    pub rrs_ms: Vec<u16>,
    pub rr_available: bool,
    pub contact_status: bool,
    pub contact_status_supported: bool,
}

/// A batch of heart-rate samples delivered by one SDK callback.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct HrData {
    pub samples: Vec<HrSample>,
}

/// One ECG sample in microvolts.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EcgSample {
    pub time_stamp: u64,
    pub voltage: i32,
}

/// A batch of ECG samples.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct EcgData {
    pub samples: Vec<EcgSample>,
}

/// One accelerometer sample in milli-g.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AccSample {
    pub time_stamp: u64,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A batch of accelerometer samples.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct AccData {
    pub samples: Vec<AccSample>,
}

/// One optical sample; channels are `ppg0..ppg2` followed by ambient light.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PpgSample {
    pub time_stamp: u64,
    pub channel_samples: Vec<i32>,
}

/// A batch of PPG samples.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PpgData {
    pub samples: Vec<PpgSample>,
}

/// One pulse-to-pulse interval sample.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PpiSample {
    pub pp_in_ms: u16,
    pub pp_error_estimate: u16,
    pub hr: u16,
    pub blocker_bit: bool,
    pub skin_contact_status: bool,
    pub skin_contact_supported: bool,
}

/// A batch of PPI samples.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PpiData {
    pub time_stamp: u64,
    pub samples: Vec<PpiSample>,
}

/// On-device recording state.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RecordingStatus {
    pub ongoing: bool,
    pub entry_id: String,
}

/// What an on-device exercise recording samples.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SampleType {
    Hr,
    Rr,
}

impl From<&str> for SampleType {
    /// Maps the host's selector string; only `hr` selects heart rate.
    fn from(selector: &str) -> Self {
        if selector == "hr" { Self::Hr } else { Self::Rr }
    }
}

/// Sampling interval of an on-device recording.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum RecordingInterval {
    #[strum(serialize = "1s")]
    Interval1s,
    #[strum(serialize = "5s")]
    Interval5s,
}

/// A stored exercise on the device.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExerciseEntry {
    pub entry_id: String,
    pub date: OffsetDateTime,
    pub path: String,
}

/// Samples fetched from a stored exercise.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ExerciseData {
    pub interval: u32,
    pub samples: Vec<u32>,
}
