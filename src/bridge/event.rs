use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::Capability;
use crate::sdk::{
    AccData, DataType, DeviceInfo, EcgData, ExerciseData, ExerciseEntry, HrData, PpgData,
    PpiData, PpiSample, RecordingStatus,
};

/// Receives every event the bridge forwards to the host.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: BridgeEvent);
}

impl EventEmitter for mpsc::UnboundedSender<BridgeEvent> {
    fn emit(&self, event: BridgeEvent) {
        if let Err(error) = self.send(event) {
            trace!(event = error.0.name(), "no active listener; dropping event");
        }
    }
}

/// A named event forwarded to the host, serialised as `{"event": NAME, "payload": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    DeviceFound(DeviceInfo),
    DeviceConnecting(DeviceInfo),
    DeviceConnected(DeviceInfo),
    DeviceDisconnected(DeviceInfo),
    BatteryLevelReceived(BatteryLevel),
    DisInformationReceived(DisInformation),
    BlePowerOn,
    BlePowerOff,
    FeatureReady {
        capability: Capability,
        device_id: String,
    },
    StreamingFeaturesReady(StreamingFeatures),
    HrData(HrEvent),
    EcgData(SampleBatch<EcgPoint>),
    AccData(SampleBatch<AccPoint>),
    PpgData(SampleBatch<PpgPoint>),
    PpiData(PpiEvent),
    RecordStatus(RecordStatusEvent),
    ExerciseEntry(ExerciseEntryEvent),
    ReadExercise(ExerciseRead),
}

impl BridgeEvent {
    /// Returns the host-facing event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceFound(_) => "DEVICE_FOUND",
            Self::DeviceConnecting(_) => "DEVICE_CONNECTING",
            Self::DeviceConnected(_) => "DEVICE_CONNECTED",
            Self::DeviceDisconnected(_) => "DEVICE_DISCONNECTED",
            Self::BatteryLevelReceived(_) => "BATTERY_LEVEL_RECEIVED",
            Self::DisInformationReceived(_) => "DIS_INFORMATION_RECEIVED",
            Self::BlePowerOn => "BLE_POWER_ON",
            Self::BlePowerOff => "BLE_POWER_OFF",
            Self::FeatureReady { capability, .. } => match capability {
                Capability::Hr => "HR_FEATURE_READY",
                Capability::Ecg => "ECG_FEATURE_READY",
                Capability::Acc => "ACC_FEATURE_READY",
                Capability::Ppg => "OHR_PPG_FEATURE_READY",
                Capability::Ppi => "OHR_PPI_FEATURE_READY",
            },
            Self::StreamingFeaturesReady(_) => "STREAMING_FEATURES_READY",
            Self::HrData(_) => "HR_DATA",
            Self::EcgData(_) => "ECG_DATA",
            Self::AccData(_) => "ACC_DATA",
            Self::PpgData(_) => "PPG_DATA",
            Self::PpiData(_) => "PPI_DATA",
            Self::RecordStatus(_) => "RECORD_STATUS",
            Self::ExerciseEntry(_) => "EXERCISE_ENTRY",
            Self::ReadExercise(_) => "READ_EXERCISE",
        }
    }

    /// Returns the device the event concerns, when the payload carries one.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::DeviceFound(device)
            | Self::DeviceConnecting(device)
            | Self::DeviceConnected(device)
            | Self::DeviceDisconnected(device) => Some(device.device_id()),
            Self::BatteryLevelReceived(battery) => Some(&battery.identifier),
            Self::DisInformationReceived(info) => Some(&info.identifier),
            Self::FeatureReady { device_id, .. } => Some(device_id),
            Self::StreamingFeaturesReady(features) => Some(&features.identifier),
            Self::HrData(event) => Some(&event.id),
            Self::EcgData(batch) => Some(&batch.id),
            Self::AccData(batch) => Some(&batch.id),
            Self::PpgData(batch) => Some(&batch.id),
            Self::PpiData(event) => Some(&event.id),
            Self::BlePowerOn
            | Self::BlePowerOff
            | Self::RecordStatus(_)
            | Self::ExerciseEntry(_)
            | Self::ReadExercise(_) => None,
        }
    }

    /// Maps one HR batch; only the first sample is forwarded.
    pub(crate) fn from_hr(device_id: &str, data: HrData) -> Option<Self> {
        let Some(sample) = data.samples.into_iter().next() else {
            debug!(device_id, "HR batch carried no samples");
            return None;
        };
        Some(Self::HrData(HrEvent {
            id: device_id.to_string(),
            hr: sample.hr,
            rrs_ms: sample.rrs_ms,
            rr_available: sample.rr_available,
            contact_status: sample.contact_status,
            contact_status_supported: sample.contact_status_supported,
        }))
    }

    pub(crate) fn from_ecg(device_id: &str, data: EcgData) -> Option<Self> {
        let samples = data
            .samples
            .into_iter()
            .map(|sample| EcgPoint {
                voltage: sample.voltage,
                time_stamp: sample.time_stamp,
            })
            .collect();
        Some(Self::EcgData(SampleBatch::new(device_id, samples)))
    }

    pub(crate) fn from_acc(device_id: &str, data: AccData) -> Option<Self> {
        let samples = data
            .samples
            .into_iter()
            .map(|sample| AccPoint {
                x: sample.x,
                y: sample.y,
                z: sample.z,
                time_stamp: sample.time_stamp,
            })
            .collect();
        Some(Self::AccData(SampleBatch::new(device_id, samples)))
    }

    /// Maps one PPG batch; samples with fewer than four channels are dropped.
    pub(crate) fn from_ppg(device_id: &str, data: PpgData) -> Option<Self> {
        let samples = data
            .samples
            .into_iter()
            .filter_map(|sample| match sample.channel_samples[..] {
                [ppg0, ppg1, ppg2, ambient, ..] => Some(PpgPoint {
                    ppg0,
                    ppg1,
                    ppg2,
                    ambient,
                }),
                _ => {
                    debug!(
                        device_id,
                        channels = sample.channel_samples.len(),
                        "skipping PPG sample without four channels"
                    );
                    None
                }
            })
            .collect();
        Some(Self::PpgData(SampleBatch::new(device_id, samples)))
    }

    pub(crate) fn from_ppi(device_id: &str, data: PpiData) -> Option<Self> {
        Some(Self::PpiData(PpiEvent {
            id: device_id.to_string(),
            time_stamp: data.time_stamp,
            samples: data.samples,
        }))
    }
}

impl Serialize for BridgeEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("BridgeEvent", 2)?;
        state.serialize_field("event", self.name())?;
        match self {
            Self::DeviceFound(device)
            | Self::DeviceConnecting(device)
            | Self::DeviceConnected(device)
            | Self::DeviceDisconnected(device) => state.serialize_field("payload", device)?,
            Self::BatteryLevelReceived(battery) => state.serialize_field("payload", battery)?,
            Self::DisInformationReceived(info) => state.serialize_field("payload", info)?,
            Self::BlePowerOn | Self::BlePowerOff => {
                state.serialize_field("payload", &Option::<()>::None)?;
            }
            Self::FeatureReady { device_id, .. } => state.serialize_field("payload", device_id)?,
            Self::StreamingFeaturesReady(features) => {
                state.serialize_field("payload", features)?;
            }
            Self::HrData(event) => state.serialize_field("payload", event)?,
            Self::EcgData(batch) => state.serialize_field("payload", batch)?,
            Self::AccData(batch) => state.serialize_field("payload", batch)?,
            Self::PpgData(batch) => state.serialize_field("payload", batch)?,
            Self::PpiData(event) => state.serialize_field("payload", event)?,
            Self::RecordStatus(status) => state.serialize_field("payload", status)?,
            Self::ExerciseEntry(entry) => state.serialize_field("payload", entry)?,
            Self::ReadExercise(read) => state.serialize_field("payload", read)?,
        }
        state.end()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryLevel {
    pub identifier: String,
    pub battery_level: u8,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisInformation {
    pub identifier: String,
    pub uuid: String,
    pub value: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingFeatures {
    pub identifier: String,
    pub streaming_features: Vec<DataType>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HrEvent {
    pub id: String,
    pub hr: u16,
    pub rrs_ms: Vec<u16>,
    pub rr_available: bool,
    pub contact_status: bool,
    pub contact_status_supported: bool,
}

/// Samples from one SDK callback for one device.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SampleBatch<T> {
    pub id: String,
    pub samples: Vec<T>,
}

impl<T> SampleBatch<T> {
    fn new(device_id: &str, samples: Vec<T>) -> Self {
        Self {
            id: device_id.to_string(),
            samples,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EcgPoint {
    pub voltage: i32,
    pub time_stamp: u64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccPoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub time_stamp: u64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct PpgPoint {
    pub ppg0: i32,
    pub ppg1: i32,
    pub ppg2: i32,
    pub ambient: i32,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PpiEvent {
    pub id: String,
    pub time_stamp: u64,
    pub samples: Vec<PpiSample>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStatusEvent {
    pub ongoing: bool,
    pub entry_id: String,
}

impl From<RecordingStatus> for RecordStatusEvent {
    fn from(status: RecordingStatus) -> Self {
        Self {
            ongoing: status.ongoing,
            entry_id: status.entry_id,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ExerciseEntryEvent {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub path: String,
}

impl From<&ExerciseEntry> for ExerciseEntryEvent {
    fn from(entry: &ExerciseEntry) -> Self {
        Self {
            id: entry.entry_id.clone(),
            date: entry.date,
            path: entry.path.clone(),
        }
    }
}

impl ExerciseEntryEvent {
    /// Formats the recording date as RFC 3339.
    #[must_use]
    pub fn date_rfc3339(&self) -> String {
        self.date
            .format(&Rfc3339)
            .unwrap_or_else(|_error| self.date.to_string())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ExerciseRead {
    pub interval: u32,
    pub samples: Vec<u32>,
}

impl From<ExerciseData> for ExerciseRead {
    fn from(data: ExerciseData) -> Self {
        Self {
            interval: data.interval,
            samples: data.samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use time::macros::datetime;

    use super::*;
    use crate::sdk::{AccSample, EcgSample, HrSample, PpgSample};

    #[rstest]
    #[case(Capability::Hr, "HR_FEATURE_READY")]
    #[case(Capability::Ecg, "ECG_FEATURE_READY")]
    #[case(Capability::Acc, "ACC_FEATURE_READY")]
    #[case(Capability::Ppg, "OHR_PPG_FEATURE_READY")]
    #[case(Capability::Ppi, "OHR_PPI_FEATURE_READY")]
    fn feature_ready_name_follows_capability(
        #[case] capability: Capability,
        #[case] expected: &str,
    ) {
        let event = BridgeEvent::FeatureReady {
            capability,
            device_id: "A1".into(),
        };
        assert_eq!(expected, event.name());
        assert_eq!(
            json!({ "event": expected, "payload": "A1" }),
            serde_json::to_value(&event).expect("event should serialise")
        );
    }

    #[test]
    fn hr_event_forwards_first_sample_only() {
        let data = HrData {
            samples: vec![
                HrSample {
                    hr: 61,
                    rrs_ms: vec![980],
                    rr_available: true,
                    contact_status: true,
                    contact_status_supported: true,
                },
                HrSample {
                    hr: 99,
                    ..HrSample::default()
                },
            ],
        };

        let event = BridgeEvent::from_hr("A1", data).expect("non-empty batch maps to an event");

        assert_eq!(
            json!({
                "event": "HR_DATA",
                "payload": {
                    "id": "A1",
                    "hr": 61,
                    "rrsMs": [980],
                    "rrAvailable": true,
                    "contactStatus": true,
                    "contactStatusSupported": true,
                }
            }),
            serde_json::to_value(&event).expect("event should serialise")
        );
    }

    #[test]
    fn empty_hr_batch_maps_to_nothing() {
        assert_eq!(None, BridgeEvent::from_hr("A1", HrData::default()));
    }

    #[test]
    fn ecg_and_acc_samples_use_host_field_names() {
        let ecg = BridgeEvent::from_ecg(
            "A1",
            EcgData {
                samples: vec![EcgSample {
                    time_stamp: 10,
                    voltage: -42,
                }],
            },
        )
        .expect("ECG batch maps to an event");
        let acc = BridgeEvent::from_acc(
            "A1",
            AccData {
                samples: vec![AccSample {
                    time_stamp: 11,
                    x: 1,
                    y: 2,
                    z: 3,
                }],
            },
        )
        .expect("ACC batch maps to an event");

        assert_eq!(
            json!({ "id": "A1", "samples": [{ "voltage": -42, "timeStamp": 10 }] }),
            serde_json::to_value(&ecg).expect("event should serialise")["payload"]
        );
        assert_eq!(
            json!({ "id": "A1", "samples": [{ "x": 1, "y": 2, "z": 3, "timeStamp": 11 }] }),
            serde_json::to_value(&acc).expect("event should serialise")["payload"]
        );
    }

    #[test]
    fn ppg_drops_samples_missing_channels() {
        let data = PpgData {
            samples: vec![
                PpgSample {
                    time_stamp: 1,
                    channel_samples: vec![10, 20, 30, 5],
                },
                PpgSample {
                    time_stamp: 2,
                    channel_samples: vec![10, 20],
                },
            ],
        };

        let event = BridgeEvent::from_ppg("A1", data).expect("PPG batch maps to an event");

        assert_eq!(
            BridgeEvent::PpgData(SampleBatch {
                id: "A1".into(),
                samples: vec![PpgPoint {
                    ppg0: 10,
                    ppg1: 20,
                    ppg2: 30,
                    ambient: 5,
                }],
            }),
            event
        );
    }

    #[test]
    fn exercise_entry_date_serialises_as_rfc3339() {
        let entry = ExerciseEntry {
            entry_id: "E1".into(),
            date: datetime!(2024-03-01 08:15:00 UTC),
            path: "/U/0/20240301/E/081500/00/SAMPLES.BPB".into(),
        };
        let event = BridgeEvent::ExerciseEntry(ExerciseEntryEvent::from(&entry));

        assert_eq!(
            json!({
                "event": "EXERCISE_ENTRY",
                "payload": {
                    "id": "E1",
                    "date": "2024-03-01T08:15:00Z",
                    "path": "/U/0/20240301/E/081500/00/SAMPLES.BPB",
                }
            }),
            serde_json::to_value(&event).expect("event should serialise")
        );
    }

    #[test]
    fn power_events_carry_null_payload() {
        assert_eq!(
            json!({ "event": "BLE_POWER_OFF", "payload": null }),
            serde_json::to_value(&BridgeEvent::BlePowerOff).expect("event should serialise")
        );
    }
}
