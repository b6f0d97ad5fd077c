use std::fmt::{self, Display, Formatter};

use crate::bridge::{BridgeEvent, ExerciseEntryEvent, ExerciseRead, RecordStatusEvent};
use crate::sdk::DeviceInfo;

use super::painter::Painter;
use super::table::Table;

const MAX_INLINE_SAMPLES: usize = 4;

/// Renders one forwarded event as a single line.
pub(crate) struct EventView<'a> {
    index: usize,
    event: &'a BridgeEvent,
    painter: &'a Painter,
}

impl<'a> EventView<'a> {
    pub(crate) fn new(index: usize, event: &'a BridgeEvent, painter: &'a Painter) -> Self {
        Self {
            index,
            event,
            painter,
        }
    }

    fn details(&self) -> String {
        match self.event {
            BridgeEvent::DeviceFound(device)
            | BridgeEvent::DeviceConnecting(device)
            | BridgeEvent::DeviceConnected(device)
            | BridgeEvent::DeviceDisconnected(device) => format!(
                "{} {} rssi={}",
                device.device_id(),
                device.name(),
                device.rssi()
            ),
            BridgeEvent::BatteryLevelReceived(battery) => {
                format!("{} {}%", battery.identifier, battery.battery_level)
            }
            BridgeEvent::DisInformationReceived(info) => {
                format!("{} {}={}", info.identifier, info.uuid, info.value)
            }
            BridgeEvent::BlePowerOn | BridgeEvent::BlePowerOff => String::new(),
            BridgeEvent::FeatureReady { device_id, .. } => device_id.clone(),
            BridgeEvent::StreamingFeaturesReady(features) => {
                let names: Vec<String> = features
                    .streaming_features
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                format!("{} [{}]", features.identifier, names.join(", "))
            }
            BridgeEvent::HrData(event) => {
                let contact = if !event.contact_status_supported {
                    "n/a"
                } else if event.contact_status {
                    "yes"
                } else {
                    "no"
                };
                format!(
                    "{} hr={} rr={:?} contact={contact}",
                    event.id, event.hr, event.rrs_ms
                )
            }
            BridgeEvent::EcgData(batch) => sample_summary(
                &batch.id,
                batch.samples.iter().map(|point| point.voltage.to_string()),
                batch.samples.len(),
            ),
            BridgeEvent::AccData(batch) => sample_summary(
                &batch.id,
                batch
                    .samples
                    .iter()
                    .map(|point| format!("({},{},{})", point.x, point.y, point.z)),
                batch.samples.len(),
            ),
            BridgeEvent::PpgData(batch) => sample_summary(
                &batch.id,
                batch.samples.iter().map(|point| {
                    format!(
                        "({},{},{}|{})",
                        point.ppg0, point.ppg1, point.ppg2, point.ambient
                    )
                }),
                batch.samples.len(),
            ),
            BridgeEvent::PpiData(event) => sample_summary(
                &event.id,
                event.samples.iter().map(|sample| sample.pp_in_ms.to_string()),
                event.samples.len(),
            ),
            BridgeEvent::RecordStatus(status) => {
                format!("ongoing={} entry={}", status.ongoing, status.entry_id)
            }
            BridgeEvent::ExerciseEntry(entry) => {
                format!("{} {} {}", entry.id, entry.date_rfc3339(), entry.path)
            }
            BridgeEvent::ReadExercise(read) => format!(
                "interval={}s samples={}",
                read.interval,
                read.samples.len()
            ),
        }
    }
}

impl Display for EventView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let index_label = self.painter.muted(format!("[{:04}]", self.index));
        let name = match self.event {
            BridgeEvent::DeviceDisconnected(_) | BridgeEvent::BlePowerOff => {
                self.painter.warning(self.event.name())
            }
            BridgeEvent::DeviceConnected(_) | BridgeEvent::FeatureReady { .. } => {
                self.painter.success(self.event.name())
            }
            _ => self.painter.value(self.event.name()),
        };
        let details = self.details();
        if details.is_empty() {
            write!(f, "{index_label} {name}")
        } else {
            write!(f, "{index_label} {name} {}", self.painter.muted(details))
        }
    }
}

fn sample_summary(id: &str, values: impl Iterator<Item = String>, total: usize) -> String {
    let shown: Vec<String> = values.take(MAX_INLINE_SAMPLES).collect();
    let more = if total > shown.len() { ", ..." } else { "" };
    format!("{id} n={total} [{}{more}]", shown.join(", "))
}

/// Renders the devices found during a scan.
pub(crate) struct DeviceTableView<'a> {
    devices: &'a [DeviceInfo],
    painter: &'a Painter,
}

impl<'a> DeviceTableView<'a> {
    pub(crate) fn new(devices: &'a [DeviceInfo], painter: &'a Painter) -> Self {
        Self { devices, painter }
    }
}

impl Display for DeviceTableView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.painter.heading("Devices found:"))?;
        if self.devices.is_empty() {
            return write!(f, "\n{}", self.painter.warning("none"));
        }
        let rows = self
            .devices
            .iter()
            .map(|device| {
                vec![
                    self.painter.value(device.device_id()),
                    device.address().to_string(),
                    device.name().to_string(),
                    device.rssi().to_string(),
                    device.connectable().to_string(),
                ]
            })
            .collect();
        let table = Table::grid(["id", "address", "name", "rssi", "connectable"], rows);
        write!(f, "\n{table}")
    }
}

/// Renders stored exercise entries.
pub(crate) struct ExerciseTableView<'a> {
    entries: &'a [ExerciseEntryEvent],
    painter: &'a Painter,
}

impl<'a> ExerciseTableView<'a> {
    pub(crate) fn new(entries: &'a [ExerciseEntryEvent], painter: &'a Painter) -> Self {
        Self { entries, painter }
    }
}

impl Display for ExerciseTableView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.painter.heading("Exercises:"))?;
        if self.entries.is_empty() {
            return write!(f, "\n{}", self.painter.warning("none"));
        }
        let rows = self
            .entries
            .iter()
            .map(|entry| {
                vec![
                    self.painter.value(&entry.id),
                    entry.date_rfc3339(),
                    entry.path.clone(),
                ]
            })
            .collect();
        write!(f, "\n{}", Table::grid(["id", "date", "path"], rows))
    }
}

/// Renders a recording status.
pub(crate) struct RecordStatusView<'a> {
    device_id: &'a str,
    status: &'a RecordStatusEvent,
    painter: &'a Painter,
}

impl<'a> RecordStatusView<'a> {
    pub(crate) fn new(device_id: &'a str, status: &'a RecordStatusEvent, painter: &'a Painter) -> Self {
        Self {
            device_id,
            status,
            painter,
        }
    }
}

impl Display for RecordStatusView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = if self.status.ongoing {
            self.painter.success("recording")
        } else {
            self.painter.muted("idle")
        };
        let entry = if self.status.entry_id.is_empty() {
            self.painter.muted("<none>")
        } else {
            self.painter.value(&self.status.entry_id)
        };
        let table = Table::key_value(
            self.painter,
            vec![
                ("device", self.painter.value(self.device_id)),
                ("state", state),
                ("entry", entry),
            ],
        );
        write!(f, "{}", self.painter.heading("Recording status:"))?;
        write!(f, "\n{table}")
    }
}

/// Renders a fetched exercise.
pub(crate) struct ExerciseReadView<'a> {
    read: &'a ExerciseRead,
    painter: &'a Painter,
}

impl<'a> ExerciseReadView<'a> {
    pub(crate) fn new(read: &'a ExerciseRead, painter: &'a Painter) -> Self {
        Self { read, painter }
    }
}

impl Display for ExerciseReadView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let samples: Vec<String> = self.read.samples.iter().map(ToString::to_string).collect();
        let table = Table::key_value(
            self.painter,
            vec![
                ("interval", format!("{}s", self.read.interval)),
                ("count", self.read.samples.len().to_string()),
                ("samples", samples.join(" ")),
            ],
        );
        write!(f, "{}", self.painter.heading("Exercise data:"))?;
        write!(f, "\n{table}")
    }
}
