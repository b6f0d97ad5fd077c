use tokio::sync::mpsc;
use tracing::debug;

use super::Capability;
use super::session::BridgeInput;
use crate::sdk::SampleType;

/// An imperative request from the host.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BridgeCommand {
    SearchForDevice,
    StartAutoConnect {
        rssi: i16,
    },
    Connect {
        device_id: String,
    },
    Disconnect {
        device_id: String,
    },
    StartStreaming {
        capability: Capability,
        device_id: String,
    },
    StopStreaming {
        capability: Capability,
        device_id: String,
    },
    GetRecordingStatus {
        device_id: String,
    },
    StartRecording {
        device_id: String,
        exercise_id: String,
        sample_type: SampleType,
    },
    StopRecording {
        device_id: String,
    },
    ListExercises {
        device_id: String,
    },
    ReadExercise {
        device_id: String,
    },
    RemoveExercise {
        device_id: String,
    },
    ForegroundEntered,
    Shutdown,
}

/// Cloneable command surface for a running bridge.
///
/// Every method is fire-and-forget: results arrive as events, and commands sent
/// after the bridge stopped are dropped.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    inbox: mpsc::UnboundedSender<BridgeInput>,
}

impl BridgeHandle {
    pub(crate) fn new(inbox: mpsc::UnboundedSender<BridgeInput>) -> Self {
        Self { inbox }
    }

    /// Queues one command.
    pub fn send(&self, command: BridgeCommand) {
        if let Err(error) = self.inbox.send(BridgeInput::Command(command)) {
            debug!(input = ?error.0, "bridge stopped; dropping command");
        }
    }

    pub fn search_for_device(&self) {
        self.send(BridgeCommand::SearchForDevice);
    }

    pub fn start_auto_connect(&self, rssi: i16) {
        self.send(BridgeCommand::StartAutoConnect { rssi });
    }

    pub fn connect_to_device(&self, device_id: impl Into<String>) {
        self.send(BridgeCommand::Connect {
            device_id: device_id.into(),
        });
    }

    pub fn disconnect_from_device(&self, device_id: impl Into<String>) {
        self.send(BridgeCommand::Disconnect {
            device_id: device_id.into(),
        });
    }

    pub fn start_streaming(&self, capability: Capability, device_id: impl Into<String>) {
        self.send(BridgeCommand::StartStreaming {
            capability,
            device_id: device_id.into(),
        });
    }

    pub fn stop_streaming(&self, capability: Capability, device_id: impl Into<String>) {
        self.send(BridgeCommand::StopStreaming {
            capability,
            device_id: device_id.into(),
        });
    }

    pub fn get_recording_status(&self, device_id: impl Into<String>) {
        self.send(BridgeCommand::GetRecordingStatus {
            device_id: device_id.into(),
        });
    }

    /// Starts an on-device recording. `sample_type` is the host selector: `"hr"`, or anything else for RR.
    pub fn start_recording(
        &self,
        device_id: impl Into<String>,
        exercise_id: impl Into<String>,
        sample_type: &str,
    ) {
        self.send(BridgeCommand::StartRecording {
            device_id: device_id.into(),
            exercise_id: exercise_id.into(),
            sample_type: SampleType::from(sample_type),
        });
    }

    pub fn stop_recording(&self, device_id: impl Into<String>) {
        self.send(BridgeCommand::StopRecording {
            device_id: device_id.into(),
        });
    }

    pub fn list_exercises(&self, device_id: impl Into<String>) {
        self.send(BridgeCommand::ListExercises {
            device_id: device_id.into(),
        });
    }

    pub fn read_exercise(&self, device_id: impl Into<String>) {
        self.send(BridgeCommand::ReadExercise {
            device_id: device_id.into(),
        });
    }

    pub fn remove_exercise(&self, device_id: impl Into<String>) {
        self.send(BridgeCommand::RemoveExercise {
            device_id: device_id.into(),
        });
    }

    pub fn foreground_entered(&self) {
        self.send(BridgeCommand::ForegroundEntered);
    }

    /// Stops every subscription, shuts the SDK down and ends the bridge loop.
    pub fn shutdown(&self) {
        self.send(BridgeCommand::Shutdown);
    }
}
