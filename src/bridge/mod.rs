//! Adapter between the sensor SDK and a host runtime.
//!
//! The host talks to a [`Bridge`] through a [`BridgeHandle`] and receives
//! [`BridgeEvent`]s through an [`EventEmitter`].

mod capability;
mod command;
mod event;
mod readiness;
mod session;
mod streams;

pub use self::capability::Capability;
pub use self::command::{BridgeCommand, BridgeHandle};
pub use self::event::{
    AccPoint, BatteryLevel, BridgeEvent, DisInformation, EcgPoint, EventEmitter,
    ExerciseEntryEvent, ExerciseRead, HrEvent, PpgPoint, PpiEvent, RecordStatusEvent,
    SampleBatch, StreamingFeatures,
};
pub use self::readiness::FeatureReadiness;
pub use self::session::{Bridge, ConnectionState, SessionState};
pub use self::streams::StreamSessions;
