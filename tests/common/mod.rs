#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hrstrap::bridge::{Bridge, BridgeCommand, BridgeEvent, Capability};
use hrstrap::sdk::{DeviceInfo, FakeSdk, FakeSdkConfig, SdkCall};
use tokio::sync::mpsc;

pub const DEVICE: &str = "A1";

pub fn strap(device_id: &str, name: &str) -> DeviceInfo {
    DeviceInfo::new(device_id, "AA:BB:CC:DD:EE:FF", -48, name, true)
}

/// A bridge over a fake SDK, with its emitted events captured.
pub struct Harness {
    pub sdk: FakeSdk,
    pub bridge: Bridge,
    events: mpsc::UnboundedReceiver<BridgeEvent>,
}

impl Harness {
    pub fn new(config: FakeSdkConfig) -> Self {
        let sdk = FakeSdk::new(config);
        let (sender, events) = mpsc::unbounded_channel();
        let (bridge, _handle) = Bridge::new(Arc::new(sdk.clone()), Arc::new(sender));
        Self {
            sdk,
            bridge,
            events,
        }
    }

    /// A bridge whose fake knows one H10 strap with the default features.
    pub fn with_h10() -> Self {
        Self::new(
            FakeSdkConfig::builder()
                .devices(vec![strap(DEVICE, "Polar H10 A1")])
                .battery_level(100)
                .build(),
        )
    }

    pub async fn settle(&mut self) {
        self.bridge.run_until_idle(Duration::from_millis(50)).await;
    }

    pub async fn send(&mut self, command: BridgeCommand) {
        self.bridge.dispatch(command);
        self.settle().await;
    }

    pub async fn connect(&mut self) {
        self.send(BridgeCommand::Connect {
            device_id: DEVICE.to_string(),
        })
        .await;
    }

    pub async fn start(&mut self, capability: Capability) {
        self.send(BridgeCommand::StartStreaming {
            capability,
            device_id: DEVICE.to_string(),
        })
        .await;
    }

    pub async fn stop(&mut self, capability: Capability) {
        self.send(BridgeCommand::StopStreaming {
            capability,
            device_id: DEVICE.to_string(),
        })
        .await;
    }

    /// Takes every event emitted so far.
    pub fn take_events(&mut self) -> Vec<BridgeEvent> {
        let mut taken = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            taken.push(event);
        }
        taken
    }

    pub fn take_event_names(&mut self) -> Vec<&'static str> {
        self.take_events().iter().map(BridgeEvent::name).collect()
    }

    pub fn count_calls(&self, predicate: impl Fn(&SdkCall) -> bool) -> usize {
        self.sdk.count_calls(predicate)
    }

    pub fn stream_calls(&self) -> usize {
        self.count_calls(|call| matches!(call, SdkCall::StartStreaming { .. }))
    }
}
