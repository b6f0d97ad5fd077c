mod common;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use common::{DEVICE, Harness, strap};
use hrstrap::bridge::{
    BatteryLevel, BridgeCommand, BridgeEvent, Capability, ConnectionState, DisInformation,
};
use hrstrap::sdk::{FailPoint, FakeSdkConfig, HrData, SdkCall};

#[tokio::test(start_paused = true)]
async fn connecting_forwards_link_and_device_information() {
    let mut harness = Harness::with_h10();

    harness.connect().await;

    let events = harness.take_events();
    assert_matches!(
        &events[..6],
        [
            BridgeEvent::DeviceConnecting(connecting),
            BridgeEvent::DeviceConnected(connected),
            BridgeEvent::BatteryLevelReceived(_),
            BridgeEvent::DisInformationReceived(_),
            BridgeEvent::DisInformationReceived(_),
            BridgeEvent::FeatureReady { capability: Capability::Hr, .. },
        ] if connecting.device_id() == DEVICE && connected.name() == "Polar H10 A1"
    );
    assert_eq!(
        BridgeEvent::BatteryLevelReceived(BatteryLevel {
            identifier: DEVICE.to_string(),
            battery_level: 100,
        }),
        events[2]
    );
    assert_eq!(
        BridgeEvent::DisInformationReceived(DisInformation {
            identifier: DEVICE.to_string(),
            uuid: "00002a29-0000-1000-8000-00805f9b34fb".to_string(),
            value: "Polar Electro Oy".to_string(),
        }),
        events[3]
    );
    assert_eq!(
        &ConnectionState::Connected {
            device_id: DEVICE.to_string(),
        },
        harness.bridge.state().connection()
    );
}

#[tokio::test(start_paused = true)]
async fn online_streaming_readiness_follows_the_reported_stream_types() {
    let mut harness = Harness::with_h10();

    harness.connect().await;

    let names = harness.take_event_names();
    let features_at = names
        .iter()
        .position(|name| *name == "STREAMING_FEATURES_READY")
        .expect("online stream types are forwarded");
    assert_eq!(
        vec!["HR_FEATURE_READY", "ECG_FEATURE_READY", "ACC_FEATURE_READY"],
        names[features_at + 1..features_at + 4].to_vec()
    );
    let readiness = harness.bridge.state().readiness();
    assert_eq!(
        vec![Capability::Hr, Capability::Ecg, Capability::Acc],
        readiness.ready_capabilities().collect::<Vec<_>>()
    );
}

#[tokio::test(start_paused = true)]
async fn an_h10_connection_queries_recording_status_once() {
    let mut harness = Harness::with_h10();

    harness.connect().await;

    assert!(harness.bridge.state().recording_supported());
    assert_eq!(
        1,
        harness.count_calls(|call| matches!(call, SdkCall::RequestRecordingStatus { .. }))
    );
    assert_eq!(
        1,
        harness
            .take_events()
            .iter()
            .filter(|event| matches!(event, BridgeEvent::RecordStatus(_)))
            .count()
    );
}

#[tokio::test(start_paused = true)]
async fn other_straps_do_not_support_recording() {
    let mut harness = Harness::new(
        FakeSdkConfig::builder()
            .devices(vec![strap(DEVICE, "Polar OH1 A1")])
            .battery_level(100)
            .build(),
    );

    harness.connect().await;

    assert!(!harness.bridge.state().recording_supported());
    assert_eq!(
        0,
        harness.count_calls(|call| matches!(call, SdkCall::RequestRecordingStatus { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_clears_readiness_so_later_starts_are_ignored() {
    let mut harness = Harness::with_h10();
    harness.connect().await;
    harness.start(Capability::Hr).await;
    harness.take_events();

    harness
        .send(BridgeCommand::Disconnect {
            device_id: DEVICE.to_string(),
        })
        .await;

    assert_matches!(harness.take_events().as_slice(), [BridgeEvent::DeviceDisconnected(device)] if device.device_id() == DEVICE);
    let state = harness.bridge.state();
    assert_eq!(0, state.readiness().ready_capabilities().count());
    assert!(!state.recording_supported());
    assert!(!state.streams().is_active(Capability::Hr));

    harness.start(Capability::Hr).await;
    assert_eq!(1, harness.stream_calls());
}

#[tokio::test(start_paused = true)]
async fn link_loss_releases_the_device_streams() {
    let mut harness = Harness::with_h10();
    harness.connect().await;
    harness.start(Capability::Hr).await;
    harness.start(Capability::Ecg).await;

    harness.sdk.report_link_lost(DEVICE);
    harness.settle().await;

    assert_eq!(
        0,
        harness
            .bridge
            .state()
            .streams()
            .active_capabilities()
            .count()
    );
    assert_eq!(
        &ConnectionState::Disconnected {
            device_id: DEVICE.to_string(),
        },
        harness.bridge.state().connection()
    );
}

#[tokio::test(start_paused = true)]
async fn stream_types_arriving_after_a_disconnect_are_dropped() {
    let mut harness = Harness::with_h10();

    // Both notifications are queued before the bridge processes either.
    harness.bridge.dispatch(BridgeCommand::Connect {
        device_id: DEVICE.to_string(),
    });
    harness.sdk.report_link_lost(DEVICE);
    harness.settle().await;

    let names = harness.take_event_names();
    assert!(!names.contains(&"STREAMING_FEATURES_READY"));
    assert!(names.contains(&"DEVICE_DISCONNECTED"));
    assert!(!harness.bridge.state().readiness().is_ready(Capability::Ecg));
}

#[tokio::test(start_paused = true)]
async fn failed_stream_type_query_leaves_streams_unavailable() {
    let mut harness = Harness::with_h10();
    harness
        .sdk
        .fail_next(FailPoint::StreamTypes, "service discovery incomplete");

    harness.connect().await;

    let readiness = harness.bridge.state().readiness();
    assert!(readiness.is_ready(Capability::Hr));
    assert!(!readiness.is_ready(Capability::Ecg));
    assert!(!harness.take_event_names().contains(&"STREAMING_FEATURES_READY"));
}

#[tokio::test(start_paused = true)]
async fn connect_failures_are_not_forwarded() {
    let mut harness = Harness::with_h10();
    harness.sdk.fail_next(FailPoint::Connect, "adapter busy");

    harness.connect().await;

    assert_eq!(Vec::<BridgeEvent>::new(), harness.take_events());
    assert_eq!(&ConnectionState::Idle, harness.bridge.state().connection());
}

#[tokio::test(start_paused = true)]
async fn search_forwards_every_device_found() {
    let mut harness = Harness::new(
        FakeSdkConfig::builder()
            .devices(vec![
                strap("A1", "Polar H10 A1"),
                strap("B2", "Polar Verity Sense B2"),
            ])
            .build(),
    );

    harness.send(BridgeCommand::SearchForDevice).await;

    let found: Vec<String> = harness
        .take_events()
        .iter()
        .filter_map(|event| match event {
            BridgeEvent::DeviceFound(device) => Some(device.device_id().to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(vec!["A1", "B2"], found);
    assert_eq!(&ConnectionState::Discovering, harness.bridge.state().connection());
}

#[tokio::test(start_paused = true)]
async fn auto_connect_looks_for_an_h10_above_the_rssi_floor() {
    let mut harness = Harness::with_h10();

    harness
        .send(BridgeCommand::StartAutoConnect { rssi: -60 })
        .await;

    assert_eq!(
        1,
        harness.count_calls(|call| {
            call == &SdkCall::StartAutoConnect {
                rssi: -60,
                device_type: "H10".to_string(),
            }
        })
    );
    assert!(
        harness
            .take_event_names()
            .contains(&"DEVICE_CONNECTED")
    );
}

#[tokio::test(start_paused = true)]
async fn power_state_changes_carry_no_payload() {
    let mut harness = Harness::with_h10();

    harness.sdk.report_power(false);
    harness.sdk.report_power(true);
    harness.settle().await;

    assert_eq!(
        vec![BridgeEvent::BlePowerOff, BridgeEvent::BlePowerOn],
        harness.take_events()
    );
}

#[tokio::test(start_paused = true)]
async fn foreground_entry_is_passed_to_the_sdk() {
    let mut harness = Harness::with_h10();

    harness.send(BridgeCommand::ForegroundEntered).await;

    assert_eq!(
        1,
        harness.count_calls(|call| matches!(call, SdkCall::ForegroundEntered))
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_streams_and_ignores_later_commands() {
    let mut harness = Harness::with_h10();
    harness.connect().await;
    harness.start(Capability::Hr).await;

    harness.send(BridgeCommand::Shutdown).await;

    assert!(harness.bridge.is_stopped());
    assert!(!harness.bridge.state().streams().is_active(Capability::Hr));
    assert_eq!(1, harness.count_calls(|call| matches!(call, SdkCall::ShutDown)));

    let calls_before = harness.sdk.calls().len();
    harness.connect().await;
    assert_eq!(calls_before, harness.sdk.calls().len());
    assert!(!harness.sdk.emit_hr(HrData::default()));
}

#[tokio::test(start_paused = true)]
async fn run_returns_once_the_sdk_has_dropped_every_link() {
    let mut harness = Harness::with_h10();
    harness.connect().await;
    assert_eq!(vec![DEVICE.to_string()], harness.sdk.connected_devices());
    let Harness { sdk, bridge, .. } = harness;

    bridge.handle().shutdown();
    bridge.run().await;

    assert_eq!(Vec::<String>::new(), sdk.connected_devices());
}
