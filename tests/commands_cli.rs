use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const FIXTURE: &str = "A1|AA:BB:CC|Polar H10 A1|-43;B2|DD:EE:FF|Polar OH1 B2|-70";

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl hrstrap::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

/// Runs `argv` and returns the command result together with everything written to stdout.
async fn run_capturing_output(argv: &[&str]) -> anyhow::Result<(anyhow::Result<()>, String)> {
    let args = hrstrap::Args::try_parse_from(argv)?;
    let output_format = args.output_format();
    let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
    let fake_args = maybe_fake_args.ok_or_else(|| anyhow::anyhow!("tests run in fake mode"))?;
    let mut output = Vec::new();
    let result = hrstrap::run_with_clients(
        command,
        &mut output,
        &FakeTerminalClient,
        hrstrap::fake_sdk(fake_args),
        None,
        output_format,
    )
    .await;
    Ok((result, String::from_utf8(output)?))
}

async fn run_with_argv(argv: &[&str]) -> anyhow::Result<String> {
    let (result, stdout) = run_capturing_output(argv).await?;
    result?;
    Ok(stdout)
}

fn fake_argv<'a>(command: &[&'a str]) -> Vec<&'a str> {
    let mut argv = vec!["hrstrap", "--fake", "--fake-scan", FIXTURE];
    argv.extend_from_slice(command);
    argv
}

fn json_lines(stdout: &str) -> Vec<Value> {
    stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("every output line is a JSON event"))
        .collect()
}

fn event_names(events: &[Value]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| event["event"].as_str())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn non_terminal_output_defaults_to_json_lines() -> anyhow::Result<()> {
    let stdout = run_with_argv(&fake_argv(&["scan", "--duration", "1s"])).await?;

    let events = json_lines(&stdout);
    assert_eq!(vec!["DEVICE_FOUND", "DEVICE_FOUND"], event_names(&events));
    assert_eq!(
        json!({
            "deviceId": "A1",
            "address": "AA:BB:CC",
            "rssi": -43,
            "name": "Polar H10 A1",
            "connectable": true,
        }),
        events[0]["payload"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pretty_scan_ends_with_a_device_table() -> anyhow::Result<()> {
    let stdout =
        run_with_argv(&fake_argv(&["--output", "pretty", "scan", "--duration", "1s"])).await?;

    assert!(stdout.starts_with("[0000] DEVICE_FOUND A1 Polar H10 A1 rssi=-43\n"));
    assert!(stdout.contains("Devices found:"));
    assert!(stdout.contains("│ B2 "));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stream_waits_for_readiness_then_stops_at_the_event_limit() -> anyhow::Result<()> {
    let stdout = run_with_argv(&fake_argv(&[
        "stream",
        "--device",
        "A1",
        "--capability",
        "hr",
        "--capability",
        "ecg",
        "--max-events",
        "6",
    ]))
    .await?;

    let events = json_lines(&stdout);
    let names = event_names(&events);
    let position = |name: &str| names.iter().position(|candidate| *candidate == name);

    assert_eq!(Some(0), position("DEVICE_FOUND"));
    let connected = position("DEVICE_CONNECTED").expect("device connects");
    let hr_ready = position("HR_FEATURE_READY").expect("hr becomes ready");
    let ecg_ready = position("ECG_FEATURE_READY").expect("ecg becomes ready");
    let first_data = names
        .iter()
        .position(|name| *name == "HR_DATA" || *name == "ECG_DATA")
        .expect("data arrives");
    assert!(connected < hr_ready && hr_ready < first_data && ecg_ready < first_data);
    assert_eq!(Some(&"DEVICE_DISCONNECTED"), names.last());

    let data_events = names
        .iter()
        .filter(|name| **name == "HR_DATA" || **name == "ECG_DATA")
        .count();
    assert!(data_events >= 6, "expected at least six data events, got {data_events}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stream_pretty_summary_reports_the_stop_reason() -> anyhow::Result<()> {
    let stdout = run_with_argv(&fake_argv(&[
        "--output",
        "pretty",
        "stream",
        "--device",
        "A1",
        "--capability",
        "hr",
        "--duration",
        "1s",
    ]))
    .await?;

    assert!(stdout.contains("HR_DATA A1 hr=60 rr=[1000]"));
    assert!(
        stdout
            .trim_end()
            .ends_with("data events (duration elapsed)")
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stream_times_out_when_a_capability_never_becomes_ready() {
    let result = run_with_argv(&fake_argv(&[
        "stream",
        "--device",
        "A1",
        "--capability",
        "ppg",
        "--timeout",
        "2s",
    ]))
    .await;

    let error = result.expect_err("ppg is not offered by the default fake");
    assert_eq!(
        "timed out after 2s waiting for {Ppg} to become ready on A1",
        error.to_string()
    );
}

#[tokio::test(start_paused = true)]
async fn stream_disconnects_after_a_readiness_timeout() -> anyhow::Result<()> {
    let (result, stdout) = run_capturing_output(&fake_argv(&[
        "stream",
        "--device",
        "A1",
        "--capability",
        "ppg",
        "--timeout",
        "2s",
    ]))
    .await?;

    assert!(result.is_err());
    let events = json_lines(&stdout);
    let names = event_names(&events);
    assert!(names.contains(&"DEVICE_CONNECTED"));
    assert_eq!(Some(&"DEVICE_DISCONNECTED"), names.last());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stream_times_out_for_an_unknown_device() {
    let result = run_with_argv(&fake_argv(&[
        "stream",
        "--device",
        "Z9",
        "--capability",
        "hr",
        "--timeout",
        "3s",
    ]))
    .await;

    let error = result.expect_err("Z9 is not in the fixture");
    assert_eq!(
        "timed out after 3s waiting for device Z9 to be found",
        error.to_string()
    );
}

#[tokio::test(start_paused = true)]
async fn record_start_reports_the_ongoing_recording() -> anyhow::Result<()> {
    let stdout = run_with_argv(&fake_argv(&[
        "record",
        "start",
        "--device",
        "A1",
        "--exercise-id",
        "RUN1",
        "--sample-type",
        "rr",
    ]))
    .await?;

    let events = json_lines(&stdout);
    let statuses: Vec<&Value> = events
        .iter()
        .filter(|event| event["event"] == "RECORD_STATUS")
        .map(|event| &event["payload"])
        .collect();
    assert_eq!(
        vec![
            &json!({"ongoing": false, "entryId": ""}),
            &json!({"ongoing": true, "entryId": "RUN1"}),
        ],
        statuses
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn record_status_renders_a_table_in_pretty_mode() -> anyhow::Result<()> {
    let stdout = run_with_argv(&fake_argv(&[
        "--output", "pretty", "record", "status", "--device", "A1",
    ]))
    .await?;

    assert!(stdout.contains("Recording status:"));
    assert!(stdout.contains("│ state  │ idle   │"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exercise_list_forwards_each_entry() -> anyhow::Result<()> {
    let stdout = run_with_argv(&fake_argv(&["exercise", "list", "--device", "A1"])).await?;

    let events = json_lines(&stdout);
    let entries: Vec<&Value> = events
        .iter()
        .filter(|event| event["event"] == "EXERCISE_ENTRY")
        .map(|event| &event["payload"])
        .collect();
    assert_eq!(
        vec![&json!({
            "id": "E1",
            "date": "2024-03-01T08:15:00Z",
            "path": "/U/0/2024-03-01/E/E1/00/SAMPLES.BPB",
        })],
        entries
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exercise_read_downloads_the_listed_entry() -> anyhow::Result<()> {
    let stdout = run_with_argv(&fake_argv(&["exercise", "read", "--device", "A1"])).await?;

    let events = json_lines(&stdout);
    let read = events
        .iter()
        .find(|event| event["event"] == "READ_EXERCISE")
        .expect("exercise data is forwarded");
    assert_eq!(
        json!({"interval": 1, "samples": [62, 64, 67, 71, 74, 73, 70]}),
        read["payload"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exercise_remove_leaves_no_entries() -> anyhow::Result<()> {
    let stdout = run_with_argv(&fake_argv(&[
        "--output", "pretty", "exercise", "remove", "--device", "A1",
    ]))
    .await?;

    assert!(stdout.contains("Exercises:\nnone"));
    Ok(())
}

#[test]
fn record_start_rejects_unknown_sample_types() {
    let result = hrstrap::Args::try_parse_from(fake_argv(&[
        "record",
        "start",
        "--device",
        "A1",
        "--exercise-id",
        "RUN1",
        "--sample-type",
        "spo2",
    ]));

    let error = result.expect_err("spo2 is not a sample type");
    assert_eq!(clap::error::ErrorKind::InvalidValue, error.kind());
}

#[test]
fn fake_args_builder_rejects_malformed_fixtures() {
    let result = hrstrap::FakeArgs::builder().scan_fixture("invalid-record");
    assert!(matches!(
        result,
        Err(hrstrap::FixtureError::InvalidRecordFieldCount)
    ));
}
