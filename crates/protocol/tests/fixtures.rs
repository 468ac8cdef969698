use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use wattwise_protocol::*;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("fixtures")
}

fn requests_dir() -> PathBuf {
    fixtures_dir().join("requests")
}

fn responses_dir() -> PathBuf {
    fixtures_dir().join("responses")
}

fn write_fixture(dir: &Path, name: &str, json: &str) {
    let path = dir.join(format!("{}.json", name));
    fs::write(&path, json).unwrap_or_else(|_| panic!("Failed to write fixture: {:?}", path));
}

fn read_fixture(dir: &Path, name: &str) -> String {
    let path = dir.join(format!("{}.json", name));
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to read fixture: {:?}", path))
}

fn sample_power_sample() -> PowerSample {
    PowerSample {
        timestamp: 1_704_067_200_000,
        power_watts: 212.5,
        accumulated_kwh: 1.2,
        session_id: "5f0c6a0e-8d1b-4c53-9f8e-0b6f3c1d2e4a".to_string(),
        cpu_util_pct: 50.0,
        gpu_util_pct: 12.5,
        mem_util_pct: 43.0,
    }
}

fn sample_components() -> Vec<ComponentReading> {
    let mut cpu = ComponentReading::new("cpu", "CPU", ComponentKind::Processor, "Ryzen 7", 81.25);
    cpu.tdp_watts = Some(125.0);
    cpu.utilization_pct = Some(50.0);
    cpu.temperature_c = Some(61.0);
    cpu.clock_mhz = Some(4200.0);

    let mut gpu = ComponentReading::new(
        "gpu",
        "GPU",
        ComponentKind::Graphics,
        "Integrated/Unknown",
        0.0,
    );
    gpu.tdp_watts = Some(150.0);
    gpu.utilization_pct = Some(0.0);

    let mut ram = ComponentReading::new("ram", "Memory", ComponentKind::Memory, "32.0GB", 7.15);
    ram.mem_used_mb = Some(14_090.0);
    ram.mem_total_mb = Some(32_768.0);

    let psu = ComponentReading::new("psu", "Power Supply", ComponentKind::Psu, "Estimated", 8.8);

    vec![cpu, gpu, ram, psu]
}

fn sample_session(open: bool) -> Session {
    Session {
        id: "5f0c6a0e-8d1b-4c53-9f8e-0b6f3c1d2e4a".to_string(),
        start_time: 1_704_060_000_000,
        end_time: if open { None } else { Some(1_704_067_200_000) },
        total_kwh: if open { 0.0 } else { 1.2 },
        total_cost: if open { 0.0 } else { 1734.0 },
    }
}

fn sample_data_snapshot() -> DataSnapshot {
    DataSnapshot {
        timestamp: 1_704_067_200_000,
        sample: sample_power_sample(),
        components: sample_components(),
        session: Some(sample_session(true)),
    }
}

fn sample_daemon_status() -> DaemonStatus {
    DaemonStatus {
        running: true,
        uptime_secs: 3600,
        sample_count: 720,
        session_count: 3,
        last_sample_time: Some(1_704_067_200_000),
        current_session_id: Some("5f0c6a0e-8d1b-4c53-9f8e-0b6f3c1d2e4a".to_string()),
        database_size_bytes: 1_024_000,
        version: "0.3.0".to_string(),
        subscriber_count: 2,
        sample_interval_secs: 5,
        protocol_version: PROTOCOL_VERSION,
        min_supported_version: MIN_SUPPORTED_VERSION,
    }
}

fn requests() -> Vec<(&'static str, DaemonRequest)> {
    vec![
        ("get_status", DaemonRequest::GetStatus),
        ("get_current_data", DaemonRequest::GetCurrentData),
        (
            "get_power_history",
            DaemonRequest::GetPowerHistory { hours: 24 },
        ),
        (
            "get_samples_in_range",
            DaemonRequest::GetSamplesInRange {
                from: 1_704_060_000_000,
                to: 1_704_067_200_000,
            },
        ),
        (
            "get_session_samples",
            DaemonRequest::GetSessionSamples {
                session_id: "5f0c6a0e-8d1b-4c53-9f8e-0b6f3c1d2e4a".to_string(),
            },
        ),
        ("get_sessions", DaemonRequest::GetSessions),
        (
            "get_session",
            DaemonRequest::GetSession {
                id: "5f0c6a0e-8d1b-4c53-9f8e-0b6f3c1d2e4a".to_string(),
            },
        ),
        ("get_current_session", DaemonRequest::GetCurrentSession),
        ("start_session", DaemonRequest::StartSession),
        (
            "end_session",
            DaemonRequest::EndSession {
                id: "5f0c6a0e-8d1b-4c53-9f8e-0b6f3c1d2e4a".to_string(),
            },
        ),
        ("get_totals", DaemonRequest::GetTotals),
        ("subscribe", DaemonRequest::Subscribe),
        ("unsubscribe", DaemonRequest::Unsubscribe),
        ("shutdown", DaemonRequest::Shutdown),
    ]
}

fn responses() -> Vec<(&'static str, DaemonResponse)> {
    vec![
        ("status", DaemonResponse::Status(sample_daemon_status())),
        (
            "current_data",
            DaemonResponse::CurrentData(sample_data_snapshot()),
        ),
        (
            "samples",
            DaemonResponse::Samples(vec![sample_power_sample()]),
        ),
        (
            "sessions",
            DaemonResponse::Sessions(vec![sample_session(true), sample_session(false)]),
        ),
        ("session", DaemonResponse::Session(sample_session(false))),
        ("no_session", DaemonResponse::NoSession),
        (
            "totals",
            DaemonResponse::Totals(EnergyTotals {
                total_kwh: 1.2,
                total_cost: 1734.0,
                electricity_rate: 1445.0,
            }),
        ),
        ("ok", DaemonResponse::Ok),
        (
            "error_conflict",
            DaemonResponse::error(ErrorKind::Conflict, "A session is already open"),
        ),
        (
            "error_not_found",
            DaemonResponse::error(ErrorKind::NotFound, "Session not found"),
        ),
        ("subscribed", DaemonResponse::Subscribed),
        ("unsubscribed", DaemonResponse::Unsubscribed),
        (
            "subscription_rejected",
            DaemonResponse::SubscriptionRejected {
                reason: "Maximum subscribers (10) reached".to_string(),
            },
        ),
        (
            "data_update",
            DaemonResponse::DataUpdate(sample_data_snapshot()),
        ),
    ]
}

#[test]
fn request_fixtures_round_trip() {
    let dir = requests_dir();
    fs::create_dir_all(&dir).unwrap();

    for (name, request) in requests() {
        let json = serde_json::to_string_pretty(&request).unwrap();
        write_fixture(&dir, name, &json);

        let content = read_fixture(&dir, name);
        let parsed: DaemonRequest = serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to deserialize {}: {}", name, e));
        assert_eq!(parsed, request);
    }
}

#[test]
fn response_fixtures_round_trip() {
    let dir = responses_dir();
    fs::create_dir_all(&dir).unwrap();

    for (name, response) in responses() {
        let json = serde_json::to_string_pretty(&response).unwrap();
        write_fixture(&dir, name, &json);

        let content = read_fixture(&dir, name);
        let parsed: DaemonResponse = serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to deserialize {}: {}", name, e));
        assert_eq!(parsed, response);
    }
}

#[test]
fn single_line_json_for_socket_framing() {
    for (name, response) in responses() {
        let json = response.to_json().unwrap();
        assert!(!json.contains('\n'), "{} serialized across lines", name);
    }
    for (name, request) in requests() {
        let json = request.to_json().unwrap();
        assert!(!json.contains('\n'), "{} serialized across lines", name);
    }
}

#[test]
fn unit_variants_use_bare_strings() {
    assert_eq!(DaemonRequest::GetStatus.to_json().unwrap(), "\"GetStatus\"");
    assert_eq!(DaemonResponse::NoSession.to_json().unwrap(), "\"NoSession\"");

    let err = DaemonResponse::from_json(
        r#"{"Error":{"kind":"not_found","message":"Session abc not found"}}"#,
    )
    .unwrap();
    assert_eq!(
        err,
        DaemonResponse::error(ErrorKind::NotFound, "Session abc not found")
    );
}
