use std::process::Command;

fn temp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "taskforge-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

#[test]
fn cli_list_scenarios_writes_output() {
    let exe = env!("CARGO_BIN_EXE_taskforge-tester");
    let output_path = temp_path("list");
    let status = Command::new(exe)
        .args(["--list-scenarios", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("Available scenarios"));
    for name in ["smoke", "leveling", "salary", "anti-exploit", "debounce", "soak"] {
        assert!(content.contains(name), "missing {name}");
    }
}

#[test]
fn cli_writes_json_report_for_passing_run() {
    let exe = env!("CARGO_BIN_EXE_taskforge-tester");
    let output_path = temp_path("run");
    let output = Command::new(exe)
        .args([
            "--report",
            "json",
            "--scenarios",
            "smoke,leveling,salary",
            "--iterations",
            "1",
            "--seeds",
            "1,2",
            "--output",
        ])
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("TaskForge Scenario Tester"));

    let content = std::fs::read_to_string(output_path).expect("read report");
    let report: serde_json::Value = serde_json::from_str(&content).expect("json report");
    assert_eq!(report["total"], 6);
    assert_eq!(report["failed"], 0);
}

#[test]
fn cli_exits_with_failure_for_broken_config() {
    let exe = env!("CARGO_BIN_EXE_taskforge-tester");
    let config_path = temp_path("config.json");
    std::fs::write(&config_path, r#"{"leveling": {"multiplier": 0.5}}"#).expect("write config");
    let output = Command::new(exe)
        .args(["--scenarios", "smoke", "--iterations", "1", "--config"])
        .arg(&config_path)
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid config"), "{stderr}");
}
