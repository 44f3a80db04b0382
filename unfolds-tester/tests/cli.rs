use std::path::PathBuf;
use std::process::Command;

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "unfolds-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn tester() -> Command {
    Command::new(env!("CARGO_BIN_EXE_unfolds-tester"))
}

#[test]
fn cli_list_scenarios_writes_output() {
    let output_path = temp_path("list");
    let status = tester()
        .args(["--list-scenarios", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(&output_path).expect("read output");
    assert!(content.contains("Available scenarios"));
    for key in ["smoke", "claim-flow", "window-boundaries", "limited-capacity"] {
        assert!(content.contains(key), "missing {key}");
    }
}

#[test]
fn cli_runs_all_scenarios_on_bundled_stories() {
    let output_path = temp_path("all");
    let output = tester()
        .args([
            "--scenarios",
            "all",
            "--now",
            "2024-06-15T12:00:00Z",
            "--seeds",
            "1,2",
            "--report",
            "json",
            "--output",
        ])
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let body = std::fs::read_to_string(&output_path).expect("read report");
    let results: serde_json::Value = serde_json::from_str(&body).expect("json report");
    let results = results.as_array().expect("array");
    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|r| r["passed"] == true));
}

#[test]
fn cli_loads_story_files_from_disk() {
    let story_path = temp_path("story.json");
    std::fs::write(
        &story_path,
        r#"{"story":{"name":"Pier Loop"},"steps":[
            {"name":"Pier 17","coordinates":{"x":40.7056,"y":-74.0023},
             "claimingRadius":60,"reward":{"enabled":true,"limited":true,"quantity":2,"claimedCount":0}}
        ]}"#,
    )
    .expect("write story");
    let output_path = temp_path("story-report");
    let output = tester()
        .args(["--scenarios", "claim-flow,limited-capacity", "--report", "markdown", "--story"])
        .arg(&story_path)
        .arg("--output")
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report = std::fs::read_to_string(&output_path).expect("read report");
    assert!(report.contains("- **Passed**: 2"));
}

#[test]
fn cli_rejects_invalid_story_files() {
    let story_path = temp_path("broken.json");
    std::fs::write(&story_path, r#"{"hello":"world"}"#).expect("write story");
    let output = tester()
        .arg("--story")
        .arg(&story_path)
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("story files failed validation"));
}

#[test]
fn cli_rejects_malformed_location() {
    let output = tester().args(["--at", "somewhere"]).output().expect("run cli");
    assert!(!output.status.success());
}
