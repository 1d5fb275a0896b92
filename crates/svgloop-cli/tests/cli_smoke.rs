use assert_cmd::prelude::*;
use std::process::Command;

fn svgloop() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo_bin!("svgloop"));
    for var in [
        "ANTHROPIC_API_KEY",
        "OPENAI_API_KEY",
        "OPENROUTER_API_KEY",
        "GOOGLE_API_KEY",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn parallel_requires_batch() {
    let tmp = tempfile::tempdir().expect("tempdir");
    svgloop()
        .args(["in.png", "out.svg", "--parallel"])
        .current_dir(tmp.path())
        .assert()
        .code(2);
}

#[test]
fn out_of_range_values_are_usage_errors() {
    svgloop()
        .args(["in.png", "out.svg", "--max-iterations", "0"])
        .assert()
        .code(2);
    svgloop()
        .args(["in.png", "out.svg", "--quality-threshold", "1.5"])
        .assert()
        .code(2);
    svgloop()
        .args(["in.png", "out.svg", "--provider", "watson"])
        .assert()
        .code(2);
}

#[test]
fn cost_estimate_needs_no_credentials() {
    let output = svgloop()
        .args([
            "in.png",
            "out.svg",
            "--provider",
            "anthropic",
            "--max-iterations",
            "5",
            "--estimate-cost",
        ])
        .output()
        .expect("run svgloop");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Estimated cost: $"), "{stdout}");

    let output = svgloop()
        .args(["in.png", "out.svg", "--provider", "ollama", "--estimate-cost"])
        .output()
        .expect("run svgloop");
    assert!(String::from_utf8_lossy(&output.stdout).contains("free"));
}

#[test]
fn missing_api_key_is_a_configuration_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let output = svgloop()
        .args(["in.png", "out.svg", "--provider", "anthropic"])
        .current_dir(tmp.path())
        .output()
        .expect("run svgloop");
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ANTHROPIC_API_KEY"));
    assert!(!tmp.path().join("out.svg").exists());
}

#[test]
fn missing_input_fails_before_any_model_call() {
    let tmp = tempfile::tempdir().expect("tempdir");
    // Nothing listens on this port; the run must stop at input validation.
    svgloop()
        .args([
            "missing.png",
            "out.svg",
            "--provider",
            "ollama",
            "--base-url",
            "http://127.0.0.1:9/v1",
        ])
        .current_dir(tmp.path())
        .assert()
        .code(2);
    assert!(!tmp.path().join("out.svg").exists());
}

#[test]
fn config_file_values_are_used_and_validated() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = tmp.path().join("svgloop.yaml");
    std::fs::write(&config, "provider: ollama\nmax_iterations: 500\n").expect("write config");
    svgloop()
        .args(["in.png", "out.svg", "--estimate-cost", "--config"])
        .arg(&config)
        .assert()
        .code(2);
}

#[test]
fn stopped_batch_exits_nonzero() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let inputs = tmp.path().join("in");
    std::fs::create_dir(&inputs).expect("mkdir");
    std::fs::write(inputs.join("a.png"), b"not a png").expect("write a.png");
    std::fs::write(inputs.join("b.png"), b"not a png either").expect("write b.png");

    let output = svgloop()
        .arg(&inputs)
        .arg(tmp.path().join("out"))
        .args([
            "--batch",
            "--provider",
            "ollama",
            "--base-url",
            "http://127.0.0.1:9",
            "--continue-on-error",
            "false",
        ])
        .output()
        .expect("run svgloop");
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Skipped: 1"), "{stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("batch stopped"), "{stderr}");
}
