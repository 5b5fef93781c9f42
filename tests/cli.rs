use assert_cmd::prelude::*;
use assert_cmd::Command;

#[test]
fn cli_sample_routes_to_completion() {
    let mut cmd = Command::cargo_bin("pokerpilot").expect("binary exists");
    cmd.arg("--no-color")
        .arg("sample")
        .arg("--seed")
        .arg("7")
        .arg("--count")
        .arg("3");

    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Decision"))
        .stdout(predicates::str::contains("Summary"));
}

#[test]
fn cli_decides_situation_from_stdin() {
    let situation = r#"{
        "hole_cards": ["As", "Kd"],
        "board": [],
        "pot": 6.0,
        "to_call": 2.0,
        "big_blind": 2.0,
        "position": "button",
        "players": [{"stack": 100.0}, {"stack": 120.0}]
    }"#;

    let mut cmd = Command::cargo_bin("pokerpilot").expect("binary exists");
    cmd.arg("--no-color").arg("decide").arg("-").write_stdin(situation);

    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Decision"));
}

#[test]
fn cli_rejects_malformed_situation() {
    let mut cmd = Command::cargo_bin("pokerpilot").expect("binary exists");
    cmd.arg("--no-color")
        .arg("decide")
        .arg("-")
        .write_stdin("{\"hole_cards\": []}");

    cmd.assert().failure();
}
