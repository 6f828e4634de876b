use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("payrecon"));
    cmd.arg("tests/fixtures/success.csv")
        .args(["--proposal-id", "P1"])
        .args(["--invoice-id", "INV-7"])
        .args(["--payment-url", "https://pay.example/P1"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"success""#))
        .stdout(predicate::str::contains(
            r#""redirects":[{"path":"/proposal","params":{"invoiceId":"INV-7","proposalId":"P1"}}]"#,
        ))
        .stdout(predicate::str::contains(r#""type":"PARENT_READY""#));

    Ok(())
}

#[test]
fn test_untrusted_origin_changes_nothing() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "at_ms,event,origin,payload").unwrap();
    writeln!(
        file,
        r#"0,message,https://evil.example,"{{""type"":""PAYMENT_STATUS"",""status"":""success""}}""#
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("payrecon"));
    cmd.arg(file.path())
        .args(["--proposal-id", "P1"])
        .args(["--payment-url", "https://pay.example/P1"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"pending""#))
        .stdout(predicate::str::contains(r#""redirects":[]"#));
}

#[test]
fn test_backend_failure_is_terminal_without_redirect() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "at_ms,event,origin,payload").unwrap();
    writeln!(file, "0,check,,").unwrap();

    let mut cmd = Command::new(cargo_bin!("payrecon"));
    cmd.arg(file.path())
        .args(["--proposal-id", "P1"])
        .args(["--payment-url", "https://pay.example/P1"])
        .args(["--backend", "failed"])
        .args(["--settle-ms", "100"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"failed""#))
        .stdout(predicate::str::contains(r#""redirects":[]"#))
        .stdout(predicate::str::contains(r#""verifications":1"#));
}

#[test]
fn test_unreachable_backend_falls_back_to_pending() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "at_ms,event,origin,payload").unwrap();
    writeln!(file, "0,check,,").unwrap();

    let mut cmd = Command::new(cargo_bin!("payrecon"));
    cmd.arg(file.path())
        .args(["--proposal-id", "P1"])
        .args(["--payment-url", "https://pay.example/P1"])
        .args(["--backend", "unavailable"])
        .args(["--settle-ms", "100"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"pending""#))
        .stdout(predicate::str::contains("backend unreachable"));
}

#[test]
fn test_malformed_rows_are_reported_and_skipped() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "at_ms,event,origin,payload").unwrap();
    writeln!(file, "soon,teleport,,").unwrap();
    writeln!(file, "0,resize,,800").unwrap();
    writeln!(file, r#"5,message,https://pay.example,"{{""type"":""PAYMENT_STARTED""}}""#).unwrap();

    let mut cmd = Command::new(cargo_bin!("payrecon"));
    cmd.arg(file.path())
        .args(["--proposal-id", "P1"])
        .args(["--payment-url", "https://pay.example/P1"])
        .args(["--settle-ms", "50"]);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading event"))
        .stdout(predicate::str::contains(r#""status":"processing""#));
}

#[test]
fn test_missing_payment_context_fails() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "at_ms,event,origin,payload").unwrap();

    let mut cmd = Command::new(cargo_bin!("payrecon"));
    cmd.arg(file.path()).args(["--payment-url", "https://pay.example/P1"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("proposalId"));
}

#[test]
fn test_message_lands_while_check_is_running() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "at_ms,event,origin,payload").unwrap();
    writeln!(file, "0,check,,").unwrap();
    writeln!(
        file,
        r#"100,message,https://pay.example,"{{""type"":""PAYMENT_STATUS"",""status"":""success""}}""#
    )
    .unwrap();

    // Success at 100 ms redirects at 2.1 s; the check finishes at 1.5 s, then 1.2 s settle.
    let mut cmd = Command::new(cargo_bin!("payrecon"));
    cmd.arg(file.path())
        .args(["--proposal-id", "P1"])
        .args(["--payment-url", "https://pay.example/P1"])
        .args(["--backend", "pending"])
        .args(["--settle-ms", "1200"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"success""#))
        .stdout(predicate::str::contains(
            r#""redirects":[{"path":"/proposal","params":{"proposalId":"P1"}}]"#,
        ))
        .stdout(predicate::str::contains(r#""verifications":1"#));
}
