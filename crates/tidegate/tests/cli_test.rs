use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_describes_the_commands() {
    let mut cmd = Command::cargo_bin("tide").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Converge a cloud scope"))
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn up_requires_a_scope() {
    let mut cmd = Command::cargo_bin("tide").unwrap();
    cmd.arg("up")
        .arg("--domain")
        .arg("shop.example.com")
        .env_remove("TIDEGATE_SCOPE")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--scope"));
}

#[test]
fn up_requires_a_domain() {
    let mut cmd = Command::cargo_bin("tide").unwrap();
    cmd.arg("up")
        .arg("--scope")
        .arg("prod-rg")
        .env_remove("TIDEGATE_DOMAIN")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--domain"));
}

#[test]
fn validate_rejects_a_url_domain() {
    let mut cmd = Command::cargo_bin("tide").unwrap();
    cmd.arg("validate")
        .arg("--scope")
        .arg("prod-rg")
        .arg("--domain")
        .arg("https://shop.example.com")
        .assert()
        .failure()
        .stdout(predicate::str::contains("bare host name"));
}
