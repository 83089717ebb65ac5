//! CLI tests.
//!
//! Spawns the `fhir-conformance` binary and checks its listings, exit codes
//! and reports. One trial per listed test checks that the listing is
//! complete; the rest exercise whole commands.
//!
//! Run with:
//!   cargo nextest run -p fhir-conformance --test cli

use std::path::PathBuf;
use std::process::{Command, Output};

use facet::Facet;
use libtest_mimic::{Arguments, Failed, Trial};

/// Test case from `list --format json`.
#[derive(Facet)]
struct TestCase {
    suite: String,
    key: String,
    description: String,
    resource_type: Option<String>,
    links: Vec<String>,
    requires: Vec<String>,
    validates: Vec<String>,
}

/// Summary counts from `run --format json`.
#[derive(Facet)]
struct SummaryJson {
    pass: usize,
    fail: usize,
    skip: usize,
    error: usize,
}

/// One suite report from `run --format json`.
#[derive(Facet)]
struct ReportJson {
    suite: String,
    resource_type: Option<String>,
    summary: SummaryJson,
}

fn main() {
    let args = Arguments::from_args();

    let mut trials = vec![
        Trial::test("cli.list_text", list_text),
        Trial::test("cli.unknown_suite_exits_2", unknown_suite_exits_2),
        Trial::test("cli.run_passes", run_passes),
        Trial::test("cli.run_with_capabilities", run_with_capabilities),
        Trial::test("cli.run_single_version", run_single_version),
        Trial::test("cli.run_uses_declared_version", run_uses_declared_version),
        Trial::test("cli.export_tcl", export_tcl),
        Trial::test("cli.bad_export_format_exits_2", bad_export_format_exits_2),
    ];

    match list_tests() {
        Ok(tests) => {
            eprintln!("Found {} test cases", tests.len());
            trials.extend(tests.into_iter().map(|test| {
                let name = format!("listed.{}.{}", test.suite, test.key);
                Trial::test(name, move || check_listed(&test))
            }));
        }
        Err(e) => {
            eprintln!("Warning: could not list tests ({e:?})");
        }
    }

    libtest_mimic::run(&args, trials).exit();
}

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fhir-conformance"))
}

fn run(args: &[&str]) -> Result<Output, Failed> {
    Command::new(binary())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .map_err(|e| Failed::from(format!("failed to spawn fhir-conformance: {}", e)))
}

fn exit_code(output: &Output) -> Option<i32> {
    output.status.code()
}

fn list_tests() -> Result<Vec<TestCase>, Failed> {
    let output = run(&["list", "--format", "json"])?;
    if !output.status.success() {
        return Err(Failed::from(format!(
            "list failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    facet_json::from_slice(&output.stdout)
        .map_err(|e| Failed::from(format!("failed to parse test list: {}", e)))
}

fn check_listed(test: &TestCase) -> Result<(), Failed> {
    if test.description.is_empty() {
        return Err(format!("{} has no description", test.key).into());
    }
    if test.requires.is_empty() && test.validates.is_empty() {
        return Err(format!("{} declares no capability", test.key).into());
    }
    if let Some(resource_type) = &test.resource_type
        && !test.key.ends_with(&format!("_{}", resource_type))
    {
        return Err(format!("{} is not suffixed with {}", test.key, resource_type).into());
    }
    if test.links.iter().any(|l| !l.starts_with("http")) {
        return Err(format!("{} has a malformed link", test.key).into());
    }
    Ok(())
}

fn list_text() -> Result<(), Failed> {
    let output = run(&["list", "--show-requirements", "--suite", "read"])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if exit_code(&output) != Some(0) {
        return Err(format!("exit code {:?}", exit_code(&output)).into());
    }
    if !stdout.contains("## read (Read interaction)") {
        return Err(format!("missing suite header:\n{}", stdout).into());
    }
    if !stdout.contains("R001  Read an existing Patient [requires: Patient:[create]]") {
        return Err(format!("missing R001 line:\n{}", stdout).into());
    }
    if stdout.contains("## resource/") {
        return Err("--suite did not filter".into());
    }
    Ok(())
}

fn unknown_suite_exits_2() -> Result<(), Failed> {
    let output = run(&["run", "--suite", "no-such-suite"])?;
    if exit_code(&output) != Some(2) {
        return Err(format!("expected exit 2, got {:?}", exit_code(&output)).into());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.contains("unknown suite: no-such-suite") {
        return Err(format!("unexpected stderr: {}", stderr).into());
    }
    Ok(())
}

fn run_reports(args: &[&str]) -> Result<(Option<i32>, Vec<ReportJson>), Failed> {
    let output = run(args)?;
    let reports: Vec<ReportJson> = facet_json::from_slice(&output.stdout).map_err(|e| {
        Failed::from(format!(
            "failed to parse reports: {}\nstderr: {}",
            e,
            String::from_utf8_lossy(&output.stderr)
        ))
    })?;
    Ok((exit_code(&output), reports))
}

fn run_passes() -> Result<(), Failed> {
    let (code, reports) = run_reports(&["run", "--format", "json", "--interop"])?;
    if code != Some(0) {
        return Err(format!("expected exit 0, got {:?}", code).into());
    }
    let failing: Vec<String> = reports
        .iter()
        .filter(|r| r.summary.fail + r.summary.error > 0)
        .map(|r| r.suite.clone())
        .collect();
    if !failing.is_empty() {
        return Err(format!("failing suites: {:?}", failing).into());
    }
    let passed: usize = reports.iter().map(|r| r.summary.pass).sum();
    if passed == 0 {
        return Err("nothing passed".into());
    }
    let skipped: usize = reports.iter().map(|r| r.summary.skip).sum();
    if skipped != 0 {
        return Err(format!("{} tests skipped with --interop", skipped).into());
    }
    Ok(())
}

/// Run with a capability statement written to a temporary file.
fn run_with_statement(name: &str, statement: &str) -> Result<(Option<i32>, Vec<ReportJson>), Failed> {
    let path = std::env::temp_dir().join(format!("fhir-{}-{}.json", name, std::process::id()));
    std::fs::write(&path, statement).map_err(|e| Failed::from(e.to_string()))?;

    let path_arg = path.to_string_lossy().to_string();
    let result = run_reports(&["run", "--format", "json", "--capabilities", &path_arg]);
    let _ = std::fs::remove_file(&path);
    result
}

fn run_with_capabilities() -> Result<(), Failed> {
    let statement = r#"{"fhir_version":"4.0.1","resources":[{"resource_type":"Patient","interactions":["create","read"]}],"system":[]}"#;
    let (code, reports) = run_with_statement("capabilities", statement)?;

    if code != Some(0) {
        return Err(format!("expected exit 0, got {:?}", code).into());
    }
    if reports.iter().any(|r| r.suite == "transaction" || r.suite == "validate") {
        return Err("unsupported suites were run".into());
    }
    if reports
        .iter()
        .any(|r| r.suite == "resource" && r.resource_type.as_deref() != Some("Patient"))
    {
        return Err("resource suite ran for undeclared types".into());
    }
    if !reports.iter().any(|r| r.suite == "read") {
        return Err("read suite missing".into());
    }
    Ok(())
}

fn run_single_version() -> Result<(), Failed> {
    let (code, reports) = run_reports(&["run", "--format", "json", "--fhir-version", "1.0.2"])?;
    if code != Some(0) {
        return Err(format!("expected exit 0, got {:?}", code).into());
    }
    if reports.iter().any(|r| r.suite == "history") {
        return Err("history does not support DSTU2".into());
    }
    Ok(())
}

fn run_uses_declared_version() -> Result<(), Failed> {
    let statement = r#"{"fhir_version":"1.0.2","resources":[{"resource_type":"Patient","interactions":["create","read","vread","update","delete","search-type","history-instance","history-type","validate"]}],"system":["transaction","batch"]}"#;
    let (code, reports) = run_with_statement("dstu2", statement)?;
    if code != Some(0) {
        return Err(format!("expected exit 0, got {:?}", code).into());
    }
    if reports.iter().any(|r| r.suite == "history" || r.suite == "validate") {
        return Err("STU3 suites ran against a DSTU2 server".into());
    }
    if !reports.iter().any(|r| r.suite == "read") {
        return Err("read suite missing".into());
    }
    Ok(())
}

fn export_tcl() -> Result<(), Failed> {
    let output = run(&["export", "--format", "tcl", "--suite", "transaction"])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if exit_code(&output) != Some(0) {
        return Err(format!("exit code {:?}", exit_code(&output)).into());
    }
    for expected in [
        "suite transaction \"Transaction and batch\"",
        "  test TR01 \"Transaction creates every entry\"",
        "    validates system transaction",
        "    code {",
    ] {
        if !stdout.contains(expected) {
            return Err(format!("missing {:?} in:\n{}", expected, stdout).into());
        }
    }
    Ok(())
}

fn bad_export_format_exits_2() -> Result<(), Failed> {
    let output = run(&["export", "--format", "yaml"])?;
    if exit_code(&output) != Some(2) {
        return Err(format!("expected exit 2, got {:?}", exit_code(&output)).into());
    }
    Ok(())
}
