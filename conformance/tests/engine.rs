//! Engine behaviour tests.
//!
//! One trial per scenario. Demo suites defined here are registered through
//! `Catalog::from_registrations` only, so they never leak into the builtin
//! catalog.
//!
//! Run with:
//!   cargo nextest run -p fhir-conformance --test engine

use std::fmt::Debug;

use fhir_conformance::client::interaction;
use fhir_conformance::engine::EngineError;
use fhir_conformance::export::{self, ExportFormat};
use fhir_conformance::harness::{self, SETUP_FAILED_MESSAGE};
use fhir_conformance::memory::{self, MemoryServer};
use fhir_conformance::report::Summary;
use fhir_conformance::resource::TypeDescriptor;
use fhir_conformance::{
    Catalog, Category, ExecutionMode, FhirClient, FhirVersion, Message, Requirement, Session,
    Signal, Status, Suite, SuiteEngine, SuiteInfo, SuiteRegistration, TestCase, TestResult,
    Verdict, conformance_test,
};
use libtest_mimic::{Arguments, Failed, Trial};

fn main() {
    let args = Arguments::from_args();

    let trials = vec![
        Trial::test("assertion_failure_is_reported", assertion_failure_is_reported),
        Trial::test("warning_demotes_failure", warning_demotes_failure),
        Trial::test("first_signal_wins", first_signal_wins),
        Trial::test("skip_reports_description", skip_reports_description),
        Trial::test("returned_verdict_is_merged", returned_verdict_is_merged),
        Trial::test("panic_becomes_error", panic_becomes_error),
        Trial::test("accumulators_are_isolated", accumulators_are_isolated),
        Trial::test("setup_failure_skips_every_test", setup_failure_skips_every_test),
        Trial::test("setup_panic_skips_every_test", setup_panic_skips_every_test),
        Trial::test("teardown_panic_is_contained", teardown_panic_is_contained),
        Trial::test("fresh_suite_value_per_run", fresh_suite_value_per_run),
        Trial::test("suite_panic_is_isolated", suite_panic_is_isolated),
        Trial::test("keys_are_suffixed_per_resource", keys_are_suffixed_per_resource),
        Trial::test("metadata_capture_has_no_side_effects", metadata_capture_has_no_side_effects),
        Trial::test("failed_capture_keeps_selection", failed_capture_keeps_selection),
        Trial::test("capability_filter_drops_unsupported_tests", capability_filter_drops_unsupported_tests),
        Trial::test("capability_filter_drops_empty_selections", capability_filter_drops_empty_selections),
        Trial::test("version_filter_drops_suites", version_filter_drops_suites),
        Trial::test("builtin_suites_pass_against_reference_server", builtin_suites_pass_against_reference_server),
        Trial::test("misbehaving_server_fails_tests", misbehaving_server_fails_tests),
        Trial::test("interop_skips_without_secondary", interop_skips_without_secondary),
        Trial::test("run_single_test_by_key", run_single_test_by_key),
        Trial::test("exports_render_builtin_metadata", exports_render_builtin_metadata),
    ];

    libtest_mimic::run(&args, trials).exit();
}

// =============================================================================
// Helpers
// =============================================================================

fn ensure(condition: bool, message: impl Into<String>) -> Result<(), Failed> {
    if condition {
        Ok(())
    } else {
        Err(Failed::from(message.into()))
    }
}

fn ensure_eq<T: PartialEq + Debug>(expected: T, actual: T, what: &str) -> Result<(), Failed> {
    ensure(
        expected == actual,
        format!("{}: expected {:?}, got {:?}", what, expected, actual),
    )
}

fn demo_info(id: &'static str) -> SuiteInfo {
    SuiteInfo {
        id,
        description: "Demo suite",
        details: &[],
        tags: &["demo"],
        category: Category::new("demo", "Demo"),
        supported_versions: &FhirVersion::ALL,
    }
}

fn engine_with(registrations: Vec<SuiteRegistration>) -> SuiteEngine {
    SuiteEngine::new(
        Catalog::from_registrations(registrations),
        &memory::document_types(),
    )
}

fn builtin_engine() -> SuiteEngine {
    SuiteEngine::new(Catalog::builtin(), &memory::document_types())
}

fn run_case<S: Suite>(suite: &mut S, key: &str) -> Result<TestResult, Failed> {
    let case = S::tests()
        .iter()
        .find(|c| c.key == key)
        .ok_or_else(|| Failed::from(format!("no test {}", key)))?;
    Ok(harness::run_test(suite, case, ExecutionMode::Live, false, None))
}

fn find<'r>(results: &'r [TestResult], key: &str) -> Result<&'r TestResult, Failed> {
    results
        .iter()
        .find(|r| r.key() == key)
        .ok_or_else(|| Failed::from(format!("no result for {}", key)))
}

// =============================================================================
// Demo suites
// =============================================================================

struct Basic;

impl Suite for Basic {
    const ID: &'static str = "basic";

    fn info() -> SuiteInfo {
        demo_info(Self::ID)
    }

    fn new(_resource_type: Option<&str>) -> Self {
        Basic
    }

    fn tests() -> &'static [TestCase<Self>] {
        BASIC
    }
}

static BASIC: &[TestCase<Basic>] = &[
    conformance_test!("B001", "Math is broken", |_suite, ctx| {
        ctx.assert(1 == 2, "math is broken")?;
        Ok(None)
    }),
    conformance_test!("B002", "Minor issue", |_suite, ctx| {
        ctx.warning(|ctx| ctx.assert(1 == 2, "minor issue"))?;
        Ok(None)
    }),
    conformance_test!("B003", "Declares evidence", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link("http://hl7.org/fhir/http.html")
                .requires(Requirement::resource("Patient", &["read"]))
                .validates(Requirement::system(&["batch"]));
        })?;
        ctx.warning(|ctx| ctx.assert(false, "noted"))?;
        Ok(None)
    }),
    conformance_test!("B004", "Declares nothing", |_suite, _ctx| { Ok(None) }),
    conformance_test!("B005", "Two failures", |_suite, ctx| {
        ctx.assert(false, "first")?;
        ctx.assert(false, "second")?;
        Ok(None)
    }),
    conformance_test!("B006", "Needs a fixture", |_suite, ctx| {
        ctx.skip_unless(false, "fixture missing")?;
        ctx.assert(false, "never reached")?;
        Ok(None)
    }),
    conformance_test!("B007", "Returns a verdict", |_suite, ctx| {
        ctx.update(Status::Pass, Some("interim".into()), None);
        Ok(Some(Verdict::fail(vec![
            "line one".to_string(),
            "line two".to_string(),
        ])))
    }),
    conformance_test!("B008", "Panics", |_suite, _ctx| {
        let values: Vec<u32> = Vec::new();
        if values.is_empty() {
            panic!("boom");
        }
        Ok(None)
    }),
    conformance_test!("B009", "Error after update", |_suite, ctx| {
        ctx.update(Status::Pass, Some("fine so far".into()), None);
        Err(Signal::error("collaborator exploded"))
    }),
];

struct Broken;

impl Suite for Broken {
    const ID: &'static str = "broken";

    fn info() -> SuiteInfo {
        demo_info(Self::ID)
    }

    fn new(_resource_type: Option<&str>) -> Self {
        Broken
    }

    fn tests() -> &'static [TestCase<Self>] {
        BROKEN
    }

    fn setup(&mut self, _session: &mut Session) -> Result<(), Signal> {
        Err(Signal::fail("fixture could not be created"))
    }
}

static BROKEN: &[TestCase<Broken>] = &[
    conformance_test!("SF01", "Would pass", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link("http://example.org/would-pass");
        })?;
        Ok(None)
    }),
    conformance_test!("SF02", "Would fail", |_suite, ctx| {
        ctx.assert(false, "nope")?;
        Ok(None)
    }),
    conformance_test!("SF03", "Would skip", |_suite, ctx| {
        ctx.skip_if(true, "not applicable")?;
        Ok(None)
    }),
];

struct PanickySetup;

impl Suite for PanickySetup {
    const ID: &'static str = "panicky-setup";

    fn info() -> SuiteInfo {
        demo_info(Self::ID)
    }

    fn new(_resource_type: Option<&str>) -> Self {
        PanickySetup
    }

    fn tests() -> &'static [TestCase<Self>] {
        PANICKY_SETUP
    }

    fn setup(&mut self, _session: &mut Session) -> Result<(), Signal> {
        panic!("setup blew up");
    }
}

static PANICKY_SETUP: &[TestCase<PanickySetup>] = &[conformance_test!(
    "PS01",
    "Would pass",
    |_suite, _ctx| { Ok(None) }
)];

struct Messy {
    torn_down: bool,
}

impl Suite for Messy {
    const ID: &'static str = "messy";

    fn info() -> SuiteInfo {
        demo_info(Self::ID)
    }

    fn new(_resource_type: Option<&str>) -> Self {
        Messy { torn_down: false }
    }

    fn tests() -> &'static [TestCase<Self>] {
        MESSY
    }

    fn teardown(&mut self, _session: &mut Session) {
        self.torn_down = true;
        panic!("teardown blew up");
    }
}

static MESSY: &[TestCase<Messy>] = &[conformance_test!(
    "MT01",
    "Passes before teardown",
    |suite, ctx| {
        ctx.assert(!suite.torn_down, "teardown ran early")?;
        Ok(None)
    }
)];

struct Counter {
    calls: u32,
}

impl Suite for Counter {
    const ID: &'static str = "counter";

    fn info() -> SuiteInfo {
        demo_info(Self::ID)
    }

    fn new(_resource_type: Option<&str>) -> Self {
        Counter { calls: 0 }
    }

    fn tests() -> &'static [TestCase<Self>] {
        COUNTER
    }
}

static COUNTER: &[TestCase<Counter>] = &[
    conformance_test!("C001", "First call", |suite, ctx| {
        suite.calls += 1;
        ctx.assert_eq(1, suite.calls, "calls")?;
        Ok(None)
    }),
    conformance_test!("C002", "Second call", |suite, ctx| {
        suite.calls += 1;
        ctx.assert_eq(2, suite.calls, "calls")?;
        Ok(None)
    }),
];

struct Exploding;

impl Suite for Exploding {
    const ID: &'static str = "exploding";

    fn info() -> SuiteInfo {
        demo_info(Self::ID)
    }

    fn new(_resource_type: Option<&str>) -> Self {
        panic!("suite cannot be built");
    }

    fn tests() -> &'static [TestCase<Self>] {
        EXPLODING
    }
}

static EXPLODING: &[TestCase<Exploding>] = &[
    conformance_test!("EX01", "Never runs", |_suite, _ctx| { Ok(None) }),
    conformance_test!("EX02", "Never runs either", |_suite, _ctx| { Ok(None) }),
];

struct PerType {
    resource_type: String,
}

impl Suite for PerType {
    const ID: &'static str = "per-type";
    const RESOURCE_PARAMETERIZED: bool = true;

    fn info() -> SuiteInfo {
        demo_info(Self::ID)
    }

    fn new(resource_type: Option<&str>) -> Self {
        PerType {
            resource_type: resource_type.unwrap_or_default().to_string(),
        }
    }

    fn tests() -> &'static [TestCase<Self>] {
        PER_TYPE
    }

    fn resource_type(&self) -> Option<&str> {
        Some(self.resource_type.as_str())
    }
}

static PER_TYPE: &[TestCase<PerType>] = &[conformance_test!(
    "T001",
    "Knows its type",
    |suite, ctx| {
        ctx.assert(!suite.resource_type.is_empty(), "no resource type")?;
        Ok(None)
    }
)];

// =============================================================================
// Signals
// =============================================================================

fn assertion_failure_is_reported() -> Result<(), Failed> {
    let result = run_case(&mut Basic, "B001")?;
    ensure_eq(Status::Fail, result.status(), "status")?;
    ensure_eq(
        Some("math is broken".to_string()),
        result.message_text(),
        "message",
    )?;
    ensure(result.code().is_some_and(|c| c.contains("math is broken")), "code captured")
}

fn warning_demotes_failure() -> Result<(), Failed> {
    let result = run_case(&mut Basic, "B002")?;
    ensure_eq(Status::Pass, result.status(), "status")?;
    ensure_eq(&["minor issue".to_string()][..], result.warnings(), "warnings")
}

fn first_signal_wins() -> Result<(), Failed> {
    let result = run_case(&mut Basic, "B005")?;
    ensure_eq(Status::Fail, result.status(), "status")?;
    ensure_eq(Some("first".to_string()), result.message_text(), "message")?;

    let result = run_case(&mut Basic, "B009")?;
    ensure_eq(Status::Error, result.status(), "status")?;
    ensure_eq(
        Some("Fatal Error: collaborator exploded".to_string()),
        result.message_text(),
        "message",
    )?;
    ensure(result.data().is_some(), "error carries a backtrace")
}

fn skip_reports_description() -> Result<(), Failed> {
    let result = run_case(&mut Basic, "B006")?;
    ensure_eq(Status::Skip, result.status(), "status")?;
    ensure_eq(
        Some("Skipped: Needs a fixture".to_string()),
        result.message_text(),
        "message",
    )?;
    ensure_eq(Some("fixture missing"), result.data(), "data")
}

fn returned_verdict_is_merged() -> Result<(), Failed> {
    let result = run_case(&mut Basic, "B007")?;
    ensure_eq(Status::Fail, result.status(), "status")?;
    ensure_eq(
        Some(&Message::Lines(vec![
            "line one".to_string(),
            "line two".to_string(),
        ])),
        result.message(),
        "message",
    )
}

fn panic_becomes_error() -> Result<(), Failed> {
    let result = run_case(&mut Basic, "B008")?;
    ensure_eq(Status::Error, result.status(), "status")?;
    ensure_eq(
        Some("Fatal Error: boom".to_string()),
        result.message_text(),
        "message",
    )?;
    ensure(
        result.data().is_some_and(|d| d.starts_with("panicked at ")),
        "backtrace recorded as data",
    )
}

// =============================================================================
// Per-run state
// =============================================================================

fn accumulators_are_isolated() -> Result<(), Failed> {
    let engine = engine_with(vec![SuiteRegistration::of::<Basic>()]);
    let mut session = memory::session(&MemoryServer::new());
    let reports = engine.execute_all(&mut session);
    let results = &reports[0].results;

    let declared = find(results, "B003")?;
    ensure_eq(Status::Pass, declared.status(), "B003 status")?;
    ensure_eq(1, declared.links().len(), "B003 links")?;
    ensure_eq(1, declared.requires().len(), "B003 requires")?;
    ensure_eq(1, declared.validates().len(), "B003 validates")?;
    ensure_eq(1, declared.warnings().len(), "B003 warnings")?;

    let plain = find(results, "B004")?;
    ensure(plain.links().is_empty(), "B004 links leaked")?;
    ensure(plain.requires().is_empty(), "B004 requires leaked")?;
    ensure(plain.validates().is_empty(), "B004 validates leaked")?;
    ensure(plain.warnings().is_empty(), "B004 warnings leaked")?;
    ensure_eq(BASIC.len(), results.len(), "one result per test")
}

fn setup_failure_skips_every_test() -> Result<(), Failed> {
    let engine = engine_with(vec![SuiteRegistration::of::<Broken>()]);
    let mut session = memory::session(&MemoryServer::new());
    let reports = engine.execute_all(&mut session);
    let results = &reports[0].results;

    ensure_eq(3, results.len(), "results")?;
    for result in results {
        ensure_eq(Status::Skip, result.status(), result.key())?;
        ensure_eq(
            Some(SETUP_FAILED_MESSAGE.to_string()),
            result.message_text(),
            result.key(),
        )?;
    }
    ensure_eq(1, find(results, "SF01")?.links().len(), "declarations kept")
}

fn setup_panic_skips_every_test() -> Result<(), Failed> {
    let engine = engine_with(vec![SuiteRegistration::of::<PanickySetup>()]);
    let mut session = memory::session(&MemoryServer::new());
    let reports = engine.execute_all(&mut session);
    let result = find(&reports[0].results, "PS01")?;
    ensure_eq(Status::Skip, result.status(), "status")?;
    ensure_eq(
        Some(SETUP_FAILED_MESSAGE.to_string()),
        result.message_text(),
        "message",
    )
}

fn teardown_panic_is_contained() -> Result<(), Failed> {
    let engine = engine_with(vec![
        SuiteRegistration::of::<Messy>(),
        SuiteRegistration::of::<Counter>(),
    ]);
    let mut session = memory::session(&MemoryServer::new());
    let reports = engine.execute_all(&mut session);
    ensure_eq(2, reports.len(), "reports")?;
    ensure(
        Summary::of(&reports).is_clean(),
        "teardown panic must not change results",
    )
}

fn fresh_suite_value_per_run() -> Result<(), Failed> {
    let engine = engine_with(vec![SuiteRegistration::of::<Counter>()]);
    let mut session = memory::session(&MemoryServer::new());
    for run in 0..2 {
        let reports = engine.execute_all(&mut session);
        ensure(
            Summary::of(&reports).is_clean(),
            format!("run {} saw state from an earlier run", run),
        )?;
    }
    Ok(())
}

fn suite_panic_is_isolated() -> Result<(), Failed> {
    let engine = engine_with(vec![
        SuiteRegistration::of::<Exploding>(),
        SuiteRegistration::of::<Counter>(),
    ]);
    let mut session = memory::session(&MemoryServer::new());
    let reports = engine.execute_all(&mut session);
    ensure_eq(2, reports.len(), "reports")?;

    let counter = reports
        .iter()
        .find(|r| r.id == "counter")
        .ok_or("counter report missing")?;
    ensure_eq(0, counter.summary().fail + counter.summary().error, "counter failures")?;

    let exploding = reports
        .iter()
        .find(|r| r.id == "exploding")
        .ok_or("exploding report missing")?;
    ensure_eq(2, exploding.results.len(), "one result per declared test")?;
    for result in &exploding.results {
        ensure_eq(Status::Error, result.status(), result.key())?;
        ensure_eq(
            Some("Fatal Error: suite cannot be built".to_string()),
            result.message_text(),
            result.key(),
        )?;
    }
    Ok(())
}

// =============================================================================
// Expansion and metadata
// =============================================================================

fn keys_are_suffixed_per_resource() -> Result<(), Failed> {
    let engine = SuiteEngine::new(
        Catalog::from_registrations(vec![SuiteRegistration::of::<PerType>()]),
        &[
            TypeDescriptor::resource("Patient"),
            TypeDescriptor::resource("Observation"),
            TypeDescriptor::datatype("HumanName"),
        ],
    );
    let mut session = memory::session(&MemoryServer::new());
    let reports = engine.execute_all(&mut session);

    let mut keys: Vec<String> = reports
        .iter()
        .flat_map(|r| r.results.iter().map(|t| t.key().to_string()))
        .collect();
    keys.sort();
    ensure_eq(
        vec!["T001_Observation".to_string(), "T001_Patient".to_string()],
        keys,
        "keys",
    )?;

    let patient = reports
        .iter()
        .find(|r| r.resource_type.as_deref() == Some("Patient"))
        .ok_or("Patient report missing")?;
    ensure_eq(
        "Knows its type (Patient)",
        patient.results[0].description(),
        "description",
    )
}

fn metadata_capture_has_no_side_effects() -> Result<(), Failed> {
    let server = MemoryServer::new();
    let mut session = memory::session(&server)
        .with_secondary(Box::new(MemoryServer::new().with_base_url("memory://secondary")));
    let engine = builtin_engine();
    let metadata = engine.metadata();
    ensure(!metadata.is_empty(), "no metadata captured")?;
    ensure(server.requests().is_empty(), "metadata capture contacted the server")?;

    for suite in metadata {
        ensure(suite.capture_error.is_none(), format!("{} failed to capture", suite.selection.label()))?;
        for captured in &suite.tests {
            let result = &captured.result;
            ensure_eq(Status::Skip, result.status(), result.key())?;
            ensure(
                !result.requires().is_empty() || !result.validates().is_empty(),
                format!("{} declares nothing", result.key()),
            )?;
        }
    }

    // A live run makes the same declarations the capture recorded.
    let reports = engine.execute_all(&mut session);
    ensure(!server.requests().is_empty(), "live run never contacted the server")?;
    for report in &reports {
        let captured = metadata
            .iter()
            .find(|m| m.selection.suite_id == report.id && m.selection.resource_type == report.resource_type)
            .ok_or_else(|| Failed::from(format!("no metadata for {}", report.id)))?;
        ensure_eq(captured.tests.len(), report.results.len(), report.id)?;
        for live in &report.results {
            let declared = &captured
                .tests
                .iter()
                .find(|t| t.result.key() == live.key())
                .ok_or_else(|| Failed::from(format!("{} was not captured", live.key())))?
                .result;
            ensure_eq(declared.links(), live.links(), live.key())?;
            ensure_eq(declared.requires(), live.requires(), live.key())?;
            ensure_eq(declared.validates(), live.validates(), live.key())?;
        }
    }

    // Setup is not run in metadata mode, so a broken setup does not show.
    let broken = engine_with(vec![SuiteRegistration::of::<Broken>()]);
    for captured in &broken.metadata()[0].tests {
        ensure(
            captured.result.message_text().as_deref() != Some(SETUP_FAILED_MESSAGE),
            "metadata mode ran setup",
        )?;
    }

    let again = engine.metadata();
    ensure(
        std::ptr::eq(metadata, again),
        "metadata should be captured once",
    )
}

fn failed_capture_keeps_selection() -> Result<(), Failed> {
    let engine = engine_with(vec![
        SuiteRegistration::of::<Exploding>(),
        SuiteRegistration::of::<Counter>(),
    ]);
    let exploding = engine
        .metadata()
        .iter()
        .find(|m| m.selection.suite_id == "exploding")
        .ok_or("exploding metadata missing")?;
    ensure_eq(
        Some("suite cannot be built"),
        exploding.capture_error.as_deref(),
        "capture error",
    )?;

    let statement = MemoryServer::new().capability_statement()?;
    let selections = engine.filter_supported(engine.selections(), &statement);
    ensure(
        selections.iter().any(|s| s.suite_id == "exploding"),
        "selection without metadata was dropped",
    )?;

    let mut session = memory::session(&MemoryServer::new());
    let reports = engine.execute(&selections, &mut session);
    let report = reports
        .iter()
        .find(|r| r.id == "exploding")
        .ok_or("exploding report missing")?;
    ensure_eq(2, report.results.len(), "one result per declared test")?;
    for result in &report.results {
        ensure_eq(Status::Error, result.status(), result.key())?;
    }
    Ok(())
}

// =============================================================================
// Filtering
// =============================================================================

fn capability_filter_drops_unsupported_tests() -> Result<(), Failed> {
    let mut server = MemoryServer::new();
    server.disable("Patient", interaction::DELETE);
    let statement = server.capability_statement()?;

    let engine = builtin_engine();
    let selections = engine.filter_supported(engine.selections(), &statement);

    let read = selections
        .iter()
        .find(|s| s.suite_id == "read")
        .ok_or("read suite dropped")?;
    let read_tests = read.tests.clone().unwrap_or_default();
    ensure(!read_tests.contains(&"R004"), "R004 needs delete")?;
    ensure(read_tests.contains(&"R001"), "R001 kept")?;

    let patient = selections
        .iter()
        .find(|s| s.suite_id == "resource" && s.resource_type.as_deref() == Some("Patient"))
        .ok_or("resource/Patient dropped")?;
    ensure(
        !patient.tests.clone().unwrap_or_default().contains(&"X060"),
        "X060 needs delete",
    )?;

    let observation = selections
        .iter()
        .find(|s| s.suite_id == "resource" && s.resource_type.as_deref() == Some("Observation"))
        .ok_or("resource/Observation dropped")?;
    ensure(
        observation.tests.clone().unwrap_or_default().contains(&"X060"),
        "Observation still supports delete",
    )
}

fn capability_filter_drops_empty_selections() -> Result<(), Failed> {
    let mut server = MemoryServer::new();
    server.disable_system(interaction::TRANSACTION);
    server.disable_system(interaction::BATCH);
    let statement = server.capability_statement()?;

    let engine = builtin_engine();
    let selections = engine.filter_supported(engine.selections(), &statement);
    ensure(
        selections.iter().all(|s| s.suite_id != "transaction"),
        "transaction suite should be dropped",
    )?;
    ensure(
        selections.iter().any(|s| s.suite_id == "read"),
        "read suite should be kept",
    )
}

fn version_filter_drops_suites() -> Result<(), Failed> {
    let engine = builtin_engine();
    let dstu2: Vec<&str> = engine
        .selections_for_version(FhirVersion::Dstu2)
        .iter()
        .map(|s| s.suite_id)
        .collect();
    ensure(!dstu2.contains(&"history"), "history needs STU3")?;
    ensure(!dstu2.contains(&"validate"), "validate needs STU3")?;
    ensure(dstu2.contains(&"read"), "read supports DSTU2")?;

    let r4 = engine.selections_for_version(FhirVersion::R4);
    ensure_eq(engine.selections().len(), r4.len(), "every suite supports R4")
}

// =============================================================================
// Against the reference server
// =============================================================================

fn builtin_suites_pass_against_reference_server() -> Result<(), Failed> {
    let server = MemoryServer::new();
    let mut session = memory::session(&server)
        .with_secondary(Box::new(MemoryServer::new().with_base_url("memory://secondary")));
    let engine = builtin_engine();
    let reports = engine.execute_all(&mut session);

    for report in &reports {
        for result in &report.results {
            ensure(
                result.status() == Status::Pass,
                format!(
                    "{} {}: {} {:?}",
                    report.id,
                    result.key(),
                    result.status(),
                    result.message_text()
                ),
            )?;
        }
    }
    ensure_eq(0, server.count("Patient"), "fixtures left behind")?;
    ensure(!server.requests().is_empty(), "server was never contacted")
}

fn misbehaving_server_fails_tests() -> Result<(), Failed> {
    let server = MemoryServer::new();
    server.inject_failure("Patient", interaction::READ, 500);
    let mut session = memory::session(&server);
    let engine = builtin_engine();
    let reports = engine.execute(
        &[fhir_conformance::Selection {
            suite_id: "read",
            resource_type: None,
            tests: None,
        }],
        &mut session,
    );
    let result = find(&reports[0].results, "R001")?;
    ensure_eq(Status::Fail, result.status(), "status")?;
    let lines = result.message().map(|m| m.lines()).unwrap_or_default();
    ensure_eq(
        Some("Bad response code: expected 200, but found 500"),
        lines.first().map(String::as_str),
        "first line",
    )?;
    ensure_eq(
        Some("error: read failed"),
        lines.get(1).map(String::as_str),
        "issue line",
    )?;
    ensure(result.data().is_some(), "response body kept as data")
}

fn interop_skips_without_secondary() -> Result<(), Failed> {
    let mut session = memory::session(&MemoryServer::new());
    let engine = builtin_engine();
    let result = engine.run_test("interop", None, "MS01", &mut session)?;
    ensure_eq(Status::Skip, result.status(), "status")?;
    ensure_eq(Some("no secondary server configured"), result.data(), "reason")
}

fn run_single_test_by_key() -> Result<(), Failed> {
    let mut session = memory::session(&MemoryServer::new());
    let engine = builtin_engine();

    let result = engine.run_test("resource", Some("Observation"), "X010", &mut session)?;
    ensure_eq("X010_Observation", result.key(), "key")?;
    ensure_eq(Status::Pass, result.status(), "status")?;

    ensure(
        matches!(
            engine.run_test("read", None, "R999", &mut session),
            Err(EngineError::UnknownTest { .. })
        ),
        "unknown key",
    )?;
    ensure(
        matches!(
            engine.run_test("resource", Some("HumanName"), "X010", &mut session),
            Err(EngineError::BadResourceType { .. })
        ),
        "datatypes are not resources",
    )?;
    ensure(
        matches!(
            engine.run_test("nope", None, "R001", &mut session),
            Err(EngineError::UnknownSuite(_))
        ),
        "unknown suite",
    )
}

fn exports_render_builtin_metadata() -> Result<(), Failed> {
    let engine = builtin_engine();
    let metadata = engine.metadata();

    let tcl = export::export(metadata, ExportFormat::Tcl)?;
    ensure(tcl.contains("suite read \"Read interaction\""), "tcl suite header")?;
    ensure(tcl.contains("  test R002 \"Read a Patient that does not exist\""), "tcl test")?;
    ensure(tcl.contains("    validates Patient read"), "tcl validates")?;

    let json = export::export(metadata, ExportFormat::TestScript)?;
    let documents = export::testscript::documents(metadata);
    ensure_eq(metadata.len(), documents.len(), "one document per selection")?;
    ensure(json.contains("\"resource-Patient\""), "parameterized document id")
}
