//! Suite contract.
//!
//! A suite is a type implementing [`Suite`]: static descriptive metadata, an
//! ordered list of test cases, and per-run state held in the value itself.
//! A fresh value is built with [`Suite::new`] for every run, so nothing a
//! run leaves behind is seen by the next one.

use tracing::{debug, warn};

use crate::capability::FhirVersion;
use crate::harness::{self, ExecutionMode, Session, guarded};
use crate::result::TestResult;
use crate::signal::Signal;
use crate::testcase::TestCase;

/// Grouping used by listings and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub id: &'static str,
    pub title: &'static str,
}

impl Category {
    pub const fn new(id: &'static str, title: &'static str) -> Self {
        Self { id, title }
    }
}

/// Descriptive metadata of a suite.
#[derive(Debug, Clone, Copy)]
pub struct SuiteInfo {
    pub id: &'static str,
    pub description: &'static str,
    /// Ordered section name / text pairs.
    pub details: &'static [(&'static str, &'static str)],
    pub tags: &'static [&'static str],
    pub category: Category,
    pub supported_versions: &'static [FhirVersion],
}

impl SuiteInfo {
    pub fn supports_version(&self, version: FhirVersion) -> bool {
        self.supported_versions.contains(&version)
    }
}

/// A named collection of tests run against one server.
pub trait Suite: Sized + 'static {
    const ID: &'static str;

    /// Whether the suite is instantiated once per resource type.
    const RESOURCE_PARAMETERIZED: bool = false;

    fn info() -> SuiteInfo;

    /// A fresh suite value. `resource_type` is set for parameterized suites.
    fn new(resource_type: Option<&str>) -> Self;

    /// Declared tests, in execution order.
    fn tests() -> &'static [TestCase<Self>];

    /// Establish fixtures. An `Err` marks setup as failed; every test of the
    /// run is then reported as skipped.
    fn setup(&mut self, _session: &mut Session) -> Result<(), Signal> {
        Ok(())
    }

    /// Remove fixtures. Failures here are logged and otherwise ignored.
    fn teardown(&mut self, _session: &mut Session) {}

    fn resource_type(&self) -> Option<&str> {
        None
    }

    /// Appended in parentheses to every test description.
    fn description_suffix(&self) -> Option<String> {
        self.resource_type().map(str::to_string)
    }
}

/// A metadata-mode result together with the unsuffixed key of its test.
#[derive(Debug, Clone)]
pub struct CapturedTest {
    pub base_key: &'static str,
    pub result: TestResult,
}

/// Run the suite live: setup, the selected tests in declaration order, then
/// teardown. `only` restricts the run to the given base keys.
pub fn run_suite<S: Suite>(
    resource_type: Option<&str>,
    session: &mut Session,
    only: Option<&[&'static str]>,
) -> Vec<TestResult> {
    let mut suite = S::new(resource_type);

    let setup_failed = match guarded(|| suite.setup(session)) {
        Ok(Ok(())) => false,
        Ok(Err(signal)) => {
            warn!(suite = S::ID, resource = ?resource_type, %signal, "setup failed");
            true
        }
        Err(panic) => {
            warn!(suite = S::ID, resource = ?resource_type, panic = %panic.message, "setup panicked");
            true
        }
    };

    let mut results = Vec::new();
    for case in S::tests() {
        if let Some(keys) = only
            && !keys.contains(&case.key)
        {
            continue;
        }
        results.push(harness::run_test(
            &mut suite,
            case,
            ExecutionMode::Live,
            setup_failed,
            Some(&mut *session),
        ));
    }

    if let Err(panic) = guarded(|| suite.teardown(session)) {
        warn!(suite = S::ID, resource = ?resource_type, panic = %panic.message, "teardown panicked");
    }

    debug!(suite = S::ID, resource = ?resource_type, tests = results.len(), "suite finished");
    results
}

/// Run every test in metadata mode: no session, no setup, no teardown.
pub fn capture_metadata<S: Suite>(resource_type: Option<&str>) -> Vec<CapturedTest> {
    let mut suite = S::new(resource_type);
    S::tests()
        .iter()
        .map(|case| CapturedTest {
            base_key: case.key,
            result: harness::run_test(&mut suite, case, ExecutionMode::Metadata, false, None),
        })
        .collect()
}

/// Base keys of every declared test.
pub fn test_keys<S: Suite>() -> Vec<&'static str> {
    S::tests().iter().map(|case| case.key).collect()
}
