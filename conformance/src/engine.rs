//! Suite engine.
//!
//! The engine owns the catalog of registered suites and turns it into
//! runnable [`Selection`]s: one per non-parameterized suite, and one per
//! (suite, resource type) pair for resource-parameterized suites. Metadata
//! for the whole universe is captured once and cached.

use std::cell::OnceCell;
use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::capability::{CapabilityStatement, FhirVersion};
use crate::harness::{Session, guarded};
use crate::report::SuiteReport;
use crate::resource::TypeDescriptor;
use crate::result::{Message, Status, TestResult};
use crate::suite::{self, CapturedTest, Suite, SuiteInfo};

/// A suite type erased into plain function pointers.
///
/// Submitted next to each suite with
/// `inventory::submit! { SuiteRegistration::of::<MySuite>() }`.
#[derive(Clone, Copy)]
pub struct SuiteRegistration {
    pub info: fn() -> SuiteInfo,
    pub parameterized: bool,
    pub execute: fn(Option<&str>, &mut Session, Option<&[&'static str]>) -> Vec<TestResult>,
    pub metadata: fn(Option<&str>) -> Vec<CapturedTest>,
    pub keys: fn() -> Vec<&'static str>,
}

impl SuiteRegistration {
    pub const fn of<S: Suite>() -> Self {
        Self {
            info: S::info,
            parameterized: S::RESOURCE_PARAMETERIZED,
            execute: suite::run_suite::<S>,
            metadata: suite::capture_metadata::<S>,
            keys: suite::test_keys::<S>,
        }
    }

    pub fn id(&self) -> &'static str {
        (self.info)().id
    }
}

impl std::fmt::Debug for SuiteRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRegistration")
            .field("id", &self.id())
            .field("parameterized", &self.parameterized)
            .finish()
    }
}

inventory::collect!(SuiteRegistration);

/// The set of suites an engine knows about, sorted by id.
#[derive(Debug, Clone)]
pub struct Catalog {
    suites: Vec<SuiteRegistration>,
}

impl Catalog {
    /// Every suite registered in this binary.
    pub fn builtin() -> Self {
        Self::from_registrations(inventory::iter::<SuiteRegistration>.into_iter().copied().collect())
    }

    pub fn from_registrations(mut suites: Vec<SuiteRegistration>) -> Self {
        suites.sort_by_key(|s| s.id());
        let mut unique: Vec<SuiteRegistration> = Vec::with_capacity(suites.len());
        for registration in suites {
            if unique.last().is_some_and(|kept| kept.id() == registration.id()) {
                warn!(suite = registration.id(), "duplicate suite id, keeping the first registration");
                continue;
            }
            unique.push(registration);
        }
        Self { suites: unique }
    }

    pub fn suites(&self) -> &[SuiteRegistration] {
        &self.suites
    }
}

/// One runnable unit: a suite, its resource type when parameterized, and
/// optionally a subset of its test keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub suite_id: &'static str,
    pub resource_type: Option<String>,
    /// Base keys to run; `None` runs every test.
    pub tests: Option<Vec<&'static str>>,
}

impl Selection {
    /// `suite_id` or `suite_id/ResourceType`.
    pub fn label(&self) -> String {
        match &self.resource_type {
            Some(resource_type) => format!("{}/{}", self.suite_id, resource_type),
            None => self.suite_id.to_string(),
        }
    }
}

/// Captured metadata for one selection.
#[derive(Debug, Clone)]
pub struct SuiteMetadata {
    pub selection: Selection,
    pub info: SuiteInfo,
    pub tests: Vec<CapturedTest>,
    /// Set when capture panicked; `tests` is then empty.
    pub capture_error: Option<String>,
}

/// Error type for engine lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    UnknownSuite(String),
    UnknownTest { suite: String, key: String },
    /// The suite is parameterized and no valid resource type was given, or
    /// a resource type was given for a suite that takes none.
    BadResourceType { suite: String, resource_type: Option<String> },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UnknownSuite(id) => write!(f, "unknown suite: {}", id),
            EngineError::UnknownTest { suite, key } => {
                write!(f, "unknown test {} in suite {}", key, suite)
            }
            EngineError::BadResourceType {
                suite,
                resource_type: Some(resource_type),
            } => write!(f, "suite {} cannot run for resource type {}", suite, resource_type),
            EngineError::BadResourceType {
                suite,
                resource_type: None,
            } => write!(f, "suite {} needs a resource type", suite),
        }
    }
}

impl std::error::Error for EngineError {}

pub struct SuiteEngine {
    catalog: Catalog,
    resource_types: Vec<String>,
    metadata: OnceCell<Vec<SuiteMetadata>>,
}

impl SuiteEngine {
    /// Build an engine over `catalog`. Only descriptors marked as resources
    /// are used to expand parameterized suites.
    pub fn new(catalog: Catalog, types: &[TypeDescriptor]) -> Self {
        let resource_types: BTreeSet<String> = types
            .iter()
            .filter(|t| t.is_resource)
            .map(|t| t.name.clone())
            .collect();
        Self {
            catalog,
            resource_types: resource_types.into_iter().collect(),
            metadata: OnceCell::new(),
        }
    }

    pub fn suites(&self) -> &[SuiteRegistration] {
        self.catalog.suites()
    }

    pub fn resource_types(&self) -> &[String] {
        &self.resource_types
    }

    pub fn find(&self, id: &str) -> Option<&SuiteRegistration> {
        self.catalog.suites().iter().find(|s| s.id() == id)
    }

    /// The full universe: every suite, parameterized ones crossed with
    /// every resource type.
    pub fn selections(&self) -> Vec<Selection> {
        let mut selections = Vec::new();
        for registration in self.catalog.suites() {
            let suite_id = registration.id();
            if registration.parameterized {
                for resource_type in &self.resource_types {
                    selections.push(Selection {
                        suite_id,
                        resource_type: Some(resource_type.clone()),
                        tests: None,
                    });
                }
            } else {
                selections.push(Selection {
                    suite_id,
                    resource_type: None,
                    tests: None,
                });
            }
        }
        selections
    }

    /// Selections whose suite supports `version`.
    pub fn selections_for_version(&self, version: FhirVersion) -> Vec<Selection> {
        self.selections()
            .into_iter()
            .filter(|selection| {
                self.find(selection.suite_id)
                    .is_some_and(|r| (r.info)().supports_version(version))
            })
            .collect()
    }

    /// Metadata for the full universe, captured on first use.
    pub fn metadata(&self) -> &[SuiteMetadata] {
        self.metadata.get_or_init(|| {
            let selections = self.selections();
            info!(selections = selections.len(), "capturing suite metadata");
            selections
                .into_iter()
                .filter_map(|selection| {
                    let registration = self.find(selection.suite_id)?;
                    let resource_type = selection.resource_type.clone();
                    let (tests, capture_error) =
                        match guarded(|| (registration.metadata)(resource_type.as_deref())) {
                            Ok(tests) => (tests, None),
                            Err(panic) => {
                                warn!(suite = %selection.label(), panic = %panic.message, "metadata capture panicked");
                                (Vec::new(), Some(panic.message))
                            }
                        };
                    Some(SuiteMetadata {
                        info: (registration.info)(),
                        selection,
                        tests,
                        capture_error,
                    })
                })
                .collect()
        })
    }

    pub fn metadata_for(&self, selection: &Selection) -> Option<&SuiteMetadata> {
        self.metadata().iter().find(|m| {
            m.selection.suite_id == selection.suite_id
                && m.selection.resource_type == selection.resource_type
        })
    }

    /// Keep, per selection, only the tests whose `requires` and `validates`
    /// are all supported by `capabilities`. Selections left with no test are
    /// dropped. Selections whose metadata capture failed are kept whole, so
    /// running them still reports every test.
    pub fn filter_supported(
        &self,
        selections: Vec<Selection>,
        capabilities: &CapabilityStatement,
    ) -> Vec<Selection> {
        let mut kept = Vec::new();
        for selection in selections {
            let Some(metadata) = self.metadata_for(&selection) else {
                continue;
            };
            if metadata.capture_error.is_some() {
                debug!(suite = %selection.label(), "metadata unavailable, keeping selection");
                kept.push(selection);
                continue;
            }
            let supported: Vec<&'static str> = metadata
                .tests
                .iter()
                .filter(|t| {
                    selection
                        .tests
                        .as_ref()
                        .is_none_or(|keys| keys.contains(&t.base_key))
                })
                .filter(|t| {
                    capabilities.supports_all(t.result.requires())
                        && capabilities.supports_all(t.result.validates())
                })
                .map(|t| t.base_key)
                .collect();
            if supported.is_empty() {
                debug!(suite = %selection.label(), "no supported tests, dropping");
                continue;
            }
            kept.push(Selection {
                tests: Some(supported),
                ..selection
            });
        }
        kept
    }

    /// Run each selection in order, one report per selection.
    pub fn execute(&self, selections: &[Selection], session: &mut Session) -> Vec<SuiteReport> {
        let mut reports = Vec::new();
        for selection in selections {
            let Some(registration) = self.find(selection.suite_id) else {
                warn!(suite = selection.suite_id, "unknown suite in selection, skipping");
                continue;
            };
            info!(suite = %selection.label(), "running suite");
            let results = self.execute_one(registration, selection, session);
            let report = SuiteReport::new(
                (registration.info)(),
                selection.resource_type.clone(),
                results,
            );
            info!(
                suite = %selection.label(),
                passed = report.count(Status::Pass),
                failed = report.count(Status::Fail),
                skipped = report.count(Status::Skip),
                errors = report.count(Status::Error),
                "suite complete"
            );
            reports.push(report);
        }
        reports
    }

    pub fn execute_all(&self, session: &mut Session) -> Vec<SuiteReport> {
        self.execute(&self.selections(), session)
    }

    /// Run one test of one suite.
    pub fn run_test(
        &self,
        suite_id: &str,
        resource_type: Option<&str>,
        key: &str,
        session: &mut Session,
    ) -> Result<TestResult, EngineError> {
        let registration = self
            .find(suite_id)
            .ok_or_else(|| EngineError::UnknownSuite(suite_id.to_string()))?;
        let resource_ok = match resource_type {
            Some(name) => registration.parameterized && self.resource_types.iter().any(|t| t == name),
            None => !registration.parameterized,
        };
        if !resource_ok {
            return Err(EngineError::BadResourceType {
                suite: suite_id.to_string(),
                resource_type: resource_type.map(str::to_string),
            });
        }
        let base_key = (registration.keys)()
            .into_iter()
            .find(|k| *k == key)
            .ok_or_else(|| EngineError::UnknownTest {
                suite: suite_id.to_string(),
                key: key.to_string(),
            })?;
        let selection = Selection {
            suite_id: registration.id(),
            resource_type: resource_type.map(str::to_string),
            tests: Some(vec![base_key]),
        };
        self.execute_one(registration, &selection, session)
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::UnknownTest {
                suite: suite_id.to_string(),
                key: key.to_string(),
            })
    }

    fn execute_one(
        &self,
        registration: &SuiteRegistration,
        selection: &Selection,
        session: &mut Session,
    ) -> Vec<TestResult> {
        let resource_type = selection.resource_type.as_deref();
        let only = selection.tests.as_deref();
        match guarded(|| (registration.execute)(resource_type, &mut *session, only)) {
            Ok(results) => results,
            Err(panic) => {
                warn!(suite = %selection.label(), panic = %panic.message, "suite run panicked");
                self.panicked_results(registration, selection, &panic.message, panic.backtrace)
            }
        }
    }

    /// One error result per selected test of a suite whose run escaped.
    fn panicked_results(
        &self,
        registration: &SuiteRegistration,
        selection: &Selection,
        message: &str,
        backtrace: Option<String>,
    ) -> Vec<TestResult> {
        let keys = match &selection.tests {
            Some(keys) => keys.clone(),
            None => (registration.keys)(),
        };
        let captured = self.metadata_for(selection);
        keys.into_iter()
            .map(|key| {
                let description = captured
                    .and_then(|m| m.tests.iter().find(|t| t.base_key == key))
                    .map(|t| t.result.description().to_string())
                    .unwrap_or_else(|| registration.id().to_string());
                let key = match &selection.resource_type {
                    Some(resource_type) => format!("{}_{}", key, resource_type),
                    None => key.to_string(),
                };
                let mut result = TestResult::new(key, description);
                result.update(
                    Status::Error,
                    Some(Message::Text(format!("Fatal Error: {}", message))),
                    backtrace.clone(),
                );
                result
            })
            .collect()
    }
}
