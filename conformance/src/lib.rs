//! FHIR conformance harness.
//!
//! Named suites of keyed tests exercise the REST interactions of a server
//! under test and record one structured result per test: pass, fail, skip
//! or error, plus the evidence gathered on the way (links, required and
//! validated capabilities, raw bodies, warnings, and the body's source).
//!
//! # Usage
//!
//! List every test with its declared requirements:
//! ```bash
//! fhir-conformance list --show-requirements
//! ```
//!
//! Run the suites the server claims to support:
//! ```bash
//! fhir-conformance run --capabilities server.json
//! ```
//!
//! # Writing a suite
//!
//! A suite is a type implementing [`Suite`] with a static list of
//! [`TestCase`]s declared through [`conformance_test!`], registered with
//! `inventory::submit! { SuiteRegistration::of::<MySuite>() }`. Test bodies
//! return early through [`Signal`]s, usually with `?`:
//!
//! ```ignore
//! conformance_test!("R002", "Read a Patient that does not exist", |_suite, ctx| {
//!     ctx.metadata(|m| {
//!         m.validates(Requirement::resource("Patient", &["read"]));
//!     })?;
//!     let reply = ctx.client()?.read("Patient", "does-not-exist")?;
//!     ctx.assert_response_code(&reply, &[404])?;
//!     Ok(None)
//! })
//! ```

pub mod capability;
pub mod client;
pub mod engine;
pub mod export;
pub mod fixtures;
pub mod harness;
pub mod memory;
pub mod report;
pub mod resource;
pub mod result;
pub mod signal;
pub mod suite;
pub mod suites;
pub mod testcase;

pub use capability::{CapabilityStatement, FhirVersion};
pub use client::{ClientError, ClientReply, FhirClient};
pub use engine::{Catalog, Selection, SuiteEngine, SuiteRegistration};
pub use harness::{ExecutionMode, Session, TestContext};
pub use report::SuiteReport;
pub use result::{Message, Requirement, Status, TestResult, Verdict};
pub use signal::{Signal, TestOutcome};
pub use suite::{Category, Suite, SuiteInfo};
pub use testcase::TestCase;
