//! Transaction and batch bundles.

use tracing::debug;

use crate::client::interaction;
use crate::fixtures::{BundleKind, BundleRequest};
use crate::harness::Session;
use crate::result::Requirement;
use crate::suite::{Suite, SuiteInfo};
use crate::testcase::TestCase;
use crate::{SuiteRegistration, conformance_test};

use super::{ALL_VERSIONS, SYSTEM};

const TRANSACTION_LINK: &str = "http://hl7.org/fhir/http.html#transaction";

const ROLLBACK_NAME: &str = "Rollback Probe";

pub struct TransactionSuite {
    created: Vec<String>,
}

impl Suite for TransactionSuite {
    const ID: &'static str = "transaction";

    fn info() -> SuiteInfo {
        SuiteInfo {
            id: Self::ID,
            description: "Transaction and batch",
            details: &[
                ("Transaction", "All entries succeed together or none are applied."),
                ("Batch", "Entries are processed independently."),
            ],
            tags: &["system", "transaction", "batch"],
            category: SYSTEM,
            supported_versions: ALL_VERSIONS,
        }
    }

    fn new(_resource_type: Option<&str>) -> Self {
        Self {
            created: Vec::new(),
        }
    }

    fn tests() -> &'static [TestCase<Self>] {
        TESTS
    }

    fn teardown(&mut self, session: &mut Session) {
        for id in self.created.drain(..) {
            if let Err(e) = session.client().destroy("Patient", &id) {
                debug!(%e, id = %id, "could not remove bundle fixture");
            }
        }
    }
}

static TESTS: &[TestCase<TransactionSuite>] = &[
    // =========================================================================
    // TR01
    // =========================================================================
    // A transaction creating two Patients answers with both.
    conformance_test!("TR01", "Transaction creates every entry", |suite, ctx| {
        ctx.metadata(|m| {
            m.link(TRANSACTION_LINK)
                .requires(Requirement::resource("Patient", &[interaction::CREATE]))
                .validates(Requirement::system(&[interaction::TRANSACTION]));
        })?;
        let fixtures = ctx.fixtures()?;
        let entries = vec![
            BundleRequest::post(fixtures.generate("Patient")?),
            BundleRequest::post(fixtures.generate("Patient")?),
        ];
        let body = fixtures.bundle(BundleKind::Transaction, entries)?;
        let reply = ctx.client()?.transaction(&body)?;
        ctx.assert_response_ok(&reply)?;
        let bundle = ctx.assert_resource_type(&reply, "Bundle")?;
        let ids: Vec<String> = bundle
            .entries()
            .iter()
            .filter_map(|e| e.id())
            .map(str::to_string)
            .collect();
        suite.created.extend(ids.iter().cloned());
        ctx.assert_eq(2, ids.len(), "created entries")?;
        Ok(None)
    }),
    // =========================================================================
    // TR02
    // =========================================================================
    // A failing batch entry does not stop the others.
    conformance_test!("TR02", "Batch applies entries independently", |suite, ctx| {
        ctx.metadata(|m| {
            m.link("http://hl7.org/fhir/http.html#batch")
                .requires(Requirement::resource(
                    "Patient",
                    &[interaction::CREATE, interaction::READ],
                ))
                .validates(Requirement::system(&[interaction::BATCH]));
        })?;
        let fixtures = ctx.fixtures()?;
        let entries = vec![
            BundleRequest::post(fixtures.generate("Patient")?),
            BundleRequest::get("Patient/does-not-exist"),
        ];
        let body = fixtures.bundle(BundleKind::Batch, entries)?;
        let reply = ctx.client()?.batch(&body)?;
        ctx.assert_response_ok(&reply)?;
        let bundle = ctx.assert_resource_type(&reply, "Bundle")?;
        let ids: Vec<String> = bundle
            .entries()
            .iter()
            .filter_map(|e| e.id())
            .map(str::to_string)
            .collect();
        suite.created.extend(ids.iter().cloned());
        ctx.assert_eq(1, ids.len(), "created entries")?;
        Ok(None)
    }),
    // =========================================================================
    // TR03
    // =========================================================================
    // A failing transaction leaves no trace.
    conformance_test!("TR03", "Failed transaction is rolled back", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link(TRANSACTION_LINK)
                .requires(Requirement::resource(
                    "Patient",
                    &[interaction::CREATE, interaction::READ, interaction::SEARCH],
                ))
                .validates(Requirement::system(&[interaction::TRANSACTION]));
        })?;
        let fixtures = ctx.fixtures()?;
        let probe = fixtures.generate("Patient")?.with_field("name", ROLLBACK_NAME);
        let entries = vec![
            BundleRequest::post(probe),
            BundleRequest::get("Patient/does-not-exist"),
        ];
        let body = fixtures.bundle(BundleKind::Transaction, entries)?;
        let reply = ctx.client()?.transaction(&body)?;
        ctx.assert_response_code(&reply, &[400, 404, 409, 422])?;
        let found = ctx.client()?.search("Patient", &[("name", ROLLBACK_NAME)])?;
        ctx.assert_response_ok(&found)?;
        let bundle = ctx.assert_resource_type(&found, "Bundle")?;
        ctx.assert_with(
            bundle.entries().is_empty(),
            "Entries of a failed transaction were applied",
            found.body.clone(),
        )?;
        Ok(None)
    }),
];

inventory::submit! { SuiteRegistration::of::<TransactionSuite>() }
