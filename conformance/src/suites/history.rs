//! History interaction tests.

use tracing::debug;

use crate::client::interaction;
use crate::harness::Session;
use crate::result::Requirement;
use crate::signal::Signal;
use crate::suite::{Suite, SuiteInfo};
use crate::testcase::TestCase;
use crate::{SuiteRegistration, conformance_test};

use super::{CORE, STU3_AND_LATER, established};

const HISTORY_LINK: &str = "http://hl7.org/fhir/http.html#history";

pub struct HistorySuite {
    id: Option<String>,
}

impl Suite for HistorySuite {
    const ID: &'static str = "history";

    fn info() -> SuiteInfo {
        SuiteInfo {
            id: Self::ID,
            description: "History interaction",
            details: &[(
                "Overview",
                "Creates a Patient, updates it once, and checks instance and type history.",
            )],
            tags: &["core", "history"],
            category: CORE,
            supported_versions: STU3_AND_LATER,
        }
    }

    fn new(_resource_type: Option<&str>) -> Self {
        Self { id: None }
    }

    fn tests() -> &'static [TestCase<Self>] {
        TESTS
    }

    fn setup(&mut self, session: &mut Session) -> Result<(), Signal> {
        let patient = session.fixtures().generate("Patient")?;
        let created = session.client().create("Patient", &patient.to_json()?)?;
        let id = created
            .resource()
            .and_then(|r| r.id())
            .map(str::to_string)
            .ok_or_else(|| Signal::fail_with("setup could not create a Patient", created.body.clone()))?;
        let changed = patient.with_id(Some(id.as_str())).with_field("note", "second version");
        let updated = session
            .client()
            .update("Patient", &id, &changed.to_json()?)?;
        if !updated.is_success() {
            return Err(Signal::fail_with(
                format!("setup could not update Patient/{} ({})", id, updated.code),
                updated.body,
            ));
        }
        self.id = Some(id);
        Ok(())
    }

    fn teardown(&mut self, session: &mut Session) {
        if let Some(id) = self.id.take()
            && let Err(e) = session.client().destroy("Patient", &id)
        {
            debug!(%e, "could not remove history fixture");
        }
    }
}

static TESTS: &[TestCase<HistorySuite>] = &[
    // =========================================================================
    // HI01
    // =========================================================================
    // Instance history lists both versions.
    conformance_test!("HI01", "Instance history lists every version", |suite, ctx| {
        ctx.metadata(|m| {
            m.link(HISTORY_LINK)
                .requires(Requirement::resource(
                    "Patient",
                    &[interaction::CREATE, interaction::UPDATE],
                ))
                .validates(Requirement::resource("Patient", &[interaction::HISTORY_INSTANCE]));
        })?;
        let id = established(&suite.id, "Patient")?;
        let reply = ctx.client()?.history("Patient", Some(id.as_str()))?;
        ctx.assert_response_ok(&reply)?;
        let bundle = ctx.assert_resource_type(&reply, "Bundle")?;
        ctx.assert_eq(2, bundle.entries().len(), "history entries")?;
        Ok(None)
    }),
    // =========================================================================
    // HI02
    // =========================================================================
    // History is ordered newest first.
    conformance_test!("HI02", "Instance history is newest first", |suite, ctx| {
        ctx.metadata(|m| {
            m.link(HISTORY_LINK)
                .requires(Requirement::resource(
                    "Patient",
                    &[interaction::CREATE, interaction::UPDATE],
                ))
                .validates(Requirement::resource("Patient", &[interaction::HISTORY_INSTANCE]));
        })?;
        let id = established(&suite.id, "Patient")?;
        let reply = ctx.client()?.history("Patient", Some(id.as_str()))?;
        ctx.assert_response_ok(&reply)?;
        let bundle = ctx.assert_resource_type(&reply, "Bundle")?;
        let versions: Vec<Option<u64>> = bundle
            .entries()
            .iter()
            .map(|e| e.version_id().and_then(|v| v.parse().ok()))
            .collect();
        ctx.assert_with(
            versions.windows(2).all(|pair| pair[0] >= pair[1]),
            "History entries are not ordered newest first",
            format!("{:?}", versions),
        )?;
        Ok(None)
    }),
    // =========================================================================
    // HI03
    // =========================================================================
    // Type history includes the fixture.
    conformance_test!("HI03", "Type history includes the Patient", |suite, ctx| {
        ctx.metadata(|m| {
            m.link(HISTORY_LINK)
                .requires(Requirement::resource("Patient", &[interaction::CREATE]))
                .validates(Requirement::resource("Patient", &[interaction::HISTORY_TYPE]));
        })?;
        let id = established(&suite.id, "Patient")?;
        let reply = ctx.client()?.history("Patient", None)?;
        ctx.assert_response_ok(&reply)?;
        let bundle = ctx.assert_resource_type(&reply, "Bundle")?;
        ctx.assert(
            bundle.entries().iter().any(|e| e.id() == Some(id.as_str())),
            format!("Patient/{} is missing from type history", id),
        )?;
        Ok(None)
    }),
];

inventory::submit! { SuiteRegistration::of::<HistorySuite>() }
