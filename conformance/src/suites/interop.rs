//! Moving a resource between two servers.
//!
//! Needs a secondary connection; every test skips without one.

use tracing::debug;

use crate::client::interaction;
use crate::harness::Session;
use crate::result::Requirement;
use crate::signal::Signal;
use crate::suite::{Suite, SuiteInfo};
use crate::testcase::TestCase;
use crate::{SuiteRegistration, conformance_test};

use super::{ALL_VERSIONS, INTEROP};

pub struct InteropSuite {
    primary_id: Option<String>,
    secondary_id: Option<String>,
}

impl Suite for InteropSuite {
    const ID: &'static str = "interop";

    fn info() -> SuiteInfo {
        SuiteInfo {
            id: Self::ID,
            description: "Cross-server exchange",
            details: &[(
                "Overview",
                "Reads a Patient from the primary server, stores it on the secondary one and compares the copies.",
            )],
            tags: &["interop"],
            category: INTEROP,
            supported_versions: ALL_VERSIONS,
        }
    }

    fn new(_resource_type: Option<&str>) -> Self {
        Self {
            primary_id: None,
            secondary_id: None,
        }
    }

    fn tests() -> &'static [TestCase<Self>] {
        TESTS
    }

    fn teardown(&mut self, session: &mut Session) {
        if let Some(id) = self.primary_id.take()
            && let Err(e) = session.client().destroy("Patient", &id)
        {
            debug!(%e, "could not remove primary fixture");
        }
        if let Some(id) = self.secondary_id.take()
            && let Some(secondary) = session.secondary()
            && let Err(e) = secondary.destroy("Patient", &id)
        {
            debug!(%e, "could not remove secondary fixture");
        }
    }
}

static TESTS: &[TestCase<InteropSuite>] = &[
    // =========================================================================
    // MS01
    // =========================================================================
    // A Patient copied from the primary server reads back the same from the
    // secondary one.
    conformance_test!("MS01", "Copy a Patient between servers", |suite, ctx| {
        ctx.metadata(|m| {
            m.links(&[
                "http://hl7.org/fhir/http.html#create",
                "http://hl7.org/fhir/http.html#read",
            ])
            .requires(Requirement::resource(
                "Patient",
                &[interaction::CREATE, interaction::READ],
            ));
        })?;
        ctx.secondary()?;
        let patient = ctx.fixtures()?.generate("Patient")?;
        let created = ctx.client()?.create("Patient", &patient.to_json()?)?;
        ctx.assert_response_created(&created)?;
        let id = created
            .resource()
            .and_then(|r| r.id())
            .map(str::to_string)
            .ok_or_else(|| Signal::fail("created Patient has no id"))?;
        suite.primary_id = Some(id.clone());

        let original = ctx.client()?.read("Patient", &id)?;
        ctx.assert_response_ok(&original)?;
        let original = ctx.assert_resource_type(&original, "Patient")?;

        let copy = original.with_id(None);
        let stored = ctx.secondary()?.create("Patient", &copy.to_json()?)?;
        ctx.assert_response_created(&stored)?;
        let copy_id = stored
            .resource()
            .and_then(|r| r.id())
            .map(str::to_string)
            .ok_or_else(|| Signal::fail("copied Patient has no id"))?;
        suite.secondary_id = Some(copy_id.clone());

        let echoed = ctx.secondary()?.read("Patient", &copy_id)?;
        ctx.assert_response_ok(&echoed)?;
        let echoed = ctx.assert_resource_type(&echoed, "Patient")?;
        ctx.assert_no_mismatch(original, echoed, &["id", "meta.versionId"], "Copied Patient")?;
        Ok(None)
    }),
];

inventory::submit! { SuiteRegistration::of::<InteropSuite>() }
