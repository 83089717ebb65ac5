//! Read interaction tests.
//!
//! Setup creates one Patient; every test reads against it.

use tracing::debug;

use crate::client::interaction;
use crate::harness::Session;
use crate::resource::ResourceModel;
use crate::result::Requirement;
use crate::signal::Signal;
use crate::suite::{Suite, SuiteInfo};
use crate::testcase::TestCase;
use crate::{SuiteRegistration, conformance_test};

use super::{ALL_VERSIONS, CORE, established};

const READ_LINK: &str = "http://hl7.org/fhir/http.html#read";

pub struct ReadSuite {
    id: Option<String>,
    fixture: Option<Box<dyn ResourceModel>>,
}

impl Suite for ReadSuite {
    const ID: &'static str = "read";

    fn info() -> SuiteInfo {
        SuiteInfo {
            id: Self::ID,
            description: "Read interaction",
            details: &[
                ("Overview", "Reads a Patient created during setup."),
                (
                    "Expectations",
                    "Existing resources come back unchanged, missing ones answer 404 and deleted ones 404 or 410.",
                ),
            ],
            tags: &["core", "read"],
            category: CORE,
            supported_versions: ALL_VERSIONS,
        }
    }

    fn new(_resource_type: Option<&str>) -> Self {
        Self {
            id: None,
            fixture: None,
        }
    }

    fn tests() -> &'static [TestCase<Self>] {
        TESTS
    }

    fn setup(&mut self, session: &mut Session) -> Result<(), Signal> {
        let patient = session.fixtures().generate("Patient")?;
        let reply = session.client().create("Patient", &patient.to_json()?)?;
        if !reply.is_success() {
            return Err(Signal::fail_with(
                format!("setup could not create a Patient ({})", reply.code),
                reply.body,
            ));
        }
        let id = reply
            .resource()
            .and_then(|r| r.id())
            .ok_or_else(|| Signal::fail("created Patient has no id"))?;
        debug!(id, "read fixture created");
        self.id = Some(id.to_string());
        self.fixture = Some(patient);
        Ok(())
    }

    fn teardown(&mut self, session: &mut Session) {
        if let Some(id) = self.id.take()
            && let Err(e) = session.client().destroy("Patient", &id)
        {
            debug!(%e, "could not remove read fixture");
        }
    }
}

static TESTS: &[TestCase<ReadSuite>] = &[
    // =========================================================================
    // R001
    // =========================================================================
    // A created resource reads back with the same content.
    conformance_test!("R001", "Read an existing Patient", |suite, ctx| {
        ctx.metadata(|m| {
            m.link(READ_LINK)
                .requires(Requirement::resource("Patient", &[interaction::CREATE]))
                .validates(Requirement::resource("Patient", &[interaction::READ]));
        })?;
        let id = established(&suite.id, "Patient")?;
        let reply = ctx.client()?.read("Patient", &id)?;
        ctx.assert_response_ok(&reply)?;
        let actual = ctx.assert_resource_type(&reply, "Patient")?;
        ctx.assert_eq(Some(id.as_str()), actual.id(), "resource id")?;
        if let Some(expected) = &suite.fixture {
            ctx.assert_no_mismatch(
                expected.as_ref(),
                actual,
                &["id", "meta.versionId"],
                "Read Patient",
            )?;
        }
        Ok(None)
    }),
    // =========================================================================
    // R002
    // =========================================================================
    // An unknown id answers 404.
    conformance_test!("R002", "Read a Patient that does not exist", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link(READ_LINK)
                .validates(Requirement::resource("Patient", &[interaction::READ]));
        })?;
        let reply = ctx.client()?.read("Patient", "does-not-exist")?;
        ctx.assert_response_code(&reply, &[404])?;
        Ok(None)
    }),
    // =========================================================================
    // R003
    // =========================================================================
    // Reads should carry the version in an ETag header.
    conformance_test!("R003", "Read response carries an ETag", |suite, ctx| {
        ctx.metadata(|m| {
            m.link("http://hl7.org/fhir/http.html#versioning")
                .requires(Requirement::resource("Patient", &[interaction::CREATE]))
                .validates(Requirement::resource("Patient", &[interaction::READ]));
        })?;
        let id = established(&suite.id, "Patient")?;
        let reply = ctx.client()?.read("Patient", &id)?;
        ctx.assert_response_ok(&reply)?;
        ctx.warning(|ctx| ctx.assert_header(&reply, "ETag"))?;
        Ok(None)
    }),
    // =========================================================================
    // R004
    // =========================================================================
    // A deleted resource answers 404 or 410.
    conformance_test!("R004", "Read a deleted Patient", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link(READ_LINK)
                .requires(Requirement::resource(
                    "Patient",
                    &[interaction::CREATE, interaction::DELETE],
                ))
                .validates(Requirement::resource("Patient", &[interaction::READ]));
        })?;
        let patient = ctx.fixtures()?.generate("Patient")?;
        let created = ctx.client()?.create("Patient", &patient.to_json()?)?;
        ctx.assert_response_created(&created)?;
        let id = created
            .resource()
            .and_then(|r| r.id())
            .map(str::to_string)
            .ok_or_else(|| Signal::fail("created Patient has no id"))?;
        let deleted = ctx.client()?.destroy("Patient", &id)?;
        ctx.assert_response_code(&deleted, &[200, 204])?;
        let reply = ctx.client()?.read("Patient", &id)?;
        ctx.assert_response_gone(&reply)?;
        Ok(None)
    }),
];

inventory::submit! { SuiteRegistration::of::<ReadSuite>() }
