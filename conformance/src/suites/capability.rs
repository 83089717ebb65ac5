//! Capability statement tests.

use crate::capability::FhirVersion;
use crate::client::interaction;
use crate::result::{Requirement, Status};
use crate::suite::{Suite, SuiteInfo};
use crate::testcase::TestCase;
use crate::{SuiteRegistration, conformance_test};

use super::{ALL_VERSIONS, SYSTEM};

const CAPABILITY_LINK: &str = "http://hl7.org/fhir/http.html#capabilities";

pub struct CapabilitySuite;

impl Suite for CapabilitySuite {
    const ID: &'static str = "capability";

    fn info() -> SuiteInfo {
        SuiteInfo {
            id: Self::ID,
            description: "Capability statement",
            details: &[("Overview", "Fetches and inspects the server's capability statement.")],
            tags: &["system", "capabilities"],
            category: SYSTEM,
            supported_versions: ALL_VERSIONS,
        }
    }

    fn new(_resource_type: Option<&str>) -> Self {
        CapabilitySuite
    }

    fn tests() -> &'static [TestCase<Self>] {
        TESTS
    }
}

static TESTS: &[TestCase<CapabilitySuite>] = &[
    // =========================================================================
    // CS01
    // =========================================================================
    // The statement declares at least one resource type.
    conformance_test!("CS01", "Server publishes a capability statement", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link(CAPABILITY_LINK)
                .validates(Requirement::system(&[interaction::CAPABILITIES]));
        })?;
        let statement = ctx.client()?.capability_statement()?;
        ctx.assert(
            !statement.resources.is_empty(),
            "Capability statement declares no resource types",
        )?;
        Ok(None)
    }),
    // =========================================================================
    // CS02
    // =========================================================================
    // The declared version is one this harness knows; an unknown one is only
    // reported, not failed.
    conformance_test!("CS02", "Capability statement names a known version", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link(CAPABILITY_LINK)
                .validates(Requirement::system(&[interaction::CAPABILITIES]));
        })?;
        let statement = ctx.client()?.capability_statement()?;
        match FhirVersion::parse(&statement.fhir_version) {
            Some(version) => {
                ctx.update(
                    Status::Pass,
                    Some(format!("Server declares {}", version).into()),
                    None,
                );
            }
            None => {
                ctx.warning(|ctx| {
                    ctx.assert(
                        false,
                        format!("Unknown version {}", statement.fhir_version),
                    )
                })?;
            }
        }
        Ok(None)
    }),
];

inventory::submit! { SuiteRegistration::of::<CapabilitySuite>() }
