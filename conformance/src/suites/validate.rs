//! `$validate` operation tests.

use crate::client::interaction;
use crate::result::Requirement;
use crate::signal::Signal;
use crate::suite::{Suite, SuiteInfo};
use crate::testcase::TestCase;
use crate::{SuiteRegistration, conformance_test};

use super::{CORE, STU3_AND_LATER};

const VALIDATE_LINK: &str = "http://hl7.org/fhir/resource-operation-validate.html";

pub struct ValidateSuite;

impl Suite for ValidateSuite {
    const ID: &'static str = "validate";

    fn info() -> SuiteInfo {
        SuiteInfo {
            id: Self::ID,
            description: "Resource validation",
            details: &[(
                "Overview",
                "Submits valid, invalid and unparseable Patients to $validate.",
            )],
            tags: &["core", "validate"],
            category: CORE,
            supported_versions: STU3_AND_LATER,
        }
    }

    fn new(_resource_type: Option<&str>) -> Self {
        ValidateSuite
    }

    fn tests() -> &'static [TestCase<Self>] {
        TESTS
    }
}

static TESTS: &[TestCase<ValidateSuite>] = &[
    // =========================================================================
    // V001
    // =========================================================================
    // The example Patient is accepted.
    conformance_test!("V001", "Validate a valid Patient", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link(VALIDATE_LINK)
                .validates(Requirement::resource("Patient", &[interaction::VALIDATE]));
        })?;
        let example = ctx
            .fixtures()?
            .example("Patient")
            .ok_or_else(|| Signal::skip("no example Patient"))?;
        let reply = ctx.client()?.validate("Patient", &example.to_json()?)?;
        ctx.assert_response_ok(&reply)?;
        ctx.warning(|ctx| {
            let issues = reply.resource().map(|r| r.issues()).unwrap_or_default();
            ctx.assert(
                issues.iter().all(|i| !i.starts_with("error") && !i.starts_with("fatal")),
                issues,
            )
        })?;
        Ok(None)
    }),
    // =========================================================================
    // V002
    // =========================================================================
    // An invalid code is rejected with an explanation.
    conformance_test!("V002", "Validate a Patient with an invalid gender", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link(VALIDATE_LINK)
                .validates(Requirement::resource("Patient", &[interaction::VALIDATE]));
        })?;
        let invalid = ctx
            .fixtures()?
            .generate("Patient")?
            .with_field("gender", "not-a-gender");
        let reply = ctx.client()?.validate("Patient", &invalid.to_json()?)?;
        ctx.assert_response_code(&reply, &[400, 422])?;
        let issues = reply.resource().map(|r| r.issues()).unwrap_or_default();
        ctx.assert_with(
            !issues.is_empty(),
            "Rejection did not report any issue",
            reply.body.clone(),
        )?;
        Ok(None)
    }),
    // =========================================================================
    // V003
    // =========================================================================
    // Unparseable input is rejected; 400 is preferred.
    conformance_test!("V003", "Validate an unparseable body", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link(VALIDATE_LINK)
                .validates(Requirement::resource("Patient", &[interaction::VALIDATE]));
        })?;
        let reply = ctx.client()?.validate("Patient", "{ this is not json")?;
        ctx.assert_with(
            !reply.is_success(),
            format!("Unparseable body was accepted with {}", reply.code),
            reply.body.clone(),
        )?;
        ctx.warning(|ctx| ctx.assert_response_code(&reply, &[400]))?;
        Ok(None)
    }),
];

inventory::submit! { SuiteRegistration::of::<ValidateSuite>() }
