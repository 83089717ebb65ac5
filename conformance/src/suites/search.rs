//! Search tests over Patients with known names.

use tracing::debug;

use crate::client::interaction;
use crate::harness::Session;
use crate::result::Requirement;
use crate::signal::Signal;
use crate::suite::{Suite, SuiteInfo};
use crate::testcase::TestCase;
use crate::{SuiteRegistration, conformance_test};

use super::{ALL_VERSIONS, SEARCH, established};

const SEARCH_LINK: &str = "http://hl7.org/fhir/search.html";

const NAMES: [&str; 2] = ["Search Alpha", "Search Beta"];

pub struct SearchSuite {
    ids: Vec<String>,
}

impl Suite for SearchSuite {
    const ID: &'static str = "search";

    fn info() -> SuiteInfo {
        SuiteInfo {
            id: Self::ID,
            description: "Patient search",
            details: &[(
                "Overview",
                "Creates two Patients with distinct names and searches for them.",
            )],
            tags: &["search"],
            category: SEARCH,
            supported_versions: ALL_VERSIONS,
        }
    }

    fn new(_resource_type: Option<&str>) -> Self {
        Self { ids: Vec::new() }
    }

    fn tests() -> &'static [TestCase<Self>] {
        TESTS
    }

    fn setup(&mut self, session: &mut Session) -> Result<(), Signal> {
        for name in NAMES {
            let patient = session.fixtures().generate("Patient")?.with_field("name", name);
            let reply = session.client().create("Patient", &patient.to_json()?)?;
            let id = reply
                .resource()
                .and_then(|r| r.id())
                .ok_or_else(|| Signal::fail_with("setup could not create a Patient", reply.body.clone()))?;
            self.ids.push(id.to_string());
        }
        Ok(())
    }

    fn teardown(&mut self, session: &mut Session) {
        for id in self.ids.drain(..) {
            if let Err(e) = session.client().destroy("Patient", &id) {
                debug!(%e, id = %id, "could not remove search fixture");
            }
        }
    }
}

static TESTS: &[TestCase<SearchSuite>] = &[
    // =========================================================================
    // S001
    // =========================================================================
    // A field search matches exactly one fixture.
    conformance_test!("S001", "Search Patients by name", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link(SEARCH_LINK)
                .requires(Requirement::resource("Patient", &[interaction::CREATE]))
                .validates(Requirement::resource("Patient", &[interaction::SEARCH]));
        })?;
        let reply = ctx.client()?.search("Patient", &[("name", NAMES[1])])?;
        ctx.assert_response_ok(&reply)?;
        let bundle = ctx.assert_resource_type(&reply, "Bundle")?;
        ctx.assert_eq(1, bundle.entries().len(), "matches for name")?;
        Ok(None)
    }),
    // =========================================================================
    // S002
    // =========================================================================
    // _id selects a single fixture.
    conformance_test!("S002", "Search Patients by _id", |suite, ctx| {
        ctx.metadata(|m| {
            m.link(SEARCH_LINK)
                .requires(Requirement::resource("Patient", &[interaction::CREATE]))
                .validates(Requirement::resource("Patient", &[interaction::SEARCH]));
        })?;
        let id = established(&suite.ids.first().cloned(), "Patient")?;
        let reply = ctx.client()?.search("Patient", &[("_id", id.as_str())])?;
        ctx.assert_response_ok(&reply)?;
        let bundle = ctx.assert_resource_type(&reply, "Bundle")?;
        let ids: Vec<Option<&str>> = bundle.entries().iter().map(|e| e.id()).collect();
        ctx.assert_eq(vec![Some(id.as_str())], ids, "matched ids")?;
        Ok(None)
    }),
    // =========================================================================
    // S003
    // =========================================================================
    // No match is an empty bundle, not an error.
    conformance_test!("S003", "Search with no matches", |_suite, ctx| {
        ctx.metadata(|m| {
            m.link(SEARCH_LINK)
                .validates(Requirement::resource("Patient", &[interaction::SEARCH]));
        })?;
        let reply = ctx.client()?.search("Patient", &[("name", "No Such Name")])?;
        ctx.assert_response_ok(&reply)?;
        let bundle = ctx.assert_resource_type(&reply, "Bundle")?;
        ctx.assert(bundle.entries().is_empty(), "Expected an empty search result")?;
        ctx.warning(|ctx| ctx.assert_eq(Some(0), bundle.total(), "search total"))?;
        Ok(None)
    }),
];

inventory::submit! { SuiteRegistration::of::<SearchSuite>() }
