//! Per-resource-type interaction tests.
//!
//! Instantiated once for every known resource type. Tests run in order and
//! build on each other: X010 creates the resource the later tests use.

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

pub struct ResourceSuite {
    resource_type: String,
    id: Option<String>,
    version_id: Option<String>,
    current: Option<Box<dyn ResourceModel>>,
}

impl ResourceSuite {
    fn requirement(&self, methods: &[&str]) -> Requirement {
        Requirement::resource(self.resource_type.clone(), methods)
    }
}

impl Suite for ResourceSuite {
    const ID: &'static str = "resource";
    const RESOURCE_PARAMETERIZED: bool = true;

    fn info() -> SuiteInfo {
        SuiteInfo {
            id: Self::ID,
            description: "Resource interactions",
            details: &[(
                "Overview",
                "Create, read, update, vread, search and delete one resource of the given type.",
            )],
            tags: &["core", "crud"],
            category: CORE,
            supported_versions: ALL_VERSIONS,
        }
    }

    fn new(resource_type: Option<&str>) -> Self {
        Self {
            resource_type: resource_type.unwrap_or_default().to_string(),
            id: None,
            version_id: None,
            current: None,
        }
    }

    fn tests() -> &'static [TestCase<Self>] {
        TESTS
    }

    fn teardown(&mut self, session: &mut Session) {
        if let Some(id) = self.id.take()
            && let Err(e) = session.client().destroy(&self.resource_type, &id)
        {
            debug!(resource = %self.resource_type, %e, "could not remove fixture");
        }
    }

    fn resource_type(&self) -> Option<&str> {
        Some(&self.resource_type)
    }
}

static TESTS: &[TestCase<ResourceSuite>] = &[
    // =========================================================================
    // X010
    // =========================================================================
    // Create answers 201 with the new id.
    conformance_test!("X010", "Create a new resource", |suite, ctx| {
        ctx.metadata(|m| {
            m.link("http://hl7.org/fhir/http.html#create")
                .validates(suite.requirement(&[interaction::CREATE]));
        })?;
        let resource = ctx.fixtures()?.generate(&suite.resource_type)?;
        let reply = ctx
            .client()?
            .create(&suite.resource_type, &resource.to_json()?)?;
        ctx.assert_response_created(&reply)?;
        let created = ctx.assert_resource_type(&reply, &suite.resource_type)?;
        let id = created
            .id()
            .ok_or_else(|| Signal::fail("created resource has no id"))?;
        suite.id = Some(id.to_string());
        suite.version_id = created.version_id().map(str::to_string);
        suite.current = Some(resource);
        ctx.warning(|ctx| ctx.assert_header(&reply, "Location"))?;
        Ok(None)
    }),
    // =========================================================================
    // X020
    // =========================================================================
    // The created resource reads back unchanged.
    conformance_test!("X020", "Read the created resource", |suite, ctx| {
        ctx.metadata(|m| {
            m.link("http://hl7.org/fhir/http.html#read")
                .requires(suite.requirement(&[interaction::CREATE]))
                .validates(suite.requirement(&[interaction::READ]));
        })?;
        let id = established(&suite.id, &suite.resource_type)?;
        let reply = ctx.client()?.read(&suite.resource_type, &id)?;
        ctx.assert_response_ok(&reply)?;
        let actual = ctx.assert_resource_type(&reply, &suite.resource_type)?;
        if let Some(expected) = &suite.current {
            ctx.assert_no_mismatch(
                expected.as_ref(),
                actual,
                &["id", "meta.versionId"],
                &suite.resource_type,
            )?;
        }
        Ok(None)
    }),
    // =========================================================================
    // X030
    // =========================================================================
    // Update stores a new version.
    conformance_test!("X030", "Update the created resource", |suite, ctx| {
        ctx.metadata(|m| {
            m.link("http://hl7.org/fhir/http.html#update")
                .requires(suite.requirement(&[interaction::CREATE]))
                .validates(suite.requirement(&[interaction::UPDATE]));
        })?;
        let id = established(&suite.id, &suite.resource_type)?;
        let base = suite
            .current
            .as_ref()
            .ok_or_else(|| Signal::skip("no resource to update"))?;
        let changed = base.with_id(Some(id.as_str())).with_field("note", "updated");
        let reply = ctx
            .client()?
            .update(&suite.resource_type, &id, &changed.to_json()?)?;
        ctx.assert_response_code(&reply, &[200, 201])?;
        let updated = ctx.assert_resource_type(&reply, &suite.resource_type)?;
        ctx.assert(
            updated.version_id() != suite.version_id.as_deref(),
            "Update did not change the version id",
        )?;
        suite.current = Some(changed.with_id(None));
        Ok(None)
    }),
    // =========================================================================
    // X040
    // =========================================================================
    // The first version stays readable after an update.
    conformance_test!("X040", "Read the first version", |suite, ctx| {
        ctx.metadata(|m| {
            m.link("http://hl7.org/fhir/http.html#vread")
                .requires(suite.requirement(&[interaction::CREATE]))
                .validates(suite.requirement(&[interaction::VREAD]));
        })?;
        let id = established(&suite.id, &suite.resource_type)?;
        let version = suite
            .version_id
            .clone()
            .ok_or_else(|| Signal::skip("server did not report a version id"))?;
        let reply = ctx.client()?.vread(&suite.resource_type, &id, &version)?;
        ctx.assert_response_ok(&reply)?;
        let actual = ctx.assert_resource_type(&reply, &suite.resource_type)?;
        ctx.assert_eq(Some(version.as_str()), actual.version_id(), "version id")?;
        Ok(None)
    }),
    // =========================================================================
    // X050
    // =========================================================================
    // Searching by _id finds exactly the created resource.
    conformance_test!("X050", "Search by id", |suite, ctx| {
        ctx.metadata(|m| {
            m.link("http://hl7.org/fhir/search.html")
                .requires(suite.requirement(&[interaction::CREATE]))
                .validates(suite.requirement(&[interaction::SEARCH]));
        })?;
        let id = established(&suite.id, &suite.resource_type)?;
        let reply = ctx
            .client()?
            .search(&suite.resource_type, &[("_id", id.as_str())])?;
        ctx.assert_response_ok(&reply)?;
        let bundle = ctx.assert_resource_type(&reply, "Bundle")?;
        let entries = bundle.entries();
        ctx.assert_eq(1, entries.len(), "search matches")?;
        ctx.assert_eq(Some(id.as_str()), entries[0].id(), "matched id")?;
        ctx.warning(|ctx| ctx.assert_eq(Some(1), bundle.total(), "search total"))?;
        Ok(None)
    }),
    // =========================================================================
    // X060
    // =========================================================================
    // Delete removes the resource from reads.
    conformance_test!("X060", "Delete the created resource", |suite, ctx| {
        ctx.metadata(|m| {
            m.link("http://hl7.org/fhir/http.html#delete")
                .requires(suite.requirement(&[interaction::CREATE, interaction::READ]))
                .validates(suite.requirement(&[interaction::DELETE]));
        })?;
        let id = established(&suite.id, &suite.resource_type)?;
        let reply = ctx.client()?.destroy(&suite.resource_type, &id)?;
        ctx.assert_response_code(&reply, &[200, 204])?;
        suite.id = None;
        let reply = ctx.client()?.read(&suite.resource_type, &id)?;
        ctx.assert_response_gone(&reply)?;
        Ok(None)
    }),
];

inventory::submit! { SuiteRegistration::of::<ResourceSuite>() }
