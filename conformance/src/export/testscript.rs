//! TestScript-style JSON export.

use facet::Facet;

use crate::engine::SuiteMetadata;
use crate::result::Requirement;

use super::ExportError;

#[derive(Debug, Facet)]
pub struct TestScriptJson {
    pub resource_type: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub fhir_versions: Vec<String>,
    pub tests: Vec<ScriptTestJson>,
}

#[derive(Debug, Facet)]
pub struct ScriptTestJson {
    pub id: String,
    pub name: String,
    pub links: Vec<String>,
    pub capabilities: Vec<ScriptCapabilityJson>,
    pub code: String,
}

/// A requirement marked as a precondition (`required`) or as exercised
/// (`validated`).
#[derive(Debug, Facet)]
pub struct ScriptCapabilityJson {
    pub required: bool,
    pub validated: bool,
    pub resource: Option<String>,
    pub interactions: Vec<String>,
}

impl ScriptCapabilityJson {
    fn from_requirement(requirement: &Requirement, required: bool) -> Self {
        Self {
            required,
            validated: !required,
            resource: requirement.resource.clone(),
            interactions: requirement.methods.clone(),
        }
    }
}

pub fn documents(metadata: &[SuiteMetadata]) -> Vec<TestScriptJson> {
    metadata
        .iter()
        .map(|suite| {
            let label = suite.selection.label();
            TestScriptJson {
                resource_type: "TestScript".to_string(),
                id: label.replace('/', "-"),
                name: label,
                description: match &suite.selection.resource_type {
                    Some(resource_type) => format!("{} ({})", suite.info.description, resource_type),
                    None => suite.info.description.to_string(),
                },
                category: suite.info.category.id.to_string(),
                fhir_versions: suite
                    .info
                    .supported_versions
                    .iter()
                    .map(|v| v.as_str().to_string())
                    .collect(),
                tests: suite
                    .tests
                    .iter()
                    .map(|captured| {
                        let result = &captured.result;
                        let capabilities = result
                            .requires()
                            .iter()
                            .map(|r| ScriptCapabilityJson::from_requirement(r, true))
                            .chain(
                                result
                                    .validates()
                                    .iter()
                                    .map(|r| ScriptCapabilityJson::from_requirement(r, false)),
                            )
                            .collect();
                        ScriptTestJson {
                            id: result.key().to_string(),
                            name: result.description().to_string(),
                            links: result.links().to_vec(),
                            capabilities,
                            code: result.code().unwrap_or_default().to_string(),
                        }
                    })
                    .collect(),
            }
        })
        .collect()
}

/// All selections as one JSON array.
pub fn render(metadata: &[SuiteMetadata]) -> Result<String, ExportError> {
    facet_json::to_string(&documents(metadata)).map_err(|e| ExportError::Serialize(e.to_string()))
}
