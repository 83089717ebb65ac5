//! Server capability declarations.
//!
//! A [`CapabilityStatement`] lists, per resource type, the interactions a
//! server claims to support. The engine uses it to drop tests whose
//! declared `requires` / `validates` the server openly does not implement.

use std::collections::BTreeSet;
use std::fmt;

use facet::Facet;

use crate::result::Requirement;

/// Protocol major versions a suite can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FhirVersion {
    Dstu2,
    Stu3,
    R4,
}

impl FhirVersion {
    pub const ALL: [FhirVersion; 3] = [FhirVersion::Dstu2, FhirVersion::Stu3, FhirVersion::R4];

    pub fn as_str(self) -> &'static str {
        match self {
            FhirVersion::Dstu2 => "dstu2",
            FhirVersion::Stu3 => "stu3",
            FhirVersion::R4 => "r4",
        }
    }

    /// Accepts either a short name (`r4`) or a release number (`4.0.1`).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "dstu2" => return Some(FhirVersion::Dstu2),
            "stu3" => return Some(FhirVersion::Stu3),
            "r4" => return Some(FhirVersion::R4),
            _ => {}
        }
        match value.split('.').next() {
            Some("1") => Some(FhirVersion::Dstu2),
            Some("3") => Some(FhirVersion::Stu3),
            Some("4") => Some(FhirVersion::R4),
            _ => None,
        }
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interactions declared for one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct ResourceCapability {
    pub resource_type: String,
    pub interactions: Vec<String>,
}

/// What a server says it supports.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct CapabilityStatement {
    /// Release number, e.g. `4.0.1`.
    pub fhir_version: String,
    pub resources: Vec<ResourceCapability>,
    /// System-level interactions (transaction, batch, ...).
    pub system: Vec<String>,
}

/// Error type for loading capability statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    Parse(String),
    Serialize(String),
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityError::Parse(detail) => {
                write!(f, "invalid capability statement: {}", detail)
            }
            CapabilityError::Serialize(detail) => {
                write!(f, "failed to serialize capability statement: {}", detail)
            }
        }
    }
}

impl std::error::Error for CapabilityError {}

impl CapabilityStatement {
    pub fn new(fhir_version: impl Into<String>) -> Self {
        Self {
            fhir_version: fhir_version.into(),
            resources: Vec::new(),
            system: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CapabilityError> {
        facet_json::from_str(json).map_err(|e| CapabilityError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, CapabilityError> {
        facet_json::to_string(self).map_err(|e| CapabilityError::Serialize(e.to_string()))
    }

    pub fn version(&self) -> Option<FhirVersion> {
        FhirVersion::parse(&self.fhir_version)
    }

    /// Add (or extend) the interactions declared for a resource type.
    pub fn declare(&mut self, resource_type: &str, interactions: &[&str]) {
        let entry = match self
            .resources
            .iter_mut()
            .position(|r| r.resource_type == resource_type)
        {
            Some(index) => &mut self.resources[index],
            None => {
                self.resources.push(ResourceCapability {
                    resource_type: resource_type.to_string(),
                    interactions: Vec::new(),
                });
                let last = self.resources.len() - 1;
                &mut self.resources[last]
            }
        };
        for interaction in interactions {
            if !entry.interactions.iter().any(|i| i == interaction) {
                entry.interactions.push(interaction.to_string());
            }
        }
    }

    pub fn declare_system(&mut self, interactions: &[&str]) {
        for interaction in interactions {
            if !self.system.iter().any(|i| i == interaction) {
                self.system.push(interaction.to_string());
            }
        }
    }

    /// Interactions supported for `resource`, or system-wide when `None`.
    pub fn interactions(&self, resource: Option<&str>) -> BTreeSet<&str> {
        match resource {
            None => self.system.iter().map(String::as_str).collect(),
            Some(name) => self
                .resources
                .iter()
                .filter(|r| r.resource_type == name)
                .flat_map(|r| r.interactions.iter().map(String::as_str))
                .collect(),
        }
    }

    /// Whether every method in `requirement` is declared.
    pub fn supports(&self, requirement: &Requirement) -> bool {
        let supported = self.interactions(requirement.resource.as_deref());
        requirement
            .methods
            .iter()
            .all(|method| supported.contains(method.as_str()))
    }

    pub fn supports_all<'r>(&self, requirements: impl IntoIterator<Item = &'r Requirement>) -> bool {
        requirements.into_iter().all(|r| self.supports(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement() -> CapabilityStatement {
        let mut cs = CapabilityStatement::new("4.0.1");
        cs.declare("Patient", &["read", "create"]);
        cs.declare("Patient", &["update", "read"]);
        cs.declare_system(&["transaction"]);
        cs
    }

    #[test]
    fn declare_merges_without_duplicates() {
        let cs = statement();
        assert_eq!(cs.resources.len(), 1);
        assert_eq!(cs.resources[0].interactions, vec!["read", "create", "update"]);
    }

    #[test]
    fn resource_requirements_need_every_method() {
        let cs = statement();
        assert!(cs.supports(&Requirement::resource("Patient", &["read", "update"])));
        assert!(!cs.supports(&Requirement::resource("Patient", &["read", "delete"])));
        assert!(!cs.supports(&Requirement::resource("Observation", &["read"])));
    }

    #[test]
    fn system_requirements_use_system_interactions() {
        let cs = statement();
        assert!(cs.supports(&Requirement::system(&["transaction"])));
        assert!(!cs.supports(&Requirement::system(&["batch"])));
    }

    #[test]
    fn versions_parse_from_names_and_releases() {
        assert_eq!(FhirVersion::parse("4.0.1"), Some(FhirVersion::R4));
        assert_eq!(FhirVersion::parse("STU3"), Some(FhirVersion::Stu3));
        assert_eq!(FhirVersion::parse("1.0.2"), Some(FhirVersion::Dstu2));
        assert_eq!(FhirVersion::parse("5.0.0"), None);
        assert_eq!(statement().version(), Some(FhirVersion::R4));
    }
}
