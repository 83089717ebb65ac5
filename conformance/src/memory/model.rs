//! Document model used by the in-memory server.
//!
//! Three resource shapes travel as JSON: plain [`Document`]s, [`Bundle`]s of
//! documents, and [`OperationOutcome`]s. A body is identified by trying each
//! shape in turn; each has a required field the others lack.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use facet::Facet;

use crate::resource::{Format, ModelError, ResourceModel};

/// A flat resource: type, identity and string-valued fields.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Document {
    pub resource_type: String,
    pub id: Option<String>,
    pub version_id: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl Document {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            version_id: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl ResourceModel for Document {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }

    fn to_json(&self) -> Result<String, ModelError> {
        facet_json::to_string(self).map_err(|e| ModelError::Serialize(e.to_string()))
    }

    fn mismatch(&self, other: &dyn ResourceModel, ignore: &[&str]) -> Vec<String> {
        let Some(other) = other.as_any().downcast_ref::<Document>() else {
            return vec!["resourceType".to_string()];
        };
        let mut paths = Vec::new();
        if self.resource_type != other.resource_type {
            paths.push("resourceType".to_string());
        }
        if self.id != other.id {
            paths.push("id".to_string());
        }
        if self.version_id != other.version_id {
            paths.push("meta.versionId".to_string());
        }
        let names: BTreeSet<&String> = self.fields.keys().chain(other.fields.keys()).collect();
        for name in names {
            if self.fields.get(name) != other.fields.get(name) {
                paths.push(name.clone());
            }
        }
        paths.retain(|path| !ignore.contains(&path.as_str()));
        paths
    }

    fn with_id(&self, id: Option<&str>) -> Box<dyn ResourceModel> {
        let mut copy = self.clone();
        copy.id = id.map(str::to_string);
        Box::new(copy)
    }

    fn with_field(&self, path: &str, value: &str) -> Box<dyn ResourceModel> {
        Box::new(self.clone().field(path, value))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One entry of a bundle: a request, a response, or a search match.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct BundleEntry {
    pub method: Option<String>,
    pub url: Option<String>,
    /// Response status, e.g. `201 Created`.
    pub status: Option<String>,
    pub location: Option<String>,
    pub resource: Option<Document>,
}

impl BundleEntry {
    pub fn request(method: &str, url: &str, resource: Option<Document>) -> Self {
        Self {
            method: Some(method.to_string()),
            url: Some(url.to_string()),
            status: None,
            location: None,
            resource,
        }
    }

    pub fn matched(resource: Document) -> Self {
        Self {
            method: None,
            url: None,
            status: None,
            location: None,
            resource: Some(resource),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Bundle {
    pub resource_type: String,
    /// `searchset`, `history`, `transaction`, `batch`, or a `-response`.
    pub bundle_type: String,
    pub total: Option<usize>,
    pub entries: Vec<BundleEntry>,
}

impl Bundle {
    pub fn new(bundle_type: &str, entries: Vec<BundleEntry>) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            bundle_type: bundle_type.to_string(),
            total: None,
            entries,
        }
    }

    pub fn with_total(mut self) -> Self {
        self.total = Some(self.entries.len());
        self
    }
}

impl ResourceModel for Bundle {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn id(&self) -> Option<&str> {
        None
    }

    fn to_json(&self) -> Result<String, ModelError> {
        facet_json::to_string(self).map_err(|e| ModelError::Serialize(e.to_string()))
    }

    fn mismatch(&self, other: &dyn ResourceModel, _ignore: &[&str]) -> Vec<String> {
        match other.as_any().downcast_ref::<Bundle>() {
            Some(other) if other == self => Vec::new(),
            Some(_) => vec!["entries".to_string()],
            None => vec!["resourceType".to_string()],
        }
    }

    fn entries(&self) -> Vec<&dyn ResourceModel> {
        self.entries
            .iter()
            .filter_map(|entry| entry.resource.as_ref())
            .map(|doc| doc as &dyn ResourceModel)
            .collect()
    }

    fn total(&self) -> Option<usize> {
        self.total
    }

    fn with_id(&self, _id: Option<&str>) -> Box<dyn ResourceModel> {
        Box::new(self.clone())
    }

    fn with_field(&self, _path: &str, _value: &str) -> Box<dyn ResourceModel> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Issue {
    /// `fatal`, `error`, `warning` or `information`.
    pub severity: String,
    pub diagnostics: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct OperationOutcome {
    pub resource_type: String,
    pub issues: Vec<Issue>,
}

impl OperationOutcome {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issues,
        }
    }

    pub fn error(diagnostics: impl Into<String>) -> Self {
        Self::new(vec![Issue {
            severity: "error".to_string(),
            diagnostics: diagnostics.into(),
        }])
    }

    pub fn information(diagnostics: impl Into<String>) -> Self {
        Self::new(vec![Issue {
            severity: "information".to_string(),
            diagnostics: diagnostics.into(),
        }])
    }

    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == "error" || i.severity == "fatal")
    }
}

impl ResourceModel for OperationOutcome {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn id(&self) -> Option<&str> {
        None
    }

    fn to_json(&self) -> Result<String, ModelError> {
        facet_json::to_string(self).map_err(|e| ModelError::Serialize(e.to_string()))
    }

    fn mismatch(&self, other: &dyn ResourceModel, _ignore: &[&str]) -> Vec<String> {
        match other.as_any().downcast_ref::<OperationOutcome>() {
            Some(other) if other == self => Vec::new(),
            Some(_) => vec!["issue".to_string()],
            None => vec!["resourceType".to_string()],
        }
    }

    fn issues(&self) -> Vec<String> {
        self.issues
            .iter()
            .map(|i| format!("{}: {}", i.severity, i.diagnostics))
            .collect()
    }

    fn with_id(&self, _id: Option<&str>) -> Box<dyn ResourceModel> {
        Box::new(self.clone())
    }

    fn with_field(&self, _path: &str, _value: &str) -> Box<dyn ResourceModel> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Parse a JSON body into whichever shape it has.
pub fn parse_json(bytes: &[u8]) -> Result<Box<dyn ResourceModel>, ModelError> {
    if let Ok(document) = facet_json::from_slice::<Document>(bytes)
        && document.resource_type != "Bundle"
        && document.resource_type != "OperationOutcome"
    {
        return Ok(Box::new(document));
    }
    if let Ok(bundle) = facet_json::from_slice::<Bundle>(bytes) {
        return Ok(Box::new(bundle));
    }
    match facet_json::from_slice::<OperationOutcome>(bytes) {
        Ok(outcome) => Ok(Box::new(outcome)),
        Err(e) => Err(ModelError::Parse {
            format: Format::Json,
            detail: e.to_string(),
        }),
    }
}

pub fn parse_document(body: &str) -> Result<Document, ModelError> {
    facet_json::from_str::<Document>(body).map_err(|e| ModelError::Parse {
        format: Format::Json,
        detail: e.to_string(),
    })
}

pub fn parse_bundle(body: &str) -> Result<Bundle, ModelError> {
    facet_json::from_str::<Bundle>(body).map_err(|e| ModelError::Parse {
        format: Format::Json,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> Document {
        Document::new("Patient")
            .field("name", "Peter")
            .field("gender", "male")
    }

    #[test]
    fn mismatch_reports_changed_and_missing_fields() {
        let a = patient();
        let b = patient().field("gender", "female").field("birthDate", "1974-12-25");
        assert_eq!(a.mismatch(&b, &[]), vec!["birthDate", "gender"]);
        assert_eq!(a.mismatch(&b, &["gender", "birthDate"]), Vec::<String>::new());
    }

    #[test]
    fn identity_differences_can_be_ignored() {
        let a = patient();
        let b = a.with_id(Some("7"));
        assert_eq!(a.mismatch(b.as_ref(), &[]), vec!["id"]);
        assert!(a.matches(b.as_ref(), &["id"]));
    }

    #[test]
    fn bodies_parse_into_their_own_shape() {
        let json = OperationOutcome::error("bad").to_json().unwrap();
        let parsed = parse_json(json.as_bytes()).unwrap();
        assert_eq!(parsed.resource_type(), "OperationOutcome");
        assert_eq!(parsed.issues(), vec!["error: bad"]);

        let json = patient().to_json().unwrap();
        let parsed = parse_json(json.as_bytes()).unwrap();
        assert_eq!(parsed.resource_type(), "Patient");

        let json = Bundle::new("searchset", vec![BundleEntry::matched(patient())])
            .with_total()
            .to_json()
            .unwrap();
        let parsed = parse_json(json.as_bytes()).unwrap();
        assert_eq!(parsed.total(), Some(1));
        assert_eq!(parsed.entries().len(), 1);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_json(b"not json"),
            Err(ModelError::Parse { .. })
        ));
    }
}
