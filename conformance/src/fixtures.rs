//! Fixture provider contract.

use crate::resource::{ModelError, ResourceModel};

/// Kind of bundle submitted to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    /// All entries succeed or none do.
    Transaction,
    /// Entries are processed independently.
    Batch,
}

impl BundleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BundleKind::Transaction => "transaction",
            BundleKind::Batch => "batch",
        }
    }
}

/// One request inside a transaction or batch bundle.
#[derive(Debug)]
pub struct BundleRequest {
    /// HTTP method: `POST`, `PUT`, `GET` or `DELETE`.
    pub method: &'static str,
    /// Relative URL, e.g. `Patient` or `Patient/123`.
    pub url: String,
    pub resource: Option<Box<dyn ResourceModel>>,
}

impl BundleRequest {
    pub fn post(resource: Box<dyn ResourceModel>) -> Self {
        Self {
            method: "POST",
            url: resource.resource_type().to_string(),
            resource: Some(resource),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET",
            url: url.into(),
            resource: None,
        }
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: "DELETE",
            url: url.into(),
            resource: None,
        }
    }
}

/// Source of example and generated resources.
pub trait FixtureSource {
    /// A fixed, well-known example of `resource_type`, if one exists.
    fn example(&self, resource_type: &str) -> Option<Box<dyn ResourceModel>>;

    /// A freshly generated resource of `resource_type`, without an id.
    fn generate(&self, resource_type: &str) -> Result<Box<dyn ResourceModel>, ModelError>;

    /// Serialize a transaction or batch bundle.
    fn bundle(&self, kind: BundleKind, entries: Vec<BundleRequest>) -> Result<String, ModelError>;
}
