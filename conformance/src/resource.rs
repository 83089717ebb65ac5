//! Resource-model contract.
//!
//! The harness treats resources as opaque objects. Test bodies need only a
//! handful of operations from them: identity, serialization, structural
//! comparison, and access to the issues of operation outcomes and the
//! entries of bundles.

use std::any::Any;
use std::fmt;

/// Serialization formats a codec may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
}

impl Format {
    pub fn mime_type(self) -> &'static str {
        match self {
            Format::Json => "application/fhir+json",
            Format::Xml => "application/fhir+xml",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => write!(f, "json"),
            Format::Xml => write!(f, "xml"),
        }
    }
}

/// Error type for resource-model operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The input could not be parsed.
    Parse { format: Format, detail: String },
    /// The model could not serialize the resource.
    Serialize(String),
    /// The codec does not handle this format.
    UnsupportedFormat(Format),
    /// The model does not know this resource type.
    UnknownType(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Parse { format, detail } => {
                write!(f, "failed to parse {} resource: {}", format, detail)
            }
            ModelError::Serialize(detail) => write!(f, "failed to serialize resource: {}", detail),
            ModelError::UnsupportedFormat(format) => write!(f, "unsupported format: {}", format),
            ModelError::UnknownType(name) => write!(f, "unknown resource type: {}", name),
        }
    }
}

impl std::error::Error for ModelError {}

/// A typed protocol resource.
pub trait ResourceModel: fmt::Debug {
    fn resource_type(&self) -> &str;

    fn id(&self) -> Option<&str>;

    fn version_id(&self) -> Option<&str> {
        None
    }

    fn to_json(&self) -> Result<String, ModelError>;

    /// Paths of the fields that differ from `other`, skipping any path
    /// listed in `ignore`. Empty when the two are structurally equal.
    fn mismatch(&self, other: &dyn ResourceModel, ignore: &[&str]) -> Vec<String>;

    fn matches(&self, other: &dyn ResourceModel, ignore: &[&str]) -> bool {
        self.mismatch(other, ignore).is_empty()
    }

    /// Issue messages, for operation-outcome resources.
    fn issues(&self) -> Vec<String> {
        Vec::new()
    }

    /// Contained entries, for bundle resources.
    fn entries(&self) -> Vec<&dyn ResourceModel> {
        Vec::new()
    }

    /// Total match count declared by a search bundle.
    fn total(&self) -> Option<usize> {
        None
    }

    /// A clone with a different id, used to retarget fixtures.
    fn with_id(&self, id: Option<&str>) -> Box<dyn ResourceModel>;

    /// A clone with one field changed, used by update tests.
    fn with_field(&self, path: &str, value: &str) -> Box<dyn ResourceModel>;

    fn as_any(&self) -> &dyn Any;
}

/// Builds resources from raw bytes.
pub trait ResourceCodec {
    fn parse(&self, format: Format, bytes: &[u8]) -> Result<Box<dyn ResourceModel>, ModelError>;
}

/// A type known to the resource model.
///
/// Only descriptors with `is_resource` set are used to expand
/// resource-parameterized suites; datatypes and abstract bases are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub is_resource: bool,
}

impl TypeDescriptor {
    pub fn resource(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_resource: true,
        }
    }

    pub fn datatype(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_resource: false,
        }
    }
}
