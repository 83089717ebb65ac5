//! REST client contract.
//!
//! Suites talk to the server under test through [`FhirClient`]. The engine
//! itself never issues requests; it only hands clients to test bodies via
//! the [`Session`](crate::harness::Session).

use std::collections::BTreeMap;
use std::fmt;

use crate::capability::CapabilityStatement;
use crate::resource::ResourceModel;

/// Interaction names, as they appear in capability statements and in
/// `requires` / `validates` declarations.
pub mod interaction {
    pub const READ: &str = "read";
    pub const VREAD: &str = "vread";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";
    pub const CREATE: &str = "create";
    pub const SEARCH: &str = "search-type";
    pub const HISTORY_INSTANCE: &str = "history-instance";
    pub const HISTORY_TYPE: &str = "history-type";
    pub const VALIDATE: &str = "validate";
    pub const TRANSACTION: &str = "transaction";
    pub const BATCH: &str = "batch";
    pub const SEARCH_SYSTEM: &str = "search-system";
    pub const HISTORY_SYSTEM: &str = "history-system";
    pub const CAPABILITIES: &str = "capabilities";
}

/// A response from the server under test.
#[derive(Debug)]
pub struct ClientReply {
    /// HTTP status code.
    pub code: u16,
    /// Raw response body.
    pub body: String,
    /// Response headers, keys lowercased.
    pub headers: BTreeMap<String, String>,
    /// The parsed body, when it could be parsed.
    pub resource: Option<Box<dyn ResourceModel>>,
}

impl ClientReply {
    pub fn new(code: u16, body: impl Into<String>) -> Self {
        Self {
            code,
            body: body.into(),
            headers: BTreeMap::new(),
            resource: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_resource(mut self, resource: Box<dyn ResourceModel>) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn resource(&self) -> Option<&dyn ResourceModel> {
        self.resource.as_deref()
    }
}

/// Error type for client operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The request could not be delivered or the connection failed.
    Transport(String),
    /// The response could not be decoded.
    Decode(String),
    /// The client does not implement this interaction.
    Unsupported(&'static str),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(msg) => write!(f, "transport error: {}", msg),
            ClientError::Decode(msg) => write!(f, "failed to decode response: {}", msg),
            ClientError::Unsupported(what) => write!(f, "client does not support {}", what),
        }
    }
}

impl std::error::Error for ClientError {}

/// A client for one server under test.
///
/// Every interaction answers with a [`ClientReply`] whenever the server
/// answered at all, whatever the HTTP status; `Err` is reserved for the
/// request not completing.
pub trait FhirClient {
    /// Base URL of the server, for reports.
    fn base_url(&self) -> &str;

    fn create(&mut self, resource_type: &str, body: &str) -> Result<ClientReply, ClientError>;

    fn read(&mut self, resource_type: &str, id: &str) -> Result<ClientReply, ClientError>;

    fn vread(
        &mut self,
        resource_type: &str,
        id: &str,
        version_id: &str,
    ) -> Result<ClientReply, ClientError>;

    fn update(
        &mut self,
        resource_type: &str,
        id: &str,
        body: &str,
    ) -> Result<ClientReply, ClientError>;

    fn destroy(&mut self, resource_type: &str, id: &str) -> Result<ClientReply, ClientError>;

    fn search(
        &mut self,
        resource_type: &str,
        params: &[(&str, &str)],
    ) -> Result<ClientReply, ClientError>;

    /// Instance history when `id` is given, type history otherwise.
    fn history(
        &mut self,
        resource_type: &str,
        id: Option<&str>,
    ) -> Result<ClientReply, ClientError>;

    fn validate(&mut self, resource_type: &str, body: &str) -> Result<ClientReply, ClientError>;

    fn transaction(&mut self, bundle: &str) -> Result<ClientReply, ClientError>;

    fn batch(&mut self, bundle: &str) -> Result<ClientReply, ClientError>;

    /// A named custom operation (`$name`), at type level or on an instance.
    fn operation(
        &mut self,
        _resource_type: Option<&str>,
        _id: Option<&str>,
        _name: &str,
        _body: Option<&str>,
    ) -> Result<ClientReply, ClientError> {
        Err(ClientError::Unsupported("custom operations"))
    }

    /// The server's own capability declaration.
    fn capability_statement(&mut self) -> Result<CapabilityStatement, ClientError>;
}
