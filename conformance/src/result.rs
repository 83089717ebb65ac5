//! Test results.
//!
//! A [`TestResult`] is the single outcome of one test invocation. It is built
//! by the test wrapper (see [`crate::harness`]) and is read-only for everyone
//! else: status, message and data change together through
//! [`TestResult::update`], and the evidence lists are attached once by the
//! wrapper.

use std::fmt;

/// Terminal status of a test invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    /// The body ran to completion without a failure or error.
    Pass,
    /// An assertion written by the test author was not satisfied.
    Fail,
    /// The test's preconditions were not met.
    Skip,
    /// Something unexpected happened: a collaborator failure or a bug in the test.
    Error,
}

impl Status {
    /// All statuses, in report order.
    pub const ALL: [Status; 4] = [Status::Pass, Status::Fail, Status::Skip, Status::Error];

    /// Lowercase name used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Skip => "skip",
            Status::Error => "error",
        }
    }

    /// Parse a lowercase status name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pass" => Some(Status::Pass),
            "fail" => Some(Status::Fail),
            "skip" => Some(Status::Skip),
            "error" => Some(Status::Error),
            _ => None,
        }
    }

    /// Whether this status counts against the server (or the harness).
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Fail | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-text explanation attached to a result.
///
/// Most results carry a single line. Failures built from an operation
/// outcome carry one line per reported issue, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Lines(Vec<String>),
}

impl Message {
    /// The message as an ordered list of lines.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Message::Text(text) => vec![text.clone()],
            Message::Lines(lines) => lines.clone(),
        }
    }

    /// The message flattened into one string, lines separated by `"; "`.
    pub fn joined(&self) -> String {
        match self {
            Message::Text(text) => text.clone(),
            Message::Lines(lines) => lines.join("; "),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<Vec<String>> for Message {
    fn from(lines: Vec<String>) -> Self {
        Message::Lines(lines)
    }
}

/// A declared capability: interactions on one resource type, or on the
/// whole system when `resource` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub resource: Option<String>,
    pub methods: Vec<String>,
}

impl Requirement {
    /// Interactions on a single resource type.
    pub fn resource(resource: impl Into<String>, methods: &[&str]) -> Self {
        Self {
            resource: Some(resource.into()),
            methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// System-wide interactions (transaction, batch, capabilities, ...).
    pub fn system(methods: &[&str]) -> Self {
        Self {
            resource: None,
            methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:[{}]",
            self.resource.as_deref().unwrap_or("system"),
            self.methods.join(",")
        )
    }
}

/// Status, message and data produced together.
///
/// Test bodies that build their outcome incrementally return one of these
/// instead of (or in addition to) raising signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: Status,
    pub message: Option<Message>,
    pub data: Option<String>,
}

impl Verdict {
    pub fn new(status: Status, message: Option<Message>, data: Option<String>) -> Self {
        Self {
            status,
            message,
            data,
        }
    }

    pub fn pass() -> Self {
        Self::new(Status::Pass, None, None)
    }

    pub fn fail(message: impl Into<Message>) -> Self {
        Self::new(Status::Fail, Some(message.into()), None)
    }

    pub fn skip(message: impl Into<Message>) -> Self {
        Self::new(Status::Skip, Some(message.into()), None)
    }
}

/// The outcome of one test invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    key: String,
    description: String,
    status: Status,
    message: Option<Message>,
    data: Option<String>,
    warnings: Vec<String>,
    requires: Vec<Requirement>,
    validates: Vec<Requirement>,
    links: Vec<String>,
    code: Option<String>,
}

impl TestResult {
    /// A fresh `pass` result with no evidence.
    pub fn new(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            status: Status::Pass,
            message: None,
            data: None,
            warnings: Vec::new(),
            requires: Vec::new(),
            validates: Vec::new(),
            links: Vec::new(),
            code: None,
        }
    }

    /// Overwrite status, message and data together.
    pub fn update(&mut self, status: Status, message: Option<Message>, data: Option<String>) {
        self.status = status;
        self.message = message;
        self.data = data;
    }

    pub(crate) fn apply(&mut self, verdict: Verdict) {
        self.update(verdict.status, verdict.message, verdict.data);
    }

    pub(crate) fn set_code(&mut self, code: &str) {
        self.code = Some(code.to_string());
    }

    pub(crate) fn attach_evidence(
        &mut self,
        warnings: Vec<String>,
        requires: Vec<Requirement>,
        validates: Vec<Requirement>,
        links: Vec<String>,
    ) {
        self.warnings.extend(warnings);
        self.requires.extend(requires);
        self.validates.extend(validates);
        self.links.extend(links);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// The message flattened to one string, if any.
    pub fn message_text(&self) -> Option<String> {
        self.message.as_ref().map(Message::joined)
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn requires(&self) -> &[Requirement] {
        &self.requires
    }

    pub fn validates(&self) -> &[Requirement] {
        &self.validates
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    /// Source text of the test body.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}
