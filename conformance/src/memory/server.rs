//! In-process reference server.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::trace;

use crate::capability::CapabilityStatement;
use crate::client::{ClientError, ClientReply, FhirClient, interaction};
use crate::resource::ResourceModel;

use super::model::{self, Bundle, BundleEntry, Document, OperationOutcome};

/// Interactions declared for every resource type by default.
const RESOURCE_INTERACTIONS: &[&str] = &[
    interaction::READ,
    interaction::VREAD,
    interaction::UPDATE,
    interaction::DELETE,
    interaction::CREATE,
    interaction::SEARCH,
    interaction::HISTORY_INSTANCE,
    interaction::HISTORY_TYPE,
    interaction::VALIDATE,
];

const SYSTEM_INTERACTIONS: &[&str] = &[
    interaction::TRANSACTION,
    interaction::BATCH,
    interaction::CAPABILITIES,
];

/// One request the server received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: &'static str,
    pub path: String,
}

#[derive(Debug, Clone, Default)]
struct Record {
    versions: Vec<Document>,
    deleted: bool,
}

impl Record {
    fn current(&self) -> Option<&Document> {
        if self.deleted {
            None
        } else {
            self.versions.last()
        }
    }

    fn next_version(&self) -> String {
        (self.versions.len() + 1).to_string()
    }
}

#[derive(Debug, Clone, Default)]
struct Data {
    next_id: u64,
    records: BTreeMap<(String, String), Record>,
}

#[derive(Debug)]
struct Store {
    data: Data,
    types: BTreeSet<String>,
    fhir_version: String,
    /// (resource type or `None` for system, interaction) answering 405.
    disabled: BTreeSet<(Option<String>, String)>,
    /// (resource type, interaction) forced to answer with a status code.
    injected: BTreeMap<(String, String), u16>,
    requests: Vec<Request>,
}

/// What one interaction produced, before it is turned into a reply.
#[derive(Debug)]
struct Outcome {
    code: u16,
    body: Body,
    location: Option<String>,
}

#[derive(Debug)]
enum Body {
    Empty,
    Document(Document),
    Bundle(Bundle),
    Outcome(OperationOutcome),
}

impl Outcome {
    fn document(code: u16, document: Document) -> Self {
        Self {
            code,
            body: Body::Document(document),
            location: None,
        }
    }

    fn problem(code: u16, diagnostics: impl Into<String>) -> Self {
        Self {
            code,
            body: Body::Outcome(OperationOutcome::error(diagnostics)),
            location: None,
        }
    }

    fn status_line(&self) -> String {
        let reason = match self.code {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            410 => "Gone",
            _ => "",
        };
        format!("{} {}", self.code, reason).trim_end().to_string()
    }
}

/// A versioned resource store answering the [`FhirClient`] interactions.
///
/// Handles are cheap to clone and share one store, so a test can keep a
/// handle to inspect the request log after giving another to a session.
#[derive(Debug, Clone)]
pub struct MemoryServer {
    base_url: String,
    store: Rc<RefCell<Store>>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    /// A server knowing every resource type of [`super::document_types`].
    pub fn new() -> Self {
        Self::with_types(
            "memory://primary",
            super::document_types()
                .into_iter()
                .filter(|t| t.is_resource)
                .map(|t| t.name),
        )
    }

    pub fn with_types(base_url: &str, types: impl IntoIterator<Item = String>) -> Self {
        Self {
            base_url: base_url.to_string(),
            store: Rc::new(RefCell::new(Store {
                data: Data::default(),
                types: types.into_iter().collect(),
                fhir_version: "4.0.1".to_string(),
                disabled: BTreeSet::new(),
                injected: BTreeMap::new(),
                requests: Vec::new(),
            })),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn set_fhir_version(&self, version: &str) {
        self.store.borrow_mut().fhir_version = version.to_string();
    }

    /// Stop supporting `interaction` on `resource_type`: it disappears from
    /// the capability statement and answers 405.
    pub fn disable(&self, resource_type: &str, interaction: &str) {
        self.store
            .borrow_mut()
            .disabled
            .insert((Some(resource_type.to_string()), interaction.to_string()));
    }

    pub fn disable_system(&self, interaction: &str) {
        self.store
            .borrow_mut()
            .disabled
            .insert((None, interaction.to_string()));
    }

    /// Keep declaring `interaction` but answer it with `code`.
    pub fn inject_failure(&self, resource_type: &str, interaction: &str, code: u16) {
        self.store.borrow_mut().injected.insert(
            (resource_type.to_string(), interaction.to_string()),
            code,
        );
    }

    pub fn requests(&self) -> Vec<Request> {
        self.store.borrow().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.store.borrow_mut().requests.clear();
    }

    /// Number of live (not deleted) resources of `resource_type`.
    pub fn count(&self, resource_type: &str) -> usize {
        self.store
            .borrow()
            .data
            .records
            .iter()
            .filter(|((rt, _), record)| rt == resource_type && !record.deleted)
            .count()
    }

    fn handle(
        &self,
        method: &'static str,
        path: String,
        f: impl FnOnce(&mut Store) -> Outcome,
    ) -> Result<ClientReply, ClientError> {
        let mut store = self.store.borrow_mut();
        trace!(base = %self.base_url, method, path = %path, "request");
        store.requests.push(Request { method, path });
        let outcome = f(&mut store);
        drop(store);
        into_reply(outcome)
    }
}

fn into_reply(outcome: Outcome) -> Result<ClientReply, ClientError> {
    let encode = |e: crate::resource::ModelError| ClientError::Transport(e.to_string());
    let mut reply = match outcome.body {
        Body::Empty => ClientReply::new(outcome.code, ""),
        Body::Document(document) => {
            let body = document.to_json().map_err(encode)?;
            let mut reply = ClientReply::new(outcome.code, body);
            if let Some(version) = &document.version_id {
                reply = reply.with_header("ETag", format!("W/\"{}\"", version));
            }
            reply.with_resource(Box::new(document))
        }
        Body::Bundle(bundle) => {
            let body = bundle.to_json().map_err(encode)?;
            ClientReply::new(outcome.code, body).with_resource(Box::new(bundle))
        }
        Body::Outcome(issues) => {
            let body = issues.to_json().map_err(encode)?;
            ClientReply::new(outcome.code, body).with_resource(Box::new(issues))
        }
    };
    if let Some(location) = outcome.location {
        reply = reply.with_header("Location", location);
    }
    Ok(reply)
}

impl Store {
    /// The outcome refusing `interaction`, if it must be refused.
    fn refuse(&self, resource_type: &str, interaction: &str) -> Option<Outcome> {
        if !self.types.contains(resource_type) {
            return Some(Outcome::problem(
                404,
                format!("Unknown resource type {}", resource_type),
            ));
        }
        if self
            .disabled
            .contains(&(Some(resource_type.to_string()), interaction.to_string()))
        {
            return Some(Outcome::problem(
                405,
                format!("{} is not supported for {}", interaction, resource_type),
            ));
        }
        self.injected
            .get(&(resource_type.to_string(), interaction.to_string()))
            .map(|code| Outcome::problem(*code, format!("{} failed", interaction)))
    }

    fn refuse_system(&self, interaction: &str) -> Option<Outcome> {
        if self.disabled.contains(&(None, interaction.to_string())) {
            return Some(Outcome::problem(
                405,
                format!("{} is not supported", interaction),
            ));
        }
        None
    }

    fn capability_statement(&self) -> CapabilityStatement {
        let mut statement = CapabilityStatement::new(self.fhir_version.clone());
        for resource_type in &self.types {
            let supported: Vec<&str> = RESOURCE_INTERACTIONS
                .iter()
                .copied()
                .filter(|i| {
                    !self
                        .disabled
                        .contains(&(Some(resource_type.clone()), i.to_string()))
                })
                .collect();
            statement.declare(resource_type, &supported);
        }
        let system: Vec<&str> = SYSTEM_INTERACTIONS
            .iter()
            .copied()
            .filter(|i| !self.disabled.contains(&(None, i.to_string())))
            .collect();
        statement.declare_system(&system);
        statement
    }
}

fn parse_body(resource_type: &str, body: &str) -> Result<Document, Outcome> {
    let document = model::parse_document(body).map_err(|e| Outcome::problem(400, e.to_string()))?;
    if document.resource_type != resource_type {
        return Err(Outcome::problem(
            400,
            format!(
                "Resource type {} does not match endpoint {}",
                document.resource_type, resource_type
            ),
        ));
    }
    Ok(document)
}

/// Rules a document must satisfy to be accepted.
fn validation_issues(document: &Document) -> Vec<String> {
    let mut issues = Vec::new();
    for (name, value) in &document.fields {
        if value.trim().is_empty() {
            issues.push(format!("{}.{} must not be empty", document.resource_type, name));
        }
    }
    if document.resource_type == "Patient"
        && let Some(gender) = document.get("gender")
        && !["male", "female", "other", "unknown"].contains(&gender)
    {
        issues.push(format!("Patient.gender has invalid code {}", gender));
    }
    if document.resource_type == "Observation" && document.get("status").is_none() {
        issues.push("Observation.status is required".to_string());
    }
    issues
}

impl Data {
    fn create(&mut self, resource_type: &str, mut document: Document) -> Outcome {
        let issues = validation_issues(&document);
        if !issues.is_empty() {
            return Outcome::problem(400, issues.join("; "));
        }
        self.next_id += 1;
        let id = self.next_id.to_string();
        document.id = Some(id.clone());
        document.version_id = Some("1".to_string());
        self.records.insert(
            (resource_type.to_string(), id.clone()),
            Record {
                versions: vec![document.clone()],
                deleted: false,
            },
        );
        Outcome {
            location: Some(format!("{}/{}/_history/1", resource_type, id)),
            ..Outcome::document(201, document)
        }
    }

    fn read(&self, resource_type: &str, id: &str) -> Outcome {
        match self.records.get(&(resource_type.to_string(), id.to_string())) {
            None => Outcome::problem(404, format!("{}/{} not found", resource_type, id)),
            Some(record) => match record.current() {
                Some(document) => Outcome::document(200, document.clone()),
                None => Outcome::problem(410, format!("{}/{} was deleted", resource_type, id)),
            },
        }
    }

    fn vread(&self, resource_type: &str, id: &str, version_id: &str) -> Outcome {
        self.records
            .get(&(resource_type.to_string(), id.to_string()))
            .and_then(|record| {
                record
                    .versions
                    .iter()
                    .find(|v| v.version_id.as_deref() == Some(version_id))
            })
            .map(|document| Outcome::document(200, document.clone()))
            .unwrap_or_else(|| {
                Outcome::problem(
                    404,
                    format!("{}/{}/_history/{} not found", resource_type, id, version_id),
                )
            })
    }

    fn update(&mut self, resource_type: &str, id: &str, mut document: Document) -> Outcome {
        if document.id.as_deref().is_some_and(|given| given != id) {
            return Outcome::problem(400, format!("Resource id does not match {}", id));
        }
        let issues = validation_issues(&document);
        if !issues.is_empty() {
            return Outcome::problem(400, issues.join("; "));
        }
        let key = (resource_type.to_string(), id.to_string());
        let record = self.records.entry(key).or_default();
        let created = record.versions.is_empty();
        let version = record.next_version();
        document.id = Some(id.to_string());
        document.version_id = Some(version.clone());
        record.versions.push(document.clone());
        record.deleted = false;
        Outcome {
            location: Some(format!("{}/{}/_history/{}", resource_type, id, version)),
            ..Outcome::document(if created { 201 } else { 200 }, document)
        }
    }

    fn destroy(&mut self, resource_type: &str, id: &str) -> Outcome {
        match self
            .records
            .get_mut(&(resource_type.to_string(), id.to_string()))
        {
            None => Outcome::problem(404, format!("{}/{} not found", resource_type, id)),
            Some(record) => {
                record.deleted = true;
                Outcome {
                    code: 204,
                    body: Body::Empty,
                    location: None,
                }
            }
        }
    }

    fn search(&self, resource_type: &str, params: &[(&str, &str)]) -> Outcome {
        let entries: Vec<BundleEntry> = self
            .records
            .iter()
            .filter(|((rt, _), _)| rt == resource_type)
            .filter_map(|(_, record)| record.current())
            .filter(|document| {
                params.iter().all(|(name, value)| match *name {
                    "_count" | "_format" => true,
                    "_id" => document.id.as_deref() == Some(*value),
                    field => document.get(field) == Some(*value),
                })
            })
            .cloned()
            .map(BundleEntry::matched)
            .collect();
        Outcome {
            code: 200,
            body: Body::Bundle(Bundle::new("searchset", entries).with_total()),
            location: None,
        }
    }

    fn history(&self, resource_type: &str, id: Option<&str>) -> Outcome {
        let mut entries = Vec::new();
        let mut found = false;
        for ((rt, rid), record) in &self.records {
            if rt != resource_type || id.is_some_and(|id| id != rid) {
                continue;
            }
            found = true;
            if record.deleted {
                entries.push(BundleEntry::request(
                    "DELETE",
                    &format!("{}/{}", rt, rid),
                    None,
                ));
            }
            for document in record.versions.iter().rev() {
                entries.push(BundleEntry::matched(document.clone()));
            }
        }
        if let Some(id) = id
            && !found
        {
            return Outcome::problem(404, format!("{}/{} not found", resource_type, id));
        }
        Outcome {
            code: 200,
            body: Body::Bundle(Bundle::new("history", entries).with_total()),
            location: None,
        }
    }
}

/// Split `Patient/123` into its type and id.
fn split_url(url: &str) -> (&str, Option<&str>) {
    match url.split_once('/') {
        Some((resource_type, id)) => (resource_type, Some(id)),
        None => (url, None),
    }
}

impl Store {
    /// Apply one bundle entry to `data`.
    fn apply_entry(&self, data: &mut Data, entry: &BundleEntry) -> Outcome {
        let method = entry.method.as_deref().unwrap_or("");
        let (resource_type, id) = split_url(entry.url.as_deref().unwrap_or(""));
        let wanted = match (method, id) {
            ("POST", None) => interaction::CREATE,
            ("PUT", Some(_)) => interaction::UPDATE,
            ("GET", Some(_)) => interaction::READ,
            ("DELETE", Some(_)) => interaction::DELETE,
            _ => return Outcome::problem(400, format!("Unsupported entry {} {}", method, resource_type)),
        };
        if let Some(refused) = self.refuse(resource_type, wanted) {
            return refused;
        }
        let resource = match (&entry.resource, wanted) {
            (Some(document), _) => Some(document.clone()),
            (None, interaction::CREATE | interaction::UPDATE) => {
                return Outcome::problem(400, "Entry has no resource");
            }
            (None, _) => None,
        };
        match (wanted, id, resource) {
            (interaction::CREATE, _, Some(document)) => data.create(resource_type, document),
            (interaction::UPDATE, Some(id), Some(document)) => data.update(resource_type, id, document),
            (interaction::READ, Some(id), _) => data.read(resource_type, id),
            (interaction::DELETE, Some(id), _) => data.destroy(resource_type, id),
            _ => Outcome::problem(400, "Malformed entry"),
        }
    }

    fn bundle(&mut self, body: &str, transaction: bool) -> Outcome {
        let kind = if transaction { "transaction" } else { "batch" };
        let bundle = match model::parse_bundle(body) {
            Ok(bundle) => bundle,
            Err(e) => return Outcome::problem(400, e.to_string()),
        };
        if bundle.bundle_type != kind {
            return Outcome::problem(
                400,
                format!("Expected a {} bundle, got {}", kind, bundle.bundle_type),
            );
        }

        let mut scratch = self.data.clone();
        let mut responses = Vec::new();
        let mut failures = Vec::new();
        for (index, entry) in bundle.entries.iter().enumerate() {
            let outcome = self.apply_entry(&mut scratch, entry);
            if outcome.code >= 400 {
                failures.push(format!("entry {} failed with {}", index, outcome.code));
            }
            responses.push(BundleEntry {
                method: None,
                url: None,
                status: Some(outcome.status_line()),
                location: outcome.location.clone(),
                resource: match outcome.body {
                    Body::Document(document) => Some(document),
                    _ => None,
                },
            });
        }

        if transaction && !failures.is_empty() {
            return Outcome {
                code: 400,
                body: Body::Outcome(OperationOutcome::new(
                    failures
                        .into_iter()
                        .map(|diagnostics| model::Issue {
                            severity: "error".to_string(),
                            diagnostics,
                        })
                        .collect(),
                )),
                location: None,
            };
        }
        self.data = scratch;
        Outcome {
            code: 200,
            body: Body::Bundle(Bundle::new(&format!("{}-response", kind), responses)),
            location: None,
        }
    }
}

impl FhirClient for MemoryServer {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn create(&mut self, resource_type: &str, body: &str) -> Result<ClientReply, ClientError> {
        self.handle("POST", resource_type.to_string(), |store| {
            if let Some(refused) = store.refuse(resource_type, interaction::CREATE) {
                return refused;
            }
            match parse_body(resource_type, body) {
                Ok(document) => store.data.create(resource_type, document),
                Err(problem) => problem,
            }
        })
    }

    fn read(&mut self, resource_type: &str, id: &str) -> Result<ClientReply, ClientError> {
        self.handle("GET", format!("{}/{}", resource_type, id), |store| {
            store
                .refuse(resource_type, interaction::READ)
                .unwrap_or_else(|| store.data.read(resource_type, id))
        })
    }

    fn vread(
        &mut self,
        resource_type: &str,
        id: &str,
        version_id: &str,
    ) -> Result<ClientReply, ClientError> {
        let path = format!("{}/{}/_history/{}", resource_type, id, version_id);
        self.handle("GET", path, |store| {
            store
                .refuse(resource_type, interaction::VREAD)
                .unwrap_or_else(|| store.data.vread(resource_type, id, version_id))
        })
    }

    fn update(
        &mut self,
        resource_type: &str,
        id: &str,
        body: &str,
    ) -> Result<ClientReply, ClientError> {
        self.handle("PUT", format!("{}/{}", resource_type, id), |store| {
            if let Some(refused) = store.refuse(resource_type, interaction::UPDATE) {
                return refused;
            }
            match parse_body(resource_type, body) {
                Ok(document) => store.data.update(resource_type, id, document),
                Err(problem) => problem,
            }
        })
    }

    fn destroy(&mut self, resource_type: &str, id: &str) -> Result<ClientReply, ClientError> {
        self.handle("DELETE", format!("{}/{}", resource_type, id), |store| {
            store
                .refuse(resource_type, interaction::DELETE)
                .unwrap_or_else(|| store.data.destroy(resource_type, id))
        })
    }

    fn search(
        &mut self,
        resource_type: &str,
        params: &[(&str, &str)],
    ) -> Result<ClientReply, ClientError> {
        let query = params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");
        self.handle("GET", format!("{}?{}", resource_type, query), |store| {
            store
                .refuse(resource_type, interaction::SEARCH)
                .unwrap_or_else(|| store.data.search(resource_type, params))
        })
    }

    fn history(
        &mut self,
        resource_type: &str,
        id: Option<&str>,
    ) -> Result<ClientReply, ClientError> {
        let (path, wanted) = match id {
            Some(id) => (
                format!("{}/{}/_history", resource_type, id),
                interaction::HISTORY_INSTANCE,
            ),
            None => (
                format!("{}/_history", resource_type),
                interaction::HISTORY_TYPE,
            ),
        };
        self.handle("GET", path, |store| {
            store
                .refuse(resource_type, wanted)
                .unwrap_or_else(|| store.data.history(resource_type, id))
        })
    }

    fn validate(&mut self, resource_type: &str, body: &str) -> Result<ClientReply, ClientError> {
        self.handle("POST", format!("{}/$validate", resource_type), |store| {
            if let Some(refused) = store.refuse(resource_type, interaction::VALIDATE) {
                return refused;
            }
            let document = match parse_body(resource_type, body) {
                Ok(document) => document,
                Err(problem) => return problem,
            };
            let issues = validation_issues(&document);
            if issues.is_empty() {
                return Outcome {
                    code: 200,
                    body: Body::Outcome(OperationOutcome::information("All OK")),
                    location: None,
                };
            }
            Outcome {
                code: 400,
                body: Body::Outcome(OperationOutcome::new(
                    issues
                        .into_iter()
                        .map(|diagnostics| model::Issue {
                            severity: "error".to_string(),
                            diagnostics,
                        })
                        .collect(),
                )),
                location: None,
            }
        })
    }

    fn transaction(&mut self, bundle: &str) -> Result<ClientReply, ClientError> {
        self.handle("POST", String::new(), |store| {
            store
                .refuse_system(interaction::TRANSACTION)
                .unwrap_or_else(|| store.bundle(bundle, true))
        })
    }

    fn batch(&mut self, bundle: &str) -> Result<ClientReply, ClientError> {
        self.handle("POST", String::new(), |store| {
            store
                .refuse_system(interaction::BATCH)
                .unwrap_or_else(|| store.bundle(bundle, false))
        })
    }

    fn capability_statement(&mut self) -> Result<CapabilityStatement, ClientError> {
        let mut store = self.store.borrow_mut();
        store.requests.push(Request {
            method: "GET",
            path: "metadata".to_string(),
        });
        Ok(store.capability_statement())
    }
}
