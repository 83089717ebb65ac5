//! In-memory reference implementation of the client, resource model and
//! fixture contracts.
//!
//! Used by the CLI's self-test target and by the test suite.

mod fixtures;
mod model;
mod server;

pub use fixtures::DocumentFixtures;
pub use model::{Bundle, BundleEntry, Document, Issue, OperationOutcome, parse_json};
pub use server::{MemoryServer, Request};

use crate::harness::Session;
use crate::resource::TypeDescriptor;

/// Types known to the document model.
pub fn document_types() -> Vec<TypeDescriptor> {
    vec![
        TypeDescriptor::resource("Patient"),
        TypeDescriptor::resource("Observation"),
        TypeDescriptor::resource("Encounter"),
        TypeDescriptor::resource("Condition"),
        TypeDescriptor::datatype("HumanName"),
        TypeDescriptor::datatype("Coding"),
    ]
}

/// A session against `server`, with document fixtures.
pub fn session(server: &MemoryServer) -> Session {
    Session::new(Box::new(server.clone()), Box::new(DocumentFixtures::new()))
}
