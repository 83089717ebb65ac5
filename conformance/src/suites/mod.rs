//! Built-in suites.
//!
//! Each module declares one suite and registers it with the engine through
//! `inventory::submit!`. Test keys are stable: reports and exports refer to
//! them.

pub mod capability;
pub mod history;
pub mod interop;
pub mod read;
pub mod resource;
pub mod search;
pub mod transaction;
pub mod validate;

use crate::capability::FhirVersion;
use crate::signal::Signal;
use crate::suite::Category;

pub const CORE: Category = Category::new("core", "Core interactions");
pub const SEARCH: Category = Category::new("search", "Search");
pub const SYSTEM: Category = Category::new("system", "System interactions");
pub const INTEROP: Category = Category::new("interop", "Interoperability");

pub const ALL_VERSIONS: &[FhirVersion] = &FhirVersion::ALL;
pub const STU3_AND_LATER: &[FhirVersion] = &[FhirVersion::Stu3, FhirVersion::R4];

/// Id of a fixture established earlier, or a skip when there is none.
pub(crate) fn established(id: &Option<String>, what: &str) -> Result<String, Signal> {
    id.clone()
        .ok_or_else(|| Signal::skip(format!("{} was not created", what)))
}
