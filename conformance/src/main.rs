//! FHIR conformance harness CLI.
//!
//! # Usage
//!
//! List suites and tests:
//! ```bash
//! fhir-conformance list --show-requirements
//! ```
//!
//! Run everything against the built-in reference server:
//! ```bash
//! fhir-conformance run
//! ```
//!
//! Run only what a capability statement declares, for one version:
//! ```bash
//! fhir-conformance run --capabilities server.json --fhir-version r4
//! ```
//!
//! Export test definitions:
//! ```bash
//! fhir-conformance export --format testscript
//! ```
//!
//! # Exit Codes
//!
//! - 0: Every test passed or was skipped
//! - 1: At least one test failed or errored
//! - 2: Bad arguments or configuration

use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use facet::Facet;
use fhir_conformance::engine::{Selection, SuiteEngine, SuiteMetadata};
use fhir_conformance::export::{self, ExportError, ExportFormat};
use fhir_conformance::memory::{self, MemoryServer};
use fhir_conformance::report::{self, ReportJson, Summary};
use fhir_conformance::{Catalog, CapabilityStatement, FhirClient, FhirVersion};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fhir-conformance")]
#[command(about = "Conformance test harness for FHIR REST servers")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List suites and their tests
    List {
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,

        /// Show the capabilities each test requires and validates
        #[arg(long)]
        show_requirements: bool,

        /// Only list this suite
        #[arg(long)]
        suite: Option<String>,
    },

    /// Print the captured metadata of every test
    Metadata {
        /// Output format (json)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Run suites against the built-in reference server
    Run {
        /// Suites to run (repeatable; default: all)
        #[arg(long = "suite")]
        suites: Vec<String>,

        /// Resource types for parameterized suites (repeatable; default: all)
        #[arg(long = "resource")]
        resources: Vec<String>,

        /// Only run suites supporting this version (dstu2, stu3, r4, or a release number)
        #[arg(long)]
        fhir_version: Option<String>,

        /// Capability statement (JSON) used to select tests; defaults to the server's own
        #[arg(long)]
        capabilities: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,

        /// Attach a second reference server for interoperability suites
        #[arg(long)]
        interop: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Export test definitions
    Export {
        /// Export format (testscript, tcl)
        #[arg(long)]
        format: String,

        /// Only export this suite
        #[arg(long)]
        suite: Option<String>,
    },
}

/// JSON output for a test listing.
#[derive(Facet)]
struct TestCaseJson {
    suite: String,
    key: String,
    description: String,
    resource_type: Option<String>,
    links: Vec<String>,
    requires: Vec<String>,
    validates: Vec<String>,
}

/// JSON output for a suite's metadata.
#[derive(Facet)]
struct SuiteMetadataJson {
    suite: String,
    description: String,
    resource_type: Option<String>,
    category: String,
    tags: Vec<String>,
    versions: Vec<String>,
    tests: Vec<TestCaseJson>,
}

/// Error type for the CLI.
#[derive(Debug)]
enum CliError {
    UnknownSuite(String),
    UnknownResource(String),
    UnknownVersion(String),
    UnknownFormat(String),
    Capabilities { path: PathBuf, detail: String },
    Export(ExportError),
    Serialize(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::UnknownSuite(id) => write!(f, "unknown suite: {}", id),
            CliError::UnknownResource(name) => write!(f, "unknown resource type: {}", name),
            CliError::UnknownVersion(version) => write!(f, "unknown FHIR version: {}", version),
            CliError::UnknownFormat(format) => write!(f, "unknown output format: {}", format),
            CliError::Capabilities { path, detail } => {
                write!(f, "failed to load {}: {}", path.display(), detail)
            }
            CliError::Export(e) => write!(f, "{}", e),
            CliError::Serialize(detail) => write!(f, "JSON serialization failed: {}", detail),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ExportError> for CliError {
    fn from(e: ExportError) -> Self {
        CliError::Export(e)
    }
}

fn main() {
    // Initialize tracing - output goes to stderr, no timestamps
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let args = Args::parse();
    let engine = SuiteEngine::new(Catalog::builtin(), &memory::document_types());

    let code = match execute(&engine, args.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            2
        }
    };
    std::process::exit(code);
}

fn execute(engine: &SuiteEngine, command: Command) -> Result<i32, CliError> {
    match command {
        Command::List {
            format,
            show_requirements,
            suite,
        } => list_tests(engine, &format, show_requirements, suite.as_deref()).map(|_| 0),
        Command::Metadata { format } => {
            if format != "json" {
                return Err(CliError::UnknownFormat(format));
            }
            let output: Vec<SuiteMetadataJson> =
                engine.metadata().iter().map(suite_metadata_json).collect();
            println!("{}", to_json(&output)?);
            Ok(0)
        }
        Command::Run {
            suites,
            resources,
            fhir_version,
            capabilities,
            format,
            interop,
            no_color,
        } => {
            let requested = fhir_version
                .map(|v| FhirVersion::parse(&v).ok_or(CliError::UnknownVersion(v)))
                .transpose()?;
            let server = MemoryServer::new();
            let statement = server_statement(&server, capabilities)?;
            // Without an explicit version, run what the server declares.
            let version = requested.or_else(|| statement.version());
            let selections = select(engine, &suites, &resources, version)?;
            run_suites(engine, &server, selections, &statement, &format, interop, no_color)
        }
        Command::Export { format, suite } => {
            let format = ExportFormat::parse(&format)?;
            let metadata = metadata_for_suite(engine, suite.as_deref())?;
            let exported: Vec<SuiteMetadata> = metadata.into_iter().cloned().collect();
            println!("{}", export::export(&exported, format)?);
            Ok(0)
        }
    }
}

fn to_json<T: Facet<'static>>(value: &T) -> Result<String, CliError> {
    facet_json::to_string(value).map_err(|e| CliError::Serialize(e.to_string()))
}

fn metadata_for_suite<'e>(
    engine: &'e SuiteEngine,
    suite: Option<&str>,
) -> Result<Vec<&'e SuiteMetadata>, CliError> {
    if let Some(id) = suite
        && engine.find(id).is_none()
    {
        return Err(CliError::UnknownSuite(id.to_string()));
    }
    Ok(engine
        .metadata()
        .iter()
        .filter(|m| suite.is_none_or(|id| m.selection.suite_id == id))
        .collect())
}

fn test_case_json(metadata: &SuiteMetadata) -> Vec<TestCaseJson> {
    metadata
        .tests
        .iter()
        .map(|captured| {
            let result = &captured.result;
            TestCaseJson {
                suite: metadata.selection.suite_id.to_string(),
                key: result.key().to_string(),
                description: result.description().to_string(),
                resource_type: metadata.selection.resource_type.clone(),
                links: result.links().to_vec(),
                requires: result.requires().iter().map(|r| r.to_string()).collect(),
                validates: result.validates().iter().map(|r| r.to_string()).collect(),
            }
        })
        .collect()
}

fn suite_metadata_json(metadata: &SuiteMetadata) -> SuiteMetadataJson {
    SuiteMetadataJson {
        suite: metadata.info.id.to_string(),
        description: metadata.info.description.to_string(),
        resource_type: metadata.selection.resource_type.clone(),
        category: metadata.info.category.id.to_string(),
        tags: metadata.info.tags.iter().map(|t| t.to_string()).collect(),
        versions: metadata
            .info
            .supported_versions
            .iter()
            .map(|v| v.as_str().to_string())
            .collect(),
        tests: test_case_json(metadata),
    }
}

fn list_tests(
    engine: &SuiteEngine,
    format: &str,
    show_requirements: bool,
    suite: Option<&str>,
) -> Result<(), CliError> {
    let metadata = metadata_for_suite(engine, suite)?;

    match format {
        "json" => {
            let output: Vec<TestCaseJson> = metadata.iter().flat_map(|m| test_case_json(m)).collect();
            println!("{}", to_json(&output)?);
        }
        "text" => {
            println!("Available test cases:\n");
            let mut total = 0;
            for suite in &metadata {
                println!("## {} ({})", suite.selection.label(), suite.info.description);
                for captured in &suite.tests {
                    let result = &captured.result;
                    total += 1;
                    if show_requirements {
                        let requires: Vec<String> =
                            result.requires().iter().map(|r| r.to_string()).collect();
                        let validates: Vec<String> =
                            result.validates().iter().map(|r| r.to_string()).collect();
                        println!(
                            "  {}  {} [requires: {}] [validates: {}]",
                            result.key(),
                            result.description(),
                            requires.join(", "),
                            validates.join(", ")
                        );
                    } else {
                        println!("  {}  {}", result.key(), result.description());
                    }
                }
                println!();
            }
            println!("Total: {} tests in {} suites", total, metadata.len());
        }
        other => return Err(CliError::UnknownFormat(other.to_string())),
    }
    Ok(())
}

fn select(
    engine: &SuiteEngine,
    suites: &[String],
    resources: &[String],
    version: Option<FhirVersion>,
) -> Result<Vec<Selection>, CliError> {
    for id in suites {
        if engine.find(id).is_none() {
            return Err(CliError::UnknownSuite(id.clone()));
        }
    }
    for name in resources {
        if !engine.resource_types().contains(name) {
            return Err(CliError::UnknownResource(name.clone()));
        }
    }

    let universe = match version {
        Some(version) => engine.selections_for_version(version),
        None => engine.selections(),
    };
    Ok(universe
        .into_iter()
        .filter(|s| suites.is_empty() || suites.iter().any(|id| id == s.suite_id))
        .filter(|s| match &s.resource_type {
            Some(resource_type) => resources.is_empty() || resources.contains(resource_type),
            None => true,
        })
        .collect())
}

fn load_capabilities(path: PathBuf) -> Result<CapabilityStatement, CliError> {
    let content = std::fs::read_to_string(&path).map_err(|e| CliError::Capabilities {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    CapabilityStatement::from_json(&content).map_err(|e| CliError::Capabilities {
        path,
        detail: e.to_string(),
    })
}

/// The statement loaded from `capabilities`, or the server's own.
fn server_statement(
    server: &MemoryServer,
    capabilities: Option<PathBuf>,
) -> Result<CapabilityStatement, CliError> {
    match capabilities {
        Some(path) => load_capabilities(path),
        None => server
            .clone()
            .capability_statement()
            .map_err(|e| CliError::Capabilities {
                path: PathBuf::from(server.base_url()),
                detail: e.to_string(),
            }),
    }
}

fn run_suites(
    engine: &SuiteEngine,
    server: &MemoryServer,
    selections: Vec<Selection>,
    statement: &CapabilityStatement,
    format: &str,
    interop: bool,
    no_color: bool,
) -> Result<i32, CliError> {
    if format != "text" && format != "json" {
        return Err(CliError::UnknownFormat(format.to_string()));
    }

    let selections = engine.filter_supported(selections, statement);
    tracing::info!(
        selections = selections.len(),
        server = server.base_url(),
        fhir_version = %statement.fhir_version,
        "starting run"
    );

    let mut session = memory::session(server);
    if interop {
        session = session.with_secondary(Box::new(
            MemoryServer::new().with_base_url("memory://secondary"),
        ));
    }

    let reports = engine.execute(&selections, &mut session);
    let summary = Summary::of(&reports);

    if format == "json" {
        let output: Vec<ReportJson> = reports.iter().map(|r| r.to_json()).collect();
        println!("{}", to_json(&output)?);
    } else {
        let color = !no_color && std::io::stdout().is_terminal();
        print!("{}", report::render_text(&reports, color));
    }

    tracing::info!(
        passed = summary.pass,
        failed = summary.fail,
        skipped = summary.skip,
        errors = summary.error,
        "run complete"
    );
    Ok(if summary.is_clean() { 0 } else { 1 })
}
