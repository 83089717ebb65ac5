//! Per-test execution.
//!
//! Every test body runs through [`run_test`], which always produces exactly
//! one [`TestResult`]:
//!
//! ```text
//! START -> run body
//!   body returns Err(Fail)    -> fail
//!   body returns Err(Skip)    -> skip   ("Skipped: <description>")
//!   body returns Err(Error)   -> error  ("Fatal Error: <message>")
//!   body panics               -> error  ("Fatal Error: <payload>", backtrace as data)
//!   body returns Ok(Some(v))  -> v merged into the result
//!   body returns Ok(None)     -> pass (or whatever ctx.update() set)
//! setup failed                -> skip   ("Skipped because setup failed."), always wins
//! then: attach warnings / requires / validates / links, suffix key, return
//! ```
//!
//! Bodies receive a [`TestContext`] holding the per-test accumulators. A new
//! context is built for every invocation, so nothing declared by one test can
//! leak into the next one run on the same suite value.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use tracing::{debug, trace};

use crate::client::{ClientReply, FhirClient};
use crate::fixtures::FixtureSource;
use crate::resource::ResourceModel;
use crate::result::{Message, Requirement, Status, TestResult, Verdict};
use crate::signal::{Signal, TestOutcome};
use crate::suite::Suite;
use crate::testcase::TestCase;

/// Message used when setup could not establish the suite's fixtures.
pub const SETUP_FAILED_MESSAGE: &str = "Skipped because setup failed.";

/// How a test body is being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Against a live server.
    Live,
    /// Only the declarations in the `metadata` block are collected.
    Metadata,
}

/// The connections and fixtures a live run uses.
pub struct Session {
    primary: Box<dyn FhirClient>,
    secondary: Option<Box<dyn FhirClient>>,
    fixtures: Box<dyn FixtureSource>,
}

impl Session {
    pub fn new(primary: Box<dyn FhirClient>, fixtures: Box<dyn FixtureSource>) -> Self {
        Self {
            primary,
            secondary: None,
            fixtures,
        }
    }

    /// Add a second server, used by interoperability suites.
    pub fn with_secondary(mut self, secondary: Box<dyn FhirClient>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn client(&mut self) -> &mut (dyn FhirClient + 'static) {
        self.primary.as_mut()
    }

    pub fn secondary(&mut self) -> Option<&mut (dyn FhirClient + 'static)> {
        self.secondary.as_deref_mut()
    }

    pub fn fixtures(&self) -> &dyn FixtureSource {
        self.fixtures.as_ref()
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }
}

/// Declarations made inside a test's `metadata` block.
#[derive(Debug, Default)]
pub struct Declarations {
    links: Vec<String>,
    requires: Vec<Requirement>,
    validates: Vec<Requirement>,
}

impl Declarations {
    /// A reference URL (usually into the FHIR docs) for the test.
    pub fn link(&mut self, url: &str) -> &mut Self {
        self.links.push(url.to_string());
        self
    }

    pub fn links(&mut self, urls: &[&str]) -> &mut Self {
        self.links.extend(urls.iter().map(|url| url.to_string()));
        self
    }

    /// A capability the test needs as a precondition.
    pub fn requires(&mut self, requirement: Requirement) -> &mut Self {
        self.requires.push(requirement);
        self
    }

    /// A capability the test exercises.
    pub fn validates(&mut self, requirement: Requirement) -> &mut Self {
        self.validates.push(requirement);
        self
    }
}

/// What a test body sees while it runs.
pub struct TestContext<'s> {
    mode: ExecutionMode,
    setup_failed: bool,
    session: Option<&'s mut Session>,
    declarations: Declarations,
    warnings: Vec<String>,
    verdict: Option<Verdict>,
}

impl<'s> TestContext<'s> {
    pub(crate) fn new(
        mode: ExecutionMode,
        setup_failed: bool,
        session: Option<&'s mut Session>,
    ) -> Self {
        Self {
            mode,
            setup_failed,
            session,
            declarations: Declarations::default(),
            warnings: Vec::new(),
            verdict: None,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn setup_failed(&self) -> bool {
        self.setup_failed
    }

    /// Run the declaration block, then stop the test if setup failed or if
    /// only metadata is being collected.
    ///
    /// The block always runs first so its declarations are recorded even
    /// when the test goes on to be skipped.
    pub fn metadata(&mut self, declare: impl FnOnce(&mut Declarations)) -> Result<(), Signal> {
        declare(&mut self.declarations);
        if self.setup_failed {
            return Err(Signal::skip(SETUP_FAILED_MESSAGE));
        }
        if self.mode == ExecutionMode::Metadata {
            return Err(Signal::Skip { reason: None });
        }
        Ok(())
    }

    /// The server under test.
    pub fn client(&mut self) -> Result<&mut (dyn FhirClient + 'static), Signal> {
        match self.session.as_deref_mut() {
            Some(session) => Ok(session.client()),
            None => Err(Signal::error("no server connection in this execution mode")),
        }
    }

    /// The second server; skips the test when none is configured.
    pub fn secondary(&mut self) -> Result<&mut (dyn FhirClient + 'static), Signal> {
        match self.session.as_deref_mut() {
            Some(session) => session
                .secondary()
                .ok_or_else(|| Signal::skip("no secondary server configured")),
            None => Err(Signal::error("no server connection in this execution mode")),
        }
    }

    pub fn fixtures(&self) -> Result<&dyn FixtureSource, Signal> {
        match self.session.as_deref() {
            Some(session) => Ok(session.fixtures()),
            None => Err(Signal::error("no fixtures in this execution mode")),
        }
    }

    /// Overwrite the result's status, message and data without stopping.
    pub fn update(&mut self, status: Status, message: Option<Message>, data: Option<String>) {
        self.verdict = Some(Verdict::new(status, message, data));
    }

    pub fn assert(&self, condition: bool, message: impl Into<Message>) -> Result<(), Signal> {
        if condition {
            Ok(())
        } else {
            Err(Signal::fail(message))
        }
    }

    pub fn assert_with(
        &self,
        condition: bool,
        message: impl Into<Message>,
        data: impl Into<String>,
    ) -> Result<(), Signal> {
        if condition {
            Ok(())
        } else {
            Err(Signal::fail_with(message, data))
        }
    }

    pub fn assert_eq<T: PartialEq + Debug>(
        &self,
        expected: T,
        actual: T,
        what: &str,
    ) -> Result<(), Signal> {
        if expected == actual {
            Ok(())
        } else {
            Err(Signal::fail(format!(
                "{}: expected {:?}, got {:?}",
                what, expected, actual
            )))
        }
    }

    /// The reply's status code must be one of `expected`.
    pub fn assert_response_code(&self, reply: &ClientReply, expected: &[u16]) -> Result<(), Signal> {
        if expected.contains(&reply.code) {
            return Ok(());
        }
        let expected = expected
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(" or ");
        let mut lines = vec![format!(
            "Bad response code: expected {}, but found {}",
            expected, reply.code
        )];
        if let Some(resource) = reply.resource() {
            lines.extend(resource.issues());
        }
        let message = if lines.len() == 1 {
            Message::Text(lines.remove(0))
        } else {
            Message::Lines(lines)
        };
        Err(Signal::fail_with(message, reply.body.clone()))
    }

    pub fn assert_response_ok(&self, reply: &ClientReply) -> Result<(), Signal> {
        self.assert_response_code(reply, &[200])
    }

    pub fn assert_response_created(&self, reply: &ClientReply) -> Result<(), Signal> {
        self.assert_response_code(reply, &[201])
    }

    pub fn assert_response_gone(&self, reply: &ClientReply) -> Result<(), Signal> {
        self.assert_response_code(reply, &[404, 410])
    }

    /// The reply must carry a parsed resource of the given type.
    pub fn assert_resource_type<'r>(
        &self,
        reply: &'r ClientReply,
        resource_type: &str,
    ) -> Result<&'r dyn ResourceModel, Signal> {
        match reply.resource() {
            Some(resource) if resource.resource_type() == resource_type => Ok(resource),
            Some(resource) => Err(Signal::fail_with(
                format!(
                    "Bad response type: expected {}, but found {}",
                    resource_type,
                    resource.resource_type()
                ),
                reply.body.clone(),
            )),
            None => Err(Signal::fail_with(
                format!("Expected a {} resource, but the body could not be parsed", resource_type),
                reply.body.clone(),
            )),
        }
    }

    pub fn assert_header(&self, reply: &ClientReply, name: &str) -> Result<(), Signal> {
        self.assert(
            reply.header(name).is_some(),
            format!("Response is missing the {} header", name),
        )
    }

    /// The two resources must be structurally equal, ignoring `ignore`.
    pub fn assert_no_mismatch(
        &self,
        expected: &dyn ResourceModel,
        actual: &dyn ResourceModel,
        ignore: &[&str],
        what: &str,
    ) -> Result<(), Signal> {
        let mismatches = expected.mismatch(actual, ignore);
        if mismatches.is_empty() {
            return Ok(());
        }
        let mut lines = vec![format!("{} did not match", what)];
        lines.extend(mismatches.into_iter().map(|path| format!("mismatch at {}", path)));
        Err(Signal::Fail {
            message: Message::Lines(lines),
            data: actual.to_json().ok(),
        })
    }

    /// Run `block`, demoting any assertion failure inside it to a warning.
    ///
    /// Skips and errors still stop the test. A warning block nested in
    /// another one demotes its own failures, so nesting flattens.
    pub fn warning(
        &mut self,
        block: impl FnOnce(&mut Self) -> Result<(), Signal>,
    ) -> Result<(), Signal> {
        match block(self) {
            Err(Signal::Fail { message, .. }) => {
                trace!(warning = %message, "assertion demoted to warning");
                self.warnings.push(message.joined());
                Ok(())
            }
            other => other,
        }
    }

    pub fn skip_if(&self, condition: bool, reason: &str) -> Result<(), Signal> {
        if condition {
            Err(Signal::skip(reason))
        } else {
            Ok(())
        }
    }

    pub fn skip_unless(&self, condition: bool, reason: &str) -> Result<(), Signal> {
        self.skip_if(!condition, reason)
    }

    fn into_evidence(self) -> (Vec<String>, Declarations) {
        (self.warnings, self.declarations)
    }
}

/// Run one test case on `suite` and produce its result.
pub fn run_test<S: Suite>(
    suite: &mut S,
    case: &TestCase<S>,
    mode: ExecutionMode,
    setup_failed: bool,
    session: Option<&mut Session>,
) -> TestResult {
    let description = match suite.description_suffix() {
        Some(suffix) => format!("{} ({})", case.description, suffix),
        None => case.description.to_string(),
    };
    let key = match suite.resource_type() {
        Some(resource_type) => format!("{}_{}", case.key, resource_type),
        None => case.key.to_string(),
    };

    let mut result = TestResult::new(key.clone(), description.clone());
    result.set_code(case.code);

    let mut ctx = TestContext::new(mode, setup_failed, session);
    let outcome: Result<TestOutcome, PanicReport> = guarded(|| (case.body)(suite, &mut ctx));

    if let Some(verdict) = ctx.verdict.take() {
        result.apply(verdict);
    }

    match outcome {
        Ok(Ok(None)) => {}
        Ok(Ok(Some(verdict))) => result.apply(verdict),
        Ok(Err(Signal::Fail { message, data })) => {
            result.update(Status::Fail, Some(message), data);
        }
        Ok(Err(Signal::Skip { reason })) => {
            result.update(
                Status::Skip,
                Some(Message::Text(format!("Skipped: {}", description))),
                reason,
            );
        }
        Ok(Err(Signal::Error { message, data })) => {
            result.update(
                Status::Error,
                Some(Message::Text(format!("Fatal Error: {}", message))),
                data,
            );
        }
        Err(panic) => {
            result.update(
                Status::Error,
                Some(Message::Text(format!("Fatal Error: {}", panic.message))),
                panic.backtrace,
            );
        }
    }

    if setup_failed {
        result.update(
            Status::Skip,
            Some(Message::Text(SETUP_FAILED_MESSAGE.to_string())),
            None,
        );
    }

    let (warnings, declarations) = ctx.into_evidence();
    result.attach_evidence(
        warnings,
        declarations.requires,
        declarations.validates,
        declarations.links,
    );

    debug!(
        key = %key,
        status = %result.status(),
        warnings = result.warnings().len(),
        ?mode,
        "test finished"
    );

    result
}

/// A panic caught while running harness-guarded code.
#[derive(Debug, Clone)]
pub(crate) struct PanicReport {
    pub message: String,
    pub backtrace: Option<String>,
}

thread_local! {
    static GUARD_DEPTH: Cell<u32> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Run `f`, converting a panic into a [`PanicReport`].
///
/// Panics raised while guarded are recorded (location and backtrace) by a
/// process-wide hook instead of being printed; panics elsewhere still go to
/// the previously installed hook.
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, PanicReport> {
    install_panic_hook();

    GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    GUARD_DEPTH.with(|depth| depth.set(depth.get() - 1));

    outcome.map_err(|payload| PanicReport {
        message: panic_message(payload.as_ref()),
        backtrace: LAST_PANIC.with(|last| last.borrow_mut().take()),
    })
}

fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(|depth| depth.get()) == 0 {
                previous(info);
                return;
            }
            let location = info
                .location()
                .map(|l| format!("panicked at {}:{}:{}\n", l.file(), l.line(), l.column()))
                .unwrap_or_default();
            let trace = format!("{}{}", location, Backtrace::force_capture());
            LAST_PANIC.with(|last| *last.borrow_mut() = Some(trace));
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
