//! Test definitions.
//!
//! A suite owns an ordered, static slice of [`TestCase`]s. Each case is a
//! key, a description, the source text of its body and a plain function
//! pointer; there is no dynamic method synthesis. Cases are written with
//! [`conformance_test!`](crate::conformance_test), which fills in `code` from
//! the body itself:
//!
//! ```ignore
//! static TESTS: &[TestCase<ReadSuite>] = &[
//!     conformance_test!("R001", "Read an existing resource", |suite, ctx| {
//!         ctx.metadata(|m| {
//!             m.requires(Requirement::resource("Patient", &["create", "read"]));
//!         })?;
//!         let reply = ctx.client()?.read("Patient", &suite.id)?;
//!         ctx.assert_response_ok(&reply)?;
//!         Ok(None)
//!     }),
//! ];
//! ```

use crate::harness::TestContext;
use crate::signal::TestOutcome;

/// Signature of a test body.
pub type TestBody<S> = fn(&mut S, &mut TestContext<'_>) -> TestOutcome;

/// One declared test of suite `S`.
pub struct TestCase<S> {
    /// Short stable identifier, e.g. `R001`.
    pub key: &'static str,
    /// Human-readable name.
    pub description: &'static str,
    /// Source text of the body.
    pub code: &'static str,
    pub body: TestBody<S>,
}

impl<S> TestCase<S> {
    pub const fn new(
        key: &'static str,
        description: &'static str,
        code: &'static str,
        body: TestBody<S>,
    ) -> Self {
        Self {
            key,
            description,
            code,
            body,
        }
    }
}

impl<S> Clone for TestCase<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for TestCase<S> {}

impl<S> std::fmt::Debug for TestCase<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("key", &self.key)
            .field("description", &self.description)
            .finish()
    }
}

/// Look up a case by key.
pub fn find<'a, S>(cases: &'a [TestCase<S>], key: &str) -> Option<&'a TestCase<S>> {
    cases.iter().find(|case| case.key == key)
}

/// Declare a [`TestCase`] from a key, a description and a closure-like body.
///
/// The body receives `&mut Suite` and `&mut TestContext` and returns a
/// [`TestOutcome`].
#[macro_export]
macro_rules! conformance_test {
    ($key:literal, $description:literal, |$suite:ident, $ctx:ident| $body:block) => {
        $crate::testcase::TestCase::new(
            $key,
            $description,
            stringify!($body),
            |$suite: &mut _, $ctx: &mut $crate::harness::TestContext<'_>| -> $crate::signal::TestOutcome {
                $body
            },
        )
    };
}
