//! Suite reports and their JSON / text renderings.

use std::fmt::Write as _;

use facet::Facet;
use owo_colors::OwoColorize;

use crate::result::{Status, TestResult};
use crate::suite::{Category, SuiteInfo};

/// Results of one suite run, with the suite's descriptive metadata.
#[derive(Debug, Clone)]
pub struct SuiteReport {
    pub id: &'static str,
    pub description: &'static str,
    pub details: &'static [(&'static str, &'static str)],
    pub tags: &'static [&'static str],
    pub category: Category,
    pub resource_type: Option<String>,
    pub results: Vec<TestResult>,
}

impl SuiteReport {
    pub fn new(info: SuiteInfo, resource_type: Option<String>, results: Vec<TestResult>) -> Self {
        Self {
            id: info.id,
            description: info.description,
            details: info.details,
            tags: info.tags,
            category: info.category,
            resource_type,
            results,
        }
    }

    pub fn count(&self, status: Status) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for result in &self.results {
            summary.add(result.status());
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status().is_failure())
    }

    pub fn title(&self) -> String {
        match &self.resource_type {
            Some(resource_type) => format!("{} ({})", self.description, resource_type),
            None => self.description.to_string(),
        }
    }

    pub fn to_json(&self) -> ReportJson {
        ReportJson {
            suite: self.id.to_string(),
            description: self.description.to_string(),
            resource_type: self.resource_type.clone(),
            category: self.category.id.to_string(),
            tags: self.tags.iter().map(|t| t.to_string()).collect(),
            details: self
                .details
                .iter()
                .map(|(section, text)| DetailJson {
                    section: section.to_string(),
                    text: text.to_string(),
                })
                .collect(),
            summary: self.summary(),
            results: self.results.iter().map(ResultJson::from).collect(),
        }
    }
}

/// Status counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Facet)]
pub struct Summary {
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
    pub error: usize,
}

impl Summary {
    pub fn of(reports: &[SuiteReport]) -> Self {
        let mut summary = Summary::default();
        for report in reports {
            for result in &report.results {
                summary.add(result.status());
            }
        }
        summary
    }

    fn add(&mut self, status: Status) {
        match status {
            Status::Pass => self.pass += 1,
            Status::Fail => self.fail += 1,
            Status::Skip => self.skip += 1,
            Status::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pass + self.fail + self.skip + self.error
    }

    pub fn is_clean(&self) -> bool {
        self.fail == 0 && self.error == 0
    }
}

/// JSON output for one suite run.
#[derive(Debug, Facet)]
pub struct ReportJson {
    pub suite: String,
    pub description: String,
    pub resource_type: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub details: Vec<DetailJson>,
    pub summary: Summary,
    pub results: Vec<ResultJson>,
}

#[derive(Debug, Facet)]
pub struct DetailJson {
    pub section: String,
    pub text: String,
}

/// JSON output for one test result.
#[derive(Debug, Facet)]
pub struct ResultJson {
    pub key: String,
    pub description: String,
    pub status: String,
    pub message: Vec<String>,
    pub data: Option<String>,
    pub warnings: Vec<String>,
    pub requires: Vec<String>,
    pub validates: Vec<String>,
    pub links: Vec<String>,
}

impl From<&TestResult> for ResultJson {
    fn from(result: &TestResult) -> Self {
        Self {
            key: result.key().to_string(),
            description: result.description().to_string(),
            status: result.status().as_str().to_string(),
            message: result.message().map(|m| m.lines()).unwrap_or_default(),
            data: result.data().map(str::to_string),
            warnings: result.warnings().to_vec(),
            requires: result.requires().iter().map(|r| r.to_string()).collect(),
            validates: result.validates().iter().map(|r| r.to_string()).collect(),
            links: result.links().to_vec(),
        }
    }
}

fn status_label(status: Status, color: bool) -> String {
    let label = format!("{:<5}", status.as_str().to_ascii_uppercase());
    if !color {
        return label;
    }
    match status {
        Status::Pass => label.green().to_string(),
        Status::Fail => label.red().to_string(),
        Status::Skip => label.yellow().to_string(),
        Status::Error => label.magenta().bold().to_string(),
    }
}

/// Human-readable rendering of a run.
pub fn render_text(reports: &[SuiteReport], color: bool) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = writeln!(out, "## {}  {}", report.id, report.title());
        for result in &report.results {
            let _ = writeln!(
                out,
                "  {} {}  {}",
                status_label(result.status(), color),
                result.key(),
                result.description()
            );
            if result.status() != Status::Pass
                && let Some(message) = result.message()
            {
                for line in message.lines() {
                    let _ = writeln!(out, "        {}", line);
                }
            }
            for warning in result.warnings() {
                let _ = writeln!(out, "        warning: {}", warning);
            }
        }
        out.push('\n');
    }
    let summary = Summary::of(reports);
    let _ = writeln!(
        out,
        "Total: {} tests, {} passed, {} failed, {} skipped, {} errors",
        summary.total(),
        summary.pass,
        summary.fail,
        summary.skip,
        summary.error
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Message;

    fn report() -> SuiteReport {
        let mut failed = TestResult::new("R002_Patient", "Read a missing resource (Patient)");
        failed.update(
            Status::Fail,
            Some(Message::Lines(vec!["first".into(), "second".into()])),
            None,
        );
        SuiteReport {
            id: "read",
            description: "Read interaction",
            details: &[("Overview", "Reads resources back.")],
            tags: &["core"],
            category: Category::new("core", "Core interactions"),
            resource_type: Some("Patient".into()),
            results: vec![TestResult::new("R001_Patient", "Read (Patient)"), failed],
        }
    }

    #[test]
    fn summary_counts_each_status() {
        let report = report();
        let summary = report.summary();
        assert_eq!(summary.pass, 1);
        assert_eq!(summary.fail, 1);
        assert!(!summary.is_clean());
        assert!(report.has_failures());
    }

    #[test]
    fn text_lists_every_message_line() {
        let text = render_text(&[report()], false);
        assert!(text.contains("## read  Read interaction (Patient)"));
        assert!(text.contains("FAIL  R002_Patient"));
        assert!(text.contains("        first\n        second\n"));
        assert!(text.contains("Total: 2 tests, 1 passed, 1 failed, 0 skipped, 0 errors"));
    }

    #[test]
    fn json_result_keeps_message_lines() {
        let json = report().to_json();
        assert_eq!(json.results[1].status, "fail");
        assert_eq!(json.results[1].message, vec!["first", "second"]);
        assert_eq!(json.summary.total(), 2);
    }
}
