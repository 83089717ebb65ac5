//! Test control language export.
//!
//! A small line-oriented format:
//!
//! ```text
//! suite resource/Patient "Resource interactions (Patient)"
//!   test X020_Patient "Read (Patient)"
//!     link http://hl7.org/fhir/http.html#read
//!     requires Patient create
//!     validates Patient read
//!     code {
//!       ...
//!     }
//!   end
//! end
//! ```

use std::fmt::Write as _;

use crate::engine::SuiteMetadata;
use crate::result::Requirement;

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn requirement(requirement: &Requirement) -> String {
    format!(
        "{} {}",
        requirement.resource.as_deref().unwrap_or("system"),
        requirement.methods.join(",")
    )
}

pub fn render(metadata: &[SuiteMetadata]) -> String {
    let mut out = String::new();
    for suite in metadata {
        let title = match &suite.selection.resource_type {
            Some(resource_type) => format!("{} ({})", suite.info.description, resource_type),
            None => suite.info.description.to_string(),
        };
        let _ = writeln!(out, "suite {} {}", suite.selection.label(), quote(&title));
        for tag in suite.info.tags {
            let _ = writeln!(out, "  tag {}", tag);
        }
        for captured in &suite.tests {
            let result = &captured.result;
            let _ = writeln!(
                out,
                "  test {} {}",
                result.key(),
                quote(result.description())
            );
            for link in result.links() {
                let _ = writeln!(out, "    link {}", link);
            }
            for req in result.requires() {
                let _ = writeln!(out, "    requires {}", requirement(req));
            }
            for req in result.validates() {
                let _ = writeln!(out, "    validates {}", requirement(req));
            }
            if let Some(code) = result.code() {
                out.push_str("    code {\n");
                for line in code.lines() {
                    let _ = writeln!(out, "      {}", line);
                }
                out.push_str("    }\n");
            }
            out.push_str("  end\n");
        }
        out.push_str("end\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
    }

    #[test]
    fn system_requirements_render_as_system() {
        let req = Requirement::system(&["transaction", "batch"]);
        assert_eq!(requirement(&req), "system transaction,batch");
    }
}
