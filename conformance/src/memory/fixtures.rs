//! Example and generated documents.

use std::cell::Cell;

use crate::fixtures::{BundleKind, BundleRequest, FixtureSource};
use crate::resource::{Format, ModelError, ResourceCodec, ResourceModel};

use super::model::{self, Bundle, BundleEntry, Document};

/// Fixture source and JSON codec for [`Document`]s.
#[derive(Debug, Default)]
pub struct DocumentFixtures {
    generated: Cell<u64>,
}

impl DocumentFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    fn template(resource_type: &str) -> Option<Document> {
        let document = Document::new(resource_type);
        let document = match resource_type {
            "Patient" => document
                .field("name", "Peter Chalmers")
                .field("gender", "male")
                .field("birthDate", "1974-12-25"),
            "Observation" => document
                .field("status", "final")
                .field("code", "8867-4")
                .field("value", "72"),
            "Encounter" => document.field("status", "finished").field("class", "AMB"),
            "Condition" => document
                .field("code", "38341003")
                .field("clinicalStatus", "active"),
            _ => return None,
        };
        Some(document)
    }
}

impl FixtureSource for DocumentFixtures {
    fn example(&self, resource_type: &str) -> Option<Box<dyn ResourceModel>> {
        let mut document = Self::template(resource_type)?;
        document.id = Some("example".to_string());
        Some(Box::new(document))
    }

    fn generate(&self, resource_type: &str) -> Result<Box<dyn ResourceModel>, ModelError> {
        let document = Self::template(resource_type)
            .ok_or_else(|| ModelError::UnknownType(resource_type.to_string()))?;
        let n = self.generated.get() + 1;
        self.generated.set(n);
        Ok(Box::new(document.field("identifier", &format!("generated-{}", n))))
    }

    fn bundle(&self, kind: BundleKind, entries: Vec<BundleRequest>) -> Result<String, ModelError> {
        let mut bundle_entries = Vec::with_capacity(entries.len());
        for request in entries {
            let resource = match request.resource {
                None => None,
                Some(resource) => match resource.as_any().downcast_ref::<Document>() {
                    Some(document) => Some(document.clone()),
                    None => {
                        return Err(ModelError::UnknownType(resource.resource_type().to_string()));
                    }
                },
            };
            bundle_entries.push(BundleEntry::request(request.method, &request.url, resource));
        }
        Bundle::new(kind.as_str(), bundle_entries).to_json()
    }
}

impl ResourceCodec for DocumentFixtures {
    fn parse(&self, format: Format, bytes: &[u8]) -> Result<Box<dyn ResourceModel>, ModelError> {
        match format {
            Format::Json => model::parse_json(bytes),
            Format::Xml => Err(ModelError::UnsupportedFormat(format)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_documents_have_no_id_and_differ() {
        let fixtures = DocumentFixtures::new();
        let a = fixtures.generate("Patient").unwrap();
        let b = fixtures.generate("Patient").unwrap();
        assert!(a.id().is_none());
        assert_eq!(a.mismatch(b.as_ref(), &[]), vec!["identifier"]);
        assert!(matches!(
            fixtures.generate("Nothing"),
            Err(ModelError::UnknownType(_))
        ));
    }

    #[test]
    fn xml_is_not_supported() {
        let fixtures = DocumentFixtures::new();
        assert_eq!(
            fixtures.parse(Format::Xml, b"<Patient/>").unwrap_err(),
            ModelError::UnsupportedFormat(Format::Xml)
        );
    }
}
