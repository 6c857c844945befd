//! DataCite metadata documents submitted with a registration

use chrono::Datelike;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use registry_types::{Dataset, DerivedDataset, Doi, Download};

const KERNEL_NAMESPACE: &str = "http://datacite.org/schema/kernel-4";
const KERNEL_SCHEMA: &str = "http://schema.datacite.org/meta/kernel-4/metadata.xsd";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Relation between two DOIs of the same dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationType {
    IsNewVersionOf,
    IsPreviousVersionOf,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::IsNewVersionOf => "IsNewVersionOf",
            RelationType::IsPreviousVersionOf => "IsPreviousVersionOf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedIdentifier {
    pub doi: Doi,
    pub relation: RelationType,
}

impl RelatedIdentifier {
    pub fn new(doi: Doi, relation: RelationType) -> Self {
        Self { doi, relation }
    }
}

/// Builds the metadata document registered for a DOI.
///
/// The document is opaque to the lifecycle core; it is stored with the
/// DOI record and handed to the authority as-is.
pub trait MetadataBuilder: Send + Sync {
    fn dataset(&self, dataset: &Dataset, doi: &Doi, related: Option<&RelatedIdentifier>) -> String;

    fn download(&self, download: &Download, doi: &Doi) -> String;

    fn derived_dataset(&self, derived: &DerivedDataset, doi: &Doi) -> String;
}

/// Minimal DataCite kernel-4 documents
#[derive(Debug, Clone)]
pub struct DataCiteMetadataBuilder {
    publisher: String,
}

impl Default for DataCiteMetadataBuilder {
    fn default() -> Self {
        Self::new("GBIF")
    }
}

impl DataCiteMetadataBuilder {
    pub fn new(publisher: impl Into<String>) -> Self {
        Self {
            publisher: publisher.into(),
        }
    }

    fn render(&self, resource: Resource<'_>) -> String {
        match self.write_resource(&resource) {
            Ok(xml) => xml,
            Err(e) => {
                tracing::error!(error = %e, doi = %resource.doi, "Could not build DataCite metadata");
                String::new()
            }
        }
    }

    fn write_resource(&self, resource: &Resource<'_>) -> Result<String, String> {
        let mut writer = Writer::new(Vec::new());
        let schema_location = format!("{} {}", KERNEL_NAMESPACE, KERNEL_SCHEMA);
        let doi = resource.doi.doi_name().to_uppercase();
        let year = resource.year.to_string();

        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        emit(
            &mut writer,
            Event::Start(BytesStart::new("resource").with_attributes([
                ("xmlns", KERNEL_NAMESPACE),
                ("xmlns:xsi", XSI_NAMESPACE),
                ("xsi:schemaLocation", schema_location.as_str()),
            ])),
        )?;

        text_element(&mut writer, "identifier", &[("identifierType", "DOI")], &doi)?;
        emit(&mut writer, Event::Start(BytesStart::new("creators")))?;
        emit(&mut writer, Event::Start(BytesStart::new("creator")))?;
        text_element(&mut writer, "creatorName", &[], resource.creator)?;
        emit(&mut writer, Event::End(BytesEnd::new("creator")))?;
        emit(&mut writer, Event::End(BytesEnd::new("creators")))?;
        emit(&mut writer, Event::Start(BytesStart::new("titles")))?;
        text_element(&mut writer, "title", &[], resource.title)?;
        emit(&mut writer, Event::End(BytesEnd::new("titles")))?;
        text_element(&mut writer, "publisher", &[], &self.publisher)?;
        text_element(&mut writer, "publicationYear", &[], &year)?;
        text_element(
            &mut writer,
            "resourceType",
            &[("resourceTypeGeneral", resource.general_type)],
            resource.resource_type,
        )?;

        if !resource.related.is_empty() {
            emit(&mut writer, Event::Start(BytesStart::new("relatedIdentifiers")))?;
            for (relation, identifier_type, value) in &resource.related {
                text_element(
                    &mut writer,
                    "relatedIdentifier",
                    &[
                        ("relatedIdentifierType", *identifier_type),
                        ("relationType", *relation),
                    ],
                    value,
                )?;
            }
            emit(&mut writer, Event::End(BytesEnd::new("relatedIdentifiers")))?;
        }

        if let Some(description) = resource.description {
            emit(&mut writer, Event::Start(BytesStart::new("descriptions")))?;
            text_element(
                &mut writer,
                "description",
                &[("descriptionType", "Abstract")],
                description,
            )?;
            emit(&mut writer, Event::End(BytesEnd::new("descriptions")))?;
        }

        emit(&mut writer, Event::End(BytesEnd::new("resource")))?;
        String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), String> {
    writer.write_event(event).map_err(|e| e.to_string())
}

/// `<name attributes...>text</name>`, with the text escaped
fn text_element<'a>(
    writer: &mut Writer<Vec<u8>>,
    name: &'a str,
    attributes: &[(&'a str, &'a str)],
    text: &str,
) -> Result<(), String> {
    let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
    emit(writer, Event::Start(start))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

struct Resource<'a> {
    doi: &'a Doi,
    title: &'a str,
    creator: &'a str,
    description: Option<&'a str>,
    year: i32,
    general_type: &'static str,
    resource_type: &'static str,
    /// (relationType, relatedIdentifierType, value)
    related: Vec<(&'static str, &'static str, String)>,
}

impl MetadataBuilder for DataCiteMetadataBuilder {
    fn dataset(&self, dataset: &Dataset, doi: &Doi, related: Option<&RelatedIdentifier>) -> String {
        let creator = dataset
            .publishing_organization
            .as_deref()
            .unwrap_or(self.publisher.as_str());
        self.render(Resource {
            doi,
            title: &dataset.title,
            creator,
            description: dataset.description.as_deref(),
            year: dataset.created.year(),
            general_type: "Dataset",
            resource_type: "Dataset",
            related: related
                .map(|r| vec![(r.relation.as_str(), "DOI", r.doi.doi_name())])
                .unwrap_or_default(),
        })
    }

    fn download(&self, download: &Download, doi: &Doi) -> String {
        let title = format!("Occurrence Download {}", download.key);
        let description = format!(
            "A dataset containing {} records.",
            download.total_records
        );
        self.render(Resource {
            doi,
            title: &title,
            creator: &download.created_by,
            description: Some(&description),
            year: download.created.year(),
            general_type: "Dataset",
            resource_type: "Occurrence data",
            related: Vec::new(),
        })
    }

    fn derived_dataset(&self, derived: &DerivedDataset, doi: &Doi) -> String {
        self.render(Resource {
            doi,
            title: &derived.title,
            creator: &derived.created_by,
            description: derived.description.as_deref(),
            year: derived.created.year(),
            general_type: "Dataset",
            resource_type: "Derived dataset",
            related: derived
                .related_datasets
                .iter()
                .map(|key| ("IsDerivedFrom", "URN", format!("urn:uuid:{}", key)))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use uuid::Uuid;

    fn doi(value: &str) -> Doi {
        Doi::parse(value).unwrap()
    }

    #[test]
    fn dataset_document_carries_identifier_and_relation() {
        let mut dataset = Dataset::new("Birds & <Bees>", "alice");
        dataset.publishing_organization = Some("Natural History Museum".into());
        let related = RelatedIdentifier::new(doi("10.5072/old"), RelationType::IsNewVersionOf);

        let xml = DataCiteMetadataBuilder::default().dataset(
            &dataset,
            &doi("10.5072/new"),
            Some(&related),
        );

        assert!(xml.contains("<identifier identifierType=\"DOI\">10.5072/NEW</identifier>"));
        assert!(xml.contains("<title>Birds &amp; &lt;Bees&gt;</title>"));
        assert!(xml.contains("<creatorName>Natural History Museum</creatorName>"));
        assert!(xml.contains("relationType=\"IsNewVersionOf\">10.5072/old</relatedIdentifier>"));
        assert!(xml.ends_with("</resource>"));
    }

    #[test]
    fn document_starts_with_declaration_and_namespace() {
        let xml = DataCiteMetadataBuilder::new("GBIF \"Secretariat\"")
            .dataset(&Dataset::new("Birds", "alice"), &doi("10.5072/abc"), None);

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("xmlns=\"http://datacite.org/schema/kernel-4\""));
        assert!(!xml.contains("<relatedIdentifiers>"));
        assert!(!xml.contains("\"Secretariat\""));
    }

    #[test]
    fn derived_dataset_document_links_source_datasets() {
        let mut derived = DerivedDataset::new(
            "Cleaned occurrences",
            Url::parse("https://example.org/data").unwrap(),
            "bob",
        );
        derived.related_datasets.push(Uuid::nil());

        let xml = DataCiteMetadataBuilder::default().derived_dataset(&derived, &doi("10.5072/dd.abc"));
        assert!(xml.contains("relationType=\"IsDerivedFrom\""));
        assert!(xml.contains("urn:uuid:00000000-0000-0000-0000-000000000000"));
        assert!(!xml.contains("<descriptions>"));
    }

    #[test]
    fn download_document_mentions_record_count() {
        let mut download = Download::new("0000001-200101", "carol");
        download.total_records = 42;

        let xml = DataCiteMetadataBuilder::default().download(&download, &doi("10.5072/dl.abc"));
        assert!(xml.contains("Occurrence Download 0000001-200101"));
        assert!(xml.contains("42 records"));
    }
}
