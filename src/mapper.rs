//! # mapper: metadata transform into the Dataverse dataset schema
//!
//! Pure translation from a [`MetadataRecord`] to the nested field-block
//! representation the Dataverse API expects. No I/O happens here: validation
//! and schema building both run before the orchestrator touches the network,
//! so a rejected record never leaves partial remote state behind.
//!
//! Every optional section (temporal coverage, collection dates, language,
//! keywords, contributors, grant numbers, publications, geography, the
//! social-science block) is included only when its source value is non-empty;
//! otherwise it is omitted from the output entirely rather than emitted as
//! null.

use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::error::ValidationError;
use crate::record::{get_path, is_empty, MetadataRecord};

/// Builds Dataverse dataset schemas from one metadata snapshot.
///
/// The description date is injected at construction so that repeated calls
/// over the same record produce identical output.
pub struct DataverseMapper<'a> {
    metadata: &'a MetadataRecord,
    description_date: NaiveDate,
}

impl<'a> DataverseMapper<'a> {
    pub fn new(metadata: &'a MetadataRecord, description_date: NaiveDate) -> Self {
        DataverseMapper {
            metadata,
            description_date,
        }
    }

    /// Check the mandatory fields in fixed order, failing at the first one
    /// missing: title, description, authors, contact points.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.metadata.has("title.0.value") {
            return Err(ValidationError::MissingTitle);
        }
        if !self.metadata.has("description.0.value") {
            return Err(ValidationError::MissingDescription);
        }
        if !self.metadata.has("authors") {
            return Err(ValidationError::MissingAuthors);
        }
        if !self.metadata.has("contact_points") {
            return Err(ValidationError::MissingContactPoints);
        }
        Ok(())
    }

    /// The full create envelope: `{"datasetVersion": {...}}`.
    pub fn schema(&self) -> Value {
        let mut citation_fields = vec![
            self.title(),
            self.descriptions(),
            self.subject(),
            self.authors(),
            self.contact_points(),
        ];
        citation_fields.extend(
            [
                self.time_period_covered(),
                self.date_of_collection(),
                self.language(),
                self.keywords(),
                self.contributors(),
                self.grant_numbers(),
                self.publications(),
            ]
            .into_iter()
            .flatten(),
        );

        let mut metadata_blocks = json!({
            "citation": {
                "displayName": "Citation Metadata",
                "fields": citation_fields,
            }
        });

        if let Some(geospatial) = self.geographic_coverage() {
            metadata_blocks["geospatial"] = json!({
                "displayName": "Geospatial Metadata",
                "fields": [geospatial],
            });
        }

        let social_science_fields: Vec<Value> = [
            self.units_of_analysis(),
            self.universe(),
            self.frequency_of_data_collection(),
            self.collection_mode(),
            self.research_instrument(),
            self.sampling_procedure(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if !social_science_fields.is_empty() {
            metadata_blocks["socialscience"] = json!({
                "displayName": "Social Science and Humanities Metadata",
                "fields": social_science_fields,
            });
        }

        let (license, terms_of_use) = self.resolve_license();

        json!({
            "datasetVersion": {
                "license": license,
                "termsOfUse": terms_of_use,
                "metadataBlocks": metadata_blocks,
            }
        })
    }

    /// The narrower update envelope: the inner version object without the
    /// `datasetVersion` wrapper.
    pub fn schema_for_update(&self) -> Value {
        let mut schema = self.schema();
        schema["datasetVersion"].take()
    }

    /// License resolution, in priority order: the canonical CC0 waiver wins,
    /// then explicit terms-of-use text, then the raw license string reused as
    /// the terms value.
    fn resolve_license(&self) -> (Value, Value) {
        if self.is_license_cc0() {
            (json!("CC0"), json!("CC0 Waiver"))
        } else if let Some(terms) = self.terms_of_use() {
            (json!("No waiver"), json!(terms))
        } else {
            let raw = self
                .metadata
                .get("rights.license")
                .cloned()
                .unwrap_or(Value::Null);
            (json!("No waiver"), raw)
        }
    }

    fn is_license_cc0(&self) -> bool {
        self.metadata.get_str("rights.license") == Some("CC0 1.0")
    }

    fn terms_of_use(&self) -> Option<&str> {
        self.metadata
            .get("rights.terms_of_use.0.value")
            .filter(|v| !is_empty(v))
            .and_then(Value::as_str)
    }

    fn title(&self) -> Value {
        primitive(
            "title",
            self.metadata
                .get("title.0.value")
                .cloned()
                .unwrap_or(Value::Null),
        )
    }

    fn descriptions(&self) -> Value {
        let descriptions = self
            .metadata
            .get("description")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let date = self.description_date.format("%Y-%m-%d").to_string();

        let values: Vec<Value> = descriptions
            .iter()
            .map(|ds| {
                json!({
                    "dsDescriptionValue": primitive(
                        "dsDescriptionValue",
                        ds.get("value").cloned().unwrap_or(Value::Null),
                    ),
                    "dsDescriptionDate": primitive("dsDescriptionDate", json!(date)),
                })
            })
            .collect();

        compound("dsDescription", values)
    }

    // The target instance accepts only this subject value.
    fn subject(&self) -> Value {
        json!({
            "typeName": "subject",
            "multiple": true,
            "typeClass": "controlledVocabulary",
            "value": ["Agricultural Sciences"],
        })
    }

    fn authors(&self) -> Value {
        let authors = self
            .metadata
            .get("authors")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let values: Vec<Value> = authors
            .iter()
            .map(|author| {
                let mut fields = Map::new();

                if let Some(identifier) = non_empty(get_path(author, "agent_ids.0.value")) {
                    fields.insert(
                        "authorIdentifier".into(),
                        primitive("authorIdentifier", identifier.clone()),
                    );
                }

                if let Some(scheme) = non_empty(get_path(author, "agent_ids.0.schema")) {
                    fields.insert(
                        "authorIdentifierScheme".into(),
                        json!({
                            "typeName": "authorIdentifierScheme",
                            "multiple": false,
                            "typeClass": "controlledVocabulary",
                            "value": scheme,
                        }),
                    );
                }

                if let Some(name) = non_empty(author.get("full_name")) {
                    fields.insert("authorName".into(), primitive("authorName", name.clone()));
                }

                Value::Object(fields)
            })
            .collect();

        compound("author", values)
    }

    fn contact_points(&self) -> Value {
        let contact_points = self
            .metadata
            .get("contact_points")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let values: Vec<Value> = contact_points
            .iter()
            .map(|cp| {
                json!({
                    "datasetContactName": primitive(
                        "datasetContactName",
                        cp.get("full_name").cloned().unwrap_or(Value::Null),
                    ),
                    "datasetContactEmail": primitive(
                        "datasetContactEmail",
                        cp.get("email").cloned().unwrap_or(Value::Null),
                    ),
                })
            })
            .collect();

        compound("datasetContact", values)
    }

    fn time_period_covered(&self) -> Option<Value> {
        let from = non_empty(self.metadata.get("data_temporal_coverage.from"))?;
        let to = non_empty(self.metadata.get("data_temporal_coverage.to"))?;

        Some(json!({
            "typeName": "timePeriodCovered",
            "multiple": true,
            "typeClass": "compound",
            "value": [{
                "timePeriodCoveredStart": primitive("timePeriodCoveredStart", from.clone()),
                "timePeriodCoveredEnd": primitive("timePeriodCoveredEnd", to.clone()),
            }],
        }))
    }

    fn date_of_collection(&self) -> Option<Value> {
        let from = non_empty(self.metadata.get("data_collection_period.from"))?;
        let to = non_empty(self.metadata.get("data_collection_period.to"))?;

        Some(json!({
            "typeName": "dateOfCollection",
            "multiple": true,
            "typeClass": "compound",
            "value": [{
                "dateOfCollectionStart": primitive("dateOfCollectionStart", from.clone()),
                "dateOfCollectionEnd": primitive("dateOfCollectionEnd", to.clone()),
            }],
        }))
    }

    fn language(&self) -> Option<Value> {
        if !self.metadata.has("resource_language") {
            return None;
        }

        Some(json!({
            "typeName": "language",
            "multiple": true,
            "typeClass": "controlledVocabulary",
            "value": [self
                .metadata
                .get("resource_language.name")
                .cloned()
                .unwrap_or(Value::Null)],
        }))
    }

    fn keywords(&self) -> Option<Value> {
        let keywords = non_empty(self.metadata.get("keywords"))?.as_array()?;

        let values: Vec<Value> = keywords
            .iter()
            .map(|kw| {
                json!({
                    "keywordVocabulary": primitive(
                        "keywordVocabulary",
                        kw.get("scheme").cloned().unwrap_or(Value::Null),
                    ),
                    "keywordValue": primitive(
                        "keywordValue",
                        kw.get("value").cloned().unwrap_or(Value::Null),
                    ),
                })
            })
            .collect();

        Some(compound("keyword", values))
    }

    fn contributors(&self) -> Option<Value> {
        let funding_orgs = non_empty(self.metadata.get("funding_organisations"))?.as_array()?;

        // Entries without a name are skipped; the block is dropped when
        // nothing remains.
        let values: Vec<Value> = funding_orgs
            .iter()
            .filter_map(|fo| {
                let name = non_empty(fo.get("full_name"))?;
                Some(json!({
                    "contributorName": primitive("contributorName", name.clone()),
                    "contributorType": {
                        "typeName": "contributorType",
                        "multiple": false,
                        "typeClass": "controlledVocabulary",
                        "value": "Funder",
                    },
                }))
            })
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(compound("contributor", values))
        }
    }

    fn grant_numbers(&self) -> Option<Value> {
        let projects = non_empty(self.metadata.get("projects"))?.as_array()?;

        let values: Vec<Value> = projects
            .iter()
            .map(|p| {
                json!({
                    "grantNumberAgency": primitive(
                        "grantNumberAgency",
                        p.get("full_name").cloned().unwrap_or(Value::Null),
                    ),
                })
            })
            .collect();

        Some(compound("grantNumber", values))
    }

    fn publications(&self) -> Option<Value> {
        let related = non_empty(self.metadata.get("related_resources"))?.as_array()?;

        let values: Vec<Value> = related
            .iter()
            .map(|rr| {
                let doi = rr.get("DOI").and_then(Value::as_str).unwrap_or_default();
                json!({
                    "publicationIDType": {
                        "typeName": "publicationIDType",
                        "multiple": false,
                        "typeClass": "controlledVocabulary",
                        "value": "doi",
                    },
                    "publicationIDNumber": primitive("publicationIDNumber", json!(doi)),
                    "publicationURL": primitive(
                        "publicationURL",
                        json!(format!("https://doi.org/{doi}")),
                    ),
                })
            })
            .collect();

        Some(compound("publication", values))
    }

    fn geographic_coverage(&self) -> Option<Value> {
        let countries = self
            .metadata
            .get("geography.countries")
            .filter(|v| !is_empty(v))
            .and_then(Value::as_array);
        let regions = self
            .metadata
            .get("geography.regions")
            .filter(|v| !is_empty(v))
            .and_then(Value::as_array);

        if countries.is_none() && regions.is_none() {
            return None;
        }

        let mut values = Vec::new();

        for gc in countries.into_iter().flatten() {
            values.push(json!({
                "country": {
                    "typeName": "country",
                    "multiple": false,
                    "typeClass": "controlledVocabulary",
                    "value": gc.get("value").cloned().unwrap_or(Value::Null),
                },
            }));
        }

        for gr in regions.into_iter().flatten() {
            values.push(json!({
                "otherGeographicCoverage": primitive(
                    "otherGeographicCoverage",
                    gr.get("value").cloned().unwrap_or(Value::Null),
                ),
            }));
        }

        Some(compound("geographicCoverage", values))
    }

    fn units_of_analysis(&self) -> Option<Value> {
        let units = non_empty(self.metadata.get("methodology.unit_of_analysis"))?.as_array()?;

        Some(json!({
            "typeName": "unitOfAnalysis",
            "multiple": true,
            "typeClass": "primitive",
            "value": units
                .iter()
                .map(|u| u.get("value").cloned().unwrap_or(Value::Null))
                .collect::<Vec<_>>(),
        }))
    }

    fn universe(&self) -> Option<Value> {
        let universe = non_empty(self.metadata.get("methodology.universe"))?.as_array()?;

        Some(json!({
            "typeName": "universe",
            "multiple": true,
            "typeClass": "primitive",
            "value": universe
                .iter()
                .map(|u| u.get("value").cloned().unwrap_or(Value::Null))
                .collect::<Vec<_>>(),
        }))
    }

    fn frequency_of_data_collection(&self) -> Option<Value> {
        let dcf = non_empty(self.metadata.get("methodology.data_collection_frequency"))?;
        Some(primitive("frequencyOfDataCollection", dcf.clone()))
    }

    fn collection_mode(&self) -> Option<Value> {
        let dcm = non_empty(self.metadata.get("methodology.data_collection_mode"))?;
        Some(primitive("collectionMode", dcm.clone()))
    }

    fn research_instrument(&self) -> Option<Value> {
        let ins = non_empty(self.metadata.get("methodology.instrument"))?;
        Some(primitive("researchInstrument", ins.clone()))
    }

    fn sampling_procedure(&self) -> Option<Value> {
        let sp = non_empty(self.metadata.get("methodology.sampling_process"))?;
        Some(primitive("samplingProcedure", sp.clone()))
    }
}

fn primitive(type_name: &str, value: Value) -> Value {
    json!({
        "typeName": type_name,
        "multiple": false,
        "typeClass": "primitive",
        "value": value,
    })
}

fn compound(type_name: &str, values: Vec<Value>) -> Value {
    json!({
        "typeName": type_name,
        "multiple": true,
        "typeClass": "compound",
        "value": values,
    })
}

fn non_empty(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !is_empty(v))
}
