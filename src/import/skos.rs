//! SKOS vocabulary handler
//!
//! Reads RDF/XML and emits one Concept per top-level `skos:Concept`. The
//! identifier is the last segment of `rdf:about`. Labels and notes are
//! grouped by `xml:lang` into one description per preferred label.
//! `skos:broader` and `skos:related` references are left in the bundle's
//! meta map for the importer to link once every concept exists.

use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{debug, trace};

use super::xml::{self, attribute, SaxHandler};
use super::{ImportError, ImportOptions, ItemSink, StreamHandler};
use crate::models::entity_type::{DESCRIBES, IDENTIFIER_KEY, LANGUAGE_KEY, NAME_KEY};
use crate::models::{Bundle, DataValue, EntityType};

pub const BROADER: &str = "broader";
pub const RELATED: &str = "related";
const CONCEPT: &str = "Concept";

/// Last path or fragment segment of a resource URI.
pub fn resource_identifier(uri: &str) -> &str {
    uri.trim_end_matches(['/', '#'])
        .rsplit(['/', '#'])
        .next()
        .unwrap_or(uri)
}

#[derive(Debug, Default)]
struct Labels {
    pref: Option<String>,
    alt: Vec<String>,
    definition: Vec<String>,
    scope_note: Vec<String>,
}

#[derive(Debug, Default)]
struct ConceptRecord {
    identifier: String,
    url: String,
    labels: BTreeMap<String, Labels>,
    broader: Vec<String>,
    related: Vec<String>,
    /// Label element being read, with its language
    open: Option<(String, String)>,
    text: String,
}

impl ConceptRecord {
    fn into_bundle(self) -> Bundle {
        let mut concept = Bundle::new(EntityType::Concept)
            .with_data_value(IDENTIFIER_KEY, self.identifier.as_str())
            .with_data_value("url", self.url.as_str());

        for (lang, labels) in self.labels {
            let Some(pref) = labels.pref else {
                debug!(identifier = %self.identifier, lang = %lang, "Labels without a preferred label");
                continue;
            };
            let description = Bundle::new(EntityType::ConceptDescription)
                .with_data_value(NAME_KEY, pref)
                .with_data_value(LANGUAGE_KEY, lang)
                .with_data_value("altLabel", labels.alt)
                .with_data_value("definition", labels.definition)
                .with_data_value("scopeNote", labels.scope_note);
            concept = concept.with_relation(DESCRIBES, description);
        }
        if !self.broader.is_empty() {
            concept = concept.with_meta_value(BROADER, DataValue::from(self.broader));
        }
        if !self.related.is_empty() {
            concept = concept.with_meta_value(RELATED, DataValue::from(self.related));
        }
        concept
    }
}

/// Streams SKOS RDF/XML vocabularies
#[derive(Debug)]
pub struct SkosHandler {
    default_language: String,
    current: Option<ConceptRecord>,
    /// Depth of concepts nested inside the current one
    nested: usize,
}

impl SkosHandler {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
            current: None,
            nested: 0,
        }
    }

    pub fn from_options(options: &ImportOptions) -> Self {
        Self::new(options.default_language.clone())
    }
}

impl SaxHandler for SkosHandler {
    fn start_element(&mut self, name: &str, attributes: &[(String, String)]) -> Result<(), ImportError> {
        let Some(current) = self.current.as_mut() else {
            if name == CONCEPT {
                let url = attribute(attributes, "about").unwrap_or_default();
                self.current = Some(ConceptRecord {
                    identifier: resource_identifier(url).to_string(),
                    url: url.to_string(),
                    ..ConceptRecord::default()
                });
            }
            return Ok(());
        };
        if name == CONCEPT {
            self.nested += 1;
        }
        if self.nested > 0 {
            return Ok(());
        }

        match name {
            "prefLabel" | "altLabel" | "definition" | "scopeNote" => {
                let lang = attribute(attributes, "lang").unwrap_or(&self.default_language);
                current.open = Some((name.to_string(), lang.to_string()));
                current.text.clear();
            }
            BROADER | RELATED => {
                if let Some(resource) = attribute(attributes, "resource") {
                    let target = resource_identifier(resource).to_string();
                    if name == BROADER {
                        current.broader.push(target);
                    } else {
                        current.related.push(target);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), ImportError> {
        if let Some(current) = self.current.as_mut().filter(|c| c.open.is_some()) {
            if !current.text.is_empty() {
                current.text.push(' ');
            }
            current.text.push_str(text);
        }
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<Option<Bundle>, ImportError> {
        if self.nested > 0 {
            if name == CONCEPT {
                self.nested -= 1;
            }
            return Ok(None);
        }
        if name == CONCEPT {
            let Some(current) = self.current.take() else {
                return Ok(None);
            };
            trace!(identifier = %current.identifier, "Closed SKOS concept");
            return Ok(Some(current.into_bundle()));
        }

        let Some(current) = self.current.as_mut() else {
            return Ok(None);
        };
        if current.open.as_ref().is_some_and(|(open, _)| open == name) {
            if let Some((field, lang)) = current.open.take() {
                let text = std::mem::take(&mut current.text);
                let labels = current.labels.entry(lang).or_default();
                match field.as_str() {
                    "prefLabel" => {
                        if labels.pref.is_none() {
                            labels.pref = Some(text);
                        } else {
                            labels.alt.push(text);
                        }
                    }
                    "altLabel" => labels.alt.push(text),
                    "definition" => labels.definition.push(text),
                    _ => labels.scope_note.push(text),
                }
            }
        }
        Ok(None)
    }
}

impl StreamHandler for SkosHandler {
    fn name(&self) -> &'static str {
        "skos"
    }

    fn stream(&mut self, input: &mut dyn BufRead, sink: &mut dyn ItemSink) -> Result<usize, ImportError> {
        self.current = None;
        self.nested = 0;
        xml::stream(self, input, sink)
    }
}
