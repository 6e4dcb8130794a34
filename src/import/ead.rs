//! EAD finding aid handler
//!
//! Each `archdesc` and component (`c`, `c01` to `c12`) becomes a
//! DocumentaryUnit. Components nest inside their parent's record, so one
//! finding aid is emitted as a single bundle tree rooted at `archdesc`.
//! Element text is mapped through a [`PropertyMap`] keyed on the path
//! relative to the enclosing unit.

use std::io::BufRead;
use tracing::{debug, trace};

use super::properties::{PathMapping, PropertyMap};
use super::shape::{date_period, ElementPath, RawRecord, RecordShaper};
use super::xml::{self, attribute, SaxHandler};
use super::{ImportError, ImportOptions, ItemSink, StreamHandler};
use crate::models::{Bundle, EntityType};

const UNIT_DATE: &str = "unitdate";

fn is_unit_element(name: &str) -> bool {
    match name {
        "archdesc" | "c" => true,
        _ => {
            name.len() == 3
                && name.starts_with('c')
                && name[1..].parse::<u8>().is_ok_and(|n| (1..=12).contains(&n))
        }
    }
}

/// One open unit element
#[derive(Debug, Default)]
struct Level {
    element: String,
    path: ElementPath,
    normal_dates: Vec<Option<String>>,
    record: RawRecord,
}

/// Streams EAD 2002 documents
#[derive(Debug)]
pub struct EadHandler {
    properties: PropertyMap,
    default_language: String,
    document_language: Option<String>,
    outer: Vec<String>,
    levels: Vec<Level>,
}

impl EadHandler {
    pub fn new(properties: PropertyMap, default_language: impl Into<String>) -> Self {
        Self {
            properties,
            default_language: default_language.into(),
            document_language: None,
            outer: Vec::new(),
            levels: Vec::new(),
        }
    }

    pub fn from_options(options: &ImportOptions) -> Result<Self, ImportError> {
        let properties = match &options.properties {
            Some(path) => PropertyMap::from_file(path)?,
            None => PropertyMap::ead(),
        };
        Ok(Self::new(properties, options.default_language.clone()))
    }

    fn language(&self) -> &str {
        self.document_language.as_deref().unwrap_or(&self.default_language)
    }

    fn reset(&mut self) {
        self.document_language = None;
        self.outer.clear();
        self.levels.clear();
    }

    fn map_attributes(properties: &PropertyMap, level: &mut Level, attributes: &[(String, String)]) {
        for (name, value) in attributes {
            if let Some(PathMapping::Field(field)) = properties.lookup_attribute(level.path.names(), name) {
                level.record.push(field, value);
            }
        }
    }

    fn close_inner(&mut self) {
        let Some(level) = self.levels.last_mut() else {
            return;
        };
        let normal = level.normal_dates.pop().flatten();
        if let Some((element, text)) = level.path.close(&self.properties, &mut level.record) {
            if element == UNIT_DATE && !text.trim().is_empty() {
                if let Some(date) = date_period(&text, normal.as_deref(), "creation") {
                    level.record.add_date(date);
                }
            }
        }
    }

    fn close_unit(&mut self) -> Result<Option<Bundle>, ImportError> {
        let Some(level) = self.levels.pop() else {
            return Ok(None);
        };
        let shaper = RecordShaper::new(EntityType::DocumentaryUnit, self.language())?;
        let unit = shaper.shape(level.record);
        trace!(identifier = ?unit.identifier(), element = %level.element, "Closed EAD unit");
        match self.levels.last_mut() {
            Some(parent) => {
                parent.record.add_child(unit);
                Ok(None)
            }
            None => Ok(Some(unit)),
        }
    }
}

impl SaxHandler for EadHandler {
    fn start_element(&mut self, name: &str, attributes: &[(String, String)]) -> Result<(), ImportError> {
        if is_unit_element(name) {
            let mut level = Level {
                element: name.to_string(),
                ..Level::default()
            };
            Self::map_attributes(&self.properties, &mut level, attributes);
            self.levels.push(level);
            return Ok(());
        }

        match self.levels.last_mut() {
            Some(level) => {
                level.path.open(name);
                level
                    .normal_dates
                    .push(attribute(attributes, "normal").map(str::to_string));
                Self::map_attributes(&self.properties, level, attributes);
            }
            None => {
                if name == "language" && self.outer.last().map(String::as_str) == Some("langusage") {
                    if let Some(code) = attribute(attributes, "langcode") {
                        debug!(language = code, "EAD document language");
                        self.document_language = Some(code.to_string());
                    }
                }
                self.outer.push(name.to_string());
            }
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), ImportError> {
        if let Some(level) = self.levels.last_mut() {
            level.path.append_text(text);
        }
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<Option<Bundle>, ImportError> {
        match self.levels.last() {
            Some(level) if level.path.is_empty() && level.element == name => self.close_unit(),
            Some(_) => {
                self.close_inner();
                Ok(None)
            }
            None => {
                self.outer.pop();
                Ok(None)
            }
        }
    }
}

impl StreamHandler for EadHandler {
    fn name(&self) -> &'static str {
        "ead"
    }

    fn stream(&mut self, input: &mut dyn BufRead, sink: &mut dyn ItemSink) -> Result<usize, ImportError> {
        self.reset();
        xml::stream(self, input, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{ImportItem, CHILD_ITEM};
    use crate::models::entity_type::{DESCRIBES, HAS_ACCESS_POINT, HAS_DATE};

    const FINDING_AID: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ead xmlns="urn:isbn:1-931666-22-9">
  <eadheader>
    <eadid>nl-001</eadid>
    <profiledesc><langusage><language langcode="nld">Dutch</language></langusage></profiledesc>
  </eadheader>
  <archdesc level="fonds">
    <did>
      <unitid>p1</unitid>
      <unittitle>Papers of the <emph>Frank</emph> family</unittitle>
      <unitdate normal="1939/1945">1939-1945</unitdate>
      <container>Box 3</container>
    </did>
    <scopecontent>
      <head>Scope</head>
      <p>Letters.</p>
      <p>Diaries.</p>
    </scopecontent>
    <controlaccess>
      <persname>Frank, Otto</persname>
      <geogname>Amsterdam</geogname>
    </controlaccess>
    <dsc>
      <c01 level="series">
        <did><unitid>c1</unitid><unittitle>Correspondence</unittitle></did>
        <c02 level="file">
          <did><unitid>c1-a</unitid></did>
        </c02>
      </c01>
    </dsc>
  </archdesc>
</ead>"#;

    fn parse(xml: &str) -> Vec<ImportItem> {
        let mut handler = EadHandler::new(PropertyMap::ead(), "eng");
        let mut items = Vec::new();
        handler.stream(&mut xml.as_bytes(), &mut items).unwrap();
        items
    }

    #[test]
    fn test_unit_elements() {
        assert!(is_unit_element("archdesc"));
        assert!(is_unit_element("c"));
        assert!(is_unit_element("c07"));
        assert!(!is_unit_element("c13"));
        assert!(!is_unit_element("chronlist"));
    }

    #[test]
    fn test_finding_aid_is_one_tree() {
        let items = parse(FINDING_AID);
        assert_eq!(items.len(), 1);

        let top = &items[0].bundle;
        assert_eq!(top.identifier(), Some("p1"));
        let desc = &top.relation(DESCRIBES)[0];
        assert_eq!(desc.language(), Some("nld"));
        assert_eq!(desc.name(), Some("Papers of the Frank family"));
        assert_eq!(desc.data_text("levelOfDescription"), Some("fonds"));
        assert_eq!(desc.data_text("UNKNOWN_did_container"), Some("Box 3"));
        assert_eq!(
            desc.data_value("scopeAndContent").map(|v| v.texts()),
            Some(vec!["Letters.".to_string(), "Diaries.".to_string()])
        );
        assert_eq!(desc.relation(HAS_ACCESS_POINT).len(), 2);
        assert_eq!(desc.relation(HAS_DATE)[0].data_text("startDate"), Some("1939"));

        let series = &top.relation(CHILD_ITEM)[0];
        assert_eq!(series.identifier(), Some("c1"));
        assert_eq!(series.relation(DESCRIBES)[0].data_text("levelOfDescription"), Some("series"));
        assert_eq!(series.relation(CHILD_ITEM)[0].identifier(), Some("c1-a"));
    }

    #[test]
    fn test_default_language_without_header() {
        let items = parse("<ead><archdesc><did><unitid>x</unitid></did></archdesc></ead>");
        let desc = &items[0].bundle.relation(DESCRIBES)[0];
        assert_eq!(desc.language(), Some("eng"));
        assert_eq!(desc.name(), Some("x"));
    }
}
