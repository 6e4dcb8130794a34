//! EAC-CPF authority record handler
//!
//! Each `eac-cpf` element becomes one HistoricalAgent. Text is mapped
//! through a [`PropertyMap`] keyed on the path below `eac-cpf`; existence
//! dates and maintenance events are read directly.

use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{debug, trace};

use super::properties::{PathMapping, PropertyMap};
use super::shape::{date_period, ElementPath, RawRecord, RecordShaper};
use super::xml::{self, attribute, SaxHandler};
use super::{ImportError, ImportOptions, ItemSink, StreamHandler};
use crate::models::{Bundle, EntityType};

const RECORD: &str = "eac-cpf";
const EXIST_DATES: &str = "existDates";
const MAINTENANCE_EVENT: &str = "maintenanceEvent";

/// Streams EAC-CPF documents, one or many records per input
#[derive(Debug)]
pub struct EacHandler {
    properties: PropertyMap,
    shaper: RecordShaper,
    current: Option<Record>,
}

#[derive(Debug, Default)]
struct Record {
    path: ElementPath,
    record: RawRecord,
    /// `standardDate`-like attribute per open element
    normals: Vec<Option<String>>,
    dates: BTreeMap<String, String>,
    event: Option<BTreeMap<String, String>>,
}

impl EacHandler {
    pub fn new(properties: PropertyMap, default_language: impl Into<String>) -> Result<Self, ImportError> {
        Ok(Self {
            properties,
            shaper: RecordShaper::new(EntityType::HistoricalAgent, default_language)?,
            current: None,
        })
    }

    pub fn from_options(options: &ImportOptions) -> Result<Self, ImportError> {
        let properties = match &options.properties {
            Some(path) => PropertyMap::from_file(path)?,
            None => PropertyMap::eac(),
        };
        Self::new(properties, options.default_language.clone())
    }
}

impl Record {
    fn close_exist_dates(&mut self) {
        let dates = std::mem::take(&mut self.dates);
        let range = match (dates.get("fromDate"), dates.get("toDate"), dates.get("date")) {
            (Some(from), Some(to), _) => Some(format!("{}/{}", from, to)),
            (Some(from), None, _) => Some(from.clone()),
            (None, _, Some(date)) => Some(date.clone()),
            _ => None,
        };
        let text = dates.get("text").cloned().unwrap_or_default();
        match range.and_then(|normal| date_period(&text, Some(&normal), "existence")) {
            Some(date) => self.record.add_date(date),
            None => debug!(?dates, "Existence dates without a usable date"),
        }
    }

    fn close_event(&mut self) {
        let Some(fields) = self.event.take() else {
            return;
        };
        let event = fields
            .into_iter()
            .fold(Bundle::new(EntityType::MaintenanceEvent), |event, (key, value)| {
                event.with_data_value(key, value)
            });
        self.record.add_maintenance_event(event);
    }
}

fn event_field(element: &str) -> Option<&'static str> {
    match element {
        "eventType" => Some("eventType"),
        "eventDateTime" => Some("date"),
        "agentType" => Some("agentType"),
        "agent" => Some("source"),
        "eventDescription" => Some("eventDescription"),
        _ => None,
    }
}

impl SaxHandler for EacHandler {
    fn start_element(&mut self, name: &str, attributes: &[(String, String)]) -> Result<(), ImportError> {
        if name == RECORD {
            self.current = Some(Record::default());
            return Ok(());
        }
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };

        current.path.open(name);
        current.normals.push(
            attribute(attributes, "standardDate")
                .or_else(|| attribute(attributes, "standardDateTime"))
                .map(str::to_string),
        );
        if name == MAINTENANCE_EVENT {
            current.event = Some(BTreeMap::new());
        }
        for (key, value) in attributes {
            if let Some(PathMapping::Field(field)) = self.properties.lookup_attribute(current.path.names(), key) {
                current.record.push(field, value);
            }
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), ImportError> {
        if let Some(current) = self.current.as_mut() {
            current.path.append_text(text);
        }
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<Option<Bundle>, ImportError> {
        if name == RECORD {
            let Some(current) = self.current.take() else {
                return Ok(None);
            };
            let agent = self.shaper.shape(current.record);
            trace!(identifier = ?agent.identifier(), "Closed EAC record");
            return Ok(Some(agent));
        }
        let Some(current) = self.current.as_mut() else {
            return Ok(None);
        };

        let normal = current.normals.pop().flatten();
        let in_dates = current.path.contains(EXIST_DATES);
        let in_event = current.event.is_some();
        let Some((element, text)) = current.path.close(&self.properties, &mut current.record) else {
            return Ok(None);
        };
        let text = text.trim();

        if in_dates {
            match element.as_str() {
                "fromDate" | "toDate" | "date" => {
                    if let Some(value) = normal.as_deref().or(Some(text)).filter(|v| !v.is_empty()) {
                        current.dates.insert(element.clone(), value.to_string());
                    }
                    if !text.is_empty() {
                        let joined = match current.dates.get("text") {
                            Some(existing) => format!("{} - {}", existing, text),
                            None => text.to_string(),
                        };
                        current.dates.insert("text".to_string(), joined);
                    }
                }
                EXIST_DATES => current.close_exist_dates(),
                _ => {}
            }
        }

        if in_event {
            if element == MAINTENANCE_EVENT {
                current.close_event();
            } else if let (Some(field), Some(event)) = (event_field(&element), current.event.as_mut()) {
                let value = normal.as_deref().unwrap_or(text);
                if !value.is_empty() {
                    event.insert(field.to_string(), value.to_string());
                }
            }
        }
        Ok(None)
    }
}

impl StreamHandler for EacHandler {
    fn name(&self) -> &'static str {
        "eac"
    }

    fn stream(&mut self, input: &mut dyn BufRead, sink: &mut dyn ItemSink) -> Result<usize, ImportError> {
        self.current = None;
        xml::stream(self, input, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportItem;
    use crate::models::entity_type::{DESCRIBES, HAS_DATE, HAS_MAINTENANCE_EVENT};

    const RECORD_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<eac-cpf xmlns="urn:isbn:1-931666-33-4">
  <control>
    <recordId>a1</recordId>
    <maintenanceHistory>
      <maintenanceEvent>
        <eventType>created</eventType>
        <eventDateTime standardDateTime="2013-04-02">2 April 2013</eventDateTime>
        <agentType>human</agentType>
        <agent>Archivist</agent>
      </maintenanceEvent>
    </maintenanceHistory>
    <languageDeclaration><language languageCode="deu">German</language></languageDeclaration>
  </control>
  <cpfDescription>
    <identity>
      <entityType>person</entityType>
      <nameEntry><part>Frank, Anne</part></nameEntry>
      <nameEntryParallel><nameEntry><part>Anne Frank</part></nameEntry></nameEntryParallel>
    </identity>
    <description>
      <existDates>
        <dateRange>
          <fromDate standardDate="1929-06-12">12 June 1929</fromDate>
          <toDate>1945</toDate>
        </dateRange>
      </existDates>
      <biogHist><p>Diarist.</p></biogHist>
    </description>
  </cpfDescription>
</eac-cpf>"#;

    fn parse(xml: &str) -> Vec<ImportItem> {
        let mut handler = EacHandler::new(PropertyMap::eac(), "eng").unwrap();
        let mut items = Vec::new();
        handler.stream(&mut xml.as_bytes(), &mut items).unwrap();
        items
    }

    #[test]
    fn test_authority_record() {
        let items = parse(RECORD_XML);
        assert_eq!(items.len(), 1);
        let agent = &items[0].bundle;
        assert_eq!(agent.entity_type(), EntityType::HistoricalAgent);
        assert_eq!(agent.identifier(), Some("a1"));

        let desc = &agent.relation(DESCRIBES)[0];
        assert_eq!(desc.name(), Some("Frank, Anne"));
        assert_eq!(desc.language(), Some("deu"));
        assert_eq!(desc.data_text("typeOfEntity"), Some("person"));
        assert_eq!(desc.data_text("parallelFormsOfName"), Some("Anne Frank"));
        assert_eq!(desc.data_text("biographicalHistory"), Some("Diarist."));

        let date = &desc.relation(HAS_DATE)[0];
        assert_eq!(date.data_text("startDate"), Some("1929-06-12"));
        assert_eq!(date.data_text("endDate"), Some("1945"));
        assert_eq!(date.data_text("type"), Some("existence"));
        assert_eq!(date.data_text("description"), Some("12 June 1929 - 1945"));

        let event = &desc.relation(HAS_MAINTENANCE_EVENT)[0];
        assert_eq!(event.data_text("eventType"), Some("created"));
        assert_eq!(event.data_text("date"), Some("2013-04-02"));
        assert_eq!(event.data_text("source"), Some("Archivist"));
    }

    #[test]
    fn test_several_records_per_input() {
        let xml = r#"<collection>
            <eac-cpf><control><recordId>a1</recordId></control></eac-cpf>
            <eac-cpf><control><recordId>a2</recordId></control></eac-cpf>
        </collection>"#;
        let items = parse(xml);
        let ids: Vec<_> = items.iter().map(|i| i.bundle.identifier()).collect();
        assert_eq!(ids, vec![Some("a1"), Some("a2")]);
        assert_eq!(items[1].position, 2);
    }
}
