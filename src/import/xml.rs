//! Push-style driver over quick-xml
//!
//! quick-xml is a pull parser; [`stream`] turns its events into
//! `start_element` / `characters` / `end_element` callbacks on a
//! [`SaxHandler`]. Element and attribute names are passed without their
//! namespace prefix. Whenever `end_element` returns a finished bundle it is
//! numbered and handed to the sink straight away, so records are persisted
//! while the rest of the document is still being read.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::BufRead;
use tracing::trace;

use super::{ImportError, ImportItem, ItemSink};
use crate::models::Bundle;

/// Callbacks for a streamed XML document
pub trait SaxHandler {
    fn start_element(&mut self, name: &str, attributes: &[(String, String)]) -> Result<(), ImportError>;

    /// Text content, already unescaped and trimmed.
    fn characters(&mut self, text: &str) -> Result<(), ImportError>;

    /// Returns the finished record when `name` closes one.
    fn end_element(&mut self, name: &str) -> Result<Option<Bundle>, ImportError>;
}

/// Value of the attribute with local name `name`.
pub fn attribute<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn parse_error<R>(reader: &Reader<R>, err: impl std::fmt::Display) -> ImportError {
    ImportError::Parse(format!("XML error at position {}: {}", reader.error_position(), err))
}

/// Drive `handler` over `input`, returning the number of records emitted.
pub fn stream<H: SaxHandler + ?Sized>(
    handler: &mut H,
    input: &mut dyn BufRead,
    sink: &mut dyn ItemSink,
) -> Result<usize, ImportError> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut emitted = 0usize;

    loop {
        let finished = match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let attributes = read_attributes(&reader, e)?;
                depth += 1;
                handler.start_element(&name, &attributes)?;
                None
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let attributes = read_attributes(&reader, e)?;
                handler.start_element(&name, &attributes)?;
                handler.end_element(&name)?
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                depth = depth.saturating_sub(1);
                handler.end_element(&name)?
            }
            Ok(Event::Text(ref t)) => {
                let text = match t.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(t).into_owned(),
                };
                if !text.is_empty() {
                    handler.characters(&text)?;
                }
                None
            }
            Ok(Event::CData(ref c)) => {
                let text = String::from_utf8_lossy(c).into_owned();
                let text = text.trim();
                if !text.is_empty() {
                    handler.characters(text)?;
                }
                None
            }
            Ok(Event::Eof) => {
                if depth > 0 {
                    return Err(parse_error(&reader, "unexpected end of document"));
                }
                break;
            }
            Err(e) => return Err(parse_error(&reader, e)),
            _ => None,
        };
        buf.clear();

        if let Some(bundle) = finished {
            emitted += 1;
            trace!(position = emitted, entity_type = %bundle.entity_type(), "Record finished");
            sink.accept(ImportItem {
                bundle,
                position: emitted,
            })?;
        }
    }

    Ok(emitted)
}

fn read_attributes<R>(
    reader: &Reader<R>,
    element: &quick_xml::events::BytesStart<'_>,
) -> Result<Vec<(String, String)>, ImportError> {
    let mut attributes = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| parse_error(reader, e))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    /// Emits one Country per `<country>` with its `code` attribute as identifier.
    #[derive(Default)]
    struct Countries {
        events: Vec<String>,
        current: Option<Bundle>,
    }

    impl SaxHandler for Countries {
        fn start_element(&mut self, name: &str, attributes: &[(String, String)]) -> Result<(), ImportError> {
            self.events.push(format!("start {}", name));
            if name == "country" {
                let code = attribute(attributes, "code").unwrap_or_default();
                self.current =
                    Some(Bundle::new(EntityType::Country).with_data_value("identifier", code));
            }
            Ok(())
        }

        fn characters(&mut self, text: &str) -> Result<(), ImportError> {
            self.events.push(format!("text {}", text));
            Ok(())
        }

        fn end_element(&mut self, name: &str) -> Result<Option<Bundle>, ImportError> {
            self.events.push(format!("end {}", name));
            Ok(if name == "country" { self.current.take() } else { None })
        }
    }

    #[test]
    fn test_events_and_records() {
        let xml = r#"<?xml version="1.0"?>
            <geo:list xmlns:geo="urn:geo">
              <geo:country code="gb">United &amp; Kingdom</geo:country>
              <geo:country code="nl"/>
            </geo:list>"#;
        let mut handler = Countries::default();
        let mut items: Vec<ImportItem> = Vec::new();
        let count = stream(&mut handler, &mut xml.as_bytes(), &mut items).unwrap();

        assert_eq!(count, 2);
        assert_eq!(items[1].position, 2);
        assert_eq!(items[1].bundle.identifier(), Some("nl"));
        assert_eq!(
            handler.events[..4],
            [
                "start list".to_string(),
                "start country".to_string(),
                "text United & Kingdom".to_string(),
                "end country".to_string(),
            ]
        );
    }

    #[test]
    fn test_malformed_input_is_parse_error() {
        let mut handler = Countries::default();
        let mut items: Vec<ImportItem> = Vec::new();
        let result = stream(&mut handler, &mut "<list><country></list>".as_bytes(), &mut items);
        assert!(matches!(result, Err(ImportError::Parse(_))));

        let truncated = stream(&mut handler, &mut "<list><country>".as_bytes(), &mut items);
        assert!(matches!(truncated, Err(ImportError::Parse(_))));
    }
}
