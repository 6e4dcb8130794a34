//! JSON-lines bundle handler
//!
//! Each non-blank line holds one serialized bundle in the layout of
//! [`crate::convert`].

use std::io::BufRead;
use tracing::trace;

use super::{ImportError, ImportItem, ItemSink, StreamHandler};
use crate::convert;

/// Streams one bundle per line
#[derive(Debug, Default)]
pub struct JsonLinesHandler;

impl JsonLinesHandler {
    pub fn new() -> Self {
        Self
    }
}

impl StreamHandler for JsonLinesHandler {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn stream(&mut self, input: &mut dyn BufRead, sink: &mut dyn ItemSink) -> Result<usize, ImportError> {
        let mut emitted = 0;
        for (number, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let bundle = convert::to_bundle(&line)
                .map_err(|e| ImportError::Parse(format!("line {}: {}", number + 1, e)))?;
            emitted += 1;
            trace!(line = number + 1, entity_type = %bundle.entity_type(), "Read bundle");
            sink.accept(ImportItem {
                bundle,
                position: emitted,
            })?;
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    #[test]
    fn test_one_bundle_per_line() {
        let text = concat!(
            r#"{"type": "Country", "data": {"identifier": "nl"}}"#,
            "\n\n",
            r#"{"type": "Country", "data": {"identifier": "gb"}}"#,
            "\n"
        );
        let mut items = Vec::new();
        let count = JsonLinesHandler::new().stream(&mut text.as_bytes(), &mut items).unwrap();
        assert_eq!(count, 2);
        assert_eq!(items[1].bundle.entity_type(), EntityType::Country);
        assert_eq!(items[1].bundle.identifier(), Some("gb"));
        assert_eq!(items[1].position, 2);
    }

    #[test]
    fn test_bad_line_names_its_number() {
        let text = "{\"type\": \"Country\", \"data\": {}}\n{oops\n";
        let mut items = Vec::new();
        let err = JsonLinesHandler::new()
            .stream(&mut text.as_bytes(), &mut items)
            .unwrap_err();
        assert!(matches!(&err, ImportError::Parse(msg) if msg.starts_with("line 2:")));
        assert_eq!(items.len(), 1);
    }
}
