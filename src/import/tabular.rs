//! Delimited table handler
//!
//! The first row names the columns; every following row is one record of a
//! single entity type. Headers go through [`PropertyMap::column`], so a
//! mapping file can rename or drop columns. Cells of multi-valued fields
//! are split on the value separator.
//!
//! A table can also describe a hierarchy, through a parent column or a
//! child-to-parent map. Such tables are read in full, and each row is
//! nested under its parent before the top-level rows are emitted.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use tracing::{debug, trace};

use super::properties::{PathMapping, PropertyMap};
use super::shape::{RawRecord, RecordShaper};
use super::{CHILD_ITEM, ImportError, ImportItem, ImportOptions, ItemSink, StreamHandler};
use crate::models::{Bundle, EntityType};

/// Streams CSV rows into bundles of one entity type
#[derive(Debug)]
pub struct CsvHandler {
    properties: PropertyMap,
    shaper: RecordShaper,
    delimiter: u8,
    separator: char,
    parent_column: Option<String>,
    hierarchy_map: BTreeMap<String, String>,
}

/// A shaped row waiting for its place in the hierarchy
struct PendingRow {
    position: usize,
    parent: Option<String>,
    bundle: Bundle,
}

impl CsvHandler {
    pub fn new(entity_type: EntityType, properties: PropertyMap, default_language: &str) -> Result<Self, ImportError> {
        Ok(Self {
            properties,
            shaper: RecordShaper::new(entity_type, default_language)?,
            delimiter: b',',
            separator: ';',
            parent_column: None,
            hierarchy_map: BTreeMap::new(),
        })
    }

    pub fn from_options(entity_type: EntityType, options: &ImportOptions) -> Result<Self, ImportError> {
        options.check()?;
        let properties = match &options.properties {
            Some(path) => PropertyMap::from_file(path)?,
            None => PropertyMap::new(),
        };
        let mut handler = Self::new(entity_type, properties, &options.default_language)?
            .with_delimiter(options.csv_delimiter)
            .with_value_separator(options.value_separator)
            .with_hierarchy_map(options.hierarchy_map.clone());
        if let Some(column) = &options.parent_column {
            handler = handler.with_parent_column(column.clone());
        }
        if handler.is_hierarchical() && entity_type != EntityType::DocumentaryUnit {
            return Err(ImportError::Config(format!(
                "table hierarchies need DocumentaryUnit rows, not {}",
                entity_type
            )));
        }
        Ok(handler)
    }

    /// Non-ASCII delimiters fall back to `,`.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = u8::try_from(delimiter).unwrap_or(b',');
        self
    }

    pub fn with_value_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Take each row's parent from this column. The column is not stored.
    pub fn with_parent_column(mut self, column: impl Into<String>) -> Self {
        self.parent_column = Some(column.into());
        self
    }

    pub fn with_hierarchy_map(mut self, map: BTreeMap<String, String>) -> Self {
        self.hierarchy_map = map;
        self
    }

    fn is_hierarchical(&self) -> bool {
        self.parent_column.is_some() || !self.hierarchy_map.is_empty()
    }

    fn fields(&self, headers: &::csv::StringRecord) -> Vec<Option<String>> {
        headers
            .iter()
            .map(|header| match self.properties.column(header) {
                _ if self.parent_column.as_deref() == Some(header) => None,
                PathMapping::Field(field) => Some(field.to_string()),
                PathMapping::Unknown(key) => Some(key),
                PathMapping::Ignored => None,
            })
            .collect()
    }
}

impl StreamHandler for CsvHandler {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn stream(&mut self, input: &mut dyn BufRead, sink: &mut dyn ItemSink) -> Result<usize, ImportError> {
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(::csv::Trim::All)
            .from_reader(input);

        let headers = reader.headers()?.clone();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::Parse("no content found".to_string()));
        }
        let fields = self.fields(&headers);
        let parent_index = match &self.parent_column {
            Some(column) => Some(headers.iter().position(|h| h == column).ok_or_else(|| {
                ImportError::Parse(format!("parent column '{}' is not in the header", column))
            })?),
            None => None,
        };
        debug!(columns = headers.len(), hierarchical = self.is_hierarchical(), "Read table header");

        let mut emitted = 0;
        let mut pending = Vec::new();
        for row in reader.records() {
            let row = row?;
            let mut record = RawRecord::new();
            for (field, cell) in fields.iter().zip(row.iter()) {
                let Some(field) = field else {
                    continue;
                };
                if self.shaper.is_multivalued(field) {
                    for value in cell.split(self.separator) {
                        record.push(field, value);
                    }
                } else {
                    record.push(field, cell);
                }
            }
            if record.is_empty() {
                trace!("Skipping blank row");
                continue;
            }

            emitted += 1;
            let bundle = self.shaper.shape(record);
            if !self.is_hierarchical() {
                sink.accept(ImportItem {
                    bundle,
                    position: emitted,
                })?;
                continue;
            }
            let parent = parent_index
                .and_then(|i| row.get(i))
                .filter(|cell| !cell.is_empty())
                .map(str::to_string)
                .or_else(|| {
                    bundle
                        .identifier()
                        .and_then(|id| self.hierarchy_map.get(id))
                        .cloned()
                });
            pending.push(PendingRow {
                position: emitted,
                parent,
                bundle,
            });
        }

        if self.is_hierarchical() {
            let roots = nest(pending)?;
            debug!(rows = emitted, top_level = roots.len(), "Nested table rows");
            for item in roots {
                sink.accept(item)?;
            }
        }
        Ok(emitted)
    }
}

/// Hang every row under its parent row and return the top-level rows.
fn nest(rows: Vec<PendingRow>) -> Result<Vec<ImportItem>, ImportError> {
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        if let Some(id) = row.bundle.identifier() {
            index.entry(id.to_string()).or_insert(i);
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    let mut roots = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let Some(parent) = &row.parent else {
            roots.push(i);
            continue;
        };
        match index.get(parent) {
            Some(&p) if p == i => {
                return Err(ImportError::Parse(format!("row {} is its own parent", row.position)));
            }
            Some(&p) => children[p].push(i),
            None => {
                return Err(ImportError::Parse(format!(
                    "row {}: parent '{}' is not in the table",
                    row.position, parent
                )));
            }
        }
    }

    let mut slots: Vec<Option<PendingRow>> = rows.into_iter().map(Some).collect();
    let mut items = Vec::with_capacity(roots.len());
    for root in roots {
        let position = slots[root].as_ref().map(|r| r.position).unwrap_or_default();
        let bundle = assemble(root, &mut slots, &children)?;
        items.push(ImportItem { bundle, position });
    }

    if let Some(row) = slots.iter().flatten().next() {
        return Err(ImportError::Parse(format!(
            "row {} is part of a parent cycle",
            row.position
        )));
    }
    Ok(items)
}

fn assemble(
    at: usize,
    slots: &mut [Option<PendingRow>],
    children: &[Vec<usize>],
) -> Result<Bundle, ImportError> {
    let row = slots[at]
        .take()
        .ok_or_else(|| ImportError::Parse("row reached twice while nesting".to_string()))?;
    let mut bundle = row.bundle;
    for &child in &children[at] {
        let child = assemble(child, slots, children)?;
        bundle = bundle.with_relation(CHILD_ITEM, child);
    }
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity_type::{DESCRIBES, HAS_ACCESS_POINT};
    use crate::models::DataValue;

    fn parse(handler: &mut CsvHandler, text: &str) -> Result<Vec<ImportItem>, ImportError> {
        let mut items = Vec::new();
        handler.stream(&mut text.as_bytes(), &mut items)?;
        Ok(items)
    }

    #[test]
    fn test_rows_become_units() {
        let properties = PropertyMap::new()
            .with_entry("Ref", "identifier")
            .with_entry("Title", "name")
            .with_entry("Internal", "");
        let mut handler = CsvHandler::new(EntityType::DocumentaryUnit, properties, "eng").unwrap();
        let items = parse(
            &mut handler,
            "Ref,Title,Internal,personAccess,Extent\n\
             p1,Letters,x,\"Frank, Otto;Frank, Edith\",2 boxes\n\
             ,,,,\n\
             p2,Diaries,,,\n",
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].position, 2);

        let p1 = &items[0].bundle.relation(DESCRIBES)[0];
        assert_eq!(p1.relation(HAS_ACCESS_POINT).len(), 2);
        assert_eq!(p1.data_text("Extent"), Some("2 boxes"));

        let p2 = &items[1].bundle;
        assert_eq!(p2.identifier(), Some("p2"));
        assert_eq!(p2.relation(DESCRIBES)[0].name(), Some("Diaries"));
        assert!(p2.relation(DESCRIBES)[0].data_value("Internal").is_none());
    }

    #[test]
    fn test_multivalued_cells_are_split() {
        let mut handler = CsvHandler::new(EntityType::DocumentaryUnit, PropertyMap::new(), "eng")
            .unwrap()
            .with_delimiter('\t')
            .with_value_separator('|');
        let items = parse(
            &mut handler,
            "identifier\tname\tpersonAccess\tlanguageOfMaterial\tscope and content\n\
             p1\tLetters\tFrank, Otto|Frank, Edith\tnld|deu\tLetters; some diaries\n",
        )
        .unwrap();

        let desc = &items[0].bundle.relation(DESCRIBES)[0];
        assert_eq!(desc.relation(HAS_ACCESS_POINT).len(), 2);
        assert_eq!(
            desc.data_value("languageOfMaterial"),
            Some(&DataValue::from(vec!["nld", "deu"]))
        );
        assert_eq!(desc.data_text("scopeandcontent"), Some("Letters; some diaries"));
    }

    #[test]
    fn test_parent_column_nests_rows() {
        let mut handler = CsvHandler::new(EntityType::DocumentaryUnit, PropertyMap::new(), "eng")
            .unwrap()
            .with_parent_column("parent");
        let items = parse(
            &mut handler,
            "identifier,name,parent
             c1,Letters,p1
             p1,Papers,
             c2,Diaries,p1
             f1,Folder,c1
",
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].position, 2);

        let p1 = &items[0].bundle;
        assert_eq!(p1.identifier(), Some("p1"));
        let children = p1.relation(CHILD_ITEM);
        assert_eq!(
            children.iter().map(|c| c.identifier()).collect::<Vec<_>>(),
            vec![Some("c1"), Some("c2")]
        );
        assert_eq!(children[0].relation(CHILD_ITEM)[0].identifier(), Some("f1"));
        assert!(children[0].relation(DESCRIBES)[0].data_value("parent").is_none());
    }

    #[test]
    fn test_hierarchy_map_nests_rows() {
        let map = BTreeMap::from([("c1".to_string(), "p1".to_string())]);
        let mut handler = CsvHandler::new(EntityType::DocumentaryUnit, PropertyMap::new(), "eng")
            .unwrap()
            .with_hierarchy_map(map);
        let items = parse(&mut handler, "identifier,name
p1,Papers
c1,Letters
p2,Photos
").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].bundle.relation(CHILD_ITEM)[0].identifier(), Some("c1"));
        assert_eq!(items[1].bundle.identifier(), Some("p2"));
        assert_eq!(items[1].position, 3);
    }

    #[test]
    fn test_broken_hierarchies_are_parse_errors() {
        let mut handler = CsvHandler::new(EntityType::DocumentaryUnit, PropertyMap::new(), "eng")
            .unwrap()
            .with_parent_column("parent");
        let err = parse(&mut handler, "identifier,parent
c1,p9
").unwrap_err();
        assert!(err.to_string().contains("parent 'p9' is not in the table"));

        let err = parse(&mut handler, "identifier,parent
a,b
b,a
").unwrap_err();
        assert!(err.to_string().contains("parent cycle"));

        let err = parse(&mut handler, "identifier,name
p1,Papers
").unwrap_err();
        assert!(matches!(err, ImportError::Parse(_)));
    }

    #[test]
    fn test_hierarchy_needs_unit_rows() {
        let options = ImportOptions::new().parent_column("parent");
        assert!(matches!(
            CsvHandler::from_options(EntityType::HistoricalAgent, &options),
            Err(ImportError::Config(_))
        ));
        assert!(CsvHandler::from_options(EntityType::DocumentaryUnit, &options).is_ok());
    }

    #[test]
    fn test_empty_input_is_parse_error() {
        let mut handler = CsvHandler::new(EntityType::Repository, PropertyMap::new(), "eng").unwrap();
        assert!(matches!(parse(&mut handler, ""), Err(ImportError::Parse(_))));
    }
}
