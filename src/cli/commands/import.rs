//! Import command implementation

use archival_import_sdk::import::{Importer, StreamHandler};
use archival_import_sdk::{
    Actor, AuthorityImporter, BundleImporter, ConceptImporter, CsvHandler, EacHandler, EadHandler,
    Entity, EntityType, FileGraphStore, ImportManager, ImportOptions, JsonLinesHandler, Mutation,
    SkosHandler, UnitImporter,
};
use clap::{Args, ValueEnum};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

use crate::error::CliError;
use crate::output::{format_log_json, format_log_text, format_sync_json, format_sync_text};

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    /// EAD finding aids
    Ead,
    /// EAC-CPF authority records
    Eac,
    /// SKOS concept schemes in RDF/XML
    Skos,
    /// Delimited tables, one record per row
    Csv,
    /// Serialized bundles, one per line
    Jsonl,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Input format
    #[arg(short, long, value_enum)]
    pub format: InputFormat,

    /// Graph snapshot file, created if missing
    #[arg(short, long)]
    pub graph: PathBuf,

    /// Id of the entity that will own the imported records
    #[arg(short, long)]
    pub scope: Option<String>,

    /// Entity type of table rows
    #[arg(long, default_value = "DocumentaryUnit")]
    pub entity_type: EntityType,

    /// TOML file with import options
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Skip invalid records instead of aborting
    #[arg(long)]
    pub tolerant: bool,

    /// Fail if any existing entity would change
    #[arg(long)]
    pub no_updates: bool,

    /// Log message stored on the provenance event
    #[arg(short, long)]
    pub message: Option<String>,

    /// User credited with the import
    #[arg(short, long)]
    pub user: Option<String>,

    /// Property mapping file
    #[arg(short, long)]
    pub properties: Option<PathBuf>,

    /// Language of descriptions that do not state one
    #[arg(long)]
    pub lang: Option<String>,

    /// Column delimiter for tables
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Table column naming each row's parent
    #[arg(long)]
    pub parent_column: Option<String>,

    /// Delete units of the scope that the input no longer contains
    #[arg(long, requires = "scope")]
    pub sync: bool,

    /// Unit id the sync must leave alone; repeat as needed
    #[arg(long, requires = "sync")]
    pub exclude: Vec<String>,

    /// Print a plain text summary instead of the JSON log
    #[arg(long)]
    pub text: bool,

    /// Input files, or '-' for stdin
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

/// Merge the config file with command line flags; flags win.
fn load_options(args: &ImportArgs) -> Result<ImportOptions, CliError> {
    let mut options = match &args.config {
        Some(path) => ImportOptions::from_file(path)?,
        None => ImportOptions::new(),
    };
    if args.tolerant {
        options = options.tolerant(true);
    }
    if args.no_updates {
        options = options.allow_updates(false);
    }
    if let Some(message) = &args.message {
        options = options.message(message.clone());
    }
    if let Some(path) = &args.properties {
        options = options.properties(path.clone());
    }
    if let Some(lang) = &args.lang {
        options = options.default_language(lang.clone());
    }
    if let Some(delimiter) = args.delimiter {
        options = options.csv_delimiter(delimiter);
    }
    if let Some(column) = &args.parent_column {
        options = options.parent_column(column.clone());
    }
    options.check()?;
    Ok(options)
}

fn build_handler(
    format: InputFormat,
    entity_type: EntityType,
    options: &ImportOptions,
) -> Result<Box<dyn StreamHandler>, CliError> {
    let handler: Box<dyn StreamHandler> = match format {
        InputFormat::Ead => Box::new(EadHandler::from_options(options)?),
        InputFormat::Eac => Box::new(EacHandler::from_options(options)?),
        InputFormat::Skos => Box::new(SkosHandler::from_options(options)),
        InputFormat::Csv => Box::new(CsvHandler::from_options(entity_type, options)?),
        InputFormat::Jsonl => Box::new(JsonLinesHandler::new()),
    };
    Ok(handler)
}

/// Entity type the records of `format` become; `None` for raw bundles.
fn build_entity_type(format: InputFormat, entity_type: EntityType) -> Option<EntityType> {
    match format {
        InputFormat::Ead => Some(EntityType::DocumentaryUnit),
        InputFormat::Eac => Some(EntityType::HistoricalAgent),
        InputFormat::Skos => Some(EntityType::Concept),
        InputFormat::Csv => Some(entity_type),
        InputFormat::Jsonl => None,
    }
}

fn build_importer(format: InputFormat, entity_type: EntityType) -> Box<dyn Importer> {
    match build_entity_type(format, entity_type) {
        Some(EntityType::DocumentaryUnit) => Box::new(UnitImporter::new()),
        Some(EntityType::HistoricalAgent) => Box::new(AuthorityImporter::new()),
        Some(EntityType::Concept) => Box::new(ConceptImporter::new()),
        _ => Box::new(BundleImporter::new()),
    }
}

/// Handle the import command
pub fn handle_import(args: &ImportArgs) -> Result<(), CliError> {
    let options = load_options(args)?;
    let mut handler = build_handler(args.format, args.entity_type, &options)?;
    let mut importer = build_importer(args.format, args.entity_type);

    let from_stdin = args.inputs.len() == 1 && args.inputs[0].as_os_str() == "-";
    if !from_stdin
        && let Some(missing) = args.inputs.iter().find(|p| !p.is_file())
    {
        return Err(CliError::FileReadError(missing.clone(), "no such file".to_string()));
    }

    if args.sync
        && build_entity_type(args.format, args.entity_type) != Some(EntityType::DocumentaryUnit)
    {
        return Err(CliError::InvalidArgument("--sync only applies to documentary units".to_string()));
    }

    let mut store = FileGraphStore::open(&args.graph)?;
    let actor = args.user.as_deref().map(Actor::new).unwrap_or_default();
    let mut manager = ImportManager::new(&mut store)
        .with_options(options)
        .with_actor(actor)
        .with_callback(|m: &Mutation<Entity>| {
            debug!(id = %m.node().id, state = ?m.state(), "Item processed");
        });
    if let Some(scope) = &args.scope {
        manager = manager.with_scope(scope.clone());
    }

    if args.sync {
        let excludes: HashSet<String> = args.exclude.iter().cloned().collect();
        let log = if from_stdin {
            let stdin = std::io::stdin();
            manager.sync_reader(handler.as_mut(), importer.as_mut(), "stdin", &mut stdin.lock(), &excludes)?
        } else {
            manager.sync_files(handler.as_mut(), importer.as_mut(), args.inputs.as_slice(), &excludes)?
        };
        if args.text {
            print!("{}", format_sync_text(&log));
        } else {
            println!("{}", format_sync_json(&log)?);
        }
        return Ok(());
    }

    let log = if from_stdin {
        let stdin = std::io::stdin();
        manager.import_reader(handler.as_mut(), importer.as_mut(), "stdin", &mut stdin.lock())?
    } else {
        manager.import_files(handler.as_mut(), importer.as_mut(), args.inputs.as_slice())?
    };

    if args.text {
        print!("{}", format_log_text(&log));
    } else {
        println!("{}", format_log_json(&log)?);
    }
    Ok(())
}
