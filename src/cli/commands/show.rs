//! Show command implementation

use archival_import_sdk::FileGraphStore;
use archival_import_sdk::convert::{self, DEFAULT_DEPTH, Serializer, TextFormat};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Graph snapshot file
    #[arg(short, long)]
    pub graph: PathBuf,

    /// Entity id
    pub id: String,

    /// Levels of dependents to include
    #[arg(short, long, default_value_t = DEFAULT_DEPTH)]
    pub depth: usize,

    #[arg(short, long, value_enum, default_value = "json")]
    pub output: OutputFormat,
}

/// Handle the show command
pub fn handle_show(args: &ShowArgs) -> Result<(), CliError> {
    if !args.graph.is_file() {
        return Err(CliError::FileReadError(args.graph.clone(), "no such file".to_string()));
    }
    let store = FileGraphStore::open(&args.graph)?;
    let bundle = Serializer::with_depth(args.depth).entity_to_bundle(&store, &args.id)?;
    let format = match args.output {
        OutputFormat::Json => TextFormat::Json,
        OutputFormat::Yaml => TextFormat::Yaml,
    };
    println!("{}", convert::render(&bundle, format)?);
    Ok(())
}
