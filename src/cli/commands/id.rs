//! Id command implementation

use archival_import_sdk::identifier;
use clap::Args;

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct IdArgs {
    /// Local identifier of a scope, outermost first; repeat per level
    #[arg(short, long = "scope")]
    pub scope: Vec<String>,

    /// Local identifier of the entity
    pub local: String,
}

/// Handle the id command
pub fn handle_id(args: &IdArgs) -> Result<(), CliError> {
    if args.local.trim().is_empty() {
        return Err(CliError::InvalidArgument("local identifier must not be empty".to_string()));
    }
    println!("{}", identifier::generate(args.scope.as_slice(), &args.local)?);
    Ok(())
}
