//! Import run orchestration
//!
//! An [`ImportManager`] runs one handler and one importer over one or more
//! inputs inside a single graph transaction:
//!
//! ```text
//! OpenTransaction -> StreamRecord -> Persist -> Classify -> ... -> AttachProvenance -> Commit
//!                                                                        (any failure) -> Rollback
//! ```
//!
//! Records are persisted as the handler emits them. A run either commits
//! everything it did, including its provenance event, or nothing.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::{ImportContext, ImportError, ImportItem, ImportLog, ImportOptions, Importer, ItemSink, StreamHandler};
use crate::models::{Entity, Mutation};
use crate::persistence::{Actor, BundleDao, EventContext, EventType, Scope};
use crate::storage::GraphStore;

/// Stage of an import run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run started yet
    Idle,
    OpenTransaction,
    StreamRecord,
    Persist,
    Classify,
    AttachProvenance,
    Commit,
    Rollback,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::OpenTransaction => "open-transaction",
            RunState::StreamRecord => "stream-record",
            RunState::Persist => "persist",
            RunState::Classify => "classify",
            RunState::AttachProvenance => "attach-provenance",
            RunState::Commit => "commit",
            RunState::Rollback => "rollback",
        };
        write!(f, "{}", s)
    }
}

/// Observer of every persisted item
pub trait ImportCallback {
    fn item_processed(&mut self, mutation: &Mutation<Entity>);
}

impl<F> ImportCallback for F
where
    F: FnMut(&Mutation<Entity>),
{
    fn item_processed(&mut self, mutation: &Mutation<Entity>) {
        self(mutation)
    }
}

/// Extra work a run does inside its transaction, around the ingest
pub(crate) trait RunHook {
    type Output;

    /// Called once the scope is resolved, before any input is read.
    fn before_ingest(&mut self, _ctx: &mut ImportContext<'_>) -> Result<(), ImportError> {
        Ok(())
    }

    /// Called after the importer finished, before provenance is attached.
    fn after_ingest(&mut self, ctx: &mut ImportContext<'_>) -> Result<Self::Output, ImportError>;
}

/// Plain ingest
struct NoHook;

impl RunHook for NoHook {
    type Output = ();

    fn after_ingest(&mut self, _ctx: &mut ImportContext<'_>) -> Result<(), ImportError> {
        Ok(())
    }
}

/// One input of a run
pub(crate) enum Source<'r> {
    Reader { name: String, input: &'r mut dyn BufRead },
    File(PathBuf),
}

impl Source<'_> {
    fn name(&self) -> String {
        match self {
            Source::Reader { name, .. } => name.clone(),
            Source::File(path) => path.display().to_string(),
        }
    }
}

/// Forwards handler output to the importer
struct RecordSink<'c, 'a> {
    ctx: &'c mut ImportContext<'a>,
    importer: &'c mut dyn Importer,
}

impl ItemSink for RecordSink<'_, '_> {
    fn accept(&mut self, item: ImportItem) -> Result<(), ImportError> {
        self.ctx.set_position(item.position);
        self.ctx.transition(RunState::Persist);
        self.importer.import_item(self.ctx, item)?;
        self.ctx.transition(RunState::Classify);
        Ok(())
    }
}

/// Runs imports against a graph store
pub struct ImportManager<'s> {
    store: &'s mut dyn GraphStore,
    scope_id: Option<String>,
    actor: Actor,
    options: ImportOptions,
    callbacks: Vec<Box<dyn ImportCallback>>,
    state: RunState,
}

impl<'s> ImportManager<'s> {
    pub fn new(store: &'s mut dyn GraphStore) -> Self {
        Self {
            store,
            scope_id: None,
            actor: Actor::system(),
            options: ImportOptions::default(),
            callbacks: Vec::new(),
            state: RunState::Idle,
        }
    }

    /// Import into the entity with this id instead of the root scope.
    pub fn with_scope(mut self, id: impl Into<String>) -> Self {
        self.scope_id = Some(id.into());
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_callback(mut self, callback: impl ImportCallback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub(crate) fn scope_id(&self) -> Option<&str> {
        self.scope_id.as_deref()
    }

    pub(crate) fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Final state of the last run.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Import one stream; `source` names it in error locations.
    pub fn import_reader(
        &mut self,
        handler: &mut dyn StreamHandler,
        importer: &mut dyn Importer,
        source: &str,
        input: &mut dyn BufRead,
    ) -> Result<ImportLog, ImportError> {
        let sources = vec![Source::Reader {
            name: source.to_string(),
            input,
        }];
        Ok(self.run(handler, importer, sources, &mut NoHook)?.0)
    }

    pub fn import_file(
        &mut self,
        handler: &mut dyn StreamHandler,
        importer: &mut dyn Importer,
        path: impl AsRef<Path>,
    ) -> Result<ImportLog, ImportError> {
        self.import_files(handler, importer, &[path])
    }

    /// Import several files in one transaction.
    pub fn import_files<P: AsRef<Path>>(
        &mut self,
        handler: &mut dyn StreamHandler,
        importer: &mut dyn Importer,
        paths: &[P],
    ) -> Result<ImportLog, ImportError> {
        let sources = paths
            .iter()
            .map(|p| Source::File(p.as_ref().to_path_buf()))
            .collect();
        Ok(self.run(handler, importer, sources, &mut NoHook)?.0)
    }

    pub(crate) fn run<H: RunHook>(
        &mut self,
        handler: &mut dyn StreamHandler,
        importer: &mut dyn Importer,
        sources: Vec<Source<'_>>,
        hook: &mut H,
    ) -> Result<(ImportLog, H::Output), ImportError> {
        self.options.check()?;
        let dao = BundleDao::new().with_updates_allowed(self.options.allow_updates);
        let event = EventContext::new(self.actor.clone(), EventType::Ingest, self.options.message.clone());
        let message = self.options.message.clone();
        info!(
            handler = handler.name(),
            inputs = sources.len(),
            scope = ?self.scope_id,
            tolerant = self.options.tolerant,
            "Starting import"
        );

        self.state = RunState::OpenTransaction;
        let mut txn = self.store.begin()?;
        let outcome = {
            let mut ctx = ImportContext::new(
                txn.as_mut(),
                dao,
                event,
                self.options.tolerant,
                &mut self.callbacks,
            );
            match stream_sources(&mut ctx, handler, importer, sources, self.scope_id.as_deref(), hook) {
                Ok(extra) => ctx.finish_run(message).map(|log| (log, extra)),
                Err(err) => Err(err),
            }
        };

        match outcome {
            Ok((log, extra)) => {
                debug!(from = %RunState::AttachProvenance, to = %RunState::Commit, "Import state");
                txn.commit()?;
                self.state = RunState::Commit;
                info!(
                    created = log.created(),
                    updated = log.updated(),
                    unchanged = log.unchanged(),
                    errors = log.error_count(),
                    "Import committed"
                );
                Ok((log, extra))
            }
            Err(err) => {
                txn.rollback();
                self.state = RunState::Rollback;
                error!(error = %err, "Import rolled back");
                Err(err)
            }
        }
    }
}

fn stream_sources<H: RunHook>(
    ctx: &mut ImportContext<'_>,
    handler: &mut dyn StreamHandler,
    importer: &mut dyn Importer,
    sources: Vec<Source<'_>>,
    scope_id: Option<&str>,
    hook: &mut H,
) -> Result<H::Output, ImportError> {
    if let Some(id) = scope_id {
        let scope = Scope::resolve(ctx.graph(), id)?;
        ctx.set_scope(scope);
    }
    hook.before_ingest(ctx)?;

    for source in sources {
        let name = source.name();
        ctx.set_source(&name);
        ctx.transition(RunState::StreamRecord);
        let mut sink = RecordSink {
            ctx: &mut *ctx,
            importer: &mut *importer,
        };
        let streamed = match source {
            Source::Reader { input, .. } => handler.stream(input, &mut sink),
            Source::File(path) => File::open(&path)
                .map_err(ImportError::from)
                .and_then(|file| handler.stream(&mut BufReader::new(file), &mut sink)),
        };
        let count = streamed.map_err(|e| e.at(name.as_str()))?;
        debug!(source = %name, records = count, "Input streamed");
    }

    ctx.transition(RunState::Persist);
    importer.finish(ctx)?;
    hook.after_ingest(ctx)
}

impl fmt::Debug for ImportManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportManager")
            .field("scope_id", &self.scope_id)
            .field("actor", &self.actor)
            .field("options", &self.options)
            .field("callbacks", &self.callbacks.len())
            .field("state", &self.state)
            .finish()
    }
}
