//! Curate - curation engine CLI
//!
//! The `curate` command runs curation tasks over repository content.
//!
//! ## Commands
//!
//! - `run`: curate an object, the whole repository, or a selector's objects
//! - `tasks`: list, install or remove task definitions
//! - `queue`: drain queued curation requests

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use curate_core::metrics::METRICS;
use curate_core::{
    reporter_for, CurationConfig, CurationContext, Curator, CuratorSetup, Invoked,
    JournalRecorder, ManagedResource, ObjectSelector, OverlayProperties, PluginRegistry,
    QueueDriver, Status, StatusSet, TaskResolver, TxScope,
};
use curate_state::{
    ContentStore, IdentifierResolver, SurrealContentStore, SurrealHandle,
    SurrealTaskDefinitionStore, TaskDefinition, TaskDefinitionStore, TaskKind,
};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "curate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run curation tasks over repository content", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON (log lines and run outcomes)
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "CURATE_CONFIG")]
    config: Option<PathBuf>,

    /// Handle given to the site object when the repository is created
    #[arg(long, global = true, env = "CURATE_SITE_HANDLE", default_value = "123456789/0")]
    site_handle: String,

    /// Local database directory (default: SURREALDB_* environment, else in-memory)
    #[arg(long, global = true, env = "CURATE_DB_PATH")]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Curate objects with one or more tasks
    Run(RunArgs),

    /// Manage task definitions
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Queued curation requests
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// Task to run (repeatable)
    #[arg(short, long = "task")]
    tasks: Vec<String>,

    /// File of task names, one per line
    #[arg(short = 'T', long)]
    task_file: Option<PathBuf>,

    /// File of `<identifier> <task> [<task> ...]` lines
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Handle or UUID to curate, or `all` for the whole repository
    #[arg(short, long)]
    identifier: Option<String>,

    /// Curate the objects chosen by this selector
    #[arg(short = 'S', long)]
    selector: Option<String>,

    /// Acting user (e-mail)
    #[arg(short = 'e', long)]
    user: Option<String>,

    /// Reporter: `-` for stdout, `tracing`, or a file path
    #[arg(short, long)]
    reporter: Option<String>,

    /// Clear the object cache every N visited objects
    #[arg(short, long)]
    limit: Option<usize>,

    /// Transaction scope: object, curation or open
    #[arg(long)]
    scope: Option<TxScope>,

    /// Write audit records as JSON lines to this file
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Only journal these status codes, e.g. "%FAIL %ERROR"
    #[arg(long, requires = "journal")]
    journal_filter: Option<String>,

    /// Task property, `key=value` or `task.key=value` (repeatable)
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Queue the request on this queue instead of running it
    #[arg(short = 'q', long)]
    enqueue: Option<String>,
}

#[derive(Subcommand)]
enum TaskAction {
    /// List installed definitions
    List,

    /// Install a definition
    Install {
        /// Logical task name
        name: String,

        /// native, scripted, program or selector
        #[arg(short, long, default_value = "native")]
        kind: TaskKind,

        /// Plugin name, `language|constructor`, or program file path
        #[arg(short, long)]
        load_ref: Option<String>,

        /// Script or program source file
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// File of `key = value` property defaults
        #[arg(long)]
        defaults: Option<PathBuf>,

        #[arg(short, long)]
        description: Option<String>,

        /// Overwrite an existing definition of the same name
        #[arg(long)]
        replace: bool,
    },

    /// Remove a definition
    Remove {
        name: String,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Curate every pending request
    Drain {
        /// Only this queue (default: every queue with pending requests)
        #[arg(short, long)]
        queue: Option<String>,
    },
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property name in '{s}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

struct Backend {
    store: Arc<dyn ContentStore>,
    identifiers: Arc<dyn IdentifierResolver>,
    definitions: Arc<dyn TaskDefinitionStore>,
    plugins: Arc<PluginRegistry>,
}

impl Backend {
    async fn connect(site_handle: &str, db_path: Option<&Path>) -> Result<Self> {
        let handle = Arc::new(
            SurrealHandle::open(db_path)
                .await
                .context("Failed to connect to the curation database")?,
        );
        let content = Arc::new(
            SurrealContentStore::open(&handle, site_handle)
                .await
                .context("Failed to open the content hierarchy")?,
        );
        Ok(Self {
            store: content.clone(),
            identifiers: content,
            definitions: Arc::new(SurrealTaskDefinitionStore::new(handle)),
            plugins: Arc::new(PluginRegistry::with_builtins()),
        })
    }

    fn resolver(&self) -> TaskResolver {
        TaskResolver::new(self.definitions.clone()).with_plugins(self.plugins.clone())
    }

    fn context(&self, user: Option<&str>) -> CurationContext {
        CurationContext::new(self.store.clone(), self.identifiers.clone())
            .with_user(user.map(str::to_string))
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    if let Commands::Run(args) = &cli.command {
        if let Err(e) = validate(args) {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    }

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    curate_core::telemetry::init_tracing(cli.json, level);

    let verbose = cli.verbose;
    let started = Instant::now();
    let outcome = dispatch(cli).await;
    METRICS.flush();
    match outcome {
        Ok(()) => {
            if verbose {
                eprintln!("finished in {:.3}s", started.elapsed().as_secs_f64());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = CurationConfig::load(cli.config.as_deref())
        .context("Failed to load curation configuration")?;
    let backend = Backend::connect(&cli.site_handle, cli.db_path.as_deref()).await?;
    let installed = config
        .install_definitions(backend.definitions.as_ref())
        .await
        .context("Failed to install configured task definitions")?;
    if installed > 0 {
        info!(installed, "configured task definitions installed");
    }

    match cli.command {
        Commands::Run(args) => {
            let outcomes = cmd_run(&backend, &config, &args).await?;
            print_outcomes(&outcomes, cli.json, cli.verbose)
        }
        Commands::Tasks { action } => match action {
            TaskAction::List => cmd_tasks_list(backend.definitions.as_ref(), cli.json).await,
            TaskAction::Install {
                name,
                kind,
                load_ref,
                source,
                defaults,
                description,
                replace,
            } => {
                let definition = build_definition(
                    &name,
                    kind,
                    load_ref,
                    source.as_deref(),
                    defaults.as_deref(),
                    description,
                )?;
                cmd_tasks_install(backend.definitions.as_ref(), definition, replace).await
            }
            TaskAction::Remove { name } => {
                cmd_tasks_remove(backend.definitions.as_ref(), &name).await
            }
        },
        Commands::Queue { action } => match action {
            QueueAction::Drain { queue } => {
                cmd_queue_drain(&backend, &config, queue.as_deref(), cli.json).await
            }
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct TaskOutcome {
    target: String,
    task: String,
    status: Status,
    result: Option<String>,
}

/// One unit of work: a target and the tasks to run on it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Job {
    target: Target,
    tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Identifier(String),
    Selector(String),
}

impl Target {
    fn label(&self) -> &str {
        match self {
            Target::Identifier(id) => id,
            Target::Selector(name) => name,
        }
    }
}

/// A usage error against `curate run`, printed with its usage line.
fn run_usage_error(kind: ErrorKind, message: impl std::fmt::Display) -> clap::Error {
    let mut command = Cli::command().bin_name("curate");
    command.build();
    match command.find_subcommand_mut("run") {
        Some(run) => run.error(kind, message),
        None => command.error(kind, message),
    }
}

fn validate(args: &RunArgs) -> std::result::Result<(), clap::Error> {
    let sources = [
        !args.tasks.is_empty(),
        args.task_file.is_some(),
        args.script.is_some(),
    ];
    match sources.iter().filter(|given| **given).count() {
        0 => {
            return Err(run_usage_error(
                ErrorKind::MissingRequiredArgument,
                "one of --task, --task-file or --script is required",
            ))
        }
        1 => {}
        _ => {
            return Err(run_usage_error(
                ErrorKind::ArgumentConflict,
                "--task, --task-file and --script are mutually exclusive",
            ))
        }
    }

    let targets = args.identifier.is_some() as usize + args.selector.is_some() as usize;
    if args.script.is_some() {
        if targets > 0 {
            return Err(run_usage_error(
                ErrorKind::ArgumentConflict,
                "--script names its own targets; drop --identifier/--selector",
            ));
        }
    } else if targets != 1 {
        return Err(run_usage_error(
            ErrorKind::MissingRequiredArgument,
            "exactly one of --identifier or --selector is required",
        ));
    }

    if args.enqueue.is_some() && args.identifier.is_none() && args.script.is_none() {
        return Err(run_usage_error(
            ErrorKind::MissingRequiredArgument,
            "--enqueue needs an identifier",
        ));
    }
    if let Some(codes) = &args.journal_filter {
        StatusSet::parse(codes).map_err(|e| {
            run_usage_error(ErrorKind::InvalidValue, format!("invalid --journal-filter: {e}"))
        })?;
    }
    if args.limit == Some(0) {
        return Err(run_usage_error(
            ErrorKind::ValueValidation,
            "--limit must be positive",
        ));
    }
    Ok(())
}

/// Task names from a task file: one per line, `#` comments and blank lines
/// ignored.
fn parse_task_file(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Jobs from a script: `<identifier> <task> [<task> ...]` per line.
fn parse_script(text: &str) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        let Some(identifier) = words.next() else {
            continue;
        };
        let tasks: Vec<String> = words.map(str::to_string).collect();
        if tasks.is_empty() {
            bail!("script line {}: no tasks for {identifier}", number + 1);
        }
        jobs.push(Job {
            target: Target::Identifier(identifier.to_string()),
            tasks,
        });
    }
    if jobs.is_empty() {
        bail!("script contains no jobs");
    }
    Ok(jobs)
}

fn read_file(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {what} {path:?}"))
}

fn plan(args: &RunArgs) -> Result<Vec<Job>> {
    if let Some(script) = &args.script {
        return parse_script(&read_file(script, "script")?);
    }
    let tasks = match &args.task_file {
        Some(path) => parse_task_file(&read_file(path, "task file")?),
        None => args.tasks.clone(),
    };
    if tasks.is_empty() {
        bail!("no tasks given");
    }
    let target = match (&args.identifier, &args.selector) {
        (Some(id), _) => Target::Identifier(id.clone()),
        (None, Some(name)) => Target::Selector(name.clone()),
        (None, None) => bail!("no curation target given"),
    };
    Ok(vec![Job { target, tasks }])
}

async fn cmd_run(
    backend: &Backend,
    config: &CurationConfig,
    args: &RunArgs,
) -> Result<Vec<TaskOutcome>> {
    let jobs = plan(args)?;
    if args.enqueue.is_some() {
        config.durable_queue()?;
    }

    let mut ctx = backend.context(args.user.as_deref());
    let mut outcomes = Vec::new();
    for job in &jobs {
        let mut curator = build_curator(backend, config, args, &job.tasks).await?;

        if let Some(queue) = &args.enqueue {
            curator.queue(&ctx, job.target.label(), queue).await?;
            println!("queued {} on {queue}", job.target.label());
            curator.complete();
            continue;
        }

        let run = curate_target(&mut curator, &mut ctx, backend, config, &job.target).await;
        if let Err(e) = run {
            curator.complete();
            return Err(e).with_context(|| format!("Curation of {} failed", job.target.label()));
        }
        for task in curator.tasks() {
            outcomes.push(TaskOutcome {
                target: job.target.label().to_string(),
                status: curator.status(&task),
                result: curator.result(&task).map(str::to_string),
                task,
            });
        }
        curator.complete();
    }
    Ok(outcomes)
}

async fn build_curator(
    backend: &Backend,
    config: &CurationConfig,
    args: &RunArgs,
    tasks: &[String],
) -> Result<Curator> {
    let mut curator = Curator::new(backend.resolver());
    config.configure_curator(&mut curator)?;
    if curator.invoked().is_none() {
        curator.set_invoked(Invoked::Batch);
    }
    if let Some(spec) = &args.reporter {
        curator.set_reporter(reporter_for(spec)?);
    }
    if let Some(limit) = args.limit {
        curator.set_cache_limit(limit);
    }
    if let Some(scope) = args.scope {
        curator.set_transaction_scope(scope);
    }
    if let Some(path) = &args.journal {
        let filter = args
            .journal_filter
            .as_deref()
            .map(StatusSet::parse)
            .transpose()
            .map_err(|e| anyhow!("invalid --journal-filter: {e}"))?;
        let path = path.clone();
        curator.set_recorder_factory(Arc::new(move || {
            Ok(Arc::new(JournalRecorder::open(&path, filter)?) as Arc<dyn ManagedResource>)
        }));
    }
    if !args.params.is_empty() {
        let mut overrides = HashMap::new();
        for (key, value) in &args.params {
            if key.contains('.') {
                overrides.insert(key.clone(), value.clone());
            } else {
                for task in tasks {
                    overrides.insert(format!("{task}.{key}"), value.clone());
                }
            }
        }
        let base = curator.properties();
        curator.set_properties(Arc::new(OverlayProperties::new(overrides, base)));
    }

    for task in tasks {
        if !curator.add_task(task).await {
            bail!("task '{task}' could not be resolved");
        }
    }
    Ok(curator)
}

async fn curate_target(
    curator: &mut Curator,
    ctx: &mut CurationContext,
    backend: &Backend,
    config: &CurationConfig,
    target: &Target,
) -> Result<()> {
    match target {
        Target::Identifier(id) if id == "all" => {
            let site = backend.store.site().await?;
            curator.curate(ctx, &site).await?;
        }
        Target::Identifier(id) => curator.curate_id(ctx, id).await?,
        Target::Selector(name) => {
            let mut selector = resolve_selector(backend, config, name).await?;
            curator.curate_selector(ctx, selector.as_mut()).await?;
        }
    }
    Ok(())
}

/// Configured selector profiles first, then selector definitions.
async fn resolve_selector(
    backend: &Backend,
    config: &CurationConfig,
    name: &str,
) -> Result<Box<dyn ObjectSelector>> {
    if let Some(selector) = config.selector_resolver(backend.plugins.clone()).resolve(name) {
        return Ok(selector);
    }
    backend
        .resolver()
        .resolve_selector(name)
        .await
        .ok_or_else(|| anyhow!("selector '{name}' could not be resolved"))
}

fn print_outcomes(outcomes: &[TaskOutcome], json: bool, verbose: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
    } else if verbose {
        for outcome in outcomes {
            println!(
                "{:<8} {:<24} {} {}",
                outcome.status,
                outcome.task,
                outcome.target,
                outcome.result.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// tasks
// ---------------------------------------------------------------------------

async fn cmd_tasks_list(definitions: &dyn TaskDefinitionStore, json: bool) -> Result<()> {
    let mut all = definitions.list().await?;
    all.sort_by(|a, b| a.name.cmp(&b.name));

    if json {
        println!("{}", serde_json::to_string_pretty(&all)?);
        return Ok(());
    }
    if all.is_empty() {
        println!("No task definitions installed");
        return Ok(());
    }
    println!("{:<24} {:<9} {:<28} DESCRIPTION", "NAME", "KIND", "LOAD REF");
    for definition in all {
        println!(
            "{:<24} {:<9} {:<28} {}",
            definition.name,
            definition.kind,
            definition.load_ref,
            definition.description.unwrap_or_default()
        );
    }
    Ok(())
}

fn build_definition(
    name: &str,
    kind: TaskKind,
    load_ref: Option<String>,
    source: Option<&Path>,
    defaults: Option<&Path>,
    description: Option<String>,
) -> Result<TaskDefinition> {
    let source = source.map(|path| read_file(path, "source")).transpose()?;
    let config = defaults.map(|path| read_file(path, "defaults")).transpose()?;

    let load_ref = match (kind, load_ref) {
        (_, Some(load_ref)) => load_ref,
        (TaskKind::Program, None) if source.is_some() => name.to_string(),
        (TaskKind::Program, None) => bail!("program {name} needs --source or --load-ref"),
        (TaskKind::Scripted, None) => bail!("scripted task {name} needs --load-ref language|constructor"),
        (_, None) => bail!("{kind} definition {name} needs --load-ref"),
    };
    if kind == TaskKind::Scripted && !load_ref.contains('|') {
        bail!("scripted load ref must be language|constructor, got '{load_ref}'");
    }

    Ok(TaskDefinition {
        name: name.to_string(),
        description,
        kind,
        load_ref,
        source,
        config,
    })
}

async fn cmd_tasks_install(
    definitions: &dyn TaskDefinitionStore,
    definition: TaskDefinition,
    replace: bool,
) -> Result<()> {
    let name = definition.name.clone();
    if definitions.find(&name).await?.is_some() {
        if !replace {
            bail!("task '{name}' is already installed (use --replace)");
        }
        definitions.update(definition).await?;
        println!("Updated {name}");
    } else {
        definitions.install(definition).await?;
        println!("Installed {name}");
    }
    Ok(())
}

async fn cmd_tasks_remove(definitions: &dyn TaskDefinitionStore, name: &str) -> Result<()> {
    if !definitions.remove(name).await? {
        bail!("no task definition named '{name}'");
    }
    println!("Removed {name}");
    Ok(())
}

// ---------------------------------------------------------------------------
// queue
// ---------------------------------------------------------------------------

async fn cmd_queue_drain(
    backend: &Backend,
    config: &CurationConfig,
    queue: Option<&str>,
    json: bool,
) -> Result<()> {
    let task_queue = config.durable_queue()?;

    let shared = config.clone();
    let setup: CuratorSetup = Arc::new(move |curator: &mut Curator| shared.configure_curator(curator));
    let driver = QueueDriver::new(
        backend.resolver(),
        task_queue,
        backend.store.clone(),
        backend.identifiers.clone(),
    )
    .with_setup(setup);

    let summaries = match queue {
        Some(name) => vec![driver.drain(name).await?],
        None => driver.drain_all().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else if summaries.is_empty() {
        println!("No pending requests");
    } else {
        for summary in &summaries {
            println!(
                "{}: {} request(s), {} failed (ticket {})",
                summary.queue, summary.entries, summary.failed, summary.ticket
            );
        }
    }
    let failed: usize = summaries.iter().map(|s| s.failed).sum();
    if failed > 0 {
        bail!("{failed} queued request(s) failed and were returned to the queue");
    }
    Ok(())
}
