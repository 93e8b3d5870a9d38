//! Stacklift CLI entrypoint.
//!
//! Wires the request, graph, planner, provider, and state layers together
//! behind the CLI commands, and maps run outcomes to exit codes:
//! 0 success, 2 invalid request, 3 failed and fully rolled back, 4 failed
//! with manual reconciliation required, 1 everything else.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use stacklift::cli::{Cli, Commands, OutputFormatter, StateCommands};
use stacklift::error::{Result, StackliftError};
use stacklift::graph::GraphBuilder;
use stacklift::planner::{CancelToken, PlanExecutor, ProvisioningPlan, RollbackCoordinator};
use stacklift::provider::AwsCliClient;
use stacklift::request::{RequestHasher, RequestParser, RequestValidator, find_request_file};
use stacklift::state::{LOCK_REFRESH_SECS, LockInfo, RunOutcome, RunState, RunStateStore};

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for an invalid request.
const EXIT_INVALID_REQUEST: u8 = 2;

/// Exit code for a failed run that was fully rolled back.
const EXIT_ROLLED_BACK: u8 = 3;

/// Exit code when manual reconciliation is required.
const EXIT_MANUAL_RECONCILIATION: u8 = 4;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code_for_error(&e)
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Maps errors that escape the command handlers to exit codes.
fn exit_code_for_error(err: &StackliftError) -> ExitCode {
    match err {
        StackliftError::Request(_) => ExitCode::from(EXIT_INVALID_REQUEST),
        _ => ExitCode::FAILURE,
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(cli.request.as_ref(), warnings, &formatter),
        Commands::Plan { detailed } => cmd_plan(cli.request.as_ref(), detailed, &formatter),
        Commands::Provision { yes, region } => {
            cmd_provision(cli.request.as_ref(), yes, region, &formatter).await
        }
        Commands::Rollback { yes, region } => cmd_rollback(yes, region, &formatter).await,
        Commands::State { command } => match command {
            StateCommands::Show => cmd_state_show(&formatter).await,
        },
    }
}

/// Initialize a new project.
fn cmd_init(path: &PathBuf, force: bool) -> Result<ExitCode> {
    info!("Initializing new stacklift project in: {}", path.display());

    let request_path = path.join("stacklift.deploy.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && request_path.exists() {
        eprintln!("Request file already exists: {}", request_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(ExitCode::FAILURE);
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    let request_template = include_str!("../templates/stacklift.deploy.yaml");
    std::fs::write(&request_path, request_template)?;
    eprintln!("Created: {}", request_path.display());

    let env_template = include_str!("../templates/.env.example");
    std::fs::write(&env_path, env_template)?;
    eprintln!("Created: {}", env_path.display());

    let mut ignores = Vec::new();
    let existing = if gitignore_path.exists() {
        std::fs::read_to_string(&gitignore_path)?
    } else {
        String::new()
    };
    for entry in [".env", ".stacklift/"] {
        if !existing.contains(entry) {
            ignores.push(entry);
        }
    }
    if !ignores.is_empty() {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&gitignore_path)?;
        for entry in ignores {
            writeln!(file, "{entry}")?;
        }
        eprintln!("Updated: {}", gitignore_path.display());
    }

    eprintln!("\nEdit stacklift.deploy.yaml, then run: stacklift plan");
    Ok(ExitCode::SUCCESS)
}

/// Validate the request file.
fn cmd_validate(
    request_path: Option<&PathBuf>,
    warnings: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let request = load_request(request_path)?;
    let result = RequestValidator::new().check(&request);

    print!("{}", formatter.format_validation(&result, warnings));

    if result.is_valid() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_INVALID_REQUEST))
    }
}

/// Compute and display the plan. Dry run: no client is ever constructed.
fn cmd_plan(
    request_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let request = load_request(request_path)?;
    let graph = GraphBuilder::new().build(&request)?;
    let hash = RequestHasher::new().hash_request(&request);
    let plan = ProvisioningPlan::new(&graph, hash)?;

    print!("{}", formatter.format_plan(&plan, detailed));
    Ok(ExitCode::SUCCESS)
}

/// Provision the stack.
async fn cmd_provision(
    request_path: Option<&PathBuf>,
    yes: bool,
    region: Option<String>,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let request = load_request(request_path)?;
    let graph = GraphBuilder::new().build(&request)?;
    let hash = RequestHasher::new().hash_request(&request);
    let plan = ProvisioningPlan::new(&graph, hash.clone())?;

    let store = RunStateStore::new()?;

    // A prior successful run of this exact request means every resource
    // already exists; re-provisioning would only create duplicates of the
    // kinds that cannot be looked up by name.
    if let Some(prior) = store.load().await? {
        if prior.is_successful() && prior.request_hash == hash {
            return Err(StackliftError::DuplicateResource {
                logical_id: String::from("*"),
                message: format!(
                    "run {} already provisioned this request; run `stacklift rollback` first or remove {}",
                    prior.run_id,
                    store.state_path().display()
                ),
            });
        }
    }

    print!("{}", formatter.format_plan(&plan, false));
    if !yes && !confirm("Provision these resources?")? {
        eprintln!("Aborted.");
        return Ok(ExitCode::FAILURE);
    }

    let lock = store.acquire_lock().await?;
    let refresher = spawn_lock_refresher(&store, &lock);

    let cancel = CancelToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping at the current resource");
            signal_token.cancel();
        }
    });

    let client = region.map_or_else(AwsCliClient::new, AwsCliClient::with_region);
    let mut state = RunState::new(hash);
    let result = PlanExecutor::new(&client)
        .execute(&plan, &mut state, &cancel)
        .await;
    refresher.abort();

    // Persist whatever happened before surfacing the outcome.
    store.save(&state).await?;
    store.release_lock(&lock).await?;
    let result = result?;

    print!("{}", formatter.format_result(&result));

    match &result.outcome {
        RunOutcome::Provisioned { .. } => Ok(ExitCode::SUCCESS),
        RunOutcome::Failed { rollback, .. } if rollback.is_clean() => {
            Ok(ExitCode::from(EXIT_ROLLED_BACK))
        }
        RunOutcome::Failed { .. } => Ok(ExitCode::from(EXIT_MANUAL_RECONCILIATION)),
    }
}

/// Roll back the resources recorded by the persisted run state.
async fn cmd_rollback(
    yes: bool,
    region: Option<String>,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let store = RunStateStore::new()?;
    let Some(mut state) = store.load().await? else {
        eprintln!("No persisted run state; nothing to roll back.");
        return Ok(ExitCode::SUCCESS);
    };

    let created = state.created_in_order();
    if created.is_empty() {
        eprintln!("Run {} holds no created resources; removing state.", state.run_id);
        store.delete().await?;
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!("Run {} created {} resources:", state.run_id, created.len());
    for (id, kind, external_id) in &created {
        eprintln!("  {id} [{kind}] {external_id}");
    }
    if !yes && !confirm("Delete them all?")? {
        eprintln!("Aborted.");
        return Ok(ExitCode::FAILURE);
    }

    let lock = store.acquire_lock().await?;
    let refresher = spawn_lock_refresher(&store, &lock);
    let client = region.map_or_else(AwsCliClient::new, AwsCliClient::with_region);
    let outcome = RollbackCoordinator::new(&client).rollback(&mut state).await;
    refresher.abort();

    println!("{}", formatter.format_rollback(&outcome));

    if outcome.is_clean() {
        debug!("Rollback clean; removing run state");
        store.delete().await?;
        store.release_lock(&lock).await?;
        Ok(ExitCode::SUCCESS)
    } else {
        store.save(&state).await?;
        store.release_lock(&lock).await?;
        Ok(ExitCode::from(EXIT_MANUAL_RECONCILIATION))
    }
}

/// Show persisted run state.
async fn cmd_state_show(formatter: &OutputFormatter) -> Result<ExitCode> {
    let store = RunStateStore::new()?;
    match store.load().await? {
        Some(state) => {
            print!("{}", formatter.format_run_state(&state));
        }
        None => eprintln!("No persisted run state."),
    }
    Ok(ExitCode::SUCCESS)
}

/// Keeps the run lock alive for as long as the returned task runs.
///
/// Abort the task once the run finishes, before releasing the lock.
fn spawn_lock_refresher(store: &RunStateStore, lock: &LockInfo) -> tokio::task::JoinHandle<()> {
    let store = store.clone();
    let mut lock = lock.clone();
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(LOCK_REFRESH_SECS);
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(err) = store.refresh_lock(&mut lock).await {
                warn!("Failed to refresh run lock: {err}");
            }
        }
    })
}

/// Loads the request from the given path or by searching upward.
fn load_request(request_path: Option<&PathBuf>) -> Result<stacklift::ProvisioningRequest> {
    let path = match request_path {
        Some(path) => path.clone(),
        None => {
            let cwd = std::env::current_dir().map_err(|e| {
                StackliftError::internal(format!("Cannot determine current directory: {e}"))
            })?;
            find_request_file(&cwd)?
        }
    };

    let parser = RequestParser::new().with_base_path(parent_of(&path));
    parser.load_dotenv()?;
    let request = parser.load_with_env(&path)?;
    debug!("Loaded request for function '{}'", request.function.name);
    Ok(request)
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Asks the user for confirmation on stderr.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N] ");
    std::io::stderr().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
