//! Org-Harvest main entry point
//!
//! This is the command-line interface for the Org-Harvest organization harvester.

use anyhow::{bail, Context};
use clap::Parser;
use org_harvest::config::{load_config_with_hash, Config};
use org_harvest::harvest::{build_orchestrator, describe, Harvester, Operation, Targets};
use org_harvest::input::{read_entities, read_organizations, read_repositories};
use org_harvest::output::{load_statistics, print_statistics, FileSink};
use org_harvest::storage::{open_shared_storage, with_storage, RunStatus, SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Org-Harvest: harvest organizations from a rate-limited REST API
///
/// Collects repositories, commit histories, contributors, members and their
/// relations for a set of organizations, spreading requests over a pool of
/// credentials. Results are written as CSV and GEXF files into a timestamped
/// folder; completed commit histories and entity searches are recorded in
/// SQLite so later runs skip them.
#[derive(Parser, Debug)]
#[command(name = "org-harvest")]
#[command(version)]
#[command(about = "Harvest organizations from a rate-limited REST API", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and inputs and show what would be harvested
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// CSV file of entities (column `entity_name`)
    #[arg(long, value_name = "CSV")]
    load_entities: Option<PathBuf>,

    /// CSV file of organizations (column `github_org_name`)
    #[arg(long, value_name = "CSV")]
    load_organizations: Option<PathBuf>,

    /// CSV file of repositories (columns `organization` and `name`)
    #[arg(long, value_name = "CSV")]
    load_repositories: Option<PathBuf>,

    /// Run every operation except the entity search
    #[arg(short, long)]
    all: bool,

    /// Repositories of the organizations
    #[arg(long)]
    repos: bool,

    /// Commit history of every non-fork repository
    #[arg(long)]
    commit_history: bool,

    /// Contributors of every repository, with their network
    #[arg(long)]
    contributors: bool,

    /// Repositories owned by members
    #[arg(long)]
    member_repos: bool,

    /// Profiles of members
    #[arg(long)]
    member_info: bool,

    /// Repositories starred by members
    #[arg(long)]
    starred: bool,

    /// Follower networks of members
    #[arg(long)]
    followers: bool,

    /// Network of organizations members belong to
    #[arg(long)]
    memberships: bool,

    /// Find organizations whose name matches ENTITY
    #[arg(long, value_name = "ENTITY")]
    entity_organizations: Option<String>,
}

impl Cli {
    fn operations(&self) -> Vec<Operation> {
        let mut operations: Vec<Operation> = if self.all {
            Operation::STANDARD.to_vec()
        } else {
            Operation::STANDARD
                .iter()
                .zip([
                    self.repos,
                    self.commit_history,
                    self.contributors,
                    self.member_repos,
                    self.member_info,
                    self.starred,
                    self.followers,
                    self.memberships,
                ])
                .filter(|(_, selected)| *selected)
                .map(|(operation, _)| operation.clone())
                .collect()
        };

        if let Some(entity) = &self.entity_organizations {
            operations.push(Operation::EntityOrganizations(entity.clone()));
        }
        operations
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.stats {
        return handle_stats(&config);
    }

    let operations = cli.operations();
    let targets = load_targets(&cli)?;
    check_plan(&operations, &targets)?;

    if cli.dry_run {
        handle_dry_run(&config, &operations, &targets);
        return Ok(());
    }

    handle_harvest(config, config_hash, operations, targets).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("org_harvest=info,warn"),
            1 => EnvFilter::new("org_harvest=debug,info"),
            2 => EnvFilter::new("org_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Reads every work-unit file given on the command line
fn load_targets(cli: &Cli) -> anyhow::Result<Targets> {
    let mut targets = Targets::default();

    if let Some(path) = &cli.load_entities {
        targets.entities = read_entities(path)?;
        tracing::info!("Loaded {} entities from {}", targets.entities.len(), path.display());
    }
    if let Some(path) = &cli.load_organizations {
        targets.organizations = read_organizations(path)?;
        tracing::info!(
            "Loaded {} organizations from {}",
            targets.organizations.len(),
            path.display()
        );
    }
    if let Some(path) = &cli.load_repositories {
        targets.repositories = read_repositories(path)?;
        tracing::info!(
            "Loaded {} repositories from {}",
            targets.repositories.len(),
            path.display()
        );
    }

    Ok(targets)
}

/// Rejects plans that cannot do anything before any request is made
fn check_plan(operations: &[Operation], targets: &Targets) -> anyhow::Result<()> {
    if operations.is_empty() {
        bail!("No operation selected. Pass --all or at least one operation flag (see --help)");
    }

    let needs_members = operations.iter().any(Operation::needs_members);
    let needs_repos = operations.iter().any(Operation::needs_repos);
    let has_orgs = !targets.organizations.is_empty() || !targets.entities.is_empty();

    if needs_members && !has_orgs {
        bail!(
            "The selected operations need organization members. \
             Provide --load-organizations or --load-entities"
        );
    }
    if needs_repos && !has_orgs && targets.repositories.is_empty() {
        bail!(
            "The selected operations need repositories. \
             Provide --load-repositories, --load-organizations or --load-entities"
        );
    }
    Ok(())
}

/// Handles the --dry-run mode: shows what would be harvested
fn handle_dry_run(config: &Config, operations: &[Operation], targets: &Targets) {
    println!("=== Org-Harvest Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Page size: {}", config.api.page_size);
    println!("  Max pages: {}", config.api.max_pages);
    println!("  Secondary cooldown: {}ms", config.api.secondary_cooldown_ms);

    println!("\nCredentials ({}):", config.credentials.len());
    for credential in &config.credentials {
        println!("  - {}", credential.user_name);
    }
    println!(
        "  Concurrent fetches: {}",
        config.credentials.len() * config.harvest.concurrency_per_credential as usize
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Data directory: {}", config.output.data_dir);

    println!("\nTargets:");
    println!("  Entities: {}", targets.entities.len());
    println!("  Organizations: {}", targets.organizations.len());
    for org in &targets.organizations {
        println!("    * {}", org);
    }
    println!("  Repositories: {}", targets.repositories.len());

    println!("\nOperations:");
    for operation in operations {
        println!("  - {}", operation);
    }

    println!("\n✓ Configuration and inputs are valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest
async fn handle_harvest(
    config: Config,
    config_hash: String,
    operations: Vec<Operation>,
    targets: Targets,
) -> anyhow::Result<()> {
    let storage = open_shared_storage(Path::new(&config.output.database_path))
        .context("Failed to open the harvest database")?;
    let orchestrator = build_orchestrator(&config, std::sync::Arc::clone(&storage))?;
    if let Some(deadline) = config.harvest.run_deadline() {
        orchestrator.arm_deadline(deadline);
    }

    let sink = FileSink::for_new_run(Path::new(&config.output.data_dir))
        .context("Failed to create the output directory")?;
    tracing::info!("Writing results to {}", sink.directory().display());

    let run_id = with_storage(&storage, |s| s.create_run(&config_hash, &describe(&operations)))?;
    tracing::info!("Starting harvest run #{}: {}", run_id, describe(&operations));

    let mut harvester = Harvester::new(orchestrator, sink, targets);
    let result = harvester.run(&operations).await;

    let status = match &result {
        Ok(report) if report.is_clean() => RunStatus::Completed,
        Ok(_) => RunStatus::Partial,
        Err(_) => RunStatus::Failed,
    };
    with_storage(&storage, |s| s.finish_run(run_id, status))?;

    match result {
        Ok(report) => {
            tracing::info!(
                "Harvest run #{} {}: {} units fetched ({} partial, {} failed), {} skipped",
                run_id,
                status.to_db_string(),
                report.dispatched,
                report.partial,
                report.failed,
                report.skipped
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest run #{} failed: {}", run_id, e);
            Err(e.into())
        }
    }
}
