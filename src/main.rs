use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::{Parser, Subcommand};
use donorsync::config::{load_organizations, load_target_config};
use donorsync::report::write_reports;
use donorsync::target::RpcTransport;
use donorsync::{
    ArtifactStore, HttpRpcTransport, MigrationExecutor, OrganizationCredentials,
    ReconciliationEngine, RunLedger, SourceSystemClient, SyncConfig, TargetSystemClient,
    load_account_numbers,
};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const TARGET_CONFIG_FILE: &str = "etapestry.config.json";
const ORGANIZATIONS_FILE: &str = "raisedonors.config.json";

#[derive(Parser)]
#[command(name = "donorsync")]
#[command(about = "Reconcile and migrate donations between donor-management platforms")]
struct Cli {
    /// Directory holding the credential files
    #[arg(long, default_value = "input")]
    input_dir: PathBuf,

    /// Directory holding the run ledger and staged artifacts
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Talk to the sandbox target database
    #[arg(long)]
    sandbox: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile last week's approved donations for every organization
    Weekly {
        /// Stage candidates without creating them
        #[arg(long)]
        no_import: bool,
    },
    /// Reconcile the donors listed in a CSV file
    Bulk {
        #[arg(long)]
        csv: PathBuf,
        /// Organization label; the first configured one by default
        #[arg(long)]
        org: Option<String>,
        /// Create the candidates right after discovery
        #[arg(long)]
        import: bool,
    },
    /// Create the candidates staged by an earlier run
    Execute {
        #[arg(long)]
        run: u64,
    },
    /// Write CSV reports for a run
    Report {
        #[arg(long)]
        run: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List recorded runs
    Runs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = SyncConfig::new(&cli.output_dir);
    if cli.sandbox {
        config = config.sandbox();
    }
    config.validate().map_err(|e| anyhow!(e))?;

    let store = ArtifactStore::new(&config.output_dir);
    let mut ledger = RunLedger::load(store.ledger_path())
        .await
        .context("Failed to load run ledger")?;

    match &cli.command {
        Command::Runs => {
            for run in ledger.runs() {
                match run.source_run {
                    Some(source) => println!("#{} {} {} (from #{})", run.num, run.label, run.status, source),
                    None => println!("#{} {} {}", run.num, run.label, run.status),
                }
            }
            return Ok(());
        }
        Command::Report { run, out } => {
            let paths = write_reports(&store, *run, out.as_deref())
                .await
                .with_context(|| format!("Failed to write reports for run #{}", run))?;
            println!("{}", paths.donations.display());
            println!("{}", paths.unmatched.display());
            return Ok(());
        }
        _ => {}
    }

    let targets = load_target_config(&cli.input_dir.join(TARGET_CONFIG_FILE))?;
    let credentials = targets.credentials(config.environment);
    let transport = HttpRpcTransport::new(credentials.endpoint.as_deref())?;
    let target = TargetSystemClient::login(transport, credentials, config.target_page_size)
        .await
        .context("Target login failed")?;

    let outcome = match cli.command {
        Command::Weekly { no_import } => {
            let config = config.import_enabled(!no_import);
            weekly(&cli.input_dir, &config, &target, &store, &mut ledger).await
        }
        Command::Bulk { csv, org, import } => {
            let config = config.import_enabled(import);
            bulk(&cli.input_dir, &config, &csv, org.as_deref(), &target, &store, &mut ledger).await
        }
        Command::Execute { run } => {
            let report = MigrationExecutor::new(&target, &store)
                .execute(&mut ledger, run)
                .await;
            report
                .map(|r| info!(run = r.run, created = r.created.len(), "Execution complete"))
                .map_err(Into::into)
        }
        Command::Runs | Command::Report { .. } => Ok(()),
    };

    if let Err(err) = target.logout().await {
        error!(error = %err, "Target logout failed");
    }
    outcome
}

async fn weekly<T: RpcTransport>(
    input_dir: &Path,
    config: &SyncConfig,
    target: &TargetSystemClient<T>,
    store: &ArtifactStore,
    ledger: &mut RunLedger,
) -> Result<()> {
    let organizations = load_organizations(&input_dir.join(ORGANIZATIONS_FILE))?;
    let today = Local::now().date_naive();

    for organization in &organizations {
        let source = SourceSystemClient::new(organization, config)?;
        let mut engine =
            ReconciliationEngine::new(&organization.label, &source, target, store, config);

        let discovery = match engine.reconcile_window(ledger, today).await {
            Ok(discovery) => discovery,
            Err(err) if !err.is_fatal() => {
                warn!(label = %organization.label, error = %err, "Skipping organization");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        if config.import_enabled {
            let report = MigrationExecutor::new(target, store)
                .execute(ledger, discovery.run)
                .await?;
            info!(label = %organization.label, run = report.run, created = report.created.len(), "Imported donations");
        }
    }
    Ok(())
}

async fn bulk<T: RpcTransport>(
    input_dir: &Path,
    config: &SyncConfig,
    csv: &Path,
    label: Option<&str>,
    target: &TargetSystemClient<T>,
    store: &ArtifactStore,
    ledger: &mut RunLedger,
) -> Result<()> {
    let organizations = load_organizations(&input_dir.join(ORGANIZATIONS_FILE))?;
    let organization = select_organization(&organizations, label)?;
    let account_numbers = load_account_numbers(csv)
        .with_context(|| format!("Failed to read accounts from '{}'", csv.display()))?;

    let source = SourceSystemClient::new(organization, config)?;
    let mut engine = ReconciliationEngine::new(&organization.label, &source, target, store, config);
    let discovery = engine.reconcile_accounts(ledger, &account_numbers).await?;

    if config.import_enabled {
        let report = MigrationExecutor::new(target, store)
            .execute(ledger, discovery.run)
            .await?;
        info!(run = report.run, created = report.created.len(), "Imported donations");
    }
    Ok(())
}

fn select_organization<'a>(
    organizations: &'a [OrganizationCredentials],
    label: Option<&str>,
) -> Result<&'a OrganizationCredentials> {
    match label {
        Some(label) => organizations
            .iter()
            .find(|o| o.label == label)
            .ok_or_else(|| anyhow!("No organization labelled '{}'", label)),
        None => organizations
            .first()
            .ok_or_else(|| anyhow!("No organizations configured")),
    }
}
