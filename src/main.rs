use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracks_migrator::config::{self, MigratorConfig};
use tracks_migrator::fleet::{Fleet, FleetSettings};
use tracks_migrator::ledger::Ledger;
use tracks_migrator::oracle::ChatOracle;
use tracks_migrator::registry::GiteaClient;
use tracks_migrator::workspace::GitCli;

#[derive(Parser)]
#[command(name = "tracks-migrator")]
#[command(about = "Migrate IPageOrder page tracks to hidden expressions across a fleet of apps")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration over every repository not yet in the ledger
    Run {
        /// Scan, consult and apply, but don't commit, push or open pull requests
        #[arg(long)]
        dry_run: bool,

        /// Directory the repositories are cloned into
        #[arg(long, env = "MIGRATOR_WORKSPACE")]
        workspace: Option<PathBuf>,

        /// Path of the ledger database
        #[arg(long, env = "MIGRATOR_LEDGER")]
        ledger: Option<PathBuf>,
    },
    /// List the repositories recorded as processed
    Ledger {
        /// Path of the ledger database
        #[arg(long, env = "MIGRATOR_LEDGER")]
        ledger: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tracks_migrator=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_ledger(path: PathBuf) -> anyhow::Result<Ledger> {
    let ledger = Ledger::open(path)?;
    ledger.migrate()?;
    Ok(ledger)
}

async fn run(
    dry_run: bool,
    workspace: Option<PathBuf>,
    ledger: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = MigratorConfig::from_env()?;
    config.dry_run = dry_run;
    if let Some(workspace) = workspace {
        config.workspace_root = workspace;
    }
    if let Some(ledger) = ledger {
        config.ledger_path = ledger;
    }

    let ledger = open_ledger(config.ledger_path.clone())?;
    let registry = GiteaClient::new(&config.registry);
    let oracle = ChatOracle::new(config.oracle.clone())?;
    let vcs = GitCli::with_token(&config.registry.token);

    let settings = FleetSettings {
        workspace_root: config.workspace_root.clone(),
        base_branch: config.registry.base_branch.clone(),
        service_user: config.registry.service_user.clone(),
        page_size: config.registry.page_size,
        dry_run: config.dry_run,
    };

    let summary = Fleet::new(registry, oracle, vcs, ledger, settings).run().await?;

    println!(
        "discovered {}, already recorded {}, already proposed {}, nothing to migrate {}, migrated {}, dry run {}, failed {}",
        summary.discovered,
        summary.already_recorded,
        summary.already_proposed,
        summary.nothing_to_migrate,
        summary.migrated,
        summary.dry_run,
        summary.failed.len()
    );
    if !summary.failed.is_empty() {
        println!("failed repository ids: {:?}", summary.failed);
    }
    Ok(())
}

fn list_ledger(path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => config::default_data_dir()?.join("ledger.db"),
    };
    let ledger = open_ledger(path)?;

    for record in ledger.records()? {
        println!(
            "{:>8}  {:<40}  {:<18}  {}",
            record.repository_id,
            format!("{}/{}", record.owner, record.name),
            record.outcome.as_str(),
            record.created_at.to_rfc3339()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Run {
            dry_run,
            workspace,
            ledger,
        }) => run(dry_run, workspace, ledger).await?,
        Some(Commands::Ledger { ledger }) => list_ledger(ledger)?,
        None => run(false, None, None).await?,
    }

    Ok(())
}
