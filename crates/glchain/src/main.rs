mod app;
mod logger;

use anyhow::{Context, Result};
use app::{to_json, App};
use clap::{Parser, Subcommand};
use glchain_config::AppConfig;

#[derive(Parser)]
#[command(
    name = "glchain",
    version,
    about = "Trace GitLab commits to merge requests, issues and epics"
)]
struct Cli {
    /// Project id or path, overrides gitlab.default_project
    #[arg(long, short, global = true)]
    project: Option<String>,

    /// Ignore cached responses (they are still refreshed)
    #[arg(long, global = true)]
    refresh: bool,

    /// Print single-line JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the configured projects and trace every new commit until Ctrl-C
    Watch,
    /// Trace commits and print their chains as JSON
    Trace {
        /// Commit SHAs
        #[arg(required = true)]
        shas: Vec<String>,
    },
    /// Trace the newest commits of a branch
    Recent {
        /// Number of commits (at most 100)
        #[arg(long, short = 'n', default_value_t = 10)]
        count: usize,
        /// Branch, defaults to the project's default branch
        #[arg(long, short)]
        branch: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_file = logger::init()?;
    log::info!(
        "Starting glchain {} (log: {})",
        env!("CARGO_PKG_VERSION"),
        log_file.display()
    );

    let config = AppConfig::load();
    let app = App::build(config, cli.refresh).await?;
    let project = cli.project.as_deref();

    match cli.cmd {
        Command::Watch => app.watch(cli.compact).await?,
        Command::Trace { shas } => {
            let batch = app.trace(&shas, project).await?;
            let json = match batch.chains.as_slice() {
                [chain] if batch.failures.is_empty() => to_json(chain, cli.compact),
                _ => to_json(&batch, cli.compact),
            }
            .context("Failed to serialize trace result")?;
            println!("{}", json);
        }
        Command::Recent { count, branch } => {
            let batch = app.recent(count, project, branch.as_deref()).await?;
            let json = to_json(&batch, cli.compact).context("Failed to serialize trace result")?;
            println!("{}", json);
        }
    }

    log::info!("Exiting glchain");
    Ok(())
}
