// ABOUTME: Command line entry point for running and checking discussion files
// ABOUTME: Initializes logging and metrics, then drives a discussion with scripted user messages

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roundtable::{builtin_capabilities, render_message, telemetry, Session};
use roundtable_core::DiscussionConfig;
use std::path::PathBuf;

/// Multi-agent discussions driven from a TOML file
#[derive(Parser, Debug)]
#[command(name = "roundtable")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a discussion, posting each --say message in turn
    #[command(visible_alias = "r")]
    Run {
        /// Discussion file
        file: PathBuf,

        /// User message to post; repeat for several
        #[arg(short, long = "say", value_name = "TEXT")]
        say: Vec<String>,

        /// Override the discussion's max_rounds
        #[arg(long)]
        max_rounds: Option<f64>,

        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },

    /// Validate a discussion file and print a summary
    Check {
        /// Discussion file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json);

    match cli.command {
        Commands::Run {
            file,
            say,
            max_rounds,
            metrics,
        } => run(file, say, max_rounds, metrics).await,
        Commands::Check { file } => check(file),
    }
}

async fn run(
    file: PathBuf,
    says: Vec<String>,
    max_rounds: Option<f64>,
    metrics: bool,
) -> Result<()> {
    let prometheus = if metrics {
        Some(telemetry::init_metrics()?)
    } else {
        None
    };

    let mut config = DiscussionConfig::load(&file)?;
    if let Some(max_rounds) = max_rounds {
        config.settings.max_rounds = max_rounds;
    }
    let agents = config.agents.clone();

    let session = Session::new(config, builtin_capabilities())?;
    let logger = session.spawn_event_logger();

    if says.is_empty() {
        tracing::warn!("No --say messages given, nothing to discuss");
    }

    let mut failures = 0;
    for text in &says {
        let outcome = session.say(text).await?;
        for message in &outcome.messages {
            println!("{}", render_message(message, &agents));
        }
        if let Some(error) = outcome.error {
            failures += 1;
            eprintln!("Discussion paused: {}", error.detail());
        }
    }

    let snapshot = session.control().snapshot();
    tracing::info!(
        state = %snapshot.state,
        processed = snapshot.processed,
        round_limit = snapshot.round_limit,
        "Run finished"
    );

    drop(session);
    logger.abort();

    if let Some(handle) = prometheus {
        eprintln!("{}", handle.render());
    }

    if failures > 0 {
        anyhow::bail!("{} message(s) ended with an error", failures);
    }
    Ok(())
}

fn check(file: PathBuf) -> Result<()> {
    let config = DiscussionConfig::load(&file)
        .with_context(|| format!("Invalid discussion file: {}", file.display()))?;

    println!("Discussion: {}", config.title.as_deref().unwrap_or(&config.id));
    println!("Backend: {}", config.backend.backend_type());
    println!("Round limit: {}", config.settings.round_limit());
    println!("Members:");
    for member in &config.members {
        if let Some(agent) = config.agents.iter().find(|a| a.id == member.agent_id) {
            println!(
                "  @{} {} ({}{})",
                agent.slug,
                agent.name,
                agent.role,
                if member.is_auto_reply { ", auto-reply" } else { "" }
            );
        }
    }
    Ok(())
}
