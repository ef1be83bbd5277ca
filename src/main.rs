use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use incidentgate::collect::{KnowledgeBase, LogRecord};
use incidentgate::{AnalysisOutcome, AnalysisRequest, Decision, Orchestrator, PipelineConfig};

#[derive(Parser)]
#[command(
    name = "incidentgate",
    about = "Evidence-gated incident root-cause analysis",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (overrides INCIDENTGATE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an incident and print the decision
    Analyze {
        /// Free-text incident description
        #[arg(long)]
        query: String,

        /// Incident time (ISO-8601)
        #[arg(long)]
        timestamp: Option<String>,

        /// JSON file with an array of log records
        #[arg(long)]
        logs: Option<PathBuf>,

        /// TOML knowledge base of past incidents and runbooks
        #[arg(long)]
        knowledge: Option<PathBuf>,

        /// Dashboard image reference (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,

        /// Override the answer confidence threshold
        #[arg(long)]
        threshold: Option<f64>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load(p),
        None => Ok(PipelineConfig::load_or_default()),
    }
}

fn init_tracing(config: &PipelineConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    // Logs go to stderr so --json output stays parseable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_logs(path: &PathBuf) -> Result<Vec<LogRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read log file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse log file: {}", path.display()))
}

fn print_summary(outcome: &AnalysisOutcome) {
    println!("\n=== IncidentGate Analysis ===");
    println!("Run:        {}", outcome.run_id);
    println!("Decision:   {}", outcome.decision.kind());
    println!("Confidence: {:.2}", outcome.decision.confidence());

    match &outcome.decision {
        Decision::Answer(a) => {
            println!("\nRoot cause: {}", a.root_cause);
            println!("\nEvidence:");
            for (source, snippet) in &a.evidence {
                println!(" - [{}] {}", source, snippet);
            }
            println!("\nTimeline:\n{}", a.timeline);
            println!("\nRecommended actions:");
            for action in &a.recommended_actions {
                println!(" - {}", action);
            }
            for alt in &a.alternative_hypotheses {
                println!("\nAlternative: {}\n   {}", alt.hypothesis, alt.why_less_likely);
            }
        }
        Decision::Refuse(r) => {
            println!("\n{}", r.reason);
            println!("\nWhat we know:");
            for item in &r.what_we_know {
                println!(" - {}", item);
            }
            println!("\nMissing:");
            for item in &r.missing_evidence {
                println!(" - {}", item);
            }
            println!("\n{}", r.suggestion);
        }
        Decision::RequestMoreData(d) => {
            println!("\nLeading hypothesis: {}", d.leading_hypothesis);
            println!("{}", d.why_needed);
            println!("\nNeeded data:");
            for item in &d.needed_data {
                println!(" - {}", item);
            }
        }
    }

    if !outcome.error_log.is_empty() {
        println!("\nErrors:");
        for err in &outcome.error_log {
            println!(" - {}", err);
        }
    }
    println!("=============================\n");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    init_tracing(&config);

    match cli.command {
        Commands::Analyze {
            query,
            timestamp,
            logs,
            knowledge,
            images,
            threshold,
            json,
        } => {
            if let Some(t) = threshold {
                if !(0.0..=1.0).contains(&t) {
                    bail!("--threshold must be within [0, 1], got {}", t);
                }
                config.thresholds.confidence = t;
                config.thresholds.request_more_data = config.thresholds.request_more_data.min(t);
            }

            let log_records = match &logs {
                Some(path) => load_logs(path)?,
                None => Vec::new(),
            };
            let kb = match &knowledge {
                Some(path) => KnowledgeBase::load(path)?,
                None => KnowledgeBase::default(),
            };

            tracing::info!(%query, logs = log_records.len(), images = images.len(), "Running analysis");

            let request = AnalysisRequest {
                query,
                timestamp,
                image_refs: images,
                log_records,
            };
            let outcome = Orchestrator::standard(config, kb).run(request).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_summary(&outcome);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}
