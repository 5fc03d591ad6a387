use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use ariz::config::Config;
use ariz::gateway::{ExecutionGateway, GatewaySettings};
use ariz::llm::AnthropicClient;
use ariz::logging;
use ariz::polling::{HttpTaskSource, PollOutcome, Poller};
use ariz::prompts::PromptStore;
use ariz::registry::{Mode, ModeStrategy, StepRegistry};
use ariz::rest;
use ariz::session::{JsonDirPersistence, SessionMachine, SessionStore};
use ariz::validators::ValidatorSet;

#[derive(Parser)]
#[command(name = "ariz")]
#[command(about = "Guided ARIZ problem-solving sessions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Api {
        /// Port to listen on (defaults to api.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the step table of a mode
    Steps {
        /// express, full or autopilot
        mode: String,
    },

    /// Print the OpenAPI document
    Openapi {
        /// Emit YAML instead of JSON
        #[arg(long)]
        yaml: bool,
    },

    /// Print the configuration JSON Schema
    ConfigSchema,

    /// Write the effective configuration to .ariz/config.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Wait for a step execution on a running server
    Poll {
        /// Task id returned by submit
        task_id: String,

        /// Server URL (defaults to http://localhost:<api.port>)
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;
    let _logging_handle = logging::init_logging(&config, cli.debug)?;

    match cli.command {
        Commands::Api { port } => cmd_api(&config, port).await?,
        Commands::Steps { mode } => cmd_steps(&mode)?,
        Commands::Openapi { yaml } => cmd_openapi(yaml)?,
        Commands::ConfigSchema => println!("{}", Config::json_schema()?),
        Commands::Init { force } => cmd_init(&config, force)?,
        Commands::Poll { task_id, url } => cmd_poll(&config, &task_id, url).await?,
    }

    Ok(())
}

/// Wire registry, storage, model client, prompts and validators into a machine.
fn build_machine(config: &Config) -> Result<SessionMachine> {
    let registry = Arc::new(StepRegistry::builtin().context("Invalid built-in step table")?);

    let persistence = JsonDirPersistence::new(config.sessions_path())
        .context("Failed to open session storage")?;
    let store = SessionStore::open(Arc::new(persistence)).context("Failed to load sessions")?;

    let client = AnthropicClient::from_config(&config.llm).context("Failed to build model client")?;

    let prompts = match config.prompts_path() {
        Some(dir) => PromptStore::with_overrides(&dir)
            .with_context(|| format!("Failed to load prompt templates from {}", dir.display()))?,
        None => PromptStore::new().context("Failed to load built-in prompts")?,
    };

    let gateway = ExecutionGateway::new(
        registry.clone(),
        store.clone(),
        Arc::new(client),
        Arc::new(prompts),
        Arc::new(ValidatorSet::builtin()),
        GatewaySettings::from_config(config),
    );

    Ok(SessionMachine::new(ModeStrategy::new(registry), store, gateway))
}

async fn cmd_api(config: &Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.api.port);
    let machine = build_machine(config)?;

    println!("Starting REST API server...");
    println!("  Port: {}", port);
    println!("  Sessions: {}", config.sessions_path().display());
    println!("  Model: {}", config.llm.model);
    println!("  Endpoints:");
    println!("    GET  /api/v1/modes                      List modes");
    println!("    POST /api/v1/sessions                   Start a session");
    println!("    POST /api/v1/sessions/:id/submit        Submit the current step");
    println!("    GET  /api/v1/tasks/:task_id             Poll a step execution");
    println!("    POST /api/v1/sessions/:id/advance       Move to the next step");
    println!("    GET  /api/v1/sessions/:id/summary       Session summary");
    println!("  Docs: http://localhost:{}/swagger-ui", port);
    println!();

    rest::serve(rest::ApiState::new(machine, config), port).await
}

fn cmd_steps(mode: &str) -> Result<()> {
    let mode: Mode = mode.parse()?;
    let registry = StepRegistry::builtin()?;
    let parts = registry.parts(mode);

    println!("{} ({} steps)", mode, registry.get_steps(mode)?.len());
    let mut current_part = None;
    for step in registry.get_steps(mode)? {
        let part = step.code.part().filter(|_| !parts.is_empty());
        if part != current_part {
            if let Some(def) = parts.iter().find(|p| Some(p.number) == part) {
                println!();
                println!("Part {}: {}", def.number, def.name);
            }
            current_part = part;
        }

        let validators: Vec<&str> = step.validators.iter().map(|v| v.as_str()).collect();
        let validators = if validators.is_empty() {
            "-".to_string()
        } else {
            validators.join(", ")
        };
        println!("  {:<6} {:<40} [{}]", step.code.as_str(), step.name, validators);
    }

    Ok(())
}

fn cmd_init(config: &Config, force: bool) -> Result<()> {
    let path = Config::local_config_path();
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config.save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_openapi(yaml: bool) -> Result<()> {
    let doc = if yaml {
        rest::ApiDoc::yaml()?
    } else {
        rest::ApiDoc::json()?
    };
    println!("{}", doc);
    Ok(())
}

async fn cmd_poll(config: &Config, task_id: &str, url: Option<String>) -> Result<()> {
    let task_id = Uuid::parse_str(task_id).context("Task id must be a UUID")?;
    let url = url.unwrap_or_else(|| format!("http://localhost:{}", config.api.port));
    let source = HttpTaskSource::new(&url)?;

    match Poller::new(config.polling.clone()).wait(&source, task_id).await? {
        PollOutcome::Completed(poll) => {
            println!("Step completed.");
            if let Some(text) = poll.result.and_then(|r| r.validated_result) {
                println!();
                println!("{}", text);
            }
        }
        PollOutcome::Failed(poll) => {
            println!("Step failed.");
            if let Some(result) = poll.result {
                println!("{}", result.validation_notes);
            }
        }
        PollOutcome::TimedOut { polls, elapsed_ms } => {
            println!(
                "Still running after {} polls ({:.1}s); the execution continues on the server.",
                polls,
                elapsed_ms as f64 / 1000.0
            );
        }
    }

    Ok(())
}
