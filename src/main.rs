use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::path::PathBuf;

use flowkit_rs::adk::model::{embedder_from_name, model_from_name};
use flowkit_rs::flowkit::config::Config;
use flowkit_rs::flowkit::eval::{
    configure_evaluators, run_evaluation, DatasetLoader, EvalOptions, Metric,
};
use flowkit_rs::flowkit::flow::{Flow, FlowRunner, JokeFlow};
use flowkit_rs::flowkit::server;
use flowkit_rs::flowkit::state::{FlowState, FlowStateQuery, FlowStatus};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect or edit stored flow states
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Start a new flow execution
    Run {
        /// Flow to run
        #[arg(short, long, default_value = JokeFlow::NAME)]
        flow: String,

        /// Flow input; parsed as JSON, otherwise used as a string
        #[arg(short, long)]
        input: String,

        /// The model the flow calls
        #[arg(short, long, default_value = "gemini-1.5-flash")]
        model: String,
    },
    /// Continue an interrupted or failed execution
    Resume {
        /// Flow state id
        #[arg(long)]
        id: String,

        #[arg(short, long, default_value = JokeFlow::NAME)]
        flow: String,

        /// Value for the step the flow is blocked on (JSON or string)
        #[arg(short, long)]
        step_input: Option<String>,

        #[arg(short, long, default_value = "gemini-1.5-flash")]
        model: String,
    },
    /// Score a dataset with the configured evaluators
    Eval {
        /// JSON or YAML file holding an array of data points
        #[arg(short, long)]
        dataset: PathBuf,

        /// Comma-separated metrics, e.g. regex,deep_equal
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,

        /// Judge model (defaults to FLOWKIT_JUDGE_MODEL)
        #[arg(long)]
        judge: Option<String>,

        /// Embedder model (defaults to FLOWKIT_EMBEDDER_MODEL)
        #[arg(long)]
        embedder: Option<String>,
    },
    /// Serve the read-only introspection API
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
}

#[derive(Subcommand, Debug)]
enum StateCommands {
    /// Save a state read from a JSON file under an id
    Save {
        #[arg(long)]
        id: String,

        #[arg(short, long)]
        file: PathBuf,
    },
    /// Print the state stored under an id
    Load {
        #[arg(long)]
        id: String,
    },
    /// List stored states
    List {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        cursor: Option<String>,
    },
}

fn parse_input(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn build_flow(name: &str, model_name: &str) -> anyhow::Result<Box<dyn Flow>> {
    match name {
        JokeFlow::NAME => {
            let model = model_from_name(model_name)?;
            Ok(Box::new(JokeFlow::new(model)))
        }
        other => bail!("unknown flow '{}'", other),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = Config::from_env()?;

    match args.command {
        Commands::State { command } => {
            let store = config.open_store().await?;
            match command {
                StateCommands::Save { id, file } => {
                    let content = std::fs::read_to_string(&file)
                        .with_context(|| format!("reading {}", file.display()))?;
                    let state: FlowState = serde_json::from_str(&content)?;
                    store.save(&id, &state).await?;
                    println!("Saved {}", id);
                }
                StateCommands::Load { id } => match store.load(&id).await? {
                    Some(state) => print_json(&state)?,
                    None => bail!("no flow state stored under '{}'", id),
                },
                StateCommands::List {
                    name,
                    status,
                    limit,
                    cursor,
                } => {
                    let mut query = FlowStateQuery::new();
                    if let Some(name) = name {
                        query = query.name(name);
                    }
                    if let Some(status) = status {
                        let status: FlowStatus =
                            status.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                        query = query.status(status);
                    }
                    if let Some(limit) = limit {
                        query = query.limit(limit);
                    }
                    if let Some(cursor) = cursor {
                        query = query.cursor(cursor);
                    }
                    print_json(&store.list(Some(&query)).await?)?;
                }
            }
        }
        Commands::Run {
            flow,
            input,
            model,
        } => {
            let flow = build_flow(&flow, &model)?;
            let runner = FlowRunner::new(config.open_store().await?);
            let state = runner.run_flow(flow.as_ref(), parse_input(&input)).await?;
            print_json(&state)?;
        }
        Commands::Resume {
            id,
            flow,
            step_input,
            model,
        } => {
            let flow = build_flow(&flow, &model)?;
            let runner = FlowRunner::new(config.open_store().await?);
            let state = runner
                .resume(flow.as_ref(), &id, step_input.as_deref().map(parse_input))
                .await?;
            print_json(&state)?;
        }
        Commands::Eval {
            dataset,
            metrics,
            judge,
            embedder,
        } => {
            let metrics = if metrics.is_empty() {
                None
            } else {
                Some(
                    metrics
                        .iter()
                        .map(|m| m.parse::<Metric>())
                        .collect::<Result<Vec<_>, _>>()?,
                )
            };
            let needs_judge = metrics
                .as_ref()
                .map_or(true, |ms| ms.iter().any(|m| m.needs_judge()));
            let needs_embedder = metrics
                .as_ref()
                .is_some_and(|ms| ms.contains(&Metric::AnswerRelevancy));

            let mut options = EvalOptions {
                metrics,
                ..Default::default()
            };
            if needs_judge {
                let name = judge.unwrap_or_else(|| config.judge_model.clone());
                options.judge = Some(model_from_name(&name)?);
            }
            if needs_embedder {
                let name = embedder.unwrap_or_else(|| config.embedder_model.clone());
                options.embedder = Some(embedder_from_name(&name)?);
            }

            let evaluators = configure_evaluators(&options)?;
            let data = DatasetLoader::load(&dataset)?;
            let runs = run_evaluation(&evaluators, &data).await;
            print_json(&runs)?;
        }
        Commands::Serve { port } => {
            let store = config.open_store().await?;
            server::serve(port, store)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        }
    }

    Ok(())
}
