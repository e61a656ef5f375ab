//! docpipe command-line interface.
//!
//! Binds the pipeline controller's operation surface to subcommands, plus the
//! polling `watch` loop and the store's administrative list/delete
//! operations.

use clap::{Parser, Subcommand};
use colored::Colorize;
use dp_core::config::{load_config, GlobalConfig};
use dp_core::state::{ControllerError, PipelineController};
use dp_core::store::{FileTaskGate, PipelineStore};
use dp_protocol::{
    ApiResponse, PassthroughPipeline, PipelineResponse, PipelineStatus, RetryRequest, StartRequest,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "docpipe", version, about = "Passthrough pipeline controller")]
struct Cli {
    /// Root directory for persisted state (overrides docpipe.toml)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit machine-readable JSON envelopes instead of human output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new pipeline run for a task
    Start {
        /// Task to run the pipeline for
        task_id: String,

        /// Stage to resume from; earlier stages are skipped
        #[arg(long)]
        resume_from: Option<String>,
    },
    /// Pause a running pipeline
    Pause { task_id: String },
    /// Resume a paused pipeline
    Resume { task_id: String },
    /// Cancel a running or paused pipeline
    Cancel { task_id: String },
    /// Retry a failed pipeline at a specific stage
    Retry {
        task_id: String,

        /// Stage to retry
        #[arg(long)]
        stage: Option<String>,
    },
    /// Show the current pipeline state for a task
    Status { task_id: String },
    /// Poll the pipeline until it reaches a terminal state
    Watch {
        task_id: String,

        /// Poll interval in milliseconds (overrides docpipe.toml)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// List pipeline records
    List {
        /// Only records for this task
        #[arg(long)]
        task: Option<String>,

        /// Only records with this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Remove a pipeline record (administrative)
    Delete {
        /// Pipeline id to remove
        pipeline_id: String,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();

    let mut config = load_config(Path::new("."))?;
    if let Some(data_dir) = &cli.data_dir {
        config = config.with_data_dir(data_dir);
    }

    let store = PipelineStore::new(config.pipelines_dir());
    let tasks = Arc::new(FileTaskGate::new(config.tasks_dir()));
    let controller = PipelineController::new(store.clone(), tasks);

    match &cli.command {
        Commands::Start {
            task_id,
            resume_from,
        } => {
            let request = StartRequest {
                resume_from_stage: resume_from.clone(),
            };
            let result = controller.start(task_id, &request).await;
            finish_operation(result, cli.json);
        }
        Commands::Pause { task_id } => {
            finish_operation(controller.pause(task_id).await, cli.json);
        }
        Commands::Resume { task_id } => {
            finish_operation(controller.resume(task_id).await, cli.json);
        }
        Commands::Cancel { task_id } => {
            finish_operation(controller.cancel(task_id).await, cli.json);
        }
        Commands::Retry { task_id, stage } => {
            let request = RetryRequest {
                stage: stage.clone(),
            };
            finish_operation(controller.retry(task_id, &request).await, cli.json);
        }
        Commands::Status { task_id } => match controller.get_status(task_id).await {
            Ok(pipeline) => {
                if cli.json {
                    print_json(&ApiResponse::ok(pipeline));
                } else {
                    print_pipeline(&pipeline);
                }
            }
            Err(err) => fail(&err, cli.json),
        },
        Commands::Watch {
            task_id,
            interval_ms,
        } => {
            watch(&controller, &config, task_id, *interval_ms, cli.json).await;
        }
        Commands::List { task, status } => {
            let status = match status.as_deref() {
                Some(raw) => match PipelineStatus::parse(raw) {
                    Some(status) => Some(status),
                    None => {
                        eprintln!("{} unknown status '{raw}'", "error:".red().bold());
                        std::process::exit(1);
                    }
                },
                None => None,
            };

            match store.list(task.as_deref(), status).await {
                Ok(pipelines) => {
                    if cli.json {
                        print_json(&ApiResponse::ok(pipelines));
                    } else if pipelines.is_empty() {
                        println!("no pipeline records");
                    } else {
                        for pipeline in &pipelines {
                            println!(
                                "{}  {}  {}  {}",
                                pipeline.id,
                                status_label(pipeline.status),
                                pipeline.task_id,
                                pipeline.created_at.format("%Y-%m-%d %H:%M:%S"),
                            );
                        }
                    }
                }
                Err(err) => {
                    eprintln!("{} {err}", "error:".red().bold());
                    std::process::exit(1);
                }
            }
        }
        Commands::Delete { pipeline_id } => {
            let id = match Uuid::parse_str(pipeline_id) {
                Ok(id) => id,
                Err(_) => {
                    eprintln!("{} invalid pipeline id '{pipeline_id}'", "error:".red().bold());
                    std::process::exit(1);
                }
            };

            match store.delete(&id).await {
                Ok(true) => println!("{} {pipeline_id}", "deleted".green()),
                Ok(false) => {
                    eprintln!("{} no pipeline with id {pipeline_id}", "error:".red().bold());
                    std::process::exit(1);
                }
                Err(err) => {
                    eprintln!("{} {err}", "error:".red().bold());
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Poll the pipeline at a fixed interval until it reaches a terminal state.
/// The server holds no polling state; every iteration is an independent read.
async fn watch(
    controller: &PipelineController,
    config: &GlobalConfig,
    task_id: &str,
    interval_ms: Option<u64>,
    json: bool,
) {
    let interval = Duration::from_millis(interval_ms.unwrap_or(config.poll_interval_ms));

    loop {
        let pipeline = match controller.get_status(task_id).await {
            Ok(pipeline) => pipeline,
            Err(err) => fail(&err, json),
        };

        if json {
            match serde_json::to_string(&pipeline) {
                Ok(line) => println!("{line}"),
                Err(err) => {
                    eprintln!("{} {err}", "error:".red().bold());
                    std::process::exit(1);
                }
            }
        } else {
            println!("{}", watch_line(&pipeline));
        }

        if pipeline.status.is_terminal() {
            return;
        }

        tokio::time::sleep(interval).await;
    }
}

fn watch_line(pipeline: &PassthroughPipeline) -> String {
    let stage = pipeline
        .current_stage
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    let progress: Vec<String> = pipeline
        .stages
        .iter()
        .map(|s| format!("{}:{}%", s.name, s.progress))
        .collect();

    format!(
        "{}  stage={stage}  {}",
        status_label(pipeline.status),
        progress.join(" ")
    )
}

/// Print the outcome of a mutating operation and exit non-zero on failure.
fn finish_operation(result: Result<PipelineResponse, ControllerError>, json: bool) {
    match result {
        Ok(response) => {
            if json {
                print_json(&ApiResponse::ok(response));
            } else {
                println!("{}", response.message.green());
                print_pipeline(&response.pipeline);
            }
        }
        Err(err) => fail(&err, json),
    }
}

fn fail(err: &ControllerError, json: bool) -> ! {
    let api_error = err.to_api_error();

    if json {
        print_json(&ApiResponse::<PipelineResponse>::err(api_error));
    } else {
        eprintln!("{} {}", "error:".red().bold(), api_error.error);
        if let Some(guidance) = api_error.details.and_then(|d| d.guidance) {
            eprintln!("  {}", guidance.dimmed());
        }
    }

    std::process::exit(1);
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            std::process::exit(1);
        }
    }
}

fn print_pipeline(pipeline: &PassthroughPipeline) {
    println!("{}  {}", "pipeline".bold(), pipeline.id);
    println!("  task:    {}", pipeline.task_id);
    println!("  status:  {}", status_label(pipeline.status));
    println!(
        "  stage:   {}",
        pipeline
            .current_stage
            .map_or_else(|| "-".to_string(), |s| s.to_string())
    );

    for stage in &pipeline.stages {
        println!(
            "  {:<12} {:<9} {:>3}%",
            stage.name.to_string(),
            stage.status.to_string(),
            stage.progress
        );
    }
}

fn status_label(status: PipelineStatus) -> colored::ColoredString {
    match status {
        PipelineStatus::Pending => status.as_str().normal(),
        PipelineStatus::Running => status.as_str().cyan(),
        PipelineStatus::Paused => status.as_str().yellow(),
        PipelineStatus::Completed => status.as_str().green(),
        PipelineStatus::Failed => status.as_str().red(),
        PipelineStatus::Cancelled => status.as_str().red().dimmed(),
    }
}
