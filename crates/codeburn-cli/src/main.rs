use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use codeburn_benchmark::{BenchmarkEvent, BenchmarkReport, BenchmarkRunner, Evaluator};
use codeburn_core::{
    default_prompts, load_models, load_prompts, CodeBurnConfig, ModelSpec, Prompt, RawResponse,
    SAMPLE_MODELS_CSV,
};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codeburn")]
#[command(about = "CodeBurn - LLM Code Generation Benchmark", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every prompt against every model and score the answers
    Run(RunArgs),

    /// Score one saved model response without contacting any model
    Evaluate(EvaluateArgs),

    /// List the prompt set
    Prompts {
        /// Prompts JSON file (built-in set when omitted)
        #[arg(short, long)]
        prompts: Option<PathBuf>,
    },

    /// Write default config.json, prompts.json and models.csv
    Init {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Models CSV file
    #[arg(short, long)]
    models: PathBuf,

    /// Prompts JSON file (built-in set when omitted)
    #[arg(short, long)]
    prompts: Option<PathBuf>,

    /// Config JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds each generated program may run
    #[arg(long)]
    execution_timeout: Option<f64>,

    /// Seconds to wait for a model response
    #[arg(long)]
    request_timeout: Option<f64>,

    /// Pairs evaluated concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Directory for JSON/CSV exports
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Args)]
struct EvaluateArgs {
    /// File holding the raw model response
    #[arg(short, long)]
    response: PathBuf,

    /// Prompt name to score against
    #[arg(long)]
    prompt: Option<String>,

    /// Prompts JSON file (built-in set when omitted)
    #[arg(short, long)]
    prompts: Option<PathBuf>,

    /// Config JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds the program may run
    #[arg(long)]
    execution_timeout: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await?,
        Commands::Evaluate(args) => cmd_evaluate(args).await?,
        Commands::Prompts { prompts } => cmd_prompts(prompts.as_deref())?,
        Commands::Init { dir } => cmd_init(&dir)?,
    }

    Ok(())
}

fn resolve_prompts(path: Option<&Path>) -> Result<Vec<Prompt>> {
    match path {
        Some(p) => load_prompts(p).with_context(|| format!("loading prompts from {}", p.display())),
        None => Ok(default_prompts()),
    }
}

fn resolve_config(path: Option<&Path>, execution_timeout: Option<f64>) -> Result<CodeBurnConfig> {
    let mut config = CodeBurnConfig::load_or_default(path)?;
    if let Some(secs) = execution_timeout {
        config.evaluation.execution_timeout_secs = secs;
    }
    Ok(config)
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = resolve_config(args.config.as_deref(), args.execution_timeout)?;
    if let Some(secs) = args.request_timeout {
        config.client.request_timeout_secs = secs;
    }
    if let Some(n) = args.concurrency {
        config.evaluation.max_concurrency = n;
    }
    if let Some(dir) = args.output_dir {
        config.report.output_dir = dir;
    }
    config.validate()?;

    let models = load_models(&args.models)
        .with_context(|| format!("loading models from {}", args.models.display()))?;
    let prompts = resolve_prompts(args.prompts.as_deref())?;

    eprintln!();
    eprintln!("Running benchmark...");
    eprintln!("  Models:  {}", models.len());
    eprintln!("  Prompts: {}", prompts.len());
    eprintln!("  Timeout: {}s per program", config.evaluation.execution_timeout_secs);
    eprintln!();

    let runner = BenchmarkRunner::from_config(&config)?;
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling, waiting for running evaluations...");
            ctrl_c.cancel();
        }
    });

    let (tx, rx) = mpsc::channel(64);
    let progress = tokio::spawn(print_progress(rx));
    let outcome = runner.run(&models, &prompts, cancel, tx).await;
    let _ = progress.await;
    let run = outcome?;

    let report = BenchmarkReport::new(&run, &prompts);
    match args.format {
        OutputFormat::Table => print_table(&report),
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Csv => print!("{}", report.to_csv()?),
    }

    let written = report.export(&config.report)?;
    for path in written {
        eprintln!("  Saved {}", path.display());
    }

    Ok(())
}

async fn print_progress(mut rx: mpsc::Receiver<BenchmarkEvent>) {
    let mut total = 0;
    let mut done = 0;
    while let Some(event) = rx.recv().await {
        match event {
            BenchmarkEvent::Started { total: t } => total = t,
            BenchmarkEvent::Evaluated { model, prompt, success, total_score } => {
                done += 1;
                let status = match success {
                    true => "ok",
                    false => "FAIL",
                };
                eprintln!(
                    "  [{}/{}] {:<24} {:<20} {:<4} {:>4.1}/10",
                    done, total, model, prompt, status, total_score
                );
            }
            BenchmarkEvent::Error { message } => eprintln!("  Error: {}", message),
            BenchmarkEvent::Cancelled => eprintln!("  Cancelled"),
            BenchmarkEvent::Done { .. } => eprintln!(),
        }
    }
}

fn print_table(report: &BenchmarkReport) {
    let summary = &report.summary;

    println!("Results:");
    println!("{:-<78}", "");
    println!(
        "  {:<4} {:<28} {:>10} {:>10} {:>10} {:>10}",
        "#", "Model", "Success", "Score", "Quality", "Time (s)"
    );
    println!("{:-<78}", "");
    for (i, m) in summary.models.iter().enumerate() {
        println!(
            "  {:<4} {:<28} {:>9.1}% {:>10.2} {:>10.2} {:>10.2}",
            i + 1,
            m.model_name,
            m.success_rate,
            m.avg_score,
            m.avg_code_quality,
            m.avg_response_time
        );
    }
    println!("{:-<78}", "");
    println!(
        "  Total: {}/{} successful ({:.1}%), avg response {:.2}s",
        summary.successful_tests, summary.total_tests, summary.success_rate, summary.avg_response_time
    );
    println!();
}

async fn cmd_evaluate(args: EvaluateArgs) -> Result<()> {
    let config = resolve_config(args.config.as_deref(), args.execution_timeout)?;
    config.validate()?;

    let raw_text = std::fs::read_to_string(&args.response)
        .with_context(|| format!("reading {}", args.response.display()))?;

    let prompt = match &args.prompt {
        Some(name) => resolve_prompts(args.prompts.as_deref())?
            .into_iter()
            .find(|p| &p.name == name)
            .with_context(|| format!("no prompt named '{}'", name))?,
        None => Prompt::new("adhoc", ""),
    };

    let model = ModelSpec::new("offline", "");
    let response = RawResponse::ok(&model.model_name, &prompt.name, raw_text, 0.0);
    let result = Evaluator::from_config(&config.evaluation)
        .evaluate(&model, &prompt, &response)
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_prompts(path: Option<&Path>) -> Result<()> {
    let prompts = resolve_prompts(path)?;

    println!();
    println!("Prompts:");
    println!("{:-<78}", "");
    for p in &prompts {
        let keywords: Vec<&str> = p.expected_keywords.iter().map(String::as_str).collect();
        println!("  {:<24} {}", p.name, p.description);
        println!("  {:<24} keywords: {}", "", keywords.join(", "));
    }
    println!();

    Ok(())
}

fn cmd_init(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let files = [
        ("config.json", serde_json::to_string_pretty(&CodeBurnConfig::default())?),
        ("prompts.json", serde_json::to_string_pretty(&default_prompts())?),
        ("models.csv", SAMPLE_MODELS_CSV.to_string()),
    ];

    for (name, content) in files {
        let path = dir.join(name);
        match path.exists() {
            true => println!("  Skipped {} (exists)", path.display()),
            false => {
                std::fs::write(&path, content)?;
                println!("  Wrote {}", path.display());
            }
        }
    }

    Ok(())
}
