use clap::{ArgAction, Parser, Subcommand};
use schema_mapping::context::Options;
use schema_mapping::{
    build_default_assignment_expression, BatchRunner, Evaluator, MappingExpression, SchemaNode, Strategy,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

/// Evaluate, synthesize and batch-run mapping expressions.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// JSON file with engine options (`language`, `maxDepth`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one expression against a JSON document
    Eval {
        expression: String,
        /// Input document as JSON text, or `@path` to read a file
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// Print the default expression for a source → target attribute link
    Synthesize {
        source_path: String,
        target_path: String,
        #[arg(long)]
        source_schema: Option<PathBuf>,
        #[arg(long)]
        target_schema: Option<PathBuf>,
    },
    /// Run a batch file: `{ "expressions": [...], "input": {...} }`
    Run {
        batch: PathBuf,
        #[arg(long, value_enum, default_value_t = Strategy::Iterative)]
        strategy: Strategy,
    },
    /// Print the combined expression for a JSON array of mapping expressions
    Combine { expressions: PathBuf },
}

#[derive(Deserialize)]
struct BatchFile {
    expressions: Vec<MappingExpression>,
    #[serde(default)]
    input: Value,
}

fn main() {
    // Parse CLI arguments.
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(msg) = run(args) {
        eprintln!("{msg}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), String> {
    let options = match &args.config {
        Some(path) => read_json_file::<Options>(path)?,
        None => Options::default(),
    };
    info!(language = %options.language, max_depth = options.max_depth, "engine options");
    let evaluator = Evaluator::default().with_options(options);

    match args.command {
        Command::Eval { expression, input } => {
            let data = parse_input(&input)?;
            let out = evaluator.evaluate(&expression, &data).map_err(|e| e.to_string())?;
            print_json(&out)
        }
        Command::Synthesize { source_path, target_path, source_schema, target_schema } => {
            let source = source_schema.as_deref().map(read_json_file::<SchemaNode>).transpose()?;
            let target = target_schema.as_deref().map(read_json_file::<SchemaNode>).transpose()?;
            let text = build_default_assignment_expression(source.as_ref(), target.as_ref(), &source_path, &target_path);
            println!("{text}");
            Ok(())
        }
        Command::Run { batch, strategy } => {
            let file: BatchFile = read_json_file(&batch)?;
            let runner = BatchRunner::new(evaluator);
            let out = runner.run(strategy, &file.expressions, &file.input);
            if !out.is_clean() {
                info!(errors = out.errors.len(), "batch finished with rule errors");
            }
            print_json(&out)
        }
        Command::Combine { expressions } => {
            let exprs: Vec<MappingExpression> = read_json_file(&expressions)?;
            let runner = BatchRunner::new(evaluator);
            print_json(&runner.build_combined(&exprs))
        }
    }
}

fn parse_input(arg: &str) -> Result<Value, String> {
    match arg.strip_prefix('@') {
        Some(path) => read_json_file(Path::new(path)),
        None => serde_json::from_str(arg).map_err(|e| format!("Invalid JSON: {e}")),
    }
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("{}: invalid JSON: {e}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}
