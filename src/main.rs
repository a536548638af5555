//! Nodeflow CLI Entry Point
//!
//! Runs a workflow definition once and prints the collected results.
//!
//! # Usage
//!
//! ```bash
//! # Execute a workflow
//! nodeflow workflow.yaml
//!
//! # Supply a trigger payload
//! nodeflow workflow.yaml --input payload.json
//!
//! # Persist the completion record
//! nodeflow workflow.yaml --execution-id run-42 --state-dir ./runs
//!
//! # Show node timings
//! nodeflow workflow.yaml --timeline
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use log::{error, info};
use serde_json::Value;

use nodeflow::execution::{Engine, StateFileHook};
use nodeflow::workflow::parser::load_workflow;
use nodeflow::{APP_NAME, VERSION};

/// Default workflow file used when none is specified.
const DEFAULT_WORKFLOW: &str = "workflow.yaml";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    workflow_path: String,
    input_path: Option<PathBuf>,
    execution_id: Option<String>,
    workflow_id: Option<String>,
    state_dir: Option<PathBuf>,
    timeline: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_path: DEFAULT_WORKFLOW.to_string(),
            input_path: None,
            execution_id: None,
            workflow_id: None,
            state_dir: None,
            timeline: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Graph Workflow Execution Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: nodeflow [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>       Path to workflow YAML or JSON file");
    println!();
    println!("Options:");
    println!("  --input FILE          JSON file with the trigger payload");
    println!("  --execution-id ID     Execution id reported to hooks");
    println!("  --workflow-id ID      Workflow id (defaults to the definition id)");
    println!("  --state-dir DIR       Write completion records to DIR");
    println!("  --timeline            Print a Gantt chart of node timings");
    println!("  --verbose             Enable debug logging");
    println!("  --help                Show this help message");
    println!("  --version             Show version information");
    println!();
    println!("Examples:");
    println!("  nodeflow signup.yaml");
    println!("  nodeflow signup.yaml --input payload.json --timeline");
    println!("  nodeflow signup.yaml --execution-id run-1 --state-dir ./runs");
}

/// Returns the value following an option.
fn option_value(args: &[String], i: &mut usize, option: &str) -> Result<String, String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| format!("{} requires an argument", option))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--timeline" => {
                config.timeline = true;
            }
            "--input" => {
                config.input_path = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--execution-id" => {
                config.execution_id = Some(option_value(args, &mut i, arg)?);
            }
            "--workflow-id" => {
                config.workflow_id = Some(option_value(args, &mut i, arg)?);
            }
            "--state-dir" => {
                config.state_dir = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                match positional_index {
                    0 => config.workflow_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Reads the trigger payload file.
fn read_trigger_input(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Could not read input file '{}': {}", path.display(), e))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| format!("Input file '{}' is not valid JSON: {}", path.display(), e))?;
    Ok(value)
}

/// Main application entry point.
async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    let workflow = load_workflow(&config.workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!(
            "Could not load workflow from '{}': {}",
            config.workflow_path, e
        )
    })?;
    info!(
        "Workflow loaded: {} nodes, {} edges",
        workflow.nodes.len(),
        workflow.edges.len()
    );

    let trigger_input = match &config.input_path {
        Some(path) => Some(read_trigger_input(path)?),
        None => None,
    };

    let mut input = workflow.into_input(trigger_input, config.execution_id.clone());
    if let Some(id) = config.workflow_id {
        input.workflow_id = Some(id);
    }

    let mut engine = Engine::with_builtins();
    engine.set_record_timeline(config.timeline);
    if let Some(dir) = config.state_dir {
        if config.execution_id.is_none() {
            info!("No execution id given; completion records will not be written");
        }
        info!("Completion records: {}", dir.display());
        engine.set_hook(Arc::new(StateFileHook::new(dir)));
    }

    let result = engine.run(input).await;

    println!();
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(timeline) = &result.timeline {
        println!("{}", timeline.gantt_chart());
    }

    println!();
    if result.success {
        println!(
            "{} ({} nodes)",
            "Workflow completed successfully".green().bold(),
            result.results.len()
        );
    } else {
        println!(
            "{}: {}",
            "Workflow failed".red().bold(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(result.success)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("nodeflow")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = parse_arguments(&args(&[])).unwrap();
        assert_eq!(config.workflow_path, DEFAULT_WORKFLOW);
        assert!(!config.timeline);
        assert!(config.state_dir.is_none());
    }

    #[test]
    fn test_all_options() {
        let config = parse_arguments(&args(&[
            "flow.yaml",
            "--input",
            "payload.json",
            "--execution-id",
            "run-1",
            "--workflow-id",
            "wf",
            "--state-dir",
            "runs",
            "--timeline",
            "-v",
        ]))
        .unwrap();

        assert_eq!(config.workflow_path, "flow.yaml");
        assert_eq!(config.input_path, Some(PathBuf::from("payload.json")));
        assert_eq!(config.execution_id.as_deref(), Some("run-1"));
        assert_eq!(config.workflow_id.as_deref(), Some("wf"));
        assert_eq!(config.state_dir, Some(PathBuf::from("runs")));
        assert!(config.timeline);
        assert!(config.verbose);
    }

    #[test]
    fn test_missing_option_value() {
        let err = parse_arguments(&args(&["--execution-id"])).unwrap_err();
        assert_eq!(err, "--execution-id requires an argument");
    }

    #[test]
    fn test_unknown_option_and_extra_argument() {
        assert!(parse_arguments(&args(&["--parallel", "4"])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "b.yaml"])).is_err());
    }

    #[test]
    fn test_read_trigger_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(&path, r#"{"user": "ada"}"#).unwrap();

        let value = read_trigger_input(&path).unwrap();
        assert_eq!(value["user"], "ada");

        std::fs::write(&path, "not json").unwrap();
        assert!(read_trigger_input(&path).is_err());
    }
}
