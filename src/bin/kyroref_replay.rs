//! kyroref replay tool
//!
//! Builds a store from a configuration file, applies a JSON-lines file of
//! actions in order and prints the final snapshot as JSON.

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kyroref::{Action, StoreConfig};

struct Config {
    config_path: PathBuf,
    actions_path: Option<PathBuf>,
    keep_going: bool,
}

fn usage() {
    println!("kyroref-replay - apply store actions and print the resulting snapshot");
    println!();
    println!("USAGE:");
    println!("    kyroref-replay --config <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>       Store configuration (JSON)");
    println!("    -a, --actions <FILE>      Actions, one JSON object per line [default: none]");
    println!("    -k, --keep-going          Report failed actions and continue");
    println!("    -h, --help                Print help information");
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut actions_path = None;
    let mut keep_going = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --config requires a value");
                    std::process::exit(1);
                }
            }
            "--actions" | "-a" => {
                if i + 1 < args.len() {
                    actions_path = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --actions requires a value");
                    std::process::exit(1);
                }
            }
            "--keep-going" | "-k" => {
                keep_going = true;
                i += 1;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    let Some(config_path) = config_path else {
        eprintln!("error: --config is required");
        std::process::exit(1);
    };

    Config {
        config_path,
        actions_path,
        keep_going,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();

    let store_config = StoreConfig::from_json(&fs::read_to_string(&args.config_path)?)?;
    let dispatcher = store_config.build_dispatcher()?;
    info!(config = %args.config_path.display(), "store ready");

    if let Some(path) = &args.actions_path {
        let contents = fs::read_to_string(path)?;
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let outcome = Action::from_json(line).and_then(|action| dispatcher.dispatch(&action));
            match outcome {
                Ok(_) => {}
                Err(err) if args.keep_going => {
                    warn!(line = line_no + 1, error = %err, "action failed");
                }
                Err(err) => {
                    eprintln!("error: line {}: {err}", line_no + 1);
                    std::process::exit(1);
                }
            }
        }
        info!(applied = dispatcher.sequence(), "replay finished");
    }

    let snapshot = dispatcher.snapshot()?;
    println!("{}", serde_json::to_string_pretty(&*snapshot)?);
    Ok(())
}
