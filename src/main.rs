//! alertctl - metric-driven alerting tool
//!
//! Evaluates metric samples against threshold rules and delivers webhook
//! notifications for alerts that trigger, linger and recover.

use alertctl::cli::args::{generate_completions, Cli, Commands};
use alertctl::commands::{run_check, run_engine, run_init, run_rules, LoadedConfig};
use alertctl::error::{AppError, ConfigError};
use clap::Parser;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Set log level based on verbose flag
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    // Run the appropriate command
    let result = run(&cli).await;

    if let Err(e) = result {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<(), AppError> {
    match &cli.command {
        Commands::Run(args) => {
            let loaded = LoadedConfig::load(cli.config.as_deref(), cli.verbose, args.interval)?;
            run_engine(&loaded, args, cli.format).await
        }

        Commands::Rules => {
            let loaded = LoadedConfig::load(cli.config.as_deref(), cli.verbose, None)?;
            run_rules(&loaded, cli.format)
        }

        Commands::Check => {
            let loaded = LoadedConfig::load(cli.config.as_deref(), cli.verbose, None)?;
            run_check(&loaded, cli.format)
        }

        Commands::Init(args) => run_init(args, cli.format),

        Commands::Completions { shell } => {
            generate_completions(*shell);
            Ok(())
        }
    }
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    match err {
        AppError::Config(ConfigError::FileNotFound(_)) => {
            eprintln!();
            eprintln!("Hint: Run 'alertctl init' to write a starter configuration,");
            eprintln!("      or pass --config with the path to an existing file.");
        }
        AppError::Config(ConfigError::AlreadyExists(_)) => {
            eprintln!();
            eprintln!("Hint: Use --force to overwrite it.");
        }
        AppError::Feed(_) => {
            eprintln!();
            eprintln!("Hint: Samples are JSON lines such as");
            eprintln!(r#"      {{"type": "cpu", "value": 91.5, "timestamp": "2024-05-01T10:00:00Z"}}"#);
        }
        _ => {}
    }
}
