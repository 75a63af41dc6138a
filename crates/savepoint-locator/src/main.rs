use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use savepoint_locator::config::{self, Settings};
use savepoint_locator::fs::OsFilesystem;
use savepoint_locator::location::classify;
use savepoint_locator::logging::{self, LogFormat};
use savepoint_locator::s3::{AwsCliLoader, StoreLoader};
use savepoint_locator::{Error, Result, SavepointLocator};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Config file (defaults to ./savepoint.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the location of the newest savepoint under LOCATION
    Latest {
        /// s3://bucket/prefix (also s3a://, s3p://) or a local directory
        location: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Print the resolved object store settings
    Config,
}

fn main() -> ExitCode {
    let _ = dotenv::dotenv();
    let args = Args::parse();
    logging::init(args.log_format, args.verbose);

    let res = load_settings(&args).and_then(|settings| match &args.cmd {
        Command::Latest { location, format } => cmd_latest(settings, location, *format),
        Command::Config => cmd_config(settings),
    });
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    config::discover(args.config.as_deref())?.settings()
}

fn cmd_latest(settings: Settings, location: &str, format: OutputFormat) -> Result<()> {
    let locator = SavepointLocator::new(AwsCliLoader::new(settings.s3), OsFilesystem);
    let found = locator.latest(location).inspect_err(|e| {
        logging::report_failure(location, e);
    })?;
    info!(location, found = %found, "resolved latest savepoint");

    match format {
        OutputFormat::Plain => println!("{found}"),
        OutputFormat::Json => {
            let savepoint = (!found.is_empty()).then_some(found.as_str());
            let body = serde_json::json!({
                "location": location,
                "backend": classify(location).name(),
                "savepoint": savepoint,
            });
            let s = serde_json::to_string_pretty(&body)
                .map_err(|e| Error::msg(format!("failed to encode output: {e}")))?;
            println!("{s}");
        }
    }
    Ok(())
}

fn cmd_config(settings: Settings) -> Result<()> {
    let s = toml::to_string_pretty(&settings)
        .map_err(|e| Error::msg(format!("failed to encode settings: {e}")))?;
    print!("{s}");

    // Best effort: show what the client would actually run with.
    match AwsCliLoader::new(settings.s3).load() {
        Ok(store) => {
            let r = store.resolved();
            println!();
            println!("# resolved");
            println!("# aws_bin = {}", r.aws_bin.display());
            println!("# profile = {}", r.profile.as_deref().unwrap_or("(aws default)"));
            println!("# region = {}", r.region.as_deref().unwrap_or("(aws default)"));
            println!("# endpoint_url = {}", r.endpoint_url.as_deref().unwrap_or("(aws default)"));
            for k in r.command_env.keys() {
                println!("# env {k} = <set>");
            }
        }
        Err(e) => println!("\n# client unavailable: {e}"),
    }
    Ok(())
}
