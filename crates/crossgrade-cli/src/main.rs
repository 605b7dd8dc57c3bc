use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "crossgrade",
    about = "Crossgrade - convert a host between compatible operating system distributions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(verbose: u8, format: LogFormat) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let result = match cli.command {
        commands::Commands::Convert(args) => commands::convert::execute(args).await,
        commands::Commands::Analyze(args) => commands::analyze::execute(args).await,
        commands::Commands::ListActions(args) => commands::list_actions::execute(args),
        commands::Commands::Validate(args) => commands::validate::execute(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("crossgrade failed: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}
