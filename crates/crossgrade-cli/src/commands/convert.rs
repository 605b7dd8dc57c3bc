use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::Args;

use crossgrade_host::Mode;

use super::ConfigArgs;

#[derive(Args)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Skip the point-of-no-return confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
    /// Do not block on OVERRIDABLE findings
    #[arg(long)]
    pub allow_overridable: bool,
    /// Run independent actions concurrently
    #[arg(long)]
    pub parallel: bool,
}

pub async fn execute(args: ConvertArgs) -> anyhow::Result<ExitCode> {
    let config = args.config.load()?;
    let mut settings = config.settings();
    settings.allow_overridable |= args.allow_overridable;
    settings.parallel |= args.parallel;

    let yes = args.yes;
    super::run_conversion(Mode::Convert, config, settings, move || {
        yes || confirm_ponr()
    })
    .await
}

fn confirm_ponr() -> bool {
    print!("The system is ready for conversion. Changes made from now on cannot be rolled back. Continue? [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut input = String::new();
    match io::stdin().lock().read_line(&mut input) {
        Ok(_) => matches!(input.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot read confirmation");
            false
        }
    }
}
