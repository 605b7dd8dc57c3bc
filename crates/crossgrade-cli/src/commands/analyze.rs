use std::process::ExitCode;

use clap::Args;

use crossgrade_host::Mode;

use super::ConfigArgs;

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Report OVERRIDABLE findings without treating them as inhibitors
    #[arg(long)]
    pub allow_overridable: bool,
}

pub async fn execute(args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    let config = args.config.load()?;
    let mut settings = config.settings();
    settings.allow_overridable |= args.allow_overridable;

    super::run_conversion(Mode::Analyze, config, settings, || false).await
}
