use std::process::ExitCode;

use clap::Args;

use crossgrade_core::Interrupt;
use crossgrade_host::actions::catalog;

use super::ConfigArgs;

#[derive(Args)]
pub struct ListActionsArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Only list actions of this stage
    #[arg(long)]
    pub stage: Option<String>,
}

pub fn execute(args: ListActionsArgs) -> anyhow::Result<ExitCode> {
    let host = super::host_context(args.config.load()?, &Interrupt::new());

    println!("{:<28} {:<18} {}", "ACTION", "STAGE", "DEPENDENCIES");
    println!("{}", "-".repeat(80));

    for info in catalog(&host) {
        if let Some(ref stage) = args.stage {
            if &info.stage != stage {
                continue;
            }
        }
        let deps = if info.dependencies.is_empty() {
            "-".to_string()
        } else {
            info.dependencies.join(", ")
        };
        println!("{:<28} {:<18} {}", info.id, info.stage, deps);
    }

    Ok(ExitCode::SUCCESS)
}
