use std::collections::HashSet;
use std::process::ExitCode;

use clap::Args;

use crossgrade_core::resolver::resolve;
use crossgrade_core::Interrupt;
use crossgrade_host::actions::{post_ponr_stages, pre_ponr_stages};

use super::ConfigArgs;

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

pub fn execute(args: ValidateArgs) -> anyhow::Result<ExitCode> {
    println!("Validating {}...", args.config.config.display());

    let config = match args.config.load() {
        Ok(config) => config,
        Err(e) => {
            println!("  Config: INVALID - {e:#}");
            return Ok(ExitCode::from(1));
        }
    };
    println!("  Config: OK");
    println!("    Backup files: {}", config.backup_files.len());
    println!("    Created files: {}", config.created_files.len());
    println!("    Vendor packages: {}", config.vendor_packages.len());

    let host = super::host_context(config, &Interrupt::new());
    let mut stages = pre_ponr_stages(&host);
    stages.extend(post_ponr_stages(&host));

    match resolve(&stages, &HashSet::new()) {
        Ok(plan) => {
            for (stage, planned) in stages.iter().zip(&plan.stages) {
                let order: Vec<&str> = planned
                    .order
                    .iter()
                    .map(|&i| stage.actions[i].id())
                    .collect();
                println!("  Stage '{}': {}", planned.name, order.join(" -> "));
            }
            println!();
            println!("Validation PASSED");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!();
            println!("Validation FAILED: {e}");
            Ok(ExitCode::from(1))
        }
    }
}
