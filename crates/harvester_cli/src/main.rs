mod cli;
mod config;
mod logging;
mod run;

use std::process::ExitCode;

use anyhow::{Context, Result};
use engine_logging::{engine_info, engine_warn};
use tokio_util::sync::CancellationToken;

use crate::cli::{parse_args, Command, Parsed, USAGE};
use crate::config::HarvestConfig;

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("harvester: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<()> {
    let cli = match parse_args(std::env::args().skip(1))? {
        Parsed::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        Parsed::Run(cli) => cli,
    };

    let mut config = match &cli.config_path {
        Some(path) => HarvestConfig::from_ron_file(path)?,
        None => HarvestConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    cli.apply(&mut config)?;
    config.validate(cli.command == Command::Restaurants)?;

    logging::initialize(
        engine_logging::level_from_name(&config.log_level),
        config.log_file.as_deref(),
    );
    engine_info!(
        "harvesting {:?} for {} targets into {:?}",
        cli.command,
        config.targets.len(),
        config.store_dir
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    let summary = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                engine_warn!("interrupted, finishing with partial results");
                on_interrupt.cancel();
            }
        });
        run::run(cli.command, &config, &cancel).await
    })?;

    for line in summary.lines() {
        println!("{line}");
    }
    Ok(())
}
