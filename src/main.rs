use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use pearl_setup::config::SetupConfig;
use pearl_setup::install::paths::{EnvironmentPaths, LogFile};
use pearl_setup::install::{SetupPipeline, runners};
use pearl_setup::logging;

mod cli;

fn main() {
    let args = cli::Args::parse();

    // Config errors are reported after the logger is up
    let config = SetupConfig::load(args.config.as_deref());
    let mode = config
        .as_ref()
        .map(|c| c.build_mode(args.dev))
        .unwrap_or_else(|_| SetupConfig::default().build_mode(args.dev));
    let paths = EnvironmentPaths::from_system(mode);

    let log_to_file = !matches!(args.sub, Some(cli::Cmd::Paths | cli::Cmd::Config { .. }));
    logging::init(log_to_file.then(|| paths.log_file(LogFile::Setup)));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main(args, config, paths)) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn real_main(
    args: cli::Args,
    config: Result<SetupConfig>,
    paths: EnvironmentPaths,
) -> Result<()> {
    let sub = args.sub.unwrap_or(cli::Cmd::Setup { json: false });

    if let cli::Cmd::Config {
        action: cli::ConfigCmd::Init,
    } = sub
    {
        let path = match args.config {
            Some(p) => p,
            None => SetupConfig::default_path()?,
        };
        return SetupConfig::init(&path);
    }

    let config = config?;
    info!("Data directory: {}", paths.root.display());

    match sub {
        cli::Cmd::Paths => runners::print_paths(&paths),
        cli::Cmd::Setup { json } => {
            let pipeline = SetupPipeline::system(paths, &config)?;
            runners::run_setup(&pipeline, json).await.map(|_| ())
        }
        cli::Cmd::Status => runners::run_status(&SetupPipeline::system(paths, &config)?),
        cli::Cmd::Provision { entrypoint_dir } => {
            let entrypoint_dir = entrypoint_dir.unwrap_or_else(|| paths.root.clone());
            let pipeline = SetupPipeline::system(paths, &config)?;
            runners::run_provision(&pipeline, &entrypoint_dir)
                .await
                .context("Provisioning failed")
        }
        cli::Cmd::Reinstall => {
            runners::run_reinstall(&SetupPipeline::system(paths, &config)?).await
        }
        cli::Cmd::Config { .. } => Ok(()),
    }
}
