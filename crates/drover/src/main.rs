//! drover CLI
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use drover::{Cli, Commands, commands};
use drover_core::config::ConfigLoader;
use tracing::debug;

mod observability;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.color.apply();

    if let Some(ref dir) = cli.chdir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("failed to change directory to {}", dir.display()))?;
    }

    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let cwd = camino::Utf8PathBuf::try_from(cwd).map_err(|e| {
        anyhow::anyhow!(
            "current directory is not valid UTF-8: {}",
            e.into_path_buf().display()
        )
    })?;
    let mut loader = ConfigLoader::new().with_project_search(&cwd);
    if let Some(ref config_path) = cli.config {
        let config_path = camino::Utf8PathBuf::try_from(config_path.clone()).map_err(|e| {
            anyhow::anyhow!(
                "config path is not valid UTF-8: {}",
                e.into_path_buf().display()
            )
        })?;
        loader = loader.with_file(&config_path);
    }
    let config = loader.load().context("failed to load configuration")?;

    let log_sources = observability::LogSources::from_env(
        config
            .log_dir
            .as_ref()
            .map(|dir| dir.as_std_path().to_path_buf()),
    );
    let env_filter = observability::env_filter(cli.quiet, cli.verbose, config.log_level.as_str());
    let _guard =
        observability::init(&log_sources, env_filter).context("failed to initialize logging")?;
    let _command = tracing::info_span!("command", name = cli.command.name()).entered();

    debug!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        json = cli.json,
        color = ?cli.color,
        chdir = ?cli.chdir,
        "CLI initialized"
    );

    // Execute command
    let result = match cli.command {
        Commands::Release(args) => commands::release::cmd_release(args, cli.json, &config, &cwd),
        Commands::ReleaseCreate(args) => {
            commands::release::cmd_create(args, cli.json, &config, &cwd)
        }
        Commands::ReleaseBranch(args) => {
            commands::release::cmd_branch(args, cli.json, &config, &cwd)
        }
        Commands::ReleaseTranslate(args) => {
            commands::release::cmd_translate(args, cli.json, &config, &cwd)
        }
        Commands::ReleaseTest(args) => commands::release::cmd_test(args, cli.json, &config, &cwd),
        Commands::ReleaseChangelog(args) => {
            commands::release::cmd_changelog(args, cli.json, &config, &cwd)
        }
        Commands::ReleaseTag(args) => commands::release::cmd_tag(args, cli.json, &config, &cwd),
        Commands::ReleasePush(args) => commands::release::cmd_push(args, cli.json, &config, &cwd),
        Commands::ReleasePublish(args) => {
            commands::release::cmd_publish(args, cli.json, &config, &cwd)
        }
        Commands::ReleaseArchive(args) => {
            commands::release::cmd_archive(args, cli.json, &config, &cwd)
        }
        Commands::ReleaseUpload(args) => {
            commands::release::cmd_upload(args, cli.json, &config, &cwd)
        }
        Commands::BranchCheckout(args) => {
            commands::branch::cmd_checkout(args, cli.json, &config, &cwd)
        }
        Commands::BranchMerge(args) => commands::branch::cmd_merge(args, cli.json, &config, &cwd),
        Commands::BranchPush(args) => commands::branch::cmd_push(args, cli.json, &config, &cwd),
        Commands::ModuleTranslate(args) => {
            commands::module::cmd_translate(args, cli.json, &config, &cwd)
        }
        Commands::ModuleTag(args) => commands::module::cmd_tag(args, cli.json, &config, &cwd),
        Commands::Doctor(args) => commands::doctor::cmd_doctor(args, cli.json, &config, &cwd),
        Commands::Info(args) => commands::info::cmd_info(args, cli.json, &config, &cwd),
    };
    if let Err(ref err) = result {
        tracing::error!(error = %err, "fatal error");
    }
    result
}
