//! M1necraft CLI - run Minecraft on arm64 through the official launcher
//!
//! # Commands
//!
//! - `m1necraft setup` - Download the shared resource bundles (skipped when current)
//! - `m1necraft check` - Report whether resources or the launcher need attention
//! - `m1necraft list` - List patchable versions and their install state
//! - `m1necraft install <version>` - Install an arm64 build of a version
//! - `m1necraft launch` - Start the Minecraft Launcher
//! - `m1necraft reset` - Remove everything this tool added

mod progress;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use m1necraft_lib::{
    BundleKind, Engine, EngineError, InstallOutcome, InstallState, PathLayout, ResourceConfig,
    TerminationSignal,
};
use progress::{spinner, BarReporter, BundleBars};
use std::path::PathBuf;
use std::process::ExitCode;

/// Run Minecraft natively on Apple Silicon through the official launcher
#[derive(Parser)]
#[command(name = "m1necraft")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Private data directory (defaults to the OS data directory)
    #[arg(long, global = true, env = "M1NECRAFT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Minecraft Launcher data directory
    #[arg(long, global = true, env = "M1NECRAFT_MINECRAFT_DIR")]
    minecraft_dir: Option<PathBuf>,

    /// Release metadata endpoint
    #[arg(long, global = true, env = "M1NECRAFT_METADATA_URL")]
    metadata_url: Option<String>,

    /// Base URL the resource archives are served from
    #[arg(long, global = true, env = "M1NECRAFT_RESOURCES_URL")]
    resources_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download resource bundles when missing or outdated
    Setup {
        /// Download even when the local copy is current
        #[arg(long)]
        force: bool,

        /// Also install the Minecraft Launcher application
        #[arg(long)]
        with_launcher: bool,
    },

    /// Report resource freshness and launcher readiness
    Check,

    /// List versions with their install state
    List,

    /// Install the arm64 build of a version
    Install {
        /// Version name, e.g. 1.18.1
        version: String,
    },

    /// Start the Minecraft Launcher
    Launch,

    /// Remove installed versions, owned profiles and all downloaded data
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

impl Cli {
    fn resource_config(&self) -> ResourceConfig {
        let mut config = ResourceConfig::default();
        if let Some(url) = &self.metadata_url {
            config.metadata_url = url.clone();
        }
        if let Some(url) = &self.resources_url {
            config.artifact_base_url = url.clone();
        }
        config
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Exit on Ctrl-C, but only once no critical operation is running
fn spawn_interrupt_handler(termination: TerminationSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        if !termination.allows_termination() {
            log::warn!(
                "Waiting for {} running operation(s) to finish before exiting",
                termination.held_count()
            );
            termination.wait_until_allowed().await;
        }
        std::process::exit(130);
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            let fatal = e
                .downcast_ref::<EngineError>()
                .is_some_and(EngineError::is_fatal);
            ExitCode::from(if fatal { 2 } else { 1 })
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.resource_config();
    let layout = PathLayout::resolve(cli.data_dir.clone(), cli.minecraft_dir.clone())?;
    let engine = Engine::new(layout, config)?;
    spawn_interrupt_handler(engine.termination_signal());

    match cli.command {
        Commands::Setup {
            force,
            with_launcher,
        } => setup(&engine, force, with_launcher).await,
        Commands::Check => check(&engine).await,
        Commands::List => list(&engine),
        Commands::Install { version } => install(&engine, &version).await,
        Commands::Launch => {
            let launched = engine.launch().await?;
            match launched.pid {
                Some(pid) => println!("Launcher started (pid {pid})"),
                None => println!("Launcher started"),
            }
            Ok(())
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("Reset deletes every installed version and download; pass --yes to confirm");
            }
            engine.reset().await?;
            println!("Reset complete");
            Ok(())
        }
    }
}

async fn setup(engine: &Engine, force: bool, with_launcher: bool) -> Result<()> {
    let bars = BundleBars::attach(engine.resources());
    let result = if force {
        engine.download().await.map(Some)
    } else {
        engine.sync().await
    };

    let failed: Vec<BundleKind> = match &result {
        Ok(Some(report)) => report.failed.iter().map(|(kind, _)| *kind).collect(),
        Ok(None) => Vec::new(),
        Err(_) => BundleKind::all(),
    };
    bars.finish(&failed);

    match result? {
        Some(report) if !report.is_complete() => {
            for (kind, err) in &report.failed {
                eprintln!("{kind}: {err}");
            }
            bail!(
                "{} of {} bundles failed, run setup again to retry",
                report.failed.len(),
                engine.resources().bundles().len()
            );
        }
        Some(_) => println!("Resources are ready"),
        None => println!("Resources are already up to date"),
    }

    if with_launcher {
        let reporter = BarReporter::new("Minecraft Launcher");
        match engine.install_launcher(&reporter).await {
            Ok(app) => {
                reporter.finish();
                println!("Installed launcher to {}", app.display());
            }
            Err(e) => {
                reporter.abandon();
                return Err(e.into());
            }
        }
    }

    if !engine.host_launcher_ready() {
        log::warn!(
            "No launcher data found in {:?}; run the Minecraft Launcher once before installing",
            engine.layout().host.root
        );
    }
    Ok(())
}

async fn check(engine: &Engine) -> Result<()> {
    let present = !engine.needs_setup();
    println!("Resources present: {}", if present { "yes" } else { "no" });

    match engine.check_for_update().await {
        Ok(stale) => println!("Update available: {}", if stale { "yes" } else { "no" }),
        Err(e) => println!("Update available: unknown ({e})"),
    }

    let ready = engine.host_launcher_ready();
    println!("Launcher data found: {}", if ready { "yes" } else { "no" });
    Ok(())
}

fn list(engine: &Engine) -> Result<()> {
    if engine.needs_setup() {
        bail!("Resources are missing, run `m1necraft setup` first");
    }
    for version in engine.versions()? {
        let state = match &version.state {
            InstallState::Installed(_) => "installed".to_string(),
            InstallState::Installing(step) => step.to_string(),
            InstallState::NotInstalled => "-".to_string(),
        };
        println!("{:<12} java {:<3} {}", version.name, version.java_major(), state);
    }
    Ok(())
}

async fn install(engine: &Engine, version: &str) -> Result<()> {
    if engine.needs_setup() {
        bail!("Resources are missing, run `m1necraft setup` first");
    }
    if !engine.host_launcher_ready() {
        log::warn!(
            "No launcher data found in {:?}; creating an empty launcher directory",
            engine.layout().host.root
        );
    }

    let bar = spinner(&format!("Installing {version}"));
    let progress = bar.clone();
    let outcome = engine
        .install_with(version, move |step| {
            progress.set_message(step.to_string());
        })
        .await;
    bar.finish_and_clear();

    match outcome? {
        InstallOutcome::Installed(dir) => println!("Installed {version} to {}", dir.display()),
        InstallOutcome::AlreadyInstalled(dir) => {
            println!("{version} is already installed at {}", dir.display())
        }
        InstallOutcome::AlreadyInProgress => println!("{version} is already being installed"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn url_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "m1necraft",
            "--resources-url",
            "http://localhost:8000/",
            "setup",
            "--force",
        ])
        .unwrap();
        let config = cli.resource_config();
        assert_eq!(config.artifact_base_url, "http://localhost:8000/");
        assert!(matches!(cli.command, Commands::Setup { force: true, with_launcher: false }));
    }

    #[test]
    fn install_requires_a_version() {
        assert!(Cli::try_parse_from(["m1necraft", "install"]).is_err());
        let cli = Cli::try_parse_from(["m1necraft", "install", "1.18.1", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Install { version } if version == "1.18.1"));
    }

    fn write_bundles(data: &std::path::Path) {
        let natives = data.join("lwjgl/lwjglnatives");
        std::fs::create_dir_all(&natives).unwrap();
        std::fs::write(natives.join("liblwjgl.dylib"), b"native").unwrap();
        std::fs::write(data.join("lwjgl/lwjglfat.jar"), b"fatjar").unwrap();

        let template = data.join("mcl_profiles/1.16.5-arm");
        std::fs::create_dir_all(&template).unwrap();
        std::fs::write(template.join("1.16.5-arm.json"), b"{}").unwrap();

        for major in [8, 17] {
            let bin = data.join(format!("java-{major}/zulu-{major}.jre/Contents/Home/bin"));
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(bin.join("java"), b"#!/bin/sh\n").unwrap();
        }
    }

    #[tokio::test]
    async fn install_creates_missing_launcher_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let layout =
            PathLayout::new(tmp.path().join("data"), tmp.path().join("minecraft")).unwrap();
        write_bundles(&layout.data_dir);
        let engine = Engine::new(layout, ResourceConfig::default()).unwrap();
        assert!(!engine.host_launcher_ready());

        install(&engine, "1.16.5").await.unwrap();

        let host = tmp.path().join("minecraft");
        assert!(host.join("versions/1.16.5-arm/1.16.5-arm.json").is_file());
        assert!(host.join("launcher_profiles.json").is_file());
        assert!(engine.host_launcher_ready());
    }
}
