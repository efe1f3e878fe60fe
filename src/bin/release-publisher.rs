//! Release Publisher CLI
//!
//! Builds and publishes a package when a release is published

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use release_publisher::cache::runner_os;
use release_publisher::{
    CacheKey, ConfigLoadOptions, ConfigLoader, ConfigOverrides, Credential, DependencyCache,
    JobContext, PipelineConfig, PipelineError, ReleaseEvent, ReleaseSequence,
};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

/// Environment variable holding the release event payload on CI runners
const EVENT_PATH_ENV: &str = "GITHUB_EVENT_PATH";

/// Build and publish a package when a release is published
#[derive(Parser)]
#[command(name = "release-publisher")]
#[command(version)]
#[command(about = "Build and publish a package on release", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the release sequence
    Run {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Release event payload (JSON)
        #[arg(long, value_name = "PATH")]
        event: Option<PathBuf>,

        /// Release tag, when no event payload is available
        #[arg(long)]
        tag: Option<String>,

        /// Build and check the artifacts without uploading
        #[arg(long)]
        dry_run: bool,

        /// Print the job report as JSON
        #[arg(long)]
        json: bool,

        /// Do not restore or save the dependency cache
        #[arg(long)]
        no_cache: bool,

        /// Skip post-publish verification
        #[arg(long)]
        skip_verify: bool,

        /// Runtime version specifier (e.g. 3.x, 3.11)
        #[arg(long)]
        runtime_version: Option<String>,

        /// Upload endpoint
        #[arg(long)]
        repository_url: Option<String>,
    },

    /// Validate configuration and event without running anything
    Check {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Release event payload (JSON)
        #[arg(long, value_name = "PATH")]
        event: Option<PathBuf>,

        /// Release tag, when no event payload is available
        #[arg(long)]
        tag: Option<String>,
    },

    /// Print the dependency cache key
    CacheKey {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// OS identity to derive the key for (defaults to this runner)
        #[arg(long)]
        os: Option<String>,
    },

    /// Write a default .release-pipeline.yaml
    Init {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match run(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(exit_code_for(&e));
        }
    }
}

/// Usage and configuration problems exit with 2, everything else with 1
fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<PipelineError>() {
        Some(PipelineError::ConfigError(_))
        | Some(PipelineError::InvalidEvent { .. })
        | Some(PipelineError::ManifestNotFound { .. }) => 2,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            project_path,
            event,
            tag,
            dry_run,
            json,
            no_cache,
            skip_verify,
            runtime_version,
            repository_url,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            let overrides = ConfigOverrides {
                runtime_version,
                repository_url,
                skip_verify,
                no_cache,
                ..Default::default()
            };
            run_command(path, event, tag, overrides, dry_run, json).await
        }
        Commands::Check {
            project_path,
            event,
            tag,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            check_command(path, event, tag).await
        }
        Commands::CacheKey { project_path, os } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            cache_key_command(path, os).await
        }
        Commands::Init {
            project_path,
            force,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            init_command(path, force).await
        }
    }
}

async fn run_command(
    project_path: PathBuf,
    event: Option<PathBuf>,
    tag: Option<String>,
    overrides: ConfigOverrides,
    dry_run: bool,
    json: bool,
) -> Result<i32> {
    if !json {
        println!("\n📦 release-publisher\n");
    }

    let config = load_config(&project_path, overrides).await?;
    let event = resolve_event(event, tag).await?;

    if !event.is_qualifying() {
        println!(
            "⏭️  Ignoring '{}' release event for {}",
            event.action, event.tag
        );
        return Ok(0);
    }

    let credential = if dry_run {
        None
    } else {
        match Credential::from_env(&config.publish.token_env) {
            Ok(credential) => {
                log::debug!("Credential read from ${}", credential.env_var());
                Some(credential)
            }
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        }
    };
    let redactor = credential
        .as_ref()
        .map(|c| c.redactor())
        .unwrap_or_default();

    let cache = DependencyCache::from_config(config.cache.store.as_deref());
    let step_timeout = config.timeouts.step_seconds.map(Duration::from_secs);

    let mut ctx = JobContext::new(event, config, &project_path)
        .with_redactor(redactor)
        .with_dry_run(dry_run);
    let sequence = ReleaseSequence::standard(cache, credential)
        .with_step_timeout(step_timeout)
        .with_progress(!json);

    let report = sequence.run(&mut ctx).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render_summary());
        if report.success {
            if report.dry_run {
                println!("\n✅ Dry run completed successfully!");
            } else {
                println!("\n✅ Release {} published successfully!", report.tag);
            }
        } else {
            println!("\n❌ Release failed");
            if let Some(error) = &report.error {
                eprintln!("  {}", error);
            }
            for action in &report.suggested_actions {
                eprintln!("  - {}", action);
            }
        }
    }

    Ok(report.exit_code())
}

async fn check_command(
    project_path: PathBuf,
    event: Option<PathBuf>,
    tag: Option<String>,
) -> Result<i32> {
    println!("\n🔍 Release Check\n");

    let config = load_config(&project_path, ConfigOverrides::default()).await?;
    println!("  ✅ Configuration valid");

    let event = resolve_event(event, tag).await?;
    event.validate()?;
    if event.is_qualifying() {
        println!("  ✅ Release {} qualifies", event.tag);
    } else {
        println!(
            "  ⚠️  '{}' events do not trigger a release",
            event.action
        );
    }

    let cache = DependencyCache::from_config(config.cache.store.as_deref());
    println!("\nCache store: {}", cache.store_root().display());

    let manifest = project_path.join(&config.cache.manifest);
    match CacheKey::for_manifest(&runner_os(), &config.cache.prefix, &manifest).await {
        Ok(key) => println!(
            "Cache key: {} ({})",
            key,
            if cache.contains(&key) { "cached" } else { "not cached" }
        ),
        Err(e) => println!("⚠️  {}", e),
    }

    let sequence = ReleaseSequence::standard(cache, None);
    println!("Plan: {}", sequence.plan().join(" → "));

    println!();
    Ok(0)
}

async fn cache_key_command(project_path: PathBuf, os: Option<String>) -> Result<i32> {
    let config = load_config(&project_path, ConfigOverrides::default()).await?;
    let os = os.unwrap_or_else(runner_os);
    let manifest = project_path.join(&config.cache.manifest);

    let key = CacheKey::for_manifest(&os, &config.cache.prefix, &manifest).await?;
    println!("{}", key);

    Ok(0)
}

async fn init_command(project_path: PathBuf, force: bool) -> Result<i32> {
    println!("\n🎯 Initialize release-publisher\n");

    let path = ConfigLoader::write_default(&project_path, force).await?;
    println!("✅ Wrote {}", path.display());

    Ok(0)
}

/// Load, layer and validate the configuration
async fn load_config(project_path: &Path, overrides: ConfigOverrides) -> Result<PipelineConfig> {
    let config = ConfigLoader::load(ConfigLoadOptions::from_env(project_path, overrides)).await?;
    let validation = ConfigLoader::validate(&config);

    if !validation.valid || !validation.warnings.is_empty() {
        eprintln!("{}", ConfigLoader::format_validation_result(&validation));
    }
    if !validation.valid {
        return Err(PipelineError::ConfigError(format!(
            "{} configuration error(s)",
            validation.errors.len()
        ))
        .into());
    }

    Ok(config)
}

/// The event comes from `--event`, then `$GITHUB_EVENT_PATH`, then `--tag`
async fn resolve_event(event: Option<PathBuf>, tag: Option<String>) -> Result<ReleaseEvent> {
    if let Some(path) = event {
        return ReleaseEvent::from_file(&path)
            .await
            .with_context(|| format!("reading event payload {}", path.display()));
    }

    if let Some(path) = std::env::var_os(EVENT_PATH_ENV).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(path);
        return ReleaseEvent::from_file(&path)
            .await
            .with_context(|| format!("reading ${} ({})", EVENT_PATH_ENV, path.display()));
    }

    match tag {
        Some(tag) => Ok(ReleaseEvent::for_tag(tag)),
        None => Err(PipelineError::InvalidEvent {
            message: format!("no release event: pass --event or --tag, or set ${}", EVENT_PATH_ENV),
        }
        .into()),
    }
}
