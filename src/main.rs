mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use relfetch::{Api, FetchConfig, FetchConfigBuilder, InstallOutcome, Settings, env_proxy};

fn main() {
    // Initialize logger with custom format
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<()> {
    let args = cli::Args::parse();
    let api = Api::new(build_config(&args.global)?);
    let dir = api.config().install_dir().to_path_buf();

    match args.sub {
        cli::Cmd::Install {
            repo,
            asset,
            tag,
            no_upgrade,
        } => {
            let repo_api = api.repo(&repo);
            let selected = match &tag {
                Some(tag) => repo_api.version(tag),
                None => repo_api.latest().with_upgrade(!no_upgrade),
            };
            let outcome = selected
                .install(|version| cli::expand_asset(&asset, version))
                .await
                .with_context(|| format!("Failed to install {repo} into {}", dir.display()))?;
            report(&repo, &outcome);
        }
        cli::Cmd::Latest { repo } => {
            let tag = api
                .repo(&repo)
                .latest_version()
                .await
                .with_context(|| format!("Failed to resolve latest release of {repo}"))?;
            println!("{tag}");
        }
        cli::Cmd::Assets { repo } => {
            let names = api
                .repo(&repo)
                .latest_assets()
                .await
                .with_context(|| format!("Failed to list assets of {repo}"))?;
            for name in names {
                println!("{name}");
            }
        }
        cli::Cmd::Url { repo, tag, asset } => {
            println!("{}", api.repo(&repo).asset_url(&tag, &asset));
        }
        cli::Cmd::Fetch { repo, pattern } => {
            let name = api
                .repo(&repo)
                .download_latest_matching(&pattern, &dir)
                .await
                .with_context(|| format!("Failed to fetch {pattern:?} from {repo}"))?;
            info!("downloaded {name} into {}", dir.display());
        }
        cli::Cmd::Installed { repo } => {
            let record = api
                .repo(&repo)
                .installed_version()
                .with_context(|| format!("Nothing installed in {}", dir.display()))?;
            println!("{} {}", record.repo, record.tag);
        }
    }
    Ok(())
}

/// Defaults, then the proxy environment, then the settings file, then flags.
fn build_config(opts: &cli::GlobalOpts) -> Result<FetchConfig> {
    let mut builder = FetchConfig::builder();
    if let Some(proxy) = env_proxy() {
        builder = builder.proxy(proxy);
    }

    let settings_path: Option<PathBuf> = match &opts.config {
        Some(path) => {
            if !path.exists() {
                bail!("Config file {} does not exist", path.display());
            }
            Some(path.clone())
        }
        None => Settings::default_path(),
    };
    if let Some(path) = settings_path {
        let settings = Settings::load(&path).context("Failed to load settings")?;
        builder = settings.apply(builder);
    }

    builder = apply_flags(builder, opts);
    builder.build().context("Invalid configuration")
}

fn apply_flags(mut builder: FetchConfigBuilder, opts: &cli::GlobalOpts) -> FetchConfigBuilder {
    if let Some(dir) = &opts.dir {
        builder = builder.install_dir(dir);
    }
    if let Some(count) = opts.retries {
        builder = builder.retry_count(count);
    }
    if let Some(secs) = opts.retry_delay {
        builder = builder.retry_delay_secs(secs);
    }
    if let Some(proxy) = &opts.proxy {
        builder = builder.proxy(proxy);
    }
    if opts.quiet {
        builder = builder.no_progress();
    }
    if opts.staged {
        builder = builder.staged_upgrade(true);
    }
    builder
}

fn report(repo: &str, outcome: &InstallOutcome) {
    match outcome {
        InstallOutcome::Installed { tag } => info!("installed {repo} {tag}"),
        InstallOutcome::Current { tag } => info!("{repo} {tag} is up to date"),
        InstallOutcome::Upgraded { from, to } => info!("upgraded {repo} {from} -> {to}"),
        InstallOutcome::Kept { tag } => info!("{repo} {tag} already installed, not checking for updates"),
    }
}
