use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "GitHub release fetcher and installer")]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(ClapArgs, Debug, Default)]
pub struct GlobalOpts {
    /// Install / download directory
    #[arg(long, short = 'd', global = true)]
    pub dir: Option<PathBuf>,

    /// Number of attempts when resolving the latest release
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Seconds to wait after a failed attempt
    #[arg(long, global = true)]
    pub retry_delay: Option<u64>,

    /// HTTP(S) proxy (default: HTTP_PROXY, then HTTPS_PROXY)
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Path to settings file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Do not draw progress bars
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Stage upgrades in a sibling directory before swapping them in
    #[arg(long, global = true)]
    pub staged: bool,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Install (or upgrade) an asset into the install directory
    Install {
        /// Repository as owner/name
        repo: String,

        /// Asset file name; `{version}` is replaced by the tag
        #[arg(long, short = 'a')]
        asset: String,

        /// Install this tag instead of the latest release
        #[arg(long, short = 't')]
        tag: Option<String>,

        /// Leave an existing install alone
        #[arg(long)]
        no_upgrade: bool,
    },
    /// Print the latest release tag
    Latest { repo: String },
    /// List the assets of the latest release
    Assets { repo: String },
    /// Print the download URL of an asset
    Url {
        repo: String,
        tag: String,
        asset: String,
    },
    /// Download the first latest-release asset matching a regex
    Fetch {
        repo: String,

        #[arg(long, short = 'p')]
        pattern: String,
    },
    /// Show the version record of the install directory
    Installed { repo: String },
}

/// Expand `{version}` in an asset template.
pub fn expand_asset(template: &str, tag: &str) -> String {
    template.replace("{version}", tag)
}
