use clap::{ArgAction, Parser, Subcommand};
use mediafetch::source::SourceType;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mediafetch")]
#[command(about = "Fetch audio and media from direct links, hosting sites and torrents", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to $MEDIAFETCH_CONFIG or config/mediafetch.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire one or more URLs into the output directory
    Acquire(AcquireArgs),

    /// Zip an existing directory
    Pack(PackArgs),

    /// Print the source type each URL classifies as
    Classify(ClassifyArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct AcquireArgs {
    /// URLs to acquire
    pub urls: Vec<String>,

    /// Read more URLs from a file, one per line (`#` starts a comment)
    #[arg(long, value_name = "PATH")]
    pub from_file: Option<PathBuf>,

    /// Also acquire same-origin media links found on each page
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        default_value = "false",
        action = ArgAction::Set
    )]
    pub scrape_links: bool,

    /// auto, swarm, direct or page:<family>
    #[arg(long, default_value = "auto")]
    pub source_type: SourceType,

    /// Zip the output directory into this archive when done
    #[arg(long, value_name = "ARCHIVE")]
    pub pack: Option<String>,

    /// Output directory (overrides output.root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Targets processed at once (overrides worker.concurrency)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Print the batch report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct PackArgs {
    pub dir: PathBuf,
    pub archive: String,
}

#[derive(clap::Args, Debug)]
pub struct ClassifyArgs {
    #[arg(required = true)]
    pub urls: Vec<String>,
}
