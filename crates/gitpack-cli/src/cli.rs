use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gitpack",
    about = "gitpack: read git objects straight from pack files",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository directory holding `objects/pack`
    #[arg(short = 'C', long, global = true, default_value = ".git")]
    pub repo: PathBuf,

    /// TOML file with store settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use blocking file I/O instead of the tokio runtime
    #[arg(long, global = true)]
    pub blocking: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write an object's raw bytes to stdout
    CatFile(CatFileArgs),
    /// Show where an object lives and what it contains
    Show(ShowArgs),
    /// List indexed objects with their pack and offset
    List(ListArgs),
    /// Show pack and object counts
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct CatFileArgs {
    /// 40-character object hash
    pub hash: String,
}

#[derive(Args)]
pub struct ShowArgs {
    /// 40-character object hash
    pub hash: String,
    /// Bytes of binary content to dump
    #[arg(long, default_value = "64")]
    pub bytes: usize,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct StatsArgs {}
