use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "catalog",
    about = "Transactional, integrity-verified blob catalog",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Catalog root directory
    #[arg(long, global = true, default_value = ".cache/catalog")]
    pub root: PathBuf,

    /// Layout file (TOML); defaults apply when omitted
    #[arg(long, global = true)]
    pub layout: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a catalog with an access token
    Init(TokenArgs),
    /// Remove the catalog marker, keeping stored objects
    Clear(TokenArgs),
    /// Delete everything under the catalog root
    Cleanup(CleanupArgs),
    /// Show catalog state
    Status,
    /// Store an object
    Put(PutArgs),
    /// Fetch an object's payload
    Get(GetArgs),
    /// Show an object's metadata record
    Meta(KeyArgs),
    /// List committed entries
    Ls(LsArgs),
    /// Remove every artifact of a key
    Rollback(KeyArgs),
    /// List keys held by write transactions
    Locks,
    /// Release a stale write lock
    BreakLock(KeyArgs),
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    pub token: String,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Confirm the wipe
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    pub key: String,
}

#[derive(Args, Debug)]
pub struct PutArgs {
    pub key: String,
    /// Source file, or `-` for stdin
    pub input: String,
    /// User metadata entry; repeatable
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub meta: Vec<String>,
    /// User metadata as a JSON object, applied before --meta entries
    #[arg(long, value_name = "JSON")]
    pub meta_json: Option<String>,
    /// Expected digest, `<algorithm>:<hex>`; the prefix also selects the algorithm
    #[arg(long)]
    pub hash: Option<String>,
    /// Expected size in bytes
    #[arg(long)]
    pub size: Option<u64>,
    #[arg(long)]
    pub block_size: Option<u64>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    pub key: String,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    #[arg(default_value = "")]
    pub prefix: String,
}
