use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "skein",
    about = "skein: signed event logs synchronized across untrusted replicas",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Client configuration file (TOML)
    #[arg(short, long, global = true, default_value = "skein.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a new private key
    Keygen,
    /// Sign in with a private key, bootstrapping a write head if needed
    SignIn(SignInArgs),
    /// Sign out, keeping the account for a later sign-in
    SignOut,
    /// Show the signed-in system
    Whoami,
    /// Publish a post
    Post(PostArgs),
    /// Show the verified head events of a system
    Heads(SystemArgs),
    /// List the processes known to write for a system
    Processes(SystemArgs),
    /// Fetch the event a pointer names
    Deref(DerefArgs),
    /// List events referencing a URL or a pointer
    References(ReferencesArgs),
    /// Show a system's username
    Username(SystemArgs),
    /// Fetch a system's avatar images
    Avatar(AvatarArgs),
    /// Manage the replica server list
    Servers(ServersArgs),
    /// Maintain the result cache
    Cache(CacheArgs),
}

#[derive(Args)]
pub struct SignInArgs {
    /// Hex-encoded Ed25519 private key
    #[arg(long)]
    pub key: String,
    /// Hex-encoded process id to write as (random when omitted)
    #[arg(long)]
    pub process: Option<String>,
}

#[derive(Args)]
pub struct PostArgs {
    pub text: String,
    /// Reference a URL or other opaque content key
    #[arg(short = 'r', long = "reference")]
    pub references: Vec<String>,
}

#[derive(Args)]
pub struct SystemArgs {
    /// Hex-encoded public key
    pub system: String,
}

#[derive(Args)]
pub struct DerefArgs {
    /// Hex-encoded pointer
    pub pointer: String,
}

#[derive(Args)]
pub struct ReferencesArgs {
    #[arg(long, conflicts_with = "pointer", required_unless_present = "pointer")]
    pub url: Option<String>,
    /// Hex-encoded pointer
    #[arg(long)]
    pub pointer: Option<String>,
    /// Content type of the referencing events
    #[arg(long, default_value = "3")]
    pub content_type: u64,
    /// Pages to fetch per replica
    #[arg(long)]
    pub pages: Option<u32>,
}

#[derive(Args)]
pub struct AvatarArgs {
    pub system: String,
    /// Only images of this size, e.g. 64x64
    #[arg(long, value_parser = parse_size)]
    pub size: Option<(u64, u64)>,
    /// Directory to write images into
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct ServersArgs {
    #[command(subcommand)]
    pub action: Option<ServerAction>,
}

#[derive(Subcommand)]
pub enum ServerAction {
    List,
    Add { url: String },
    Remove { url: String },
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Drop expired entries
    Clean,
    /// Drop everything
    Clear,
}

fn parse_size(s: &str) -> Result<(u64, u64), String> {
    let (width, height) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let parse = |v: &str| v.trim().parse::<u64>().map_err(|e| format!("{v:?}: {e}"));
    Ok((parse(width)?, parse(height)?))
}
