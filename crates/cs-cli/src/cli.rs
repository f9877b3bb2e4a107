use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "contentserver",
    about = "ContentServer: serves multi-dimension content trees from CMS snapshots",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Socket address of a running server, for client commands
    #[arg(long, global = true, default_value = "127.0.0.1:8081")]
    pub addr: String,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the server daemon
    Serve(ServeArgs),
    /// Ask a running server to fetch a fresh snapshot
    Update,
    /// Dump the whole published repository
    Repo,
    /// Resolve a uri
    Content(ContentArgs),
    /// Look up the uris of node ids
    Uris(UrisArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Snapshot source: http(s) URL, file:// URL or path
    #[arg(long)]
    pub source: Option<String>,
    #[arg(long)]
    pub socket: Option<SocketAddr>,
    #[arg(long)]
    pub http: Option<SocketAddr>,
    #[arg(long)]
    pub base_path: Option<String>,
    /// Poll interval in seconds
    #[arg(long)]
    pub poll: Option<f64>,
    #[arg(long)]
    pub history_dir: Option<PathBuf>,
    #[arg(long)]
    pub history_limit: Option<usize>,
}

#[derive(Args)]
pub struct ContentArgs {
    pub uri: String,
    /// Dimensions in priority order
    #[arg(short, long = "dimension", required = true)]
    pub dimensions: Vec<String>,
    #[arg(short, long = "group")]
    pub groups: Vec<String>,
    /// Also return the navigation tree under this node id
    #[arg(long)]
    pub nav: Option<String>,
}

#[derive(Args)]
pub struct UrisArgs {
    #[arg(short, long)]
    pub dimension: String,
    #[arg(required = true)]
    pub ids: Vec<String>,
}
