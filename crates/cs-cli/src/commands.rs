use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use cs_model::{ContentRequest, ContentStatus, Env, NodeRequest, SiteContent, UpdateResponse};
use cs_protocol::SocketClient;
use cs_server::{ContentServer, ServerConfig};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let client = SocketClient::new(cli.addr.clone());
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Update => cmd_update(&client, &cli.format).await,
        Command::Repo => cmd_repo(&client).await,
        Command::Content(args) => cmd_content(&client, args, &cli.format).await,
        Command::Uris(args) => cmd_uris(&client, args, &cli.format).await,
    }
}

/// Config file first, then flags on top.
fn server_config(args: ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(source) = args.source {
        config.repo.source = source;
    }
    if let Some(addr) = args.socket {
        config.socket_addr = addr;
    }
    if args.http.is_some() {
        config.http_addr = args.http;
    }
    if let Some(base) = args.base_path {
        config.base_path = base;
    }
    if let Some(secs) = args.poll {
        let every = Duration::try_from_secs_f64(secs).context("invalid poll interval")?;
        config.repo.poll_interval = Some(every);
    }
    if args.history_dir.is_some() {
        config.history_dir = args.history_dir;
    }
    if let Some(limit) = args.history_limit {
        config.history_limit = limit;
    }
    anyhow::ensure!(!config.repo.source.is_empty(), "no snapshot source configured (use --source)");
    Ok(config)
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = server_config(args)?;
    println!(
        "{} ContentServer on {} (source: {})",
        "▶".green().bold(),
        config.socket_addr.to_string().bold(),
        config.repo.source.cyan()
    );
    if let Some(http) = config.http_addr {
        println!("  HTTP: {}{}", http.to_string().bold(), config.normalized_base_path());
    }
    let server = ContentServer::new(config).await?;
    server.serve().await?;
    Ok(())
}

async fn cmd_update(client: &SocketClient, format: &OutputFormat) -> anyhow::Result<()> {
    let response: UpdateResponse = client.update().await?;
    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    let stats = &response.stats;
    if response.success {
        println!("{} Update succeeded", "✓".green().bold());
    } else {
        println!("{} Update failed: {}", "✗".red().bold(), response.error_message);
    }
    println!("  Nodes: {}  URIs: {}", stats.number_of_nodes.to_string().bold(), stats.number_of_uris);
    println!("  Fetch: {:.3}s  Total: {:.3}s", stats.repo_runtime, stats.own_runtime);
    if !response.success {
        anyhow::bail!("update failed");
    }
    Ok(())
}

async fn cmd_repo(client: &SocketClient) -> anyhow::Result<()> {
    let snapshot = client.get_repo().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn cmd_content(client: &SocketClient, args: ContentArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut request = ContentRequest::new(Env::new(args.dimensions, args.groups), args.uri);
    if let Some(nav) = args.nav {
        request = request.with_node("nav", NodeRequest::new(nav).expanded());
    }
    let content = client.get_content(&request).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&content)?),
        OutputFormat::Text => print_content(&content),
    }
    Ok(())
}

fn print_content(content: &SiteContent) {
    let status = match content.status {
        ContentStatus::Ok => "200 OK".green(),
        ContentStatus::Forbidden => "403 Forbidden".yellow(),
        ContentStatus::NotFound => "404 Not Found".red(),
    };
    println!("{} {} [{}]", status.bold(), content.uri, content.dimension.cyan());
    if let Some(item) = &content.item {
        println!("  Item: {} {} ({})", item.id.yellow(), item.name, item.mime_type);
    }
    if !content.path.is_empty() {
        let path: Vec<&str> = content.path.iter().map(|item| item.id.as_str()).collect();
        println!("  Path: {}", path.join(" ← "));
    }
    let mut uris: Vec<_> = content.uris.iter().collect();
    uris.sort();
    for (dimension, uri) in uris {
        println!("  {}: {}", dimension.cyan(), uri);
    }
}

async fn cmd_uris(client: &SocketClient, args: UrisArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let uris = client.get_uris(&args.dimension, &args.ids).await?;
    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&uris)?);
        return Ok(());
    }
    for id in &args.ids {
        match uris.get(id) {
            Some(uri) => println!("{} → {}", id.yellow(), uri),
            None => println!("{} → {}", id.yellow(), "not found".red()),
        }
    }
    Ok(())
}
