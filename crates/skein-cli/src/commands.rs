use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use skein_client::{Client, ClientConfig};
use skein_crypto::{derive_public_key, generate_private_key};
use skein_sync::VerificationReport;
use skein_types::{
    ContentType, Event, Pointer, Post, PrivateKey, Process, Reference, System, WireMessage,
};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = &cli.config;
    match cli.command {
        Command::Keygen => cmd_keygen(),
        Command::SignIn(args) => cmd_sign_in(&open(config)?, args).await,
        Command::SignOut => cmd_sign_out(&open(config)?).await,
        Command::Whoami => cmd_whoami(&open(config)?),
        Command::Post(args) => cmd_post(&open(config)?, args).await,
        Command::Heads(args) => cmd_heads(&open(config)?, args).await,
        Command::Processes(args) => cmd_processes(&open(config)?, args).await,
        Command::Deref(args) => cmd_deref(&open(config)?, args).await,
        Command::References(args) => cmd_references(&open(config)?, args).await,
        Command::Username(args) => cmd_username(&open(config)?, args).await,
        Command::Avatar(args) => cmd_avatar(&open(config)?, args).await,
        Command::Servers(args) => cmd_servers(&open(config)?, args).await,
        Command::Cache(args) => cmd_cache(&open(config)?, args),
    }
}

fn open(config_path: &Path) -> anyhow::Result<Client> {
    let config = ClientConfig::load_or_default(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    tracing::debug!(servers = ?config.servers, state = %config.state_path.display(), "opening client");
    Ok(Client::open(config)?)
}

fn parse_system(text: &str) -> anyhow::Result<System> {
    System::from_hex(text).context("system must be a hex-encoded public key")
}

fn parse_pointer(text: &str) -> anyhow::Result<Pointer> {
    let bytes = hex::decode(text.trim()).context("pointer must be hex")?;
    Pointer::decode(&bytes).context("not an encoded pointer")
}

fn print_event(event: &Event) {
    let kind = event
        .kind()
        .map_or_else(|| format!("type {}", event.content_type), |k| k.to_string());
    println!(
        "{} {} {}",
        format!("{}:{}", event.process.to_hex(), event.logical_clock).yellow(),
        kind.cyan(),
        event
            .unix_milliseconds
            .map_or_else(String::new, |ms| ms.to_string())
            .dimmed()
    );
    if event.is(ContentType::Post) {
        if let Ok(post) = Post::decode(&event.content) {
            println!("  {}", post.content);
        }
    }
}

fn print_report(report: &VerificationReport) {
    println!(
        "{} of {} replicas answered",
        report.replicas_responded.to_string().bold(),
        report.replicas_queried
    );
    for failure in &report.failures {
        println!("  {} {}: {}", "✗".red(), failure.replica, failure.error);
    }
    for violation in &report.violations {
        println!("  {} {}: {}", "!".red().bold(), violation.replica, violation.kind);
    }
}

fn cmd_keygen() -> anyhow::Result<()> {
    let key = generate_private_key();
    let system = derive_public_key(&key)?;
    println!("{} Generated key pair", "✓".green().bold());
    println!("  Private: {}", hex::encode(&key.key).red());
    println!("  System:  {}", system.to_hex().cyan());
    Ok(())
}

async fn cmd_sign_in(client: &Client, args: SignInArgs) -> anyhow::Result<()> {
    let key = PrivateKey::from_hex(&args.key).context("key must be hex")?;
    let process = args
        .process
        .as_deref()
        .map(Process::from_hex)
        .transpose()
        .context("process must be hex")?;
    let system = client.sign_in(key, process).await?;
    println!("{} Signed in as {}", "✓".green().bold(), system.to_hex().cyan());
    Ok(())
}

async fn cmd_sign_out(client: &Client) -> anyhow::Result<()> {
    match client.sign_out().await? {
        Some(system) => println!("Signed out {}", system.short_id().cyan()),
        None => println!("Not signed in."),
    }
    Ok(())
}

fn cmd_whoami(client: &Client) -> anyhow::Result<()> {
    match client.current_system()? {
        Some(system) => {
            println!("{}", system.to_hex().cyan().bold());
            println!("  Authored events: {}", client.history(usize::MAX)?.len());
        }
        None => println!("Not signed in."),
    }
    Ok(())
}

async fn cmd_post(client: &Client, args: PostArgs) -> anyhow::Result<()> {
    let references = args.references.into_iter().map(Reference::from_blob).collect();
    let receipt = client.post(&args.text, references, None).await?;
    println!(
        "{} Posted at clock {}",
        "✓".green().bold(),
        receipt.event.logical_clock.to_string().yellow()
    );
    for outcome in &receipt.outcomes {
        match &outcome.error {
            None => println!("  {} {}", "✓".green(), outcome.replica),
            Some(error) => println!("  {} {}: {}", "✗".red(), outcome.replica, error),
        }
    }
    Ok(())
}

async fn cmd_heads(client: &Client, args: SystemArgs) -> anyhow::Result<()> {
    let system = parse_system(&args.system)?;
    let verified = client.engine().get_head_events_with_report(&system).await?;
    for event in &verified.value {
        print_event(event);
    }
    print_report(&verified.report);
    Ok(())
}

async fn cmd_processes(client: &Client, args: SystemArgs) -> anyhow::Result<()> {
    let system = parse_system(&args.system)?;
    for process in client.engine().discover_processes(&system).await? {
        println!("{}", process.to_hex().yellow());
    }
    Ok(())
}

async fn cmd_deref(client: &Client, args: DerefArgs) -> anyhow::Result<()> {
    let pointer = parse_pointer(&args.pointer)?;
    let verified = client.engine().deref_pointer_event_with_report(&pointer).await?;
    match &verified.value {
        Some(event) => print_event(event),
        None => println!("No replica returned the event."),
    }
    print_report(&verified.report);
    Ok(())
}

async fn cmd_references(client: &Client, args: ReferencesArgs) -> anyhow::Result<()> {
    let reference = match (&args.url, &args.pointer) {
        (Some(url), _) => Reference::from_blob(url.as_bytes().to_vec()),
        (None, Some(pointer)) => Reference::from_pointer(&parse_pointer(pointer)?)?,
        (None, None) => anyhow::bail!("--url or --pointer is required"),
    };
    let verified = client
        .engine()
        .query_events_referencing_with_report(&reference, args.content_type, args.pages)
        .await?;
    for event in &verified.value {
        print_event(event);
    }
    print_report(&verified.report);
    Ok(())
}

async fn cmd_username(client: &Client, args: SystemArgs) -> anyhow::Result<()> {
    let system = parse_system(&args.system)?;
    match client.resolve_username(&system).await? {
        Some(name) => println!("{}", name.bold()),
        None => println!("No username published."),
    }
    Ok(())
}

async fn cmd_avatar(client: &Client, args: AvatarArgs) -> anyhow::Result<()> {
    let system = parse_system(&args.system)?;
    let images = client.resolve_avatar(&system, args.size).await?;
    if images.is_empty() {
        println!("No avatar published.");
    }
    for (i, image) in images.iter().enumerate() {
        println!("  {} {} bytes", image.mime_type.cyan(), image.blob.len());
        if let Some(dir) = &args.out {
            let path = dir.join(format!("avatar-{i}.{}", extension(&image.mime_type)));
            write_image(&path, &image.blob)?;
            println!("    → {}", path.display());
        }
    }
    Ok(())
}

fn extension(mime: &str) -> &str {
    mime.rsplit_once('/').map_or("bin", |(_, subtype)| subtype)
}

fn write_image(path: &Path, blob: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, blob).with_context(|| format!("writing {}", path.display()))
}

async fn cmd_servers(client: &Client, args: ServersArgs) -> anyhow::Result<()> {
    match args.action {
        Some(ServerAction::Add { url }) => {
            if client.add_server(&url).await? {
                println!("{} Added {}", "✓".green(), url.blue());
            } else {
                println!("{} already registered", url.blue());
            }
        }
        Some(ServerAction::Remove { url }) => {
            client.remove_server(&url).await?;
            println!("{} Removed {}", "✓".green(), url.blue());
        }
        Some(ServerAction::List) | None => {
            for server in client.servers() {
                println!("{}", server.to_string().blue());
            }
        }
    }
    Ok(())
}

fn cmd_cache(client: &Client, args: CacheArgs) -> anyhow::Result<()> {
    match args.action {
        CacheAction::Clean => {
            let removed = client.cache_clean()?;
            println!("{} Removed {} expired entries", "✓".green(), removed);
        }
        CacheAction::Clear => {
            client.cache_clear()?;
            println!("{} Cache cleared", "✓".green());
        }
    }
    Ok(())
}
