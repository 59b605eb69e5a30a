//! tgfetch - Inspect Telegram file ids and plan media downloads
//!
//! Usage:
//!   tgfetch inspect <FILE_ID>                  - Decode a file id
//!   tgfetch plan --size <N> [--from] [--until] - Show the chunk layout
//!   tgfetch config init|show                   - Manage the config file

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tgfetch::{
    config::Config,
    download::{chunk_size_for, human_readable, part_count, RangePlan},
    media::{DescriptorResolver, Location},
};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "tgfetch")]
#[command(version)]
#[command(about = "Inspect Telegram file ids and plan media downloads")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a file id and show where it would be fetched from
    Inspect {
        /// Bot-API file id
        file_id: String,
    },

    /// Show how a file or byte range would be split into requests
    Plan {
        /// Declared file size in bytes
        #[arg(long)]
        size: u64,

        /// First byte of the range
        #[arg(long)]
        from: Option<u64>,

        /// Last byte of the range (inclusive)
        #[arg(long)]
        until: Option<u64>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a new configuration file
    Init {
        /// Telegram API ID (from my.telegram.org)
        #[arg(long)]
        api_id: i32,

        /// Telegram API hash
        #[arg(long)]
        api_hash: String,

        /// Home datacenter
        #[arg(long)]
        dc_id: Option<i32>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let builder = FmtSubscriber::builder().with_target(false);
    let installed = if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(
            builder.with_env_filter(EnvFilter::from_default_env()).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(builder.with_max_level(log_level).finish())
    };
    if let Err(e) = installed {
        eprintln!("Failed to set subscriber: {}", e);
    }

    let config_path = cli.config.unwrap_or_else(Config::default_path);

    if let Err(e) = run_command(cli.command, &config_path) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: &Path) -> Result<()> {
    match command {
        Commands::Inspect { file_id } => cmd_inspect(&file_id),

        Commands::Plan { size, from, until } => cmd_plan(size, from, until),

        Commands::Config { action } => match action {
            ConfigAction::Init {
                api_id,
                api_hash,
                dc_id,
                force,
            } => cmd_config_init(config_path, api_id, api_hash, dc_id, force),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn cmd_inspect(file_id: &str) -> Result<()> {
    let descriptor = DescriptorResolver::resolve_encoded(file_id)?;
    let id = &descriptor.file_id;

    println!("File id v{}.{}", id.major, id.minor);
    println!("  Type:           {:?}", id.file_type);
    println!("  Datacenter:     {}", id.dc_id);
    println!("  Media id:       {}", id.media_id);
    println!("  Access hash:    {}", id.access_hash);
    if id.file_reference.is_empty() {
        println!("  File reference: (none)");
    } else {
        println!("  File reference: {}", hex::encode(&id.file_reference));
    }
    if let Some(photo) = &id.photo {
        println!("  Volume id:      {}", photo.volume_id);
        println!("  Local id:       {}", photo.local_id);
        println!("  Thumbnail:      {:?}", photo.source);
    }

    match Location::resolve(&descriptor)? {
        Location::ChatPhoto {
            peer,
            volume_id,
            local_id,
            big,
        } => {
            println!("Location: chat photo ({})", if big { "big" } else { "small" });
            println!("  Peer:           {:?}", peer);
            println!("  Volume/local:   {}/{}", volume_id, local_id);
        }
        Location::Photo { thumb_size, .. } => {
            println!("Location: photo, size {:?}", thumb_size);
        }
        Location::Document { thumb_size, .. } => {
            if thumb_size.is_empty() {
                println!("Location: document");
            } else {
                println!("Location: document thumbnail {:?}", thumb_size);
            }
        }
    }

    if id.encode() != file_id {
        info!("File id re-encodes differently (older version or padding)");
    }

    Ok(())
}

fn cmd_plan(size: u64, from: Option<u64>, until: Option<u64>) -> Result<()> {
    let chunk_size = chunk_size_for(size);
    println!("File size:   {} ({} bytes)", human_readable(size), size);
    println!("Chunk size:  {} ({} bytes)", human_readable(u64::from(chunk_size)), chunk_size);
    println!("Parts:       {}", part_count(size, chunk_size));

    if from.is_none() && until.is_none() {
        return Ok(());
    }

    let from = from.unwrap_or(0);
    let until = match until {
        Some(until) => until,
        None if size > 0 => size - 1,
        None => bail!("--until is required when the size is 0"),
    };
    if from > until || (size > 0 && until >= size) {
        bail!("Invalid byte range {}-{} for a file of {} bytes", from, until, size);
    }

    let plan = RangePlan::new(from, until, chunk_size);
    println!("Range {}-{}:", from, until);
    println!("  Offset:         {}", plan.offset);
    println!("  Parts:          {}", plan.part_count);
    println!("  First part cut: {}", plan.first_part_cut);
    println!("  Last part cut:  {}", plan.last_part_cut);
    println!("  Bytes:          {}", plan.len());

    Ok(())
}

fn cmd_config_init(
    config_path: &Path,
    api_id: i32,
    api_hash: String,
    dc_id: Option<i32>,
    force: bool,
) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let mut config = Config::default();
    config.telegram.api_id = api_id;
    config.telegram.api_hash = api_hash;
    if let Some(dc_id) = dc_id {
        config.telegram.home_dc_id = dc_id;
    }
    config.validate()?;

    config
        .save(config_path)
        .with_context(|| format!("saving {}", config_path.display()))?;

    info!("Configuration saved to {}", config_path.display());
    info!("Downloads go to {}", config.download.download_dir.display());
    Ok(())
}

fn cmd_config_show(config_path: &Path) -> Result<()> {
    let mut config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        info!("{} not found, reading the environment", config_path.display());
        Config::from_env()?
    };

    if !config.telegram.api_hash.is_empty() {
        config.telegram.api_hash = "********".to_string();
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
