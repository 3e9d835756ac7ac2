use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use linkpad_aws::AwsConfig;
use linkpad_core::payload::truncate_utf8;
use linkpad_core::{Lifetime, Linkpad, NewRecord, OwnerToken, Record, ReservedCodes, StoreConfig};
use serde_json::json;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "linkpad")]
#[command(about = "Linkpad storage CLI", long_about = None)]
struct Cli {
    /// AWS region (defaults to LINKPAD_AWS_REGION or us-east-1)
    #[arg(long, global = true)]
    region: Option<String>,

    /// DynamoDB table holding records
    #[arg(long, global = true)]
    table: Option<String>,

    /// S3 bucket holding blob payloads
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Custom AWS endpoint (local DynamoDB, MinIO)
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// Directory of reserved pages (*.txt, file stem = code)
    #[arg(long, global = true, value_name = "DIR")]
    pages: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Shorten a URL
    CreateUrl {
        /// Destination URL
        url: String,
        /// Record lifetime (1d, 1w, 1m); default TTL when omitted
        #[arg(short, long)]
        lifetime: Option<Lifetime>,
        /// Owner token; a new one is generated when omitted
        #[arg(long)]
        owner: Option<String>,
        /// Creator address recorded with the item
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,
    },
    /// Store a paste from a file or stdin
    CreatePaste {
        /// Input file (stdin when omitted)
        file: Option<PathBuf>,
        /// Record lifetime (1d, 1w, 1m); default TTL when omitted
        #[arg(short, long)]
        lifetime: Option<Lifetime>,
        /// Owner token; a new one is generated when omitted
        #[arg(long)]
        owner: Option<String>,
        /// Creator address recorded with the item
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,
        /// Cut oversized input to the size limit instead of failing
        #[arg(long)]
        truncate: bool,
    },
    /// Show a record
    Get {
        code: String,
        /// Write only the payload to stdout
        #[arg(long)]
        raw: bool,
    },
    /// Delete a record you own
    Delete {
        code: String,
        /// Owner token returned at creation
        #[arg(long)]
        owner: String,
    },
    /// Print a fresh owner token
    Token,
}

#[tokio::main]
async fn main() {
    // Default to info level, can override with RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<linkpad_core::Error>() {
            Some(err) => eprintln!(
                "error [{} {}]: {} ({:#})",
                err.status_code(),
                err.code(),
                err.public_message(),
                e
            ),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Token = cli.command {
        println!("{}", OwnerToken::generate()?.as_str());
        return Ok(());
    }

    let service = connect(&cli).await?;

    match cli.command {
        Commands::CreateUrl {
            url,
            lifetime,
            owner,
            ip,
        } => {
            let owner = owner_or_generate(owner)?;
            let request = NewRecord::redirect(url, ip, owner.clone());
            let record = create(&service, request, lifetime).await?;
            print_created(&record, &owner, lifetime)?;
        }

        Commands::CreatePaste {
            file,
            lifetime,
            owner,
            ip,
            truncate,
        } => {
            let bytes = read_input(file.as_ref())?;
            let text = prepare_paste(bytes, service.config().max_payload_bytes, truncate)?;

            let owner = owner_or_generate(owner)?;
            let request = NewRecord::data(text, ip, owner.clone());
            let record = create(&service, request, lifetime).await?;
            print_created(&record, &owner, lifetime)?;
        }

        Commands::Get { code, raw } => {
            if let Some(page) = service.reserved_page(&code) {
                if raw {
                    std::io::stdout().write_all(&page)?;
                } else {
                    let value = json!({
                        "code": code,
                        "reserved": true,
                        "content": String::from_utf8_lossy(&page),
                    });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                return Ok(());
            }

            let record = service
                .fetch_record(&code)
                .await
                .context("Failed to fetch record")?;
            let Some(record) = record else {
                println!("Not found");
                return Ok(());
            };

            let content = service
                .fetch_content(&record)
                .await
                .context("Failed to fetch content")?;

            if raw {
                std::io::stdout().write_all(&content)?;
            } else {
                let value = json!({
                    "code": record.code,
                    "type": record.kind.as_tag(),
                    "paste": record.kind.is_data(),
                    "content": String::from_utf8_lossy(&content),
                    "size": content.len(),
                    "created": format_time(record.created_at),
                    "expires": record.expires_at.map(format_time),
                    "ip": record.creator_ip,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }

        Commands::Delete { code, owner } => {
            service
                .delete_record(&code, &OwnerToken::new(owner))
                .await
                .context("Failed to delete record")?;
            println!("Deleted {}", code);
        }

        Commands::Token => {}
    }

    Ok(())
}

async fn connect(cli: &Cli) -> Result<Linkpad> {
    let mut aws = AwsConfig::from_env();
    if let Some(region) = &cli.region {
        aws = aws.with_region(region);
    }
    if let Some(table) = &cli.table {
        aws = aws.with_table(table);
    }
    if let Some(bucket) = &cli.bucket {
        aws = aws.with_bucket(bucket);
    }
    if let Some(url) = &cli.endpoint_url {
        aws = aws.with_endpoint_url(url);
    }

    let reserved = match &cli.pages {
        Some(dir) => ReservedCodes::load_dir(dir)
            .with_context(|| format!("Failed to load pages from {}", dir.display()))?,
        None => ReservedCodes::empty(),
    };
    info!("Loaded {} reserved codes", reserved.len());

    let (metadata, blobs) = linkpad_aws::connect(&aws).await;
    let service = Linkpad::new(
        StoreConfig::from_env(),
        Arc::new(metadata),
        Arc::new(blobs),
        Arc::new(reserved),
    )?;
    Ok(service)
}

async fn create(service: &Linkpad, request: NewRecord, lifetime: Option<Lifetime>) -> Result<Record> {
    let record = match lifetime {
        Some(lifetime) => service.create_record_for(request, lifetime).await,
        None => service.create_record(request).await,
    };
    record.context("Failed to create record")
}

fn owner_or_generate(owner: Option<String>) -> Result<OwnerToken> {
    match owner {
        Some(token) if !token.is_empty() => Ok(OwnerToken::new(token)),
        _ => Ok(OwnerToken::generate()?),
    }
}

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    let bytes = match file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    Ok(bytes)
}

/// Decodes raw input as a paste, optionally cutting it to `max` bytes
fn prepare_paste(bytes: Vec<u8>, max: usize, truncate: bool) -> Result<String> {
    let mut text = String::from_utf8(bytes).context("Input must be UTF-8")?;
    if truncate && text.len() > max {
        warn!("Input is {} bytes, truncating to {}", text.len(), max);
        text = truncate_utf8(&text, max).to_string();
        if text.is_empty() {
            bail!("Content became empty after truncation");
        }
    }
    Ok(text)
}

fn print_created(record: &Record, owner: &OwnerToken, lifetime: Option<Lifetime>) -> Result<()> {
    let value = json!({
        "code": record.code,
        "type": record.kind.as_tag(),
        "lifetime": lifetime.map(|l| l.as_str()),
        "expires": record.expires_at.map(format_time),
        "owner": owner.as_str(),
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn format_time(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
