use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use colored::Colorize;
use gitpack_store::{PackStore, StoreConfig, StoreRegistry};
use gitpack_types::{ObjectId, ObjectLocation};
use serde_json::{json, Value};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let session = Session::open(&cli)?;
    match cli.command {
        Command::CatFile(args) => cmd_cat_file(&session, args),
        Command::Show(args) => cmd_show(&session, args, cli.format),
        Command::List(args) => cmd_list(&session, args, cli.format),
        Command::Stats(_) => cmd_stats(&session, cli.format),
    }
}

/// An opened repository plus the runtime its lookups run on. Without a
/// runtime every lookup takes the blocking path.
struct Session {
    store: Arc<PackStore>,
    runtime: Option<tokio::runtime::Runtime>,
}

impl Session {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => StoreConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => StoreConfig::default(),
        };
        let registry = StoreRegistry::new(config)?;
        tracing::debug!(repo = %cli.repo.display(), blocking = cli.blocking, "opening repository");

        let (store, runtime) = if cli.blocking {
            (registry.initialize_blocking(&cli.repo), None)
        } else {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("starting tokio runtime")?;
            (runtime.block_on(registry.initialize(&cli.repo)), Some(runtime))
        };
        let store =
            store.with_context(|| format!("opening pack store in {}", cli.repo.display()))?;
        Ok(Self { store, runtime })
    }

    fn resolve(&self, hash: &str) -> anyhow::Result<(ObjectId, Bytes)> {
        let id: ObjectId = hash
            .parse()
            .with_context(|| format!("invalid object hash {hash:?}"))?;
        let bytes = match &self.runtime {
            Some(runtime) => runtime.block_on(self.store.resolve(&id)),
            None => self.store.resolve_blocking(&id),
        }
        .with_context(|| format!("resolving {hash}"))?;
        Ok((id, bytes))
    }
}

fn cmd_cat_file(session: &Session, args: CatFileArgs) -> anyhow::Result<()> {
    let (_, bytes) = session.resolve(&args.hash)?;
    let mut out = std::io::stdout().lock();
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(())
}

fn cmd_show(session: &Session, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (id, bytes) = session.resolve(&args.hash)?;
    let store = &session.store;
    let location = store.location(&id);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&show_json(store, &id, location, &bytes))?);
        return Ok(());
    }

    println!("{} {}", "object".bold(), id.to_hex().yellow().bold());
    if let Some(location) = location {
        println!("  Pack:   {} @ {}", pack_name(store, location).cyan(), location.offset);
    }
    println!("  Size:   {} bytes", bytes.len());
    println!();
    match std::str::from_utf8(&bytes) {
        Ok(text) => {
            print!("{text}");
            if !text.ends_with('\n') {
                println!();
            }
        }
        Err(_) => {
            for line in hex_dump(&bytes, args.bytes) {
                println!("{line}");
            }
            if bytes.len() > args.bytes {
                println!("{}", format!("... {} more bytes", bytes.len() - args.bytes).dimmed());
            }
        }
    }
    Ok(())
}

fn cmd_list(session: &Session, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = &session.store;
    let limit = args.limit.unwrap_or(usize::MAX);
    let objects: Vec<_> = store.objects().into_iter().take(limit).collect();

    if format == OutputFormat::Json {
        let entries: Vec<Value> = objects
            .iter()
            .map(|(id, location)| {
                json!({
                    "id": id.to_hex(),
                    "pack": pack_name(store, *location),
                    "offset": location.offset,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (id, location) in &objects {
        println!(
            "{} {} {}",
            id.to_hex().yellow(),
            pack_name(store, *location).dimmed(),
            location.offset
        );
    }
    Ok(())
}

fn cmd_stats(session: &Session, format: OutputFormat) -> anyhow::Result<()> {
    let store = &session.store;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&stats_json(store))?);
        return Ok(());
    }

    println!("Repository {}", store.dir().display().to_string().bold());
    if !store.has_pack_files() {
        println!("  {}", "no pack files".yellow());
        return Ok(());
    }
    println!("  Pack files: {}", store.pack_names().len().to_string().bold());
    println!("  Objects:    {}", store.object_count().to_string().bold());
    for name in store.pack_names() {
        println!("    {}", name.cyan());
    }
    Ok(())
}

fn pack_name(store: &PackStore, location: ObjectLocation) -> &str {
    store
        .pack_names()
        .get(location.pack as usize)
        .map(String::as_str)
        .unwrap_or("?")
}

fn show_json(store: &PackStore, id: &ObjectId, location: Option<ObjectLocation>, bytes: &[u8]) -> Value {
    json!({
        "id": id.to_hex(),
        "pack": location.map(|l| pack_name(store, l).to_string()),
        "offset": location.map(|l| l.offset),
        "size": bytes.len(),
        "text": std::str::from_utf8(bytes).ok(),
    })
}

fn stats_json(store: &PackStore) -> Value {
    json!({
        "repository": store.dir().display().to_string(),
        "has_pack_files": store.has_pack_files(),
        "packs": store.pack_names(),
        "objects": store.object_count(),
    })
}

/// `offset  hex bytes` lines, 16 bytes each, covering at most `limit` bytes.
fn hex_dump(bytes: &[u8], limit: usize) -> Vec<String> {
    let shown = &bytes[..bytes.len().min(limit)];
    shown
        .chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
            format!("{:08x}  {}", row * 16, hex.join(" "))
        })
        .collect()
}
