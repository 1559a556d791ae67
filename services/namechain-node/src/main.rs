use anyhow::{anyhow, bail, Context, Result};
use namechain_core::{logging, Config};
use namechain_name_index::NameDb;
use namechain_rpc::name_service_registry;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_RUNTIME_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    runtime_version: u32,
    protocol_version: u32,
}

#[derive(Debug, Serialize)]
struct NodeStatus {
    data_dir: PathBuf,
    head_height: u32,
    applied_height: u32,
    indexed_names: usize,
}

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    list_methods: bool,
    reindex: bool,
    lookup: Option<String>,
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            runtime_version: NODE_RUNTIME_VERSION,
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let options = parse_args(&args)?;

    if options.list_methods {
        let registry = name_service_registry().context("building method table")?;
        println!("{}", serde_json::to_string_pretty(&registry.describe())?);
        return Ok(());
    }

    let mut config = match &options.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default_config(),
    };
    if let Some(dir) = &options.data_dir {
        config = config.with_data_dir(dir);
    }

    logging::init_from_config(&config.logging)
        .map_err(|e| anyhow!("installing log subscriber: {}", e))?;

    info!(
        data_dir = %config.storage.data_dir.display(),
        "namechain-node starting"
    );

    let db = NameDb::open(&config.storage.data_dir, config.storage.create_if_missing)
        .with_context(|| format!("opening {}", config.storage.data_dir.display()))?;

    if options.reindex {
        let height = db.reindex().context("reindexing names")?;
        info!(height, "Reindex complete");
    }

    if let Some(name) = &options.lookup {
        let output = db
            .resolve_record(name)
            .with_context(|| format!("looking up {}", name))?;
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let status = NodeStatus {
            data_dir: config.storage.data_dir.clone(),
            head_height: db.head_height()?,
            applied_height: db.index().applied_height()?,
            indexed_names: db.index().len()?,
        };
        println!("{}", serde_json::to_string_pretty(&status)?);
    }

    db.close().context("closing name database")?;
    Ok(())
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut args_iter = args.iter();

    while let Some(arg) = args_iter.next() {
        match arg.as_str() {
            "--config" => options.config = Some(PathBuf::from(value_for(arg, &mut args_iter)?)),
            "--data-dir" => {
                options.data_dir = Some(PathBuf::from(value_for(arg, &mut args_iter)?))
            }
            "--lookup" => options.lookup = Some(value_for(arg, &mut args_iter)?.to_string()),
            "--list-methods" => options.list_methods = true,
            "--reindex" => options.reindex = true,
            other => bail!("unrecognized argument {}", other),
        }
    }

    Ok(options)
}

fn value_for<'a>(flag: &str, args: &mut std::slice::Iter<'a, String>) -> Result<&'a str> {
    args.next()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} was provided without a value", flag))
}
