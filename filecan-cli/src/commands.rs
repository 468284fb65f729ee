//! Command execution

use crate::{Cli, Command};
use anyhow::{Context, Result};
use filecan_core::{JsonCodec, StorageConfig, StorageEngine, WriteOptions};
use serde_json::Value;
use std::io::Write;
use tracing::{debug, info};

/// Run one CLI command, writing its output to `out`
pub fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let config = StorageConfig::with_data_dir(&cli.data_dir);
    let engine = StorageEngine::with_codec(config, JsonCodec)
        .with_context(|| format!("failed to open data directory {:?}", cli.data_dir))?;
    debug!("Using data directory {:?}", cli.data_dir);

    match cli.command {
        Command::Areas => {
            for area in engine.list_areas()? {
                writeln!(out, "{}", area)?;
            }
        }
        Command::Collections { area } => {
            for collection in engine.get_collections(&area)? {
                writeln!(out, "{}", collection)?;
            }
        }
        Command::Count { area, collection } => {
            let count = match collection {
                Some(collection) => engine.collection_objects_count(&area, &collection)?,
                None => engine.database_collections_count(&area)?,
            };
            writeln!(out, "{}", count)?;
        }
        Command::List {
            area,
            collection,
            skip,
            take,
        } => {
            for id in engine.list_objects(&area, &collection, skip, take)? {
                writeln!(out, "{}", id)?;
            }
        }
        Command::Find {
            area,
            collection,
            query,
            skip,
            take,
        } => {
            for id in engine.find_objects_using_keywords(&query, &area, &collection, skip, take)? {
                writeln!(out, "{}", id)?;
            }
        }
        Command::Get {
            area,
            collection,
            id,
            password,
        } => {
            let value: Value = engine.get_object(&id, &area, &collection, &password)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        }
        Command::Info {
            area,
            collection,
            id,
        } => {
            let info = engine.object_info(&id, &area, &collection)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
        }
        Command::Put {
            area,
            collection,
            json,
            id,
            password,
            keywords,
        } => {
            let value = parse_json(&json)?;
            let opts = WriteOptions::new()
                .with_file_name(id)
                .with_password(password)
                .with_keywords(keywords);
            let id = engine.insert_object(&value, &area, &collection, &opts)?;
            writeln!(out, "{}", id)?;
        }
        Command::Update {
            area,
            collection,
            id,
            json,
            password,
            keywords,
        } => {
            let value = parse_json(&json)?;
            let opts = WriteOptions::new()
                .with_password(password)
                .with_keywords(keywords);
            if !engine.update_object(&id, &value, &area, &collection, &opts)? {
                anyhow::bail!("object {}/{}/{} not found", area, collection, id);
            }
            writeln!(out, "updated {}", id)?;
        }
        Command::Delete {
            area,
            collection,
            id,
        } => {
            let deleted = engine.delete_object(&id, &area, &collection)?;
            writeln!(out, "{}", if deleted { "deleted" } else { "not found" })?;
        }
        Command::DropCollection { area, collection } => {
            let deleted = engine.delete_collection(&area, &collection)?;
            if deleted {
                info!("Dropped collection {}/{}", area, collection);
            }
            writeln!(out, "{}", if deleted { "deleted" } else { "not found" })?;
        }
        Command::DropDatabase { area } => {
            let deleted = engine.delete_database(&area)?;
            if deleted {
                info!("Dropped area {}", area);
            }
            writeln!(out, "{}", if deleted { "deleted" } else { "not found" })?;
        }
        Command::Reindex { area, collection } => {
            let count = engine.rebuild_index(&area, &collection)?;
            writeln!(out, "indexed {} objects", count)?;
        }
        Command::NewId => {
            writeln!(out, "{}", engine.generate_file_name())?;
        }
    }

    let flushed = engine.flush()?;
    debug!("Flushed {} index snapshots", flushed);
    Ok(())
}

fn parse_json(json: &str) -> Result<Value> {
    serde_json::from_str(json).context("payload is not valid JSON")
}
