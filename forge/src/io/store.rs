//! Record store persistence: a columnar JSON document on disk.
//!
//! The on-disk shape mirrors the external columnar dataset contract: one
//! array per field (`source`, `scene`, `lang`, `dialogue`, `models`,
//! `ended`), all of equal length, row *i* across the columns forming record
//! *i*. Loads are validated against the embedded JSON schema; saves are
//! whole-store and atomic (temp file + rename).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::record::{Record, RecordStore, Turn};

const STORE_SCHEMA: &str = include_str!("../../schemas/record_store.schema.json");

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreColumns {
    source: Vec<String>,
    scene: Vec<String>,
    lang: Vec<String>,
    dialogue: Vec<Vec<Turn>>,
    models: Vec<Vec<String>>,
    ended: Vec<bool>,
}

/// Load and validate the record store from disk (schema + column lengths).
pub fn load_store(path: &Path) -> Result<RecordStore> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read store {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse store {}", path.display()))?;
    validate_schema(&value).with_context(|| format!("validate store {}", path.display()))?;
    let columns: StoreColumns = serde_json::from_value(value)
        .with_context(|| format!("deserialize store {}", path.display()))?;
    let store = columns_to_records(columns)?;
    debug!(path = %path.display(), records = store.len(), "store loaded");
    Ok(store)
}

/// Atomically overwrite the whole store on disk.
pub fn save_store(path: &Path, store: &RecordStore) -> Result<()> {
    let columns = records_to_columns(store);
    let mut buf = serde_json::to_string_pretty(&columns).context("serialize store")?;
    buf.push('\n');

    let parent = path
        .parent()
        .with_context(|| format!("store path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp store {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace store {}", path.display()))?;
    debug!(path = %path.display(), records = store.len(), "store saved");
    Ok(())
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(STORE_SCHEMA).context("parse store schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid store schema: {err}"))?;
    let messages: Vec<String> = compiled.iter_errors(value).map(|e| e.to_string()).collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "store schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn columns_to_records(columns: StoreColumns) -> Result<RecordStore> {
    let len = columns.source.len();
    for (name, have) in [
        ("scene", columns.scene.len()),
        ("lang", columns.lang.len()),
        ("dialogue", columns.dialogue.len()),
        ("models", columns.models.len()),
        ("ended", columns.ended.len()),
    ] {
        if have != len {
            return Err(anyhow!(
                "store column '{name}' has {have} rows, expected {len}"
            ));
        }
    }

    let mut records = Vec::with_capacity(len);
    let StoreColumns {
        source,
        scene,
        lang,
        dialogue,
        models,
        ended,
    } = columns;
    let mut scene = scene.into_iter();
    let mut lang = lang.into_iter();
    let mut dialogue = dialogue.into_iter();
    let mut models = models.into_iter();
    let mut ended = ended.into_iter();
    for src in source {
        records.push(Record {
            source: src,
            scene: scene.next().unwrap_or_default(),
            lang: lang.next().unwrap_or_default(),
            dialogue: dialogue.next().unwrap_or_default(),
            models: models.next().unwrap_or_default(),
            ended: ended.next().unwrap_or_default(),
        });
    }
    Ok(RecordStore::new(records))
}

fn records_to_columns(store: &RecordStore) -> StoreColumns {
    let mut columns = StoreColumns::default();
    for record in store.records() {
        columns.source.push(record.source.clone());
        columns.scene.push(record.scene.clone());
        columns.lang.push(record.lang.clone());
        columns.dialogue.push(record.dialogue.clone());
        columns.models.push(record.models.clone());
        columns.ended.push(record.ended);
    }
    columns
}
