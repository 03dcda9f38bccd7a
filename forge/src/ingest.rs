//! Orchestration for `forge ingest`: merge a completed generation batch
//! into the canonical record store.
//!
//! Responses are matched to records by decoded correlation id, never by
//! line position. The store is rewritten once, after the whole batch has
//! merged in memory; a fatal mid-merge error leaves the on-disk store
//! untouched.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Result, anyhow, bail};
use regex::Regex;
use tracing::{debug, info};

use crate::core::correlation::CorrelationId;
use crate::core::record::{Record, RecordStore, Role};
use crate::core::wire::{BatchRequest, BatchResponse};
use crate::io::batch::read_jsonl;
use crate::io::config::ForgeConfig;
use crate::io::store::{load_store, save_store};

// Models sometimes echo the transcript's role labels back in a completion.
static ROLE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?i:user|assistant)\s*:\s*").expect("role label pattern should be valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Turns appended to records this invocation.
    pub appended: usize,
    /// Records whose `ended` flag latched this invocation.
    pub newly_ended: usize,
    /// Records ended overall after the merge.
    pub total_ended: usize,
    pub store_path: PathBuf,
}

/// Merge one completed generation batch into the store at `store_path`.
///
/// When the store does not exist yet, `seed_path` must name the seed
/// request batch; a fresh store is created with one record per seed
/// request (`source` from the seed's correlation id, `scene` from its
/// final user message).
pub fn run_ingest(
    batch_path: &Path,
    store_path: &Path,
    seed_path: Option<&Path>,
    lang: &str,
    role: Role,
    model: &str,
    cfg: &ForgeConfig,
) -> Result<IngestOutcome> {
    let responses: Vec<BatchResponse> = read_jsonl(batch_path)?;

    let mut store = if store_path.exists() {
        load_store(store_path)?
    } else {
        let seed_path = seed_path.ok_or_else(|| {
            anyhow!(
                "store {} does not exist and no seed batch was given",
                store_path.display()
            )
        })?;
        seed_store(seed_path, lang, responses.len())?
    };

    let mut appended = 0usize;
    let mut newly_ended = 0usize;
    for response in &responses {
        let id = CorrelationId::decode(&response.custom_id)?;
        let len = store.len();
        let record = store.get_mut(id.index).ok_or_else(|| {
            anyhow!(
                "response '{}' maps to record {} but the store has {len} records",
                response.custom_id,
                id.index
            )
        })?;
        let content = response.content()?;

        if content.contains(&cfg.terminal_marker) {
            if !record.ended {
                newly_ended += 1;
            }
            record.ended = true;
            continue;
        }
        if record.ended {
            debug!(
                custom_id = %response.custom_id,
                "record already ended; response dropped"
            );
            continue;
        }
        record.append_turn(role, sanitize(content), model);
        appended += 1;
    }

    save_store(store_path, &store)?;
    let total_ended = store.ended_count();
    info!(
        appended,
        newly_ended,
        total_ended,
        total = store.len(),
        store = %store_path.display(),
        "batch ingested"
    );
    Ok(IngestOutcome {
        appended,
        newly_ended,
        total_ended,
        store_path: store_path.to_path_buf(),
    })
}

/// Create a fresh store from a seed request batch.
fn seed_store(seed_path: &Path, lang: &str, expected: usize) -> Result<RecordStore> {
    let seeds: Vec<BatchRequest> = read_jsonl(seed_path)?;
    if seeds.len() != expected {
        bail!(
            "seed batch {} has {} requests but the completed batch has {expected} responses",
            seed_path.display(),
            seeds.len()
        );
    }
    let mut records = Vec::with_capacity(seeds.len());
    for seed in &seeds {
        let scene = seed
            .body
            .messages
            .last()
            .ok_or_else(|| anyhow!("seed request '{}' has no messages", seed.custom_id))?
            .content
            .clone();
        records.push(Record {
            source: seed.custom_id.clone(),
            scene,
            lang: lang.to_string(),
            dialogue: Vec::new(),
            models: Vec::new(),
            ended: false,
        });
    }
    Ok(RecordStore::new(records))
}

/// Normalize a generated turn before it enters the store.
///
/// Strips surrounding whitespace and quote characters, plus any leading
/// `user:`/`assistant:` label the model echoed back.
fn sanitize(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('"').trim();
    ROLE_LABEL.replace(trimmed, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wire::{ChatMessage, completion};
    use crate::io::batch::write_jsonl;
    use crate::test_support::{TEST_MODEL, TempPipeline, custom_id, store_of};

    fn seed_request(ctx: &crate::io::layout::RoundContext, index: usize, scene: &str) -> BatchRequest {
        BatchRequest {
            custom_id: custom_id(ctx, index),
            method: "POST".to_string(),
            url: "/v1/chat/completions".to_string(),
            body: crate::core::wire::RequestBody {
                model: TEST_MODEL.to_string(),
                messages: vec![
                    ChatMessage::system("narrator"),
                    ChatMessage::user(scene),
                ],
                temperature: 0.9,
                top_p: 0.95,
                frequency_penalty: None,
                presence_penalty: None,
                max_tokens: 512,
                response_format: None,
            },
        }
    }

    #[test]
    fn sanitize_strips_quotes_and_role_labels() {
        assert_eq!(sanitize("\"user: hello there\""), "hello there");
        assert_eq!(sanitize("  Assistant:  fine.  "), "fine.");
        assert_eq!(sanitize("plain reply"), "plain reply");
        // Labels after the first token are content, not framing.
        assert_eq!(sanitize("she said user: hi"), "she said user: hi");
    }

    #[test]
    fn merges_turns_by_id_into_an_existing_store() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store_path = pipeline.root().join("store.json");
        save_store(&store_path, &store_of(2)).expect("seed store");

        let batch = pipeline.root().join("completed.jsonl");
        // Reverse order on purpose: the merge must key by id, not position.
        write_jsonl(
            &batch,
            &[
                completion(custom_id(ctx, 1), "second reply"),
                completion(custom_id(ctx, 0), "first reply"),
            ],
        )
        .expect("write batch");

        let outcome = run_ingest(
            &batch,
            &store_path,
            None,
            "english",
            Role::Initiator,
            TEST_MODEL,
            &ForgeConfig::default(),
        )
        .expect("ingest");

        assert_eq!(outcome.appended, 2);
        let store = load_store(&store_path).expect("reload");
        let last = |i: usize| {
            store
                .get(i)
                .and_then(|r| r.dialogue.last())
                .map(|t| t.content.clone())
        };
        assert_eq!(last(0).as_deref(), Some("first reply"));
        assert_eq!(last(1).as_deref(), Some("second reply"));
    }

    #[test]
    fn terminal_marker_latches_ended_without_appending() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store_path = pipeline.root().join("store.json");
        save_store(&store_path, &store_of(2)).expect("seed store");

        let batch = pipeline.root().join("completed.jsonl");
        write_jsonl(
            &batch,
            &[
                completion(custom_id(ctx, 0), "END_OF_DIALOGUE"),
                completion(custom_id(ctx, 1), "still going"),
            ],
        )
        .expect("write batch");

        let outcome = run_ingest(
            &batch,
            &store_path,
            None,
            "english",
            Role::Initiator,
            TEST_MODEL,
            &ForgeConfig::default(),
        )
        .expect("ingest");

        assert_eq!(outcome.newly_ended, 1);
        assert_eq!(outcome.appended, 1);
        let store = load_store(&store_path).expect("reload");
        let ended = store.get(0).expect("record");
        assert!(ended.ended);
        // The marker itself never lands in the dialogue.
        assert_eq!(ended.dialogue.len(), 1);
    }

    #[test]
    fn creates_a_store_from_the_seed_batch() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store_path = pipeline.root().join("store.json");

        let seed_path = pipeline.root().join("seed.jsonl");
        write_jsonl(
            &seed_path,
            &[
                seed_request(ctx, 0, "a quiet harbor at dawn"),
                seed_request(ctx, 1, "a crowded night market"),
            ],
        )
        .expect("write seed");
        let batch = pipeline.root().join("completed.jsonl");
        write_jsonl(
            &batch,
            &[
                completion(custom_id(ctx, 0), "opening zero"),
                completion(custom_id(ctx, 1), "opening one"),
            ],
        )
        .expect("write batch");

        run_ingest(
            &batch,
            &store_path,
            Some(&seed_path),
            "german",
            Role::Responder,
            TEST_MODEL,
            &ForgeConfig::default(),
        )
        .expect("ingest");

        let store = load_store(&store_path).expect("reload");
        assert_eq!(store.len(), 2);
        let record = store.get(1).expect("record");
        assert_eq!(record.scene, "a crowded night market");
        assert_eq!(record.source, custom_id(ctx, 1));
        assert_eq!(record.lang, "german");
        assert_eq!(record.dialogue[0].content, "opening one");
        assert_eq!(record.models, vec![TEST_MODEL]);
    }

    #[test]
    fn missing_store_without_seed_is_fatal() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let batch = pipeline.root().join("completed.jsonl");
        write_jsonl(&batch, &[completion(custom_id(ctx, 0), "x")]).expect("write batch");

        let err = run_ingest(
            &batch,
            &pipeline.root().join("absent.json"),
            None,
            "english",
            Role::Initiator,
            TEST_MODEL,
            &ForgeConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no seed batch"));
    }

    #[test]
    fn stale_response_id_aborts_without_touching_the_store() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store_path = pipeline.root().join("store.json");
        save_store(&store_path, &store_of(1)).expect("seed store");
        let before = std::fs::read_to_string(&store_path).expect("read");

        let batch = pipeline.root().join("completed.jsonl");
        write_jsonl(
            &batch,
            &[
                completion(custom_id(ctx, 0), "fine"),
                completion(custom_id(ctx, 7), "stale"),
            ],
        )
        .expect("write batch");

        let err = run_ingest(
            &batch,
            &store_path,
            None,
            "english",
            Role::Initiator,
            TEST_MODEL,
            &ForgeConfig::default(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("maps to record 7"));
        let after = std::fs::read_to_string(&store_path).expect("read");
        assert_eq!(before, after);
    }
}
