//! Orchestration for `forge process`: consume evaluation verdicts, merge
//! accepted corrections, and emit the next regeneration batch.
//!
//! This is the regenerate leg of the round state machine. Responses are
//! always resolved through correlation-id-keyed maps, never by line
//! position: the evaluation batch, the generation batch, and any prior
//! regeneration batch may each cover different subsets of records.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use tracing::{debug, info};

use crate::core::correlation::CorrelationId;
use crate::core::record::RecordStore;
use crate::core::request::{Feedback, RequestBuilder};
use crate::core::verdict::{Verdict, classify};
use crate::core::wire::{BatchRequest, BatchResponse};
use crate::io::batch::{read_jsonl, write_jsonl};
use crate::io::config::ForgeConfig;
use crate::io::layout::RoundContext;
use crate::io::rotate::rotate;

/// Result of one regeneration pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    /// Records still requiring correction; zero means the round converged.
    pub regens_needed: usize,
    /// Accepted corrections substituted into the generation batch.
    pub accepted_substituted: usize,
    /// Rejected outputs overwritten with the terminal marker.
    pub superseded: usize,
    pub archived_evaluation: PathBuf,
    pub archived_regeneration: Option<PathBuf>,
    pub regen_batch_path: PathBuf,
}

/// The immediately preceding regeneration attempt, keyed by correlation id.
struct PriorAttempts {
    requests: HashMap<String, BatchRequest>,
    responses: HashMap<String, BatchResponse>,
}

/// Run the regenerate leg for one round.
///
/// Preconditions: the completed generation and evaluation batches must
/// exist; when a completed regeneration batch exists, its pending request
/// batch must too. Any missing artifact aborts the round. The canonical
/// generation batch is only rewritten after the whole pass completes in
/// memory.
pub fn run_process(
    ctx: &RoundContext,
    cfg: &ForgeConfig,
    store: &RecordStore,
) -> Result<ProcessOutcome> {
    let generation_path = ctx.layout.completed_generation();
    if !generation_path.exists() {
        bail!(
            "missing completed generation batch {} (run the executor first)",
            generation_path.display()
        );
    }
    let mut generated: Vec<BatchResponse> = read_jsonl(&generation_path)?;
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(generated.len());
    for (pos, response) in generated.iter().enumerate() {
        if positions.insert(response.custom_id.clone(), pos).is_some() {
            bail!(
                "duplicate correlation id '{}' in {}",
                response.custom_id,
                generation_path.display()
            );
        }
    }

    // All preconditions before any artifact rotation: a fatal abort must
    // leave the round's files exactly where the operator left them.
    let evaluation_path = ctx.layout.completed_evaluation();
    if !evaluation_path.exists() {
        bail!(
            "missing completed evaluation batch {} (run evaluate and the executor first)",
            evaluation_path.display()
        );
    }
    let prior = load_prior_attempts(ctx)?;

    let archived_regeneration = rotate(&ctx.layout.completed_regeneration())?;
    rotate(&ctx.layout.pending_regeneration())?;
    let verdicts: Vec<BatchResponse> = read_jsonl(&evaluation_path)?;
    let archived_evaluation = rotate(&evaluation_path)?
        .ok_or_else(|| anyhow!("evaluation batch vanished during rotation"))?;

    info!(
        verdicts = verdicts.len(),
        prior_regeneration = prior.is_some(),
        "processing evaluation verdicts"
    );

    let builder = RequestBuilder::new(&ctx.scope, &ctx.model, &ctx.sampling);
    let mut regen_requests: Vec<BatchRequest> = Vec::new();
    let mut superseded = 0usize;
    let mut accepted_substituted = 0usize;
    let mut edits = 0usize;

    for verdict_response in &verdicts {
        let custom_id = verdict_response.custom_id.as_str();
        let id = CorrelationId::decode(custom_id)?;
        let record = store.get(id.index).ok_or_else(|| {
            anyhow!(
                "verdict '{custom_id}' maps to record {} but the store has {} records",
                id.index,
                store.len()
            )
        })?;
        let verdict_text = verdict_response.content()?;

        match classify(verdict_text, &cfg.acceptance_token) {
            Verdict::NeedsRegen { feedback } => {
                if record.ended {
                    debug!(custom_id, "record already ended; no regeneration request");
                    continue;
                }
                let pos = *positions.get(custom_id).ok_or_else(|| {
                    anyhow!(
                        "verdict '{custom_id}' not found in generated data {}",
                        generation_path.display()
                    )
                })?;

                // The feedback chain reads the immediately preceding attempt,
                // not the original generation.
                let (attempt, base_messages) = match &prior {
                    Some(prior) => {
                        let response = prior.responses.get(custom_id).ok_or_else(|| {
                            anyhow!("no prior regeneration response for '{custom_id}'")
                        })?;
                        let request = prior.requests.get(custom_id).ok_or_else(|| {
                            anyhow!("no prior regeneration request for '{custom_id}'")
                        })?;
                        (response.content()?.to_string(), request.body.messages.clone())
                    }
                    None => (
                        generated[pos].content()?.to_string(),
                        builder.generation_messages(record, ctx.role)?,
                    ),
                };

                regen_requests.push(builder.regeneration_request(
                    custom_id.to_string(),
                    base_messages,
                    ctx.role,
                    &Feedback {
                        attempt,
                        verdict: feedback,
                    },
                )?);

                // Supersede the rejected output so downstream turn generation
                // cannot build on it before the correction lands.
                generated[pos].set_content(&cfg.terminal_marker)?;
                superseded += 1;
                edits += 1;
            }
            Verdict::Accepted => {
                if let Some(prior) = &prior {
                    let pos = *positions.get(custom_id).ok_or_else(|| {
                        anyhow!(
                            "verdict '{custom_id}' not found in generated data {}",
                            generation_path.display()
                        )
                    })?;
                    let corrected = prior.responses.get(custom_id).ok_or_else(|| {
                        anyhow!("no prior regeneration response for accepted '{custom_id}'")
                    })?;
                    generated[pos] = corrected.clone();
                    accepted_substituted += 1;
                    edits += 1;
                }
            }
        }
    }

    let regen_batch_path = ctx.layout.pending_regeneration();
    write_jsonl(&regen_batch_path, &regen_requests)?;

    if edits > 0 {
        write_jsonl(&generation_path, &generated)?;
    }

    info!(
        regens_needed = regen_requests.len(),
        accepted_substituted,
        superseded,
        archived_evaluation = %archived_evaluation.display(),
        "regeneration pass complete"
    );
    Ok(ProcessOutcome {
        regens_needed: regen_requests.len(),
        accepted_substituted,
        superseded,
        archived_evaluation,
        archived_regeneration,
        regen_batch_path,
    })
}

fn load_prior_attempts(ctx: &RoundContext) -> Result<Option<PriorAttempts>> {
    let completed = ctx.layout.completed_regeneration();
    if !completed.exists() {
        return Ok(None);
    }
    let pending = ctx.layout.pending_regeneration();
    if !pending.exists() {
        bail!(
            "found completed regeneration batch {} but its request batch {} is missing",
            completed.display(),
            pending.display()
        );
    }
    let requests: Vec<BatchRequest> = read_jsonl(&pending)?;
    let responses: Vec<BatchResponse> = read_jsonl(&completed)?;

    let mut prior = PriorAttempts {
        requests: HashMap::with_capacity(requests.len()),
        responses: HashMap::with_capacity(responses.len()),
    };
    for request in requests {
        if prior
            .requests
            .insert(request.custom_id.clone(), request)
            .is_some()
        {
            bail!("duplicate correlation id in {}", pending.display());
        }
    }
    for response in responses {
        if prior
            .responses
            .insert(response.custom_id.clone(), response)
            .is_some()
        {
            bail!("duplicate correlation id in {}", completed.display());
        }
    }
    Ok(Some(prior))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wire::completion;
    use crate::io::config::ForgeConfig;
    use crate::test_support::{TempPipeline, custom_id, store_of};

    /// Seed a round: three generation responses, one rejected by evaluation.
    fn seed_round_with_one_failure(pipeline: &TempPipeline) {
        let ctx = &pipeline.ctx;
        write_jsonl(
            &ctx.layout.completed_generation(),
            &[
                completion(custom_id(ctx, 0), "response zero"),
                completion(custom_id(ctx, 1), "a rambling first attempt"),
                completion(custom_id(ctx, 2), "response two"),
            ],
        )
        .expect("write generation");
        write_jsonl(
            &ctx.layout.completed_evaluation(),
            &[
                completion(custom_id(ctx, 0), "Yes."),
                completion(custom_id(ctx, 1), "No. too long"),
                completion(custom_id(ctx, 2), "Yes."),
            ],
        )
        .expect("write evaluation");
    }

    #[test]
    fn single_failure_yields_one_scoped_regen_request() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store = store_of(3);
        seed_round_with_one_failure(&pipeline);

        let outcome = run_process(ctx, &ForgeConfig::default(), &store).expect("process");

        assert_eq!(outcome.regens_needed, 1);
        assert_eq!(outcome.superseded, 1);
        assert_eq!(outcome.accepted_substituted, 0);

        let requests: Vec<BatchRequest> =
            read_jsonl(&outcome.regen_batch_path).expect("read regen");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].custom_id, custom_id(ctx, 1));
        let content = &requests[0].body.messages.last().expect("message").content;
        assert!(content.contains("too long"));
        assert!(content.contains("a rambling first attempt"));

        // Rejected output superseded; accepted records untouched.
        let generated: Vec<BatchResponse> =
            read_jsonl(&ctx.layout.completed_generation()).expect("read generation");
        assert_eq!(generated[0].content().expect("content"), "response zero");
        assert_eq!(generated[1].content().expect("content"), "END_OF_DIALOGUE");
        assert_eq!(generated[2].content().expect("content"), "response two");
    }

    #[test]
    fn all_accepted_round_is_idempotent() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store = store_of(2);
        write_jsonl(
            &ctx.layout.completed_generation(),
            &[
                completion(custom_id(ctx, 0), "fine"),
                completion(custom_id(ctx, 1), "also fine"),
            ],
        )
        .expect("write generation");
        write_jsonl(
            &ctx.layout.completed_evaluation(),
            &[
                completion(custom_id(ctx, 0), "Yes."),
                completion(custom_id(ctx, 1), "Yes."),
            ],
        )
        .expect("write evaluation");

        let outcome = run_process(ctx, &ForgeConfig::default(), &store).expect("process");

        assert_eq!(outcome.regens_needed, 0);
        assert_eq!(outcome.superseded, 0);
        assert_eq!(outcome.accepted_substituted, 0);
        let requests: Vec<BatchRequest> =
            read_jsonl(&outcome.regen_batch_path).expect("read regen");
        assert!(requests.is_empty());
        let generated: Vec<BatchResponse> =
            read_jsonl(&ctx.layout.completed_generation()).expect("read generation");
        assert_eq!(generated[0].content().expect("content"), "fine");
    }

    #[test]
    fn second_failure_feeds_back_the_immediately_preceding_attempt() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store = store_of(3);
        seed_round_with_one_failure(&pipeline);
        run_process(ctx, &ForgeConfig::default(), &store).expect("first pass");

        // Executor completes the regeneration; the judge rejects it again.
        write_jsonl(
            &ctx.layout.completed_regeneration(),
            &[completion(custom_id(ctx, 1), "second attempt")],
        )
        .expect("write regen responses");
        write_jsonl(
            &ctx.layout.completed_evaluation(),
            &[completion(custom_id(ctx, 1), "No. still off")],
        )
        .expect("write evaluation");

        let outcome = run_process(ctx, &ForgeConfig::default(), &store).expect("second pass");

        assert_eq!(outcome.regens_needed, 1);
        assert!(outcome.archived_regeneration.is_some());
        let requests: Vec<BatchRequest> =
            read_jsonl(&outcome.regen_batch_path).expect("read regen");
        let content = &requests[0].body.messages.last().expect("message").content;
        // Both verdicts accumulate; the attempt quoted is the second one.
        assert!(content.contains("too long"));
        assert!(content.contains("still off"));
        assert!(content.contains("second attempt"));
    }

    #[test]
    fn accepted_correction_replaces_by_id_without_duplication() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store = store_of(3);
        seed_round_with_one_failure(&pipeline);
        run_process(ctx, &ForgeConfig::default(), &store).expect("first pass");

        write_jsonl(
            &ctx.layout.completed_regeneration(),
            &[completion(custom_id(ctx, 1), "a concise corrected turn")],
        )
        .expect("write regen responses");
        write_jsonl(
            &ctx.layout.completed_evaluation(),
            &[completion(custom_id(ctx, 1), "Yes.")],
        )
        .expect("write evaluation");

        let outcome = run_process(ctx, &ForgeConfig::default(), &store).expect("second pass");

        assert_eq!(outcome.regens_needed, 0);
        assert_eq!(outcome.accepted_substituted, 1);
        let generated: Vec<BatchResponse> =
            read_jsonl(&ctx.layout.completed_generation()).expect("read generation");
        assert_eq!(generated.len(), 3);
        let ids: Vec<&str> = generated.iter().map(|r| r.custom_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![custom_id(ctx, 0), custom_id(ctx, 1), custom_id(ctx, 2)]
        );
        assert_eq!(
            generated[1].content().expect("content"),
            "a concise corrected turn"
        );
    }

    #[test]
    fn ended_record_never_gets_a_regen_request() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let mut store = store_of(3);
        store.get_mut(1).expect("record").ended = true;
        seed_round_with_one_failure(&pipeline);

        let outcome = run_process(ctx, &ForgeConfig::default(), &store).expect("process");

        assert_eq!(outcome.regens_needed, 0);
        let requests: Vec<BatchRequest> =
            read_jsonl(&outcome.regen_batch_path).expect("read regen");
        assert!(requests.is_empty());
    }

    #[test]
    fn missing_evaluation_batch_aborts_the_round() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store = store_of(1);
        write_jsonl(
            &ctx.layout.completed_generation(),
            &[completion(custom_id(ctx, 0), "text")],
        )
        .expect("write generation");

        let err = run_process(ctx, &ForgeConfig::default(), &store).unwrap_err();
        assert!(
            err.to_string()
                .contains("missing completed evaluation batch")
        );
    }

    #[test]
    fn precondition_abort_leaves_artifacts_unrotated() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store = store_of(3);
        seed_round_with_one_failure(&pipeline);
        run_process(ctx, &ForgeConfig::default(), &store).expect("first pass");
        write_jsonl(
            &ctx.layout.completed_regeneration(),
            &[completion(custom_id(ctx, 1), "second attempt")],
        )
        .expect("write regen responses");

        // No completed evaluation batch: the second pass must abort before
        // renaming anything.
        let err = run_process(ctx, &ForgeConfig::default(), &store).unwrap_err();

        assert!(
            err.to_string()
                .contains("missing completed evaluation batch")
        );
        assert!(ctx.layout.completed_regeneration().exists());
        assert!(ctx.layout.pending_regeneration().exists());
    }

    #[test]
    fn missing_generation_batch_aborts_the_round() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let store = store_of(1);

        let err = run_process(&pipeline.ctx, &ForgeConfig::default(), &store).unwrap_err();
        assert!(
            err.to_string()
                .contains("missing completed generation batch")
        );
    }

    #[test]
    fn stale_verdict_from_another_round_is_fatal() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store = store_of(2);
        write_jsonl(
            &ctx.layout.completed_generation(),
            &[completion(custom_id(ctx, 0), "text")],
        )
        .expect("write generation");
        write_jsonl(
            &ctx.layout.completed_evaluation(),
            &[completion(custom_id(ctx, 9), "No. stale")],
        )
        .expect("write evaluation");

        let err = run_process(ctx, &ForgeConfig::default(), &store).unwrap_err();
        assert!(err.to_string().contains("maps to record 9"));
    }

    #[test]
    fn verdict_for_unknown_generation_id_is_fatal() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store = store_of(2);
        write_jsonl(
            &ctx.layout.completed_generation(),
            &[completion(custom_id(ctx, 0), "text")],
        )
        .expect("write generation");
        write_jsonl(
            &ctx.layout.completed_evaluation(),
            &[completion(custom_id(ctx, 1), "No. bad")],
        )
        .expect("write evaluation");

        let err = run_process(ctx, &ForgeConfig::default(), &store).unwrap_err();
        assert!(err.to_string().contains("not found in generated data"));
    }

    #[test]
    fn completed_regeneration_without_requests_is_fatal() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let ctx = &pipeline.ctx;
        let store = store_of(1);
        write_jsonl(
            &ctx.layout.completed_generation(),
            &[completion(custom_id(ctx, 0), "text")],
        )
        .expect("write generation");
        write_jsonl(
            &ctx.layout.completed_regeneration(),
            &[completion(custom_id(ctx, 0), "corrected")],
        )
        .expect("write regen responses");
        write_jsonl(
            &ctx.layout.completed_evaluation(),
            &[completion(custom_id(ctx, 0), "Yes.")],
        )
        .expect("write evaluation");

        let err = run_process(ctx, &ForgeConfig::default(), &store).unwrap_err();
        assert!(err.to_string().contains("request batch"));
    }
}
