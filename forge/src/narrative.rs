//! Orchestration for `forge narrate`: the turn-0 seed round.
//!
//! Dialogue rounds extend records that already hold an opening message;
//! this round produces those openers. The same generate/evaluate/process
//! machine runs over a list of narrative seed inputs instead of a record
//! store. On rejection the request is rebuilt fresh from the same seed
//! (there is no dialogue context worth feeding back); accepted
//! corrections substitute by correlation id. Once converged, the pending
//! generation batch and its completed counterpart are exactly what
//! `forge ingest` takes as seed batch and response batch.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use tracing::info;

use crate::core::correlation::CorrelationId;
use crate::core::request::{JudgeParams, RequestBuilder};
use crate::core::verdict::{Verdict, classify};
use crate::core::wire::{BatchRequest, BatchResponse};
use crate::evaluate::{EvaluateOutcome, EvaluationSource};
use crate::io::batch::{read_jsonl, write_jsonl};
use crate::io::config::ForgeConfig;
use crate::io::layout::RoundContext;
use crate::io::rotate::rotate;
use crate::regenerate::ProcessOutcome;

/// Load narrative seed inputs: a JSON array of seed description strings.
pub fn load_seeds(path: &Path) -> Result<Vec<String>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read seeds {}", path.display()))?;
    let seeds: Vec<String> = serde_json::from_str(&contents)
        .with_context(|| format!("parse seeds {}", path.display()))?;
    if seeds.is_empty() {
        bail!("seed file {} holds no seeds", path.display());
    }
    Ok(seeds)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrateOutcome {
    pub requests_written: usize,
    pub batch_path: PathBuf,
}

/// Emit one opener request per seed into the pending generation batch.
pub fn run_narrate(ctx: &RoundContext, seeds: &[String]) -> Result<NarrateOutcome> {
    let builder = RequestBuilder::new(&ctx.scope, &ctx.model, &ctx.sampling);
    let requests: Vec<BatchRequest> = seeds
        .iter()
        .enumerate()
        .map(|(index, seed)| {
            builder.narrative_request(CorrelationId::new(&ctx.scope, index).encode(), seed)
        })
        .collect();

    let batch_path = ctx.layout.pending_generation();
    write_jsonl(&batch_path, &requests)?;
    info!(
        batch = %batch_path.display(),
        requests = requests.len(),
        "seed batch written"
    );
    Ok(NarrateOutcome {
        requests_written: requests.len(),
        batch_path,
    })
}

/// Build one compliance-check request per completed opener.
///
/// Prefers completed regeneration responses when a regen round is in
/// flight, like the dialogue evaluate leg.
pub fn run_narrate_evaluate(
    ctx: &RoundContext,
    seeds: &[String],
    judge: &JudgeParams,
) -> Result<EvaluateOutcome> {
    let regen_path = ctx.layout.completed_regeneration();
    let (input_path, source) = if regen_path.exists() {
        info!("regeneration responses found; evaluating those");
        (regen_path, EvaluationSource::Regeneration)
    } else {
        (
            ctx.layout.completed_generation(),
            EvaluationSource::Generation,
        )
    };
    if !input_path.exists() {
        return Err(anyhow!(
            "missing completed batch {} (run the executor first)",
            input_path.display()
        ));
    }

    let responses: Vec<BatchResponse> = read_jsonl(&input_path)?;
    let builder = RequestBuilder::new(&ctx.scope, &ctx.model, &ctx.sampling);

    let mut requests = Vec::with_capacity(responses.len());
    for response in &responses {
        let id = CorrelationId::decode(&response.custom_id)?;
        if id.index >= seeds.len() {
            return Err(anyhow!(
                "response '{}' maps to seed {} but there are {} seeds",
                response.custom_id,
                id.index,
                seeds.len()
            ));
        }
        requests.push(builder.narrative_evaluation_request(
            response.custom_id.clone(),
            response.content()?,
            judge,
        ));
    }

    let batch_path = ctx.layout.pending_evaluation();
    write_jsonl(&batch_path, &requests)?;
    info!(
        batch = %batch_path.display(),
        requests = requests.len(),
        "seed evaluation batch written"
    );
    Ok(EvaluateOutcome {
        requests_written: requests.len(),
        source,
        batch_path,
    })
}

/// Consume compliance verdicts for the seed round.
///
/// Rejected openers get a fresh request rebuilt from the same seed under
/// the same correlation id; accepted corrections from a prior
/// regeneration replace the original response by id.
pub fn run_narrate_process(
    ctx: &RoundContext,
    cfg: &ForgeConfig,
    seeds: &[String],
) -> Result<ProcessOutcome> {
    let generation_path = ctx.layout.completed_generation();
    if !generation_path.exists() {
        bail!(
            "missing completed generation batch {} (run the executor first)",
            generation_path.display()
        );
    }
    let evaluation_path = ctx.layout.completed_evaluation();
    if !evaluation_path.exists() {
        bail!(
            "missing completed evaluation batch {} (run evaluate and the executor first)",
            evaluation_path.display()
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

    let prior = load_prior_responses(ctx)?;
    let archived_regeneration = rotate(&ctx.layout.completed_regeneration())?;
    rotate(&ctx.layout.pending_regeneration())?;
    let verdicts: Vec<BatchResponse> = read_jsonl(&evaluation_path)?;
    let archived_evaluation = rotate(&evaluation_path)?
        .ok_or_else(|| anyhow!("evaluation batch vanished during rotation"))?;

    let builder = RequestBuilder::new(&ctx.scope, &ctx.model, &ctx.sampling);
    let mut regen_requests: Vec<BatchRequest> = Vec::new();
    let mut accepted_substituted = 0usize;
    let mut edits = 0usize;

    for verdict_response in &verdicts {
        let custom_id = verdict_response.custom_id.as_str();
        let id = CorrelationId::decode(custom_id)?;
        let seed = seeds.get(id.index).ok_or_else(|| {
            anyhow!(
                "verdict '{custom_id}' maps to seed {} but there are {} seeds",
                id.index,
                seeds.len()
            )
        })?;

        match classify(verdict_response.content()?, &cfg.acceptance_token) {
            Verdict::NeedsRegen { .. } => {
                regen_requests.push(builder.narrative_request(custom_id.to_string(), seed));
            }
            Verdict::Accepted => {
                if let Some(prior) = &prior {
                    let pos = *positions.get(custom_id).ok_or_else(|| {
                        anyhow!(
                            "verdict '{custom_id}' not found in generated data {}",
                            generation_path.display()
                        )
                    })?;
                    let corrected = prior.get(custom_id).ok_or_else(|| {
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
        archived_evaluation = %archived_evaluation.display(),
        "seed regeneration pass complete"
    );
    Ok(ProcessOutcome {
        regens_needed: regen_requests.len(),
        accepted_substituted,
        superseded: 0,
        archived_evaluation,
        archived_regeneration,
        regen_batch_path,
    })
}

fn load_prior_responses(ctx: &RoundContext) -> Result<Option<HashMap<String, BatchResponse>>> {
    let completed = ctx.layout.completed_regeneration();
    if !completed.exists() {
        return Ok(None);
    }
    let responses: Vec<BatchResponse> = read_jsonl(&completed)?;
    let mut map = HashMap::with_capacity(responses.len());
    for response in responses {
        if map.insert(response.custom_id.clone(), response).is_some() {
            bail!("duplicate correlation id in {}", completed.display());
        }
    }
    Ok(Some(map))
}
