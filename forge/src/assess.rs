//! Orchestration for `forge assess`: the store-wide quality review batch.
//!
//! Runs after the generation rounds have converged. One review request is
//! built per record, covering the whole dialogue at once (role confusion
//! and language correctness), so the reviewer sees the finished
//! conversations rather than single turns. The completed batch is a
//! reporting artifact; nothing merges back into the store.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::core::record::RecordStore;
use crate::core::request::{JudgeParams, RequestBuilder};
use crate::core::wire::BatchRequest;
use crate::io::batch::write_jsonl;
use crate::io::layout::RoundContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessOutcome {
    pub requests_written: usize,
    pub batch_path: PathBuf,
}

/// Build one quality review request per record and write the pending batch.
///
/// Ended and open records are both reviewed; a dialogue that reached its
/// natural conclusion is still a dialogue worth scoring.
pub fn run_assess(
    ctx: &RoundContext,
    store: &RecordStore,
    judge: &JudgeParams,
) -> Result<AssessOutcome> {
    let builder = RequestBuilder::new(&ctx.scope, &ctx.model, &ctx.sampling);

    let mut requests: Vec<BatchRequest> = Vec::with_capacity(store.len());
    for (index, record) in store.records().iter().enumerate() {
        requests.push(builder.assessment_request(index, record, judge)?);
    }

    let batch_path = ctx.layout.pending_assessment();
    write_jsonl(&batch_path, &requests)?;
    info!(
        batch = %batch_path.display(),
        requests = requests.len(),
        "quality review batch written"
    );
    Ok(AssessOutcome {
        requests_written: requests.len(),
        batch_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::correlation::CorrelationId;
    use crate::io::batch::read_jsonl;
    use crate::test_support::{TempPipeline, judge_params, store_of};

    #[test]
    fn reviews_every_record_including_ended_ones() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let mut store = store_of(3);
        store.get_mut(2).expect("record").ended = true;

        let outcome = run_assess(&pipeline.ctx, &store, &judge_params()).expect("assess");

        assert_eq!(outcome.requests_written, 3);
        let requests: Vec<BatchRequest> = read_jsonl(&outcome.batch_path).expect("read");
        let indices: Vec<usize> = requests
            .iter()
            .map(|r| CorrelationId::decode(&r.custom_id).expect("decode").index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn review_requests_use_the_judge_model_and_json_output() {
        let pipeline = TempPipeline::new().expect("pipeline");
        let store = store_of(1);

        let outcome = run_assess(&pipeline.ctx, &store, &judge_params()).expect("assess");

        let requests: Vec<BatchRequest> = read_jsonl(&outcome.batch_path).expect("read");
        assert_eq!(requests[0].body.model, "test-judge");
        assert!(
            requests[0]
                .body
                .messages[1]
                .content
                .contains("The Dialogue is as follows:")
        );
        let json = serde_json::to_string(&requests[0]).expect("serialize");
        assert!(json.contains(r#""response_format":{"type":"json_object"}"#));
    }
}
