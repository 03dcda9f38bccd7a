//! Orchestration for `forge generate`: emit one round's generation batch.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::core::record::RecordStore;
use crate::core::request::RequestBuilder;
use crate::io::batch::write_jsonl;
use crate::io::layout::RoundContext;

/// Result of emitting a generation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOutcome {
    pub requests_written: usize,
    /// Records skipped because their `ended` flag is latched.
    pub skipped_ended: usize,
    pub batch_path: PathBuf,
}

/// Build a generation request for every non-ended record and write the
/// pending batch file for the external executor.
pub fn run_generate(ctx: &RoundContext, store: &RecordStore) -> Result<GenerateOutcome> {
    let builder = RequestBuilder::new(&ctx.scope, &ctx.model, &ctx.sampling);

    let mut requests = Vec::new();
    let mut skipped_ended = 0;
    for (index, record) in store.records().iter().enumerate() {
        if record.ended {
            skipped_ended += 1;
            continue;
        }
        requests.push(builder.generation_request(index, record, ctx.role)?);
    }

    let batch_path = ctx.layout.pending_generation();
    write_jsonl(&batch_path, &requests)?;
    info!(
        batch = %batch_path.display(),
        requests = requests.len(),
        skipped_ended,
        "generation batch written"
    );
    Ok(GenerateOutcome {
        requests_written: requests.len(),
        skipped_ended,
        batch_path,
    })
}
