//! Quality-gated batch generation of multi-turn synthetic dialogues.
//!
//! The pipeline alternates two model roles over a canonical record store,
//! one turn per round. Each round emits a request batch for an external
//! batch executor, judges the completed responses, and re-issues
//! minimally-scoped regeneration requests (carrying accumulated feedback)
//! until every response passes or the operator stops the loop. Accepted
//! turns are then merged into the store.
//!
//! The same machine runs the turn-0 seed round ([`narrative`]) that
//! produces the conversation openers, and a post-hoc store-wide quality
//! review ([`assess`]) runs once the rounds have converged.
//!
//! Pure round logic lives under [`core`]; filesystem concerns (batch
//! files, store persistence, rotation, config) live under [`io`]; each
//! CLI operation gets a top-level orchestration module.

pub mod assess;
pub mod core;
pub mod evaluate;
pub mod exit_codes;
pub mod generate;
pub mod ingest;
pub mod io;
pub mod logging;
pub mod narrative;
pub mod regenerate;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
