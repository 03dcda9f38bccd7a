//! CLI for the dialogue forge pipeline.
//!
//! One command per round operation: `generate` emits a request batch,
//! `evaluate` builds judge requests over the latest completed attempt,
//! `process` consumes verdicts and emits the next regeneration batch,
//! `ingest` merges accepted responses into the record store. `narrate`
//! runs the same phases for the turn-0 seed round, and `assess` emits a
//! store-wide quality review batch. An external batch executor completes
//! the request batches between commands.

use std::path::PathBuf;
use std::process::exit;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use forge::assess::run_assess;
use forge::core::correlation::RoundScope;
use forge::core::record::Role;
use forge::core::request::{JudgeParams, SamplingParams};
use forge::evaluate::run_evaluate;
use forge::exit_codes;
use forge::generate::run_generate;
use forge::ingest::run_ingest;
use forge::io::config::{ForgeConfig, load_config};
use forge::io::layout::RoundContext;
use forge::io::store::load_store;
use forge::narrative::{load_seeds, run_narrate, run_narrate_evaluate, run_narrate_process};
use forge::regenerate::run_process;

#[derive(Parser)]
#[command(
    name = "forge",
    version,
    about = "Quality-gated batch generation of synthetic dialogues"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the pending generation batch for one round.
    Generate(RoundArgs),
    /// Build judge requests over the latest completed attempt.
    Evaluate(RoundArgs),
    /// Consume verdicts; emit the next regeneration batch.
    ///
    /// Exits with the number of regenerations still needed (saturated at
    /// 125) so shell loops can branch on convergence.
    Process(RoundArgs),
    /// Merge a completed generation batch into the record store.
    Ingest(IngestArgs),
    /// Run the turn-0 seed round over narrative seed inputs.
    ///
    /// The process phase exits like `process`: the number of regenerations
    /// still needed, saturated at 125.
    Narrate(NarrateArgs),
    /// Emit a store-wide quality review batch over finished dialogues.
    Assess(AssessArgs),
}

/// Chat role a round's turn is written as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    User,
    Assistant,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Role::Initiator,
            RoleArg::Assistant => Role::Responder,
        }
    }
}

#[derive(Args, Debug)]
struct RoundArgs {
    /// Canonical record store (columnar JSON).
    #[arg(long)]
    store: PathBuf,
    /// Language of the dialogues.
    #[arg(long)]
    lang: String,
    #[arg(long, default_value = "vanilla")]
    run_id: String,
    /// Full model identifier sent in request bodies.
    #[arg(long, default_value = "meta-llama/Llama-3.3-70B-Instruct")]
    model: String,
    /// Zero-based turn number within the run.
    #[arg(long, default_value_t = 0)]
    turn: u32,
    #[arg(long, value_enum, default_value_t = RoleArg::User)]
    role: RoleArg,
    #[arg(long, default_value_t = 0.9)]
    temperature: f64,
    #[arg(long, default_value_t = 0.95)]
    top_p: f64,
    #[arg(long, default_value_t = 1.0)]
    frequency_penalty: f64,
    #[arg(long, default_value_t = 0.6)]
    presence_penalty: f64,
    #[arg(long, default_value_t = 512)]
    max_tokens: u32,
    /// Pipeline config file.
    #[arg(long, default_value = "forge.toml")]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Completed generation batch to merge, jsonl format.
    #[arg(long)]
    batch: PathBuf,
    /// Canonical record store; created from --source when missing.
    #[arg(long)]
    store: PathBuf,
    /// Seed request batch; required when the store does not exist yet.
    #[arg(long)]
    source: Option<PathBuf>,
    #[arg(long)]
    lang: String,
    #[arg(long, value_enum)]
    role: RoleArg,
    /// Model recorded against the merged turns.
    #[arg(long)]
    model: String,
    #[arg(long, default_value = "forge.toml")]
    config: PathBuf,
}

/// Which leg of the seed round to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PhaseArg {
    Generate,
    Evaluate,
    Process,
}

#[derive(Args, Debug)]
struct NarrateArgs {
    /// Narrative seed inputs (JSON array of seed descriptions).
    #[arg(long)]
    seeds: PathBuf,
    #[arg(long, value_enum)]
    phase: PhaseArg,
    #[arg(long)]
    lang: String,
    #[arg(long, default_value = "vanilla")]
    run_id: String,
    #[arg(long, default_value = "meta-llama/Llama-3.3-70B-Instruct")]
    model: String,
    #[arg(long, default_value_t = 1.5)]
    temperature: f64,
    #[arg(long, default_value_t = 1.0)]
    top_p: f64,
    #[arg(long, default_value_t = 1.0)]
    frequency_penalty: f64,
    #[arg(long, default_value_t = 0.6)]
    presence_penalty: f64,
    #[arg(long, default_value_t = 1024)]
    max_tokens: u32,
    #[arg(long, default_value = "forge.toml")]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct AssessArgs {
    /// Canonical record store (columnar JSON).
    #[arg(long)]
    store: PathBuf,
    #[arg(long)]
    lang: String,
    #[arg(long, default_value = "vanilla")]
    run_id: String,
    /// Reviewer model for the whole-dialogue classification.
    #[arg(long, default_value = "meta-llama/Llama-3.3-70B-Instruct")]
    model: String,
    /// Turn scope the review batch is filed under.
    #[arg(long, default_value_t = 0)]
    turn: u32,
    #[arg(long, default_value_t = 0.1)]
    temperature: f64,
    #[arg(long, default_value_t = 2048)]
    max_tokens: u32,
    #[arg(long, default_value = "forge.toml")]
    config: PathBuf,
}

fn main() {
    forge::logging::init();
    match run() {
        Ok(code) => exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => {
            let cfg = load_config(&args.config)?;
            let ctx = round_context(&args, &cfg);
            let store = load_store(&args.store)?;
            run_generate(&ctx, &store)?;
            Ok(exit_codes::OK)
        }
        Command::Evaluate(args) => {
            let cfg = load_config(&args.config)?;
            let ctx = round_context(&args, &cfg);
            let store = load_store(&args.store)?;
            run_evaluate(&ctx, &store, &cfg.judge_params())?;
            Ok(exit_codes::OK)
        }
        Command::Process(args) => {
            let cfg = load_config(&args.config)?;
            let ctx = round_context(&args, &cfg);
            let store = load_store(&args.store)?;
            let outcome = run_process(&ctx, &cfg, &store)?;
            println!("{}", outcome.regens_needed);
            Ok(regen_exit_code(outcome.regens_needed))
        }
        Command::Ingest(args) => {
            let cfg = load_config(&args.config)?;
            run_ingest(
                &args.batch,
                &args.store,
                args.source.as_deref(),
                &args.lang,
                args.role.into(),
                &args.model,
                &cfg,
            )?;
            Ok(exit_codes::OK)
        }
        Command::Narrate(args) => {
            let cfg = load_config(&args.config)?;
            let seeds = load_seeds(&args.seeds)?;
            let ctx = narrate_context(&args, &cfg);
            match args.phase {
                PhaseArg::Generate => {
                    run_narrate(&ctx, &seeds)?;
                    Ok(exit_codes::OK)
                }
                PhaseArg::Evaluate => {
                    run_narrate_evaluate(&ctx, &seeds, &cfg.judge_params())?;
                    Ok(exit_codes::OK)
                }
                PhaseArg::Process => {
                    let outcome = run_narrate_process(&ctx, &cfg, &seeds)?;
                    println!("{}", outcome.regens_needed);
                    Ok(regen_exit_code(outcome.regens_needed))
                }
            }
        }
        Command::Assess(args) => {
            let cfg = load_config(&args.config)?;
            let scope = RoundScope::new(&args.lang, &args.run_id, &args.model, args.turn);
            let ctx = RoundContext::new(
                &cfg.batches_root,
                scope,
                &args.model,
                Role::Responder,
                SamplingParams::default(),
            );
            let judge = JudgeParams {
                model: args.model.clone(),
                temperature: args.temperature,
                max_tokens: args.max_tokens,
            };
            let store = load_store(&args.store)?;
            run_assess(&ctx, &store, &judge)?;
            Ok(exit_codes::OK)
        }
    }
}

fn regen_exit_code(regens_needed: usize) -> i32 {
    i32::try_from(regens_needed)
        .unwrap_or(exit_codes::MAX_REGENS_EXIT)
        .min(exit_codes::MAX_REGENS_EXIT)
}

fn narrate_context(args: &NarrateArgs, cfg: &ForgeConfig) -> RoundContext {
    let scope = RoundScope::new(&args.lang, &args.run_id, &args.model, 0);
    let sampling = SamplingParams {
        temperature: args.temperature,
        top_p: args.top_p,
        frequency_penalty: args.frequency_penalty,
        presence_penalty: args.presence_penalty,
        max_tokens: args.max_tokens,
    };
    RoundContext::new(&cfg.batches_root, scope, &args.model, Role::Initiator, sampling)
}

fn round_context(args: &RoundArgs, cfg: &ForgeConfig) -> RoundContext {
    let scope = RoundScope::new(&args.lang, &args.run_id, &args.model, args.turn);
    let sampling = SamplingParams {
        temperature: args.temperature,
        top_p: args.top_p,
        frequency_penalty: args.frequency_penalty,
        presence_penalty: args.presence_penalty,
        max_tokens: args.max_tokens,
    };
    RoundContext::new(&cfg.batches_root, scope, &args.model, args.role.into(), sampling)
}
