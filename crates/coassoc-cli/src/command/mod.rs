use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use coassoc_engine::{config::EngineConfig, memory::InMemoryCounts};

use self::{
    age_counts::AgeCountsArg, association::AssociationArg, cooccur::CooccurArg,
    delta_counts::DeltaCountsArg, similar_ages::SimilarAgesArg,
    source_to_target::SourceToTargetArg,
};
use crate::util;

mod age_counts;
mod association;
mod cooccur;
mod delta_counts;
mod similar_ages;
mod source_to_target;

/// Dataset used by association queries when none is given.
const DEFAULT_DATASET_ID: u32 = 1;
/// Dataset used by temporal queries when none is given.
const DEFAULT_TEMPORAL_DATASET_ID: u32 = 4;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// What to compute
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Association statistics between a concept and its partners
    Association(#[clap(flatten)] AssociationArg),
    /// Age-at-first-occurrence distribution of a concept
    AgeCounts(#[clap(flatten)] AgeCountsArg),
    /// Concepts with a similar age distribution
    SimilarAges(#[clap(flatten)] SimilarAgesArg),
    /// Time-delta distributions between concept pairs
    DeltaCounts(#[clap(flatten)] DeltaCountsArg),
    /// Whether two concepts frequently occur on the same day
    Cooccur(#[clap(flatten)] CooccurArg),
    /// Compare a source-to-target delta distribution with similar pairs
    SourceToTarget(#[clap(flatten)] SourceToTargetArg),
}

/// Arguments shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
struct CommonArg {
    /// Count snapshot JSON file
    #[arg(long)]
    counts: PathBuf,
    /// Engine configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Confidence level of every interval (overrides the configuration)
    #[arg(long)]
    confidence: Option<f64>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Overrides for whether concepts related to the queried ones are excluded.
#[derive(Debug, Clone, Copy, Default, clap::Args)]
struct RelatedArg {
    /// Drop candidate concepts associated with the queried concept
    #[arg(long, conflicts_with = "include_related")]
    exclude_related: bool,
    /// Keep candidate concepts associated with the queried concept
    #[arg(long)]
    include_related: bool,
}

impl RelatedArg {
    /// Applies the flag that was given, keeping `exclude_related` otherwise.
    fn apply(self, exclude_related: &mut bool) {
        if self.exclude_related {
            *exclude_related = true;
        } else if self.include_related {
            *exclude_related = false;
        }
    }
}

impl CommonArg {
    fn load(&self) -> anyhow::Result<(InMemoryCounts, EngineConfig)> {
        let mut config = util::read_config_file(self.config.as_deref())?;
        if let Some(confidence) = self.confidence {
            config.confidence = confidence;
        }
        let counts = util::read_counts_file(&self.counts)?;
        Ok((counts, config))
    }
}

fn validated(config: EngineConfig) -> anyhow::Result<EngineConfig> {
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn run() -> anyhow::Result<()> {
    util::init_tracing();
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Association(arg) => association::run(&arg)?,
        Mode::AgeCounts(arg) => age_counts::run(&arg)?,
        Mode::SimilarAges(arg) => similar_ages::run(&arg)?,
        Mode::DeltaCounts(arg) => delta_counts::run(&arg)?,
        Mode::Cooccur(arg) => cooccur::run(&arg)?,
        Mode::SourceToTarget(arg) => source_to_target::run(&arg)?,
    }
    Ok(())
}
