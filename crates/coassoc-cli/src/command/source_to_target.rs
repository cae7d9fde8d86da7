use coassoc_engine::{
    ConceptId, ConceptPair, DatasetId,
    bootstrap::{BootstrapSeed, NormalizationMode},
    source_target::compare_source_to_target,
};
use rand::Rng as _;

use super::{CommonArg, DEFAULT_TEMPORAL_DATASET_ID, RelatedArg, validated};
use crate::util::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ModeArg {
    Counts,
    RelativeSource,
    RelativeTarget,
}

impl From<ModeArg> for NormalizationMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Counts => Self::Counts,
            ModeArg::RelativeSource => Self::RelativeSource,
            ModeArg::RelativeTarget => Self::RelativeTarget,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SourceToTargetArg {
    #[clap(flatten)]
    common: CommonArg,
    /// Dataset to query
    #[arg(long, default_value_t = DEFAULT_TEMPORAL_DATASET_ID)]
    dataset_id: u32,
    #[arg(long)]
    source: u64,
    #[arg(long)]
    target: u64,
    /// Bootstrap seed as 32 hex digits (random if not specified)
    #[arg(long)]
    seed: Option<BootstrapSeed>,
    /// Bootstrap iterations per envelope
    #[arg(long)]
    iterations: Option<usize>,
    /// How distributions are normalized before comparison
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Minimum Jaccard similarity of the comparison concepts
    #[arg(long)]
    threshold: Option<f64>,
    #[clap(flatten)]
    related: RelatedArg,
}

pub(crate) fn run(arg: &SourceToTargetArg) -> anyhow::Result<()> {
    let SourceToTargetArg {
        common,
        dataset_id,
        source,
        target,
        seed,
        iterations,
        mode,
        threshold,
        related,
    } = arg;

    let (counts, mut config) = common.load()?;
    let params = &mut config.source_to_target;
    if let Some(iterations) = iterations {
        params.iterations = *iterations;
    }
    if let Some(mode) = mode {
        params.mode = (*mode).into();
    }
    if let Some(threshold) = threshold {
        params.similarity.threshold = *threshold;
    }
    related.apply(&mut params.similarity.exclude_related);
    let config = validated(config)?;

    let seed = seed.unwrap_or_else(|| rand::rng().random());
    eprintln!("Bootstrap seed: {seed}");
    let mut rng = seed.rng();

    let pair = ConceptPair::new(ConceptId(*source), ConceptId(*target));
    eprintln!("Comparing {source} -> {target} with similar pairs...");
    let report = compare_source_to_target(&counts, DatasetId(*dataset_id), pair, &config, &mut rng);
    match &report {
        Some(report) => eprintln!(
            "Compared at {} bin widths ({} source-anchored, {} target-anchored)",
            report.queried_pair.len(),
            report.source_anchored.len(),
            report.target_anchored.len()
        ),
        None => eprintln!("No delta distribution for {source} -> {target}"),
    }

    Output::save_json(&report, common.output.as_deref())?;
    Ok(())
}
