use anyhow::Context as _;
use coassoc_engine::{
    ConceptId, DatasetId, interval::ConfidenceInterval, source::age_distribution,
    temporal::AgeDistribution,
};
use serde::Serialize;

use super::{CommonArg, DEFAULT_TEMPORAL_DATASET_ID, validated};
use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct AgeCountsArg {
    #[clap(flatten)]
    common: CommonArg,
    /// Dataset to query
    #[arg(long, default_value_t = DEFAULT_TEMPORAL_DATASET_ID)]
    dataset_id: u32,
    /// Concept to look up
    #[arg(long)]
    concept_id: u64,
    /// Coarsen to this bin width in years
    #[arg(long)]
    bin_width: Option<u32>,
}

/// An age distribution with per-bin intervals, as written to the output.
#[derive(Debug, Serialize)]
pub(crate) struct AgeCountsView<'a> {
    #[serde(flatten)]
    pub distribution: &'a AgeDistribution,
    pub confidence_interval: Vec<ConfidenceInterval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl<'a> AgeCountsView<'a> {
    pub fn new(distribution: &'a AgeDistribution, confidence: f64, similarity: Option<f64>) -> Self {
        Self {
            distribution,
            confidence_interval: distribution.confidence_intervals(confidence),
            similarity,
        }
    }
}

pub(crate) fn run(arg: &AgeCountsArg) -> anyhow::Result<()> {
    let AgeCountsArg {
        common,
        dataset_id,
        concept_id,
        bin_width,
    } = arg;

    let (counts, config) = common.load()?;
    let config = validated(config)?;

    let results: Vec<AgeDistribution> =
        age_distribution(&counts, DatasetId(*dataset_id), ConceptId(*concept_id))
            .map(|age| match bin_width {
                Some(width) => {
                    anyhow::ensure!(
                        *width > 0 && *width % age.bin_width() == 0,
                        "bin width {width} is not a multiple of {}",
                        age.bin_width()
                    );
                    Ok(age.rebin_with(*width, None, &config.suppression))
                }
                None => Ok(age),
            })
            .transpose()
            .context("Failed to rebin age distribution")?
            .into_iter()
            .collect();

    let views: Vec<_> = results
        .iter()
        .map(|age| AgeCountsView::new(age, config.confidence, None))
        .collect();
    Output::save_json(&views, common.output.as_deref())?;
    Ok(())
}
