use coassoc_engine::{
    ConceptId, DatasetId,
    source::{SameDayRule, concepts_cooccur},
};
use serde::Serialize;

use super::{CommonArg, DEFAULT_TEMPORAL_DATASET_ID, validated};
use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct CooccurArg {
    #[clap(flatten)]
    common: CommonArg,
    /// Dataset to query
    #[arg(long, default_value_t = DEFAULT_TEMPORAL_DATASET_ID)]
    dataset_id: u32,
    #[arg(long)]
    concept_id_1: u64,
    #[arg(long)]
    concept_id_2: u64,
    /// Fraction of the pair count the same-day count must exceed
    #[arg(long, default_value_t = SameDayRule::GENERAL.threshold)]
    threshold: f64,
}

#[derive(Debug, Serialize)]
struct CooccurView {
    concept_id_1: ConceptId,
    concept_id_2: ConceptId,
    cooccur: bool,
}

pub(crate) fn run(arg: &CooccurArg) -> anyhow::Result<()> {
    let CooccurArg {
        common,
        dataset_id,
        concept_id_1,
        concept_id_2,
        threshold,
    } = arg;

    anyhow::ensure!(
        (0.0..=1.0).contains(threshold),
        "threshold must be in [0, 1], got {threshold}"
    );
    let (counts, config) = common.load()?;
    let config = validated(config)?;

    let rule = SameDayRule {
        threshold: *threshold,
        ..SameDayRule::GENERAL
    };
    let (a, b) = (ConceptId(*concept_id_1), ConceptId(*concept_id_2));
    let cooccur = concepts_cooccur(
        &counts,
        DatasetId(*dataset_id),
        a,
        b,
        None,
        &rule,
        &config.suppression,
    );

    let view = CooccurView {
        concept_id_1: a,
        concept_id_2: b,
        cooccur,
    };
    Output::save_json(&view, common.output.as_deref())?;
    Ok(())
}
