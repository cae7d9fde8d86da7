use std::collections::BTreeMap;

use coassoc_engine::{ConceptId, DatasetId, similarity::find_similar_age_distributions};
use serde::Serialize;

use super::{
    CommonArg, DEFAULT_TEMPORAL_DATASET_ID, RelatedArg, age_counts::AgeCountsView, validated,
};
use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SimilarAgesArg {
    #[clap(flatten)]
    common: CommonArg,
    /// Dataset to query
    #[arg(long, default_value_t = DEFAULT_TEMPORAL_DATASET_ID)]
    dataset_id: u32,
    /// Concept of interest
    #[arg(long)]
    concept_id: u64,
    /// Minimum Jaccard similarity
    #[arg(long)]
    threshold: Option<f64>,
    /// Maximum number of results per bin width
    #[arg(long)]
    limit: Option<usize>,
    #[clap(flatten)]
    related: RelatedArg,
}

#[derive(Debug, Serialize)]
struct WidthView<'a> {
    concept_of_interest: AgeCountsView<'a>,
    similar: Vec<AgeCountsView<'a>>,
}

pub(crate) fn run(arg: &SimilarAgesArg) -> anyhow::Result<()> {
    let SimilarAgesArg {
        common,
        dataset_id,
        concept_id,
        threshold,
        limit,
        related,
    } = arg;

    let (counts, mut config) = common.load()?;
    if let Some(threshold) = threshold {
        config.similarity.threshold = *threshold;
    }
    if let Some(limit) = limit {
        config.similarity.limit = *limit;
    }
    related.apply(&mut config.similarity.exclude_related);
    let config = validated(config)?;

    eprintln!("Searching for age distributions similar to concept {concept_id}...");
    let result = find_similar_age_distributions(
        &counts,
        DatasetId(*dataset_id),
        ConceptId(*concept_id),
        &config.similarity,
        &config.suppression,
    );
    if result.is_empty() {
        eprintln!("Concept {concept_id} has no age distribution");
    } else {
        eprintln!("Found {} similar distributions", result.iter().count());
    }

    let views: BTreeMap<u32, WidthView<'_>> = result
        .concept_of_interest
        .iter()
        .map(|(&width, coi)| {
            let similar = result
                .similar
                .get(&width)
                .into_iter()
                .flatten()
                .map(|r| AgeCountsView::new(&r.distribution, config.confidence, Some(r.similarity)))
                .collect();
            let view = WidthView {
                concept_of_interest: AgeCountsView::new(coi, config.confidence, None),
                similar,
            };
            (width, view)
        })
        .collect();
    Output::save_json(&views, common.output.as_deref())?;
    Ok(())
}
