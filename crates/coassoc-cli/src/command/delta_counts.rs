use std::path::PathBuf;

use coassoc_engine::{
    ConceptId, ConceptPair, DatasetId, interval::ConfidenceInterval,
    source::delta_distributions, temporal::DeltaDistribution,
};
use serde::Serialize;
use serde_json::Value;

use super::{CommonArg, DEFAULT_TEMPORAL_DATASET_ID, validated};
use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct DeltaCountsArg {
    #[clap(flatten)]
    common: CommonArg,
    /// Dataset to query
    #[arg(long, default_value_t = DEFAULT_TEMPORAL_DATASET_ID)]
    dataset_id: u32,
    /// Source concept of a single pair
    #[arg(long, requires = "target", conflicts_with = "pairs")]
    source: Option<u64>,
    /// Target concept of a single pair
    #[arg(long, requires = "source")]
    target: Option<u64>,
    /// JSON file holding an array of `[source, target]` pairs
    #[arg(long)]
    pairs: Option<PathBuf>,
    /// Coarsen to this bin width in days
    #[arg(long, requires = "half_width")]
    bin_width: Option<u32>,
    /// Number of bins on each side of zero after coarsening
    #[arg(long, requires = "bin_width")]
    half_width: Option<usize>,
}

#[derive(Debug, Serialize)]
struct DeltaView {
    #[serde(flatten)]
    delta: DeltaDistribution,
    confidence_interval: Vec<ConfidenceInterval>,
}

/// Reads `[source, target]` items, keeping a `None` for each malformed one.
fn parse_pair(value: &Value) -> Option<ConceptPair> {
    match value.as_array()?.as_slice() {
        [source, target] => Some(ConceptPair::new(
            ConceptId(source.as_u64()?),
            ConceptId(target.as_u64()?),
        )),
        _ => None,
    }
}

pub(crate) fn run(arg: &DeltaCountsArg) -> anyhow::Result<()> {
    let DeltaCountsArg {
        common,
        dataset_id,
        source,
        target,
        pairs,
        bin_width,
        half_width,
    } = arg;

    let requests: Vec<Option<ConceptPair>> = match (source, target, pairs) {
        (Some(source), Some(target), _) => {
            vec![Some(ConceptPair::new(ConceptId(*source), ConceptId(*target)))]
        }
        (_, _, Some(path)) => {
            let items: Vec<Value> = util::read_json_file("pairs", path)?;
            items.iter().map(parse_pair).collect()
        }
        _ => anyhow::bail!("either --source and --target or --pairs is required"),
    };

    let (counts, config) = common.load()?;
    let config = validated(config)?;

    let results = delta_distributions(&counts, DatasetId(*dataset_id), &requests);
    let mut views = Vec::with_capacity(results.len());
    for delta in results {
        let delta = match (delta, bin_width, half_width) {
            (Some(delta), Some(width), Some(n)) => {
                anyhow::ensure!(
                    *width > 0 && *width % delta.bin_width() == 0,
                    "bin width {width} is not a multiple of {}",
                    delta.bin_width()
                );
                anyhow::ensure!(*n > 0, "half-width must be positive");
                Some(delta.conform(*width, *n))
            }
            (delta, _, _) => delta,
        };
        views.push(delta.map(|delta| DeltaView {
            confidence_interval: delta.confidence_intervals(config.confidence),
            delta,
        }));
    }
    eprintln!(
        "Found {} of {} delta distributions",
        views.iter().flatten().count(),
        views.len()
    );

    Output::save_json(&views, common.output.as_deref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_pair_keeps_malformed_positions() {
        let items = json!([[1, 2], "x", [3], [4, -5], [6, 7]]);
        let parsed: Vec<_> = items
            .as_array()
            .unwrap()
            .iter()
            .map(parse_pair)
            .collect();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0], Some(ConceptPair::new(ConceptId(1), ConceptId(2))));
        assert_eq!(parsed[1], None);
        assert_eq!(parsed[2], None);
        assert_eq!(parsed[3], None);
        assert_eq!(parsed[4], Some(ConceptPair::new(ConceptId(6), ConceptId(7))));
    }
}
