use coassoc_engine::{
    ConceptId, DatasetId,
    association::{AssociationMethod, query_associations},
};

use super::{CommonArg, DEFAULT_DATASET_ID, validated};
use crate::util::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum MethodArg {
    ChiSquare,
    ObsExpRatio,
    RelativeFrequency,
}

impl From<MethodArg> for AssociationMethod {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::ChiSquare => Self::ChiSquare,
            MethodArg::ObsExpRatio => Self::ObsExpRatio,
            MethodArg::RelativeFrequency => Self::RelativeFrequency,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct AssociationArg {
    #[clap(flatten)]
    common: CommonArg,
    /// Association measure
    #[arg(long, value_enum)]
    method: MethodArg,
    /// Dataset to query
    #[arg(long, default_value_t = DEFAULT_DATASET_ID)]
    dataset_id: u32,
    /// Concept to find associations for
    #[arg(long)]
    concept_id: u64,
    /// Restrict to a single partner concept
    #[arg(long)]
    partner_id: Option<u64>,
    /// Bonferroni-adjust chi-square p-values
    #[arg(long)]
    bonferroni: bool,
}

pub(crate) fn run(arg: &AssociationArg) -> anyhow::Result<()> {
    let AssociationArg {
        common,
        method,
        dataset_id,
        concept_id,
        partner_id,
        bonferroni,
    } = arg;

    let (counts, mut config) = common.load()?;
    config.bonferroni |= *bonferroni;
    let config = validated(config)?;

    let method = AssociationMethod::from(*method);
    eprintln!("Computing {method} for concept {concept_id}...");
    let rows = query_associations(
        &counts,
        DatasetId(*dataset_id),
        method,
        ConceptId(*concept_id),
        partner_id.map(ConceptId),
        &config,
    );
    eprintln!("Found {} associations", rows.len());

    Output::save_json(&rows, common.output.as_deref())?;
    Ok(())
}
