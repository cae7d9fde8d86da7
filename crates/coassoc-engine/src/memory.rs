//! An in-memory [`CountSource`], loadable from a JSON snapshot.
//!
//! # Snapshot format
//!
//! ```json
//! {
//!   "concepts": [{ "concept_id": 1, "concept_name": "Influenza" }],
//!   "datasets": [{
//!     "dataset_id": 4,
//!     "population": 10000,
//!     "total_pairs": 52,
//!     "concept_counts": [{ "concept_id": 1, "concept_count": 300 }],
//!     "pair_counts": [{ "concept_id_1": 1, "concept_id_2": 2, "concept_count": 100 }],
//!     "age_counts": [{ "concept_id": 1, "bin_width": 5, "counts": [10, 1, 20] }],
//!     "delta_counts": [{
//!       "concept_id_1": 1, "concept_id_2": 2, "bin_width": 1, "n": 1, "counts": [3, 80, 10]
//!     }]
//!   }]
//! }
//! ```
//!
//! Delta rows may be given in either concept order; rows whose first id is
//! the larger one are reversed on load.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    ConceptId, ConceptPair, DatasetId,
    source::{AgeRows, CountSource, DeltaRows},
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "CountSnapshot")]
pub struct InMemoryCounts {
    concept_names: BTreeMap<ConceptId, String>,
    datasets: BTreeMap<DatasetId, DatasetCounts>,
}

#[derive(Debug, Clone, Default)]
struct DatasetCounts {
    population: Option<u64>,
    total_pairs: Option<u64>,
    concepts: BTreeMap<ConceptId, u64>,
    pairs: BTreeMap<(ConceptId, ConceptId), u64>,
    age: BTreeMap<ConceptId, AgeRows>,
    deltas: BTreeMap<(ConceptId, ConceptId), DeltaRows>,
}

fn pair_key(a: ConceptId, b: ConceptId) -> (ConceptId, ConceptId) {
    let (first, second, _) = ConceptPair::new(a, b).storage_order();
    (first, second)
}

impl InMemoryCounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn dataset_mut(&mut self, dataset: DatasetId) -> &mut DatasetCounts {
        self.datasets.entry(dataset).or_default()
    }

    pub fn set_population(&mut self, dataset: DatasetId, population: u64) {
        self.dataset_mut(dataset).population = Some(population);
    }

    pub fn set_total_pairs(&mut self, dataset: DatasetId, total_pairs: u64) {
        self.dataset_mut(dataset).total_pairs = Some(total_pairs);
    }

    pub fn insert_concept(&mut self, dataset: DatasetId, concept: ConceptId, name: &str, count: u64) {
        self.concept_names.insert(concept, name.to_owned());
        self.dataset_mut(dataset).concepts.insert(concept, count);
    }

    pub fn insert_pair(&mut self, dataset: DatasetId, a: ConceptId, b: ConceptId, count: u64) {
        self.dataset_mut(dataset).pairs.insert(pair_key(a, b), count);
    }

    pub fn insert_age_rows(
        &mut self,
        dataset: DatasetId,
        concept: ConceptId,
        bin_width: u32,
        counts: Vec<u64>,
    ) {
        self.dataset_mut(dataset)
            .age
            .insert(concept, AgeRows { bin_width, counts });
    }

    /// Stores delta rows measured from `source` to `target`.
    ///
    /// Rows are kept with the smaller id first, reversing them if needed.
    pub fn insert_delta_rows(
        &mut self,
        dataset: DatasetId,
        source: ConceptId,
        target: ConceptId,
        bin_width: u32,
        n: usize,
        mut counts: Vec<u64>,
    ) {
        let (first, second, swapped) = ConceptPair::new(source, target).storage_order();
        if swapped {
            counts.reverse();
        }
        self.dataset_mut(dataset)
            .deltas
            .insert((first, second), DeltaRows { bin_width, n, counts });
    }

    /// Datasets present in the store, in ascending order.
    pub fn datasets(&self) -> impl Iterator<Item = DatasetId> + '_ {
        self.datasets.keys().copied()
    }
}

impl CountSource for InMemoryCounts {
    fn concept_count(&self, dataset: DatasetId, concept: ConceptId) -> Option<u64> {
        self.datasets.get(&dataset)?.concepts.get(&concept).copied()
    }

    fn concept_name(&self, concept: ConceptId) -> Option<&str> {
        self.concept_names.get(&concept).map(String::as_str)
    }

    fn pair_count(&self, dataset: DatasetId, a: ConceptId, b: ConceptId) -> Option<u64> {
        self.datasets.get(&dataset)?.pairs.get(&pair_key(a, b)).copied()
    }

    fn population(&self, dataset: DatasetId) -> Option<u64> {
        self.datasets.get(&dataset)?.population
    }

    fn total_pairs(&self, dataset: DatasetId) -> Option<u64> {
        self.datasets.get(&dataset)?.total_pairs
    }

    fn paired_concepts(&self, dataset: DatasetId, concept: ConceptId) -> Vec<ConceptId> {
        let Some(counts) = self.datasets.get(&dataset) else {
            return vec![];
        };
        let mut partners: Vec<_> = counts
            .pairs
            .keys()
            .filter_map(|&(a, b)| {
                if a == concept {
                    Some(b)
                } else if b == concept {
                    Some(a)
                } else {
                    None
                }
            })
            .collect();
        partners.sort_unstable();
        partners
    }

    fn age_concepts(&self, dataset: DatasetId) -> Vec<ConceptId> {
        self.datasets
            .get(&dataset)
            .map(|counts| counts.age.keys().copied().collect())
            .unwrap_or_default()
    }

    fn age_rows(&self, dataset: DatasetId, concept: ConceptId) -> Option<AgeRows> {
        self.datasets.get(&dataset)?.age.get(&concept).cloned()
    }

    fn delta_rows(
        &self,
        dataset: DatasetId,
        first: ConceptId,
        second: ConceptId,
    ) -> Option<DeltaRows> {
        if first >= second {
            return None;
        }
        self.datasets.get(&dataset)?.deltas.get(&(first, second)).cloned()
    }
}

/// JSON layout of [`InMemoryCounts`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountSnapshot {
    #[serde(default)]
    pub concepts: Vec<ConceptRecord>,
    #[serde(default)]
    pub datasets: Vec<DatasetSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConceptRecord {
    pub concept_id: ConceptId,
    pub concept_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSnapshot {
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub population: Option<u64>,
    #[serde(default)]
    pub total_pairs: Option<u64>,
    #[serde(default)]
    pub concept_counts: Vec<ConceptCountRecord>,
    #[serde(default)]
    pub pair_counts: Vec<PairCountRecord>,
    #[serde(default)]
    pub age_counts: Vec<AgeRecord>,
    #[serde(default)]
    pub delta_counts: Vec<DeltaRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConceptCountRecord {
    pub concept_id: ConceptId,
    pub concept_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairCountRecord {
    pub concept_id_1: ConceptId,
    pub concept_id_2: ConceptId,
    pub concept_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgeRecord {
    pub concept_id: ConceptId,
    #[serde(flatten)]
    pub rows: AgeRows,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeltaRecord {
    pub concept_id_1: ConceptId,
    pub concept_id_2: ConceptId,
    #[serde(flatten)]
    pub rows: DeltaRows,
}

impl From<CountSnapshot> for InMemoryCounts {
    fn from(snapshot: CountSnapshot) -> Self {
        let mut counts = Self::new();
        for concept in snapshot.concepts {
            counts
                .concept_names
                .insert(concept.concept_id, concept.concept_name);
        }
        for dataset in snapshot.datasets {
            let id = dataset.dataset_id;
            let entry = counts.dataset_mut(id);
            entry.population = dataset.population;
            entry.total_pairs = dataset.total_pairs;
            for record in dataset.concept_counts {
                entry.concepts.insert(record.concept_id, record.concept_count);
            }
            for record in dataset.pair_counts {
                entry.pairs.insert(
                    pair_key(record.concept_id_1, record.concept_id_2),
                    record.concept_count,
                );
            }
            for record in dataset.age_counts {
                entry.age.insert(record.concept_id, record.rows);
            }
            for record in dataset.delta_counts {
                let DeltaRows { bin_width, n, counts: rows } = record.rows;
                counts.insert_delta_rows(
                    id,
                    record.concept_id_1,
                    record.concept_id_2,
                    bin_width,
                    n,
                    rows,
                );
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "concepts": [
            { "concept_id": 1, "concept_name": "Influenza" },
            { "concept_id": 2, "concept_name": "Oseltamivir" }
        ],
        "datasets": [{
            "dataset_id": 4,
            "population": 10000,
            "concept_counts": [
                { "concept_id": 1, "concept_count": 300 },
                { "concept_id": 2, "concept_count": 120 }
            ],
            "pair_counts": [{ "concept_id_1": 2, "concept_id_2": 1, "concept_count": 100 }],
            "age_counts": [{ "concept_id": 2, "bin_width": 5, "counts": [10, 1, 20] }],
            "delta_counts": [{
                "concept_id_1": 2, "concept_id_2": 1, "bin_width": 1, "n": 1, "counts": [3, 80, 10]
            }]
        }]
    }"#;

    #[test]
    fn test_load_snapshot() {
        let counts: InMemoryCounts = serde_json::from_str(SNAPSHOT).unwrap();
        let dataset = DatasetId(4);
        assert_eq!(counts.datasets().collect::<Vec<_>>(), [dataset]);
        assert_eq!(counts.population(dataset), Some(10000));
        assert_eq!(counts.total_pairs(dataset), None);
        assert_eq!(counts.concept_name(ConceptId(2)), Some("Oseltamivir"));
        assert_eq!(counts.concept_count(dataset, ConceptId(1)), Some(300));
        assert_eq!(counts.pair_count(dataset, ConceptId(1), ConceptId(2)), Some(100));
        assert_eq!(counts.pair_count(dataset, ConceptId(2), ConceptId(1)), Some(100));
        assert_eq!(counts.age_concepts(dataset), [ConceptId(2)]);
        assert_eq!(counts.paired_concepts(dataset, ConceptId(2)), [ConceptId(1)]);
    }

    #[test]
    fn test_delta_rows_are_stored_smaller_id_first() {
        let counts: InMemoryCounts = serde_json::from_str(SNAPSHOT).unwrap();
        let dataset = DatasetId(4);
        let rows = counts.delta_rows(dataset, ConceptId(1), ConceptId(2)).unwrap();
        assert_eq!(rows.counts, [10, 80, 3]);
        assert!(counts.delta_rows(dataset, ConceptId(2), ConceptId(1)).is_none());
    }

    #[test]
    fn test_unknown_dataset_is_empty() {
        let counts = InMemoryCounts::new();
        let dataset = DatasetId(9);
        assert_eq!(counts.population(dataset), None);
        assert!(counts.paired_concepts(dataset, ConceptId(1)).is_empty());
        assert!(counts.age_concepts(dataset).is_empty());
    }
}
