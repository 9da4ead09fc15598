//! Per-drug accumulation and the associative merge used for fan-in.

use std::collections::{hash_map, HashMap, HashSet};

use crate::{
    record::{PrescriberKey, Record},
    Result,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrugAggregate {
    total_cost: f64,
    prescribers: HashSet<PrescriberKey>,
}

impl DrugAggregate {
    /// Full-precision sum; rounding only happens when the report is rendered.
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn prescriber_count(&self) -> usize {
        self.prescribers.len()
    }

    pub fn prescribers(&self) -> &HashSet<PrescriberKey> {
        &self.prescribers
    }

    fn add(&mut self, cost: f64, prescriber: PrescriberKey) {
        self.total_cost += cost;
        self.prescribers.insert(prescriber);
    }

    fn absorb(&mut self, other: DrugAggregate) {
        self.total_cost += other.total_cost;
        self.prescribers.extend(other.prescribers);
    }
}

/// Drug name to [`DrugAggregate`], plus the number of records folded in.
///
/// One map is built per partition and the partial maps are combined with
/// [`AggregateMap::merge`]. The merge is commutative and associative with the
/// empty map as identity, so partials can be combined in any grouping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateMap {
    drugs: HashMap<String, DrugAggregate>,
    records: u64,
}

impl AggregateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&mut self, record: Record) {
        let (drug_name, cost, prescriber) = record.into_parts();
        self.drugs
            .entry(drug_name)
            .or_default()
            .add(cost, prescriber);
        self.records += 1;
    }

    /// Folds a fallible record stream, stopping at the first error.
    pub fn try_from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let mut map = Self::new();
        for record in records {
            map.add_record(record?);
        }
        Ok(map)
    }

    pub fn merge(mut self, mut other: Self) -> Self {
        // fold the smaller map into the larger one
        if self.drugs.len() < other.drugs.len() {
            std::mem::swap(&mut self, &mut other);
        }
        for (drug_name, aggregate) in other.drugs {
            match self.drugs.entry(drug_name) {
                hash_map::Entry::Occupied(mut entry) => entry.get_mut().absorb(aggregate),
                hash_map::Entry::Vacant(entry) => {
                    entry.insert(aggregate);
                }
            }
        }
        self.records += other.records;
        self
    }

    /// Linear fold over `maps` in the order given.
    pub fn merge_all(maps: impl IntoIterator<Item = Self>) -> Self {
        maps.into_iter().fold(Self::new(), Self::merge)
    }

    pub fn get(&self, drug_name: &str) -> Option<&DrugAggregate> {
        self.drugs.get(drug_name)
    }

    pub fn len(&self) -> usize {
        self.drugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty()
    }

    pub fn record_count(&self) -> u64 {
        self.records
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, DrugAggregate> {
        self.drugs.iter()
    }
}

impl IntoIterator for AggregateMap {
    type Item = (String, DrugAggregate);
    type IntoIter = hash_map::IntoIter<String, DrugAggregate>;

    fn into_iter(self) -> Self::IntoIter {
        self.drugs.into_iter()
    }
}

impl Extend<Record> for AggregateMap {
    fn extend<T: IntoIterator<Item = Record>>(&mut self, iter: T) {
        for record in iter {
            self.add_record(record);
        }
    }
}

impl FromIterator<Record> for AggregateMap {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    // Costs are exact binary fractions so sums do not depend on grouping.
    fn records() -> Vec<Record> {
        vec![
            Record::new("Smith", "John", "DrugA", 10.0),
            Record::new("Jones", "Mary", "DrugA", 5.5),
            Record::new("Smith", "John", "DrugB", 20.25),
            Record::new("Smith", "John", "DrugA", 1.25),
            Record::new("Brown", "Ann", "DrugC", 0.5),
            Record::new("Jones", "Mary", "DrugB", 4.0),
            Record::new("Brown", "Ann", "DrugA", 2.0),
            Record::new("Lee", "Kim", "DrugC", 7.75),
        ]
    }

    fn summary(map: &AggregateMap) -> Vec<(String, f64, usize)> {
        let mut rows: Vec<_> = map
            .iter()
            .map(|(drug, agg)| (drug.clone(), agg.total_cost(), agg.prescriber_count()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    #[test]
    fn test_add_record() {
        let map: AggregateMap = records().into_iter().collect();
        assert_eq!(map.len(), 3);
        assert_eq!(map.record_count(), 8);

        let drug_a = map.get("DrugA").unwrap();
        assert_eq!(drug_a.total_cost(), 18.75);
        assert_eq!(drug_a.prescriber_count(), 3);
        assert!(drug_a
            .prescribers()
            .contains(&PrescriberKey::new("Brown", "Ann")));
        assert!(map.get("DrugZ").is_none());
    }

    #[test]
    fn test_repeated_prescriber_counts_once() {
        let map: AggregateMap = (0..5)
            .map(|_| Record::new("Smith", "John", "DrugA", 1.0))
            .collect();
        let drug_a = map.get("DrugA").unwrap();
        assert_eq!(drug_a.prescriber_count(), 1);
        assert_eq!(drug_a.total_cost(), 5.0);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let all = records();
        let whole: AggregateMap = all.iter().cloned().collect();

        for groups in 1..=all.len() {
            let size = all.len().div_ceil(groups);
            let partials: Vec<AggregateMap> = all
                .chunks(size)
                .map(|chunk| chunk.iter().cloned().collect())
                .collect();

            let forward = AggregateMap::merge_all(partials.clone());
            let backward = AggregateMap::merge_all(partials.iter().rev().cloned());
            assert_eq!(summary(&forward), summary(&whole), "groups = {groups}");
            assert_eq!(summary(&backward), summary(&whole), "groups = {groups}");
            assert_eq!(forward.record_count(), whole.record_count());
        }
    }

    #[test]
    fn test_merge_is_associative() {
        let all = records();
        let a: AggregateMap = all[..3].iter().cloned().collect();
        let b: AggregateMap = all[3..5].iter().cloned().collect();
        let c: AggregateMap = all[5..].iter().cloned().collect();

        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.merge(b.merge(c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_empty_map_is_identity() {
        let map: AggregateMap = records().into_iter().collect();
        assert_eq!(map.clone().merge(AggregateMap::new()), map);
        assert_eq!(AggregateMap::new().merge(map.clone()), map);
        assert!(AggregateMap::merge_all(Vec::new()).is_empty());
    }

    #[test]
    fn test_try_from_records_stops_at_error() {
        let stream = vec![
            Ok(Record::new("Smith", "John", "DrugA", 1.0)),
            Err(Error::MalformedRecord {
                path: "in.csv".into(),
                line: 3,
                reason: "bad".to_string(),
            }),
        ];
        let err = AggregateMap::try_from_records(stream).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { line: 3, .. }));
    }
}
