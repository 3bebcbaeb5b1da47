use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Clusters as produced by a clusterer, keyed by an opaque cluster id. Being a
/// BTreeMap, iteration is always in sorted key order.
pub type RawClusters = BTreeMap<String, BTreeSet<String>>;

/// Prefixes shorter than this are too ambiguous to name a cluster after.
pub const MIN_PREFIX_LENGTH: usize = 3;

/// Name given to clusters whose members carry no usable prefix.
pub const DEFAULT_CLUSTER_NAME: &str = "cluster";

/// Clusters keyed by their final name, kept in the order they were named.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NamedClusters {
    entries: Vec<(String, BTreeSet<String>)>,
    index: HashMap<String, usize>,
}

impl NamedClusters {
    pub fn new() -> NamedClusters {
        NamedClusters::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.index.get(name).map(|i| &self.entries[*i].1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.entries
            .iter()
            .map(|(name, members)| (name.as_str(), members))
    }

    /// Append a cluster under a name that must not already be in use.
    pub fn insert(&mut self, name: String, members: BTreeSet<String>) {
        assert!(
            !self.index.contains_key(&name),
            "Programming error: cluster name {} assigned twice",
            name
        );
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, members));
    }

    /// Take an existing cluster out and append it again under `new_name`, so
    /// it moves to the end of the naming order.
    fn rename_to_end(&mut self, old_name: &str, new_name: String) {
        let position = self
            .index
            .remove(old_name)
            .unwrap_or_else(|| panic!("Programming error: no cluster named {}", old_name));
        let (_, members) = self.entries.remove(position);
        for (i, (name, _)) in self.entries.iter().enumerate().skip(position) {
            self.index.insert(name.clone(), i);
        }
        self.insert(new_name, members);
    }
}

/// How many times each base name has been handed out during one naming pass.
#[derive(Debug, Default)]
pub struct NameCounter {
    counts: HashMap<String, usize>,
}

impl NameCounter {
    pub fn new() -> NameCounter {
        NameCounter::default()
    }

    /// Add a cluster to `named` under a unique name derived from `base_name`.
    ///
    /// The first cluster given a base name is stored unsuffixed. When a second
    /// cluster arrives with the same base name, the first is demoted to
    /// `base_1` and moved to the end, directly followed by the new `base_2`;
    /// later ones continue the numbering. Returns the name assigned to this
    /// cluster.
    pub fn assign(
        &mut self,
        base_name: &str,
        members: BTreeSet<String>,
        named: &mut NamedClusters,
    ) -> String {
        let name = match self.counts.get_mut(base_name) {
            None => {
                self.counts.insert(base_name.to_string(), 1);
                base_name.to_string()
            }
            Some(count) => {
                if *count == 1 && named.contains(base_name) {
                    let demoted = format!("{}_1", base_name);
                    debug!("Renaming cluster {} to {}", base_name, demoted);
                    named.rename_to_end(base_name, demoted);
                }
                *count += 1;
                format!("{}_{}", base_name, count)
            }
        };
        named.insert(name.clone(), members);
        name
    }
}

/// Give each raw cluster a short unique name based on the prefixes (text
/// before the first '.') of its members. Raw clusters are named in sorted key
/// order, so the result depends only on the input contents.
pub fn rename_clusters(raw_clusters: &RawClusters) -> NamedClusters {
    let mut counter = NameCounter::new();
    let mut named = NamedClusters::new();

    for (raw_key, members) in raw_clusters {
        let base_name = base_cluster_name(members);
        let name = counter.assign(&base_name, members.clone(), &mut named);
        trace!("Raw cluster {} named {}", raw_key, name);
    }

    debug!("Named {} clusters", named.len());
    named
}

fn prefix_frequencies(members: &BTreeSet<String>) -> BTreeMap<&str, usize> {
    let mut frequencies = BTreeMap::new();
    for member in members {
        if let Some((prefix, _)) = member.split_once('.') {
            if prefix.chars().count() >= MIN_PREFIX_LENGTH {
                *frequencies.entry(prefix).or_insert(0) += 1;
            }
        }
    }
    frequencies
}

/// Longest run of leading characters shared by every string.
fn common_prefix<'a>(strings: &[&'a str]) -> &'a str {
    let first = match strings.first() {
        Some(s) => *s,
        None => return "",
    };
    let mut end = first.len();
    for other in &strings[1..] {
        let shared: usize = first
            .chars()
            .zip(other.chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum();
        end = end.min(shared);
    }
    &first[..end]
}

/// Base name for one cluster, before any collision suffix is added.
pub fn base_cluster_name(members: &BTreeSet<String>) -> String {
    let frequencies = prefix_frequencies(members);

    match frequencies.len() {
        0 => DEFAULT_CLUSTER_NAME.to_string(),
        1 => {
            let (prefix, count) = frequencies
                .iter()
                .next()
                .expect("Programming error: one prefix expected");
            if *count < members.len() {
                format!("{}+", prefix)
            } else {
                prefix.to_string()
            }
        }
        _ => {
            let prefixes: Vec<&str> = frequencies.keys().copied().collect();
            let stem = common_prefix(&prefixes);
            if stem.chars().count() < MIN_PREFIX_LENGTH {
                let max_count = *frequencies
                    .values()
                    .max()
                    .expect("Programming error: no prefix frequencies");
                // Keys are sorted, so the first tied prefix is the smallest.
                let most_frequent: Vec<&str> = frequencies
                    .iter()
                    .filter(|(_, count)| **count == max_count)
                    .map(|(prefix, _)| *prefix)
                    .collect();
                assert!(!most_frequent.is_empty());
                format!("{}+", most_frequent[0])
            } else {
                format!("{}-", stem)
            }
        }
    }
}
