use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::cluster_namer::RawClusters;
use crate::reference_data::ReferenceData;
use crate::{padded_cluster_key, SequenceClusterer};

/// Read a cluster file: one cluster per line, members separated by
/// whitespace. Blank lines are skipped.
pub fn read_clusters_file(clusters_file: &Path) -> Result<Vec<Vec<String>>> {
    let file = File::open(clusters_file)
        .with_context(|| format!("Failed to open clusters file {}", clusters_file.display()))?;
    let mut clusters = vec![];
    for line_res in BufReader::new(file).lines() {
        let line = line_res
            .with_context(|| format!("Failed to read clusters file {}", clusters_file.display()))?;
        let members: Vec<String> = line.split_whitespace().map(|s| s.to_string()).collect();
        if !members.is_empty() {
            clusters.push(members);
        }
    }
    debug!(
        "Read {} clusters from {}",
        clusters.len(),
        clusters_file.display()
    );
    Ok(clusters)
}

/// Key clusters by their 1-based position, rejecting any member that is
/// listed more than once.
pub fn to_raw_clusters(clusters: Vec<Vec<String>>) -> Result<RawClusters> {
    let total = clusters.len();
    let mut seen = BTreeSet::new();
    let mut raw = RawClusters::new();
    for (i, members) in clusters.into_iter().enumerate() {
        let mut member_set = BTreeSet::new();
        for member in members {
            if !seen.insert(member.clone()) {
                bail!("Sequence {} found more than once in clusters file", member);
            }
            member_set.insert(member);
        }
        raw.insert(padded_cluster_key(i + 1, total), member_set);
    }
    Ok(raw)
}

/// Clusters given by the user instead of being computed. Names may be the
/// input names or the renamed ones.
pub struct PrecomputedClusterer {
    pub clusters_file: PathBuf,
}

impl SequenceClusterer for PrecomputedClusterer {
    fn method_name(&self) -> &str {
        "precomputed clusters file"
    }

    fn cluster(&self, refdata: &ReferenceData, _outprefix: &Path) -> Result<RawClusters> {
        let mut resolved = vec![];
        for members in read_clusters_file(&self.clusters_file)? {
            let mut current = vec![];
            for member in members {
                match refdata.current_name(&member) {
                    None => bail!(
                        "Sequence {} in clusters file {} not found in the input sequences",
                        member,
                        self.clusters_file.display()
                    ),
                    Some(name) if refdata.was_removed(name) => {
                        warn!(
                            "Sequence {} in clusters file was removed by the sanity checks, ignoring it",
                            member
                        );
                    }
                    Some(name) => current.push(name.to_string()),
                }
            }
            if !current.is_empty() {
                resolved.push(current);
            }
        }
        let raw = to_raw_clusters(resolved)?;

        let clustered: BTreeSet<&String> = raw.values().flatten().collect();
        if let Some(missing) = refdata.names().find(|name| !clustered.contains(name)) {
            bail!(
                "Sequence {} was not found in clusters file {}",
                missing,
                self.clusters_file.display()
            );
        }
        info!("Read {} clusters from clusters file", raw.len());
        Ok(raw)
    }
}

/// No clustering: every sequence is a cluster of its own, keyed by its name.
pub struct SingletonClusterer;

impl SequenceClusterer for SingletonClusterer {
    fn method_name(&self) -> &str {
        "no clustering"
    }

    fn cluster(&self, refdata: &ReferenceData, _outprefix: &Path) -> Result<RawClusters> {
        let raw: BTreeMap<String, BTreeSet<String>> = refdata
            .names()
            .map(|name| {
                let mut members = BTreeSet::new();
                members.insert(name.clone());
                (name.clone(), members)
            })
            .collect();
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic_code::GeneticCode;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn refdata(dir: &Path) -> ReferenceData {
        let fasta = dir.join("in.fa");
        std::fs::write(
            &fasta,
            ">a|1\nACGT\n>b.1\nACGT\n>b.2\nACGT\n>c.1\nACGTR\n",
        )
        .unwrap();
        let mut data =
            ReferenceData::load(&[fasta], &[], 6, 10000, GeneticCode::new(11).unwrap()).unwrap();
        data.rename_sequences(&dir.join("rename")).unwrap();
        data.sanity_check(&dir.join("filter")).unwrap();
        data
    }

    #[test]
    fn test_to_raw_clusters_keys_sort_numerically() {
        init();
        let clusters: Vec<Vec<String>> = (0..11).map(|i| vec![format!("s{}", i)]).collect();
        let raw = to_raw_clusters(clusters).unwrap();
        let keys: Vec<&str> = raw.keys().map(|k| k.as_str()).collect();
        assert_eq!("01", keys[0]);
        assert_eq!("11", keys[10]);
        assert_eq!(Some(&set(&["s1"])), raw.get("02"));
    }

    #[test]
    fn test_to_raw_clusters_duplicate() {
        init();
        assert!(to_raw_clusters(vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "a".to_string()]
        ])
        .is_err());
    }

    #[test]
    fn test_precomputed_clusterer() {
        init();
        let td = tempfile::TempDir::new().unwrap();
        let data = refdata(td.path());
        let clusters_file = td.path().join("clusters");
        std::fs::write(&clusters_file, "a|1 b.1\n\n b.2\tc.1\n").unwrap();

        let raw = PrecomputedClusterer { clusters_file }
            .cluster(&data, &td.path().join("02.cdhit"))
            .unwrap();
        let mut expected = RawClusters::new();
        expected.insert("1".to_string(), set(&["a_1", "b.1"]));
        expected.insert("2".to_string(), set(&["b.2"]));
        assert_eq!(expected, raw);
    }

    #[test]
    fn test_precomputed_clusterer_missing_sequence() {
        init();
        let td = tempfile::TempDir::new().unwrap();
        let data = refdata(td.path());
        let clusters_file = td.path().join("clusters");
        std::fs::write(&clusters_file, "a_1 b.1\n").unwrap();
        assert!(PrecomputedClusterer { clusters_file }
            .cluster(&data, &td.path().join("02.cdhit"))
            .is_err());
    }

    #[test]
    fn test_precomputed_clusterer_unknown_sequence() {
        init();
        let td = tempfile::TempDir::new().unwrap();
        let data = refdata(td.path());
        let clusters_file = td.path().join("clusters");
        std::fs::write(&clusters_file, "a_1 b.1 b.2 zzz\n").unwrap();
        assert!(PrecomputedClusterer { clusters_file }
            .cluster(&data, &td.path().join("02.cdhit"))
            .is_err());
    }

    #[test]
    fn test_singleton_clusterer() {
        init();
        let td = tempfile::TempDir::new().unwrap();
        let data = refdata(td.path());
        let raw = SingletonClusterer
            .cluster(&data, &td.path().join("02.cdhit"))
            .unwrap();
        assert_eq!(3, raw.len());
        assert_eq!(Some(&set(&["a_1"])), raw.get("a_1"));
    }
}
