use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::cluster_namer::NamedClusters;

/// One cluster as stored in the serialized cluster mapping.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub name: String,
    pub members: BTreeSet<String>,
}

/// Write one line per cluster: the cluster name, then its members, all tab
/// separated.
pub fn write_cluster_table<W: Write>(named: &NamedClusters, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer);
    for (name, members) in named.iter() {
        let mut record = vec![name];
        record.extend(members.iter().map(|m| m.as_str()));
        wtr.write_record(&record)
            .context("Failed to write cluster table")?;
    }
    wtr.flush().context("Failed to write cluster table")?;
    Ok(())
}

pub fn write_cluster_table_file(named: &NamedClusters, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create cluster table {}", path.display()))?;
    write_cluster_table(named, file)
}

/// Serialize the cluster mapping as JSON, keeping cluster order, so that
/// later pipeline stages can load it with `read_cluster_mapping`.
pub fn write_cluster_mapping(named: &NamedClusters, path: &Path) -> Result<()> {
    let entries: Vec<ClusterEntry> = named
        .iter()
        .map(|(name, members)| ClusterEntry {
            name: name.to_string(),
            members: members.clone(),
        })
        .collect();
    let file = File::create(path)
        .with_context(|| format!("Failed to create cluster mapping {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &entries)
        .with_context(|| format!("Failed to serialize clusters to {}", path.display()))?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

pub fn read_cluster_mapping(path: &Path) -> Result<NamedClusters> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open cluster mapping {}", path.display()))?;
    let entries: Vec<ClusterEntry> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse cluster mapping {}", path.display()))?;
    let mut named = NamedClusters::new();
    for entry in entries {
        if named.contains(&entry.name) {
            bail!(
                "Cluster name {} found more than once in {}",
                entry.name,
                path.display()
            );
        }
        named.insert(entry.name, entry.members);
    }
    Ok(named)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_namer::{rename_clusters, RawClusters};

    fn named() -> NamedClusters {
        let mut raw = RawClusters::new();
        raw.insert(
            "1".to_string(),
            vec!["geneA.2", "geneA.1"].into_iter().map(String::from).collect(),
        );
        raw.insert(
            "2".to_string(),
            vec!["xyz"].into_iter().map(String::from).collect(),
        );
        raw.insert(
            "3".to_string(),
            vec!["abc"].into_iter().map(String::from).collect(),
        );
        rename_clusters(&raw)
    }

    #[test]
    fn test_write_cluster_table() {
        let mut out = vec![];
        write_cluster_table(&named(), &mut out).unwrap();
        assert_eq!(
            "geneA\tgeneA.1\tgeneA.2\ncluster_1\txyz\ncluster_2\tabc\n",
            String::from_utf8(out).unwrap()
        );
    }

    #[test]
    fn test_cluster_mapping_read_back() {
        let td = tempfile::TempDir::new().unwrap();
        let path = td.path().join("clusters.json");
        let named = named();
        write_cluster_mapping(&named, &path).unwrap();
        let read = read_cluster_mapping(&path).unwrap();
        assert_eq!(
            vec!["geneA", "cluster_1", "cluster_2"],
            read.names().collect::<Vec<_>>()
        );
        assert_eq!(named, read);
    }

    #[test]
    fn test_read_cluster_mapping_duplicate_name() {
        let td = tempfile::TempDir::new().unwrap();
        let path = td.path().join("clusters.json");
        std::fs::write(
            &path,
            r#"[{"name": "a", "members": ["x"]}, {"name": "a", "members": ["y"]}]"#,
        )
        .unwrap();
        assert!(read_cluster_mapping(&path).is_err());
    }
}
