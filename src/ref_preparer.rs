use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::cdhit::CdhitClusterer;
use crate::cluster_namer::rename_clusters;
use crate::cluster_output::{write_cluster_mapping, write_cluster_table_file};
use crate::genetic_code::GeneticCode;
use crate::precomputed_clusters::{PrecomputedClusterer, SingletonClusterer};
use crate::reference_data::ReferenceData;
use crate::{path_with_suffix, SequenceClusterer};

/// How raw clusters are obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusteringMethod {
    Cdhit {
        /// Fraction, not percentage
        seq_identity_threshold: f32,
        /// Fraction, not percentage
        length_diff_cutoff: f32,
    },
    NoClustering,
    ClustersFile(PathBuf),
}

/// Settings for preparing one reference dataset.
#[derive(Debug, Clone)]
pub struct RefPreparer {
    pub fasta_files: Vec<PathBuf>,
    pub metadata_files: Vec<PathBuf>,
    pub version_report_lines: Vec<String>,
    pub min_gene_length: usize,
    pub max_gene_length: usize,
    pub genetic_code: GeneticCode,
    pub clustering_method: ClusteringMethod,
    pub threads: usize,
}

impl RefPreparer {
    fn clusterer(&self) -> Box<dyn SequenceClusterer> {
        match &self.clustering_method {
            ClusteringMethod::Cdhit {
                seq_identity_threshold,
                length_diff_cutoff,
            } => Box::new(CdhitClusterer {
                seq_identity_threshold: *seq_identity_threshold,
                length_diff_cutoff: *length_diff_cutoff,
                threads: self.threads,
            }),
            ClusteringMethod::NoClustering => Box::new(SingletonClusterer),
            ClusteringMethod::ClustersFile(path) => Box::new(PrecomputedClusterer {
                clusters_file: path.clone(),
            }),
        }
    }

    fn write_version_info(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        );
        let command_line: Vec<String> = std::env::args().collect();
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        writeln!(writer, "refprep run with this command:")?;
        writeln!(writer, "{}", command_line.join(" "))?;
        writeln!(writer, "from this directory: {}", cwd.display())?;
        writeln!(writer)?;
        for line in &self.version_report_lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_info_file(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        );
        for fasta in &self.fasta_files {
            writeln!(writer, "input fasta file:\t{}", fasta.display())?;
        }
        for tsv in &self.metadata_files {
            writeln!(writer, "input tsv file:\t{}", tsv.display())?;
        }
        writeln!(writer, "genetic_code\t{}", self.genetic_code.number())?;
        writer.flush()?;
        Ok(())
    }

    /// Prepare the reference data into `outdir`, which must not exist yet.
    pub fn run(&self, outdir: &Path) -> Result<()> {
        if outdir.exists() {
            bail!(
                "Output directory {} already exists. Cannot continue",
                outdir.display()
            );
        }
        std::fs::create_dir(outdir).with_context(|| {
            format!(
                "Error making output directory {}. Cannot continue",
                outdir.display()
            )
        })?;

        self.write_version_info(&outdir.join("00.version_info.txt"))?;
        self.write_info_file(&outdir.join("00.info.txt"))?;

        info!("Loading and checking input data ..");
        let mut refdata = ReferenceData::load(
            &self.fasta_files,
            &self.metadata_files,
            self.min_gene_length,
            self.max_gene_length,
            self.genetic_code,
        )?;
        refdata.rename_sequences(&outdir.join("00.rename_info"))?;
        refdata.sanity_check(&outdir.join("01.filter"))?;

        let cdhit_outprefix = outdir.join("02.cdhit");
        refdata.write_sequences(&path_with_suffix(&cdhit_outprefix, ".all.fa"), None)?;
        let (coding, noncoding): (Vec<&str>, Vec<&str>) = refdata
            .names()
            .map(|name| name.as_str())
            .partition(|name| refdata.is_coding(name));
        refdata.write_sequences(
            &path_with_suffix(&cdhit_outprefix, ".gene.fa"),
            Some(&coding[..]),
        )?;
        refdata.write_sequences(
            &path_with_suffix(&cdhit_outprefix, ".noncoding.fa"),
            Some(&noncoding[..]),
        )?;

        let clusterer = self.clusterer();
        info!("Clustering sequences by {} ..", clusterer.method_name());
        let raw_clusters = clusterer.cluster(&refdata, &cdhit_outprefix)?;

        let clusters = rename_clusters(&raw_clusters);
        info!("Writing clusters to file. {} in total", clusters.len());
        write_cluster_table_file(
            &clusters,
            &path_with_suffix(&cdhit_outprefix, ".clusters.tsv"),
        )?;
        write_cluster_mapping(
            &clusters,
            &path_with_suffix(&cdhit_outprefix, ".clusters.json"),
        )?;
        Ok(())
    }
}
