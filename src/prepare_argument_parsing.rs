use std::path::PathBuf;

use anyhow::{bail, Result};
use bird_tool_utils::clap_utils::*;
use clap::*;

use crate::external_command_checker;
use crate::genetic_code::{GeneticCode, SUPPORTED_GENETIC_CODES};
use crate::ref_preparer::{ClusteringMethod, RefPreparer};
use crate::{
    DEFAULT_CDHIT_MIN_ID, DEFAULT_CDHIT_MIN_LENGTH, DEFAULT_GENETIC_CODE, DEFAULT_MAX_GENE_LENGTH,
    DEFAULT_MIN_GENE_LENGTH,
};

/// Read a percentage argument, given either as a fraction (0-1) or as a
/// percentage (1-100), returning it as a fraction.
pub fn parse_percentage(m: &clap::ArgMatches, parameter: &str) -> Result<Option<f32>, String> {
    match m.get_one::<f32>(parameter) {
        Some(value) => {
            let mut percentage = *value;
            if (1.0..=100.0).contains(&percentage) {
                percentage /= 100.0;
            } else if !(0.0..=100.0).contains(&percentage) {
                error!("Invalid percentage: '{}'", percentage);
                return Err(format!(
                    "Invalid percentage specified for --{}: '{}'",
                    parameter, percentage
                ));
            }
            debug!("Using {} {}%", parameter, percentage * 100.0);
            Ok(Some(percentage))
        }
        None => Ok(None),
    }
}

fn required_percentage(m: &clap::ArgMatches, parameter: &str) -> Result<f32> {
    match parse_percentage(m, parameter) {
        Ok(Some(fraction)) => Ok(fraction),
        Ok(None) => bail!("Missing value for --{}", parameter),
        Err(e) => bail!(e),
    }
}

/// Turn parsed 'prepare' arguments into a RefPreparer.
pub fn generate_ref_preparer(m: &clap::ArgMatches, version: &str) -> Result<RefPreparer> {
    let fasta_files: Vec<PathBuf> = m
        .get_many::<PathBuf>("fasta")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    let metadata_files: Vec<PathBuf> = m
        .get_many::<PathBuf>("metadata")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();

    let min_gene_length = *m.get_one::<usize>("min-gene-length").unwrap();
    let max_gene_length = *m.get_one::<usize>("max-gene-length").unwrap();
    if min_gene_length > max_gene_length {
        bail!(
            "--min-gene-length ({}) must not be greater than --max-gene-length ({})",
            min_gene_length,
            max_gene_length
        );
    }

    let genetic_code = match GeneticCode::new(*m.get_one::<u8>("genetic-code").unwrap()) {
        Ok(code) => code,
        Err(e) => bail!(e),
    };

    let clustering_method = if m.get_flag("no-cdhit") {
        ClusteringMethod::NoClustering
    } else if let Some(clusters_file) = m.get_one::<PathBuf>("cdhit-clusters") {
        ClusteringMethod::ClustersFile(clusters_file.clone())
    } else {
        ClusteringMethod::Cdhit {
            seq_identity_threshold: required_percentage(m, "cdhit-min-id")?,
            length_diff_cutoff: required_percentage(m, "cdhit-min-length")?,
        }
    };

    Ok(RefPreparer {
        fasta_files,
        metadata_files,
        version_report_lines: vec![format!("refprep version {}", version)],
        min_gene_length,
        max_gene_length,
        genetic_code,
        clustering_method,
        threads: *m.get_one::<usize>("threads").unwrap(),
    })
}

pub fn cdhit_version_report_line(cdhit_version: &str) -> String {
    format!("cd-hit-est version {}", cdhit_version)
}

pub fn run_prepare_subcommand(matches: &clap::ArgMatches, program_name: &str, version: &str) {
    let m = matches.subcommand_matches("prepare").unwrap();
    set_log_level(m, true, program_name, version);

    let num_threads = *m.get_one::<usize>("threads").unwrap();
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .expect("Programming error: rayon initialised multiple times");

    let mut preparer = match generate_ref_preparer(m, version) {
        Ok(p) => p,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };
    if let ClusteringMethod::Cdhit { .. } = preparer.clustering_method {
        match external_command_checker::check_for_dependencies() {
            Ok(cdhit_version) => preparer
                .version_report_lines
                .push(cdhit_version_report_line(&cdhit_version)),
            Err(e) => {
                error!("{:#}", e);
                std::process::exit(1);
            }
        }
    }

    let outdir = m.get_one::<PathBuf>("output-directory").unwrap();
    if let Err(e) = preparer.run(outdir) {
        error!("{:#}", e);
        std::process::exit(1);
    }
    info!("Finished preparing reference data in {}", outdir.display());
}

pub fn add_prepare_subcommand(app: clap::Command) -> clap::Command {
    let genetic_codes: Vec<String> = SUPPORTED_GENETIC_CODES
        .iter()
        .map(|c| c.to_string())
        .collect();

    let prepare_subcommand = add_clap_verbosity_flags(Command::new("prepare"))
        .about("Prepare reference sequences and metadata for AMR variant calling")
        .arg(
            Arg::new("fasta")
                .long("fasta")
                .help("FASTA file(s) of reference sequences")
                .num_args(1..)
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("metadata")
                .long("metadata")
                .help("Tab separated metadata file(s): name, coding (0/1), variant only (0/1), variant, variant group, free text")
                .num_args(1..)
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output-directory")
                .long("output-directory")
                .short('o')
                .help("Output directory, which must not already exist")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("min-gene-length")
                .long("min-gene-length")
                .help("Minimum length in nucleotides of coding sequences")
                .value_parser(value_parser!(usize))
                .default_value(DEFAULT_MIN_GENE_LENGTH),
        )
        .arg(
            Arg::new("max-gene-length")
                .long("max-gene-length")
                .help("Maximum length in nucleotides of coding sequences")
                .value_parser(value_parser!(usize))
                .default_value(DEFAULT_MAX_GENE_LENGTH),
        )
        .arg(
            Arg::new("genetic-code")
                .long("genetic-code")
                .help(format!(
                    "NCBI genetic code used to translate coding sequences. One of {}",
                    genetic_codes.join(", ")
                ))
                .value_parser(value_parser!(u8))
                .default_value(DEFAULT_GENETIC_CODE),
        )
        .arg(
            Arg::new("cdhit-min-id")
                .long("cdhit-min-id")
                .help("Sequence identity threshold for cd-hit-est clustering")
                .value_parser(value_parser!(f32))
                .default_value(DEFAULT_CDHIT_MIN_ID),
        )
        .arg(
            Arg::new("cdhit-min-length")
                .long("cdhit-min-length")
                .help("Length difference cutoff for cd-hit-est clustering")
                .value_parser(value_parser!(f32))
                .default_value(DEFAULT_CDHIT_MIN_LENGTH),
        )
        .arg(
            Arg::new("no-cdhit")
                .long("no-cdhit")
                .help("Do not cluster. Each sequence becomes a cluster of its own")
                .action(ArgAction::SetTrue)
                .conflicts_with("cdhit-clusters"),
        )
        .arg(
            Arg::new("cdhit-clusters")
                .long("cdhit-clusters")
                .help("Use these clusters instead of running cd-hit-est. One cluster per line, sequence names separated by whitespace")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .help("Number of CPU threads to use")
                .value_parser(value_parser!(usize))
                .default_value("1"),
        );

    app.subcommand(prepare_subcommand)
}
