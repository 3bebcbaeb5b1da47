pub mod cdhit;
pub mod cluster_namer;
pub mod cluster_output;
pub mod external_command_checker;
pub mod genetic_code;
pub mod precomputed_clusters;
pub mod prepare_argument_parsing;
pub mod ref_preparer;
pub mod reference_data;
pub mod sequence_metadata;

#[macro_use]
extern crate log;
extern crate clap;
extern crate rayon;
#[macro_use]
extern crate lazy_static;

use std::path::{Path, PathBuf};

use crate::cluster_namer::RawClusters;
use crate::reference_data::ReferenceData;

/// Groups reference sequences into raw clusters, prior to naming.
pub trait SequenceClusterer {
    fn method_name(&self) -> &str;

    fn cluster(&self, refdata: &ReferenceData, outprefix: &Path) -> anyhow::Result<RawClusters>;
}

/// A numeric raw cluster key, zero padded so that sorting the keys as strings
/// keeps numeric order.
pub fn padded_cluster_key(index: usize, total: usize) -> String {
    let width = total.to_string().len();
    format!("{:0width$}", index, width = width)
}

/// `prefix` with `suffix` appended to its final component, e.g. 01.filter ->
/// 01.filter.check_genes.log
pub fn path_with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

pub const DEFAULT_MIN_GENE_LENGTH: &str = "6";
pub const DEFAULT_MAX_GENE_LENGTH: &str = "10000";
pub const DEFAULT_GENETIC_CODE: &str = "11";
pub const DEFAULT_CDHIT_MIN_ID: &str = "90";
pub const DEFAULT_CDHIT_MIN_LENGTH: &str = "90";

pub const AUTHOR: &str = "refprep developers";
