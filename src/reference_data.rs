use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;

use crate::genetic_code::{reverse_complement, GeneticCode};
use crate::path_with_suffix;
use crate::sequence_metadata::{self, MetadataRow, SequenceMetadata, Variant};

/// Reference sequences and their metadata, keyed by (current) sequence name.
#[derive(Debug)]
pub struct ReferenceData {
    sequences: BTreeMap<String, Vec<u8>>,
    metadata: BTreeMap<String, SequenceMetadata>,
    /// Original input name to current name, for every sequence ever loaded.
    renames: BTreeMap<String, String>,
    /// Current names of sequences dropped by the sanity check.
    removed: BTreeSet<String>,
    min_gene_length: usize,
    max_gene_length: usize,
    genetic_code: GeneticCode,
}

#[derive(Debug, PartialEq)]
enum GeneCheck {
    Pass,
    ReverseComplemented(Vec<u8>),
    Fail(String),
}

fn read_fasta_file(path: &Path, sequences: &mut BTreeMap<String, Vec<u8>>) -> Result<()> {
    let mut reader = needletail::parse_fastx_file(path)
        .with_context(|| format!("Failed to open FASTA file {}", path.display()))?;
    let mut num_read = 0usize;
    while let Some(record) = reader.next() {
        let record =
            record.with_context(|| format!("Failed to parse FASTA file {}", path.display()))?;
        let header = String::from_utf8_lossy(record.id());
        let name = match header.split_whitespace().next() {
            Some(n) => n.to_string(),
            None => bail!("Found a sequence with an empty name in {}", path.display()),
        };
        if sequences.contains_key(&name) {
            bail!(
                "Sequence name {} found more than once in the input FASTA files (seen again in {})",
                name,
                path.display()
            );
        }
        sequences.insert(name, record.seq().to_ascii_uppercase());
        num_read += 1;
    }
    debug!("Read {} sequences from {}", num_read, path.display());
    Ok(())
}

fn is_allowed_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'
}

fn sanitise_name(name: &str) -> String {
    name.chars()
        .map(|c| if is_allowed_name_char(c) { c } else { '_' })
        .collect()
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<File>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quote_style(csv::QuoteStyle::Never)
        .from_path(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))
}

fn check_gene(
    seq: &[u8],
    metadata: &SequenceMetadata,
    min_gene_length: usize,
    max_gene_length: usize,
    genetic_code: &GeneticCode,
) -> GeneCheck {
    if let Some(bad) = seq.iter().find(|b| !b"ACGTN".contains(*b)) {
        return GeneCheck::Fail(format!(
            "Contains non-ACGTN character '{}'",
            *bad as char
        ));
    }
    if !metadata.coding {
        return GeneCheck::Pass;
    }
    if seq.len() < min_gene_length || seq.len() > max_gene_length {
        return GeneCheck::Fail(format!(
            "Length {} is outside the allowed range {}-{}",
            seq.len(),
            min_gene_length,
            max_gene_length
        ));
    }
    if genetic_code.is_complete_orf(seq) {
        return GeneCheck::Pass;
    }
    let revcomp = reverse_complement(seq);
    if genetic_code.is_complete_orf(&revcomp) {
        GeneCheck::ReverseComplemented(revcomp)
    } else {
        GeneCheck::Fail(
            "Not a complete gene: needs a start codon, a stop codon at the end only \
             and a length that is a multiple of 3"
                .to_string(),
        )
    }
}

fn check_variant(
    variant: &Variant,
    seq: &[u8],
    coding: bool,
    genetic_code: &GeneticCode,
) -> std::result::Result<(), String> {
    let residues = match coding {
        true => genetic_code.translate(seq),
        false => seq.to_vec(),
    };
    if variant.position > residues.len() {
        return Err(format!(
            "Position {} is beyond the end of the {} long sequence",
            variant.position,
            residues.len()
        ));
    }
    let found = residues[variant.position - 1] as char;
    if found != variant.reference {
        return Err(format!(
            "Reference is {}, not {}, at position {}",
            found, variant.reference, variant.position
        ));
    }
    if variant.alternative == variant.reference {
        return Err("Reference and alternative are the same".to_string());
    }
    Ok(())
}

/// Outcome of checking one sequence and its metadata.
#[derive(Debug)]
struct SequenceCheck {
    name: String,
    gene: GeneCheck,
    kept_rows: Vec<MetadataRow>,
    failed_rows: Vec<(MetadataRow, String)>,
}

impl ReferenceData {
    pub fn load(
        fasta_files: &[PathBuf],
        metadata_files: &[PathBuf],
        min_gene_length: usize,
        max_gene_length: usize,
        genetic_code: GeneticCode,
    ) -> Result<ReferenceData> {
        let mut sequences = BTreeMap::new();
        for path in fasta_files {
            read_fasta_file(path, &mut sequences)?;
        }
        if sequences.is_empty() {
            bail!("No sequences found in the input FASTA files");
        }

        let mut rows = vec![];
        for path in metadata_files {
            rows.extend(sequence_metadata::read_metadata_file(path)?);
        }
        let mut metadata = sequence_metadata::group_by_sequence(rows)?;

        let unknown: Vec<String> = metadata
            .keys()
            .filter(|name| !sequences.contains_key(*name))
            .cloned()
            .collect();
        for name in unknown {
            warn!(
                "Metadata given for sequence {}, which is not in the FASTA input. Ignoring it",
                name
            );
            metadata.remove(&name);
        }
        for name in sequences.keys() {
            if !metadata.contains_key(name) {
                warn!(
                    "No metadata found for sequence {}, treating it as non-coding presence/absence",
                    name
                );
                metadata.insert(
                    name.clone(),
                    SequenceMetadata::presence_absence_noncoding(name),
                );
            }
        }

        info!(
            "Loaded {} sequences, {} of them coding",
            sequences.len(),
            metadata.values().filter(|m| m.coding).count()
        );
        let renames = sequences.keys().map(|n| (n.clone(), n.clone())).collect();
        Ok(ReferenceData {
            sequences,
            metadata,
            renames,
            removed: BTreeSet::new(),
            min_gene_length,
            max_gene_length,
            genetic_code,
        })
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.sequences.keys()
    }

    pub fn sequence(&self, name: &str) -> Option<&[u8]> {
        self.sequences.get(name).map(|s| s.as_slice())
    }

    pub fn metadata(&self, name: &str) -> Option<&SequenceMetadata> {
        self.metadata.get(name)
    }

    pub fn is_coding(&self, name: &str) -> bool {
        self.metadata(name).map_or(false, |m| m.coding)
    }

    /// Resolve an input (or already renamed) sequence name to the name now in
    /// use, whether or not the sequence survived the sanity check.
    pub fn current_name<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        match self.renames.get(name) {
            Some(current) => Some(current.as_str()),
            None if self.sequences.contains_key(name) || self.removed.contains(name) => Some(name),
            None => None,
        }
    }

    pub fn was_removed(&self, name: &str) -> bool {
        self.removed.contains(name)
    }

    /// Replace characters that downstream tools choke on with '_', making
    /// names unique again with a numeric suffix where needed. Changed names
    /// are written as old<TAB>new lines.
    pub fn rename_sequences(&mut self, rename_info_file: &Path) -> Result<()> {
        let (unchanged, to_rename): (Vec<String>, Vec<String>) = self
            .sequences
            .keys()
            .cloned()
            .partition(|name| sanitise_name(name) == *name);
        let mut taken: BTreeSet<String> = unchanged.into_iter().collect();

        let mut writer = tsv_writer(rename_info_file)?;
        for old_name in to_rename {
            let sanitised = sanitise_name(&old_name);
            let mut new_name = sanitised.clone();
            let mut i = 1;
            while taken.contains(&new_name) {
                new_name = format!("{}_{}", sanitised, i);
                i += 1;
            }
            info!("Renaming sequence {} to {}", old_name, new_name);
            writer
                .write_record(&[&old_name, &new_name])
                .with_context(|| format!("Failed to write to {}", rename_info_file.display()))?;

            let seq = self
                .sequences
                .remove(&old_name)
                .expect("Programming error: renamed sequence missing");
            self.sequences.insert(new_name.clone(), seq);
            let mut meta = self
                .metadata
                .remove(&old_name)
                .expect("Programming error: renamed sequence has no metadata");
            meta.rename(&new_name);
            self.metadata.insert(new_name.clone(), meta);
            self.renames.insert(old_name, new_name.clone());
            taken.insert(new_name);
        }
        writer.flush()?;
        Ok(())
    }

    /// Remove sequences that are not usable genes and metadata lines whose
    /// variants do not match their sequence, logging the reasons.
    pub fn sanity_check(&mut self, outprefix: &Path) -> Result<()> {
        let min_gene_length = self.min_gene_length;
        let max_gene_length = self.max_gene_length;
        let genetic_code = self.genetic_code;
        let metadata = &self.metadata;

        let checks: Vec<SequenceCheck> = self
            .sequences
            .par_iter()
            .map(|(name, seq)| {
                let meta = &metadata[name];
                let gene = check_gene(seq, meta, min_gene_length, max_gene_length, &genetic_code);
                let mut kept_rows = vec![];
                let mut failed_rows = vec![];
                let final_seq: &[u8] = match &gene {
                    GeneCheck::Pass => seq,
                    GeneCheck::ReverseComplemented(revcomp) => revcomp,
                    GeneCheck::Fail(_) => &[],
                };
                if !matches!(gene, GeneCheck::Fail(_)) {
                    for row in &meta.rows {
                        match &row.variant {
                            None => kept_rows.push(row.clone()),
                            Some(variant) => match check_variant(
                                variant,
                                final_seq,
                                meta.coding,
                                &genetic_code,
                            ) {
                                Ok(()) => kept_rows.push(row.clone()),
                                Err(reason) => failed_rows.push((row.clone(), reason)),
                            },
                        }
                    }
                }
                SequenceCheck {
                    name: name.clone(),
                    gene,
                    kept_rows,
                    failed_rows,
                }
            })
            .collect();

        let genes_log = path_with_suffix(outprefix, ".check_genes.log");
        let metadata_log = path_with_suffix(outprefix, ".check_metadata.log");
        let mut genes_writer = tsv_writer(&genes_log)?;
        let mut metadata_log_writer = tsv_writer(&metadata_log)?;

        let mut num_removed = 0usize;
        for check in checks {
            let mut remove_reason = None;
            match check.gene {
                GeneCheck::Pass => {}
                GeneCheck::ReverseComplemented(revcomp) => {
                    debug!("Reverse complemented sequence {}", check.name);
                    genes_writer.write_record(&[
                        check.name.as_str(),
                        "Reverse complemented to make a gene",
                    ])?;
                    self.sequences.insert(check.name.clone(), revcomp);
                }
                GeneCheck::Fail(reason) => remove_reason = Some(reason),
            }

            for (row, reason) in &check.failed_rows {
                let mut fields = row.to_tsv_fields();
                fields.push(reason.clone());
                metadata_log_writer.write_record(&fields)?;
            }

            let meta = match self.metadata.get_mut(&check.name) {
                Some(m) => m,
                None => bail!("Programming error: no metadata for sequence {}", check.name),
            };
            if remove_reason.is_none() {
                meta.rows = check.kept_rows;
                if meta.variant_only && !meta.has_variants() {
                    remove_reason = Some("Variant only sequence with no usable variants".to_string());
                }
            }

            if let Some(reason) = remove_reason {
                debug!("Removing sequence {}: {}", check.name, reason);
                genes_writer.write_record(&[check.name.as_str(), "Removed", reason.as_str()])?;
                self.sequences.remove(&check.name);
                self.metadata.remove(&check.name);
                self.removed.insert(check.name);
                num_removed += 1;
            }
        }
        genes_writer.flush()?;
        metadata_log_writer.flush()?;

        info!(
            "Sanity check removed {} sequences, {} remain",
            num_removed,
            self.sequences.len()
        );
        if self.sequences.is_empty() {
            bail!("No sequences passed the sanity checks. Cannot continue");
        }

        let metadata_tsv = path_with_suffix(outprefix, ".check_metadata.tsv");
        let mut tsv = tsv_writer(&metadata_tsv)?;
        for meta in self.metadata.values() {
            for row in &meta.rows {
                tsv.write_record(&row.to_tsv_fields())?;
            }
        }
        tsv.flush()?;
        Ok(())
    }

    /// Write the sequences of the given names (all if None) as FASTA.
    pub fn write_sequences(&self, path: &Path, names: Option<&[&str]>) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create FASTA file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let selected: Vec<&str> = match names {
            Some(names) => names.to_vec(),
            None => self.sequences.keys().map(|n| n.as_str()).collect(),
        };
        for name in selected {
            let seq = match self.sequences.get(name) {
                Some(s) => s,
                None => bail!("Programming error: no sequence named {}", name),
            };
            writeln!(writer, ">{}", name)?;
            for line in seq.chunks(60) {
                writer.write_all(line)?;
                writeln!(writer)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}
