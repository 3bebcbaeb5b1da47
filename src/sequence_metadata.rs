use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// A single residue change, e.g. S83F (amino acids) or C100T (nucleotides).
/// Positions are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub reference: char,
    pub position: usize,
    pub alternative: char,
}

impl Variant {
    pub fn parse(s: &str) -> Result<Variant, String> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() < 3 {
            return Err(format!("Variant '{}' is too short", s));
        }
        let reference = chars[0];
        let alternative = chars[chars.len() - 1];
        if !reference.is_ascii_alphabetic()
            || !(alternative.is_ascii_alphabetic() || alternative == '*')
        {
            return Err(format!(
                "Variant '{}' must start with a residue and end with a residue or '*'",
                s
            ));
        }
        let digits: String = chars[1..chars.len() - 1].iter().collect();
        let position = match digits.parse::<usize>() {
            Ok(p) if p > 0 => p,
            _ => return Err(format!("Variant '{}' has an invalid position", s)),
        };
        Ok(Variant {
            reference: reference.to_ascii_uppercase(),
            position,
            alternative: alternative.to_ascii_uppercase(),
        })
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.reference, self.position, self.alternative)
    }
}

/// One line of a metadata TSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub name: String,
    pub coding: bool,
    pub variant_only: bool,
    pub variant: Option<Variant>,
    pub group: Option<String>,
    pub description: String,
}

impl MetadataRow {
    pub fn to_tsv_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            flag_to_str(self.coding).to_string(),
            flag_to_str(self.variant_only).to_string(),
            self.variant
                .as_ref()
                .map_or(".".to_string(), |v| v.to_string()),
            self.group.clone().unwrap_or_else(|| ".".to_string()),
            self.description.clone(),
        ]
    }
}

/// All metadata for one sequence. Every row agrees on the coding and
/// variant-only flags.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceMetadata {
    pub coding: bool,
    pub variant_only: bool,
    pub rows: Vec<MetadataRow>,
}

impl SequenceMetadata {
    /// Metadata for a sequence given without any metadata line.
    pub fn presence_absence_noncoding(name: &str) -> SequenceMetadata {
        SequenceMetadata {
            coding: false,
            variant_only: false,
            rows: vec![MetadataRow {
                name: name.to_string(),
                coding: false,
                variant_only: false,
                variant: None,
                group: None,
                description: ".".to_string(),
            }],
        }
    }

    pub fn has_variants(&self) -> bool {
        self.rows.iter().any(|r| r.variant.is_some())
    }

    pub fn rename(&mut self, new_name: &str) {
        for row in self.rows.iter_mut() {
            row.name = new_name.to_string();
        }
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn flag_to_str(flag: bool) -> &'static str {
    match flag {
        true => "1",
        false => "0",
    }
}

fn optional_field(s: &str) -> Option<String> {
    match s {
        "." | "" => None,
        other => Some(other.to_string()),
    }
}

/// Parse one metadata TSV file. Columns are: sequence name, coding (0/1),
/// variant only (0/1), variant or '.', variant group or '.', free text.
pub fn read_metadata_file(file_path: &Path) -> Result<Vec<MetadataRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .quoting(false)
        .from_path(file_path)
        .with_context(|| format!("Failed to open metadata file {}", file_path.display()))?;

    let mut rows = vec![];
    for (i, result) in rdr.records().enumerate() {
        let record = result
            .with_context(|| format!("Parsing error in metadata file {}", file_path.display()))?;
        let line_number = record.position().map_or(i as u64 + 1, |p| p.line());
        if record.len() != 6 {
            bail!(
                "Expected 6 columns in metadata file {} line {}, found {}",
                file_path.display(),
                line_number,
                record.len()
            );
        }
        let (coding, variant_only) = match (parse_flag(&record[1]), parse_flag(&record[2])) {
            (Some(c), Some(v)) => (c, v),
            _ => bail!(
                "Columns 2 and 3 must be 0 or 1 in metadata file {} line {}",
                file_path.display(),
                line_number
            ),
        };
        let variant = match optional_field(&record[3]) {
            None => None,
            Some(v) => match Variant::parse(&v) {
                Ok(variant) => Some(variant),
                Err(e) => bail!("{} in metadata file {} line {}", e, file_path.display(), line_number),
            },
        };
        trace!("Read metadata line {}: {:?}", line_number, record);
        rows.push(MetadataRow {
            name: record[0].to_string(),
            coding,
            variant_only,
            variant,
            group: optional_field(&record[4]),
            description: record[5].to_string(),
        });
    }
    debug!("Read in {} metadata lines from {}", rows.len(), file_path.display());
    Ok(rows)
}

/// Group metadata rows by sequence name, checking the flags are consistent.
pub fn group_by_sequence(rows: Vec<MetadataRow>) -> Result<BTreeMap<String, SequenceMetadata>> {
    let mut grouped: BTreeMap<String, SequenceMetadata> = BTreeMap::new();
    for row in rows {
        match grouped.get_mut(&row.name) {
            Some(existing) => {
                if existing.coding != row.coding || existing.variant_only != row.variant_only {
                    bail!(
                        "Inconsistent coding/variant only flags in metadata for sequence {}",
                        row.name
                    );
                }
                if row.variant.is_none() && existing.rows.iter().any(|r| r.variant.is_none()) {
                    warn!(
                        "Duplicate presence/absence metadata line for sequence {}, ignoring",
                        row.name
                    );
                    continue;
                }
                existing.rows.push(row);
            }
            None => {
                grouped.insert(
                    row.name.clone(),
                    SequenceMetadata {
                        coding: row.coding,
                        variant_only: row.variant_only,
                        rows: vec![row],
                    },
                );
            }
        }
    }
    Ok(grouped)
}
