use std::collections::HashMap;

/// Codon order of the NCBI translation table strings: first base TTTT.., then
/// second, then third, each cycling through T, C, A, G.
const BASES: [u8; 4] = [b'T', b'C', b'A', b'G'];

const STANDARD_AMINO_ACIDS: &str =
    "FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";
const MYCOPLASMA_AMINO_ACIDS: &str =
    "FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

const STANDARD_STARTS: &str = "---M------**--*----M---------------M----------------------------";
const MYCOPLASMA_STARTS: &str = "--MM------**-------M------------MMMM---------------M------------";
const BACTERIAL_STARTS: &str = "---M------**--*----M------------MMMM---------------M------------";

pub const SUPPORTED_GENETIC_CODES: [u8; 3] = [1, 4, 11];

struct CodonTable {
    amino_acids: HashMap<[u8; 3], u8>,
    starts: Vec<[u8; 3]>,
}

fn build_table(amino_acids: &str, starts: &str) -> CodonTable {
    let mut table = CodonTable {
        amino_acids: HashMap::new(),
        starts: vec![],
    };
    let mut i = 0;
    for first in BASES.iter() {
        for second in BASES.iter() {
            for third in BASES.iter() {
                let codon = [*first, *second, *third];
                table.amino_acids.insert(codon, amino_acids.as_bytes()[i]);
                if starts.as_bytes()[i] == b'M' {
                    table.starts.push(codon);
                }
                i += 1;
            }
        }
    }
    table
}

lazy_static! {
    static ref TABLES: HashMap<u8, CodonTable> = {
        let mut m = HashMap::new();
        m.insert(1, build_table(STANDARD_AMINO_ACIDS, STANDARD_STARTS));
        m.insert(4, build_table(MYCOPLASMA_AMINO_ACIDS, MYCOPLASMA_STARTS));
        m.insert(11, build_table(STANDARD_AMINO_ACIDS, BACTERIAL_STARTS));
        m
    };
}

/// An NCBI genetic code (translation table).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneticCode {
    number: u8,
}

impl GeneticCode {
    pub fn new(number: u8) -> Result<GeneticCode, String> {
        match TABLES.contains_key(&number) {
            true => Ok(GeneticCode { number }),
            false => Err(format!(
                "Unsupported genetic code {}, expected one of {:?}",
                number, SUPPORTED_GENETIC_CODES
            )),
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    fn table(&self) -> &'static CodonTable {
        &TABLES[&self.number]
    }

    /// Translate each complete codon. Codons containing anything other than
    /// A, C, G or T become 'X'. A trailing partial codon is ignored.
    pub fn translate(&self, seq: &[u8]) -> Vec<u8> {
        let table = self.table();
        seq.chunks_exact(3)
            .map(|codon| {
                let codon = [
                    codon[0].to_ascii_uppercase(),
                    codon[1].to_ascii_uppercase(),
                    codon[2].to_ascii_uppercase(),
                ];
                *table.amino_acids.get(&codon).unwrap_or(&b'X')
            })
            .collect()
    }

    pub fn is_start_codon(&self, codon: &[u8]) -> bool {
        codon.len() == 3
            && self
                .table()
                .starts
                .iter()
                .any(|start| start.eq_ignore_ascii_case(codon))
    }

    /// True if the sequence is a complete open reading frame: length a
    /// multiple of 3, a start codon, a final stop codon and no other stops.
    pub fn is_complete_orf(&self, seq: &[u8]) -> bool {
        if seq.len() < 6 || seq.len() % 3 != 0 || !self.is_start_codon(&seq[0..3]) {
            return false;
        }
        let protein = self.translate(seq);
        match protein.iter().position(|aa| *aa == b'*') {
            Some(i) => i == protein.len() - 1,
            None => false,
        }
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|base| match base.to_ascii_uppercase() {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            b'T' => b'A',
            other => other,
        })
        .collect()
}
