use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use bird_tool_utils::command::finish_command_safely;

use crate::cluster_namer::RawClusters;
use crate::reference_data::ReferenceData;
use crate::{padded_cluster_key, SequenceClusterer};

pub struct CdhitClusterer {
    /// Fraction, not percentage
    pub seq_identity_threshold: f32,
    /// Fraction, not percentage
    pub length_diff_cutoff: f32,
    pub threads: usize,
}

impl SequenceClusterer for CdhitClusterer {
    fn method_name(&self) -> &str {
        "cd-hit-est"
    }

    /// Coding and non-coding sequences are clustered separately so that no
    /// cluster mixes the two.
    fn cluster(&self, refdata: &ReferenceData, _outprefix: &Path) -> Result<RawClusters> {
        let mut all_clusters = vec![];
        for coding in &[true, false] {
            let names: Vec<&str> = refdata
                .names()
                .filter(|name| refdata.is_coding(name) == *coding)
                .map(|name| name.as_str())
                .collect();
            if names.is_empty() {
                continue;
            }
            info!(
                "Running cd-hit-est on {} {} sequences ..",
                names.len(),
                if *coding { "coding" } else { "non-coding" }
            );
            all_clusters.extend(run_cdhit(
                refdata,
                &names,
                self.seq_identity_threshold,
                self.length_diff_cutoff,
                self.threads,
            )?);
        }

        let total = all_clusters.len();
        info!("cd-hit-est found {} clusters", total);
        Ok(all_clusters
            .into_iter()
            .enumerate()
            .map(|(i, members)| (padded_cluster_key(i + 1, total), members))
            .collect())
    }
}

/// Run cd-hit-est on the named sequences in a scratch directory and return
/// the clusters it found. Sequences are given to cd-hit under numeric ids so
/// that its name handling cannot alter them.
fn run_cdhit(
    refdata: &ReferenceData,
    names: &[&str],
    seq_identity_threshold: f32,
    length_diff_cutoff: f32,
    threads: usize,
) -> Result<Vec<BTreeSet<String>>> {
    let tmpdir = tempfile::Builder::new()
        .prefix("refprep-cdhit")
        .tempdir()
        .context("Failed to create temporary directory to run cd-hit-est")?;
    let infile = tmpdir.path().join("in.fa");
    let outfile = tmpdir.path().join("out");

    {
        let mut writer = BufWriter::new(
            File::create(&infile).context("Failed to open temporary file for cd-hit-est")?,
        );
        for (i, name) in names.iter().enumerate() {
            let seq = match refdata.sequence(name) {
                Some(s) => s,
                None => bail!("Programming error: no sequence named {}", name),
            };
            writeln!(writer, ">{}", i)?;
            writer.write_all(seq)?;
            writeln!(writer)?;
        }
        writer.flush()?;
    }

    let mut cmd = std::process::Command::new("cd-hit-est");
    cmd.arg("-i")
        .arg(&infile)
        .arg("-o")
        .arg(&outfile)
        .arg("-c")
        .arg(format!("{}", seq_identity_threshold))
        .arg("-s")
        .arg(format!("{}", length_diff_cutoff))
        .arg("-T")
        .arg(format!("{}", threads))
        // Full length sequence names in the .clstr file, and no memory limit
        .arg("-d")
        .arg("0")
        .arg("-M")
        .arg("0")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped());
    debug!("Running cd-hit-est command: {:?}", &cmd);

    let process = cmd
        .spawn()
        .context("Failed to spawn cd-hit-est. Is it installed?")?;
    finish_command_safely(process, "cd-hit-est")
        .wait()
        .expect("Unexpected wait failure outside bird_tool_utils for cd-hit-est");

    let clstr_path = outfile.with_extension("clstr");
    let clstr = File::open(&clstr_path)
        .with_context(|| format!("Failed to open cd-hit output {}", clstr_path.display()))?;
    let id_clusters = parse_clstr(BufReader::new(clstr))?;

    let mut clusters = Vec::with_capacity(id_clusters.len());
    let mut seen = 0usize;
    for id_cluster in id_clusters {
        let mut members = BTreeSet::new();
        for id in id_cluster {
            let name = match id.parse::<usize>().ok().and_then(|i| names.get(i)) {
                Some(n) => n,
                None => bail!("Unexpected sequence id '{}' in cd-hit-est output", id),
            };
            members.insert(name.to_string());
            seen += 1;
        }
        clusters.push(members);
    }
    if seen != names.len() {
        bail!(
            "cd-hit-est output contained {} sequences, but {} were given to it",
            seen,
            names.len()
        );
    }
    Ok(clusters)
}

/// Parse a cd-hit .clstr file into the sequence ids of each cluster, in file
/// order. Member lines look like `0\t1503nt, >seqname... *`.
pub fn parse_clstr<R: BufRead>(reader: R) -> Result<Vec<Vec<String>>> {
    let mut clusters: Vec<Vec<String>> = vec![];
    for line_res in reader.lines() {
        let line = line_res.context("Failed to read cd-hit .clstr output")?;
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with('>') {
            clusters.push(vec![]);
            continue;
        }
        let current = match clusters.last_mut() {
            Some(c) => c,
            None => bail!("Found sequence line before any cluster in .clstr: {}", line),
        };
        let start = match line.find('>') {
            Some(i) => i + 1,
            None => bail!("Failed to find sequence name in .clstr line: {}", line),
        };
        let end = match line[start..].find("...") {
            Some(i) => start + i,
            None => bail!("Failed to find end of sequence name in .clstr line: {}", line),
        };
        trace!("Found .clstr member {}", &line[start..end]);
        current.push(line[start..end].to_string());
    }
    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic_code::GeneticCode;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::sync::Mutex;

    lazy_static! {
        // PATH is process wide, so tests that swap in a fake cd-hit-est take turns.
        static ref PATH_LOCK: Mutex<()> = Mutex::new(());
    }

    const PARSE_ARGS: &str = r#"while [ $# -gt 0 ]; do
  case "$1" in
    -i) input="$2"; shift ;;
    -o) out="$2"; shift ;;
  esac
  shift
done
"#;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn refdata(dir: &Path) -> ReferenceData {
        let mut fasta_contents = String::new();
        for name in &["gA.1", "gA.2", "gB.1"] {
            fasta_contents.push_str(&format!(">{}\nATGAAAGATTAA\n", name));
        }
        for i in 1..=10 {
            fasta_contents.push_str(&format!(">nc.{}\nACGTACGTAC\n", i));
        }
        let fasta = dir.join("in.fa");
        std::fs::write(&fasta, fasta_contents).unwrap();
        let tsv = dir.join("in.tsv");
        std::fs::write(
            &tsv,
            "gA.1\t1\t0\t.\t.\tgene A\n\
             gA.2\t1\t0\t.\t.\tgene A\n\
             gB.1\t1\t0\t.\t.\tgene B\n",
        )
        .unwrap();
        ReferenceData::load(&[fasta], &[tsv], 6, 10000, GeneticCode::new(11).unwrap()).unwrap()
    }

    /// Run `f` with a shell script standing in for cd-hit-est on the PATH.
    fn with_fake_cdhit<T>(script: &str, f: impl FnOnce() -> T) -> T {
        let _guard = PATH_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let bindir = tempfile::TempDir::new().unwrap();
        let exe = bindir.path().join("cd-hit-est");
        std::fs::write(&exe, format!("#!/bin/sh\n{}{}", PARSE_ARGS, script)).unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let old_path = std::env::var_os("PATH").unwrap_or_default();
        let mut paths: Vec<PathBuf> = vec![bindir.path().to_path_buf()];
        paths.extend(std::env::split_paths(&old_path));
        std::env::set_var("PATH", std::env::join_paths(paths).unwrap());
        let result = f();
        std::env::set_var("PATH", old_path);
        result
    }

    fn clusterer() -> CdhitClusterer {
        CdhitClusterer {
            seq_identity_threshold: 0.9,
            length_diff_cutoff: 0.8,
            threads: 2,
        }
    }

    #[test]
    fn test_cluster_coding_and_noncoding_separately() {
        init();
        let td = tempfile::TempDir::new().unwrap();
        let data = refdata(td.path());
        let args_log = td.path().join("args.log");
        // Ids 0 and 1 of each run are clustered together, the rest are
        // singletons.
        let script = format!(
            r#"echo "$*" >> {}
awk '/^>/ {{ id = substr($0, 2); if (id == "0" || id == "1") {{ if (!started) {{ print ">Cluster 0"; started = 1 }} print id "\t10nt, >" id "... *" }} else {{ others[n++] = id }} }}
END {{ for (i = 0; i < n; i++) {{ print ">Cluster " (i + 1); print "0\t10nt, >" others[i] "... *" }} }}' "$input" > "$out.clstr"
"#,
            args_log.display()
        );
        let raw = with_fake_cdhit(&script, || clusterer().cluster(&data, td.path())).unwrap();

        let mut expected = RawClusters::new();
        expected.insert("01".to_string(), set(&["gA.1", "gA.2"]));
        expected.insert("02".to_string(), set(&["gB.1"]));
        expected.insert("03".to_string(), set(&["nc.1", "nc.10"]));
        for i in 2..=9 {
            let name = format!("nc.{}", i);
            expected.insert(format!("{:02}", i + 2), set(&[name.as_str()]));
        }
        assert_eq!(expected, raw);

        let args = std::fs::read_to_string(&args_log).unwrap();
        let runs: Vec<&str> = args.lines().collect();
        assert_eq!(2, runs.len());
        for run in runs {
            assert!(run.contains("-c 0.9 -s 0.8 -T 2 -d 0 -M 0"), "{}", run);
        }
    }

    #[test]
    fn test_cluster_unknown_id() {
        init();
        let td = tempfile::TempDir::new().unwrap();
        let data = refdata(td.path());
        let err = with_fake_cdhit(
            "printf '>Cluster 0\\n0\\t10nt, >99... *\\n' > \"$out.clstr\"\n",
            || clusterer().cluster(&data, td.path()),
        )
        .unwrap_err();
        assert_eq!(
            "Unexpected sequence id '99' in cd-hit-est output",
            err.to_string()
        );
    }

    #[test]
    fn test_cluster_missing_sequence() {
        init();
        let td = tempfile::TempDir::new().unwrap();
        let data = refdata(td.path());
        let err = with_fake_cdhit(
            "printf '>Cluster 0\\n0\\t10nt, >0... *\\n' > \"$out.clstr\"\n",
            || clusterer().cluster(&data, td.path()),
        )
        .unwrap_err();
        assert_eq!(
            "cd-hit-est output contained 1 sequences, but 3 were given to it",
            err.to_string()
        );
    }

    #[test]
    fn test_parse_clstr() {
        let data = b">Cluster 0
0\t1503nt, >2... *
1\t1500nt, >0... at +/99.93%
>Cluster 1
0\t861nt, >1... *
" as &[u8];
        assert_eq!(
            vec![
                vec!["2".to_string(), "0".to_string()],
                vec!["1".to_string()]
            ],
            parse_clstr(data).unwrap()
        );
    }

    #[test]
    fn test_parse_clstr_names_with_dots() {
        let data = b">Cluster 0
0\t1503nt, >blaTEM.1.x... *
" as &[u8];
        assert_eq!(
            vec![vec!["blaTEM.1.x".to_string()]],
            parse_clstr(data).unwrap()
        );
    }

    #[test]
    fn test_parse_clstr_member_before_cluster() {
        let data = b"0\t1503nt, >2... *\n" as &[u8];
        assert!(parse_clstr(data).is_err());
    }
}
