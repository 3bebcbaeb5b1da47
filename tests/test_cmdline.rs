extern crate assert_cli;

#[cfg(test)]
mod tests {
    use assert_cli::Assert;

    #[test]
    fn test_rename_clusters() {
        Assert::main_binary()
            .with_args(&[
                "rename-clusters",
                "--clusters-file",
                "tests/data/set1/raw_clusters.txt",
            ])
            .succeeds()
            .stdout()
            .is("\
                geneA\tgeneA.1\tgeneA.2\n\
                cluster_1\tabc\txyz\n\
                cluster_2\tdef\n\
                geneA-\tgeneAbeta.1\tgeneAlpha.1\n\
                aaa+\taaa.1\tbbb.1\n")
            .unwrap();
    }

    #[test]
    fn test_rename_clusters_mapping_output() {
        let td = tempfile::TempDir::new().unwrap();
        let mapping = td.path().join("clusters.json");
        Assert::main_binary()
            .with_args(&[
                "rename-clusters",
                "--clusters-file",
                "tests/data/set1/raw_clusters.txt",
                "--output-cluster-table",
                "/dev/null",
                "--output-cluster-mapping",
                mapping.to_str().unwrap(),
            ])
            .succeeds()
            .stdout()
            .is("")
            .unwrap();
        let named = refprep::cluster_output::read_cluster_mapping(&mapping).unwrap();
        assert_eq!(
            vec!["geneA", "cluster_1", "cluster_2", "geneA-", "aaa+"],
            named.names().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_prepare_no_cdhit() {
        let td = tempfile::TempDir::new().unwrap();
        let outdir = td.path().join("out");
        Assert::main_binary()
            .with_args(&[
                "prepare",
                "--fasta",
                "tests/data/set1/genes.fa",
                "tests/data/set1/noncoding.fa",
                "--metadata",
                "tests/data/set1/metadata.tsv",
                "--min-gene-length",
                "9",
                "--no-cdhit",
                "--output-directory",
                outdir.to_str().unwrap(),
            ])
            .succeeds()
            .stdout()
            .is("")
            .unwrap();

        assert_eq!(
            "blaTEM_1\tblaTEM.1\n\
             blaTEM_2\tblaTEM.2\n\
             gyrA\tgyrA.1\n\
             rrs_1\trrs.1\n\
             rrs_2\trrs.2\n\
             cluster\ttet_M_\n",
            std::fs::read_to_string(outdir.join("02.cdhit.clusters.tsv")).unwrap()
        );
        assert_eq!(
            "tet(M)\ttet_M_\n",
            std::fs::read_to_string(outdir.join("00.rename_info")).unwrap()
        );
        let genes_log = std::fs::read_to_string(outdir.join("01.filter.check_genes.log")).unwrap();
        assert!(genes_log.contains("short\tRemoved"));
        let metadata_log =
            std::fs::read_to_string(outdir.join("01.filter.check_metadata.log")).unwrap();
        assert!(metadata_log.contains("gyrA.1\t1\t1\tS3L"));
        let all_fa = std::fs::read_to_string(outdir.join("02.cdhit.all.fa")).unwrap();
        assert!(all_fa.starts_with(">blaTEM.1\nATGAAAGATTAA\n"));
        assert!(!all_fa.contains(">short"));
        let gene_fa = std::fs::read_to_string(outdir.join("02.cdhit.gene.fa")).unwrap();
        assert!(gene_fa.contains(">tet_M_\n"));
        assert!(!gene_fa.contains(">rrs.1\n"));
        assert_eq!(
            ">rrs.1\nACGTACGTAC\n>rrs.2\nACGTACGTAA\n",
            std::fs::read_to_string(outdir.join("02.cdhit.noncoding.fa")).unwrap()
        );
        assert!(outdir.join("02.cdhit.clusters.json").exists());
        assert!(outdir.join("00.version_info.txt").exists());
        assert_eq!(
            "input fasta file:\ttests/data/set1/genes.fa\n\
             input fasta file:\ttests/data/set1/noncoding.fa\n\
             input tsv file:\ttests/data/set1/metadata.tsv\n\
             genetic_code\t11\n",
            std::fs::read_to_string(outdir.join("00.info.txt")).unwrap()
        );
    }

    #[test]
    fn test_prepare_clusters_file() {
        let td = tempfile::TempDir::new().unwrap();
        let outdir = td.path().join("out");
        Assert::main_binary()
            .with_args(&[
                "prepare",
                "--fasta",
                "tests/data/set1/genes.fa",
                "tests/data/set1/noncoding.fa",
                "--metadata",
                "tests/data/set1/metadata.tsv",
                "--min-gene-length",
                "9",
                "--cdhit-clusters",
                "tests/data/set1/clusters.txt",
                "--output-directory",
                outdir.to_str().unwrap(),
            ])
            .succeeds()
            .unwrap();

        assert_eq!(
            "blaTEM+\tblaTEM.1\tblaTEM.2\ttet_M_\n\
             gyrA\tgyrA.1\n\
             rrs\trrs.1\trrs.2\n",
            std::fs::read_to_string(outdir.join("02.cdhit.clusters.tsv")).unwrap()
        );
    }

    #[test]
    fn test_prepare_output_directory_exists() {
        let td = tempfile::TempDir::new().unwrap();
        Assert::main_binary()
            .with_args(&[
                "prepare",
                "--fasta",
                "tests/data/set1/genes.fa",
                "--no-cdhit",
                "--output-directory",
                td.path().to_str().unwrap(),
            ])
            .fails()
            .stderr()
            .contains("already exists")
            .unwrap();
    }

    #[test]
    fn test_prepare_bad_genetic_code() {
        let td = tempfile::TempDir::new().unwrap();
        Assert::main_binary()
            .with_args(&[
                "prepare",
                "--fasta",
                "tests/data/set1/genes.fa",
                "--genetic-code",
                "5",
                "--no-cdhit",
                "--output-directory",
                td.path().join("out").to_str().unwrap(),
            ])
            .fails()
            .stderr()
            .contains("Unsupported genetic code 5")
            .unwrap();
    }
}
