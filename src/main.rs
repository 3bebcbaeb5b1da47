extern crate refprep;

extern crate clap;
use clap::*;
use std::path::PathBuf;

#[macro_use]
extern crate log;

extern crate bird_tool_utils;
use bird_tool_utils::clap_utils::*;

static PROGRAM_NAME: &str = "refprep";

fn main() {
    let app = build_cli();
    let matches = app.clone().get_matches();
    set_log_level(&matches, false, PROGRAM_NAME, crate_version!());

    match matches.subcommand_name() {
        Some("prepare") => {
            refprep::prepare_argument_parsing::run_prepare_subcommand(
                &matches,
                PROGRAM_NAME,
                crate_version!(),
            );
        }
        Some("rename-clusters") => {
            let m = matches.subcommand_matches("rename-clusters").unwrap();
            set_log_level(m, true, PROGRAM_NAME, crate_version!());

            if let Err(e) = run_rename_clusters(m) {
                error!("{:#}", e);
                std::process::exit(1);
            }
        }
        _ => panic!("Programming error"),
    }
}

fn run_rename_clusters(m: &ArgMatches) -> anyhow::Result<()> {
    let clusters_file = m.get_one::<PathBuf>("clusters-file").unwrap();
    let clusters = refprep::precomputed_clusters::read_clusters_file(clusters_file)?;
    let raw_clusters = refprep::precomputed_clusters::to_raw_clusters(clusters)?;
    let named = refprep::cluster_namer::rename_clusters(&raw_clusters);
    info!("Named {} clusters", named.len());

    match m.get_one::<PathBuf>("output-cluster-table") {
        Some(path) => refprep::cluster_output::write_cluster_table_file(&named, path)?,
        None => refprep::cluster_output::write_cluster_table(&named, std::io::stdout().lock())?,
    }
    if let Some(path) = m.get_one::<PathBuf>("output-cluster-mapping") {
        refprep::cluster_output::write_cluster_mapping(&named, path)?;
    }
    Ok(())
}

fn build_cli() -> Command {
    let mut app = add_clap_verbosity_flags(Command::new("refprep"))
        .version(crate_version!())
        .author(refprep::AUTHOR)
        .about("Prepare reference gene sequences and metadata for AMR variant calling")
        .arg_required_else_help(true)
        .subcommand(
            add_clap_verbosity_flags(Command::new("rename-clusters"))
                .about("Name the clusters of a clusters file, as 'prepare' would")
                .arg(
                    Arg::new("clusters-file")
                        .long("clusters-file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("One cluster per line, sequence names separated by whitespace"),
                )
                .arg(
                    Arg::new("output-cluster-table")
                        .long("output-cluster-table")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the named cluster table here [default: stdout]"),
                )
                .arg(
                    Arg::new("output-cluster-mapping")
                        .long("output-cluster-mapping")
                        .value_parser(value_parser!(PathBuf))
                        .help("Also write the named clusters as JSON here"),
                ),
        );

    app = refprep::prepare_argument_parsing::add_prepare_subcommand(app);
    return app;
}
