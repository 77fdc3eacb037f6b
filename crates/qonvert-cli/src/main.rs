use clap::{value_parser, Arg, ArgAction, Command, ValueHint};
use qonvert_cli::input::Input;
use qonvert_cli::runner::Runner;
use rayon::ThreadPoolBuilder;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("QONVERT_LOG", "error,qonvert=info"))
        .init();

    let matches = Command::new("qonvert")
        .version(clap::crate_version!())
        .about("Assign q-values to peptide-spectrum matches by partitioned target-decoy analysis")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("input_paths")
                .num_args(1..)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Paths to tab-separated match tables. Overrides the files listed in the \
                     configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where results will be written. Overrides the directory \
                     specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("decoy-prefix")
                .long("decoy-prefix")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Prefix of decoy protein accessions. Overrides `decoy_prefix`")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("max-fdr")
                .long("max-fdr")
                .value_parser(value_parser!(f64))
                .help("Q-value threshold for reporting. Overrides `max_fdr`")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("output-suffix")
                .long("output-suffix")
                .help("Inserted into output file names. Overrides `output_suffix`")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .action(ArgAction::SetTrue)
                .help("Replace existing output files"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let threads = matches
        .get_one::<u16>("threads")
        .map(|t| *t as usize)
        .unwrap_or_else(num_cpus::get);
    ThreadPoolBuilder::new().num_threads(threads).build_global()?;

    let input = Input::from_arguments(matches)?;

    let runner = input.build().and_then(Runner::new)?;
    runner.run()?;

    Ok(())
}
