use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use log::{error, info};
use std::path::Path;

use symsim::algebra::RatFunc;
use symsim::analyzer::{Analyzer, AnalyzerConfig};
use symsim::cli::CliArgs;

fn main() {
    let matches = create_cli().get_matches();

    let level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run_application(&matches) {
        error!("{}", format!("Error: {}", e).red());
        eprintln!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn create_cli() -> Command {
    Command::new("symSim")
        .version(symsim::VERSION)
        .about("Symbolic analysis of linear time-invariant circuits")
        .arg(
            Arg::new("input")
                .help("Input netlist file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for analysis results"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
        .arg(
            Arg::new("node")
                .long("node")
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Report only this node voltage (repeatable)"),
        )
        .arg(
            Arg::new("domain")
                .long("domain")
                .value_name("DOMAIN")
                .value_parser(["all", "time", "laplace", "dc", "ac", "noise", "fourier"])
                .help("Domain in which results are shown"),
        )
        .arg(
            Arg::new("tran")
                .long("tran")
                .value_names(["TSTOP", "POINTS"])
                .num_args(2)
                .help("Sample the time-domain results on a numeric grid"),
        )
        .arg(
            Arg::new("subs")
                .long("subs")
                .value_name("NAME=VALUE")
                .action(ArgAction::Append)
                .help("Substitute a numeric value for a symbol (repeatable)"),
        )
        .arg(
            Arg::new("state-space")
                .long("state-space")
                .value_name("OUTPUT_NODE")
                .help("Report the state-space model with this node voltage as output"),
        )
        .arg(
            Arg::new("sequential")
                .long("sequential")
                .action(ArgAction::SetTrue)
                .help("Solve domains one after another instead of in parallel"),
        )
}

fn run_application(matches: &ArgMatches) -> anyhow::Result<()> {
    let args = CliArgs::from_matches(matches)?;

    info!("{}", "Starting symSim".green().bold());
    info!("Input file: {}", args.input_file.bright_blue());

    let input = Path::new(&args.input_file);
    if !input.exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }

    let config = AnalyzerConfig {
        parallel: !args.sequential,
        view: args.view,
        ..AnalyzerConfig::default()
    };
    let mut analyzer = Analyzer::with_config(config);
    analyzer.load_netlist(input)?;
    for (name, value) in &args.substitutions {
        info!("Substituting {} = {}", name, value);
        analyzer.substitute(name, &RatFunc::constant(value.clone()))?;
    }
    if args.verbose_level > 0 {
        analyzer.circuit()?.print_summary();
    }

    analyzer.run(&args.nodes)?;
    if let Some(output) = &args.state_space {
        analyzer.state_space(output)?;
    }
    if let Some(grid) = args.transient {
        info!("Sampling {} points up to t = {}", grid.points, grid.tstop);
        analyzer.time_series(&args.nodes, grid.tstop, Some(grid.points))?;
    }

    if let Some(output_file) = &args.output_file {
        analyzer.export_results(Path::new(output_file), args.output_format)?;
        info!("Results exported to: {}", output_file.bright_green());
    } else {
        analyzer.print_summary();
    }

    info!("{}", "Analysis completed successfully!".green().bold());
    Ok(())
}
