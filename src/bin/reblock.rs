//! Post-processing of AFQMC estimator files.

use clap::{CommandFactory, Parser};
use log::{error, warn};

use afqmc::analysis::{
    analyse_estimates, average_tau, extract_metadata, format_metadata, load_files, reblock_mixed,
};
use afqmc::io::EstimatorFile;
use afqmc::Result;

#[derive(Parser, Debug)]
#[command(version, about = "Reblocking analysis of AFQMC estimates", long_about = None)]
struct Args {
    /// First step included in the analysis
    #[arg(short, long, default_value_t = 0)]
    start: usize,
    /// Print the full reblocking table
    #[arg(short, long)]
    verbose: bool,
    /// Average the mixed energy over independent runs at every step
    #[arg(short, long)]
    loops: bool,
    /// With --loops, only use the last measurement of each run
    #[arg(short, long)]
    tail: bool,
    /// Print the run metadata
    #[arg(short, long)]
    input: bool,
    /// Analyse back-propagated estimates
    #[arg(short, long)]
    estimates: bool,
    /// Write a plain data file for plotting
    #[arg(short, long)]
    plot: Option<String>,
    /// Estimator files
    #[arg(short, long, num_args = 1..)]
    filenames: Vec<String>,
}

fn print_reblock(file: &EstimatorFile, name: &str, args: &Args) {
    println!("# {}", name);
    for column in reblock_mixed(&file.mixed, args.start) {
        if args.verbose {
            println!("# {:>10} {:>8} {:>16} {:>16} {:>16}", "block_size", "nblocks", "mean", "std_err", "std_err_err");
            for row in &column.rows {
                println!(
                    "  {:>10} {:>8} {:>16.8e} {:>16.8e} {:>16.8e} {}",
                    row.block_size,
                    row.nblocks,
                    row.mean,
                    row.std_err,
                    row.std_err_err,
                    if row.optimal { "<---" } else { "" }
                );
            }
        }
        match column.summary {
            Some((mean, err)) => println!(
                "{:>6}: {:.8} +/- {:.8}  (tau_int = {:.2})",
                column.name, mean, err, column.autocorrelation_time
            ),
            None => warn!("{}: no optimal block found, use a longer run", column.name),
        }
    }
}

fn write_plot(filename: &str, files: &[EstimatorFile], tail: bool) -> Result<()> {
    use std::io::Write;
    let mut out = std::io::BufWriter::new(std::fs::File::create(filename)?);
    writeln!(out, "# step mean std_err nruns")?;
    for avg in average_tau(files, tail) {
        writeln!(out, "{} {:.10e} {:.10e} {}", avg.step, avg.mean, avg.std_err, avg.nruns)?;
    }
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    if args.input {
        for name in &args.filenames {
            let metadata = extract_metadata(name)?;
            println!("{}", format_metadata(&metadata)?);
        }
        return Ok(());
    }

    let files = load_files(&args.filenames);
    if args.estimates {
        match analyse_estimates(&files, args.start) {
            Some(analysis) => {
                println!("# Back-propagated estimates from {} blocks", analysis.nsamples);
                for (name, (mean, err)) in ["E", "EKin", "EPot"].iter().zip(analysis.energies) {
                    println!("{:>6}: {:.8} +/- {:.8}", name, mean, err);
                }
                for (spin, label) in ["up", "down"].iter().enumerate() {
                    println!("# one-body density matrix ({})", label);
                    println!("{:.6}", analysis.rdm[spin]);
                    if args.verbose {
                        println!("# standard error ({})", label);
                        println!("{:.6}", analysis.rdm_error[spin]);
                    }
                }
            }
            None => warn!("No back-propagated estimates found"),
        }
    } else if args.loops {
        println!("# {:>8} {:>16} {:>16} {:>6}", "step", "E", "std_err", "nruns");
        for avg in average_tau(&files, args.tail) {
            println!("  {:>8} {:>16.8} {:>16.8} {:>6}", avg.step, avg.mean, avg.std_err, avg.nruns);
        }
    } else {
        for name in &args.filenames {
            match EstimatorFile::read(name) {
                Ok(file) => print_reblock(&file, name, args),
                Err(e) => warn!("Skipping {}: {}", name, e),
            }
        }
    }

    if let Some(plot) = &args.plot {
        write_plot(plot, &files, args.tail)?;
    }
    Ok(())
}

/// Process exit code for a parsed command line. Without input files only
/// the usage message is printed.
fn exit_code(args: &Args) -> i32 {
    if args.filenames.is_empty() {
        eprintln!("{}", Args::command().render_usage());
        return 1;
    }
    match run(args) {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            1
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    std::process::exit(exit_code(&args));
}
