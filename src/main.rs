use clap::Parser;
use log::{error, info};

use afqmc::io::RunConfig;
use afqmc::qmc::Afqmc;
use afqmc::Result;

#[derive(Parser, Debug)]
#[command(version, about = "Zero temperature AFQMC for the Hubbard model", long_about = None)]
struct Args {
    /// YAML run file
    #[arg(short, long, default_value = "config.yml")]
    config: String,
}

fn run(args: &Args) -> Result<()> {
    info!("# Reading run file {}", args.config);
    let config = RunConfig::from_file(&args.config)?;
    let mut afqmc = Afqmc::from_config(config)?;
    afqmc.run()?;
    afqmc.finalise()?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
