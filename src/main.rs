mod error;
mod gpu;

use clap::Parser;
use error::GpuError;
use gpu::{BatchReport, GpuSession, PipelineSet, ResourceSet, TrialRunner};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Hazard-validation harness for a decoupled-lookback GPU prefix scan",
    long_about = None
)]
struct Args {
    /// Test size: scan tiles per trial (less than 65536)
    #[arg(value_parser = clap::value_parser!(u32).range(..65536))]
    size: u32,

    /// Number of trials to run (less than 1024)
    #[arg(value_parser = clap::value_parser!(u32).range(..1024))]
    trials: u32,

    /// Log the decoded scan state after every trial
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() {
    // Arguments are validated before any device negotiation happens.
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(&args) {
        Ok(report) => {
            // Trial failures are results, not errors: exit success either way.
            println!("{}", report.summary());
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<BatchReport, GpuError> {
    let session = GpuSession::negotiate()?;
    session.print_info();

    let resources = ResourceSet::new(&session.device, args.size);
    let pipelines = PipelineSet::new(&session.device, &resources)?;

    // The uniform block is written once; every trial reuses it.
    resources.write_params(&session.queue);
    session.queue.submit(std::iter::empty());
    gpu::sync::wait_queue(&session.device, &session.queue)?;

    let runner = TrialRunner::new(&session, &resources, &pipelines, args.verbose);
    runner.run_batch(args.trials)
}
