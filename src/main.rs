//! Command-line evaluation harness.
//!
//! Parses a network description, builds each requested solution, runs a
//! batch of independent shifts and reports the empties statistics:
//!
//! ```text
//! haulage mine.txt 100 500 0 1 5
//! Cycles by GA : mean-42.310000 sd-1.870000
//! ...
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;

use haulage::error::HaulageError;
use haulage::lp::ExternalSolver;
use haulage::model::{parse_file, ParsedNetwork};
use haulage::sim::{NetworkSimulator, SimpleSimulator};
use haulage::solution;
use haulage::times::UniformTimes;

/// Truck dispatching policies for open-pit haulage, evaluated under a
/// stochastic discrete-event simulator.
#[derive(Debug, Parser)]
#[command(name = "haulage", version, about)]
struct Args {
    /// Network description file.
    file: PathBuf,
    /// Independent shifts to simulate per solution.
    num_samples: u32,
    /// Shift length.
    runtime: f64,
    /// Solution indices to evaluate (0 = GA cycle, 1 = MTCT, 2 = MTWT,
    /// 3 = MTST, 4 = MSWT, 5 = DISPATCH; routed networks add
    /// 6 = DISPATCH-owr).
    #[arg(required = true)]
    sol_indexes: Vec<usize>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), HaulageError> {
    let parsed = parse_file(&args.file)?;
    let mut solver = ExternalSolver::new();
    match parsed {
        ParsedNetwork::Simple(net) => {
            info!(
                "simple network: {} trucks, {} shovels",
                net.num_trucks,
                net.num_shovels()
            );
            for &index in &args.sol_indexes {
                info!("preparing solution index {index}");
                let (name, mut con) =
                    solution::build_simple(index, &net, args.runtime, &mut solver)?;
                let mut sim = SimpleSimulator::new(net.clone(), Box::new(UniformTimes::new()));
                let mut samples = Vec::with_capacity(args.num_samples as usize);
                for _ in 0..args.num_samples {
                    sim.reset(con.as_mut());
                    sim.simulate(args.runtime, con.as_mut());
                    samples.push(sim.empties() as f64);
                }
                report(&name, &samples);
            }
        }
        ParsedNetwork::Routed(net) => {
            let net = Arc::new(net);
            info!(
                "routed network: {} trucks, {} crushers, {} shovels, {} routes",
                net.num_trucks,
                net.num_crushers(),
                net.num_shovels(),
                net.num_routes()
            );
            for &index in &args.sol_indexes {
                info!("preparing solution index {index}");
                let (name, mut con) =
                    solution::build_routed(index, &net, args.runtime, &mut solver)?;
                let mut sim = NetworkSimulator::new(net.clone(), Box::new(UniformTimes::new()));
                let mut samples = Vec::with_capacity(args.num_samples as usize);
                for _ in 0..args.num_samples {
                    sim.reset(con.as_mut());
                    sim.simulate(args.runtime, con.as_mut());
                    samples.push(sim.empties() as f64);
                }
                report(&name, &samples);
            }
        }
    }
    Ok(())
}

fn report(name: &str, samples: &[f64]) {
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance =
        samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / samples.len() as f64;
    println!("{name} : mean-{mean:.6} sd-{:.6}", variance.sqrt());
}
