//! Command-line front end: solve the arena, then replay the saved policy.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use arena_mdp::config::{default_start, RewardConfig, SimulationConfig, SolverConfig};
use arena_mdp::model::StateTable;
use arena_mdp::policy;
use arena_mdp::simulation::{RandomDraws, Simulator};
use arena_mdp::solver::{solve_lp, value_iteration};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Trace every sweep, state and simulated step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve the arena and save the resulting policy
    Solve {
        #[arg(short, long, value_enum, default_value_t = Method::ValueIteration)]
        method: Method,
        /// Where to write the policy
        #[arg(short, long, default_value = "policy.json")]
        output: PathBuf,
        #[arg(long, default_value_t = 0.999)]
        discount: f64,
        /// Step cost from the rate table (-10 / [0.5, 1, 2][index % 3])
        #[arg(long, conflicts_with = "step_cost")]
        rate_index: Option<usize>,
        #[arg(long, default_value_t = -5.0, allow_negative_numbers = true)]
        step_cost: f64,
        #[arg(long, default_value_t = -40.0, allow_negative_numbers = true)]
        penalty: f64,
        /// Value of states where the adversary is down
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        terminal_reward: f64,
        /// Make Stay free of the step cost
        #[arg(long)]
        free_stay: bool,
        /// Also write A, r, x, alpha, policy and objective; needs --method linear-program
        #[arg(long)]
        dump_lp: Option<PathBuf>,
        /// Print one line per state once solved
        #[arg(long)]
        summary: bool,
    },
    /// Play a saved policy from the reference start state
    Simulate {
        #[arg(short, long, default_value = "policy.json")]
        policy: PathBuf,
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 10_000)]
        max_steps: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    ValueIteration,
    LinearProgram,
}

/// Only the LP solve has a program to dump.
fn ensure_dump_supported(method: Method, dump_lp: Option<&Path>) -> Result<()> {
    if let (Method::ValueIteration, Some(path)) = (method, dump_lp) {
        bail!("--dump-lp {} needs --method linear-program", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let filter = if args.verbose { "trace" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match args.command {
        Commands::Solve {
            method,
            output,
            discount,
            rate_index,
            step_cost,
            penalty,
            terminal_reward,
            free_stay,
            dump_lp,
            summary,
        } => {
            ensure_dump_supported(method, dump_lp.as_deref())?;
            let mut rewards = RewardConfig {
                step_cost,
                counter_attack_penalty: penalty,
                terminal_reward,
                free_stay,
            };
            if let Some(index) = rate_index {
                rewards = rewards.with_rate_index(index);
            }
            let config = SolverConfig {
                discount,
                rewards,
                ..SolverConfig::default()
            };

            let mut table = StateTable::new();
            match method {
                Method::ValueIteration => {
                    let report = value_iteration(&mut table, &config)
                        .context("value iteration rejected the configuration")?;
                    if !report.converged {
                        log::warn!("value iteration did not converge; saving the last sweep");
                    }
                }
                Method::LinearProgram => {
                    let report = solve_lp(&mut table, &config).context("LP solve failed")?;
                    if let Some(path) = dump_lp {
                        report
                            .dump_to_path(&path)
                            .with_context(|| format!("writing LP dump to {}", path.display()))?;
                        info!("LP dump written to {}", path.display());
                    }
                }
            }

            let start = table.resolve(&default_start());
            println!("{}: {} [{:.3}]", start.key(), start.favoured, start.value);
            if summary {
                print!("{}", table.summary());
            }
            policy::save(&table, &output)
                .with_context(|| format!("saving policy to {}", output.display()))?;
        }
        Commands::Simulate {
            policy: path,
            seed,
            max_steps,
        } => {
            let mut table = StateTable::new();
            policy::load_into(&path, &mut table)
                .with_context(|| format!("loading policy from {}", path.display()))?;
            let simulator = Simulator::new(&table, SimulationConfig { max_steps })?;
            let trajectory = simulator.run(default_start(), &mut RandomDraws::seeded(seed));

            for (turn, step) in trajectory.steps.iter().enumerate() {
                let marker = if step.counter_attack { " (hit)" } else { "" };
                println!("{:>5} {} {} -> {}{}", turn + 1, step.from, step.action, step.to, marker);
            }
            if trajectory.terminated {
                println!("adversary down after {} steps", trajectory.len());
            } else {
                println!("stopped after {} steps", trajectory.len());
            }
        }
    }

    Ok(())
}
