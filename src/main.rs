use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sortition::{
    OperatorId, PoolConfig, PoolError, Seed, SortitionPool, StalenessPolicy, StaticStakeOracle,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sortition", about = "Stake-weighted group selection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Join every listed operator and draw one group.
    Select {
        /// Operators file (`<address> <stake>` per line, `#` comments allowed).
        #[arg(long)]
        operators: PathBuf,
        /// Stake worth one unit of weight.
        #[arg(long, default_value_t = 2000)]
        minimum_stake: u64,
        /// Selection seed as hex.
        #[arg(long)]
        seed: String,
        /// Number of picks.
        #[arg(long, default_value_t = 3)]
        group_size: usize,
        /// Re-draw any pick whose recorded weight is outdated, not only
        /// ineligible ones.
        #[arg(long)]
        skip_outdated: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Select {
            operators,
            minimum_stake,
            seed,
            group_size,
            skip_outdated,
        } => run_select(operators, minimum_stake, &seed, group_size, skip_outdated)?,
    }

    Ok(())
}

fn run_select(
    operators_path: PathBuf,
    minimum_stake: u64,
    seed: &str,
    group_size: usize,
    skip_outdated: bool,
) -> Result<()> {
    let seed: Seed = seed
        .parse()
        .with_context(|| format!("invalid seed '{}'", seed))?;
    let stakes = read_operator_file(&operators_path).with_context(|| {
        format!(
            "failed to read operators from {}",
            operators_path.display()
        )
    })?;

    let staleness = if skip_outdated {
        StalenessPolicy::SkipOutdated
    } else {
        StalenessPolicy::SkipIneligible
    };
    let config = PoolConfig::new(minimum_stake)?.with_staleness(staleness);

    let oracle: StaticStakeOracle = stakes.iter().copied().collect();
    let mut pool = SortitionPool::new(oracle, config);

    for (operator, stake) in &stakes {
        match pool.join(*operator) {
            Ok(_) => {}
            Err(PoolError::IneligibleToJoin { .. }) => {
                warn!(%operator, stake, "skipping operator below minimum stake");
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to join operator {}", operator))
            }
        }
    }

    println!(
        "pool: {} operators, total weight {}",
        pool.operators_in_pool(),
        pool.total_weight()
    );

    let selection = pool
        .select_group(group_size, seed)
        .context("group selection failed")?;

    for (idx, operator) in selection.members.iter().enumerate() {
        println!("{}\t{}", idx, operator);
    }

    Ok(())
}

fn read_operator_file(path: &Path) -> Result<Vec<(OperatorId, u64)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut stakes = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let address = fields
            .next()
            .ok_or_else(|| anyhow::anyhow!("missing address on line {}", line_no + 1))?;
        let stake = fields
            .next()
            .ok_or_else(|| anyhow::anyhow!("missing stake on line {}", line_no + 1))?;

        let operator: OperatorId = address.parse().with_context(|| {
            format!("invalid address '{}' on line {}", address, line_no + 1)
        })?;
        let stake: u64 = stake.parse().with_context(|| {
            format!("invalid stake '{}' on line {}", stake, line_no + 1)
        })?;

        stakes.push((operator, stake));
    }

    Ok(stakes)
}
