//! ChaCha20 Cluster Bench
//!
//! Drives the cluster offload against both serial references, either as a
//! length sweep or as a single timed length.
//!
//! Exit codes: 0 success, 1 output mismatch, 2 cluster initialization
//! failure, -1 device open failure.

mod commands;

use anyhow::Result;
use chacha20_cluster::{CipherParams, ClusterConf, OffloadError, RamConf};
use clap::{Args, Parser, Subcommand};
use commands::{run_single, run_sweep, Mismatch, SingleArgs, SweepArgs};
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI DEFINITION
// =============================================================================

#[derive(Parser)]
#[command(name = "chacha-bench")]
#[command(about = "ChaCha20 offloaded to a tiled compute cluster", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    device: DeviceArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep lengths and compare the cluster against both references (default)
    Sweep(SweepArgs),
    /// Time one length with warm-up and repeat runs
    Single(SingleArgs),
}

/// Cluster and external RAM geometry.
#[derive(Args)]
struct DeviceArgs {
    /// Worker cores in the cluster
    #[arg(long, global = true, default_value_t = 8)]
    cores: usize,

    /// Tile size in bytes (multiple of 64)
    #[arg(long, global = true, default_value_t = 4096)]
    tile: usize,

    /// L1 scratchpad budget in bytes
    #[arg(long, global = true, default_value_t = 64 * 1024)]
    l1_budget: usize,

    /// Tile buffers in L1 (2 = double buffering)
    #[arg(long, global = true, default_value_t = 2)]
    l1_buffers: usize,

    /// External RAM size in bytes
    #[arg(long, global = true, default_value_t = 8 * 1024 * 1024)]
    ram_size: usize,

    /// Key as 64 hex digits (all zero if omitted)
    #[arg(long, global = true, value_parser = parse_hex::<32>)]
    key: Option<[u8; 32]>,

    /// Nonce as 24 hex digits (all zero if omitted)
    #[arg(long, global = true, value_parser = parse_hex::<12>)]
    nonce: Option<[u8; 12]>,
}

impl DeviceArgs {
    const fn cluster_conf(&self) -> ClusterConf {
        ClusterConf {
            cores: self.cores,
            tile_size: self.tile,
            l1_budget: self.l1_budget,
            l1_buffers: self.l1_buffers,
        }
    }

    const fn ram_conf(&self) -> RamConf {
        RamConf {
            size: self.ram_size,
        }
    }

    fn params(&self) -> CipherParams {
        CipherParams::new(self.key.unwrap_or_default(), self.nonce.unwrap_or_default())
    }
}

fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let bytes = hex::decode(s).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| format!("expected {N} bytes, got {}", v.len()))
}

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(exit_code(&err));
    }

    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let conf = cli.device.cluster_conf();
    let ram = cli.device.ram_conf();
    let params = cli.device.params();

    match &cli.command {
        Some(Commands::Single(args)) => run_single(args, &conf, &ram, &params),
        Some(Commands::Sweep(args)) => run_sweep(args, &conf, &ram, &params),
        None => run_sweep(&SweepArgs::default(), &conf, &ram, &params),
    }
}

/// Map a failed run to the harness exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    if err.is::<Mismatch>() {
        return 1;
    }
    match err.downcast_ref::<OffloadError>() {
        Some(e) if e.is_device_open_failure() => -1,
        Some(e) if e.is_init_failure() => 2,
        _ => 1,
    }
}
