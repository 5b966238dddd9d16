//! Sweep Command
//!
//! Encrypts zero buffers of every length in a range on the cluster and with
//! both serial references, stopping at the first disagreement.

use super::verify::find_mismatch;
use anyhow::{ensure, Context, Result};
use chacha20_cluster::{
    chacha20_encrypt, chacha20_encrypt_ram, cluster_close, cluster_init, encrypt_serial,
    encrypt_serial_orig, CipherParams, ClusterConf, RamConf, RamDevice,
};
use clap::Args;
use tracing::{debug, info};

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SweepArgs {
    /// First length (inclusive)
    #[arg(long, default_value_t = 5000)]
    pub from: usize,

    /// Last length (inclusive)
    #[arg(long, default_value_t = 99_999)]
    pub to: usize,

    /// Length increment
    #[arg(long, default_value_t = 1)]
    pub step: usize,

    /// Also round-trip every length through external RAM
    #[arg(long)]
    pub ram: bool,
}

impl Default for SweepArgs {
    fn default() -> Self {
        Self {
            from: 5000,
            to: 99_999,
            step: 1,
            ram: false,
        }
    }
}

// =============================================================================
// SWEEP
// =============================================================================

/// Run the sweep and print `encrypt serial <first> <last>` for the final length.
pub fn run_sweep(
    args: &SweepArgs,
    conf: &ClusterConf,
    ram_conf: &RamConf,
    params: &CipherParams,
) -> Result<()> {
    ensure!(args.step > 0, "--step must be at least 1");
    ensure!(args.from <= args.to, "--from {} is past --to {}", args.from, args.to);

    let ram = if args.ram {
        let device = RamDevice::open(ram_conf).context("Failed to open external RAM")?;
        let region = device
            .alloc(args.to)
            .context("Failed to reserve the sweep buffer in external RAM")?;
        Some((device, region))
    } else {
        None
    };

    let mut handle = cluster_init(conf).context("Failed to initialize the cluster")?;

    let mut cluster = vec![0u8; args.to];
    let mut serial = vec![0u8; args.to];
    let mut orig = vec![0u8; args.to];
    let mut from_ram = vec![0u8; args.to];

    let mut names = vec!["cluster", "serial", "serial_orig"];
    if ram.is_some() {
        names.push("ram");
    }

    let mut ends = (0, 0);
    let mut count = 0usize;

    for len in (args.from..=args.to).step_by(args.step) {
        debug!(len, "iteration");

        let cluster = &mut cluster[..len];
        let serial = &mut serial[..len];
        let orig = &mut orig[..len];
        let from_ram = &mut from_ram[..len];
        cluster.fill(0);
        serial.fill(0);
        orig.fill(0);
        from_ram.fill(0);

        chacha20_encrypt(cluster, params, &mut handle)?;
        if let Some((device, region)) = &ram {
            device.write(region, 0, from_ram)?;
            chacha20_encrypt_ram(region, len, params, &mut handle, device)?;
            device.read(region, 0, from_ram)?;
        }
        encrypt_serial(serial, params)?;
        encrypt_serial_orig(orig, params)?;

        let mut outputs: Vec<&[u8]> = vec![&cluster[..], &serial[..], &orig[..]];
        if ram.is_some() {
            outputs.push(&from_ram[..]);
        }
        if let Some(mismatch) = find_mismatch(&outputs) {
            mismatch.print_window(&names);
            cluster_close(handle);
            return Err(mismatch.into());
        }

        ends = (
            cluster.first().copied().unwrap_or(0),
            cluster.last().copied().unwrap_or(0),
        );
        count += 1;
    }

    info!(count, ram = args.ram, "sweep complete");
    println!(
        "{count} lengths verified ({}..={} step {})",
        args.from, args.to, args.step
    );
    println!("encrypt serial {:02x} {:02x}", ends.0, ends.1);

    cluster_close(handle);
    if let Some((device, region)) = ram {
        device.free(region)?;
        device.close();
    }
    Ok(())
}
