//! Single Command
//!
//! Times one length on every path with warm-up and repeat runs, prints the
//! averaged counters and checks the outputs agree.

use super::verify::find_mismatch;
use anyhow::{Context, Result};
use chacha20_cluster::{
    chacha20_encrypt, chacha20_encrypt_ram, cluster_close, cluster_init, encrypt_serial,
    encrypt_serial_orig, CipherParams, ClusterConf, OffloadError, PerfCounters, RamConf,
    RamDevice, StatsLoop,
};
use clap::Args;

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SingleArgs {
    /// Plaintext length in bytes
    #[arg(long, default_value_t = 100_000)]
    pub len: usize,

    /// Warm-up runs before timing
    #[arg(long, default_value_t = 1)]
    pub hotting: u32,

    /// Timed runs to average
    #[arg(long, default_value_t = 3)]
    pub repeat: u32,

    /// Also time the external RAM path
    #[arg(long)]
    pub ram: bool,
}

/// Time a serial reference over a zeroed buffer.
fn time_serial(
    buf: &mut [u8],
    params: &CipherParams,
    encrypt: fn(&mut [u8], &CipherParams) -> chacha20_cluster::Result<()>,
) -> Result<PerfCounters, OffloadError> {
    buf.fill(0);
    let mut outcome = Ok(());
    let counters = PerfCounters::time(|| outcome = encrypt(buf, params));
    outcome.map(|()| counters)
}

fn report(name: &str, args: &SingleArgs, counters: &PerfCounters) {
    println!(
        "== {name} (len {}, {} warm-up, {} runs) ==",
        args.len, args.hotting, args.repeat
    );
    println!("{counters}");
}

// =============================================================================
// SINGLE
// =============================================================================

/// Time the cluster, the optional RAM path and both references at one length.
pub fn run_single(
    args: &SingleArgs,
    conf: &ClusterConf,
    ram_conf: &RamConf,
    params: &CipherParams,
) -> Result<()> {
    let stats = StatsLoop {
        hotting: args.hotting,
        repeat: args.repeat,
    };

    let ram = if args.ram {
        let device = RamDevice::open(ram_conf).context("Failed to open external RAM")?;
        let region = device
            .alloc(args.len)
            .context("Failed to reserve the buffer in external RAM")?;
        Some((device, region))
    } else {
        None
    };

    let mut handle = cluster_init(conf).context("Failed to initialize the cluster")?;

    let mut cluster = vec![0u8; args.len];
    let counters = stats.run(|| {
        cluster.fill(0);
        chacha20_encrypt(&mut cluster, params, &mut handle)?;
        Ok::<_, OffloadError>(handle.last_stats())
    })?;
    report("cluster", args, &counters);

    let mut from_ram = vec![0u8; args.len];
    if let Some((device, region)) = &ram {
        let counters = stats.run(|| {
            from_ram.fill(0);
            device.write(region, 0, &from_ram)?;
            chacha20_encrypt_ram(region, args.len, params, &mut handle, device)?;
            let counters = handle.last_stats();
            device.read(region, 0, &mut from_ram)?;
            Ok::<_, OffloadError>(counters)
        })?;
        report("cluster-ram", args, &counters);
    }

    let mut serial = vec![0u8; args.len];
    let counters = stats.run(|| time_serial(&mut serial, params, encrypt_serial))?;
    report("serial", args, &counters);

    let mut orig = vec![0u8; args.len];
    let counters = stats.run(|| time_serial(&mut orig, params, encrypt_serial_orig))?;
    report("serial-orig", args, &counters);

    let mut outputs: Vec<&[u8]> = vec![&cluster[..], &serial[..], &orig[..]];
    let mut names = vec!["cluster", "serial", "serial_orig"];
    if ram.is_some() {
        outputs.push(&from_ram[..]);
        names.push("ram");
    }
    let verdict = find_mismatch(&outputs);

    println!(
        "encrypt serial {:02x} {:02x}",
        cluster.first().copied().unwrap_or(0),
        cluster.last().copied().unwrap_or(0)
    );
    cluster_close(handle);

    if let Some(mismatch) = verdict {
        mismatch.print_window(&names);
        return Err(mismatch.into());
    }
    if let Some((device, region)) = ram {
        device.free(region)?;
        device.close();
    }
    Ok(())
}
