#![no_main]

use chacha20_cluster::{
    chacha20_encrypt, cluster_init, encrypt_serial_orig, CipherParams, ClusterConf, ClusterHandle,
};
use libfuzzer_sys::fuzz_target;
use std::sync::{Mutex, OnceLock};

static CLUSTER: OnceLock<Mutex<ClusterHandle>> = OnceLock::new();

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // Geometry from the first byte: 1..=8 cores, 64..=8192 byte tiles
    let cores = 1 << (data[0] % 4);
    let tile_size = 64 << (data[0] >> 4 & 0x7);
    let counter = u32::from(data[1]);

    let handle = CLUSTER.get_or_init(|| {
        Mutex::new(cluster_init(&ClusterConf::default()).unwrap())
    });
    let mut handle = handle.lock().unwrap();
    if handle.conf().cores != cores || handle.conf().tile_size != tile_size {
        let conf = ClusterConf {
            cores,
            tile_size,
            l1_budget: 64 * 1024,
            l1_buffers: 2,
        };
        *handle = cluster_init(&conf).unwrap();
    }

    let params = CipherParams::new([data[0]; 32], [data[1]; 12]).with_counter(counter);
    let payload = &data[2..];

    let mut reference = payload.to_vec();
    encrypt_serial_orig(&mut reference, &params).unwrap();

    let mut offloaded = payload.to_vec();
    chacha20_encrypt(&mut offloaded, &params, &mut handle).unwrap();

    // They must be identical
    assert_eq!(reference, offloaded, "Cluster and serial outputs differ!");
});
