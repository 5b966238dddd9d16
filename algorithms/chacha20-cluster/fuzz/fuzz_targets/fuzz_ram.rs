#![no_main]

use chacha20_cluster::{
    chacha20_encrypt_ram, cluster_init, encrypt_serial, CipherParams, ClusterConf, RamConf,
    RamDevice,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // Tile size from the first byte (64..=512) so short inputs still span tiles
    let tile_size = 64 << (data[0] % 4);
    let conf = ClusterConf {
        cores: 2,
        tile_size,
        ..ClusterConf::default()
    };
    let mut handle = cluster_init(&conf).unwrap();
    let ram = RamDevice::open(&RamConf {
        size: data.len().max(1).next_multiple_of(4),
    })
    .unwrap();
    let params = CipherParams::new([0x42; 32], [0x24; 12]);

    let region = ram.alloc(data.len()).unwrap();
    ram.write(&region, 0, data).unwrap();
    chacha20_encrypt_ram(&region, data.len(), &params, &mut handle, &ram).unwrap();
    let mut offloaded = vec![0u8; data.len()];
    ram.read(&region, 0, &mut offloaded).unwrap();

    let mut reference = data.to_vec();
    encrypt_serial(&mut reference, &params).unwrap();

    assert_eq!(reference, offloaded, "RAM path and serial outputs differ!");
});
