use bolero::check;
use chacha20_cluster::{
    chacha20_encrypt_ram, cluster_init, encrypt_serial_orig, CipherParams, ClusterConf,
    ClusterHandle, RamConf, RamDevice,
};
use std::sync::{Mutex, OnceLock};

struct Rig {
    handle: ClusterHandle,
    ram: RamDevice,
}

#[allow(clippy::expect_used)]
fn rig() -> &'static Mutex<Rig> {
    static RIG: OnceLock<Mutex<Rig>> = OnceLock::new();
    RIG.get_or_init(|| {
        let conf = ClusterConf {
            cores: 2,
            tile_size: 128,
            ..ClusterConf::default()
        };
        Mutex::new(Rig {
            handle: cluster_init(&conf).expect("cluster init"),
            ram: RamDevice::open(&RamConf::default()).expect("ram open"),
        })
    })
}

#[test]
fn fuzz_ram_path_matches_serial() {
    check!().with_type::<Vec<u8>>().for_each(|data| {
        // Logic: the RAM staging ring must hand back exactly what the serial
        // cipher produces, whatever the plaintext and its length.
        let params = CipherParams::new([0x5a; 32], [0xa5; 12]);
        let mut expected = data.clone();
        if encrypt_serial_orig(&mut expected, &params).is_err() {
            return;
        }

        let Ok(mut rig) = rig().lock() else {
            return;
        };
        let Rig { handle, ram } = &mut *rig;
        let Ok(region) = ram.alloc(data.len()) else {
            return;
        };

        assert!(ram.write(&region, 0, data).is_ok());
        assert!(chacha20_encrypt_ram(&region, data.len(), &params, handle, ram).is_ok());
        let mut actual = vec![0u8; data.len()];
        assert!(ram.read(&region, 0, &mut actual).is_ok());
        assert!(ram.free(region).is_ok());

        assert_eq!(actual, expected, "ram path mismatch (len {})", data.len());
    });
}
