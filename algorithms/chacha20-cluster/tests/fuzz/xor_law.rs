use bolero::check;
use chacha20_cluster::{chacha20_encrypt, cluster_init, CipherParams, ClusterConf, ClusterHandle};
use std::sync::{Mutex, OnceLock};

#[allow(clippy::expect_used)]
fn cluster() -> &'static Mutex<ClusterHandle> {
    static CLUSTER: OnceLock<Mutex<ClusterHandle>> = OnceLock::new();
    CLUSTER.get_or_init(|| {
        let conf = ClusterConf {
            cores: 8,
            tile_size: 64,
            l1_buffers: 3,
            ..ClusterConf::default()
        };
        Mutex::new(cluster_init(&conf).expect("cluster init"))
    })
}

#[test]
fn fuzz_double_encryption_is_identity() {
    check!().with_type::<Vec<u8>>().for_each(|data| {
        let params = CipherParams::new([7; 32], [9; 12]);
        let Ok(mut handle) = cluster().lock() else {
            return;
        };

        // =============================================================================
        // ROUND TRIP
        // =============================================================================

        let mut buf = data.clone();
        assert!(chacha20_encrypt(&mut buf, &params, &mut handle).is_ok());
        if data.len() >= 16 {
            assert_ne!(&buf, data, "keystream left a 16+ byte input unchanged");
        }
        assert!(chacha20_encrypt(&mut buf, &params, &mut handle).is_ok());
        assert_eq!(&buf, data, "double encryption did not restore the input");
    });
}
