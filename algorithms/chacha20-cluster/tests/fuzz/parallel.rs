use bolero::check;
use chacha20_cluster::{
    chacha20_encrypt, cluster_init, encrypt_serial, CipherParams, ClusterConf, ClusterHandle,
};
use std::sync::{Mutex, OnceLock};

/// One cluster shared by every iteration; small tiles so short inputs span many.
#[allow(clippy::expect_used)]
fn cluster() -> &'static Mutex<ClusterHandle> {
    static CLUSTER: OnceLock<Mutex<ClusterHandle>> = OnceLock::new();
    CLUSTER.get_or_init(|| {
        let conf = ClusterConf {
            cores: 4,
            tile_size: 256,
            ..ClusterConf::default()
        };
        Mutex::new(cluster_init(&conf).expect("cluster init"))
    })
}

#[test]
fn fuzz_cluster_matches_serial() {
    check!().with_type::<Vec<u8>>().for_each(|data| {
        // =============================================================================
        // PARAMETERS FROM INPUT
        // =============================================================================

        // Logic: key and nonce bytes come from the head of the input so the
        // fuzzer explores the parameter space as well as the length.
        let mut key = [0u8; 32];
        let mut nonce = [0u8; 12];
        for (dst, src) in key.iter_mut().chain(nonce.iter_mut()).zip(data.iter()) {
            *dst = *src;
        }
        let counter = data.first().map_or(0, |&b| u32::from(b));
        let params = CipherParams::new(key, nonce).with_counter(counter);

        // =============================================================================
        // CLUSTER vs. SERIAL
        // =============================================================================

        let mut expected = data.clone();
        if encrypt_serial(&mut expected, &params).is_err() {
            return;
        }

        let Ok(mut handle) = cluster().lock() else {
            return;
        };
        let mut actual = data.clone();
        assert!(chacha20_encrypt(&mut actual, &params, &mut handle).is_ok());
        assert_eq!(actual, expected, "cluster output mismatch (len {})", data.len());
    });
}
