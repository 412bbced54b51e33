#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use rivers::{RiverConfig, Rivers};

static TRACING: Once = Once::new();

/// Install a test subscriber once; `RUST_LOG` picks the level
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Rivers with a short survey window
pub fn rivers() -> Rivers {
    init_tracing();
    Rivers::with_config(RiverConfig::default().survey_timeout(Duration::from_millis(30)))
}

/// Rivers with custom configuration
pub fn rivers_with(config: RiverConfig) -> Rivers {
    init_tracing();
    Rivers::with_config(config)
}
