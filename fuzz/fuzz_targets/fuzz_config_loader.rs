#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse or validation errors are fine; panics are not.
    if let Ok(cfg) = smokewatch_config::load_toml(data) {
        if cfg.validate().is_ok() {
            let params = smokewatch_core::MonitorParams::from(&cfg);
            assert!(params.z_threshold > 0.0);
            assert!(!params.tick.is_zero());
        }
    }
});
