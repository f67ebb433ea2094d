/// Intercept messages using the `log` crate and print them to STDERR. `RUST_LOG` overrides the
/// default `info` filter.
pub fn setup() {
    use env_logger::{Builder, Env};
    Builder::from_env(Env::default().default_filter_or("info")).init();
}

/// Like `setup`, but safe to call repeatedly. Meant for tests, where every test may try to
/// initialize logging.
pub fn setup_for_tests() {
    use env_logger::{Builder, Env};
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}
