/// Install `env_logger`. `RUST_LOG` wins; otherwise debug builds log at `debug`, release at `info`.
pub fn init_logging() {
    #[cfg(debug_assertions)]
    let default_level = "debug";
    #[cfg(not(debug_assertions))]
    let default_level = "info";

    let env = env_logger::Env::default().default_filter_or(default_level);
    // a logger may already be installed, e.g. by a test harness
    let _ = env_logger::Builder::from_env(env).format_timestamp_millis().try_init();
}
