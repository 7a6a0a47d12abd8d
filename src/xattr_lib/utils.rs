use env_logger::Env;

/// Logging setup from `RUST_LOG`, defaulting to `info`. Safe to call more
/// than once.
pub fn init_logs() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
}
