/// Mirrors the teacher's `main()`: default `RUST_LOG` to `info` unless the
/// user already set it, then hand off to `pretty_env_logger`'s timed format.
pub fn init() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init_timed();
}
