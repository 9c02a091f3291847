//! Thin structured-logging facade, so the rest of the crate can write `logging::debug!(self.log,
//! ...)` without naming `slog` directly at every call site.

pub use slog::{debug, o, trace, Discard, Logger};

/// Builds a terminal logger from an inline TOML config, for binaries that want real output
/// instead of the default `Discard` sink.
pub fn terminal_logger(level: &str) -> Logger {
    use sloggers::{Config, LoggerConfig};

    let config: LoggerConfig = serdeconv::from_toml_str(&format!(
        r#"
type = "terminal"
level = "{}"
destination = "stderr"
"#,
        level
    ))
    .expect("static logger config template is always valid TOML");

    config.build_logger().expect("terminal logger backend is always constructible")
}
