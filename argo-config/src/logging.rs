//! `tracing` subscriber setup shared by the binaries.

use tracing_subscriber::EnvFilter;

use crate::LoggingConfig;

const QUIET_TARGETS: &[&str] = &[
    "hyper",
    "hyper_util",
    "h2",
    "reqwest",
    "datafusion",
    "datafusion_optimizer",
    "sqlparser",
    "arrow",
];

/// Filter string for `level` with the chattier dependencies held at `warn`.
pub fn filter_directives(level: &str) -> String {
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{t}=warn")));
    directives.join(",")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the config.
/// Calling this twice is a no-op.
pub fn init(cfg: &LoggingConfig) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match EnvFilter::try_new(filter_directives(&cfg.level)) {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: ARGO_LOG='{}' is not a valid tracing filter ({e}); falling back to 'info'",
                    cfg.level
                );
                EnvFilter::new(filter_directives("info"))
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = if cfg.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_targets_follow_base_level() {
        let d = filter_directives("debug");
        assert!(d.starts_with("debug,"));
        assert!(d.contains("datafusion=warn"));
        assert!(EnvFilter::try_new(&d).is_ok());
    }
}
