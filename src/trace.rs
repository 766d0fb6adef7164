use tracing_subscriber::{EnvFilter, fmt};

/// Level filter used when neither `--log-level` nor `BDT_LOG` is given.
pub const DEFAULT_LEVELS: &str = "bdt=info,k8s_test_framework=info";

pub fn init(color: bool, json: bool, levels: &str) {
    let filter = EnvFilter::try_new(levels).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVELS));

    // Ignore errors when setting, since tests can initialize this
    // multiple times.
    let _ = if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_ansi(color)
            .with_writer(std::io::stderr)
            .try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init(false, false, DEFAULT_LEVELS);
        init(false, true, "not a [valid filter");
        tracing::info!(message = "Still logging.");
    }
}
