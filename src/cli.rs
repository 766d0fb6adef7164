use std::path::PathBuf;

use clap::Args;

use crate::trace::DEFAULT_LEVELS;

/// Options added on top of the runner's own `--tags`, `--concurrency`,
/// `--name` and `--color` flags.
#[derive(Args, Clone, Debug)]
pub struct Opts {
    /// Feature file, or directory of feature files, to run.
    #[arg(long, env = "BDT_FEATURES", default_value = "features")]
    pub features: PathBuf,

    /// Log level filter, for example `bdt=debug,kube=info`.
    #[arg(long, env = "BDT_LOG", default_value = DEFAULT_LEVELS)]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "BDT_JSON_LOGS")]
    pub json_logs: bool,

    /// Disable ANSI colors in logs.
    #[arg(long)]
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct Wrapper {
        #[command(flatten)]
        opts: Opts,
    }

    #[test]
    fn defaults() {
        let wrapper = Wrapper::try_parse_from(["bdt"]).unwrap();
        assert_eq!(wrapper.opts.features, PathBuf::from("features"));
        assert!(!wrapper.opts.json_logs);
    }

    #[test]
    fn flags() {
        let wrapper = Wrapper::try_parse_from([
            "bdt",
            "--features",
            "features/k8s",
            "--log-level",
            "bdt=debug",
            "--json-logs",
            "--no-color",
        ])
        .unwrap();
        assert_eq!(wrapper.opts.features, PathBuf::from("features/k8s"));
        assert_eq!(wrapper.opts.log_level, "bdt=debug");
        assert!(wrapper.opts.json_logs && wrapper.opts.no_color);
    }
}
