use clap::Parser;
use std::path::PathBuf;

/// Ensemble goal-count prediction service
#[derive(Parser, Debug, Clone)]
#[command(name = "goalcast", version, about)]
pub struct Config {
    /// API listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Historical match dataset (CSV)
    #[arg(long, env = "HISTORY_FILE", default_value = "data/player_history.csv")]
    pub history_file: PathBuf,

    /// Directory with per-player model artifacts (JSON)
    #[arg(long, env = "ARTIFACTS_DIR", default_value = "data/artifacts")]
    pub artifacts_dir: PathBuf,

    /// Directory with stored prediction and actual-result CSVs
    #[arg(long, env = "VALIDATION_DIR", default_value = "data/validation")]
    pub validation_dir: PathBuf,

    /// Per-adapter prediction deadline in milliseconds
    #[arg(long, env = "ADAPTER_TIMEOUT_MS", default_value = "2000")]
    pub adapter_timeout_ms: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.adapter_timeout_ms == 0 {
            anyhow::bail!("adapter_timeout_ms must be positive");
        }
        if self.adapter_timeout_ms > 60_000 {
            anyhow::bail!("adapter_timeout_ms must be at most 60000 (one minute)");
        }
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!(
                "listen_addr must be a socket address, got '{}'",
                self.listen_addr
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            history_file: PathBuf::from("data/player_history.csv"),
            artifacts_dir: PathBuf::from("data/artifacts"),
            validation_dir: PathBuf::from("data/validation"),
            adapter_timeout_ms: 2000,
        }
    }

    #[test]
    fn default_shape_validates() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn rejects_zero_timeout_and_bad_addr() {
        let mut cfg = base();
        cfg.adapter_timeout_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.listen_addr = "not-an-address".to_string();
        assert!(cfg.validate().is_err());
    }
}
