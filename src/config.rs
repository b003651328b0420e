//! Configuration for the validator
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::principal::Principal;

/// Lab validator - re-validates a participant service against ground truth
#[derive(Parser, Debug, Clone)]
#[command(name = "lab-validator")]
#[command(about = "Differential validation harness driven by restart signals")]
pub struct Args {
    /// MongoDB connection URI (also identifies the principal under test)
    #[arg(long, env = "MONGODB_URI", default_value = "")]
    pub mongodb_uri: String,

    /// Database holding results, health and scenario documents
    #[arg(long, env = "RESULTS_DB", default_value = "airbnb_arena")]
    pub results_db: String,

    /// Target service address; `PARTICIPANT_NAME` is replaced with the principal
    #[arg(long, env = "SERVICE_NAME")]
    pub service_name: Option<String>,

    /// Directory containing `restart-signal` and `last-processed-signal`
    #[arg(long, env = "SIGNAL_FILE_PATH", default_value = "./signal")]
    pub signal_dir: PathBuf,

    /// Seconds without a signal before a scheduled run is triggered
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "3600")]
    pub poll_interval_secs: u64,

    /// Seconds between checks when filesystem notification is unavailable
    #[arg(long, env = "FALLBACK_POLL_SECS", default_value = "30")]
    pub fallback_poll_secs: u64,

    /// Delay between consecutive checks in milliseconds
    #[arg(long, env = "INTER_CHECK_DELAY_MS", default_value = "500")]
    pub inter_check_delay_ms: u64,

    /// Upper bound for a single check in seconds
    #[arg(long, env = "CHECK_TIMEOUT_SECS", default_value = "30")]
    pub check_timeout_secs: u64,

    /// Path probed on the target before running checks
    #[arg(long, env = "PROBE_PATH", default_value = "health/whoami")]
    pub probe_path: String,

    /// Accept self-signed certificates from the target
    #[arg(long, env = "INSECURE_TLS", default_value = "true")]
    pub insecure_tls: bool,

    /// Deployment environment label recorded in the health record
    #[arg(long, env = "ENVIRONMENT", default_value = "prod")]
    pub environment: String,

    /// Filter value for the scenario document (`aws_route53_record_name`)
    #[arg(long, env = "SCENARIO_KEY")]
    pub scenario_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Perform the startup run and exit without watching for signals
    #[arg(long, env = "RUN_ONCE", default_value = "false")]
    pub run_once: bool,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.mongodb_uri.trim().is_empty() {
            return Err("MONGODB_URI environment variable is required".to_string());
        }

        if !self.mongodb_uri.starts_with("mongodb://")
            && !self.mongodb_uri.starts_with("mongodb+srv://")
        {
            return Err("MONGODB_URI must start with mongodb:// or mongodb+srv://".to_string());
        }

        if self.poll_interval_secs == 0 {
            return Err("POLL_INTERVAL_SECS must be greater than zero".to_string());
        }

        if self.fallback_poll_secs == 0 {
            return Err("FALLBACK_POLL_SECS must be greater than zero".to_string());
        }

        if self.check_timeout_secs == 0 {
            return Err("CHECK_TIMEOUT_SECS must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Principal derived from the connection credential
    pub fn principal(&self) -> Principal {
        Principal::from_connection_uri(&self.mongodb_uri)
    }

    /// Target base URL for the principal, if a service is configured
    pub fn target_url(&self, principal: &Principal) -> Option<String> {
        self.service_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| normalize_target(&principal.expand(s)))
    }

    /// Watch timeout that doubles as the scheduled trigger period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Interval for the polling fallback
    pub fn fallback_poll_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_poll_secs)
    }

    /// Delay inserted between checks
    pub fn inter_check_delay(&self) -> Duration {
        Duration::from_millis(self.inter_check_delay_ms)
    }

    /// Bound applied to each check
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

/// Normalize a service address into a base URL ending in `/`
///
/// Addresses without a scheme default to `https://`.
pub fn normalize_target(address: &str) -> String {
    let mut url = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("https://{}", address)
    };

    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec![
            "lab-validator",
            "--mongodb-uri",
            "mongodb+srv://dave:pw@cluster0.example.net",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let a = args(&[]);
        assert_eq!(a.results_db, "airbnb_arena");
        assert_eq!(a.inter_check_delay(), Duration::from_millis(500));
        assert_eq!(a.probe_path, "health/whoami");
        assert!(a.insecure_tls);
        assert!(!a.run_once);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_missing_uri_is_rejected() {
        let a = Args::try_parse_from(["lab-validator", "--mongodb-uri", ""]).unwrap();
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let a = args(&["--poll-interval-secs", "0"]);
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_target_url_expands_principal() {
        let a = args(&["--service-name", "PARTICIPANT_NAME.lab.example.com"]);
        let principal = a.principal();
        assert_eq!(principal.as_str(), "dave");
        assert_eq!(
            a.target_url(&principal).as_deref(),
            Some("https://dave.lab.example.com/")
        );
    }

    #[test]
    fn test_blank_target_is_unset() {
        let a = args(&["--service-name", "  "]);
        assert_eq!(a.target_url(&a.principal()), None);
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("http://localhost:5000"), "http://localhost:5000/");
        assert_eq!(normalize_target("https://svc/"), "https://svc/");
        assert_eq!(normalize_target("svc.internal"), "https://svc.internal/");
    }
}
