use crate::core::{EngineConfig, FeeSchedule};
use crate::strategy::{BatchConfig, EngineSettings};
use clap::{ArgAction, Parser, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Largest supported currency scale
const MAX_CURRENCY_SCALE: u32 = 18;

/// Approve and reject deposit and withdrawal requests against a versioned ledger
#[derive(Parser, Debug)]
#[command(name = "reconciliation-engine")]
#[command(
    about = "Approve and reject deposit and withdrawal requests against a versioned ledger",
    long_about = None
)]
pub struct CliArgs {
    /// Input CSV file path containing operator commands
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Processing strategy to use for the commands
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "sync",
        help = "Processing strategy: 'sync' for in-order or 'async' for user-partitioned batches"
    )]
    pub strategy: StrategyType,

    /// Number of commands per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of commands per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Number of runtime worker threads (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Number of worker threads (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    /// Fee rate retained from approved withdrawals
    #[arg(long = "withdrawal-fee-rate", value_name = "RATE", default_value = "0.05")]
    pub withdrawal_fee_rate: Decimal,

    /// Fee rate retained from approved deposits
    #[arg(long = "deposit-fee-rate", value_name = "RATE", default_value = "0")]
    pub deposit_fee_rate: Decimal,

    /// Decimal places of the smallest currency unit
    #[arg(long = "currency-scale", value_name = "PLACES", default_value_t = 2)]
    pub currency_scale: u32,

    /// Approval lease lifetime in milliseconds
    #[arg(long = "lease-ttl-ms", value_name = "MS", default_value_t = 30_000)]
    pub lease_ttl_ms: u64,

    /// Ledger compare-and-swap attempts before giving up with a conflict
    #[arg(long = "max-cas-attempts", value_name = "COUNT", default_value_t = 5)]
    pub max_cas_attempts: u32,

    /// Append the audit trail to this JSON-lines file
    #[arg(long = "audit-log", value_name = "PATH")]
    pub audit_log: Option<PathBuf>,

    /// Webhook endpoint notified after every decision (repeatable)
    #[arg(long = "webhook", value_name = "URL")]
    pub webhooks: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

/// Available processing strategies for CSV processing
#[derive(Clone, Debug, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Zero values fall back to defaults with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Create an EngineConfig from CLI arguments
    ///
    /// Fee rates outside `[0, 1)`, a currency scale above 18, a zero lease TTL
    /// and zero CAS attempts are replaced by defaults with a warning.
    ///
    /// # Returns
    ///
    /// An `EngineConfig` with values from CLI arguments or defaults.
    pub fn to_engine_config(&self) -> EngineConfig {
        let default = EngineConfig::default();

        let fees = FeeSchedule {
            deposit_rate: checked_rate(
                "deposit-fee-rate",
                self.deposit_fee_rate,
                default.fees.deposit_rate,
            ),
            withdrawal_rate: checked_rate(
                "withdrawal-fee-rate",
                self.withdrawal_fee_rate,
                default.fees.withdrawal_rate,
            ),
            currency_scale: if self.currency_scale > MAX_CURRENCY_SCALE {
                warn!(
                    currency_scale = self.currency_scale,
                    default = default.fees.currency_scale,
                    "currency scale too large, using default"
                );
                default.fees.currency_scale
            } else {
                self.currency_scale
            },
        };

        let lease_ttl = if self.lease_ttl_ms == 0 {
            warn!("lease TTL must be positive, using default");
            default.lease_ttl
        } else {
            Duration::from_millis(self.lease_ttl_ms)
        };

        let max_cas_attempts = if self.max_cas_attempts == 0 {
            warn!(
                default = default.max_cas_attempts,
                "max CAS attempts must be positive, using default"
            );
            default.max_cas_attempts
        } else {
            self.max_cas_attempts
        };

        EngineConfig {
            fees,
            lease_ttl,
            max_cas_attempts,
            ..default
        }
    }

    /// Everything the strategies need to assemble an engine
    pub fn to_engine_settings(&self) -> EngineSettings {
        EngineSettings {
            config: self.to_engine_config(),
            audit_log: self.audit_log.clone(),
            webhooks: self.webhooks.clone(),
        }
    }
}

fn checked_rate(flag: &str, rate: Decimal, default: Decimal) -> Decimal {
    if !FeeSchedule::is_valid_rate(rate) {
        warn!(flag, %rate, %default, "fee rate outside [0, 1), using default");
        default
    } else {
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // Strategy parsing tests
    #[rstest]
    #[case::default_strategy(&["program", "input.csv"], StrategyType::Sync)]
    #[case::explicit_sync(&["program", "--strategy", "sync", "input.csv"], StrategyType::Sync)]
    #[case::explicit_async(&["program", "--strategy", "async", "input.csv"], StrategyType::Async)]
    fn test_strategy_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        match (&parsed.strategy, &expected) {
            (StrategyType::Sync, StrategyType::Sync) => (),
            (StrategyType::Async, StrategyType::Async) => (),
            _ => panic!("Expected {:?}, got {:?}", expected, parsed.strategy),
        }
    }

    #[rstest]
    #[case::all_defaults(&["program", "input.csv"], 1000, num_cpus::get())]
    #[case::custom_batch_size(&["program", "--batch-size", "2000", "input.csv"], 2000, num_cpus::get())]
    #[case::custom_max_concurrent(&["program", "--max-concurrent", "8", "input.csv"], 1000, 8)]
    #[case::zero_batch_size(&["program", "--batch-size", "0", "input.csv"], 1000, num_cpus::get())]
    #[case::zero_max_concurrent(&["program", "--max-concurrent", "0", "input.csv"], 1000, num_cpus::get())]
    fn test_batch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let config = parsed.to_batch_config();

        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_max_concurrent);
    }

    #[test]
    fn test_engine_config_defaults_match_engine_defaults() {
        let parsed = CliArgs::try_parse_from(["program", "input.csv"]).unwrap();

        assert_eq!(parsed.to_engine_config(), EngineConfig::default());
    }

    #[test]
    fn test_engine_config_custom_values() {
        let parsed = CliArgs::try_parse_from([
            "program",
            "--withdrawal-fee-rate",
            "0.1",
            "--deposit-fee-rate",
            "0.01",
            "--currency-scale",
            "4",
            "--lease-ttl-ms",
            "250",
            "--max-cas-attempts",
            "9",
            "input.csv",
        ])
        .unwrap();

        let config = parsed.to_engine_config();
        assert_eq!(config.fees.withdrawal_rate, Decimal::new(1, 1));
        assert_eq!(config.fees.deposit_rate, Decimal::new(1, 2));
        assert_eq!(config.fees.currency_scale, 4);
        assert_eq!(config.lease_ttl, Duration::from_millis(250));
        assert_eq!(config.max_cas_attempts, 9);
    }

    #[rstest]
    #[case::rate_of_one(&["program", "--withdrawal-fee-rate", "1", "input.csv"])]
    #[case::negative_rate(&["program", "--deposit-fee-rate=-0.2", "input.csv"])]
    #[case::huge_scale(&["program", "--currency-scale", "40", "input.csv"])]
    #[case::zero_ttl(&["program", "--lease-ttl-ms", "0", "input.csv"])]
    #[case::zero_cas(&["program", "--max-cas-attempts", "0", "input.csv"])]
    fn test_engine_config_invalid_values_fallback(#[case] args: &[&str]) {
        let parsed = CliArgs::try_parse_from(args).unwrap();

        assert_eq!(parsed.to_engine_config(), EngineConfig::default());
    }

    #[test]
    fn test_engine_settings_collect_sinks() {
        let parsed = CliArgs::try_parse_from([
            "program",
            "--audit-log",
            "audit.jsonl",
            "--webhook",
            "http://localhost:8080/a",
            "--webhook",
            "http://localhost:8080/b",
            "-vv",
            "input.csv",
        ])
        .unwrap();

        let settings = parsed.to_engine_settings();
        assert_eq!(settings.audit_log, Some(PathBuf::from("audit.jsonl")));
        assert_eq!(settings.webhooks.len(), 2);
        assert_eq!(parsed.verbose, 2);
    }

    // Error handling tests
    #[rstest]
    #[case::missing_input(&["program"])]
    #[case::invalid_strategy(&["program", "--strategy", "invalid", "input.csv"])]
    #[case::invalid_rate(&["program", "--withdrawal-fee-rate", "abc", "input.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        let result = CliArgs::try_parse_from(args);
        assert!(result.is_err());
    }
}
