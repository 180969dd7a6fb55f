//! End-to-end integration tests
//!
//! These tests validate the complete command pipeline using predefined CSV
//! test fixtures. Each test:
//! 1. Reads input.csv from a fixture directory
//! 2. Runs all commands through the engine
//! 3. Generates the ledger CSV
//! 4. Compares actual output with expected.csv
//!
//! Test fixtures are located in tests/fixtures/ and cover:
//! - Happy path approvals
//! - Insufficient balance and retried approvals
//! - Terminal states (duplicate submits, decided requests, rejections)
//! - Error conditions (unknown requests, invalid amounts, missing actors)
//! - Edge cases (precision, fees, malformed rows)
//!
//! Each test is run twice: once with the sync strategy and once with the async strategy.

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use rust_reconciliation_engine::cli::StrategyType;
    use rust_reconciliation_engine::strategy::{create_strategy, BatchConfig, EngineSettings};
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    /// Run a test fixture by processing input.csv and comparing with expected.csv
    ///
    /// This helper function:
    /// 1. Reads input.csv from tests/fixtures/{fixture_name}/
    /// 2. Runs all commands using the specified strategy
    /// 3. Generates output CSV to a temporary file
    /// 4. Reads expected.csv from the fixture directory
    /// 5. Compares actual output with expected output (normalized)
    ///
    /// # Arguments
    ///
    /// * `fixture_name` - Name of the fixture directory (e.g., "happy_path")
    /// * `strategy_type` - Processing strategy to use (Sync or Async)
    /// * `batch` - Async batch configuration (ignored for sync)
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - Input or expected files cannot be read
    /// - Output doesn't match expected (after normalization)
    fn run_test_fixture(
        fixture_name: &str,
        strategy_type: StrategyType,
        batch: Option<BatchConfig>,
    ) {
        // Construct paths to fixture files
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        // Verify fixture files exist
        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );
        assert!(
            Path::new(&expected_path).exists(),
            "Expected file not found: {}",
            expected_path
        );

        // Create processing strategy
        let strategy = create_strategy(strategy_type.clone(), EngineSettings::default(), batch);

        // Create temporary output file
        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");

        // Run all commands using the selected strategy
        strategy
            .process(Path::new(&input_path), &mut temp_output)
            .unwrap_or_else(|e| panic!("Failed to process commands: {}", e));

        // Flush output
        temp_output.flush().expect("Failed to flush temp file");

        // Read actual output from temp file
        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));

        // Read expected output
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (strategy: {:?})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, strategy_type, actual_output, expected_output
        );
    }

    /// End-to-end test for all fixtures with both processing strategies
    #[rstest]
    #[case("happy_path")]
    #[case("insufficient_balance")]
    #[case("terminal_states")]
    #[case("invalid_references")]
    #[case("malformed_data")]
    #[case("multiple_users")]
    #[case("precision")]
    #[case("withdrawal_fees")]
    fn test_fixtures(
        #[case] fixture: &str,
        #[values(StrategyType::Sync, StrategyType::Async)] strategy: StrategyType,
    ) {
        run_test_fixture(fixture, strategy, None);
    }

    /// Tiny batches split a user's submit and approval across batches
    #[rstest]
    #[case("happy_path")]
    #[case("insufficient_balance")]
    #[case("multiple_users")]
    fn test_fixtures_with_small_batches(#[case] fixture: &str, #[values(1, 3)] batch_size: usize) {
        run_test_fixture(
            fixture,
            StrategyType::Async,
            Some(BatchConfig::new(batch_size, 2)),
        );
    }

    #[test]
    fn test_audit_log_written_by_pipeline() {
        let audit = NamedTempFile::new().expect("Failed to create temp file");
        let settings = EngineSettings {
            audit_log: Some(audit.path().to_path_buf()),
            ..EngineSettings::default()
        };
        let strategy = create_strategy(StrategyType::Async, settings, None);
        let mut output = Vec::new();

        strategy
            .process(Path::new("tests/fixtures/multiple_users/input.csv"), &mut output)
            .unwrap();

        // Six approvals and one rejection reached a terminal status
        let trail = fs::read_to_string(audit.path()).unwrap();
        let entries: Vec<serde_json::Value> = trail
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 7);
        assert_eq!(
            entries
                .iter()
                .filter(|e| e["action"] == "deposit_rejected")
                .count(),
            1
        );
    }
}
