//! CSV format handling for operator commands and ledger output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CommandRecord structure for deserialization
//! - Conversion from CSV records to `Command`s
//! - Ledger account output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{Command, LedgerAccount, NewRequest, RequestKind};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// Payment method recorded when a submit row leaves it blank
pub const DEFAULT_METHOD: &str = "unspecified";

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns:
/// `action, request, user, kind, amount, method, actor, reason`.
/// Only `action` and `request` are required on every row; which of the others
/// must be present depends on the action.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct CommandRecord {
    pub action: String,
    pub request: String,
    pub user: Option<String>,
    pub kind: Option<String>,
    pub amount: Option<String>,
    pub method: Option<String>,
    pub actor: Option<String>,
    pub reason: Option<String>,
}

/// Trimmed field value, `None` when absent or blank
fn field(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Convert a CommandRecord to a Command
///
/// This function:
/// - Parses the action (case insensitive): `submit`, `approve` or `reject`
/// - For `submit`, requires `user`, `kind` and a decimal `amount`
/// - For `approve` and `reject`, requires `actor`
///
/// Amount sign and user validity beyond presence are left to the engine's
/// intake validation.
///
/// # Arguments
///
/// * `record` - The deserialized CSV record
///
/// # Returns
///
/// Result containing either:
/// - Ok(Command) - Successfully converted command
/// - Err(String) - Error message describing the conversion failure
pub fn convert_command_record(record: CommandRecord) -> Result<Command, String> {
    let request_id = record.request.trim().to_string();
    if request_id.is_empty() {
        return Err(format!("Missing request id for action '{}'", record.action));
    }

    match record.action.trim().to_lowercase().as_str() {
        "submit" => {
            let user_id = field(record.user)
                .ok_or_else(|| format!("Submit {} requires a user", request_id))?;

            let kind = match field(record.kind).map(|k| k.to_lowercase()).as_deref() {
                Some("deposit") => RequestKind::Deposit,
                Some("withdrawal") => RequestKind::Withdrawal,
                Some(other) => {
                    return Err(format!(
                        "Invalid request kind: '{}' for request {}",
                        other, request_id
                    ))
                }
                None => return Err(format!("Submit {} requires a kind", request_id)),
            };

            let amount = match field(record.amount) {
                Some(amount) => Decimal::from_str(&amount).map_err(|_| {
                    format!("Invalid amount '{}' for request {}", amount, request_id)
                })?,
                None => return Err(format!("Submit {} requires an amount", request_id)),
            };

            Ok(Command::Submit(NewRequest {
                id: request_id,
                kind,
                user_id,
                amount,
                method: field(record.method).unwrap_or_else(|| DEFAULT_METHOD.to_string()),
            }))
        }
        "approve" => {
            let actor_id = field(record.actor)
                .ok_or_else(|| format!("Approve {} requires an actor", request_id))?;
            Ok(Command::Approve {
                request_id,
                actor_id,
            })
        }
        "reject" => {
            let actor_id = field(record.actor)
                .ok_or_else(|| format!("Reject {} requires an actor", request_id))?;
            Ok(Command::Reject {
                request_id,
                actor_id,
                reason: field(record.reason),
            })
        }
        _ => Err(format!(
            "Invalid action: '{}' for request {}",
            record.action, request_id
        )),
    }
}

/// Write ledger accounts to CSV format
///
/// Writes accounts in CSV format with columns: user, balance, version.
/// Accounts are sorted by user id for deterministic output, and balances are
/// printed with exactly `currency_scale` decimal places.
///
/// # Arguments
///
/// * `accounts` - Slice of ledger accounts to write
/// * `currency_scale` - Decimal places of the smallest currency unit
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_accounts_csv(
    accounts: &[LedgerAccount],
    currency_scale: u32,
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["user", "balance", "version"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_accounts = accounts.to_vec();
    sorted_accounts.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    let precision = currency_scale as usize;
    for account in sorted_accounts {
        writer
            .write_record(&[
                account.user_id.clone(),
                format!("{:.*}", precision, account.balance),
                account.version.to_string(),
            ])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
