use csv::{ReaderBuilder, Trim};
use std::io::Read;
use std::path::Path;

use crate::error::InputError;
use crate::ledger::models::TransferIntent;

/// Load the `address, amount` list from disk, preserving input order.
pub fn load_transfer_list(path: &Path) -> Result<Vec<TransferIntent>, InputError> {
    let file = std::fs::File::open(path).map_err(|e| InputError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_transfer_list(file)
}

/// Parse `address, amount` lines.
///
/// Fields are trimmed, blank lines and `#` comments are skipped and any
/// trailing fields are ignored (so `addr, 100,` is accepted).
pub fn parse_transfer_list<R: Read>(reader: R) -> Result<Vec<TransferIntent>, InputError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut intents = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| InputError::BadLine {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            reason: e.to_string(),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let address = record.get(0).unwrap_or("");
        let amount = record.get(1).unwrap_or("");

        if address.is_empty() {
            return Err(InputError::BadLine {
                line,
                reason: "missing address".to_string(),
            });
        }
        validate_amount(amount).map_err(|reason| InputError::BadLine { line, reason })?;

        intents.push(TransferIntent::new(address, amount));
    }

    Ok(intents)
}

/// Amounts are non-negative integers in the token's base unit, of any length.
fn validate_amount(amount: &str) -> Result<(), String> {
    if amount.is_empty() {
        return Err("missing amount".to_string());
    }
    if !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!(
            "amount '{}' is not a non-negative base-unit integer",
            amount
        ));
    }
    Ok(())
}
