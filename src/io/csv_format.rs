//! CSV format handling for update requests and account output
//!
//! Both readers deserialize rows into [`CsvRecord`] and hand them to
//! [`convert_csv_record`]; the runners print the final store contents with
//! [`write_accounts_csv`]. Nothing here opens files.

use crate::types::{Account, AccountId, UpdateRequest};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// One `account,action,amount` input row
///
/// An empty account column deserializes to `None` and is reported by the
/// coordinator as a missing account id.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    pub account: Option<AccountId>,
    pub action: String,
    pub amount: Option<String>,
}

/// Convert a CsvRecord to an UpdateRequest
///
/// The action is passed through verbatim; only the amount is parsed here.
///
/// # Returns
///
/// - Ok(UpdateRequest) - Successfully converted record
/// - Err(String) - The amount is missing or not a decimal number
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<UpdateRequest, String> {
    let amount = match csv_record.amount.as_deref().map(str::trim) {
        Some(amount_str) if !amount_str.is_empty() => Decimal::from_str(amount_str)
            .map_err(|_| format!("Invalid amount '{}' for {}", amount_str, describe(&csv_record)))?,
        _ => return Err(format!("Missing amount for {}", describe(&csv_record))),
    };

    Ok(UpdateRequest {
        account_id: csv_record.account,
        amount,
        action: csv_record.action,
    })
}

fn describe(record: &CsvRecord) -> String {
    match record.account {
        Some(account) => format!("{} on account {}", record.action, account),
        None => format!("{} without account", record.action),
    }
}

/// Print an `account,balance,version` snapshot
///
/// Rows are sorted by account id and balances carry four decimal places.
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["account", "balance", "version"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut by_id = accounts.to_vec();
    by_id.sort_by_key(|account| account.id);

    for account in by_id {
        writer
            .write_record(&[
                account.id.to_string(),
                format!("{:.4}", account.balance),
                account.version.to_string(),
            ])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(account: Option<AccountId>, action: &str, amount: Option<&str>) -> CsvRecord {
        CsvRecord {
            account,
            action: action.to_string(),
            amount: amount.map(str::to_string),
        }
    }

    #[rstest]
    #[case::deposit(record(Some(1), "deposit", Some("10.5")), Some(1), Decimal::new(105, 1))]
    #[case::padded_amount(record(Some(2), "withdrawal", Some(" 3 ")), Some(2), Decimal::new(3, 0))]
    #[case::missing_account(record(None, "deposit", Some("1")), None, Decimal::ONE)]
    fn test_convert_valid_records(
        #[case] input: CsvRecord,
        #[case] account: Option<AccountId>,
        #[case] amount: Decimal,
    ) {
        let request = convert_csv_record(input).unwrap();
        assert_eq!(request.account_id, account);
        assert_eq!(request.amount, amount);
    }

    #[test]
    fn test_unknown_action_passes_through() {
        let request = convert_csv_record(record(Some(1), "transfer", Some("5"))).unwrap();
        assert_eq!(request.action, "transfer");
    }

    #[rstest]
    #[case::missing_amount(record(Some(1), "deposit", None), "Missing amount for deposit on account 1")]
    #[case::empty_amount(record(Some(1), "deposit", Some("  ")), "Missing amount for deposit on account 1")]
    #[case::bad_amount(
        record(None, "withdrawal", Some("abc")),
        "Invalid amount 'abc' for withdrawal without account"
    )]
    fn test_convert_invalid_records(#[case] input: CsvRecord, #[case] expected: &str) {
        assert_eq!(convert_csv_record(input).unwrap_err(), expected);
    }

    #[test]
    fn test_write_accounts_csv_sorted_with_precision() {
        let accounts = vec![
            Account {
                id: 2,
                balance: Decimal::new(5, 1),
                version: 3,
            },
            Account::new(1),
        ];
        let mut output = Vec::new();

        write_accounts_csv(&accounts, &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "account,balance,version\n1,0.0000,0\n2,0.5000,3\n"
        );
    }
}
