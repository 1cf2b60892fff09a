//! CSV trade ledger import/export.
//!
//! Columns: `Type, EntryPrice, ExitPrice, PositionSize, P/LAmount, P/LPercent,
//! EntryTime, ExitTime, DurationMins, ExitReason, Commissions, VirtualBalanceAfter`.
//! Prices and sizes carry 8 decimals, money and percentages 2, durations 0.
//! Times are RFC 3339 in UTC with milliseconds.

use std::io;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{ExitReason, PositionSide, Trade};

pub const LEDGER_HEADER: [&str; 12] = [
    "Type",
    "EntryPrice",
    "ExitPrice",
    "PositionSize",
    "P/LAmount",
    "P/LPercent",
    "EntryTime",
    "ExitTime",
    "DurationMins",
    "ExitReason",
    "Commissions",
    "VirtualBalanceAfter",
];

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger I/O: {0}")]
    Io(#[from] io::Error),
    #[error("ledger header has no '{0}' column")]
    MissingColumn(&'static str),
    #[error("ledger output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Why a single row was skipped on import.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("{found} fields, header has {expected}")]
    TooFewFields { found: usize, expected: usize },
    #[error("column {column}: '{value}' is not a number")]
    Number { column: &'static str, value: String },
    #[error("column {column}: '{value}' is not an ISO-8601 time")]
    Time { column: &'static str, value: String },
    #[error("unknown trade type '{0}'")]
    Side(String),
    #[error("unknown exit reason '{0}'")]
    ExitReason(String),
    #[error("exit time {exit} is before entry time {entry}")]
    TimeReversed {
        entry: DateTime<Utc>,
        exit: DateTime<Utc>,
    },
}

/// Result of reading a ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerImport {
    /// Accepted rows, in file order.
    pub trades: Vec<Trade>,
    /// `VirtualBalanceAfter` of the last accepted row, if the column is present.
    pub balance: Option<f64>,
    pub skipped: usize,
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write `trades` as a ledger, sorted by entry time.
pub fn write_ledger<W: io::Write>(writer: W, trades: &[Trade]) -> Result<(), LedgerError> {
    let mut sorted: Vec<&Trade> = trades.iter().collect();
    sorted.sort_by_key(|t| t.entry_time);

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(LEDGER_HEADER)?;
    for t in sorted {
        wtr.write_record([
            t.side.as_str().to_ascii_uppercase(),
            format!("{:.8}", t.entry_price),
            format!("{:.8}", t.exit_price),
            format!("{:.8}", t.size),
            format!("{:.2}", t.pnl_amount),
            format!("{:.2}", t.pnl_percent),
            format_time(t.entry_time),
            format_time(t.exit_time),
            format!("{:.0}", t.duration_minutes()),
            t.exit_reason.to_string(),
            format!("{:.2}", t.commissions),
            format!("{:.2}", t.balance_after),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Ledger as a string.
pub fn export_ledger(trades: &[Trade]) -> Result<String, LedgerError> {
    let mut buf = Vec::new();
    write_ledger(&mut buf, trades)?;
    Ok(String::from_utf8(buf)?)
}

/// Column positions resolved from the header row.
struct Columns {
    width: usize,
    side: usize,
    entry_price: usize,
    exit_price: usize,
    size: usize,
    pnl_amount: usize,
    pnl_percent: usize,
    entry_time: usize,
    exit_time: usize,
    exit_reason: Option<usize>,
    commissions: Option<usize>,
    balance: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, LedgerError> {
        let find = |name: &'static str| headers.iter().position(|h| h == name);
        let require = |name: &'static str| find(name).ok_or(LedgerError::MissingColumn(name));
        Ok(Self {
            width: headers.len(),
            side: require("Type")?,
            entry_price: require("EntryPrice")?,
            exit_price: require("ExitPrice")?,
            size: require("PositionSize")?,
            pnl_amount: require("P/LAmount")?,
            pnl_percent: require("P/LPercent")?,
            entry_time: require("EntryTime")?,
            exit_time: require("ExitTime")?,
            exit_reason: find("ExitReason"),
            commissions: find("Commissions"),
            balance: find("VirtualBalanceAfter"),
        })
    }
}

fn field<'r>(record: &'r csv::StringRecord, index: Option<usize>) -> Option<&'r str> {
    index.and_then(|i| record.get(i)).filter(|v| !v.is_empty())
}

fn number(record: &csv::StringRecord, index: usize, column: &'static str) -> Result<f64, RowError> {
    let raw = record.get(index).unwrap_or_default();
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RowError::Number {
            column,
            value: raw.to_string(),
        })
}

fn optional_number(
    record: &csv::StringRecord,
    index: Option<usize>,
    column: &'static str,
) -> Result<f64, RowError> {
    match (index, field(record, index)) {
        (Some(i), Some(_)) => number(record, i, column),
        _ => Ok(0.0),
    }
}

fn time(record: &csv::StringRecord, index: usize, column: &'static str) -> Result<DateTime<Utc>, RowError> {
    let raw = record.get(index).unwrap_or_default();
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| RowError::Time {
            column,
            value: raw.to_string(),
        })
}

fn parse_row(record: &csv::StringRecord, cols: &Columns) -> Result<Trade, RowError> {
    if record.len() < cols.width {
        return Err(RowError::TooFewFields {
            found: record.len(),
            expected: cols.width,
        });
    }
    let side = match record.get(cols.side).unwrap_or_default().to_ascii_lowercase().as_str() {
        "buy" => PositionSide::Buy,
        "sell" => PositionSide::Sell,
        other => return Err(RowError::Side(other.to_string())),
    };
    let exit_reason = match field(record, cols.exit_reason) {
        Some(raw) => raw
            .parse::<ExitReason>()
            .map_err(|_| RowError::ExitReason(raw.to_string()))?,
        None => ExitReason::Signal,
    };
    let entry_time = time(record, cols.entry_time, "EntryTime")?;
    let exit_time = time(record, cols.exit_time, "ExitTime")?;
    if exit_time < entry_time {
        return Err(RowError::TimeReversed {
            entry: entry_time,
            exit: exit_time,
        });
    }
    Ok(Trade {
        side,
        entry_price: number(record, cols.entry_price, "EntryPrice")?,
        exit_price: number(record, cols.exit_price, "ExitPrice")?,
        size: number(record, cols.size, "PositionSize")?,
        entry_time,
        exit_time,
        pnl_amount: number(record, cols.pnl_amount, "P/LAmount")?,
        pnl_percent: number(record, cols.pnl_percent, "P/LPercent")?,
        exit_reason,
        commissions: optional_number(record, cols.commissions, "Commissions")?,
        balance_after: optional_number(record, cols.balance, "VirtualBalanceAfter")?,
    })
}

/// Read a ledger. Columns are located by header name; bad rows are skipped
/// with a warning.
pub fn read_ledger<R: io::Read>(reader: R) -> Result<LedgerImport, LedgerError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let cols = Columns::resolve(rdr.headers()?)?;

    let mut import = LedgerImport::default();
    for (row, result) in rdr.records().enumerate() {
        let parsed = match result {
            Ok(record) => parse_row(&record, &cols).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match parsed {
            Ok(trade) => {
                if cols.balance.is_some() {
                    import.balance = Some(trade.balance_after);
                }
                import.trades.push(trade);
            }
            Err(reason) => {
                // +2: one-based, after the header
                warn!(line = row + 2, %reason, "skipping ledger row");
                import.skipped += 1;
            }
        }
    }
    debug!(trades = import.trades.len(), skipped = import.skipped, "ledger imported");
    Ok(import)
}

pub fn import_ledger(text: &str) -> Result<LedgerImport, LedgerError> {
    read_ledger(text.as_bytes())
}
