//! Persistence codecs: the per-instrument JSON snapshot and the CSV trade ledger.
//!
//! Both are pure string codecs. Where the bytes end up is the caller's business.

pub mod ledger;
pub mod snapshot;

pub use ledger::{
    export_ledger, import_ledger, read_ledger, write_ledger, LedgerError, LedgerImport, RowError,
    LEDGER_HEADER,
};
pub use snapshot::{instrument_key, restore_state, Snapshot, SnapshotError, SCHEMA_VERSION};
