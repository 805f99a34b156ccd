//! Domain models for the ledger engine.

mod account;
mod entry;
mod period;

pub use account::{Account, AccountType, CreateAccount, UpdateAccount};
pub use entry::{
    Direction, EntryFilter, EntryWithLines, JournalEntry, JournalEntryLine, JournalStatus,
    LineInput, PostJournalEntry,
};
pub use period::{AccountingPeriod, CreatePeriod, YearEndClose};
