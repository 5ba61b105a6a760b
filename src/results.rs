//! Portable, driver-independent result structures.

mod outcome;
mod page;
mod row;

pub use outcome::{ActionOutcome, UpdateOutcome};
pub use page::ResultPage;
pub use row::Row;
