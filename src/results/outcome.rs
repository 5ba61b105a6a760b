use super::page::ResultPage;
use crate::types::RowValues;

/// Result of a mutating statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Rows changed by the statement
    pub rows_affected: usize,
    /// Driver-reported generated keys; empty when unavailable
    pub generated_keys: Vec<RowValues>,
}

impl UpdateOutcome {
    #[must_use]
    pub fn new(rows_affected: usize, generated_keys: Vec<RowValues>) -> Self {
        Self {
            rows_affected,
            generated_keys,
        }
    }
}

/// What a [`SqlAction`](crate::actions::SqlAction) produced.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// Mutating verbs (insert, update, delete)
    Update(UpdateOutcome),
    /// Row-returning verbs; `None` when the statement produced no result set
    Rows(Option<ResultPage>),
}

impl ActionOutcome {
    #[must_use]
    pub fn into_update(self) -> Option<UpdateOutcome> {
        match self {
            ActionOutcome::Update(outcome) => Some(outcome),
            ActionOutcome::Rows(_) => None,
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Option<ResultPage> {
        match self {
            ActionOutcome::Rows(page) => page,
            ActionOutcome::Update(_) => None,
        }
    }
}
