use tracing::{debug, trace};

use crate::driver::{Connection, KeyRequest, Statement};
use crate::error::SqlActionError;
use crate::results::{ActionOutcome, ResultPage, UpdateOutcome};
use crate::types::RowValues;

use super::binder::bind_parameters;
use super::{StatementMode, SynthesizedStatement};

/// Prepare, bind and run one synthesized statement on the session's connection.
pub(crate) fn execute_statement(
    conn: &mut dyn Connection,
    statement: &SynthesizedStatement,
) -> Result<ActionOutcome, SqlActionError> {
    let keys = match statement.mode {
        StatementMode::Update(keys) => keys,
        StatementMode::Rows | StatementMode::Discard => KeyRequest::NoReturn,
    };
    let mut prepared = conn.prepare(&statement.sql, keys)?;
    bind_parameters(prepared.as_mut(), &statement.params)?;

    let has_page = prepared.execute()?;
    match statement.mode {
        StatementMode::Rows => Ok(ActionOutcome::Rows(drain_pages(
            prepared.as_mut(),
            has_page,
        )?)),
        StatementMode::Update(_) => {
            // Pages from mixed batches are drained so the driver cursor is exhausted.
            drain_pages(prepared.as_mut(), has_page)?;
            let rows_affected = prepared.update_count();
            let generated_keys = read_generated_keys(prepared.as_mut());
            Ok(ActionOutcome::Update(UpdateOutcome::new(
                rows_affected,
                generated_keys,
            )))
        }
        StatementMode::Discard => {
            drain_pages(prepared.as_mut(), has_page)?;
            Ok(ActionOutcome::Update(UpdateOutcome::new(
                prepared.update_count(),
                Vec::new(),
            )))
        }
    }
}

/// Materialize every page the statement produced, in execution order.
fn drain_pages(
    statement: &mut dyn Statement,
    mut has_page: bool,
) -> Result<Option<ResultPage>, SqlActionError> {
    let mut pages = Vec::new();
    while has_page {
        let page = statement.result_page()?;
        trace!(rows = page.num_rows(), index = pages.len(), "result page read");
        pages.push(page);
        has_page = statement.more_results()?;
    }
    Ok(ResultPage::link(pages))
}

/// Best effort: a failed key read means "no keys", never a failed action.
fn read_generated_keys(statement: &mut dyn Statement) -> Vec<RowValues> {
    match statement.generated_keys() {
        Ok(keys) => keys.into_iter().filter(|k| !k.is_null()).collect(),
        Err(e) => {
            debug!(error = %e, "generated keys unavailable");
            Vec::new()
        }
    }
}
