use crate::driver::Statement;
use crate::error::SqlActionError;
use crate::types::RowValues;

/// Bind `params` to consecutive placeholders starting at 1.
///
/// Value conversion for the target column is left to the driver's `bind_positional`.
///
/// # Errors
/// Propagates the first binding error reported by the statement.
pub fn bind_parameters(
    statement: &mut dyn Statement,
    params: &[RowValues],
) -> Result<(), SqlActionError> {
    for (i, value) in params.iter().enumerate() {
        statement.bind_positional(i + 1, value)?;
    }
    Ok(())
}
