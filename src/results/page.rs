use std::collections::HashMap;
use std::sync::Arc;

use super::row::Row;
use crate::types::RowValues;

/// One materialized result set of a statement.
///
/// A statement that yields several result sets produces a singly linked chain of pages in
/// execution order; the head is returned to the caller and the rest are reached with
/// [`ResultPage::next`] or [`ResultPage::pages`].
#[derive(Debug, Clone, Default)]
pub struct ResultPage {
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
    rows: Vec<Row>,
    next: Option<Box<ResultPage>>,
}

impl ResultPage {
    /// Create an empty page with the given columns and preallocated row capacity.
    #[must_use]
    pub fn with_columns(column_names: Vec<String>, capacity: usize) -> Self {
        let column_index = column_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect::<HashMap<_, _>>();
        Self {
            column_names: Arc::new(column_names),
            column_index: Arc::new(column_index),
            rows: Vec::with_capacity(capacity),
            next: None,
        }
    }

    /// Append a row; values must be in column order.
    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        self.rows.push(Row::new(
            Arc::clone(&self.column_names),
            Arc::clone(&self.column_index),
            values,
        ));
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The page produced after this one, if any.
    #[must_use]
    pub fn next(&self) -> Option<&ResultPage> {
        self.next.as_deref()
    }

    /// Detach and return the following page.
    pub fn take_next(&mut self) -> Option<ResultPage> {
        self.next.take().map(|boxed| *boxed)
    }

    /// Walk this page and every page linked after it.
    pub fn pages(&self) -> impl Iterator<Item = &ResultPage> {
        std::iter::successors(Some(self), |page| page.next())
    }

    /// Number of pages in the chain starting here.
    #[must_use]
    pub fn chain_len(&self) -> usize {
        self.pages().count()
    }

    /// Link pages in order and return the head.
    pub(crate) fn link(pages: Vec<ResultPage>) -> Option<ResultPage> {
        pages.into_iter().rev().fold(None, |next, mut page| {
            page.next = next.map(Box::new);
            Some(page)
        })
    }
}

impl<'a> IntoIterator for &'a ResultPage {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(value: i64) -> ResultPage {
        let mut page = ResultPage::with_columns(vec!["v".into()], 1);
        page.add_row_values(vec![RowValues::Int(value)]);
        page
    }

    #[test]
    fn link_preserves_execution_order() {
        let head = ResultPage::link(vec![page(1), page(2), page(3)]).expect("head");
        let firsts: Vec<_> = head
            .pages()
            .map(|p| p.rows()[0].get("v").cloned())
            .collect();

        assert_eq!(head.chain_len(), 3);
        assert_eq!(
            firsts,
            vec![
                Some(RowValues::Int(1)),
                Some(RowValues::Int(2)),
                Some(RowValues::Int(3))
            ]
        );
        assert!(ResultPage::link(Vec::new()).is_none());
    }

    #[test]
    fn column_lookup_ignores_case_as_fallback() {
        let mut page = ResultPage::with_columns(vec!["NAME".into()], 1);
        page.add_row_values(vec![RowValues::Text("a".into())]);
        assert_eq!(page.rows()[0].get("name"), Some(&RowValues::Text("a".into())));
    }
}
