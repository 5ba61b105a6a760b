//! Rewriting of `:name` placeholders into positional `?` placeholders.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::types::{ParamMap, RowValues};

static NAMED_PARAMETER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\w+)").expect("named parameter pattern is valid"));

/// SQL text with positional placeholders and the values to bind, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenSql {
    pub sql: String,
    /// One entry per `?`, so a name used twice appears twice.
    pub params: Vec<(String, RowValues)>,
}

impl RewrittenSql {
    /// Values in binding order.
    #[must_use]
    pub fn values(&self) -> Vec<RowValues> {
        self.params.iter().map(|(_, value)| value.clone()).collect()
    }
}

fn is_quote(c: char) -> bool {
    c == '\'' || c == '"'
}

/// A match is a parameter unless a quote sits directly before or after it. A preceding `:`
/// also disqualifies it so `value::type` casts survive.
fn is_parameter(sql: &str, start: usize, end: usize) -> bool {
    let before = sql[..start].chars().next_back();
    let after = sql[end..].chars().next();
    !before.is_some_and(|c| is_quote(c) || c == ':') && !after.is_some_and(is_quote)
}

/// Replace every `:identifier` token with `?` and collect the bound values left to right.
///
/// Names missing from `params` bind as [`RowValues::Null`].
///
/// ```rust
/// use sql_action_middleware::prelude::*;
///
/// let params = ParamMap::from([("n", "%a%")]);
/// let rewritten = rewrite_named_parameters("select * from t where name like :n", &params);
/// assert_eq!(rewritten.sql, "select * from t where name like ?");
/// assert_eq!(rewritten.values(), vec![RowValues::Text("%a%".into())]);
/// ```
#[must_use]
pub fn rewrite_named_parameters(sql: &str, params: &ParamMap) -> RewrittenSql {
    let mut out = String::with_capacity(sql.len());
    let mut ordered = Vec::new();
    let mut last = 0;

    for caps in NAMED_PARAMETER.captures_iter(sql) {
        let (Some(token), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !is_parameter(sql, token.start(), token.end()) {
            continue;
        }
        let name = name.as_str();
        let value = params.get(name).cloned().unwrap_or_else(|| {
            debug!(parameter = name, "named parameter not supplied; binding NULL");
            RowValues::Null
        });
        ordered.push((name.to_owned(), value));

        out.push_str(&sql[last..token.start()]);
        out.push('?');
        last = token.end();
    }
    out.push_str(&sql[last..]);

    RewrittenSql {
        sql: out,
        params: ordered,
    }
}
