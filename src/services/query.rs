// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gated read-only SQL access to the activity cache.
//!
//! Caller-supplied queries pass a validation pipeline before touching the
//! store:
//! 1. non-empty
//! 2. bounded length
//! 3. single statement (one trailing `;` tolerated)
//! 4. starts with SELECT or WITH
//! 5. no mutating keyword outside quoted literals
//! 6. executed on a read-only handle, only if sqlite compiles the statement
//!    as a pure data read
//!
//! Each stage refuses with its own [`QueryRejected`] variant so callers can
//! tell exactly why a query was turned away.

use crate::db::{ActivityStore, QueryOutput, StoreError};

/// Mutating or schema-altering keywords refused outside quoted literals.
///
/// `replace` also shadows the REPLACE() string function; losing that
/// function keeps the scan simple and is accepted.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "attach", "detach", "pragma",
    "reindex", "vacuum", "replace",
];

/// Why the gateway refused a query. One variant per pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryRejected {
    #[error("query is empty")]
    Empty,

    #[error("query is {len} characters long, the limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("multiple SQL statements are not allowed")]
    MultipleStatements,

    #[error("only SELECT queries are allowed")]
    NotSelect,

    #[error("forbidden keyword in query: {0}")]
    ForbiddenKeyword(&'static str),

    #[error("statement is not read-only")]
    NotReadOnly,
}

/// Errors out of one gated query run.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The query failed validation; nothing was executed.
    #[error(transparent)]
    Rejected(#[from] QueryRejected),

    /// The query passed validation but sqlite could not compile it (bad
    /// syntax, unknown table or column). Caller-fixable.
    #[error("{0}")]
    BadSql(String),

    /// The store itself failed.
    #[error(transparent)]
    Store(StoreError),
}

/// Validates and executes read-only queries against the cache.
///
/// Holds no connection; each run opens a fresh read-only handle that is
/// dropped on every exit path.
#[derive(Clone)]
pub struct QueryGateway {
    store: ActivityStore,
    max_len: usize,
}

impl QueryGateway {
    pub fn new(store: ActivityStore, max_len: usize) -> Self {
        Self { store, max_len }
    }

    /// Run one read-only query and collect its rows.
    ///
    /// An empty result set is a normal outcome, not an error.
    pub fn run_query(&self, text: &str) -> Result<QueryOutput, QueryError> {
        let sql = self.validate(text)?;
        tracing::debug!(sql, "Running gated query");
        match self.store.execute_readonly(sql) {
            Ok(output) => Ok(output),
            // Compiled to something other than a pure read, or a write
            // slipped through to the read-only file handle.
            Err(StoreError::NotReadOnly) => Err(QueryRejected::NotReadOnly.into()),
            Err(StoreError::Read(rusqlite::Error::SqlInputError { msg, .. })) => {
                Err(QueryError::BadSql(msg))
            }
            Err(err) => Err(QueryError::Store(err)),
        }
    }

    /// Stages 1-5 of the pipeline. Returns the statement to execute,
    /// trimmed and with the single tolerated trailing terminator removed.
    fn validate<'a>(&self, text: &'a str) -> Result<&'a str, QueryRejected> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(QueryRejected::Empty);
        }

        let len = text.chars().count();
        if len > self.max_len {
            return Err(QueryRejected::TooLong {
                len,
                max: self.max_len,
            });
        }

        // Any `;` beyond one trailing terminator means a stacked statement.
        // This check runs on the raw text, so a `;` inside a string literal
        // is also refused; conservative on purpose.
        let sql = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        if sql.contains(';') {
            return Err(QueryRejected::MultipleStatements);
        }

        let lowered = sql.to_lowercase();
        if !lowered.starts_with("select") && !lowered.starts_with("with") {
            return Err(QueryRejected::NotSelect);
        }

        if let Some(keyword) = forbidden_keyword(&scrub_literals(sql)) {
            return Err(QueryRejected::ForbiddenKeyword(keyword));
        }

        Ok(sql)
    }
}

/// Replace the body of every quoted string or identifier with a placeholder
/// so keywords inside literals cannot trip the scan. A doubled closing
/// quote is the SQL escape for the quote itself and stays inside the
/// literal. An unterminated literal swallows the rest of the text, which is
/// safe: sqlite would refuse to compile it anyway.
fn scrub_literals(sql: &str) -> String {
    let mut scrubbed = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                scrubbed.push(c);
                scrubbed.push('x');
                while let Some(inner) = chars.next() {
                    if inner != c {
                        continue;
                    }
                    if chars.peek() == Some(&c) {
                        chars.next();
                    } else {
                        scrubbed.push(c);
                        break;
                    }
                }
            }
            // [bracketed identifier]; no escape exists for `]`
            '[' => {
                scrubbed.push('[');
                scrubbed.push('x');
                for inner in chars.by_ref() {
                    if inner == ']' {
                        scrubbed.push(']');
                        break;
                    }
                }
            }
            _ => scrubbed.push(c),
        }
    }
    scrubbed
}

/// Word-boundary scan of scrubbed SQL for the forbidden keyword list.
/// `delete_me` is one word and passes; a bare `delete` does not.
fn forbidden_keyword(scrubbed: &str) -> Option<&'static str> {
    scrubbed
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|word| !word.is_empty())
        .find_map(|word| {
            FORBIDDEN_KEYWORDS
                .iter()
                .copied()
                .find(|keyword| word.eq_ignore_ascii_case(keyword))
        })
}
