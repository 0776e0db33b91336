use crate::errors::{StoreError, TxStage};
use crate::types::ColumnValue;

pub struct QueryBuilder;

impl QueryBuilder {
    /// Build the positional INSERT template for a table and its ordered columns
    pub fn build_insert_template(database: &str, table: &str, columns: &[String]) -> String {
        let placeholders = vec!["?"; columns.len()].join(",");
        format!(
            "INSERT INTO {}.{} ({}) VALUES ({})",
            database,
            table,
            columns.join(","),
            placeholders
        )
    }
}

/// A parsed `INSERT ... VALUES (?, ...)` statement.
///
/// Rows executed against the statement are buffered into one block and sent
/// as a single multi-row INSERT on commit.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    head: String,
    tuple: String,
    placeholders: usize,
}

impl InsertStatement {
    /// Returns `Ok(None)` for blank SQL: there is nothing to prepare.
    pub fn parse(sql: &str) -> Result<Option<Self>, StoreError> {
        let sql = sql.trim().trim_end_matches(';').trim_end();
        if sql.is_empty() {
            return Ok(None);
        }

        let upper = sql.to_ascii_uppercase();
        if !upper.starts_with("INSERT") {
            return Err(StoreError::transaction(
                TxStage::Prepare,
                "only INSERT ... VALUES statements can be prepared",
            ));
        }
        let values_at = upper.rfind("VALUES").ok_or_else(|| {
            StoreError::transaction(TxStage::Prepare, "INSERT statement has no VALUES clause")
        })?;

        let head = sql[..values_at + "VALUES".len()].to_string();
        let tuple = sql[values_at + "VALUES".len()..].trim();
        if !(tuple.starts_with('(') && tuple.ends_with(')')) {
            return Err(StoreError::transaction(
                TxStage::Prepare,
                format!("malformed VALUES tuple: {}", tuple),
            ));
        }

        // The driver binds every `?` in the rendered block, quoted or not.
        let (placeholders, quoted) = count_placeholders(tuple);
        if quoted > 0 || head.contains('?') {
            return Err(StoreError::transaction(
                TxStage::Prepare,
                "`?` is only allowed as a bare placeholder inside the VALUES tuple",
            ));
        }

        Ok(Some(Self {
            head,
            tuple: tuple.to_string(),
            placeholders,
        }))
    }

    pub fn placeholders(&self) -> usize {
        self.placeholders
    }

    pub fn check_arity(&self, params: &[ColumnValue]) -> Result<(), StoreError> {
        if params.len() != self.placeholders {
            return Err(StoreError::transaction(
                TxStage::Exec,
                format!(
                    "statement expects {} parameters, got {}",
                    self.placeholders,
                    params.len()
                ),
            ));
        }
        Ok(())
    }

    /// Render the block statement for `rows` buffered rows; parameters bind in row order.
    pub fn render_block(&self, rows: usize) -> String {
        let tuples = vec![self.tuple.as_str(); rows].join(",");
        format!("{} {}", self.head, tuples)
    }
}

/// Count bare `?` placeholders and `?` characters inside quoted literals.
fn count_placeholders(tuple: &str) -> (usize, usize) {
    let mut count = 0;
    let mut quoted = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in tuple.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), '?') => quoted += 1,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') | (None, '`') => quote = Some(c),
            (None, '?') => count += 1,
            (None, _) => {}
        }
    }
    (count, quoted)
}
