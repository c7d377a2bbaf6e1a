use crate::core::Value;

pub type Row = Vec<Value>;

/// Rows returned by a driver call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Rows touched by a write, as reported by the driver
    pub affected_rows: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: 0,
        }
    }

    pub fn affected(count: u64) -> Self {
        Self {
            affected_rows: count,
            ..Self::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    pub fn last_value(&self, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.last()?.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_lookup_ignores_column_case() {
        let result = QueryResult::new(
            vec!["Slave_IO_State".into(), "Seconds_Behind_Master".into()],
            vec![
                vec![Value::from("Waiting"), Value::Integer(2)],
                vec![Value::from("Waiting"), Value::Integer(7)],
            ],
        );

        assert_eq!(result.value(0, "seconds_behind_master"), Some(&Value::Integer(2)));
        assert_eq!(result.last_value("Seconds_Behind_Master"), Some(&Value::Integer(7)));
        assert_eq!(result.value(5, "Seconds_Behind_Master"), None);
        assert_eq!(result.value(0, "Missing"), None);
    }
}
