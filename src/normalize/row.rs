use std::collections::HashMap;

/// A raw cell value as handed over by a tabular decoder.
///
/// `Number` may carry `NaN`, which normalization turns into null. A missing
/// cell is not a variant: the column is simply absent from the [`Row`].
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Fields past the end of a CSV header, kept verbatim
    List(Vec<String>),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_owned())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// One flat record of column name to raw value, in column order.
///
/// Inserting a column twice keeps its first position and the last value,
/// which is how a header with duplicate names collapses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: HashMap<String, RawValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<RawValue>>(&mut self, column: K, value: V) {
        let column = column.into();
        if !self.values.contains_key(&column) {
            self.columns.push(column.clone());
        }
        self.values.insert(column, value.into());
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.values.get(column)
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> + '_ {
        self.columns
            .iter()
            .map(|column| (column.as_str(), &self.values[column]))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}
