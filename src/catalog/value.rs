use std::fmt;

/// A single column value. The derived ordering ranks by variant first
/// (NULL sorts lowest), then by the contained value, which is what the
/// sort and aggregation executors rely on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Text(String),
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Boolean(b) => write!(f, "{}", b),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// A row of column values, the unit passed between executors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    values: Vec<DataValue>,
}

impl Tuple {
    pub fn new(values: Vec<DataValue>) -> Self {
        Self { values }
    }

    pub fn value(&self, index: usize) -> Option<&DataValue> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[DataValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<DataValue> {
        self.values
    }

    /// Concatenate two rows, as joins do
    pub fn joined_with(&self, right: &Tuple) -> Tuple {
        let mut values = self.values.clone();
        values.extend(right.values.iter().cloned());
        Tuple::new(values)
    }

    /// Extend a row with `width` NULLs, the LEFT-join padding shape
    pub fn null_padded(&self, width: usize) -> Tuple {
        let mut values = self.values.clone();
        values.extend(std::iter::repeat(DataValue::Null).take(width));
        Tuple::new(values)
    }
}
