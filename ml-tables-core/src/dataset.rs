//! Datasets handed to model training
//!
//! A [`Dataset`] names where rows come from and which columns play which
//! role. Sources are anything implementing [`AnyData`]: a lazy stream or a
//! materialized table.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::lazy::Lazy;
use crate::pattern::Pattern;
use crate::record::Record;
use crate::table::Table;

/// A source that can be streamed or materialized
pub trait AnyData: Send + Sync {
    /// Fresh stream over the rows
    fn lazy(&self) -> Lazy<Record>;

    /// Materialize the rows
    fn table(&self) -> Result<Table>;
}

impl AnyData for Lazy<Record> {
    fn lazy(&self) -> Lazy<Record> {
        self.clone()
    }

    fn table(&self) -> Result<Table> {
        self.collect()
    }
}

impl AnyData for Table {
    fn lazy(&self) -> Lazy<Record> {
        Table::lazy(self)
    }

    fn table(&self) -> Result<Table> {
        Ok(self.clone())
    }
}

/// Source data and column roles for training or prediction
#[derive(Clone)]
pub struct Dataset {
    /// Training rows
    pub source: Arc<dyn AnyData>,

    /// Validation rows; the source is used when absent
    pub validation: Option<Arc<dyn AnyData>>,

    /// Label column or pattern
    pub label: String,

    /// Boolean column marking test rows; empty when there is none
    pub test: String,

    /// Feature column patterns
    pub features: Vec<String>,
}

impl Dataset {
    /// Create a dataset over a source with no roles assigned
    pub fn new(source: impl AnyData + 'static) -> Self {
        Self {
            source: Arc::new(source),
            validation: None,
            label: String::new(),
            test: String::new(),
            features: Vec::new(),
        }
    }

    /// Set the validation source
    pub fn with_validation(mut self, validation: impl AnyData + 'static) -> Self {
        self.validation = Some(Arc::new(validation));
        self
    }

    /// Set the label column
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the test flag column
    pub fn with_test(mut self, test: impl Into<String>) -> Self {
        self.test = test.into();
        self
    }

    /// Set the feature patterns
    pub fn with_features<S: AsRef<str>>(mut self, features: &[S]) -> Self {
        self.features = features.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    /// Validation source, falling back to the training source
    pub fn validation(&self) -> &dyn AnyData {
        self.validation.as_deref().unwrap_or(self.source.as_ref())
    }

    /// Compiled feature patterns
    pub fn feature_patterns(&self) -> Result<Vec<Pattern>> {
        Pattern::all(&self.features)
    }

    /// Source rows not flagged as test rows
    pub fn train_rows(&self) -> Lazy<Record> {
        if self.test.is_empty() {
            self.source.lazy()
        } else {
            self.source.lazy().if_not_flag(&self.test)
        }
    }

    /// Validation rows flagged as test rows
    pub fn test_rows(&self) -> Lazy<Record> {
        if self.test.is_empty() {
            self.validation().lazy()
        } else {
            self.validation().lazy().if_flag(&self.test)
        }
    }

    /// Project rows onto the feature and label columns
    pub fn model_columns(&self, rows: &Lazy<Record>) -> Lazy<Record> {
        let mut patterns = self.features.clone();
        if !self.label.is_empty() {
            patterns.push(self.label.clone());
        }
        rows.only(&patterns)
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("validation", &self.validation.is_some())
            .field("label", &self.label)
            .field("test", &self.test)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn rows() -> Lazy<Record> {
        Lazy::from_records(
            (0..6)
                .map(|i| {
                    Record::from_pairs([
                        ("Feature1", Value::Float32(0.5)),
                        ("Feature2", Value::Int(i)),
                        ("Label", Value::Int(i % 2)),
                        ("Test", Value::Bool(i >= 4)),
                    ])
                    .unwrap()
                })
                .collect(),
        )
    }

    #[test]
    fn test_train_and_test_split() {
        let ds = Dataset::new(rows()).with_test("Test");
        assert_eq!(ds.train_rows().count().unwrap(), 4);
        assert_eq!(ds.test_rows().count().unwrap(), 2);
    }

    #[test]
    fn test_validation_falls_back_to_source() {
        let table = rows().collect().unwrap();
        let ds = Dataset::new(table.clone());
        assert_eq!(ds.validation().table().unwrap(), table);
        let other = Dataset::new(rows()).with_validation(table.slice(0, 2));
        assert_eq!(other.validation().table().unwrap().len(), 2);
    }

    #[test]
    fn test_model_columns() {
        let ds = Dataset::new(rows())
            .with_label("Label")
            .with_features(&["Feature*"]);
        assert_eq!(ds.feature_patterns().unwrap().len(), 1);
        let t = ds.model_columns(&ds.train_rows()).collect().unwrap();
        assert_eq!(t.names(), &["Feature1", "Feature2", "Label"]);
    }
}
