//! Declarative cleaning operations
//!
//! A cleaning set is a JSON or YAML mapping such as
//!
//! ```yaml
//! drop_duplicates: true
//! fillna:
//!   Review_Rating: 0
//! ```
//!
//! Operations always run in a fixed order, deduplication first and null
//! filling second, whatever order the keys appear in. Unrecognized keys are
//! logged and skipped.

use crate::dataset::{Dataset, Value};
use crate::error::Result;
use crate::etl::Transformer;
use eyre::{Context, bail};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::Path;

/// Fill values for null fields
#[derive(Debug, Clone, PartialEq)]
pub enum FillSpec {
    /// Fill only the listed columns, each with its own value
    Columns(Vec<(String, Value)>),
    /// Fill every column with the same value
    All(Value),
}

/// One recognized cleaning operation
#[derive(Debug, Clone, PartialEq)]
pub enum CleaningOp {
    DropDuplicates,
    FillNa(FillSpec),
}

impl CleaningOp {
    /// Apply the operation, returning the number of rows removed or fields filled
    pub fn apply(&self, dataset: &mut Dataset) -> usize {
        match self {
            Self::DropDuplicates => drop_duplicates(dataset),
            Self::FillNa(FillSpec::Columns(fills)) => fills
                .iter()
                .map(|(column, fill)| match dataset.schema().index_of(column) {
                    Some(index) => fill_column(dataset, index, fill),
                    None => {
                        log::debug!("fillna: column '{}' not in dataset, skipping", column);
                        0
                    }
                })
                .sum(),
            Self::FillNa(FillSpec::All(fill)) => (0..dataset.schema().len())
                .map(|index| fill_column(dataset, index, fill))
                .sum(),
        }
    }
}

/// Keep the first occurrence of every distinct record, preserving order
fn drop_duplicates(dataset: &mut Dataset) -> usize {
    let before = dataset.len();
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(before);
        dataset.records().iter().map(|r| seen.insert(r)).collect()
    };
    let mut keep = keep.into_iter();
    dataset
        .records_mut()
        .retain(|_| keep.next().unwrap_or(true));
    before - dataset.len()
}

/// Replace nulls in one column, widening the column type if the fill value
/// does not fit it
fn fill_column(dataset: &mut Dataset, index: usize, fill: &Value) -> usize {
    let Some(fill_type) = fill.value_type() else {
        return 0;
    };
    let column_type = dataset.schema().columns()[index].value_type;
    let all_null = dataset.records().iter().all(|r| r[index].is_null());
    let target = if all_null {
        fill_type
    } else {
        column_type.unify(fill_type)
    };
    if target != column_type {
        log::debug!(
            "fillna: widening column '{}' from {} to {}",
            dataset.schema().columns()[index].name,
            column_type,
            target
        );
        dataset.cast_column(index, target);
    }

    let fill = fill
        .coerce(target)
        .unwrap_or_else(|| Value::Text(fill.to_string()));
    let mut filled = 0;
    for record in dataset.records_mut() {
        if record[index].is_null() {
            record[index] = fill.clone();
            filled += 1;
        }
    }
    filled
}

/// A parsed cleaning set
///
/// Unlike pandas `drop_duplicates().fillna()`, rows that differ only by a
/// null that fillna replaces with a value another row already holds end up
/// as one row: a closing deduplication runs after filling.
///
/// # Example
/// ```
/// use shopping_etl::etl::Transformer;
/// use shopping_etl::transform::CleaningPlan;
/// use shopping_etl::dataset::{Dataset, Value};
///
/// let plan = CleaningPlan::from_json_str(r#"{"fillna": {"rating": 0}}"#).unwrap();
/// let input = Dataset::infer(
///     vec!["rating".to_string()],
///     vec![vec![Some("4.5".to_string())], vec![None]],
/// )
/// .unwrap();
///
/// let output = plan.transform(input).unwrap();
/// assert_eq!(output.get(1, "rating"), Some(&Value::Float(0.0)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningPlan {
    drop_duplicates: bool,
    fillna: Option<FillSpec>,
}

impl Default for CleaningPlan {
    /// `{"drop_duplicates": true, "fillna": {"Review_Rating": 0}}`
    fn default() -> Self {
        Self {
            drop_duplicates: true,
            fillna: Some(FillSpec::Columns(vec![(
                "Review_Rating".to_string(),
                Value::Int(0),
            )])),
        }
    }
}

impl CleaningPlan {
    pub fn new(drop_duplicates: bool, fillna: Option<FillSpec>) -> Self {
        Self {
            drop_duplicates,
            fillna,
        }
    }

    /// A plan that changes nothing
    pub fn empty() -> Self {
        Self::new(false, None)
    }

    /// Parse a cleaning set from a JSON mapping
    ///
    /// `drop_duplicates` is enabled by any value other than `false`.
    /// `fillna` is either a mapping of column to fill value or a single
    /// scalar applied to every column.
    ///
    /// # Errors
    /// Returns an error if the set is not a mapping or a fill value is not
    /// a scalar.
    pub fn from_value(value: &JsonValue) -> eyre::Result<Self> {
        let Some(map) = value.as_object() else {
            bail!("Cleaning operations must be a mapping, got: {}", value);
        };

        let mut plan = Self::empty();
        for (key, op) in map {
            match key.as_str() {
                "drop_duplicates" => plan.drop_duplicates = op != &JsonValue::Bool(false),
                "fillna" => plan.fillna = parse_fillna(op)?,
                other => log::warn!("Ignoring unrecognized cleaning operation '{}'", other),
            }
        }
        Ok(plan)
    }

    pub fn from_json_str(s: &str) -> eyre::Result<Self> {
        let value: JsonValue = serde_json::from_str(s).context("Invalid cleaning operations JSON")?;
        Self::from_value(&value)
    }

    /// Load a cleaning set from a YAML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cleaning operations {}", path.display()))?;
        // JSON is valid YAML, so one parser covers both
        let value: JsonValue = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse cleaning operations {}", path.display()))?;
        Self::from_value(&value)
    }

    /// Operations in application order
    pub fn ops(&self) -> Vec<CleaningOp> {
        let mut ops = Vec::new();
        if self.drop_duplicates {
            ops.push(CleaningOp::DropDuplicates);
        }
        if let Some(fill) = &self.fillna {
            ops.push(CleaningOp::FillNa(fill.clone()));
        }
        ops
    }

    pub fn is_empty(&self) -> bool {
        !self.drop_duplicates && self.fillna.is_none()
    }
}

fn parse_fillna(op: &JsonValue) -> eyre::Result<Option<FillSpec>> {
    match op {
        JsonValue::Null => Ok(None),
        JsonValue::Object(columns) => {
            let mut fills = Vec::with_capacity(columns.len());
            for (column, fill) in columns {
                match fill_value(fill)
                    .with_context(|| format!("Invalid fillna value for column '{}'", column))?
                {
                    Some(value) => fills.push((column.clone(), value)),
                    None => log::warn!("fillna: null fill value for '{}' ignored", column),
                }
            }
            Ok(Some(FillSpec::Columns(fills)))
        }
        scalar => Ok(fill_value(scalar)
            .context("Invalid fillna value")?
            .map(FillSpec::All)),
    }
}

fn fill_value(value: &JsonValue) -> eyre::Result<Option<Value>> {
    Ok(match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(Value::Text(b.to_string())),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Some(Value::Int(i)),
            None => n.as_f64().map(Value::Float),
        },
        JsonValue::String(s) => Some(Value::Text(s.clone())),
        other => bail!("expected a scalar, got {}", other),
    })
}

impl Transformer for CleaningPlan {
    fn transform(&self, mut dataset: Dataset) -> Result<Dataset> {
        let mut filled = 0;
        for op in self.ops() {
            let changed = op.apply(&mut dataset);
            match op {
                CleaningOp::DropDuplicates => log::info!("Dropped {} duplicate rows", changed),
                CleaningOp::FillNa(_) => {
                    log::info!("Filled {} null fields", changed);
                    filled += changed;
                }
            }
        }

        // Filling can make two distinct rows equal. Deduplicating once more
        // keeps the output a fixed point of the same plan.
        if self.drop_duplicates && filled > 0 {
            let dropped = CleaningOp::DropDuplicates.apply(&mut dataset);
            if dropped > 0 {
                log::debug!("Dropped {} rows made identical by fillna", dropped);
            }
        }
        Ok(dataset)
    }
}
