use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};

/// Column holding the document in every collection table
pub const BODY_COLUMN: &str = "body";

/// Mongo-style WHERE clauses over JSON documents. The same clause is either
/// evaluated against a document in memory or compiled to JSONB SQL.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::MalformedSelector("WHERE must be an object".to_string())),
        }
    }

    pub fn validate_column(column: &str) -> Result<(), FilterError> {
        let mut chars = column.chars();
        let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FilterError::BadField(format!("Invalid field name format: {}", column)));
        }
        Ok(())
    }

    // ========================================
    // In-memory evaluation
    // ========================================

    pub fn matches(document: &Map<String, Value>, where_data: &Value) -> Result<bool, FilterError> {
        let obj = match where_data {
            Value::Null => return Ok(true),
            Value::Object(obj) => obj,
            _ => return Err(FilterError::MalformedSelector("WHERE must be an object".to_string())),
        };

        for (key, value) in obj {
            let matched = if key.starts_with('$') {
                Self::matches_logical(document, key, value)?
            } else {
                Self::validate_column(key)?;
                Self::matches_field(document, key, value)?
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches_logical(document: &Map<String, Value>, op: &str, value: &Value) -> Result<bool, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::BadOperand(format!("{} requires array", op)))?;
                let mut results = Vec::with_capacity(arr.len());
                for clause in arr {
                    results.push(Self::matches(document, clause)?);
                }
                Ok(if op == "$and" {
                    results.into_iter().all(|r| r)
                } else {
                    results.into_iter().any(|r| r)
                })
            }
            "$not" => Ok(!Self::matches(document, value)?),
            _ => Err(FilterError::UnknownOperator(op.to_string())),
        }
    }

    fn matches_field(document: &Map<String, Value>, field: &str, condition: &Value) -> Result<bool, FilterError> {
        let actual = document.get(field);
        let conditions = Self::field_conditions(field, condition)?;
        for info in conditions {
            if !Self::matches_condition(actual, &info)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches_condition(actual: Option<&Value>, info: &FilterWhereInfo) -> Result<bool, FilterError> {
        let actual_or_null = actual.unwrap_or(&Value::Null);
        Ok(match info.operator {
            FilterOp::Eq => values_equal(actual_or_null, &info.data),
            FilterOp::Ne => !values_equal(actual_or_null, &info.data),
            FilterOp::Gt => compare_values(actual_or_null, &info.data) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare_values(actual_or_null, &info.data),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare_values(actual_or_null, &info.data) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare_values(actual_or_null, &info.data),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::In => Self::in_values(&info.data)?.iter().any(|v| values_equal(actual_or_null, v)),
            FilterOp::NIn => !Self::in_values(&info.data)?.iter().any(|v| values_equal(actual_or_null, v)),
            FilterOp::Exists => {
                let wanted = info.data.as_bool().unwrap_or(true);
                actual.is_some() == wanted
            }
        })
    }

    fn in_values(data: &Value) -> Result<&Vec<Value>, FilterError> {
        data.as_array()
            .ok_or_else(|| FilterError::BadOperand("$in/$nin requires array".to_string()))
    }

    fn field_conditions(field: &str, value: &Value) -> Result<Vec<FilterWhereInfo>, FilterError> {
        match value {
            Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() => {
                let mut out = Vec::with_capacity(obj.len());
                for (op_key, op_val) in obj {
                    let operator =
                        FilterOp::parse(op_key).ok_or_else(|| FilterError::UnknownOperator(op_key.clone()))?;
                    out.push(FilterWhereInfo {
                        column: field.to_string(),
                        operator,
                        data: op_val.clone(),
                    });
                }
                Ok(out)
            }
            // Implicit equality: { field: value }
            _ => Ok(vec![FilterWhereInfo {
                column: field.to_string(),
                operator: FilterOp::Eq,
                data: value.clone(),
            }]),
        }
    }

    // ========================================
    // SQL generation (JSONB)
    // ========================================

    pub fn generate(where_data: &Value, starting_param_index: usize) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        let sql = filter_where.build(where_data)?;
        Ok((sql, filter_where.param_values))
    }

    fn build(&mut self, where_data: &Value) -> Result<String, FilterError> {
        let obj = match where_data {
            Value::Null => return Ok("1=1".to_string()),
            Value::Object(obj) => obj,
            _ => return Err(FilterError::MalformedSelector("WHERE must be an object".to_string())),
        };

        let mut sql_conditions = vec![];
        for (key, value) in obj {
            if key.starts_with('$') {
                sql_conditions.push(self.build_logical(key, value)?);
            } else {
                Self::validate_column(key)?;
                for info in Self::field_conditions(key, value)? {
                    sql_conditions.push(self.build_sql_condition(&info)?);
                }
            }
        }

        Ok(if sql_conditions.is_empty() {
            "1=1".to_string()
        } else {
            sql_conditions.join(" AND ")
        })
    }

    fn build_logical(&mut self, op: &str, value: &Value) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::BadOperand(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    return Ok(if op == "$and" { "1=1" } else { "1=0" }.to_string());
                }
                let mut sql_parts = Vec::with_capacity(arr.len());
                for clause in arr {
                    sql_parts.push(format!("({})", self.build(clause)?));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", sql_parts.join(joiner)))
            }
            "$not" => Ok(format!("NOT ({})", self.build(value)?)),
            _ => Err(FilterError::UnknownOperator(op.to_string())),
        }
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let text_path = format!("(\"{}\"->>'{}')", BODY_COLUMN, condition.column);

        match condition.operator {
            FilterOp::Exists => {
                let wanted = condition.data.as_bool().unwrap_or(true);
                let json_path = format!("(\"{}\"->'{}')", BODY_COLUMN, condition.column);
                Ok(format!("{} {}", json_path, if wanted { "IS NOT NULL" } else { "IS NULL" }))
            }
            FilterOp::Eq if condition.data.is_null() => Ok(format!("{} IS NULL", text_path)),
            FilterOp::Ne if condition.data.is_null() => Ok(format!("{} IS NOT NULL", text_path)),
            FilterOp::In | FilterOp::NIn => {
                let values = Self::in_values(&condition.data)?;
                if values.is_empty() {
                    return Ok(if condition.operator == FilterOp::In { "1=0" } else { "1=1" }.to_string());
                }
                let cast = sql_cast(&values[0]);
                let params: Vec<String> = values
                    .iter()
                    .map(|v| format!("{}{}", self.param(v.clone()), cast))
                    .collect();
                Ok(format!(
                    "{}{} {} ({})",
                    text_path,
                    cast,
                    condition.operator.to_sql(),
                    params.join(", ")
                ))
            }
            _ => {
                let cast = sql_cast(&condition.data);
                let placeholder = self.param(condition.data.clone());
                Ok(format!(
                    "{}{} {} {}{}",
                    text_path,
                    cast,
                    condition.operator.to_sql(),
                    placeholder,
                    cast
                ))
            }
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

/// Parameters are bound as text; the cast restores the JSON type
fn sql_cast(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "::numeric",
        Value::Bool(_) => "::boolean",
        _ => "",
    }
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
