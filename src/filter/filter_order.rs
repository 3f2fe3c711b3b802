use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_where::{compare_values, FilterWhere, BODY_COLUMN};
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                // Expect array of strings like ["version desc", "createdAt asc"]
                let mut out = Vec::new();
                for v in arr {
                    if let Value::String(s) = v {
                        out.extend(Self::parse_order_string(s));
                    }
                }
                out
            }
            Value::Object(obj) => {
                // { "version": "desc" }
                obj.iter()
                    .map(|(k, v)| FilterOrderInfo {
                        column: k.clone(),
                        sort: Self::parse_direction(v.as_str().unwrap_or("asc")),
                    })
                    .collect()
            }
            _ => vec![],
        };

        for info in &infos {
            FilterWhere::validate_column(&info.column)?;
        }
        Ok(infos)
    }

    fn parse_direction(dir: &str) -> SortDirection {
        if dir.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    fn parse_order_string(s: &str) -> Vec<FilterOrderInfo> {
        // split on commas, then each token into column and direction
        let mut out = Vec::new();
        for part in s.split(',') {
            let mut it = part.split_whitespace();
            if let Some(col) = it.next() {
                out.push(FilterOrderInfo {
                    column: col.to_string(),
                    sort: Self::parse_direction(it.next().unwrap_or("asc")),
                });
            }
        }
        out
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("(\"{}\"->'{}') {}", BODY_COLUMN, i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }

    /// Sort documents in memory; missing or incomparable values sort last
    pub fn sort(documents: &mut [Map<String, Value>], infos: &[FilterOrderInfo]) {
        if infos.is_empty() {
            return;
        }
        documents.sort_by(|a, b| {
            for info in infos {
                let ordering = match (a.get(&info.column), b.get(&info.column)) {
                    (Some(x), Some(y)) => {
                        let ord = compare_values(x, y).unwrap_or(Ordering::Equal);
                        match info.sort {
                            SortDirection::Asc => ord,
                            SortDirection::Desc => ord.reverse(),
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
}
