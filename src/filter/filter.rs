use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::{FilterWhere, BODY_COLUMN};
use super::types::{FilterData, FilterOrderInfo, SqlResult};

pub struct Filter {
    table_name: String,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i32>,
    offset: Option<i32>,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        Self::validate_table_name(&table_name)?;
        Ok(Self {
            table_name,
            where_data: None,
            order_data: vec![],
            limit: None,
            offset: None,
        })
    }

    pub fn assign(&mut self, data: FilterData) -> Result<&mut Self, FilterError> {
        if let Some(where_clause) = data.where_clause { self.where_clause(where_clause)?; }
        if let Some(order) = data.order { self.order(order)?; }
        if let Some(limit) = data.limit { self.limit(limit, data.offset)?; }
        else if let Some(offset) = data.offset { self.limit(i32::MAX, Some(offset))?; }
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    pub fn order(&mut self, order_spec: Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(&order_spec)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: i32, offset: Option<i32>) -> Result<&mut Self, FilterError> {
        if limit < 0 { return Err(FilterError::BadPage("Limit must be non-negative".to_string())); }
        if let Some(off) = offset { if off < 0 { return Err(FilterError::BadPage("Offset must be non-negative".to_string())); } }
        self.limit = Some(limit);
        self.offset = offset;
        Ok(self)
    }

    // ========================================
    // In-memory application
    // ========================================

    pub fn matches(&self, document: &Map<String, Value>) -> Result<bool, FilterError> {
        match self.where_data {
            Some(ref where_data) => FilterWhere::matches(document, where_data),
            None => Ok(true),
        }
    }

    /// Filter, sort and page a set of documents the way the SQL would
    pub fn apply<I>(&self, documents: I) -> Result<Vec<Map<String, Value>>, FilterError>
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        let mut out = Vec::new();
        for document in documents {
            if self.matches(&document)? {
                out.push(document);
            }
        }
        FilterOrder::sort(&mut out, &self.order_data);

        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(out.into_iter().skip(offset).take(limit).collect())
    }

    // ========================================
    // SQL generation
    // ========================================

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql(0)?;
        let order_clause = FilterOrder::generate(&self.order_data);
        let limit_clause = self.build_limit_clause();

        let query = [
            format!("SELECT \"{}\"", BODY_COLUMN),
            format!("FROM \"{}\"", self.table_name),
            format!("WHERE {}", where_result.query),
            order_clause,
            limit_clause,
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        Ok(SqlResult { query, params: where_result.params })
    }

    pub fn to_where_sql(&self, starting_param_index: usize) -> Result<SqlResult, FilterError> {
        let (query, params) = match self.where_data {
            Some(ref where_data) => FilterWhere::generate(where_data, starting_param_index)?,
            None => ("1=1".to_string(), vec![]),
        };
        Ok(SqlResult { query, params })
    }

    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql(0)?;
        let query = format!("SELECT COUNT(*) AS count FROM \"{}\" WHERE {}", self.table_name, where_result.query);
        Ok(SqlResult { query, params: where_result.params })
    }

    /// Merge `set` into every matching document. `$1` is the JSON patch.
    pub fn to_update_sql(&self, set: &Map<String, Value>) -> Result<SqlResult, FilterError> {
        for key in set.keys() {
            FilterWhere::validate_column(key)?;
        }
        let where_result = self.to_where_sql(1)?;
        let query = format!(
            "UPDATE \"{table}\" SET \"{body}\" = \"{body}\" || $1::jsonb WHERE {cond}",
            table = self.table_name,
            body = BODY_COLUMN,
            cond = where_result.query
        );
        let mut params = vec![Value::Object(set.clone())];
        params.extend(where_result.params);
        Ok(SqlResult { query, params })
    }

    fn validate_table_name(name: &str) -> Result<(), FilterError> {
        if name.is_empty() { return Err(FilterError::BadCollection("Table name cannot be empty".to_string())); }
        FilterWhere::validate_column(name)
            .map_err(|_| FilterError::BadCollection(format!("Invalid table name format: {}", name)))
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(data: FilterData) -> Filter {
        let mut f = Filter::new("consents").unwrap();
        f.assign(data).unwrap();
        f
    }

    #[test]
    fn builds_select_sql() {
        let f = filter(FilterData::where_only(json!({ "logicalId": "C1" })).with_order(json!("version desc")).with_limit(1));
        let sql = f.to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT \"body\" FROM \"consents\" WHERE (\"body\"->>'logicalId') = $1 ORDER BY (\"body\"->'version') DESC LIMIT 1"
        );
        assert_eq!(sql.params, vec![json!("C1")]);
    }

    #[test]
    fn builds_update_sql_with_patch_first() {
        let f = filter(FilterData::where_only(json!({ "status": "ACTIVE" })));
        let mut set = Map::new();
        set.insert("status".into(), json!("EXPIRED"));
        let sql = f.to_update_sql(&set).unwrap();
        assert_eq!(
            sql.query,
            "UPDATE \"consents\" SET \"body\" = \"body\" || $1::jsonb WHERE (\"body\"->>'status') = $2"
        );
        assert_eq!(sql.params[0], json!({ "status": "EXPIRED" }));
    }

    #[test]
    fn applies_in_memory() {
        let docs = (1..=5).map(|v| json!({ "logicalId": "C1", "version": v }).as_object().cloned().unwrap());
        let f = filter(
            FilterData::where_only(json!({ "version": { "$gte": 2 } }))
                .with_order(json!("version desc"))
                .with_limit(2),
        );
        let out = f.apply(docs).unwrap();
        let versions: Vec<i64> = out.iter().filter_map(|d| d["version"].as_i64()).collect();
        assert_eq!(versions, vec![5, 4]);
    }

    #[test]
    fn rejects_bad_table() {
        assert!(Filter::new("").is_err());
        assert!(Filter::new("x\"; DROP").is_err());
    }
}
