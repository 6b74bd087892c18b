//! Read-side query execution
//!
//! `QueryExecutor` runs single-table selects and two-table inner equi-joins.
//! Selects follow the optimizer's plan: an `IndexSeek` looks candidates up
//! through the named index, anything else reads the table. The WHERE
//! predicate is applied to every candidate either way.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::join::{JoinAlgorithm, JoinPlan, JoinStrategy};
use super::optimizer::{ExecutionPlan, ExecutionStrategy, QueryOptimizer};
use super::predicate::{qualified_column, Predicate};
use crate::catalog::{Column, TableRepository};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::storage::{IndexKey, IndexManager, Row, RowId, Table, Value};

/// Single-table SELECT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    /// Column names, or `*`
    pub columns: Vec<String>,
    pub table_name: String,
    pub where_clause: Option<String>,
}

impl SelectQuery {
    /// `SELECT * FROM table`
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            columns: vec!["*".to_string()],
            table_name: table_name.into(),
            where_clause: None,
        }
    }

    /// Select specific columns
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the WHERE clause
    pub fn filter(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    fn selects_all(&self) -> bool {
        self.columns.iter().any(|c| c.trim() == "*")
    }
}

/// Join kinds. Only `Inner` is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    FullOuter,
}

/// Two selects joined on `left_table.col = right_table.col`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinQuery {
    pub left: SelectQuery,
    pub right: SelectQuery,
    pub join_type: JoinType,
    pub condition: String,
}

impl JoinQuery {
    /// Inner join of two selects
    pub fn inner(left: SelectQuery, right: SelectQuery, condition: impl Into<String>) -> Self {
        Self {
            left,
            right,
            join_type: JoinType::Inner,
            condition: condition.into(),
        }
    }
}

/// Any read query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    Select(SelectQuery),
    Join(JoinQuery),
}

/// Query result set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Executes read queries
#[derive(Debug)]
pub struct QueryExecutor {
    tables: Arc<TableRepository>,
    indexes: Arc<IndexManager>,
    optimizer: QueryOptimizer,
    join_strategy: JoinStrategy,
    use_index_seek: bool,
}

impl QueryExecutor {
    pub fn new(
        tables: Arc<TableRepository>,
        indexes: Arc<IndexManager>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            optimizer: QueryOptimizer::new(tables.clone(), indexes.clone()),
            join_strategy: JoinStrategy::new(config),
            use_index_seek: config.use_index_seek,
            tables,
            indexes,
        }
    }

    pub fn execute(&self, query: &Query) -> Result<QueryResult> {
        match query {
            Query::Select(select) => self.execute_select(select),
            Query::Join(join) => self.execute_join(join),
        }
    }

    /// Run a single-table select
    pub fn execute_select(&self, query: &SelectQuery) -> Result<QueryResult> {
        let plan = self.optimizer.optimize(query)?;
        let predicate = plan.filter.as_deref().and_then(|clause| {
            let parsed = Predicate::parse(clause);
            if parsed.is_none() {
                debug!(clause, "unparsable WHERE clause, no filter applied");
            }
            parsed
        });

        let seek_ids = match (&predicate, self.use_index_seek) {
            (Some(predicate), true) => self.seek(&plan, predicate)?,
            _ => None,
        };

        let handle = self.tables.get_table(&query.table_name)?;
        let table = handle.read();

        let candidates: Vec<&Row> = match &seek_ids {
            Some(ids) => ids.iter().filter_map(|id| table.row(*id)).collect(),
            None => table.rows().map(|(_, row)| row).collect(),
        };

        let columns = select_columns(&table, query);
        let rows: Vec<Row> = candidates
            .into_iter()
            .filter(|row| predicate.as_ref().map_or(true, |p| p.matches(row)))
            .map(|row| project(row, &columns))
            .collect();

        debug!(
            table = %query.table_name,
            strategy = ?plan.strategy,
            rows = rows.len(),
            "select finished"
        );
        Ok(QueryResult { columns, rows })
    }

    /// Row ids for an index seek, in table order. `None` means scan.
    fn seek(&self, plan: &ExecutionPlan, predicate: &Predicate) -> Result<Option<Vec<RowId>>> {
        let index_name = match (&plan.strategy, &plan.index_name) {
            (ExecutionStrategy::IndexSeek, Some(name)) => name,
            _ => return Ok(None),
        };

        let data_type = {
            let handle = self.tables.get_table(&plan.table_name)?;
            let table = handle.read();
            match table.column(&predicate.column) {
                Some(column) => column.data_type,
                None => return Ok(None),
            }
        };
        // Index keys hold values converted to the column type
        let key = match data_type.convert(&predicate.literal) {
            Some(value) if !value.is_null() => IndexKey::new(value),
            _ => return Ok(None),
        };

        let index = match self.indexes.get_index(index_name) {
            Ok(index) => index,
            // Dropped since planning
            Err(Error::IndexNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut ids = index.read().search(&key);
        // Row ids grow with insertion, so this restores table order
        ids.sort();
        Ok(Some(ids))
    }

    /// Run an inner equi-join of two selects
    pub fn execute_join(&self, query: &JoinQuery) -> Result<QueryResult> {
        if query.join_type != JoinType::Inner {
            return Err(Error::Unsupported(format!(
                "{:?} join; only inner joins are executed",
                query.join_type
            )));
        }
        let (left_col, right_col) = join_columns(query)?;

        let left = self.execute_select(&query.left)?;
        let right = self.execute_select(&query.right)?;
        let left_col = result_column(&left, &left_col, &query.left.table_name)?;
        let right_col = result_column(&right, &right_col, &query.right.table_name)?;

        let plan = self.join_strategy.plan(
            &query.left.table_name,
            &query.right.table_name,
            query.join_type,
            &query.condition,
            left.len() as u64,
            right.len() as u64,
        );

        let pairs = match plan.algorithm {
            JoinAlgorithm::HashJoin => hash_join(&left.rows, &right.rows, &left_col, &right_col),
            _ => nested_loop_join(&left.rows, &right.rows, &left_col, &right_col),
        };

        let left_name = &query.left.table_name;
        let right_name = &query.right.table_name;
        let rows: Vec<Row> = pairs
            .into_iter()
            .map(|(l, r)| merge_rows(left_name, &left.rows[l], right_name, &right.rows[r]))
            .collect();

        let columns = qualify(left_name, left.columns)
            .chain(qualify(right_name, right.columns))
            .collect();

        debug!(
            algorithm = ?plan.algorithm,
            rows = rows.len(),
            "join finished"
        );
        Ok(QueryResult { columns, rows })
    }

    /// Access path a select would use
    pub fn explain(&self, query: &SelectQuery) -> Result<ExecutionPlan> {
        self.optimizer.optimize(query)
    }

    /// Join plan estimated from the current table sizes
    pub fn explain_join(&self, query: &JoinQuery) -> Result<JoinPlan> {
        let left_rows = self.tables.get_table(&query.left.table_name)?.read().row_count();
        let right_rows = self.tables.get_table(&query.right.table_name)?.read().row_count();
        Ok(self.join_strategy.plan(
            &query.left.table_name,
            &query.right.table_name,
            query.join_type,
            &query.condition,
            left_rows as u64,
            right_rows as u64,
        ))
    }
}

/// Columns named by the query, in schema order
fn select_columns(table: &Table, query: &SelectQuery) -> Vec<Column> {
    if query.selects_all() {
        return table.columns().to_vec();
    }
    table
        .columns()
        .iter()
        .filter(|c| query.columns.iter().any(|name| c.is_named(name.trim())))
        .cloned()
        .collect()
}

fn project(row: &Row, columns: &[Column]) -> Row {
    columns
        .iter()
        .map(|c| (c.name.clone(), row.get(&c.name).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// Split `a.x = b.y` into the left and right join columns. The sides may
/// be written in either order but must name the two joined tables.
fn join_columns(query: &JoinQuery) -> Result<(String, String)> {
    let unsupported = || Error::Unsupported(format!("join condition '{}'", query.condition));

    let (lhs, rhs) = query.condition.split_once('=').ok_or_else(unsupported)?;
    let (lhs_table, lhs_col) = qualified_column(lhs).ok_or_else(unsupported)?;
    let (rhs_table, rhs_col) = qualified_column(rhs).ok_or_else(unsupported)?;

    let left_table = query.left.table_name.as_str();
    let right_table = query.right.table_name.as_str();
    if lhs_table == left_table && rhs_table == right_table {
        Ok((lhs_col.to_string(), rhs_col.to_string()))
    } else if lhs_table == right_table && rhs_table == left_table {
        Ok((rhs_col.to_string(), lhs_col.to_string()))
    } else {
        Err(unsupported())
    }
}

/// Resolve a join column against a projected result
fn result_column(result: &QueryResult, column: &str, table: &str) -> Result<String> {
    result
        .columns
        .iter()
        .find(|c| c.is_named(column))
        .map(|c| c.name.clone())
        .ok_or_else(|| Error::ColumnNotFound(column.to_string(), table.to_string()))
}

fn join_key<'a>(row: &'a Row, column: &str) -> Option<&'a Value> {
    row.get(column).filter(|v| !v.is_null())
}

/// Matching (left, right) positions, left-major
fn nested_loop_join(left: &[Row], right: &[Row], left_col: &str, right_col: &str) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (l, left_row) in left.iter().enumerate() {
        let Some(key) = join_key(left_row, left_col) else {
            continue;
        };
        for (r, right_row) in right.iter().enumerate() {
            if join_key(right_row, right_col) == Some(key) {
                pairs.push((l, r));
            }
        }
    }
    pairs
}

/// Same pairs and order as `nested_loop_join`, via a hash table on the right
fn hash_join(left: &[Row], right: &[Row], left_col: &str, right_col: &str) -> Vec<(usize, usize)> {
    let mut table: HashMap<&Value, Vec<usize>> = HashMap::new();
    for (r, row) in right.iter().enumerate() {
        if let Some(key) = join_key(row, right_col) {
            table.entry(key).or_default().push(r);
        }
    }

    let mut pairs = Vec::new();
    for (l, row) in left.iter().enumerate() {
        if let Some(matches) = join_key(row, left_col).and_then(|key| table.get(key)) {
            pairs.extend(matches.iter().map(|r| (l, *r)));
        }
    }
    pairs
}

fn merge_rows(left_table: &str, left: &Row, right_table: &str, right: &Row) -> Row {
    let left_values = left
        .iter()
        .map(|(column, value)| (format!("{}.{}", left_table, column), value.clone()));
    let right_values = right
        .iter()
        .map(|(column, value)| (format!("{}.{}", right_table, column), value.clone()));
    left_values.chain(right_values).collect()
}

fn qualify(table: &str, columns: Vec<Column>) -> impl Iterator<Item = Column> + '_ {
    columns.into_iter().map(move |mut c| {
        c.name = format!("{}.{}", table, c.name);
        c
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, DataType, NoParentTables};
    use crate::storage::IndexKind;

    fn setup(config: &EngineConfig) -> (Arc<TableRepository>, Arc<IndexManager>, QueryExecutor) {
        let repo = Arc::new(TableRepository::new());
        let mut users = Table::from_defs(
            "users",
            &[
                ColumnDef::new("id", DataType::Int).primary_key(true),
                ColumnDef::new("name", DataType::Varchar(Some(20))),
                ColumnDef::new("age", DataType::Int),
            ],
        )
        .unwrap();
        for (id, name, age) in [(1, "alice", 30), (2, "bob", 25), (3, "carol", 30)] {
            users
                .add_row(Row::new().with("id", id).with("name", name).with("age", age))
                .unwrap();
        }
        let mut orders = Table::from_defs(
            "orders",
            &[
                ColumnDef::new("oid", DataType::Int).primary_key(true),
                ColumnDef::new("user_id", DataType::Int),
            ],
        )
        .unwrap();
        for (oid, user_id) in [(10, Value::Integer(1)), (11, Value::Integer(3)), (12, Value::Integer(1)), (13, Value::Null)] {
            orders
                .add_row(Row::new().with("oid", oid).with("user_id", user_id))
                .unwrap();
        }
        repo.create_table(users).unwrap();
        repo.create_table(orders).unwrap();

        let indexes = Arc::new(IndexManager::new(repo.clone()));
        let executor = QueryExecutor::new(repo.clone(), indexes.clone(), config);
        (repo, indexes, executor)
    }

    fn ids(result: &QueryResult, column: &str) -> Vec<i64> {
        result
            .rows
            .iter()
            .filter_map(|r| r.get(column).and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn test_select_all() {
        let (_, _, executor) = setup(&EngineConfig::default());
        let result = executor.execute_select(&SelectQuery::new("users")).unwrap();
        assert_eq!(result.column_names(), vec!["id", "name", "age"]);
        assert_eq!(ids(&result, "id"), vec![1, 2, 3]);
    }

    #[test]
    fn test_select_with_filter() {
        let (_, _, executor) = setup(&EngineConfig::default());
        let result = executor
            .execute_select(&SelectQuery::new("users").filter("age = 30"))
            .unwrap();
        assert_eq!(ids(&result, "id"), vec![1, 3]);

        let result = executor
            .execute_select(&SelectQuery::new("users").filter("name > 'B'"))
            .unwrap();
        assert_eq!(ids(&result, "id"), vec![2, 3]);
    }

    #[test]
    fn test_unparsable_filter_returns_everything() {
        let (_, _, executor) = setup(&EngineConfig::default());
        let result = executor
            .execute_select(&SelectQuery::new("users").filter("age BETWEEN 1 AND 2"))
            .unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_projection_keeps_schema_order() {
        let (_, _, executor) = setup(&EngineConfig::default());
        let result = executor
            .execute_select(&SelectQuery::new("users").columns(["age", "ID", "unknown"]))
            .unwrap();
        assert_eq!(result.column_names(), vec!["id", "age"]);
        assert_eq!(result.rows[0], Row::new().with("id", 1).with("age", 30));
    }

    #[test]
    fn test_missing_table() {
        let (_, _, executor) = setup(&EngineConfig::default());
        let result = executor.execute_select(&SelectQuery::new("ghosts"));
        assert!(matches!(result, Err(Error::TableNotFound(_))));
    }

    #[test]
    fn test_index_seek_matches_scan() {
        let (repo, indexes, executor) = setup(&EngineConfig::default());
        indexes
            .create_index("users", "idx_age", &["age".to_string()], IndexKind::Hash)
            .unwrap();

        // Move a row into the key after creation so id order and index order differ
        {
            let users = repo.get_table("users").unwrap();
            let mut users = users.write();
            let bob = users.find_row(&Row::new().with("id", 2).with("name", "bob").with("age", 25));
            users
                .update_row(bob.unwrap(), &Row::new().with("age", 30), &NoParentTables)
                .unwrap();
        }

        let query = SelectQuery::new("users").filter("age = 30.0");
        assert_eq!(executor.explain(&query).unwrap().strategy, ExecutionStrategy::IndexSeek);
        let seek = executor.execute_select(&query).unwrap();

        let scanner = QueryExecutor::new(repo, indexes, &EngineConfig::default().use_index_seek(false));
        let scan = scanner.execute_select(&query).unwrap();
        assert_eq!(ids(&seek, "id"), vec![1, 2, 3]);
        assert_eq!(seek, scan);
    }

    #[test]
    fn test_seek_and_scan_agree_on_exact_keys() {
        let repo = Arc::new(TableRepository::new());
        let mut points = Table::from_defs(
            "points",
            &[
                ColumnDef::new("id", DataType::Int).primary_key(true),
                ColumnDef::new("p", DataType::Decimal),
            ],
        )
        .unwrap();
        points
            .add_row(Row::new().with("id", 9_007_199_254_740_992i64).with("p", 1.5))
            .unwrap();
        points
            .add_row(Row::new().with("id", 9_007_199_254_740_993i64).with("p", -0.0))
            .unwrap();
        repo.create_table(points).unwrap();
        let indexes = Arc::new(IndexManager::new(repo.clone()));

        let run = |clause: &str| {
            let query = SelectQuery::new("points").filter(clause);
            let scanner = QueryExecutor::new(
                repo.clone(),
                indexes.clone(),
                &EngineConfig::default().use_index_seek(false),
            );
            let seeker = QueryExecutor::new(repo.clone(), indexes.clone(), &EngineConfig::default());
            (scanner.execute_select(&query).unwrap(), seeker.execute_select(&query).unwrap())
        };

        let (scan, _) = run("id = 9007199254740993");
        assert_eq!(ids(&scan, "id"), vec![9_007_199_254_740_993]);

        indexes
            .create_index("points", "idx_id", &["id".to_string()], IndexKind::Hash)
            .unwrap();
        indexes
            .create_index("points", "idx_p", &["p".to_string()], IndexKind::Ordered)
            .unwrap();

        for clause in ["id = 9007199254740993", "id = 9007199254740992", "p = 0"] {
            let (scan, seek) = run(clause);
            assert_eq!(scan.len(), 1, "{}", clause);
            assert_eq!(seek, scan, "{}", clause);
        }
    }

    #[test]
    fn test_join() {
        let (_, _, executor) = setup(&EngineConfig::default());
        let query = JoinQuery::inner(
            SelectQuery::new("users"),
            SelectQuery::new("orders"),
            "users.id = orders.user_id",
        );
        let result = executor.execute_join(&query).unwrap();

        assert_eq!(
            result.column_names(),
            vec!["users.id", "users.name", "users.age", "orders.oid", "orders.user_id"]
        );
        assert_eq!(ids(&result, "orders.oid"), vec![10, 12, 11]);
        assert_eq!(ids(&result, "users.id"), vec![1, 1, 3]);
    }

    #[test]
    fn test_join_condition_sides_swapped() {
        let (_, _, executor) = setup(&EngineConfig::default());
        let query = JoinQuery::inner(
            SelectQuery::new("users"),
            SelectQuery::new("orders"),
            "orders.user_id = users.id",
        );
        assert_eq!(executor.execute_join(&query).unwrap().len(), 3);
    }

    #[test]
    fn test_hash_join_same_as_nested_loop() {
        let config = EngineConfig::default().small_table_threshold(0);
        let (_, _, executor) = setup(&config);
        let query = JoinQuery::inner(
            SelectQuery::new("users"),
            SelectQuery::new("orders"),
            "users.id = orders.user_id",
        );
        assert_eq!(executor.explain_join(&query).unwrap().algorithm, JoinAlgorithm::HashJoin);
        let hashed = executor.execute_join(&query).unwrap();

        let (_, _, executor) = setup(&EngineConfig::default());
        let looped = executor.execute_join(&query).unwrap();
        assert_eq!(hashed, looped);
    }

    #[test]
    fn test_join_errors() {
        let (_, _, executor) = setup(&EngineConfig::default());
        let mut query = JoinQuery::inner(
            SelectQuery::new("users"),
            SelectQuery::new("orders"),
            "users.id = orders.user_id",
        );
        query.join_type = JoinType::Left;
        assert!(matches!(executor.execute_join(&query), Err(Error::Unsupported(_))));

        for condition in [
            "id",
            "users.id == orders.user_id",
            "users.id = payments.user_id",
            "u.id = o.user_id",
        ] {
            let query =
                JoinQuery::inner(SelectQuery::new("users"), SelectQuery::new("orders"), condition);
            assert!(
                matches!(executor.execute_join(&query), Err(Error::Unsupported(_))),
                "{}",
                condition
            );
        }

        let query = JoinQuery::inner(
            SelectQuery::new("users").columns(["name"]),
            SelectQuery::new("orders"),
            "users.id = orders.user_id",
        );
        assert!(matches!(executor.execute_join(&query), Err(Error::ColumnNotFound(_, _))));
    }
}
