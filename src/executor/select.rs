//! SELECT execution.
//!
//! Pipeline: sources and joins, WHERE, grouping, projection, HAVING,
//! DISTINCT, ORDER BY, LIMIT.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use super::data_source::DataSource;
use super::evaluate::Evaluator;
use super::row::{Cell, EvalContext, Row};
use super::ResultSet;
use crate::ast::{
    Expression, JoinDescriptor, JoinType, OrderByItem, SelectItem, SelectQuery, SortDirection,
};
use crate::coerce;
use crate::config::EngineConfig;
use crate::error::{SqlError, SqlResult};
use crate::value::Value;

struct Relation {
    rows: Vec<Row>,
    /// Qualified column layout of `rows`, every value NULL
    header: Row,
}

/// A projected row with its ORDER BY keys.
struct Record {
    row: Row,
    sort_keys: Vec<Value>,
}

/// Read every row of a table, enforcing the configured scan limit.
pub(crate) fn scan_table(
    source: &dyn DataSource,
    config: &EngineConfig,
    table: &str,
) -> SqlResult<Vec<(usize, Row)>> {
    if source.schema(table).is_none() {
        return Err(SqlError::TableNotFound(table.to_string()));
    }
    let rows = source.scan(table)?;
    if let Some(limit) = config.max_scan_rows {
        if rows.len() > limit {
            return Err(SqlError::runtime(format!(
                "Scan of '{}' reads {} rows, more than max_scan_rows ({})",
                table,
                rows.len(),
                limit
            )));
        }
    }
    trace!("[SQL] Scanned {} rows from '{}'", rows.len(), table);
    Ok(rows)
}

/// Sort `items` by their ORDER BY keys. The sort is stable.
pub(crate) fn sort_by_keys<T>(
    items: &mut [T],
    order_by: &[OrderByItem],
    keys: impl Fn(&T) -> &[Value],
) {
    items.sort_by(|a, b| {
        for (item, (x, y)) in order_by.iter().zip(keys(a).iter().zip(keys(b))) {
            let ord = coerce::sort_cmp(x, y);
            let ord = match item.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Name of an output column: the alias, else the bare column name, else the
/// expression's source text.
fn output_name(item: &SelectItem) -> String {
    if let Some(alias) = &item.alias {
        return alias.clone();
    }
    match &item.expression {
        Expression::Column(column) => column.name.clone(),
        _ => item.text.clone(),
    }
}

/// Whether `*` (or `table.*`) expands to this source column.
fn in_wildcard(cell: &Cell, table: Option<&str>) -> bool {
    match table {
        Some(table) => cell.table.as_deref() == Some(table),
        None => !cell.qualified_only,
    }
}

/// Ordinal position (`ORDER BY 2`, `GROUP BY 1`) of a literal integer.
fn ordinal(expr: &Expression) -> Option<i64> {
    match expr {
        Expression::Literal(Value::Int(n)) => Some(*n),
        _ => None,
    }
}

pub(crate) struct SelectExecutor<'a> {
    source: &'a dyn DataSource,
    config: &'a EngineConfig,
}

impl<'a> SelectExecutor<'a> {
    pub fn new(source: &'a dyn DataSource, config: &'a EngineConfig) -> Self {
        Self { source, config }
    }

    /// Run a SELECT. `outer` is the enclosing row for a correlated subquery.
    pub fn execute(&self, query: &SelectQuery, outer: Option<&Row>) -> SqlResult<ResultSet> {
        let evaluator = Evaluator::new(self.source, self.config);
        let relation = self.resolve_from(&evaluator, &query.from, outer)?;
        let columns = self.output_columns(query, &relation.header)?;
        let scanned = relation.rows.len();

        let mut rows = Vec::with_capacity(scanned);
        for row in relation.rows {
            if let Some(predicate) = &query.where_clause {
                let ctx = EvalContext::single(&row).with_outer(outer);
                if !coerce::is_truthy(&evaluator.evaluate(predicate, &ctx)?) {
                    continue;
                }
            }
            rows.push(row);
        }

        let grouped = !query.group_by.is_empty()
            || query.items.iter().any(|i| i.expression.contains_aggregate())
            || query.having.as_ref().is_some_and(Expression::contains_aggregate)
            || query.order_by.iter().any(|o| o.expression.contains_aggregate());

        let mut records = Vec::new();
        if grouped {
            let groups = self.group(&evaluator, query, &relation.header, rows, outer)?;
            trace!("[SQL] Formed {} groups", groups.len());
            for group in &groups {
                let ctx = if group.is_empty() {
                    EvalContext::empty_group(&relation.header)
                } else {
                    EvalContext::group(group)
                }
                .with_outer(outer);
                if let Some(record) = self.project(&evaluator, query, &columns, ctx)? {
                    records.push(record);
                }
            }
        } else {
            for row in &rows {
                let ctx = EvalContext::single(row).with_outer(outer);
                if let Some(record) = self.project(&evaluator, query, &columns, ctx)? {
                    records.push(record);
                }
            }
        }

        if query.distinct {
            let mut seen = HashSet::new();
            records.retain(|record| {
                let values: Vec<Value> = record.row.iter().map(|(_, v)| v.clone()).collect();
                seen.insert(coerce::group_key(&values))
            });
        }

        if !query.order_by.is_empty() {
            sort_by_keys(&mut records, &query.order_by, |r| r.sort_keys.as_slice());
        }

        let mut rows: Vec<Row> = records.into_iter().map(|r| r.row).collect();
        if let Some(limit) = query.limit_clause {
            rows = rows
                .into_iter()
                .skip(limit.offset)
                .take(limit.row_count)
                .collect();
        }

        debug!(
            "[SQL] SELECT read {} rows, returned {}",
            scanned,
            rows.len()
        );
        Ok(ResultSet { columns, rows })
    }

    fn resolve_from(
        &self,
        evaluator: &Evaluator<'_>,
        from: &[JoinDescriptor],
        outer: Option<&Row>,
    ) -> SqlResult<Relation> {
        let Some((base, joins)) = from.split_first() else {
            // SELECT without FROM evaluates once against an empty row
            return Ok(Relation {
                rows: vec![Row::new()],
                header: Row::new(),
            });
        };

        let mut relation = self.load(base)?;
        for join in joins {
            let right = self.load(join)?;
            relation = self.join(evaluator, relation, right, join, outer)?;
        }
        Ok(relation)
    }

    /// Rows of a table or derived table, qualified by the source alias.
    fn load(&self, descriptor: &JoinDescriptor) -> SqlResult<Relation> {
        let alias = descriptor.alias.as_str();

        if let Some(subquery) = &descriptor.subquery {
            let result = self.execute(subquery, None)?;
            let mut header = Row::new();
            for column in &result.columns {
                header.push(Some(alias), column, Value::Null);
            }
            return Ok(Relation {
                header,
                rows: result.rows.into_iter().map(|r| r.qualified(alias)).collect(),
            });
        }

        let scanned = scan_table(self.source, self.config, &descriptor.name)?;
        let mut header = Row::new();
        if let Some(schema) = self.source.schema(&descriptor.name) {
            for column in &schema.columns {
                header.push(Some(alias), &column.name, Value::Null);
            }
        }
        Ok(Relation {
            rows: scanned.into_iter().map(|(_, r)| r.qualified(alias)).collect(),
            header,
        })
    }

    fn join(
        &self,
        evaluator: &Evaluator<'_>,
        left: Relation,
        right: Relation,
        descriptor: &JoinDescriptor,
        outer: Option<&Row>,
    ) -> SqlResult<Relation> {
        let matches = |row: &Row| -> SqlResult<bool> {
            match &descriptor.join_expression {
                Some(predicate) => {
                    let ctx = EvalContext::single(row).with_outer(outer);
                    Ok(coerce::is_truthy(&evaluator.evaluate(predicate, &ctx)?))
                }
                None => Ok(true),
            }
        };

        let mut rows = Vec::new();
        match descriptor.join_type {
            JoinType::Inner | JoinType::Cross => {
                for l in &left.rows {
                    for r in &right.rows {
                        let combined = l.join(r);
                        if matches(&combined)? {
                            rows.push(combined);
                        }
                    }
                }
            }
            JoinType::Left => {
                let padding = right.header.clone();
                for l in &left.rows {
                    let before = rows.len();
                    for r in &right.rows {
                        let combined = l.join(r);
                        if matches(&combined)? {
                            rows.push(combined);
                        }
                    }
                    if rows.len() == before {
                        rows.push(l.join(&padding));
                    }
                }
            }
            JoinType::Right => {
                let padding = left.header.clone();
                for r in &right.rows {
                    let before = rows.len();
                    for l in &left.rows {
                        let combined = l.join(r);
                        if matches(&combined)? {
                            rows.push(combined);
                        }
                    }
                    if rows.len() == before {
                        rows.push(padding.join(r));
                    }
                }
            }
        }

        trace!(
            "[SQL] {:?} JOIN '{}' produced {} rows",
            descriptor.join_type,
            descriptor.alias,
            rows.len()
        );

        let mut header = left.header.join(&right.header);

        // a USING column is one column to unqualified references; the copy
        // from the side an outer join may pad is reachable only by alias
        let right_alias = descriptor.alias.as_str();
        let hidden_side = |table: Option<&str>| match descriptor.join_type {
            JoinType::Right => table != Some(right_alias),
            _ => table == Some(right_alias),
        };
        for column in &descriptor.using_columns {
            header.hide_unqualified(column, hidden_side);
            for row in &mut rows {
                row.hide_unqualified(column, hidden_side);
            }
        }
        Ok(Relation { rows, header })
    }

    /// Output column names. A wildcard contributes every column it expands
    /// to, same-named ones included; other items reuse an existing name.
    fn output_columns(&self, query: &SelectQuery, header: &Row) -> SqlResult<Vec<String>> {
        let mut columns: Vec<String> = Vec::new();
        for item in &query.items {
            match &item.expression {
                Expression::Wildcard { table } => {
                    if let Some(table) = table {
                        let known = header
                            .cells()
                            .iter()
                            .any(|c| c.table.as_deref() == Some(table.as_str()));
                        if !known {
                            return Err(SqlError::runtime(format!("Unknown table '{}'", table)));
                        }
                    }
                    columns.extend(
                        header
                            .cells()
                            .iter()
                            .filter(|c| in_wildcard(c, table.as_deref()))
                            .map(|c| c.name.clone()),
                    );
                }
                _ => {
                    let name = output_name(item);
                    if !columns.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
                        columns.push(name);
                    }
                }
            }
        }
        Ok(columns)
    }

    /// Resolve a GROUP BY entry: ordinals and select aliases refer to select
    /// items; a name shared with a source column means the source column.
    fn resolve_group_expression<'q>(
        &self,
        query: &'q SelectQuery,
        header: &Row,
        expr: &'q Expression,
    ) -> SqlResult<&'q Expression> {
        if let Some(n) = ordinal(expr) {
            return match usize::try_from(n).ok().and_then(|n| n.checked_sub(1)) {
                Some(i) if i < query.items.len() => match &query.items[i].expression {
                    Expression::Wildcard { .. } => {
                        Err(SqlError::runtime("Cannot group by a '*' column"))
                    }
                    item => Ok(item),
                },
                _ => Err(SqlError::runtime(format!(
                    "Unknown column '{}' in 'group statement'",
                    n
                ))),
            };
        }

        if let Expression::Column(column) = expr {
            let is_source_column = header
                .cells()
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name));
            if column.table.is_none() && !is_source_column {
                let aliased = query.items.iter().find(|item| {
                    item.alias
                        .as_deref()
                        .is_some_and(|a| a.eq_ignore_ascii_case(&column.name))
                });
                if let Some(item) = aliased {
                    return Ok(&item.expression);
                }
            }
        }
        Ok(expr)
    }

    /// Partition rows into groups in first-seen key order. Without GROUP BY
    /// every row belongs to one group, which may be empty.
    fn group(
        &self,
        evaluator: &Evaluator<'_>,
        query: &SelectQuery,
        header: &Row,
        rows: Vec<Row>,
        outer: Option<&Row>,
    ) -> SqlResult<Vec<Vec<Row>>> {
        if query.group_by.is_empty() {
            return Ok(vec![rows]);
        }

        let key_exprs = query
            .group_by
            .iter()
            .map(|e| self.resolve_group_expression(query, header, e))
            .collect::<SqlResult<Vec<_>>>()?;

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Vec<Row>> = Vec::new();
        for row in rows {
            let ctx = EvalContext::single(&row).with_outer(outer);
            let values = key_exprs
                .iter()
                .map(|e| evaluator.evaluate(e, &ctx))
                .collect::<SqlResult<Vec<_>>>()?;
            match index.get(&coerce::group_key(&values)) {
                Some(&i) => groups[i].push(row),
                None => {
                    index.insert(coerce::group_key(&values), groups.len());
                    groups.push(vec![row]);
                }
            }
        }
        Ok(groups)
    }

    /// Output row for one context, or `None` if HAVING rejects it.
    fn project(
        &self,
        evaluator: &Evaluator<'_>,
        query: &SelectQuery,
        columns: &[String],
        ctx: EvalContext<'_>,
    ) -> SqlResult<Option<Record>> {
        let mut out = Row::new();
        for item in &query.items {
            match &item.expression {
                Expression::Wildcard { table } => {
                    if let Some(source) = ctx.representative() {
                        for cell in source.cells() {
                            if in_wildcard(cell, table.as_deref()) {
                                out.push(None, &cell.name, cell.value.clone());
                            }
                        }
                    }
                }
                expr => {
                    let value = evaluator.evaluate(expr, &ctx)?;
                    out.set(&output_name(item), value);
                }
            }
        }

        let visible = ctx.with_aliases(&out);
        if let Some(having) = &query.having {
            if !coerce::is_truthy(&evaluator.evaluate(having, &visible)?) {
                return Ok(None);
            }
        }

        let mut sort_keys = Vec::with_capacity(query.order_by.len());
        for item in &query.order_by {
            let key = match ordinal(&item.expression) {
                Some(n) => usize::try_from(n)
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| columns.get(i))
                    .and_then(|name| out.get(name))
                    .cloned()
                    .ok_or_else(|| {
                        SqlError::runtime(format!("Unknown column '{}' in 'order clause'", n))
                    })?,
                None => evaluator.evaluate(&item.expression, &visible)?,
            };
            sort_keys.push(key);
        }

        Ok(Some(Record {
            row: out,
            sort_keys,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Query;
    use crate::executor::data_source::{ColumnDef, DataType, TableSchema};
    use crate::executor::InMemoryStore;
    use crate::parser::parse;
    use serde_json::json;

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.create_table(
            TableSchema::new("t")
                .column(ColumnDef::new("id", DataType::Integer))
                .column(ColumnDef::new("grp", DataType::String))
                .column(ColumnDef::new("n", DataType::Integer))
                .primary_key(&["id"]),
        );
        for (id, grp, n) in [(1, "a", 10), (2, "b", 20), (3, "a", 30), (4, "c", 40)] {
            store
                .insert_json("t", json!({"id": id, "grp": grp, "n": n}))
                .unwrap();
        }
        store
    }

    fn select(store: &InMemoryStore, sql: &str) -> SqlResult<ResultSet> {
        let Query::Select(query) = parse(sql)? else {
            panic!("not a SELECT: {}", sql);
        };
        let config = EngineConfig::default();
        SelectExecutor::new(store, &config).execute(&query, None)
    }

    #[test]
    fn test_where_order_limit() {
        let store = store();
        let result = select(&store, "SELECT id FROM t WHERE n > 10 ORDER BY n DESC LIMIT 2").unwrap();
        assert_eq!(result.columns, vec!["id"]);
        assert_eq!(result.to_json(), vec![json!({"id": 4}), json!({"id": 3})]);
    }

    #[test]
    fn test_group_by_encounter_order() {
        let store = store();
        let result = select(&store, "SELECT grp, SUM(n) AS total FROM t GROUP BY grp").unwrap();
        assert_eq!(
            result.to_json(),
            vec![
                json!({"grp": "a", "total": 40}),
                json!({"grp": "b", "total": 20}),
                json!({"grp": "c", "total": 40}),
            ]
        );
    }

    #[test]
    fn test_group_by_ordinal_and_alias() {
        let store = store();
        let by_ordinal = select(&store, "SELECT grp AS g, COUNT(*) FROM t GROUP BY 1").unwrap();
        let by_alias = select(&store, "SELECT grp AS g, COUNT(*) FROM t GROUP BY g").unwrap();
        assert_eq!(by_ordinal, by_alias);
        assert_eq!(by_alias.rows.len(), 3);
        assert_eq!(by_alias.columns, vec!["g", "COUNT(*)"]);
    }

    #[test]
    fn test_implicit_group_over_empty_input() {
        let store = store();
        let result = select(&store, "SELECT COUNT(*) AS c, MAX(n) AS m FROM t WHERE id > 100").unwrap();
        assert_eq!(result.to_json(), vec![json!({"c": 0, "m": null})]);

        let result = select(&store, "SELECT COUNT(*) AS c, grp FROM t WHERE 0").unwrap();
        assert_eq!(result.to_json(), vec![json!({"c": 0, "grp": null})]);

        let err = select(&store, "SELECT COUNT(*), nope FROM t WHERE 0").unwrap_err();
        assert_eq!(err, SqlError::runtime("Unknown column 'nope'"));
    }

    #[test]
    fn test_having_sees_aliases() {
        let store = store();
        let result = select(
            &store,
            "SELECT grp, SUM(n) AS total FROM t GROUP BY grp HAVING total > 20 ORDER BY total, grp",
        )
        .unwrap();
        let groups: Vec<_> = result.rows.iter().map(|r| r.get("grp").cloned()).collect();
        assert_eq!(groups, vec![Some(Value::from("a")), Some(Value::from("c"))]);
    }

    #[test]
    fn test_distinct_and_ordinal_order() {
        let store = store();
        let result = select(&store, "SELECT DISTINCT grp FROM t ORDER BY 1 DESC").unwrap();
        assert_eq!(
            result.to_json(),
            vec![json!({"grp": "c"}), json!({"grp": "b"}), json!({"grp": "a"})]
        );
        assert!(select(&store, "SELECT grp FROM t ORDER BY 5").is_err());
    }

    #[test]
    fn test_limit_offset() {
        let store = store();
        let result = select(&store, "SELECT id FROM t ORDER BY id LIMIT 1, 2").unwrap();
        assert_eq!(result.to_json(), vec![json!({"id": 2}), json!({"id": 3})]);
    }

    #[test]
    fn test_select_without_from() {
        let store = store();
        let result = select(&store, "SELECT 1 + 1 AS two, 'x'").unwrap();
        assert_eq!(result.columns, vec!["two", "'x'"]);
        assert_eq!(result.to_json(), vec![json!({"two": 2, "'x'": "x"})]);
    }

    #[test]
    fn test_wildcards() {
        let store = store();
        let result = select(&store, "SELECT * FROM t WHERE id = 1").unwrap();
        assert_eq!(result.columns, vec!["id", "grp", "n"]);

        let result = select(&store, "SELECT a.*, b.id AS other FROM t a JOIN t b ON a.id = b.id - 1 WHERE a.id = 1").unwrap();
        assert_eq!(result.to_json(), vec![json!({"id": 1, "grp": "a", "n": 10, "other": 2})]);

        assert!(select(&store, "SELECT x.* FROM t").is_err());

        // both sides keep their columns
        let result = select(&store, "SELECT * FROM t a JOIN t b ON b.id = a.id + 1 WHERE a.id = 1").unwrap();
        assert_eq!(result.columns, vec!["id", "grp", "n", "id", "grp", "n"]);
        let values: Vec<Value> = result.rows[0].iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(
            values,
            vec![
                Value::Int(1),
                Value::from("a"),
                Value::Int(10),
                Value::Int(2),
                Value::from("b"),
                Value::Int(20),
            ]
        );

        let err = select(&store, "SELECT n FROM t a JOIN t b ON b.id = a.id").unwrap_err();
        assert_eq!(err, SqlError::runtime("Column 'n' in field list is ambiguous"));
    }

    #[test]
    fn test_using_column_is_shared() {
        let store = store();
        let result = select(&store, "SELECT * FROM t a JOIN t b USING (id) WHERE id = 3").unwrap();
        assert_eq!(result.columns, vec!["id", "grp", "n", "grp", "n"]);
        assert_eq!(result.rows[0].get("id"), Some(&Value::Int(3)));

        // unmatched RIGHT JOIN rows still expose the right-hand id
        let result = select(
            &store,
            "SELECT id FROM (SELECT id FROM t WHERE id > 2) a RIGHT JOIN t b USING (id) ORDER BY id",
        )
        .unwrap();
        assert_eq!(result.column("id"), vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
    }

    #[test]
    fn test_derived_table() {
        let store = store();
        let result = select(
            &store,
            "SELECT d.total FROM (SELECT grp, SUM(n) AS total FROM t GROUP BY grp) AS d WHERE d.grp = 'a'",
        )
        .unwrap();
        assert_eq!(result.to_json(), vec![json!({"total": 40})]);
    }

    #[test]
    fn test_unknown_table() {
        let store = store();
        assert_eq!(
            select(&store, "SELECT * FROM nope").unwrap_err(),
            SqlError::TableNotFound("nope".into())
        );
    }

    #[test]
    fn test_max_scan_rows() {
        let store = store();
        let Query::Select(query) = parse("SELECT * FROM t").unwrap() else {
            unreachable!()
        };
        let config = EngineConfig::default().with_max_scan_rows(2);
        let err = SelectExecutor::new(&store, &config).execute(&query, None).unwrap_err();
        assert!(err.is_runtime_error());
    }

    #[test]
    fn test_only_full_group_by() {
        let store = store();
        let Query::Select(query) = parse("SELECT grp, n FROM t GROUP BY grp").unwrap() else {
            unreachable!()
        };
        let lenient = EngineConfig::default();
        let result = SelectExecutor::new(&store, &lenient).execute(&query, None).unwrap();
        assert_eq!(result.rows[0].get("n"), Some(&Value::Int(10)));

        let strict = EngineConfig::default().with_only_full_group_by(true);
        assert!(SelectExecutor::new(&store, &strict).execute(&query, None).is_err());
    }
}
