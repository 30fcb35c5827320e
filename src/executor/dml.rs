//! UPDATE, DELETE and INSERT execution.
//!
//! Each statement is planned against a snapshot of the table into one
//! complete `MutationSet`, which is then handed to the data source in a
//! single `apply` call. A failing statement leaves the table untouched.

use tracing::{debug, warn};

use super::data_source::{ColumnDef, DataSource, MutationSet, RowId, TableSchema};
use super::evaluate::Evaluator;
use super::row::{EvalContext, Row};
use super::select::{scan_table, sort_by_keys, SelectExecutor};
use super::MutationSummary;
use crate::ast::{
    Assignment, DeleteQuery, Expression, InsertQuery, LimitClause, OrderByItem, UpdateQuery,
};
use crate::coerce;
use crate::config::EngineConfig;
use crate::error::{SqlError, SqlResult};
use crate::value::Value;

fn unknown_column(name: &str) -> SqlError {
    SqlError::runtime(format!("Unknown column '{}' in 'field list'", name))
}

fn schema_of(source: &dyn DataSource, table: &str) -> SqlResult<TableSchema> {
    source
        .schema(table)
        .cloned()
        .ok_or_else(|| SqlError::TableNotFound(table.to_string()))
}

/// Value to store in `column`: cast to the column type, with NOT NULL
/// enforced or, outside strict mode, replaced by the implicit default.
fn stored_value(
    column: &ColumnDef,
    value: Value,
    omitted: bool,
    config: &EngineConfig,
) -> SqlResult<Value> {
    if !value.is_null() {
        return Ok(column.data_type.cast(&value));
    }
    if column.nullable {
        return Ok(Value::Null);
    }
    if config.strict_mode {
        return Err(SqlError::runtime(if omitted {
            format!("Field '{}' doesn't have a default value", column.name)
        } else {
            format!("Column '{}' cannot be null", column.name)
        }));
    }
    warn!(
        "[SQL] NULL written to NOT NULL column '{}'; using implicit default",
        column.name
    );
    Ok(column.data_type.implicit_default())
}

/// Apply assignments in order to a copy of `row`. Later assignments see the
/// values written by earlier ones.
fn apply_assignments(
    evaluator: &Evaluator<'_>,
    schema: &TableSchema,
    config: &EngineConfig,
    row: &Row,
    assignments: &[Assignment],
    proposed: Option<&Row>,
) -> SqlResult<Row> {
    let mut working = row.clone();
    for assignment in assignments {
        let column = resolve_column(schema, assignment)?;
        let mut ctx = EvalContext::single(&working);
        ctx.proposed = proposed;
        let value = evaluator.evaluate(&assignment.expression, &ctx)?;
        let value = stored_value(column, value, false, config)?;
        working.replace(&column.name, value);
    }
    Ok(working)
}

fn resolve_column<'s>(schema: &'s TableSchema, assignment: &Assignment) -> SqlResult<&'s ColumnDef> {
    let target = &assignment.column;
    if target.table.as_deref().is_some_and(|t| t != schema.name) {
        return Err(unknown_column(&format!(
            "{}.{}",
            target.table.as_deref().unwrap_or_default(),
            target.name
        )));
    }
    schema
        .find_column(&target.name)
        .ok_or_else(|| unknown_column(&target.name))
}

/// Rows of a single-table statement that pass WHERE, in ORDER BY order and
/// cut to LIMIT.
fn select_targets(
    evaluator: &Evaluator<'_>,
    rows: Vec<(RowId, Row)>,
    where_clause: Option<&Expression>,
    order_by: &[OrderByItem],
    limit: Option<LimitClause>,
) -> SqlResult<Vec<(RowId, Row)>> {
    struct Target {
        id: RowId,
        row: Row,
        sort_keys: Vec<Value>,
    }

    let mut targets = Vec::new();
    for (id, row) in rows {
        let ctx = EvalContext::single(&row);
        if let Some(predicate) = where_clause {
            if !coerce::is_truthy(&evaluator.evaluate(predicate, &ctx)?) {
                continue;
            }
        }
        let sort_keys = order_by
            .iter()
            .map(|item| evaluator.evaluate(&item.expression, &ctx))
            .collect::<SqlResult<Vec<_>>>()?;
        targets.push(Target { id, row, sort_keys });
    }

    sort_by_keys(&mut targets, order_by, |t| t.sort_keys.as_slice());

    let (offset, count) = limit.map_or((0, usize::MAX), |l| (l.offset, l.row_count));
    Ok(targets
        .into_iter()
        .skip(offset)
        .take(count)
        .map(|t| (t.id, t.row))
        .collect())
}

// ---------------------------------------------------------------------------
// Unique keys
// ---------------------------------------------------------------------------

/// Values of a key, or `None` if any of them is NULL (NULLs never collide).
fn key_values(row: &Row, key: &[String]) -> Option<Vec<Value>> {
    key.iter()
        .map(|column| row.get(column).filter(|v| !v.is_null()).cloned())
        .collect()
}

fn same_key(a: &Row, b: &Row, key: &[String]) -> bool {
    match (key_values(a, key), key_values(b, key)) {
        (Some(x), Some(y)) => coerce::group_key(&x) == coerce::group_key(&y),
        _ => false,
    }
}

fn duplicate_entry(schema: &TableSchema, row: &Row, key: &[String]) -> SqlError {
    let entry = key
        .iter()
        .map(|column| row.get(column).map(coerce::to_text).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("-");
    let key_name = if key == schema.primary_key.as_slice() {
        "PRIMARY".to_string()
    } else {
        key.join(",")
    };
    SqlError::runtime(format!(
        "Duplicate entry '{}' for key '{}'",
        entry, key_name
    ))
}

// ---------------------------------------------------------------------------
// UPDATE
// ---------------------------------------------------------------------------

fn plan_update(
    source: &dyn DataSource,
    config: &EngineConfig,
    query: &UpdateQuery,
) -> SqlResult<(MutationSet, MutationSummary)> {
    let schema = schema_of(source, &query.table)?;
    for assignment in &query.set_clause {
        resolve_column(&schema, assignment)?;
    }

    let evaluator = Evaluator::new(source, config);
    let mut table: Vec<(RowId, Row)> = scan_table(source, config, &query.table)?
        .into_iter()
        .map(|(id, row)| (id, row.qualified(&query.table)))
        .collect();

    let targets = select_targets(
        &evaluator,
        table.clone(),
        query.where_clause.as_ref(),
        &query.order_by,
        query.limit_clause,
    )?;
    let matched_rows = targets.len();

    let mut updates = Vec::new();
    for (id, row) in targets {
        let updated = apply_assignments(&evaluator, &schema, config, &row, &query.set_clause, None)?;
        if updated == row {
            continue;
        }
        let mut changes = Row::new();
        for (cell, before) in updated.cells().iter().zip(row.cells()) {
            if !coerce::strict_equal(&cell.value, &before.value) {
                changes.set(&cell.name, cell.value.clone());
            }
        }
        if let Some(slot) = table.iter_mut().find(|(row_id, _)| *row_id == id) {
            slot.1 = updated;
        }
        updates.push((id, changes));
    }

    // changed rows must not collide with any other row on a unique key
    for (id, changes) in &updates {
        let Some((_, row)) = table.iter().find(|(row_id, _)| row_id == id) else {
            continue;
        };
        for key in schema.keys() {
            if !key.iter().any(|column| changes.get(column).is_some()) {
                continue;
            }
            if table
                .iter()
                .any(|(other_id, other)| other_id != id && same_key(row, other, key))
            {
                return Err(duplicate_entry(&schema, row, key));
            }
        }
    }

    let summary = MutationSummary {
        affected_rows: updates.len(),
        matched_rows,
        last_insert_id: None,
    };
    Ok((
        MutationSet {
            updates,
            ..MutationSet::default()
        },
        summary,
    ))
}

pub(crate) fn execute_update(
    source: &mut dyn DataSource,
    config: &EngineConfig,
    query: &UpdateQuery,
) -> SqlResult<MutationSummary> {
    let (mutations, summary) = plan_update(source, config, query)?;
    source.apply(&query.table, mutations)?;
    debug!(
        "[SQL] UPDATE '{}': {} matched, {} changed",
        query.table, summary.matched_rows, summary.affected_rows
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// DELETE
// ---------------------------------------------------------------------------

pub(crate) fn execute_delete(
    source: &mut dyn DataSource,
    config: &EngineConfig,
    query: &DeleteQuery,
) -> SqlResult<MutationSummary> {
    let from = query
        .from_clause
        .as_ref()
        .ok_or_else(|| SqlError::runtime("DELETE requires a FROM clause"))?;
    if from.subquery.is_some() {
        return Err(SqlError::runtime("The target table of the DELETE is not updatable"));
    }

    let deletes: Vec<RowId> = {
        let evaluator = Evaluator::new(&*source, config);
        let rows = scan_table(&*source, config, &from.name)?
            .into_iter()
            .map(|(id, row)| (id, row.qualified(&from.alias)))
            .collect();
        select_targets(
            &evaluator,
            rows,
            query.where_clause.as_ref(),
            &query.order_by,
            query.limit_clause,
        )?
        .into_iter()
        .map(|(id, _)| id)
        .collect()
    };

    let count = deletes.len();
    source.apply(
        &from.name,
        MutationSet {
            deletes,
            ..MutationSet::default()
        },
    )?;
    debug!("[SQL] DELETE '{}': {} rows", from.name, count);

    Ok(MutationSummary {
        affected_rows: count,
        matched_rows: count,
        last_insert_id: None,
    })
}

// ---------------------------------------------------------------------------
// INSERT
// ---------------------------------------------------------------------------

/// Where a staged row lives while an INSERT is planned.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Stored(usize),
    Pending(usize),
}

/// Rows proposed by the VALUES, SELECT or SET form, keyed by column name.
fn proposed_rows(
    source: &dyn DataSource,
    config: &EngineConfig,
    evaluator: &Evaluator<'_>,
    schema: &TableSchema,
    query: &InsertQuery,
) -> SqlResult<Vec<Row>> {
    if !query.set_clause.is_empty() {
        let mut row = Row::new();
        for assignment in &query.set_clause {
            let column = resolve_column(schema, assignment)?;
            let value = evaluator.evaluate(&assignment.expression, &EvalContext::single(&row))?;
            row.set(&column.name, value);
        }
        return Ok(vec![row]);
    }

    let columns: Vec<String> = if query.columns.is_empty() {
        schema.columns.iter().map(|c| c.name.clone()).collect()
    } else {
        let mut names: Vec<String> = Vec::with_capacity(query.columns.len());
        for name in &query.columns {
            let column = schema.find_column(name).ok_or_else(|| unknown_column(name))?;
            if names.iter().any(|n| n.eq_ignore_ascii_case(&column.name)) {
                return Err(SqlError::runtime(format!(
                    "Column '{}' specified twice",
                    column.name
                )));
            }
            names.push(column.name.clone());
        }
        names
    };

    let mut rows = Vec::new();
    if let Some(select) = &query.select {
        let result = SelectExecutor::new(source, config).execute(select, None)?;
        if result.columns.len() != columns.len() {
            return Err(SqlError::runtime(
                "Column count doesn't match value count at row 1",
            ));
        }
        for selected in &result.rows {
            rows.push(
                columns
                    .iter()
                    .zip(&result.columns)
                    .map(|(column, output)| {
                        (column.clone(), selected.get(output).cloned().unwrap_or_default())
                    })
                    .collect(),
            );
        }
        return Ok(rows);
    }

    let empty = Row::new();
    for (n, values) in query.values.iter().enumerate() {
        if values.len() != columns.len() {
            return Err(SqlError::runtime(format!(
                "Column count doesn't match value count at row {}",
                n + 1
            )));
        }
        let mut row = Row::new();
        for (column, expr) in columns.iter().zip(values) {
            row.set(column, evaluator.evaluate(expr, &EvalContext::single(&empty))?);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Tracks auto-increment assignment across the rows of one INSERT.
struct AutoIncrement {
    next: i64,
    first_generated: Option<i64>,
}

/// A proposed row completed with defaults and generated ids, in schema order.
fn complete_row(
    schema: &TableSchema,
    config: &EngineConfig,
    proposed: &Row,
    auto: &mut AutoIncrement,
) -> SqlResult<Row> {
    let mut row = Row::new();
    for column in &schema.columns {
        let provided = proposed.get(&column.name);
        let value = match provided {
            Some(value) => value.clone(),
            None => column.default.clone().unwrap_or_default(),
        };

        let value = if column.auto_increment {
            let explicit = coerce::to_int(&value);
            if value.is_null() || explicit == 0 {
                let id = auto.next;
                auto.first_generated.get_or_insert(id);
                auto.next = id.saturating_add(1);
                Value::Int(id)
            } else {
                auto.next = auto.next.max(explicit.saturating_add(1));
                Value::Int(explicit)
            }
        } else {
            let omitted = provided.is_none() && column.default.is_none();
            stored_value(column, value, omitted, config)?
        };
        row.set(&column.name, value);
    }
    Ok(row.qualified(&schema.name))
}

fn find_conflict(
    schema: &TableSchema,
    stored: &[(RowId, Row)],
    pending: &[Row],
    candidate: &Row,
) -> Option<(Slot, Vec<String>)> {
    for key in schema.keys() {
        if let Some(i) = stored.iter().position(|(_, row)| same_key(row, candidate, key)) {
            return Some((Slot::Stored(i), key.clone()));
        }
        if let Some(i) = pending.iter().position(|row| same_key(row, candidate, key)) {
            return Some((Slot::Pending(i), key.clone()));
        }
    }
    None
}

/// A unique key `row` shares with any staged row other than `slot` itself.
fn key_clash(
    schema: &TableSchema,
    stored: &[(RowId, Row)],
    pending: &[Row],
    slot: Slot,
    row: &Row,
) -> Option<Vec<String>> {
    schema
        .keys()
        .find(|key| {
            let clashes_stored = stored.iter().enumerate().any(|(i, (_, other))| {
                !matches!(slot, Slot::Stored(s) if s == i) && same_key(row, other, key)
            });
            clashes_stored
                || pending.iter().enumerate().any(|(i, other)| {
                    !matches!(slot, Slot::Pending(p) if p == i) && same_key(row, other, key)
                })
        })
        .cloned()
}

fn plan_insert(
    source: &dyn DataSource,
    config: &EngineConfig,
    query: &InsertQuery,
) -> SqlResult<(MutationSet, MutationSummary)> {
    let schema = schema_of(source, &query.table)?;
    for assignment in &query.update_clause {
        resolve_column(&schema, assignment)?;
    }

    let evaluator = Evaluator::new(source, config);
    let proposed = proposed_rows(source, config, &evaluator, &schema, query)?;

    let mut stored: Vec<(RowId, Row)> = scan_table(source, config, &query.table)?
        .into_iter()
        .map(|(id, row)| (id, row.qualified(&query.table)))
        .collect();
    let mut changed: Vec<usize> = Vec::new();
    let mut pending: Vec<Row> = Vec::new();

    let mut auto = AutoIncrement {
        next: 1,
        first_generated: None,
    };
    if let Some(column) = schema.auto_increment_column() {
        let max = stored
            .iter()
            .filter_map(|(_, row)| row.get(&column.name))
            .map(coerce::to_int)
            .max()
            .unwrap_or(0);
        auto.next = max.saturating_add(1).max(1);
    }

    let mut affected_rows = 0;
    for row in &proposed {
        let candidate = complete_row(&schema, config, row, &mut auto)?;
        let Some((slot, key)) = find_conflict(&schema, &stored, &pending, &candidate) else {
            pending.push(candidate);
            affected_rows += 1;
            continue;
        };

        if !query.update_clause.is_empty() {
            let current = match slot {
                Slot::Stored(i) => &stored[i].1,
                Slot::Pending(i) => &pending[i],
            };
            let updated = apply_assignments(
                &evaluator,
                &schema,
                config,
                current,
                &query.update_clause,
                Some(&candidate),
            )?;
            if &updated == current {
                continue;
            }
            if let Some(key) = key_clash(&schema, &stored, &pending, slot, &updated) {
                return Err(duplicate_entry(&schema, &updated, &key));
            }
            affected_rows += 2;
            match slot {
                Slot::Stored(i) => {
                    stored[i].1 = updated;
                    if !changed.contains(&i) {
                        changed.push(i);
                    }
                }
                Slot::Pending(i) => pending[i] = updated,
            }
        } else if query.ignore {
            debug!(
                "[SQL] INSERT IGNORE skipped a duplicate on key ({})",
                key.join(", ")
            );
        } else {
            return Err(duplicate_entry(&schema, &candidate, &key));
        }
    }

    let summary = MutationSummary {
        affected_rows,
        matched_rows: proposed.len(),
        last_insert_id: auto.first_generated,
    };
    let mutations = MutationSet {
        inserts: pending,
        updates: changed
            .into_iter()
            .map(|i| stored[i].clone())
            .collect(),
        deletes: Vec::new(),
    };
    Ok((mutations, summary))
}

pub(crate) fn execute_insert(
    source: &mut dyn DataSource,
    config: &EngineConfig,
    query: &InsertQuery,
) -> SqlResult<MutationSummary> {
    let (mutations, summary) = plan_insert(source, config, query)?;
    let inserted = mutations.inserts.len();
    source.apply(&query.table, mutations)?;
    debug!(
        "[SQL] INSERT into '{}': {} new rows, {} affected",
        query.table, inserted, summary.affected_rows
    );
    Ok(summary)
}
