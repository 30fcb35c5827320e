//! Rows and the evaluation context handed to the expression evaluator.

use serde_json::Map;

use crate::value::Value;

/// One named value in a row. `table` is the alias a source row was read
/// through; output rows and stored rows leave it empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub table: Option<String>,
    pub name: String,
    pub value: Value,
    /// Reachable only through its table alias. Set on the redundant copy of
    /// a `USING` column.
    pub qualified_only: bool,
}

impl Cell {
    fn matches(&self, table: Option<&str>, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            && match table {
                Some(t) => self.table.as_deref() == Some(t),
                None => !self.qualified_only,
            }
    }
}

/// An ordered mapping from column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<Cell>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|c| (c.name.as_str(), &c.value))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.cells.iter().map(|c| c.name.clone()).collect()
    }

    /// Value of an unqualified column.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.lookup(None, name)
    }

    /// Value of a column, matching the table alias exactly and the column
    /// name case-insensitively. An unqualified lookup takes the first match.
    pub fn lookup(&self, table: Option<&str>, name: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|c| c.matches(table, name))
            .map(|c| &c.value)
    }

    /// True if an unqualified `name` matches columns of more than one table.
    pub fn is_ambiguous(&self, name: &str) -> bool {
        let mut tables = self
            .cells
            .iter()
            .filter(|c| c.matches(None, name))
            .map(|c| c.table.as_deref());
        match tables.next() {
            Some(first) => tables.any(|t| t != first),
            None => false,
        }
    }

    /// Hide the first visible `name` whose table satisfies `side` from
    /// unqualified lookups.
    pub fn hide_unqualified(&mut self, name: &str, side: impl Fn(Option<&str>) -> bool) {
        if let Some(cell) = self
            .cells
            .iter_mut()
            .find(|c| c.matches(None, name) && side(c.table.as_deref()))
        {
            cell.qualified_only = true;
        }
    }

    /// Insert or replace an unqualified column.
    pub fn set(&mut self, name: &str, value: Value) {
        match self
            .cells
            .iter_mut()
            .find(|c| c.table.is_none() && c.name.eq_ignore_ascii_case(name))
        {
            Some(cell) => cell.value = value,
            None => self.cells.push(Cell {
                table: None,
                name: name.to_string(),
                value,
                qualified_only: false,
            }),
        }
    }

    /// Overwrite the first cell with this name, whatever its table. Returns
    /// false if there is none.
    pub fn replace(&mut self, name: &str, value: Value) -> bool {
        match self.cells.iter_mut().find(|c| c.name.eq_ignore_ascii_case(name)) {
            Some(cell) => {
                cell.value = value;
                true
            }
            None => false,
        }
    }

    pub fn push(&mut self, table: Option<&str>, name: &str, value: Value) {
        self.cells.push(Cell {
            table: table.map(str::to_string),
            name: name.to_string(),
            value,
            qualified_only: false,
        });
    }

    /// The same row read through a table alias.
    pub fn qualified(self, alias: &str) -> Row {
        Row {
            cells: self
                .cells
                .into_iter()
                .map(|c| Cell {
                    table: Some(alias.to_string()),
                    ..c
                })
                .collect(),
        }
    }

    /// Concatenation of two rows, `self` first.
    pub fn join(&self, other: &Row) -> Row {
        let mut cells = Vec::with_capacity(self.cells.len() + other.cells.len());
        cells.extend(self.cells.iter().cloned());
        cells.extend(other.cells.iter().cloned());
        Row { cells }
    }

    /// The same columns with every value NULL.
    pub fn to_nulls(&self) -> Row {
        Row {
            cells: self
                .cells
                .iter()
                .map(|c| Cell {
                    value: Value::Null,
                    ..c.clone()
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = Map::new();
        for cell in &self.cells {
            map.insert(cell.name.clone(), cell.value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.set(&name, value);
        }
        row
    }
}

/// The rows an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum RowSet<'r> {
    /// A single row, outside any aggregation
    Single(&'r Row),
    /// All member rows of a group
    Group(&'r [Row]),
    /// A group unwrapped to its representative (first) row; aggregates still
    /// see the whole group
    Representative { row: &'r Row, group: &'r [Row] },
}

#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'r> {
    pub rows: RowSet<'r>,
    /// Output values of the select list, visible to HAVING and ORDER BY
    pub aliases: Option<&'r Row>,
    /// Row of the enclosing query, for correlated subqueries
    pub outer: Option<&'r Row>,
    /// Proposed row of an INSERT, read by `VALUES(col)`
    pub proposed: Option<&'r Row>,
}

impl<'r> EvalContext<'r> {
    pub fn single(row: &'r Row) -> Self {
        Self {
            rows: RowSet::Single(row),
            aliases: None,
            outer: None,
            proposed: None,
        }
    }

    pub fn group(rows: &'r [Row]) -> Self {
        Self {
            rows: RowSet::Group(rows),
            aliases: None,
            outer: None,
            proposed: None,
        }
    }

    /// A group with no member rows. Column lookups read the NULLs of
    /// `padding`, a row shaped like the source relation.
    pub fn empty_group(padding: &'r Row) -> Self {
        Self {
            rows: RowSet::Representative {
                row: padding,
                group: &[],
            },
            aliases: None,
            outer: None,
            proposed: None,
        }
    }

    pub fn with_outer(mut self, outer: Option<&'r Row>) -> Self {
        self.outer = outer;
        self
    }

    pub fn with_aliases(mut self, aliases: &'r Row) -> Self {
        self.aliases = Some(aliases);
        self
    }

    pub fn with_proposed(mut self, proposed: &'r Row) -> Self {
        self.proposed = Some(proposed);
        self
    }

    /// Context for one member row of the current group. Select aliases are
    /// not visible inside aggregate arguments.
    pub fn member(&self, row: &'r Row) -> Self {
        Self {
            rows: RowSet::Single(row),
            aliases: None,
            outer: self.outer,
            proposed: self.proposed,
        }
    }

    /// Unwrap a group to its representative row before scalar evaluation.
    /// An empty group stays as it is; column lookups against it yield NULL.
    pub fn unwrap_representative(&self) -> Self {
        match self.rows {
            RowSet::Group(group) => match group.first() {
                Some(row) => Self {
                    rows: RowSet::Representative { row, group },
                    ..*self
                },
                None => *self,
            },
            _ => *self,
        }
    }

    /// Row used for scalar column lookups.
    pub fn representative(&self) -> Option<&'r Row> {
        match self.rows {
            RowSet::Single(row) | RowSet::Representative { row, .. } => Some(row),
            RowSet::Group(group) => group.first(),
        }
    }

    /// Member rows for aggregation; `None` outside any group.
    pub fn group_rows(&self) -> Option<&'r [Row]> {
        match self.rows {
            RowSet::Single(_) => None,
            RowSet::Group(group) | RowSet::Representative { group, .. } => Some(group),
        }
    }
}
