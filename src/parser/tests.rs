//! Unit tests for the statement and expression parsers.

use super::*;
use crate::ast::*;
use crate::value::Value;

fn parse_update(sql: &str) -> UpdateQuery {
    match parse(sql).unwrap() {
        Query::Update(q) => q,
        other => panic!("expected UPDATE, got {:?}", other),
    }
}

fn parse_select(sql: &str) -> SelectQuery {
    match parse(sql).unwrap() {
        Query::Select(q) => q,
        other => panic!("expected SELECT, got {:?}", other),
    }
}

fn parse_insert(sql: &str) -> InsertQuery {
    match parse(sql).unwrap() {
        Query::Insert(q) => q,
        other => panic!("expected INSERT, got {:?}", other),
    }
}

/// Parse a standalone expression through `SELECT <expr>`.
fn parse_expr(expr: &str) -> Expression {
    let mut query = parse_select(&format!("SELECT {}", expr));
    query.items.remove(0).expression
}

#[test]
fn test_parse_update_all_clauses() {
    let query = parse_update("UPDATE t SET x = 1 WHERE id = 2 ORDER BY id LIMIT 1");
    assert_eq!(query.table, "t");
    assert_eq!(query.set_clause.len(), 1);
    assert_eq!(query.set_clause[0].column.name, "x");
    assert!(query.where_clause.is_some());
    assert_eq!(query.order_by.len(), 1);
    assert_eq!(
        query.limit_clause,
        Some(LimitClause {
            row_count: 1,
            offset: 0
        })
    );
}

#[test]
fn test_parse_update_swapped_clauses_fails() {
    let err = parse("UPDATE t WHERE id = 2 SET x = 1 ORDER BY id LIMIT 1").unwrap_err();
    assert!(matches!(err, SqlError::UnexpectedClause { ref clause, .. } if clause == "SET"));
}

#[test]
fn test_update_clause_orderings() {
    let clauses = [
        ("SET", "SET x = 1"),
        ("WHERE", "WHERE id = 2"),
        ("ORDER BY", "ORDER BY id"),
        ("LIMIT", "LIMIT 1"),
    ];

    // every subset in canonical order parses, as long as SET is present
    for mask in 1u32..16 {
        if mask & 1 == 0 {
            continue;
        }
        let body: Vec<&str> = clauses
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, (_, text))| *text)
            .collect();
        let sql = format!("UPDATE t {}", body.join(" "));
        assert!(parse(&sql).is_ok(), "expected success for {}", sql);
    }

    // any adjacent swap or duplicate fails with a clause-order error
    for i in 0..clauses.len() - 1 {
        let mut swapped: Vec<&str> = clauses.iter().map(|(_, t)| *t).collect();
        swapped.swap(i, i + 1);
        let sql = format!("UPDATE t {}", swapped.join(" "));
        let err = parse(&sql).unwrap_err();
        assert!(
            matches!(err, SqlError::UnexpectedClause { .. }),
            "expected clause error for {}",
            sql
        );
    }
    for (_, text) in &clauses {
        let sql = format!("UPDATE t SET y = 2 {} {}", text, text);
        assert!(matches!(
            parse(&sql).unwrap_err(),
            SqlError::UnexpectedClause { .. }
        ));
    }
}

#[test]
fn test_update_rejects_foreign_clause() {
    let err = parse("UPDATE t SET x = 1 GROUP BY x").unwrap_err();
    assert!(matches!(err, SqlError::UnexpectedClause { ref clause, .. } if clause == "GROUP BY"));
}

#[test]
fn test_update_expected_table_name() {
    let err = parse("UPDATE SET x = 1").unwrap_err();
    assert_eq!(err, SqlError::ParseError("expected table name".to_string()));
}

#[test]
fn test_update_requires_set() {
    assert!(parse("UPDATE t WHERE id = 1").unwrap_err().is_parse_error());
}

#[test]
fn test_update_trailing_separator_and_stray_token() {
    assert!(parse("UPDATE t SET x = 1;").is_ok());
    assert!(parse("UPDATE t SET x = 1 ; ;").is_ok());

    let err = parse("UPDATE t SET x = 1 )").unwrap_err();
    assert!(matches!(err, SqlError::UnexpectedToken { ref token, .. } if token == ")"));

    let err = parse("UPDATE t SET x = 1, WHERE id = 1").unwrap_err();
    assert!(err.is_parse_error());
}

#[test]
fn test_update_skips_index_hints() {
    let query = parse_update("UPDATE t USE INDEX (idx_a, idx_b) SET x = 1");
    assert_eq!(query.table, "t");

    let query = parse_update("UPDATE t FORCE KEY FOR ORDER BY (idx) SET x = 1");
    assert_eq!(query.set_clause.len(), 1);
}

#[test]
fn test_set_clause_round_trip_preserves_order() {
    let query = parse_update("UPDATE t SET c = 3, a = a + 1, b = 'x' WHERE id = 1 LIMIT 5");
    let rendered = query.to_string();
    assert_eq!(
        rendered,
        "UPDATE `t` SET `c` = 3, `a` = `a` + 1, `b` = 'x' WHERE `id` = 1 LIMIT 5"
    );

    let reparsed = parse_update(&rendered);
    assert_eq!(reparsed.set_clause, query.set_clause);
    let columns: Vec<&str> = reparsed
        .set_clause
        .iter()
        .map(|a| a.column.name.as_str())
        .collect();
    assert_eq!(columns, vec!["c", "a", "b"]);
    assert_eq!(reparsed.where_clause, query.where_clause);
    assert_eq!(reparsed.limit_clause, query.limit_clause);
}

#[test]
fn test_expression_display_round_trip() {
    let sources = [
        "a + b * c - -2",
        "NOT a = b OR c IS NOT NULL AND d",
        "x NOT IN (1, 'two', NULL) XOR y BETWEEN 1 AND 10",
        "name LIKE 'it''s%' AND `weird``col` <=> 3.5",
        "IF(COUNT(DISTINCT t.id) > 1, CONCAT(a, 'b'), -(4))",
        "!a = 1",
    ];
    for source in sources {
        let expr = parse_expr(source);
        let rendered = expr.to_string();
        assert_eq!(parse_expr(&rendered), expr, "round trip of {}", source);
    }
}

#[test]
fn test_precedence() {
    assert_eq!(
        parse_expr("1 + 2 * 3"),
        Expression::binary(
            Expression::literal(1),
            BinaryOperator::Add,
            Expression::binary(Expression::literal(2), BinaryOperator::Multiply, Expression::literal(3)),
        )
    );

    // OR binds loosest
    match parse_expr("a OR b AND c") {
        Expression::BinaryOp {
            op: BinaryOperator::Or,
            right,
            ..
        } => assert!(matches!(
            *right,
            Expression::BinaryOp {
                op: BinaryOperator::And,
                ..
            }
        )),
        other => panic!("unexpected {:?}", other),
    }

    // keyword NOT applies to the whole comparison
    match parse_expr("NOT a = b") {
        Expression::UnaryOp {
            op: UnaryOperator::Not,
            operand,
        } => assert!(matches!(
            *operand,
            Expression::BinaryOp {
                op: BinaryOperator::Equal,
                ..
            }
        )),
        other => panic!("unexpected {:?}", other),
    }

    // ! binds tighter than the comparison
    assert!(matches!(
        parse_expr("!a = b"),
        Expression::BinaryOp {
            op: BinaryOperator::Equal,
            ..
        }
    ));

    // subtraction is left-associative
    assert_eq!(parse_expr("10 - 4 - 3").to_string(), "(10 - 4) - 3");
}

#[test]
fn test_literals() {
    assert_eq!(parse_expr("42"), Expression::Literal(Value::Int(42)));
    assert_eq!(parse_expr("-42"), Expression::Literal(Value::Int(-42)));
    assert_eq!(parse_expr("2.5"), Expression::Literal(Value::Float(2.5)));
    assert_eq!(parse_expr("'hi'"), Expression::Literal(Value::from("hi")));
    assert_eq!(parse_expr("NULL"), Expression::Literal(Value::Null));
    assert_eq!(parse_expr("TRUE"), Expression::Literal(Value::Bool(true)));
}

#[test]
fn test_columns_and_functions() {
    assert_eq!(
        parse_expr("`video_game_characters`.`name`"),
        Expression::Column(ColumnExpression::qualified("video_game_characters", "name"))
    );

    match parse_expr("count(DISTINCT id)") {
        Expression::Function(f) => {
            assert_eq!(f.name, "COUNT");
            assert!(f.distinct);
            assert_eq!(f.args.len(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }

    match parse_expr("COUNT(*)") {
        Expression::Function(f) => assert_eq!(f.args, vec![Expression::Wildcard { table: None }]),
        other => panic!("unexpected {:?}", other),
    }

    match parse_expr("5 MOD 3 + MOD(7, 2)") {
        Expression::BinaryOp { left, right, .. } => {
            assert!(matches!(
                *left,
                Expression::BinaryOp {
                    op: BinaryOperator::Modulo,
                    ..
                }
            ));
            assert!(matches!(*right, Expression::Function(ref f) if f.name == "MOD"));
        }
        other => panic!("unexpected {:?}", other),
    }

    assert!(matches!(
        parse_expr("BINARY name"),
        Expression::Function(ref f) if f.name == "BINARY"
    ));
    assert!(matches!(parse_expr("NOW()"), Expression::Function(ref f) if f.args.is_empty()));
}

#[test]
fn test_empty_argument_list_is_parse_error() {
    let err = parse("SELECT COALESCE()").unwrap_err();
    assert!(err.is_parse_error());
    assert!(parse("SELECT COUNT()").unwrap_err().is_parse_error());
    assert!(parse("SELECT CONCAT()").unwrap_err().is_parse_error());
}

#[test]
fn test_in_between_like() {
    match parse_expr("id NOT IN (1, 2, 3)") {
        Expression::InList { list, negated, .. } => {
            assert_eq!(list.len(), 3);
            assert!(negated);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        parse_expr("id IN (SELECT id FROM t)"),
        Expression::InSubquery { negated: false, .. }
    ));
    assert!(matches!(
        parse_expr("x NOT BETWEEN 1 AND 5"),
        Expression::Between { negated: true, .. }
    ));
    assert!(matches!(
        parse_expr("name NOT LIKE 'a%'"),
        Expression::BinaryOp {
            op: BinaryOperator::NotLike,
            ..
        }
    ));
    assert!(matches!(
        parse_expr("deleted_on IS NULL"),
        Expression::IsNull { negated: false, .. }
    ));
    assert!(parse("SELECT a IS 5").unwrap_err().is_parse_error());
}

#[test]
fn test_parse_select_full() {
    let query = parse_select(
        "SELECT DISTINCT c.name AS n, COUNT(*) total FROM characters c \
         LEFT JOIN tags AS t ON t.character_id = c.id \
         WHERE c.id > 1 GROUP BY c.name HAVING total > 1 ORDER BY n DESC, 2 LIMIT 5, 10",
    );
    assert!(query.distinct);
    assert_eq!(query.items.len(), 2);
    assert_eq!(query.items[0].alias.as_deref(), Some("n"));
    assert_eq!(query.items[1].alias.as_deref(), Some("total"));
    assert_eq!(query.items[1].text, "COUNT(*)");

    assert_eq!(query.from.len(), 2);
    assert_eq!(query.from[0].name, "characters");
    assert_eq!(query.from[0].alias, "c");
    assert_eq!(query.from[1].join_type, JoinType::Left);
    assert_eq!(query.from[1].join_operator, Some(JoinOperator::On));
    assert_eq!(query.from[1].alias, "t");

    assert!(query.where_clause.is_some());
    assert_eq!(query.group_by.len(), 1);
    assert!(query.having.is_some());
    assert_eq!(query.order_by[0].direction, SortDirection::Desc);
    assert_eq!(query.order_by[1].direction, SortDirection::Asc);
    assert_eq!(
        query.limit_clause,
        Some(LimitClause {
            row_count: 10,
            offset: 5
        })
    );
}

#[test]
fn test_select_item_text_keeps_source_spelling() {
    let query = parse_select("SELECT SUM(`a`), id+1 FROM t");
    assert_eq!(query.items[0].text, "SUM(`a`)");
    assert_eq!(query.items[1].text, "id+1");
}

#[test]
fn test_select_clause_order() {
    assert!(matches!(
        parse("SELECT a FROM t ORDER BY a WHERE a = 1").unwrap_err(),
        SqlError::UnexpectedClause { .. }
    ));
    assert!(matches!(
        parse("SELECT a FROM t LIMIT 1 LIMIT 2").unwrap_err(),
        SqlError::UnexpectedClause { .. }
    ));
    assert!(matches!(
        parse("SELECT a FROM t SET a = 1").unwrap_err(),
        SqlError::UnexpectedClause { .. }
    ));
}

#[test]
fn test_join_using_is_normalized() {
    let query = parse_select("SELECT * FROM a JOIN b USING (id, kind)");
    let join = &query.from[1];
    assert_eq!(join.join_operator, Some(JoinOperator::Using));
    assert_eq!(join.using_columns, vec!["id", "kind"]);
    assert_eq!(
        join.join_expression.as_ref().map(|e| e.to_string()).as_deref(),
        Some("(`a`.`id` = `b`.`id`) AND (`a`.`kind` = `b`.`kind`)")
    );
}

#[test]
fn test_join_requires_condition() {
    assert!(parse("SELECT * FROM a JOIN b").unwrap_err().is_parse_error());
    assert!(parse("SELECT * FROM a LEFT OUTER JOIN b").unwrap_err().is_parse_error());

    let query = parse_select("SELECT * FROM a CROSS JOIN b, c");
    assert_eq!(query.from.len(), 3);
    assert!(query.from[1..].iter().all(|j| j.join_type == JoinType::Cross));
}

#[test]
fn test_derived_table() {
    let query = parse_select("SELECT SUM(`a`) FROM (SELECT id as a FROM video_game_characters) foo");
    let source = &query.from[0];
    assert_eq!(source.alias, "foo");
    let inner = source.subquery.as_ref().unwrap();
    assert_eq!(inner.items[0].alias.as_deref(), Some("a"));
    assert_eq!(inner.sql, "SELECT id as a FROM video_game_characters");

    assert!(parse("SELECT * FROM (SELECT 1)").unwrap_err().is_parse_error());
}

#[test]
fn test_limit_forms() {
    let query = parse_select("SELECT a FROM t LIMIT 3 OFFSET 7");
    assert_eq!(
        query.limit_clause,
        Some(LimitClause {
            row_count: 3,
            offset: 7
        })
    );
    assert!(parse("SELECT a FROM t LIMIT -1").unwrap_err().is_parse_error());
    assert!(parse("SELECT a FROM t LIMIT 1.5").unwrap_err().is_parse_error());
    assert!(parse("SELECT a FROM t LIMIT").unwrap_err().is_parse_error());
}

#[test]
fn test_parse_delete() {
    match parse("DELETE FROM t WHERE id = 1 ORDER BY id DESC LIMIT 2").unwrap() {
        Query::Delete(query) => {
            assert_eq!(query.from_clause.as_ref().map(|f| f.name.as_str()), Some("t"));
            assert!(query.where_clause.is_some());
            assert_eq!(query.order_by.len(), 1);
            assert_eq!(query.limit_clause.map(|l| l.row_count), Some(2));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(parse("DELETE WHERE id = 1").unwrap_err().is_parse_error());
    assert!(matches!(
        parse("DELETE FROM t LIMIT 1 WHERE id = 1").unwrap_err(),
        SqlError::UnexpectedClause { .. }
    ));
}

#[test]
fn test_parse_insert_values() {
    let query = parse_insert("INSERT IGNORE INTO t (id, name) VALUES (1, 'a'), (2, 'b')");
    assert!(query.ignore);
    assert_eq!(query.columns, vec!["id", "name"]);
    assert_eq!(query.values.len(), 2);
    assert_eq!(query.values[1][1], Expression::literal("b"));
}

#[test]
fn test_parse_insert_on_duplicate() {
    let query = parse_insert(
        "INSERT INTO t (id, n) VALUES (1, 2) ON DUPLICATE KEY UPDATE n = n + VALUES(n)",
    );
    assert_eq!(query.update_clause.len(), 1);
    match &query.update_clause[0].expression {
        Expression::BinaryOp { right, .. } => {
            assert!(matches!(right.as_ref(), Expression::Function(f) if f.name == "VALUES"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_parse_insert_select_and_set() {
    let query = parse_insert(
        "INSERT INTO archive SELECT id, name FROM t WHERE id > 3 ON DUPLICATE KEY UPDATE name = 'x'",
    );
    let select = query.select.as_ref().unwrap();
    assert!(select.where_clause.is_some());
    assert_eq!(query.update_clause.len(), 1);

    let query = parse_insert("INSERT INTO t SET id = 4, name = 'd'");
    assert_eq!(query.set_clause.len(), 2);

    assert!(parse("INSERT INTO t").unwrap_err().is_parse_error());
    assert!(matches!(
        parse("INSERT INTO t VALUES (1) SET a = 1").unwrap_err(),
        SqlError::UnexpectedClause { .. }
    ));
}

#[test]
fn test_unknown_statement() {
    assert!(matches!(
        parse("DROP TABLE t").unwrap_err(),
        SqlError::UnexpectedToken { .. }
    ));
    assert!(parse("").unwrap_err().is_parse_error());
}

#[test]
fn test_subquery_slices_keep_offsets() {
    let query = parse_select("SELECT (SELECT COUNT(*) FROM tags WHERE tags.c = x.id) AS n FROM x");
    assert_eq!(query.items[0].alias.as_deref(), Some("n"));
    match &query.items[0].expression {
        Expression::Subquery(inner) => {
            assert_eq!(inner.sql, "SELECT COUNT(*) FROM tags WHERE tags.c = x.id");
            assert_eq!(inner.items[0].text, "COUNT(*)");
        }
        other => panic!("unexpected {:?}", other),
    }
}
