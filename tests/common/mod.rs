//! Common test utilities for SQL engine tests
//!
//! Provides shared helper functions for:
//! - Seeding an in-memory store with the video game fixtures
//! - Executing queries and reading results as JSON

#![allow(dead_code)]

use serde_json::{json, Value};

use mysql_engine::{
    ColumnDef, DataType, EngineConfig, InMemoryStore, MutationSummary, QueryProcessor,
    QueryResult, TableSchema,
};

/// Route engine logs to the test output. Set `RUST_LOG=mysql_engine=debug`
/// to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const CHARACTERS: &[(i64, &str, &str, i64)] = &[
    (1, "mario", "hero", 1),
    (2, "luigi", "hero", 3),
    (3, "sonic", "hero", 6),
    (4, "earthworm jim", "hero", 0),
    (5, "bowser", "villain", 2),
    (6, "mega man", "hero", 0),
    (7, "link", "hero", 0),
    (8, "yoshi", "sidekick", 0),
    (9, "kirby", "hero", 0),
    (10, "samus", "hero", 0),
    (11, "pikachu", "sidekick", 0),
    (12, "donkey kong", "villain", 0),
    (13, "pac-man", "hero", 0),
    (14, "crash", "hero", 0),
    (15, "spyro", "hero", 0),
    (16, "ganon", "villain", 0),
];

const TAGS: &[(i64, i64, &str)] = &[
    (1, 1, "plumber"),
    (2, 1, "jumper"),
    (3, 2, "plumber"),
    (4, 2, "tall"),
    (5, 2, "green"),
    (6, 5, "koopa"),
    (7, 5, "king"),
];

pub fn characters_schema() -> TableSchema {
    TableSchema::new("video_game_characters")
        .column(ColumnDef::new("id", DataType::Integer).auto_increment())
        .column(ColumnDef::new("name", DataType::String).not_null())
        .column(ColumnDef::new("type", DataType::String).default_value("hero"))
        .column(ColumnDef::new("powerups", DataType::Integer).not_null().default_value(0))
        .column(ColumnDef::new("deleted_on", DataType::DateTime))
        .primary_key(&["id"])
        .unique_key(&["name"])
}

pub fn tags_schema() -> TableSchema {
    TableSchema::new("character_tags")
        .column(ColumnDef::new("id", DataType::Integer).auto_increment())
        .column(ColumnDef::new("character_id", DataType::Integer).not_null())
        .column(ColumnDef::new("tag", DataType::String).not_null())
        .primary_key(&["id"])
}

pub fn seeded_store() -> InMemoryStore {
    let mut store = InMemoryStore::new();
    store.create_table(characters_schema());
    store.create_table(tags_schema());

    for &(id, name, kind, powerups) in CHARACTERS {
        let deleted_on = if id == 1 {
            Value::Null
        } else {
            json!("2020-01-01 00:00:00")
        };
        store
            .insert_json(
                "video_game_characters",
                json!({"id": id, "name": name, "type": kind, "powerups": powerups, "deleted_on": deleted_on}),
            )
            .unwrap();
    }
    for &(id, character_id, tag) in TAGS {
        store
            .insert_json(
                "character_tags",
                json!({"id": id, "character_id": character_id, "tag": tag}),
            )
            .unwrap();
    }
    store
}

pub fn seeded_processor() -> QueryProcessor<InMemoryStore> {
    init_tracing();
    QueryProcessor::new(seeded_store())
}

pub fn seeded_processor_with(config: EngineConfig) -> QueryProcessor<InMemoryStore> {
    init_tracing();
    QueryProcessor::with_config(seeded_store(), config)
}

pub fn query(processor: &mut QueryProcessor<InMemoryStore>, sql: &str) -> Vec<Value> {
    processor
        .query(sql)
        .unwrap_or_else(|e| panic!("Query failed: {}: {}", sql, e))
        .to_json()
}

pub fn execute(processor: &mut QueryProcessor<InMemoryStore>, sql: &str) -> MutationSummary {
    match processor.execute(sql) {
        Ok(QueryResult::Mutation(summary)) => summary,
        Ok(other) => panic!("Expected a mutation from {}, got {:?}", sql, other),
        Err(e) => panic!("Statement failed: {}: {}", sql, e),
    }
}

/// First column of the first row.
pub fn scalar(processor: &mut QueryProcessor<InMemoryStore>, sql: &str) -> Value {
    let rows = query(processor, sql);
    rows.first()
        .and_then(|row| row.as_object())
        .and_then(|row| row.values().next().cloned())
        .unwrap_or(Value::Null)
}
