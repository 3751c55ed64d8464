//! Fixture chains against a real in-memory SQLite database.

use std::collections::HashSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use twofingers::prelude::*;

fn seeded() -> DbGateway {
    let db = DbGateway::connect("sqlite::memory:").unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, is_active BOOLEAN NOT NULL)")
        .unwrap();
    db.execute("CREATE TABLE comments (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, body TEXT)")
        .unwrap();
    db.execute(
        "INSERT INTO users (id, email, is_active) VALUES \
         (1, 'one@test.ru', true), (2, 'two@test.ru', true), (3, 'three@test.ru', false), \
         (4, 'four@test.ru', true), (5, 'five@test.ru', false)",
    )
    .unwrap();
    db.execute("INSERT INTO comments (id, user_id, body) VALUES (10, 1, 'hi'), (11, 1, 'again'), (12, 4, 'yo')")
        .unwrap();
    db
}

fn id_of(row: &Row) -> i64 {
    row["id"].as_i64().unwrap()
}

#[test]
fn test_random_entity_comes_from_its_table() {
    let fixtures = Fixtures::new(seeded());
    let row = fixtures.table("users").get_random_entity().unwrap();
    assert!((1..=5).contains(&id_of(&row)));
    assert!(row["email"].as_str().unwrap().ends_with("@test.ru"));
}

#[test]
fn test_random_entities_are_never_reused() {
    let fixtures = Fixtures::new(seeded());
    let mut seen = HashSet::new();
    for _ in 0..5 {
        let row = fixtures.table("users").get_random_entity().unwrap();
        assert!(seen.insert(id_of(&row)), "id {} handed out twice", id_of(&row));
    }
    assert_eq!(seen.len(), 5);
    assert_eq!(fixtures.registry().len(), 5);

    // Table exhausted for this run.
    let err = fixtures.table("users").get_random_entity().unwrap_err();
    assert!(matches!(err, DbError::EmptyResult { .. }));
}

#[test]
fn test_flag_filter_applies() {
    let fixtures = Fixtures::new(seeded());
    for _ in 0..2 {
        let row = fixtures.entity("user").is("is_active", false).get_random_entity().unwrap();
        assert!(matches!(id_of(&row), 3 | 5));
    }
}

#[test]
fn test_anti_join_keeps_only_unmatched_rows() {
    let fixtures = Fixtures::new(seeded());
    let rows = fixtures
        .table("users")
        .join_matching("comments", "id", "user_id", false)
        .fields("users.id, users.email")
        .get_sorted_list("users.id")
        .unwrap();
    let ids: Vec<i64> = rows.iter().map(id_of).collect();
    assert_eq!(ids, vec![2, 3, 5]);
}

#[test]
fn test_anti_join_random_entity_reports_main_id() {
    let fixtures = Fixtures::new(seeded());

    let peeked = fixtures
        .table("users")
        .join_matching("comments", "id", "user_id", false)
        .get_row()
        .unwrap();
    assert!(matches!(id_of(&peeked), 2 | 3 | 5));
    assert!(fixtures.registry().is_empty());

    let mut picked = Vec::new();
    for _ in 0..3 {
        let row = fixtures
            .table("users")
            .join_matching("comments", "id", "user_id", false)
            .get_random_entity()
            .unwrap();
        picked.push(id_of(&row));
    }
    picked.sort();
    assert_eq!(picked, vec![2, 3, 5]);
    for id in [2, 3, 5] {
        assert!(fixtures.registry().contains("users", &SqlValue::Int(id)));
    }
    assert_eq!(fixtures.registry().len(), 3);
}

#[test]
fn test_check_if_exist_is_idempotent() {
    let fixtures = Fixtures::new(seeded());
    let query = fixtures.table("users").is("is_active", true).join("comments", "id", "user_id");

    let first = query.check_if_exist().unwrap();
    let second = query.check_if_exist().unwrap();
    assert!(first);
    assert_eq!(first, second);
    assert!(fixtures.registry().is_empty());

    let missing = fixtures.table("users").with_id(42);
    assert!(!missing.check_if_exist().unwrap());
    assert!(!missing.check_if_exist().unwrap());
}

#[test]
fn test_correlated_raw_subqueries() {
    let fixtures = Fixtures::new(seeded());

    let commented = Subquery::raw("SELECT 1 FROM comments WHERE comments.user_id = users.id");
    let rows = fixtures.table("users").exists(commented.clone()).get_sorted_list("id").unwrap();
    assert_eq!(rows.iter().map(id_of).collect::<Vec<_>>(), vec![1, 4]);

    let rows = fixtures.table("users").not_exists(commented).get_sorted_list("id").unwrap();
    assert_eq!(rows.iter().map(id_of).collect::<Vec<_>>(), vec![2, 3, 5]);

    let rows = fixtures
        .table("users")
        .id_in(Subquery::raw("SELECT user_id FROM comments WHERE comments.body = 'yo'"))
        .get_rows(Limit::All)
        .unwrap();
    assert_eq!(rows.iter().map(id_of).collect::<Vec<_>>(), vec![4]);
}

#[test]
fn test_rows_without_limit() {
    let fixtures = Fixtures::new(seeded());
    let rows = fixtures.table("users").get_rows(Limit::All).unwrap();
    assert_eq!(rows.len(), 5);

    let rows = fixtures.table("users").get_rows(Limit::Count(2)).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_empty_id_lists() {
    let fixtures = Fixtures::new(seeded());
    let none: Vec<i64> = Vec::new();

    assert!(fixtures.table("users").id_in(none.clone()).get_rows(Limit::All).unwrap().is_empty());
    assert_eq!(fixtures.table("users").id_not_in(none).get_rows(Limit::All).unwrap().len(), 5);
}

#[test]
fn test_rows_decode_booleans() {
    let fixtures = Fixtures::new(seeded());
    let rows = fixtures.table("users").with_id(3).get_rows(Limit::All).unwrap();
    assert_eq!(rows[0]["is_active"], json!(false));

    let row = fixtures.table("users").with_id(4).get_row().unwrap();
    assert_eq!(row["is_active"], json!(true));
}

#[test]
fn test_join_keeps_only_matched_rows() {
    let fixtures = Fixtures::new(seeded());
    for _ in 0..2 {
        let row = fixtures.table("users").join("comments", "id", "user_id").get_random_entity().unwrap();
        assert!(matches!(id_of(&row), 1 | 4));
    }
}

#[test]
fn test_subquery_filter() {
    let fixtures = Fixtures::new(seeded());
    let commenters = fixtures.table("comments").fields("comments.user_id").subquery();
    let rows = fixtures
        .table("users")
        .id_in(commenters)
        .get_sorted_list("id DESC")
        .unwrap();
    let ids: Vec<i64> = rows.iter().map(id_of).collect();
    assert_eq!(ids, vec![4, 1]);
}

#[test]
fn test_check_if_exist_and_delete() {
    let fixtures = Fixtures::new(seeded());
    assert!(fixtures.table("comments").where_eq("body", "hi").check_if_exist().unwrap());
    assert!(!fixtures.table("comments").where_eq("body", "it's").check_if_exist().unwrap());

    let deleted = fixtures.table("comments").where_eq("user_id", 1).delete().unwrap();
    assert_eq!(deleted, 2);
    assert!(!fixtures.table("comments").where_eq("user_id", 1).check_if_exist().unwrap());
}

#[test]
fn test_sorted_list_empty_is_error() {
    let fixtures = Fixtures::new(seeded());
    let err = fixtures.table("users").with_id(99).get_sorted_list("id").unwrap_err();
    assert!(matches!(err, DbError::EmptyResult { .. }));

    let rows = fixtures.table("users").with_id(99).get_rows(Limit::Count(10)).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_concurrent_picks_share_one_registry() {
    let fixtures = Fixtures::with_registry(seeded(), Arc::new(UsedIds::new()));

    let picked: Vec<i64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| id_of(&fixtures.table("users").get_random_entity().unwrap())))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<i64> = picked.iter().copied().collect();
    assert_eq!(unique.len(), 4);
}

#[test]
fn test_picked_row_passes_response_check() {
    let fixtures = Fixtures::new(seeded());
    let row = fixtures.table("users").with_id(2).get_random_entity().unwrap();
    let body = json!({ "code": 200, "result": { "id": row["id"], "email": row["email"], "created": "2024-05-01" } });

    let expected = json!({
        "code": 200,
        "result": { "id": "CHECK_POSITIVE", "email": "two@test.ru", "created": "CHECK_DATE_FORMAT" }
    });
    assert_eq!(assert_response(&expected, &body), Ok(()));
}
