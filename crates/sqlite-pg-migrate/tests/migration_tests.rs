//! End-to-end runs against an in-memory SQLite source and target store.

mod common;

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use common::{
    column, config, marketplace_target, orchestrator, primary_key, source, MemoryTarget,
    MARKETPLACE_SOURCE,
};
use sqlite_pg_migrate::core::identifier::is_uuid;
use sqlite_pg_migrate::{
    IdentifierRemapper, MigrateError, Orchestrator, Registry, TableMigrationConfig, TableStatus,
    TypeCategory, Value, DEFAULT_ID_NAMESPACE,
};

fn seeded(extra: &str) -> String {
    format!("{}\n{}", MARKETPLACE_SOURCE, extra)
}

const USERS_AND_ORDERS: &str = r#"
    INSERT INTO users VALUES (7, 'ann@example.com', 'Ann', 1700000000000, 0);
    INSERT INTO orders VALUES (100, 7, NULL, 19.9, NULL);
    INSERT INTO orders VALUES (101, 99, NULL, 5.0, 'paid');
"#;

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::Text(s)) => s.clone(),
        other => panic!("expected text, got {:?}", other),
    }
}

#[tokio::test]
async fn test_orders_follow_their_users() {
    let target = Arc::new(marketplace_target());
    let orch = orchestrator(
        config(&["orders", "users"]),
        source(&seeded(USERS_AND_ORDERS)),
        target.clone(),
    );

    let report = orch.run(false).await.unwrap();
    assert_eq!(report.status, "completed");
    let names: Vec<&str> = report.tables.iter().map(|t| t.table.as_str()).collect();
    assert_eq!(names, vec!["users", "orders"]);

    let expected_user = IdentifierRemapper::new(DEFAULT_ID_NAMESPACE).assign_primary_key("users", "7");
    let users = target.rows("users");
    assert_eq!(users.len(), 1);
    assert_eq!(text(users[0].get("id")), expected_user);
    assert_eq!(text(users[0].get("created_at")), "2023-11-14T22:13:20.000Z");
    assert!(!users[0].contains_key("legacy_flag"));

    let orders = target.rows("orders");
    assert_eq!(orders.len(), 1);
    assert_eq!(text(orders[0].get("user_id")), expected_user);
    assert_eq!(text(orders[0].get("status")), "pending");
    assert!(is_uuid(&text(orders[0].get("id"))));
    assert_eq!(orders[0].get("store_id"), Some(&Value::Null));

    let order_report = report.table("orders").unwrap();
    assert_eq!(order_report.total_source_rows, 2);
    assert_eq!(order_report.inserted, 1);
    assert_eq!(order_report.skipped, 1);
    let issue = &order_report.issues[0];
    assert_eq!(issue.column.as_deref(), Some("user_id"));
    assert_eq!(issue.value, "99");
    assert_eq!(issue.reason, "missing reference");
}

#[tokio::test]
async fn test_second_run_only_finds_duplicates() {
    let target = Arc::new(marketplace_target());
    let orch = orchestrator(
        config(&["users", "orders"]),
        source(&seeded(USERS_AND_ORDERS)),
        target.clone(),
    );

    let first = orch.run(false).await.unwrap();
    let users_after_first = target.rows("users");
    let orders_after_first = target.rows("orders");

    let second = orch.run(false).await.unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, first.inserted);
    assert_eq!(second.skipped, first.skipped);

    // Rows that conflicted still resolve their references.
    let orders = second.table("orders").unwrap();
    assert_eq!(orders.duplicates, 1);
    assert_eq!(orders.skipped, 1);

    assert_eq!(target.rows("users"), users_after_first);
    assert_eq!(target.rows("orders"), orders_after_first);
}

#[tokio::test]
async fn test_cart_items_reference_existing_rows() {
    let sql = seeded(
        r#"
        INSERT INTO users (id, email) VALUES (1, 'a@example.com'), (2, 'b@example.com');
        INSERT INTO carts VALUES (10, 1), (11, 2);
        INSERT INTO products VALUES (5, NULL, NULL, 'Mug', '3', 'true');
        INSERT INTO cart_items VALUES (1000, 10, 5, 2), (1001, 11, NULL, NULL),
                                      (1002, 12, 5, 1);
        "#,
    );
    let target = Arc::new(marketplace_target());
    let orch = orchestrator(
        config(&["cart_items", "carts", "products", "users"]),
        source(&sql),
        target.clone(),
    );

    let report = orch.run(false).await.unwrap();
    let order: Vec<&str> = report.tables.iter().map(|t| t.table.as_str()).collect();
    assert_eq!(order, vec!["products", "users", "carts", "cart_items"]);

    let products = target.rows("products");
    assert_eq!(products[0].get("stock"), Some(&Value::Integer(3)));
    assert_eq!(products[0].get("is_active"), Some(&Value::Bool(true)));

    let items = report.table("cart_items").unwrap();
    assert_eq!(items.inserted, 2);
    assert_eq!(items.skipped, 1);
    assert_eq!(items.issues[0].column.as_deref(), Some("cart_id"));

    let user_ids: HashSet<String> = target
        .rows("users")
        .iter()
        .map(|u| text(u.get("id")))
        .collect();
    let cart_owner: Vec<(String, String)> = target
        .rows("carts")
        .iter()
        .map(|c| (text(c.get("id")), text(c.get("user_id"))))
        .collect();

    for item in target.rows("cart_items") {
        let cart_id = text(item.get("cart_id"));
        let user_id = text(item.get("user_id"));
        assert!(user_ids.contains(&user_id));
        let owner = cart_owner.iter().find(|(id, _)| *id == cart_id).unwrap();
        assert_eq!(owner.1, user_id);
    }

    let defaulted = target
        .rows("cart_items")
        .into_iter()
        .find(|i| i.get("product_id") == Some(&Value::Null))
        .unwrap();
    assert_eq!(defaulted.get("quantity"), Some(&Value::Integer(1)));
}

#[tokio::test]
async fn test_bad_rows_and_tables_do_not_cascade() {
    let sql = seeded(
        r#"
        CREATE TABLE reviews (id INTEGER PRIMARY KEY, product_id INTEGER, user_id INTEGER);
        INSERT INTO reviews VALUES (1, 5, 7);
        INSERT INTO users (id, email) VALUES (7, 'ann@example.com');
        INSERT INTO products VALUES (5, NULL, NULL, 'Mug', 'lots', 'true'),
                                    (6, NULL, NULL, 'Cup', '2', '0');
        INSERT INTO orders VALUES (100, 7, NULL, 10, 'paid');
        "#,
    );
    let target = Arc::new(marketplace_target());
    let orch = orchestrator(
        config(&["users", "reviews", "products", "orders"]),
        source(&sql),
        target.clone(),
    );

    let report = orch.run(false).await.unwrap();

    let reviews = report.table("reviews").unwrap();
    assert_eq!(
        reviews.status,
        TableStatus::Skipped {
            reason: "table not found in target".into()
        }
    );

    let products = report.table("products").unwrap();
    assert_eq!(products.status, TableStatus::Completed);
    assert_eq!(products.inserted, 1);
    assert_eq!(products.skipped, 1);
    assert_eq!(products.issues[0].reason, "required value missing");
    assert_eq!(products.issues[0].column.as_deref(), Some("stock"));

    assert_eq!(report.table("orders").unwrap().inserted, 1);
    assert_eq!(report.status, "completed");
}

#[tokio::test]
async fn test_rejected_row_is_isolated_and_not_referenced() {
    let sql = seeded(
        r#"
        INSERT INTO users (id, email) VALUES (1, 'a@example.com'), (2, 'bad@example.com'),
                                             (3, 'c@example.com');
        INSERT INTO orders VALUES (100, 1, NULL, 10, 'paid'), (101, 2, NULL, 12, 'paid');
        "#,
    );
    let target = Arc::new(marketplace_target());
    target.reject_when("users", "email", "bad@example.com");
    let orch = orchestrator(config(&["users", "orders"]), source(&sql), target.clone());

    let report = orch.run(false).await.unwrap();
    assert_eq!(report.status, "completed_with_errors");

    let users = report.table("users").unwrap();
    assert_eq!(users.inserted, 2);
    assert_eq!(users.failed, 1);
    assert_eq!(users.issues[0].column.as_deref(), Some("id"));
    assert_eq!(users.issues[0].value, "2");
    assert_eq!(target.rows("users").len(), 2);

    let orders = report.table("orders").unwrap();
    assert_eq!(orders.inserted, 1);
    assert_eq!(orders.skipped, 1);
    assert_eq!(orders.issues[0].reason, "missing reference");
}

#[tokio::test]
async fn test_cycle_is_fatal_before_any_write() {
    let mut registry = Registry::empty();
    registry.insert(TableMigrationConfig::new("a").reference("b_id", "b"));
    registry.insert(TableMigrationConfig::new("b").reference("a_id", "a"));

    let target = Arc::new(MemoryTarget::new());
    let orch = Orchestrator::with_stores(
        config(&[]),
        registry,
        source("CREATE TABLE a (id INTEGER, b_id INTEGER); CREATE TABLE b (id INTEGER, a_id INTEGER);"),
        target.clone(),
    );

    match orch.run(false).await {
        Err(MigrateError::DependencyCycle(tables)) => assert_eq!(tables, vec!["a", "b"]),
        other => panic!("expected cycle error, got {:?}", other.map(|r| r.status)),
    }
    assert!(target.scripts().is_empty());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let target = Arc::new(marketplace_target());
    let orch = orchestrator(
        config(&["users", "orders"]),
        source(&seeded(USERS_AND_ORDERS)),
        target.clone(),
    );

    let report = orch.run(true).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.skipped, 1);
    assert!(target.rows("users").is_empty());
    assert!(target.rows("orders").is_empty());
}

#[tokio::test]
async fn test_unlisted_table_is_copied_as_is() {
    let target = Arc::new(MemoryTarget::new().with_table(
        "audit_log",
        vec![
            primary_key("id", TypeCategory::Integer),
            column("action", TypeCategory::Text, true),
        ],
    ));
    let orch = orchestrator(
        config(&["audit_log"]),
        source(
            "CREATE TABLE audit_log (id INTEGER PRIMARY KEY, action TEXT);
             INSERT INTO audit_log VALUES (1, 'login'), (2, 'logout'), (3, NULL);",
        ),
        target.clone(),
    );

    let report = orch.run(false).await.unwrap();
    assert_eq!(report.inserted, 3);
    let rows = target.rows("audit_log");
    assert_eq!(rows[0].get("id"), Some(&Value::Integer(1)));
    assert_eq!(rows[2].get("action"), Some(&Value::Null));
}

#[tokio::test]
async fn test_empty_source_table_is_skipped() {
    let target = Arc::new(marketplace_target());
    let orch = orchestrator(config(&["users"]), source(MARKETPLACE_SOURCE), target.clone());

    let report = orch.run(false).await.unwrap();
    assert_eq!(
        report.table("users").unwrap().status,
        TableStatus::Skipped {
            reason: "no source rows".into()
        }
    );
}

#[tokio::test]
async fn test_baseline_schema_is_applied_first() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "CREATE TABLE IF NOT EXISTS users (id uuid PRIMARY KEY);").unwrap();

    let mut cfg = config(&["users"]);
    cfg.migration.baseline_schema = Some(file.path().to_path_buf());

    let target = Arc::new(marketplace_target());
    let orch = orchestrator(cfg, source(&seeded(USERS_AND_ORDERS)), target.clone());
    orch.run(false).await.unwrap();

    let scripts = target.scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("CREATE TABLE IF NOT EXISTS users"));
}

#[tokio::test]
async fn test_plan_compare_and_health() {
    let target = Arc::new(marketplace_target());
    let orch = orchestrator(
        config(&["users", "orders", "reviews"]),
        source(&seeded(USERS_AND_ORDERS)),
        target.clone(),
    );

    let plan = orch.plan().await.unwrap();
    assert_eq!(plan.order, vec!["users", "orders", "reviews"]);
    let users = &plan.tables[0];
    assert_eq!(users.source_rows, 1);
    assert_eq!(users.columns[0].rule, "copy (primary key, remapped)");
    assert_eq!(
        plan.tables[2].skip_reason.as_deref(),
        Some("table not found in source")
    );
    assert!(target.rows("users").is_empty());

    orch.run(false).await.unwrap();
    let comparison = orch.compare().await.unwrap();
    assert!(comparison[0].matches);
    assert_eq!(comparison[1].source_rows, 2);
    assert_eq!(comparison[1].target_rows, 1);
    assert!(!comparison[1].matches);

    let health = orch.health_check().await;
    assert!(health.healthy);
    assert!(health.source_error.is_none());
}

fn category_tree(rows: &str) -> (Orchestrator, Arc<MemoryTarget>) {
    let mut registry = Registry::empty();
    registry.insert(
        TableMigrationConfig::new("categories")
            .primary_key("id")
            .reference("parent_id", "categories"),
    );
    let target = Arc::new(MemoryTarget::new().with_table(
        "categories",
        vec![
            primary_key("id", TypeCategory::Uuid),
            column("parent_id", TypeCategory::Uuid, true),
        ],
    ));
    let sql = format!(
        "CREATE TABLE categories (id INTEGER PRIMARY KEY, parent_id INTEGER);\n{}",
        rows
    );
    let orch = Orchestrator::with_stores(
        config(&["categories"]),
        registry,
        source(&sql),
        target.clone(),
    );
    (orch, target)
}

fn category_id(old: &str) -> String {
    IdentifierRemapper::new(DEFAULT_ID_NAMESPACE).assign_primary_key("categories", old)
}

#[tokio::test]
async fn test_parent_and_child_in_one_batch() {
    let (orch, target) = category_tree("INSERT INTO categories VALUES (1, NULL), (2, 1);");

    let report = orch.run(false).await.unwrap();
    let categories = report.table("categories").unwrap();
    assert_eq!(categories.inserted, 2);
    assert_eq!(categories.skipped, 0);

    let rows = target.rows("categories");
    assert_eq!(rows.len(), 2);
    assert_eq!(text(rows[0].get("id")), category_id("1"));
    assert_eq!(rows[0].get("parent_id"), Some(&Value::Null));
    assert_eq!(text(rows[1].get("parent_id")), category_id("1"));
}

#[tokio::test]
async fn test_child_waits_for_parent_from_a_later_batch() {
    let (orch, target) = category_tree(
        "INSERT INTO categories VALUES (10, 30), (20, NULL), (30, 20), (40, 99);",
    );

    let report = orch.run(false).await.unwrap();
    let categories = report.table("categories").unwrap();
    assert_eq!(categories.inserted, 3);
    assert_eq!(categories.skipped, 1);
    assert_eq!(categories.issues[0].column.as_deref(), Some("parent_id"));
    assert_eq!(categories.issues[0].value, "99");
    assert_eq!(categories.issues[0].reason, "missing reference");

    // Every parent is written before its children.
    let rows = target.rows("categories");
    let ids: Vec<String> = rows.iter().map(|r| text(r.get("id"))).collect();
    assert_eq!(ids, vec![category_id("20"), category_id("30"), category_id("10")]);
    assert_eq!(text(rows[2].get("parent_id")), category_id("30"));
}

#[tokio::test]
async fn test_unique_conflict_leaves_no_dangling_reference() {
    let sql = seeded(
        r#"
        INSERT INTO users (id, email) VALUES (1, 'a@example.com'), (2, 'a@example.com');
        INSERT INTO orders VALUES (100, 2, NULL, 10, 'paid'), (101, 1, NULL, 12, 'paid');
        "#,
    );
    let target = Arc::new(marketplace_target().with_unique("users", "email"));
    let orch = orchestrator(config(&["users", "orders"]), source(&sql), target.clone());

    let report = orch.run(false).await.unwrap();

    let users = report.table("users").unwrap();
    assert_eq!(users.inserted, 1);
    assert_eq!(users.duplicates, 0);
    assert_eq!(users.skipped, 1);
    assert_eq!(users.issues[0].value, "2");
    assert_eq!(users.issues[0].reason, "conflict on another unique key");

    let orders = report.table("orders").unwrap();
    assert_eq!(orders.inserted, 1);
    assert_eq!(orders.skipped, 1);
    assert_eq!(orders.issues[0].value, "2");
    assert_eq!(orders.issues[0].reason, "missing reference");

    let user_ids: HashSet<String> = target
        .rows("users")
        .iter()
        .map(|r| text(r.get("id")))
        .collect();
    for order in target.rows("orders") {
        assert!(user_ids.contains(&text(order.get("user_id"))));
    }
}

const TEXT_KEYED_SOURCE: &str = r#"
    CREATE TABLE users (id TEXT PRIMARY KEY, email TEXT NOT NULL, name TEXT,
                        created_at INTEGER, legacy_flag INTEGER);
    CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id TEXT, store_id INTEGER,
                         total REAL, status TEXT);
    INSERT INTO users (id, email) VALUES ('u1', 'u1@example.com');
    INSERT INTO orders VALUES (7, 'u1', NULL, 25.0, 'paid');
"#;

#[tokio::test]
async fn test_text_keyed_order_follows_migrated_user() {
    let target = Arc::new(marketplace_target());
    let orch = orchestrator(
        config(&["users", "orders"]),
        source(TEXT_KEYED_SOURCE),
        target.clone(),
    );

    let report = orch.run(false).await.unwrap();
    assert_eq!(report.status, "completed");
    assert_eq!(report.table("orders").unwrap().inserted, 1);

    let user = IdentifierRemapper::new(DEFAULT_ID_NAMESPACE).assign_primary_key("users", "u1");
    assert!(is_uuid(&user));
    assert_eq!(text(target.rows("users")[0].get("id")), user);
    let orders = target.rows("orders");
    assert_eq!(orders.len(), 1);
    assert_eq!(text(orders[0].get("user_id")), user);
}

#[tokio::test]
async fn test_text_keyed_order_without_users_is_skipped() {
    let target = Arc::new(marketplace_target());
    let orch = orchestrator(config(&["orders"]), source(TEXT_KEYED_SOURCE), target.clone());

    let report = orch.run(false).await.unwrap();
    let orders = report.table("orders").unwrap();
    assert_eq!(orders.inserted, 0);
    assert_eq!(orders.skipped, 1);
    assert_eq!(orders.issues[0].column.as_deref(), Some("user_id"));
    assert_eq!(orders.issues[0].value, "'u1'");
    assert_eq!(orders.issues[0].reason, "missing reference");
    assert!(target.rows("orders").is_empty());
}
