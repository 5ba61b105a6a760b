#![cfg(feature = "sqlite")]

mod common;

use common::unique_db_path;
use sql_action_middleware::prelude::*;

async fn sqlite_client(prefix: &str) -> Result<(DataSourceRegistry, SqlClient), SqlActionError> {
    let registry = DataSourceRegistry::new();
    let config = DataSourceConfig::builder(format!("sqlite:{}", unique_db_path(prefix)))
        .max_pool_size(4)
        .finish();
    let client = SqlClient::create_shared(&registry, &config, prefix)?;
    let session = client.get_connection().await?;
    session
        .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)")
        .await?;
    session.close().await?;
    Ok((registry, client))
}

fn text<'a>(page: &'a ResultPage, row: usize, column: &str) -> Option<&'a str> {
    page.rows().get(row)?.get(column)?.as_text()
}

#[tokio::test]
async fn insert_then_find_by_key() -> Result<(), Box<dyn std::error::Error>> {
    let (_registry, client) = sqlite_client("insert_find").await?;
    let session = client.get_connection().await?;

    let inserted = session
        .insert("t", ParamMap::from([("id", "1"), ("name", "a")]))
        .await?;
    assert_eq!(inserted.rows_affected, 1);
    assert_eq!(inserted.generated_keys, vec![RowValues::Int(1)]);

    let page = session
        .find_by_key("t", ParamMap::from([("id", "1")]))
        .await?
        .expect("select yields a page");
    assert_eq!(page.num_rows(), 1);
    assert_eq!(text(&page, 0, "name"), Some("a"));

    session.close().await?;
    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn update_by_key_then_find() -> Result<(), Box<dyn std::error::Error>> {
    let (_registry, client) = sqlite_client("update_find").await?;
    let session = client.get_connection().await?;

    session
        .insert("t", ParamMap::new().with("id", 1).with("name", "a").with("age", 30))
        .await?;
    let updated = session
        .update_by_key(
            "t",
            ParamMap::from([("name", "b")]),
            ParamMap::from([("id", "1")]),
        )
        .await?;
    assert_eq!(updated.rows_affected, 1);
    assert!(updated.generated_keys.is_empty());

    let page = session
        .find_by_key("t", ParamMap::from([("id", 1)]))
        .await?
        .expect("select yields a page");
    assert_eq!(text(&page, 0, "name"), Some("b"));
    assert_eq!(page.rows()[0].get("age").and_then(RowValues::as_int), Some(&30));

    session.close().await?;
    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn delete_by_key_with_compound_key() -> Result<(), Box<dyn std::error::Error>> {
    let (_registry, client) = sqlite_client("delete_compound").await?;
    let session = client.get_connection().await?;

    for (id, name) in [(1, "a"), (2, "a"), (3, "b")] {
        session
            .insert("t", ParamMap::new().with("id", id).with("name", name))
            .await?;
    }
    let deleted = session
        .delete_by_key("t", ParamMap::new().with("id", 2).with("name", "a"))
        .await?;
    assert_eq!(deleted.rows_affected, 1);

    let page = session
        .query("SELECT id FROM t ORDER BY id", Vec::new())
        .await?
        .expect("select yields a page");
    let ids: Vec<_> = page
        .rows()
        .iter()
        .filter_map(|row| row.get_by_index(0).and_then(RowValues::as_int).copied())
        .collect();
    assert_eq!(ids, vec![1, 3]);

    session.close().await?;
    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn named_and_dynamic_queries() -> Result<(), Box<dyn std::error::Error>> {
    let (_registry, client) = sqlite_client("named_dynamic").await?;
    let session = client.get_connection().await?;

    for (id, name, age) in [(1, "anna", 30), (2, "bob", 40), (3, "carla", 30)] {
        session
            .insert(
                "t",
                ParamMap::new().with("id", id).with("name", name).with("age", age),
            )
            .await?;
    }

    let liked = session
        .named_query(
            "select * from t where name like :n order by id",
            ParamMap::from([("n", "%a%")]),
        )
        .await?
        .expect("select yields a page");
    assert_eq!(liked.num_rows(), 2);
    assert_eq!(text(&liked, 1, "name"), Some("carla"));

    let repeated = session
        .named_query(
            "select count(*) as n from t where age = :age or id = :age",
            ParamMap::from([("age", 30)]),
        )
        .await?
        .expect("select yields a page");
    assert_eq!(
        repeated.rows()[0].get("n").and_then(RowValues::as_int),
        Some(&2)
    );

    let by_age = session
        .dynamic_query("t", ParamMap::from([("age", 40)]), |params, table| {
            let mut sql = format!("select name from {table} where 1=1");
            if params.get("age").is_some() {
                sql.push_str(" and age = :age");
            }
            if params.get("name").is_some() {
                sql.push_str(" and name = :name");
            }
            sql
        })
        .await?
        .expect("select yields a page");
    assert_eq!(by_age.num_rows(), 1);
    assert_eq!(text(&by_age, 0, "name"), Some("bob"));

    session.close().await?;
    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn missing_named_parameter_binds_null() -> Result<(), Box<dyn std::error::Error>> {
    let (_registry, client) = sqlite_client("missing_param").await?;
    let page = {
        let session = client.get_connection().await?;
        let page = session
            .named_query("select :absent is null as missing", ParamMap::new())
            .await?;
        session.close().await?;
        page.expect("select yields a page")
    };
    assert_eq!(
        page.rows()[0].get("missing").and_then(RowValues::as_int),
        Some(&1)
    );
    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn multi_statement_query_yields_page_chain() -> Result<(), Box<dyn std::error::Error>> {
    let (_registry, client) = sqlite_client("multi_result").await?;
    let head = client
        .query(
            "SELECT 1 AS a; SELECT 'two' AS b, 2 AS c; SELECT ? AS d",
            vec![RowValues::Int(3)],
        )
        .await?
        .expect("three pages");

    assert_eq!(head.chain_len(), 3);
    let columns: Vec<Vec<String>> = head.pages().map(|p| p.column_names().to_vec()).collect();
    assert_eq!(
        columns,
        vec![
            vec!["a".to_owned()],
            vec!["b".to_owned(), "c".to_owned()],
            vec!["d".to_owned()],
        ]
    );
    let last = head.pages().last().expect("last page");
    assert_eq!(last.rows()[0].get("d"), Some(&RowValues::Int(3)));

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn rollback_discards_and_commit_keeps() -> Result<(), Box<dyn std::error::Error>> {
    let (_registry, client) = sqlite_client("transactions").await?;
    let session = client.get_connection().await?;

    session.set_auto_commit(false).await?;
    session
        .insert("t", ParamMap::new().with("id", 1).with("name", "gone"))
        .await?;
    session.rollback().await?;
    session
        .insert("t", ParamMap::new().with("id", 2).with("name", "kept"))
        .await?;
    session.commit().await?;
    session.set_auto_commit(true).await?;
    session.close().await?;

    let page = client
        .query("SELECT name FROM t ORDER BY id", Vec::new())
        .await?
        .expect("select yields a page");
    assert_eq!(page.num_rows(), 1);
    assert_eq!(text(&page, 0, "name"), Some("kept"));

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn uncommitted_work_is_rolled_back_on_close() -> Result<(), Box<dyn std::error::Error>> {
    let (_registry, client) = sqlite_client("close_rollback").await?;
    let session = client.get_connection().await?;
    session.set_auto_commit(false).await?;
    session
        .insert("t", ParamMap::new().with("id", 1).with("name", "pending"))
        .await?;
    session.close().await?;

    let page = client
        .query("SELECT count(*) AS n FROM t", Vec::new())
        .await?
        .expect("select yields a page");
    assert_eq!(page.rows()[0].get("n"), Some(&RowValues::Int(0)));
    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn driver_rejection_is_an_execution_error() -> Result<(), Box<dyn std::error::Error>> {
    let (_registry, client) = sqlite_client("exec_error").await?;
    let session = client.get_connection().await?;

    session
        .insert("t", ParamMap::new().with("id", 1).with("name", "a"))
        .await?;
    let duplicate = session
        .insert("t", ParamMap::new().with("id", 1).with("name", "again"))
        .await
        .expect_err("primary key violation");
    assert_eq!(duplicate.kind(), ErrorKind::Execution);

    let missing = session
        .find_by_key("no_such_table", ParamMap::from([("id", 1)]))
        .await
        .expect_err("unknown table");
    assert_eq!(missing.kind(), ErrorKind::Execution);

    // The session stays usable after a failed action.
    let page = session
        .find_by_key("t", ParamMap::from([("id", 1)]))
        .await?
        .expect("select yields a page");
    assert_eq!(page.num_rows(), 1);

    session.close().await?;
    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn client_update_one_shot_reports_rowid() -> Result<(), Box<dyn std::error::Error>> {
    let (_registry, client) = sqlite_client("one_shot").await?;
    let outcome = client
        .update(
            "INSERT INTO t (name, age) VALUES (?, ?)",
            vec![RowValues::from("zed"), RowValues::Null],
        )
        .await?;
    assert_eq!(outcome.rows_affected, 1);
    assert_eq!(outcome.generated_keys, vec![RowValues::Int(1)]);

    let cleared = client
        .update("DELETE FROM t WHERE name = ?", vec![RowValues::from("zed")])
        .await?;
    assert_eq!(cleared.rows_affected, 1);
    assert!(cleared.generated_keys.is_empty());

    client.close().await?;
    Ok(())
}
