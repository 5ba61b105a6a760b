mod common;

use std::sync::atomic::Ordering;

use common::{FakeState, fake_config, fake_registry};
use sql_action_middleware::prelude::*;

#[tokio::test]
async fn permission_denied_key_read_does_not_fail_insert() -> Result<(), SqlActionError> {
    let state = FakeState::new();
    state.fail_key_read.store(true, Ordering::SeqCst);
    let registry = fake_registry(&state);
    let client = SqlClient::create_shared(&registry, &fake_config(), "keys_denied")?;
    let session = client.get_connection().await?;

    let outcome = session
        .insert("t", ParamMap::from([("id", "1"), ("name", "a")]))
        .await?;
    assert_eq!(outcome.rows_affected, 1);
    assert!(outcome.generated_keys.is_empty());

    let deleted = session
        .delete_by_key("t", ParamMap::from([("id", "1")]))
        .await?;
    assert!(deleted.generated_keys.is_empty());

    session.close().await?;
    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn driver_keys_are_reported_after_mutations() -> Result<(), SqlActionError> {
    let state = FakeState::new();
    let registry = fake_registry(&state);
    let client = SqlClient::create_shared(&registry, &fake_config(), "keys_ok")?;
    let session = client.get_connection().await?;

    let inserted = session.insert("t", ParamMap::from([("name", "a")])).await?;
    assert_eq!(inserted.generated_keys, vec![RowValues::Int(42)]);

    // Deletes still read keys; some drivers report the removed row ids.
    let deleted = session
        .delete_by_key("t", ParamMap::from([("id", 42)]))
        .await?;
    assert_eq!(deleted.generated_keys, vec![RowValues::Int(42)]);

    session.close().await?;
    client.close().await?;
    Ok(())
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn sqlite_reports_rowid_for_inserts_only() -> Result<(), SqlActionError> {
    let registry = DataSourceRegistry::new();
    let config = DataSourceConfig::builder(common::unique_db_path("rowid")).finish();
    let client = SqlClient::create_non_shared(&registry, &config)?;
    let session = client.get_connection().await?;

    session
        .execute("CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT)")
        .await?;
    let first = session.insert("items", ParamMap::from([("label", "x")])).await?;
    let second = session.insert("items", ParamMap::from([("label", "y")])).await?;
    assert_eq!(first.generated_keys, vec![RowValues::Int(1)]);
    assert_eq!(second.generated_keys, vec![RowValues::Int(2)]);

    let updated = session
        .update_by_key(
            "items",
            ParamMap::from([("label", "z")]),
            ParamMap::from([("id", 2)]),
        )
        .await?;
    assert_eq!(updated.rows_affected, 1);
    assert!(updated.generated_keys.is_empty());

    session.close().await?;
    client.close().await?;
    Ok(())
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn sqlite_reports_equal_rowids_from_different_tables() -> Result<(), SqlActionError> {
    let registry = DataSourceRegistry::new();
    let config = DataSourceConfig::builder(common::unique_db_path("rowid_tables")).finish();
    let client = SqlClient::create_non_shared(&registry, &config)?;
    let session = client.get_connection().await?;

    session
        .execute("CREATE TABLE a (id INTEGER PRIMARY KEY, v TEXT); CREATE TABLE b (id INTEGER PRIMARY KEY, v TEXT)")
        .await?;
    let first = session.insert("a", ParamMap::from([("v", "x")])).await?;
    let second = session.insert("b", ParamMap::from([("v", "y")])).await?;
    assert_eq!(first.generated_keys, vec![RowValues::Int(1)]);
    assert_eq!(second.generated_keys, vec![RowValues::Int(1)]);

    // Re-inserting an explicit id after deleting it reports the same rowid again.
    session.delete_by_key("b", ParamMap::from([("id", 1)])).await?;
    let again = session
        .insert("b", ParamMap::new().with("id", 1).with("v", "z"))
        .await?;
    assert_eq!(again.generated_keys, vec![RowValues::Int(1)]);

    session.close().await?;
    client.close().await?;
    Ok(())
}
