//! Unit tests for the cache module

use super::*;
use crate::core::activity;
use crate::core::api::{self, NewApiKey};
use crate::core::context::{TenantContext, UserIdentity};
use crate::core::identity::{EntityId, GroupId};
use crate::core::permissions::{self, ShareRequest};
use crate::core::registry::{self, NewEntity, NewOption, NewProperty};
use crate::core::rows::{self, NewRow, ValueInput};
use crate::core::workflow;
use crate::entities::{ApiKeyEntityPermission, EntityFlags, PropertyType, Visibility};
use chrono::{TimeZone, Utc};
use tempfile::tempdir;

fn admin() -> TenantContext {
    TenantContext::user("acme", UserIdentity::new("root").super_user())
}

/// Store with one entity holding every storable type, a workflow, a
/// shared row with a comment and an API key
fn populated_store() -> (Store, EntityId, RowId) {
    let mut store = Store::new();
    let ctx = admin();
    let flags = EntityFlags {
        has_workflow: true,
        has_api: true,
        ..EntityFlags::default()
    };
    let clients = registry::create_entity(
        &mut store,
        &ctx,
        NewEntity::new("Client", "clients", "CLI"),
    )
    .unwrap();
    let contracts = registry::create_entity(
        &mut store,
        &ctx,
        NewEntity::new("Contract", "contracts", "CON")
            .with_flags(flags)
            .with_default_visibility(Visibility::Tenant),
    )
    .unwrap();

    let title = registry::add_property(
        &mut store,
        &ctx,
        &contracts,
        NewProperty::new("title", "Title", PropertyType::Text)
            .required()
            .attribute("pattern", "[A-Z].*"),
    )
    .unwrap();
    let amount = registry::add_property(
        &mut store,
        &ctx,
        &contracts,
        NewProperty::new("amount", "Amount", PropertyType::Number).attribute("min", "0"),
    )
    .unwrap();
    let signed_on = registry::add_property(
        &mut store,
        &ctx,
        &contracts,
        NewProperty::new("signedOn", "Signed on", PropertyType::Date),
    )
    .unwrap();
    let urgent = registry::add_property(
        &mut store,
        &ctx,
        &contracts,
        NewProperty::new("urgent", "Urgent", PropertyType::Boolean),
    )
    .unwrap();
    let status = registry::add_property(
        &mut store,
        &ctx,
        &contracts,
        NewProperty::new("status", "Status", PropertyType::Select)
            .option(NewOption::new("draft").named("Draft").colored("#999999"))
            .option(NewOption::new("sent").named("Sent")),
    )
    .unwrap();
    let client = registry::add_property(
        &mut store,
        &ctx,
        &contracts,
        NewProperty::new("client", "Client", PropertyType::Entity).relates_to(clients.clone()),
    )
    .unwrap();
    let files = registry::add_property(
        &mut store,
        &ctx,
        &contracts,
        NewProperty::new("files", "Files", PropertyType::Media),
    )
    .unwrap();

    let draft = workflow::add_state(&mut store, &ctx, &contracts, "Draft", None).unwrap();
    let sent = workflow::add_state(&mut store, &ctx, &contracts, "Sent", Some("#00ff00".into())).unwrap();
    workflow::add_step(&mut store, &ctx, &contracts, None, &draft, "Start").unwrap();
    workflow::add_step(&mut store, &ctx, &contracts, Some(&draft), &sent, "Send").unwrap();

    let client_row = rows::create_row(&mut store, &ctx, &clients, NewRow::default()).unwrap();
    let draft_option = store.property(&status).unwrap().find_option("draft").unwrap().id.clone();
    let row = rows::create_row(
        &mut store,
        &ctx,
        &contracts,
        NewRow::with_values(vec![
            ValueInput::set(title, Value::Text("Master agreement".into())),
            ValueInput::set(amount, Value::Number(1250.5)),
            ValueInput::set(
                signed_on,
                Value::Date(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            ),
            ValueInput::set(urgent, Value::Boolean(true)),
            ValueInput::set(status, Value::OptionRef(draft_option)),
            ValueInput::set(client, Value::RelationRef(client_row)),
            ValueInput::set(files, Value::MediaRefs(vec![MediaRef::new("scan.pdf", "uploads/scan.pdf")])),
        ]),
    )
    .unwrap();
    workflow::transition_by_action(&mut store, &ctx, &row, "Start").unwrap();
    permissions::share(
        &mut store,
        &ctx,
        &row,
        ShareRequest::new(Visibility::Groups).with_groups([GroupId::from("legal")]),
    )
    .unwrap();
    let comment = activity::add_comment(&mut store, &ctx, &row, "Ready for review").unwrap();
    activity::add_reaction(&mut store, &ctx, &comment, "thumbsup").unwrap();

    api::create_api_key(
        &mut store,
        &ctx,
        NewApiKey {
            alias: "erp".to_string(),
            entities: vec![ApiKeyEntityPermission {
                entity_id: contracts.clone(),
                create: false,
                read: true,
                update: false,
                delete: false,
            }],
            expires_at: None,
        },
    )
    .unwrap();

    (store, contracts, row)
}

#[test]
fn test_database_creation() {
    let tmp = tempdir().unwrap();
    let db = Database::open(&tmp.path().join("eb.db")).unwrap();
    let store = db.load().unwrap();
    assert!(store.entities().is_empty());
}

#[test]
fn test_save_load_roundtrip() {
    let (store, contracts, row) = populated_store();
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("eb.db");

    let mut db = Database::open(&path).unwrap();
    db.save(&store).unwrap();
    drop(db);

    let loaded = Database::open(&path).unwrap().load().unwrap();
    assert_eq!(loaded.entities, store.entities);
    assert_eq!(loaded.properties, store.properties);
    assert_eq!(loaded.rows, store.rows);
    assert_eq!(loaded.values, store.values);
    assert_eq!(loaded.states, store.states);
    assert_eq!(loaded.steps, store.steps);
    assert_eq!(loaded.logs, store.logs);
    assert_eq!(loaded.api_keys, store.api_keys);
    assert_eq!(loaded.folio_counters, store.folio_counters);

    let loaded_row = loaded.row(&row).unwrap();
    assert_eq!(loaded_row.visibility, Visibility::Groups);
    assert_eq!(loaded_row.display_folio(), "CON-0001");
    assert_eq!(loaded.properties_of(&contracts).len(), 7);
}

#[test]
fn test_save_replaces_previous_content() {
    let (mut store, contracts, row) = populated_store();
    let mut db = Database::open_in_memory().unwrap();
    db.save(&store).unwrap();

    rows::delete_row(&mut store, &admin(), &row).unwrap();
    db.save(&store).unwrap();

    let loaded = db.load().unwrap();
    assert!(loaded.row(&row).is_none());
    assert!(loaded.values_of(&row).is_none());
    assert!(loaded.entity(&contracts).is_some());
    assert_eq!(db.row_count("contracts").unwrap(), Some(0));
}

#[test]
fn test_folio_counter_survives_reload() {
    let (store, contracts, _) = populated_store();
    let mut db = Database::open_in_memory().unwrap();
    db.save(&store).unwrap();

    let mut loaded = db.load().unwrap();
    let title = loaded.property_by_name(&contracts, "title").unwrap().id.clone();
    let next = rows::create_row(
        &mut loaded,
        &admin(),
        &contracts,
        NewRow::with_values(vec![ValueInput::set(title, Value::Text("Addendum".into()))]),
    )
    .unwrap();
    assert_eq!(loaded.row(&next).unwrap().display_folio(), "CON-0002");
}

#[test]
fn test_row_without_values_keeps_empty_map() {
    let mut store = Store::new();
    let ctx = admin();
    let notes = registry::create_entity(&mut store, &ctx, NewEntity::new("Note", "notes", "NOT")).unwrap();
    let row = rows::create_row(&mut store, &ctx, &notes, NewRow::default()).unwrap();
    assert!(store.values_of(&row).is_some_and(|v| v.is_empty()));

    let mut db = Database::open_in_memory().unwrap();
    db.save(&store).unwrap();
    let loaded = db.load().unwrap();
    assert!(loaded.values_of(&row).is_some_and(|v| v.is_empty()));
    assert_eq!(loaded.values, store.values);
}

#[test]
fn test_row_count_unknown_entity() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(db.row_count("nothing").unwrap(), None);
}

#[test]
fn test_rejects_newer_schema() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("eb.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
    }
    let result = Database::open(&path);
    assert!(matches!(
        result,
        Err(CacheError::UnsupportedSchema { found, .. }) if found == SCHEMA_VERSION + 1
    ));
}

#[test]
fn test_corrupt_value_cell() {
    let db = Database::open_in_memory().unwrap();
    db.conn
        .execute(
            "INSERT INTO row_values (row_id, property_id) VALUES (?1, ?2)",
            params![RowId::new(), PropertyId::new()],
        )
        .unwrap();
    assert!(matches!(db.load(), Err(CacheError::Corrupt(_))));
}
