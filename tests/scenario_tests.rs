//! End-to-end scenarios against the library API

use chrono::{TimeZone, Utc};
use eb::core::context::{TenantContext, UserIdentity};
use eb::core::identity::{EntityId, PropertyId, RowId};
use eb::core::permissions::{self, ShareRequest};
use eb::core::registry::{self, NewEntity, NewOption, NewProperty};
use eb::core::rows::{self, NewRow, ValueInput};
use eb::core::{activity, workflow, Database, RowError, ShareError, Store, WorkflowError};
use eb::entities::{EntityFlags, LogAction, MediaRef, PropertyType, Value, Visibility};
use eb::schema::ValidationErrorKind;

fn admin() -> TenantContext {
    TenantContext::user("acme", UserIdentity::new("root").super_user())
}

fn alice() -> TenantContext {
    TenantContext::user("acme", UserIdentity::new("alice"))
}

fn bob() -> TenantContext {
    TenantContext::user("acme", UserIdentity::new("bob"))
}

struct Contracts {
    store: Store,
    entity: EntityId,
    title: PropertyId,
    status: PropertyId,
}

/// Tenant-visible Contract entity with a required title and a Draft/Sent/Signed status
fn contracts() -> Contracts {
    let mut store = Store::new();
    let ctx = admin();
    let entity = registry::create_entity(
        &mut store,
        &ctx,
        NewEntity::new("Contract", "contracts", "CON").with_flags(EntityFlags {
            has_workflow: true,
            ..EntityFlags::default()
        })
        .with_default_visibility(Visibility::Tenant),
    )
    .unwrap();
    let title = registry::add_property(
        &mut store,
        &ctx,
        &entity,
        NewProperty::new("title", "Title", PropertyType::Text).required(),
    )
    .unwrap();
    let status = registry::add_property(
        &mut store,
        &ctx,
        &entity,
        NewProperty::new("status", "Status", PropertyType::Select)
            .option(NewOption::new("draft").named("Draft"))
            .option(NewOption::new("sent").named("Sent"))
            .option(NewOption::new("signed").named("Signed")),
    )
    .unwrap();
    Contracts {
        store,
        entity,
        title,
        status,
    }
}

fn new_contract(c: &mut Contracts, ctx: &TenantContext, title: &str) -> RowId {
    rows::create_row(
        &mut c.store,
        ctx,
        &c.entity,
        NewRow::with_values(vec![ValueInput::set(
            c.title.clone(),
            Value::Text(title.to_string()),
        )]),
    )
    .unwrap()
}

#[test]
fn test_send_needs_a_step_leaving_the_current_state() {
    let mut c = contracts();
    let ctx = admin();
    let draft = workflow::add_state(&mut c.store, &ctx, &c.entity, "Draft", None).unwrap();
    let sent = workflow::add_state(&mut c.store, &ctx, &c.entity, "Sent", None).unwrap();
    let send = workflow::add_step(&mut c.store, &ctx, &c.entity, Some(&draft), &sent, "Send").unwrap();

    let row = new_contract(&mut c, &ctx, "Lease");
    assert_eq!(c.store.row(&row).unwrap().workflow_state_id, None);

    let err = workflow::transition(&mut c.store, &ctx, &row, &send).unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert_eq!(c.store.row(&row).unwrap().workflow_state_id, None);
    assert!(activity::history(&c.store, &ctx, &row)
        .unwrap()
        .iter()
        .all(|log| log.action != LogAction::WorkflowTransition));

    workflow::add_step(&mut c.store, &ctx, &c.entity, None, &sent, "Send").unwrap();
    let state = workflow::transition_by_action(&mut c.store, &ctx, &row, "Send").unwrap();
    assert_eq!(state, sent);
    assert_eq!(c.store.row(&row).unwrap().workflow_state_id, Some(sent));
    assert!(activity::history(&c.store, &ctx, &row)
        .unwrap()
        .iter()
        .any(|log| log.action == LogAction::WorkflowTransition));
}

#[test]
fn test_transition_from_draft() {
    let mut c = contracts();
    let ctx = admin();
    let draft = workflow::add_state(&mut c.store, &ctx, &c.entity, "Draft", None).unwrap();
    let sent = workflow::add_state(&mut c.store, &ctx, &c.entity, "Sent", None).unwrap();
    workflow::add_step(&mut c.store, &ctx, &c.entity, None, &draft, "Start").unwrap();
    let send = workflow::add_step(&mut c.store, &ctx, &c.entity, Some(&draft), &sent, "Send").unwrap();

    let row = new_contract(&mut c, &ctx, "Lease");
    workflow::transition_by_action(&mut c.store, &ctx, &row, "Start").unwrap();
    let next = workflow::row_next_steps(&c.store, &ctx, &row).unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].id, send);

    workflow::transition(&mut c.store, &ctx, &row, &send).unwrap();
    assert_eq!(c.store.row(&row).unwrap().workflow_state_id, Some(sent));
}

#[test]
fn test_required_value_rejected_atomically() {
    let mut c = contracts();
    let ctx = admin();
    let row = new_contract(&mut c, &ctx, "Lease");
    let draft = c.store.property(&c.status).unwrap().options[0].id.clone();
    let before = rows::get_values(&c.store, &ctx, &row).unwrap();

    let err = rows::set_values(
        &mut c.store,
        &ctx,
        &row,
        vec![
            ValueInput::set(c.status.clone(), Value::OptionRef(draft)),
            ValueInput::clear(c.title.clone()),
        ],
    )
    .unwrap_err();

    let errors = err.validation_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].property, "title");
    assert_eq!(errors[0].kind, ValidationErrorKind::Required);
    assert_eq!(rows::get_values(&c.store, &ctx, &row).unwrap(), before);
}

#[test]
fn test_round_trip_for_every_stored_type() {
    let mut store = Store::new();
    let ctx = admin();
    let clients = registry::create_entity(&mut store, &ctx, NewEntity::new("Client", "clients", "CLI")).unwrap();
    let entity = registry::create_entity(&mut store, &ctx, NewEntity::new("Asset", "assets", "AST")).unwrap();

    let mut add = |name: &str, ty: PropertyType| {
        let mut new = NewProperty::new(name, name, ty);
        if ty == PropertyType::Select {
            new = new.option(NewOption::new("a")).option(NewOption::new("b"));
        }
        if ty == PropertyType::Entity {
            new = new.relates_to(clients.clone());
        }
        registry::add_property(&mut store, &ctx, &entity, new).unwrap()
    };
    let text = add("label", PropertyType::Text);
    let number = add("weight", PropertyType::Number);
    let date = add("bought", PropertyType::Date);
    let flag = add("insured", PropertyType::Boolean);
    let select = add("grade", PropertyType::Select);
    let relation = add("owner", PropertyType::Entity);
    let media = add("photos", PropertyType::Media);

    let client = rows::create_row(&mut store, &ctx, &clients, NewRow::default()).unwrap();
    let option = store.property(&select).unwrap().options[1].id.clone();
    let photo = MediaRef {
        name: "front.jpg".to_string(),
        file: "files/front.jpg".to_string(),
        title: None,
        mime_type: Some("image/jpeg".to_string()),
        size: Some(48_213),
        public_url: None,
    };

    let inputs = vec![
        (text, Value::Text("Forklift".to_string())),
        (number, Value::Number(1250.5)),
        (date, Value::Date(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())),
        (flag, Value::Boolean(true)),
        (select, Value::OptionRef(option)),
        (relation, Value::RelationRef(client)),
        (media, Value::MediaRefs(vec![photo])),
    ];
    let row = rows::create_row(&mut store, &ctx, &entity, NewRow::default()).unwrap();
    rows::set_values(
        &mut store,
        &ctx,
        &row,
        inputs
            .iter()
            .map(|(p, v)| ValueInput::set(p.clone(), v.clone()))
            .collect(),
    )
    .unwrap();

    let stored = rows::get_values(&store, &ctx, &row).unwrap();
    assert_eq!(stored.len(), inputs.len());
    for (property, value) in &inputs {
        let found = stored.iter().find(|v| &v.property_id == property).unwrap();
        assert_eq!(&found.value, value);
    }
}

#[test]
fn test_dependent_select_cleared_on_parent_change() {
    let mut store = Store::new();
    let ctx = admin();
    let entity = registry::create_entity(&mut store, &ctx, NewEntity::new("Site", "sites", "SIT")).unwrap();
    let country = registry::add_property(
        &mut store,
        &ctx,
        &entity,
        NewProperty::new("country", "Country", PropertyType::Select)
            .option(NewOption::new("mx"))
            .option(NewOption::new("us")),
    )
    .unwrap();
    let city = registry::add_property(
        &mut store,
        &ctx,
        &entity,
        NewProperty::new("city", "City", PropertyType::Select)
            .depends_on(country.clone())
            .option(NewOption::new("monterrey").under("mx"))
            .option(NewOption::new("austin").under("us")),
    )
    .unwrap();
    let option = |store: &Store, property: &PropertyId, value: &str| {
        store
            .property(property)
            .unwrap()
            .options
            .iter()
            .find(|o| o.value == value)
            .unwrap()
            .id
            .clone()
    };
    let mx = option(&store, &country, "mx");
    let us = option(&store, &country, "us");
    let monterrey = option(&store, &city, "monterrey");

    let row = rows::create_row(
        &mut store,
        &ctx,
        &entity,
        NewRow::with_values(vec![
            ValueInput::set(country.clone(), Value::OptionRef(mx)),
            ValueInput::set(city.clone(), Value::OptionRef(monterrey)),
        ]),
    )
    .unwrap();

    let outcome = rows::set_values(
        &mut store,
        &ctx,
        &row,
        vec![ValueInput::set(country.clone(), Value::OptionRef(us))],
    )
    .unwrap();
    assert_eq!(outcome.cleared, vec!["city".to_string()]);
    assert!(store.value(&row, &city).is_none());
}

#[test]
fn test_private_row_hidden_from_everyone_but_creator_and_super() {
    let mut c = contracts();
    let row = new_contract(&mut c, &alice(), "Lease");
    permissions::share(&mut c.store, &alice(), &row, ShareRequest::new(Visibility::Private)).unwrap();
    let stored = c.store.row(&row).unwrap();

    assert_eq!(permissions::resolve(stored, &bob()), Default::default());
    assert!(!permissions::resolve(stored, &TenantContext::anonymous()).can_read);
    assert!(permissions::resolve(stored, &alice()).can_update);
    assert!(permissions::resolve(stored, &admin()).can_delete);

    let outsider = TenantContext::user("globex", UserIdentity::new("root").super_user());
    assert!(!permissions::resolve(stored, &outsider).can_read);
}

#[test]
fn test_public_row_readable_anonymously() {
    let mut c = contracts();
    let row = new_contract(&mut c, &alice(), "Lease");
    permissions::share(&mut c.store, &alice(), &row, ShareRequest::new(Visibility::Public)).unwrap();

    let stored = c.store.row(&row).unwrap();
    assert!(permissions::resolve(stored, &TenantContext::anonymous()).can_read);
    assert!(!permissions::resolve(stored, &TenantContext::anonymous()).can_update);
    let elsewhere = TenantContext::user("globex", UserIdentity::new("eve"));
    assert!(permissions::resolve(stored, &elsewhere).can_read);
    assert!(permissions::public_row(&c.store, "contracts", &row).is_ok());
}

#[test]
fn test_empty_group_share_rejected_without_change() {
    let mut c = contracts();
    let row = new_contract(&mut c, &alice(), "Lease");
    let before = c.store.row(&row).unwrap().clone();

    let err = permissions::share(&mut c.store, &alice(), &row, ShareRequest::new(Visibility::Groups)).unwrap_err();
    assert_eq!(err, ShareError::UnsavableShareConfig(Visibility::Groups));

    let after = c.store.row(&row).unwrap();
    assert_eq!(after.visibility, before.visibility);
    assert_eq!(after.permissions, before.permissions);
    assert!(activity::history(&c.store, &alice(), &row)
        .unwrap()
        .iter()
        .all(|log| log.action != LogAction::Shared));
}

#[test]
fn test_store_survives_database_round_trip() {
    let mut c = contracts();
    let row = new_contract(&mut c, &alice(), "Lease");
    activity::add_comment(&mut c.store, &bob(), &row, "Please review").unwrap();

    let mut db = Database::open_in_memory().unwrap();
    db.save(&c.store).unwrap();
    let loaded = db.load().unwrap();

    let values = rows::formatted_values(&loaded, &alice(), &row).unwrap();
    assert_eq!(values[0].text, "Lease");
    assert_eq!(loaded.row(&row).unwrap().display_folio(), "CON-0001");
    assert_eq!(activity::history(&loaded, &alice(), &row).unwrap().len(), 2);
    assert_eq!(db.row_count("contracts").unwrap(), Some(1));
}

#[test]
fn test_rows_of_other_tenants_are_invisible() {
    let mut c = contracts();
    let row = new_contract(&mut c, &alice(), "Lease");
    let eve = TenantContext::user("globex", UserIdentity::new("eve"));

    assert!(rows::list_rows(&c.store, &eve, &c.entity).unwrap().is_empty());
    assert!(matches!(
        rows::get_row(&c.store, &eve, &row),
        Err(RowError::PermissionDenied(_)) | Err(RowError::RowNotFound(_))
    ));
}
