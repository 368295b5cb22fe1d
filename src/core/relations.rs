//! Relation resolver for ENTITY properties
//!
//! ENTITY values only store the related row id. Resolution is strictly
//! tenant-scoped: a reference to a row of another tenant, of the wrong
//! entity, or to a row that no longer exists resolves to
//! [`Resolution::Unresolved`]. That is an explicit value, not an error.

use thiserror::Error;

use crate::core::identity::{PropertyId, RowId, TenantId};
use crate::core::store::Store;
use crate::entities::{Property, PropertyType, Row, RowValue};
use crate::schema::{relation_target_matches, UNRESOLVED};

#[derive(Debug, Error, PartialEq)]
pub enum RelationError {
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Property '{0}' is not an ENTITY property")]
    NotARelation(String),

    #[error("Property '{0}' has no related entity")]
    NoRelatedEntity(String),
}

/// Outcome of resolving an ENTITY value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'s> {
    Resolved(&'s Row),
    Unresolved,
}

impl<'s> Resolution<'s> {
    pub fn row(&self) -> Option<&'s Row> {
        match self {
            Resolution::Resolved(row) => Some(row),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    /// Folio of the related row, or the unresolved marker
    pub fn display(&self) -> String {
        match self {
            Resolution::Resolved(row) => row.display_folio(),
            Resolution::Unresolved => UNRESOLVED.to_string(),
        }
    }
}

fn relation_property<'s>(store: &'s Store, id: &PropertyId) -> Result<&'s Property, RelationError> {
    let property = store
        .property(id)
        .ok_or_else(|| RelationError::PropertyNotFound(id.to_string()))?;
    if property.property_type != PropertyType::Entity {
        return Err(RelationError::NotARelation(property.name.clone()));
    }
    Ok(property)
}

/// Rows an ENTITY property may point at inside `tenant_id`
pub fn candidates<'s>(
    store: &'s Store,
    property_id: &PropertyId,
    tenant_id: &TenantId,
) -> Result<Vec<&'s Row>, RelationError> {
    let property = relation_property(store, property_id)?;
    let related = property
        .related_entity_id
        .as_ref()
        .ok_or_else(|| RelationError::NoRelatedEntity(property.name.clone()))?;
    Ok(store.rows_of(related, tenant_id))
}

/// Resolve a stored ENTITY value for a caller in `tenant_id`
pub fn resolve<'s>(store: &'s Store, value: &RowValue, tenant_id: Option<&TenantId>) -> Resolution<'s> {
    let Some(property) = store
        .property(&value.property_id)
        .filter(|p| p.property_type == PropertyType::Entity)
    else {
        return Resolution::Unresolved;
    };
    value
        .value
        .as_relation()
        .and_then(|id| store.row(id))
        .filter(|row| relation_target_matches(row, property, tenant_id))
        .map(Resolution::Resolved)
        .unwrap_or(Resolution::Unresolved)
}

/// Rows whose ENTITY values point at `row_id`, with the referencing property
pub fn referencing_rows<'s>(store: &'s Store, row_id: &RowId) -> Vec<(&'s Row, &'s Property)> {
    let Some(target) = store.row(row_id) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for (source_id, values) in &store.values {
        let Some(source) = store.row(source_id) else {
            continue;
        };
        if source.tenant_id != target.tenant_id {
            continue;
        }
        for (property_id, value) in values {
            if value.as_relation() != Some(row_id) {
                continue;
            }
            if let Some(property) = store.property(property_id) {
                if property.property_type == PropertyType::Entity {
                    found.push((source, property));
                }
            }
        }
    }
    found.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{TenantContext, UserIdentity};
    use crate::core::registry::{self, NewEntity, NewProperty};
    use crate::core::rows::{self, NewRow, ValueInput};
    use crate::core::identity::EntityId;
    use crate::entities::Value;

    struct Fixture {
        store: Store,
        clients: EntityId,
        contracts: EntityId,
        client_prop: PropertyId,
    }

    fn admin(tenant: &str) -> TenantContext {
        TenantContext::user(tenant, UserIdentity::new("root").super_user())
    }

    fn fixture() -> Fixture {
        let mut store = Store::new();
        let ctx = admin("acme");
        let clients =
            registry::create_entity(&mut store, &ctx, NewEntity::new("Client", "clients", "CLI")).unwrap();
        let contracts =
            registry::create_entity(&mut store, &ctx, NewEntity::new("Contract", "contracts", "CON"))
                .unwrap();
        let client_prop = registry::add_property(
            &mut store,
            &ctx,
            &contracts,
            NewProperty::new("client", "Client", PropertyType::Entity).relates_to(clients.clone()),
        )
        .unwrap();
        Fixture {
            store,
            clients,
            contracts,
            client_prop,
        }
    }

    #[test]
    fn test_candidates_are_tenant_scoped() {
        let mut f = fixture();
        rows::create_row(&mut f.store, &admin("acme"), &f.clients, NewRow::default()).unwrap();
        rows::create_row(&mut f.store, &admin("acme"), &f.clients, NewRow::default()).unwrap();
        rows::create_row(&mut f.store, &admin("globex"), &f.clients, NewRow::default()).unwrap();

        let acme = candidates(&f.store, &f.client_prop, &TenantId::from("acme")).unwrap();
        assert_eq!(acme.len(), 2);
        let globex = candidates(&f.store, &f.client_prop, &TenantId::from("globex")).unwrap();
        assert_eq!(globex.len(), 1);
    }

    #[test]
    fn test_resolve_and_dangling() {
        let mut f = fixture();
        let ctx = admin("acme");
        let client = rows::create_row(&mut f.store, &ctx, &f.clients, NewRow::default()).unwrap();
        let contract = rows::create_row(
            &mut f.store,
            &ctx,
            &f.contracts,
            NewRow::with_values(vec![ValueInput::set(
                f.client_prop.clone(),
                Value::RelationRef(client.clone()),
            )]),
        )
        .unwrap();

        let value = RowValue {
            row_id: contract.clone(),
            property_id: f.client_prop.clone(),
            value: Value::RelationRef(client.clone()),
        };
        let acme = TenantId::from("acme");
        let resolution = resolve(&f.store, &value, Some(&acme));
        assert_eq!(resolution.display(), "CLI-0001");
        assert_eq!(referencing_rows(&f.store, &client).len(), 1);

        let globex = TenantId::from("globex");
        assert_eq!(resolve(&f.store, &value, Some(&globex)), Resolution::Unresolved);

        rows::delete_row(&mut f.store, &ctx, &client).unwrap();
        let resolution = resolve(&f.store, &value, Some(&acme));
        assert!(!resolution.is_resolved());
        assert_eq!(resolution.display(), "—");
    }

    #[test]
    fn test_cross_tenant_reference_rejected_on_write() {
        let mut f = fixture();
        let foreign = rows::create_row(&mut f.store, &admin("globex"), &f.clients, NewRow::default()).unwrap();
        let err = rows::create_row(
            &mut f.store,
            &admin("acme"),
            &f.contracts,
            NewRow::with_values(vec![ValueInput::set(
                f.client_prop.clone(),
                Value::RelationRef(foreign),
            )]),
        )
        .unwrap_err();
        assert_eq!(err.validation_errors()[0].property, "client");
    }

    #[test]
    fn test_not_a_relation() {
        let mut f = fixture();
        let name = registry::add_property(
            &mut f.store,
            &admin("acme"),
            &f.contracts,
            NewProperty::new("name", "Name", PropertyType::Text),
        )
        .unwrap();
        assert_eq!(
            candidates(&f.store, &name, &TenantId::from("acme")),
            Err(RelationError::NotARelation("name".to_string()))
        );
    }
}
