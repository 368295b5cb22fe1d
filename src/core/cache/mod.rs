//! SQLite persistence of the store
//!
//! The in-memory [`Store`] is the working set; [`Database`] writes it out
//! and reads it back. Row values keep the EAV shape on disk: one row per
//! (row, property) with one column per storage slot, exactly one of which is
//! non-NULL.

mod serialize;

#[cfg(test)]
mod tests;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::context::Actor;
use crate::core::identity::{ApiKeyId, EntityId, OptionId, PropertyId, RowId, TenantId, UserId};
use crate::core::store::Store;
use crate::entities::{
    ApiKey, ApiKeyLog, Entity, EntityFlags, Folio, Log, MediaRef, Principal, Property,
    PropertyAttribute, PropertyOption, Reaction, Row, RowPermission, Value, WorkflowState,
    WorkflowStep,
};

/// Bumped whenever the table layout changes
const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i64, supported: i64 },
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    title_plural TEXT NOT NULL,
    ord INTEGER NOT NULL,
    prefix TEXT NOT NULL,
    flags TEXT NOT NULL,
    default_visibility TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS properties (
    id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL,
    parent_id TEXT,
    related_entity_id TEXT,
    ord INTEGER NOT NULL,
    name TEXT NOT NULL,
    title TEXT NOT NULL,
    property_type TEXT NOT NULL,
    is_default INTEGER NOT NULL,
    is_dynamic INTEGER NOT NULL,
    is_required INTEGER NOT NULL,
    is_hidden INTEGER NOT NULL,
    is_detail INTEGER NOT NULL,
    UNIQUE (entity_id, name)
);

CREATE TABLE IF NOT EXISTS property_attributes (
    property_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (property_id, position)
);

CREATE TABLE IF NOT EXISTS property_options (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL,
    parent_id TEXT,
    ord INTEGER NOT NULL,
    value TEXT NOT NULL,
    name TEXT,
    color TEXT
);

CREATE TABLE IF NOT EXISTS rows (
    id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    parent_id TEXT,
    ord INTEGER NOT NULL,
    folio_prefix TEXT,
    folio_number INTEGER,
    created_by_kind TEXT NOT NULL,
    created_by TEXT NOT NULL,
    linked_account_id TEXT,
    workflow_state_id TEXT,
    visibility TEXT NOT NULL,
    version INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rows_entity ON rows (entity_id, tenant_id);

CREATE TABLE IF NOT EXISTS row_values (
    row_id TEXT NOT NULL,
    property_id TEXT NOT NULL,
    text_value TEXT,
    number_value REAL,
    date_value TEXT,
    boolean_value INTEGER,
    relation_value TEXT,
    option_value TEXT,
    media_value TEXT,
    PRIMARY KEY (row_id, property_id)
);

CREATE TABLE IF NOT EXISTS row_permissions (
    row_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    principal_kind TEXT NOT NULL,
    principal_id TEXT NOT NULL,
    can_comment INTEGER NOT NULL,
    can_update INTEGER NOT NULL,
    can_delete INTEGER NOT NULL,
    PRIMARY KEY (row_id, position)
);

CREATE TABLE IF NOT EXISTS workflow_states (
    id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL,
    ord INTEGER NOT NULL,
    title TEXT NOT NULL,
    color TEXT
);

CREATE TABLE IF NOT EXISTS workflow_steps (
    id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL,
    ord INTEGER NOT NULL,
    from_state_id TEXT,
    to_state_id TEXT NOT NULL,
    action TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS logs (
    position INTEGER PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    row_id TEXT NOT NULL,
    actor_kind TEXT,
    actor_id TEXT,
    action TEXT NOT NULL,
    details TEXT NOT NULL,
    created_at TEXT NOT NULL,
    is_deleted INTEGER NOT NULL,
    reactions TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    alias TEXT NOT NULL,
    key_hash TEXT NOT NULL UNIQUE,
    created_by TEXT NOT NULL,
    active INTEGER NOT NULL,
    expires_at TEXT,
    entities TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_key_logs (
    position INTEGER PRIMARY KEY,
    api_key_id TEXT NOT NULL,
    method TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    status INTEGER NOT NULL,
    error TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS folio_counters (
    entity_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    last_number INTEGER NOT NULL,
    PRIMARY KEY (entity_id, tenant_id)
);
"#;

/// Tables in the order they are cleared before a save
const TABLES: &[&str] = &[
    "entities",
    "properties",
    "property_attributes",
    "property_options",
    "rows",
    "row_values",
    "row_permissions",
    "workflow_states",
    "workflow_steps",
    "logs",
    "api_keys",
    "api_key_logs",
    "folio_counters",
];

/// SQLite file holding one store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if found > SCHEMA_VERSION {
            return Err(CacheError::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self { conn })
    }

    /// Replace the database content with `store`, in one transaction
    pub fn save(&mut self, store: &Store) -> Result<(), CacheError> {
        let tx = self.conn.transaction()?;
        for table in TABLES {
            tx.execute(&format!("DELETE FROM {}", table), [])?;
        }
        save_registry(&tx, store)?;
        save_rows(&tx, store)?;
        save_activity(&tx, store)?;
        tx.commit()?;
        debug!(
            entities = store.entities.len(),
            rows = store.rows.len(),
            logs = store.logs.len(),
            "saved store"
        );
        Ok(())
    }

    /// Rebuild a store from the database
    pub fn load(&self) -> Result<Store, CacheError> {
        let mut store = Store::new();
        load_registry(&self.conn, &mut store)?;
        load_rows(&self.conn, &mut store)?;
        load_activity(&self.conn, &mut store)?;
        debug!(
            entities = store.entities.len(),
            rows = store.rows.len(),
            logs = store.logs.len(),
            "loaded store"
        );
        Ok(store)
    }

    /// Number of stored rows of an entity slug, without loading the store
    pub fn row_count(&self, entity_slug: &str) -> Result<Option<u64>, CacheError> {
        let entity: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM entities WHERE slug = ?1",
                [entity_slug],
                |row| row.get(0),
            )
            .optional()?;
        let Some(entity) = entity else {
            return Ok(None);
        };
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM rows WHERE entity_id = ?1 AND parent_id IS NULL",
            [entity],
            |row| row.get(0),
        )?;
        Ok(Some(count as u64))
    }
}

// =========================================================================
// Column helpers
// =========================================================================

fn actor_columns(actor: &Actor) -> (&'static str, &str) {
    match actor {
        Actor::User(id) => ("user", id.as_str()),
        Actor::ApiKey(id) => ("api_key", id.as_str()),
    }
}

fn actor_from_columns(kind: &str, id: &str) -> Result<Actor, CacheError> {
    match kind {
        "user" => Ok(Actor::User(UserId::from(id))),
        "api_key" => id
            .parse::<ApiKeyId>()
            .map(Actor::ApiKey)
            .map_err(|e| CacheError::Corrupt(e.to_string())),
        other => Err(CacheError::Corrupt(format!("unknown actor kind '{}'", other))),
    }
}

fn principal_columns(principal: &Principal) -> (&'static str, &str) {
    match principal {
        Principal::Tenant(id) => ("tenant", id.as_str()),
        Principal::Role(id) => ("role", id.as_str()),
        Principal::Group(id) => ("group", id.as_str()),
        Principal::User(id) => ("user", id.as_str()),
    }
}

fn principal_from_columns(kind: &str, id: String) -> Result<Principal, CacheError> {
    match kind {
        "tenant" => Ok(Principal::Tenant(id.into())),
        "role" => Ok(Principal::Role(id.into())),
        "group" => Ok(Principal::Group(id.into())),
        "user" => Ok(Principal::User(id.into())),
        other => Err(CacheError::Corrupt(format!("unknown principal kind '{}'", other))),
    }
}

/// Slot columns of a value, in table order
#[derive(Default)]
struct SlotColumns {
    text: Option<String>,
    number: Option<f64>,
    date: Option<chrono::DateTime<chrono::Utc>>,
    boolean: Option<bool>,
    relation: Option<RowId>,
    option: Option<OptionId>,
    media: Option<String>,
}

impl SlotColumns {
    fn from_value(value: &Value) -> Result<Self, CacheError> {
        let mut cols = SlotColumns::default();
        match value {
            Value::Text(s) => cols.text = Some(s.clone()),
            Value::Number(n) => cols.number = Some(*n),
            Value::Date(d) => cols.date = Some(*d),
            Value::Boolean(b) => cols.boolean = Some(*b),
            Value::RelationRef(id) => cols.relation = Some(id.clone()),
            Value::OptionRef(id) => cols.option = Some(id.clone()),
            Value::MediaRefs(media) => cols.media = Some(serde_json::to_string(media)?),
        }
        Ok(cols)
    }

    fn into_value(self) -> Result<Option<Value>, CacheError> {
        let value = if let Some(s) = self.text {
            Value::Text(s)
        } else if let Some(n) = self.number {
            Value::Number(n)
        } else if let Some(d) = self.date {
            Value::Date(d)
        } else if let Some(b) = self.boolean {
            Value::Boolean(b)
        } else if let Some(id) = self.relation {
            Value::RelationRef(id)
        } else if let Some(id) = self.option {
            Value::OptionRef(id)
        } else if let Some(json) = self.media {
            Value::MediaRefs(serde_json::from_str::<Vec<MediaRef>>(&json)?)
        } else {
            return Ok(None);
        };
        Ok(Some(value))
    }
}

// =========================================================================
// Save
// =========================================================================

fn save_registry(tx: &Transaction<'_>, store: &Store) -> Result<(), CacheError> {
    for e in store.entities.values() {
        tx.execute(
            "INSERT INTO entities (id, name, slug, title, title_plural, ord, prefix, flags,
                default_visibility, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                e.id,
                e.name,
                e.slug,
                e.title,
                e.title_plural,
                e.order,
                e.prefix,
                serde_json::to_string(&e.flags)?,
                e.default_visibility,
                e.created_at,
            ],
        )?;
    }

    for p in store.properties.values() {
        tx.execute(
            "INSERT INTO properties (id, entity_id, parent_id, related_entity_id, ord, name, title,
                property_type, is_default, is_dynamic, is_required, is_hidden, is_detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                p.id,
                p.entity_id,
                p.parent_id,
                p.related_entity_id,
                p.order,
                p.name,
                p.title,
                p.property_type,
                p.is_default,
                p.is_dynamic,
                p.is_required,
                p.is_hidden,
                p.is_detail,
            ],
        )?;
        for (position, a) in p.attributes.iter().enumerate() {
            tx.execute(
                "INSERT INTO property_attributes (property_id, position, name, value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![p.id, position as i64, a.name, a.value],
            )?;
        }
        for o in &p.options {
            tx.execute(
                "INSERT INTO property_options (id, property_id, parent_id, ord, value, name, color)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![o.id, p.id, o.parent_id, o.order, o.value, o.name, o.color],
            )?;
        }
    }

    for s in store.states.values() {
        tx.execute(
            "INSERT INTO workflow_states (id, entity_id, ord, title, color)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![s.id, s.entity_id, s.order, s.title, s.color],
        )?;
    }
    for s in store.steps.values() {
        tx.execute(
            "INSERT INTO workflow_steps (id, entity_id, ord, from_state_id, to_state_id, action)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![s.id, s.entity_id, s.order, s.from_state_id, s.to_state_id, s.action],
        )?;
    }
    Ok(())
}

fn save_rows(tx: &Transaction<'_>, store: &Store) -> Result<(), CacheError> {
    for r in store.rows.values() {
        let (actor_kind, actor_id) = actor_columns(&r.created_by);
        tx.execute(
            "INSERT INTO rows (id, entity_id, tenant_id, parent_id, ord, folio_prefix, folio_number,
                created_by_kind, created_by, linked_account_id, workflow_state_id, visibility,
                version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                r.id,
                r.entity_id,
                r.tenant_id,
                r.parent_id,
                r.order,
                r.folio.as_ref().map(|f| f.prefix.as_str()),
                r.folio.as_ref().map(|f| f.number as i64),
                actor_kind,
                actor_id,
                r.linked_account_id,
                r.workflow_state_id,
                r.visibility,
                r.version as i64,
                r.created_at,
                r.updated_at,
            ],
        )?;
        for (position, grant) in r.permissions.iter().enumerate() {
            let (kind, id) = principal_columns(&grant.principal);
            tx.execute(
                "INSERT INTO row_permissions (row_id, position, principal_kind, principal_id,
                    can_comment, can_update, can_delete)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    r.id,
                    position as i64,
                    kind,
                    id,
                    grant.can_comment,
                    grant.can_update,
                    grant.can_delete,
                ],
            )?;
        }
    }

    for (row_id, values) in &store.values {
        for (property_id, value) in values {
            let c = SlotColumns::from_value(value)?;
            tx.execute(
                "INSERT INTO row_values (row_id, property_id, text_value, number_value, date_value,
                    boolean_value, relation_value, option_value, media_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    row_id,
                    property_id,
                    c.text,
                    c.number,
                    c.date,
                    c.boolean,
                    c.relation,
                    c.option,
                    c.media,
                ],
            )?;
        }
    }

    for ((entity_id, tenant_id), last) in &store.folio_counters {
        tx.execute(
            "INSERT INTO folio_counters (entity_id, tenant_id, last_number) VALUES (?1, ?2, ?3)",
            params![entity_id, tenant_id, *last as i64],
        )?;
    }
    Ok(())
}

fn save_activity(tx: &Transaction<'_>, store: &Store) -> Result<(), CacheError> {
    for (position, log) in store.logs.iter().enumerate() {
        let (actor_kind, actor_id) = match &log.actor {
            Some(actor) => {
                let (kind, id) = actor_columns(actor);
                (Some(kind), Some(id))
            }
            None => (None, None),
        };
        tx.execute(
            "INSERT INTO logs (position, id, row_id, actor_kind, actor_id, action, details,
                created_at, is_deleted, reactions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                position as i64,
                log.id,
                log.row_id,
                actor_kind,
                actor_id,
                log.action,
                serde_json::to_string(&log.details)?,
                log.created_at,
                log.is_deleted,
                serde_json::to_string(&log.reactions)?,
            ],
        )?;
    }

    for key in store.api_keys.values() {
        tx.execute(
            "INSERT INTO api_keys (id, tenant_id, alias, key_hash, created_by, active, expires_at,
                entities, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                key.id,
                key.tenant_id,
                key.alias,
                key.key_hash,
                key.created_by,
                key.active,
                key.expires_at,
                serde_json::to_string(&key.entities)?,
                key.created_at,
            ],
        )?;
    }
    for (position, call) in store.api_logs.iter().enumerate() {
        tx.execute(
            "INSERT INTO api_key_logs (position, api_key_id, method, endpoint, status, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                position as i64,
                call.api_key_id,
                call.method,
                call.endpoint,
                call.status,
                call.error,
                call.created_at,
            ],
        )?;
    }
    Ok(())
}

// =========================================================================
// Load
// =========================================================================

fn load_registry(conn: &Connection, store: &mut Store) -> Result<(), CacheError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, slug, title, title_plural, ord, prefix, flags, default_visibility,
            created_at FROM entities",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            Entity {
                id: row.get(0)?,
                name: row.get(1)?,
                slug: row.get(2)?,
                title: row.get(3)?,
                title_plural: row.get(4)?,
                order: row.get(5)?,
                prefix: row.get(6)?,
                flags: EntityFlags::default(),
                default_visibility: row.get(8)?,
                created_at: row.get(9)?,
            },
            row.get::<_, String>(7)?,
        ))
    })?;
    for item in rows {
        let (mut entity, flags) = item?;
        entity.flags = serde_json::from_str(&flags)?;
        store.entities.insert(entity.id.clone(), entity);
    }

    let mut stmt = conn.prepare(
        "SELECT id, entity_id, parent_id, related_entity_id, ord, name, title, property_type,
            is_default, is_dynamic, is_required, is_hidden, is_detail FROM properties",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Property {
            id: row.get(0)?,
            entity_id: row.get(1)?,
            parent_id: row.get(2)?,
            related_entity_id: row.get(3)?,
            order: row.get(4)?,
            name: row.get(5)?,
            title: row.get(6)?,
            property_type: row.get(7)?,
            is_default: row.get(8)?,
            is_dynamic: row.get(9)?,
            is_required: row.get(10)?,
            is_hidden: row.get(11)?,
            is_detail: row.get(12)?,
            attributes: Vec::new(),
            options: Vec::new(),
        })
    })?;
    for property in rows {
        let property = property?;
        store.properties.insert(property.id.clone(), property);
    }

    let mut stmt = conn.prepare(
        "SELECT property_id, name, value FROM property_attributes ORDER BY property_id, position",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, PropertyId>(0)?,
            PropertyAttribute {
                name: row.get(1)?,
                value: row.get(2)?,
            },
        ))
    })?;
    for item in rows {
        let (property_id, attribute) = item?;
        let property = store
            .properties
            .get_mut(&property_id)
            .ok_or_else(|| CacheError::Corrupt(format!("attribute of unknown property {}", property_id)))?;
        property.attributes.push(attribute);
    }

    let mut stmt = conn.prepare(
        "SELECT id, property_id, parent_id, ord, value, name, color FROM property_options
         ORDER BY property_id, ord",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, PropertyId>(1)?,
            PropertyOption {
                id: row.get(0)?,
                parent_id: row.get(2)?,
                order: row.get(3)?,
                value: row.get(4)?,
                name: row.get(5)?,
                color: row.get(6)?,
            },
        ))
    })?;
    for item in rows {
        let (property_id, option) = item?;
        let property = store
            .properties
            .get_mut(&property_id)
            .ok_or_else(|| CacheError::Corrupt(format!("option of unknown property {}", property_id)))?;
        property.options.push(option);
    }

    let mut stmt = conn.prepare("SELECT id, entity_id, ord, title, color FROM workflow_states")?;
    let rows = stmt.query_map([], |row| {
        Ok(WorkflowState {
            id: row.get(0)?,
            entity_id: row.get(1)?,
            order: row.get(2)?,
            title: row.get(3)?,
            color: row.get(4)?,
        })
    })?;
    for state in rows {
        let state = state?;
        store.states.insert(state.id.clone(), state);
    }

    let mut stmt = conn.prepare(
        "SELECT id, entity_id, ord, from_state_id, to_state_id, action FROM workflow_steps",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(WorkflowStep {
            id: row.get(0)?,
            entity_id: row.get(1)?,
            order: row.get(2)?,
            from_state_id: row.get(3)?,
            to_state_id: row.get(4)?,
            action: row.get(5)?,
        })
    })?;
    for step in rows {
        let step = step?;
        store.steps.insert(step.id.clone(), step);
    }
    Ok(())
}

fn load_rows(conn: &Connection, store: &mut Store) -> Result<(), CacheError> {
    let mut stmt = conn.prepare(
        "SELECT id, entity_id, tenant_id, parent_id, ord, folio_prefix, folio_number,
            created_by_kind, created_by, linked_account_id, workflow_state_id, visibility,
            version, created_at, updated_at FROM rows",
    )?;
    let rows = stmt.query_map([], |row| {
        let prefix: Option<String> = row.get(5)?;
        let number: Option<i64> = row.get(6)?;
        let folio = match (prefix, number) {
            (Some(prefix), Some(number)) => Some(Folio {
                prefix,
                number: number as u64,
            }),
            _ => None,
        };
        Ok((
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
            Row {
                id: row.get(0)?,
                entity_id: row.get(1)?,
                tenant_id: row.get(2)?,
                parent_id: row.get(3)?,
                order: row.get(4)?,
                folio,
                created_by: Actor::User(UserId::from("")),
                linked_account_id: row.get(9)?,
                workflow_state_id: row.get(10)?,
                visibility: row.get(11)?,
                permissions: Vec::new(),
                version: row.get::<_, i64>(12)? as u64,
                created_at: row.get(13)?,
                updated_at: row.get(14)?,
            },
        ))
    })?;
    for item in rows {
        let (kind, id, mut r) = item?;
        r.created_by = actor_from_columns(&kind, &id)?;
        // Every row owns a value map, even with no cells stored
        store.values.entry(r.id.clone()).or_default();
        store.rows.insert(r.id.clone(), r);
    }

    let mut stmt = conn.prepare(
        "SELECT row_id, principal_kind, principal_id, can_comment, can_update, can_delete
         FROM row_permissions ORDER BY row_id, position",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, RowId>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
            row.get::<_, bool>(4)?,
            row.get::<_, bool>(5)?,
        ))
    })?;
    for item in rows {
        let (row_id, kind, id, can_comment, can_update, can_delete) = item?;
        let grant = RowPermission {
            principal: principal_from_columns(&kind, id)?,
            can_comment,
            can_update,
            can_delete,
        };
        store
            .rows
            .get_mut(&row_id)
            .ok_or_else(|| CacheError::Corrupt(format!("grant on unknown row {}", row_id)))?
            .permissions
            .push(grant);
    }

    let mut stmt = conn.prepare(
        "SELECT row_id, property_id, text_value, number_value, date_value, boolean_value,
            relation_value, option_value, media_value FROM row_values",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, RowId>(0)?,
            row.get::<_, PropertyId>(1)?,
            SlotColumns {
                text: row.get(2)?,
                number: row.get(3)?,
                date: row.get(4)?,
                boolean: row.get(5)?,
                relation: row.get(6)?,
                option: row.get(7)?,
                media: row.get(8)?,
            },
        ))
    })?;
    for item in rows {
        let (row_id, property_id, columns) = item?;
        let value = columns
            .into_value()?
            .ok_or_else(|| CacheError::Corrupt(format!("empty value cell on row {}", row_id)))?;
        store
            .values
            .entry(row_id)
            .or_default()
            .insert(property_id, value);
    }

    let mut stmt = conn.prepare("SELECT entity_id, tenant_id, last_number FROM folio_counters")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, EntityId>(0)?,
            row.get::<_, TenantId>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for item in rows {
        let (entity_id, tenant_id, last) = item?;
        store.folio_counters.insert((entity_id, tenant_id), last as u64);
    }
    Ok(())
}

fn load_activity(conn: &Connection, store: &mut Store) -> Result<(), CacheError> {
    let mut stmt = conn.prepare(
        "SELECT id, row_id, actor_kind, actor_id, action, details, created_at, is_deleted,
            reactions FROM logs ORDER BY position",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(8)?,
            Log {
                id: row.get(0)?,
                row_id: row.get(1)?,
                actor: None,
                action: row.get(4)?,
                details: serde_json::Value::Null,
                created_at: row.get(6)?,
                is_deleted: row.get(7)?,
                reactions: Vec::new(),
            },
        ))
    })?;
    for item in rows {
        let (kind, id, details, reactions, mut log) = item?;
        log.actor = match (kind, id) {
            (Some(kind), Some(id)) => Some(actor_from_columns(&kind, &id)?),
            _ => None,
        };
        log.details = serde_json::from_str(&details)?;
        log.reactions = serde_json::from_str::<Vec<Reaction>>(&reactions)?;
        store.logs.push(log);
    }

    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, alias, key_hash, created_by, active, expires_at, entities,
            created_at FROM api_keys",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(7)?,
            ApiKey {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                alias: row.get(2)?,
                key_hash: row.get(3)?,
                created_by: row.get(4)?,
                active: row.get(5)?,
                expires_at: row.get(6)?,
                entities: Vec::new(),
                created_at: row.get(8)?,
            },
        ))
    })?;
    for item in rows {
        let (entities, mut key) = item?;
        key.entities = serde_json::from_str(&entities)?;
        store.api_keys.insert(key.id.clone(), key);
    }

    let mut stmt = conn.prepare(
        "SELECT api_key_id, method, endpoint, status, error, created_at FROM api_key_logs
         ORDER BY position",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ApiKeyLog {
            api_key_id: row.get(0)?,
            method: row.get(1)?,
            endpoint: row.get(2)?,
            status: row.get(3)?,
            error: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    for call in rows {
        store.api_logs.push(call?);
    }
    Ok(())
}
