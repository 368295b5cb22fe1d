//! API keys and the keyed row CRUD surface
//!
//! A key belongs to one tenant and carries per-entity create/read/update/
//! delete flags. The secret is shown once at creation; only its SHA-256 hash
//! is stored. Every call that names a known key is recorded as an
//! [`ApiKeyLog`], whatever its outcome.

use chrono::{DateTime, Utc};
use serde_json::{json, Value as Json};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::context::TenantContext;
use crate::core::identity::{AccountId, ApiKeyId, RowId};
use crate::core::rows::{self, NewRow, RowError};
use crate::core::store::Store;
use crate::core::workflow::WorkflowEngine;
use crate::entities::{ApiKey, ApiKeyEntityPermission, ApiKeyLog, ApiMethod, Entity, Row};

#[derive(Debug, Error, PartialEq)]
pub enum ApiError {
    #[error("Invalid or unknown API key")]
    Unauthorized,

    #[error("API key {0} is inactive")]
    Inactive(String),

    #[error("API key {0} has expired")]
    Expired(String),

    #[error("API key not found: {0}")]
    KeyNotFound(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Entity '{0}' is not exposed through the API")]
    ApiDisabled(String),

    #[error("Only a super-role of the tenant may manage API keys")]
    PermissionDenied,

    #[error("API key alias cannot be empty")]
    EmptyAlias,
}

/// Input for [`create_api_key`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewApiKey {
    pub alias: String,
    pub entities: Vec<ApiKeyEntityPermission>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A freshly created key; `secret` is never stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedKey {
    pub id: ApiKeyId,
    pub secret: String,
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// SHA-256 of a key secret, hex encoded
pub fn hash_secret(secret: &str) -> String {
    to_hex(&Sha256::digest(secret.trim().as_bytes()))
}

fn require_key_admin(ctx: &TenantContext) -> Result<(), ApiError> {
    match ctx.tenant() {
        Some(tenant) if ctx.is_super() && ctx.is_member_of(tenant) => Ok(()),
        _ => Err(ApiError::PermissionDenied),
    }
}

/// Create a key for the caller's tenant and return its secret once
pub fn create_api_key(
    store: &mut Store,
    ctx: &TenantContext,
    input: NewApiKey,
) -> Result<IssuedKey, ApiError> {
    require_key_admin(ctx)?;
    let (Some(tenant), Some(identity)) = (ctx.tenant(), ctx.identity()) else {
        return Err(ApiError::PermissionDenied);
    };
    let alias = input.alias.trim();
    if alias.is_empty() {
        return Err(ApiError::EmptyAlias);
    }
    if let Some(missing) = input
        .entities
        .iter()
        .find(|p| store.entity(&p.entity_id).is_none())
    {
        return Err(ApiError::EntityNotFound(missing.entity_id.to_string()));
    }

    let secret = to_hex(&rand::random::<[u8; 32]>());
    let key = ApiKey {
        id: ApiKeyId::new(),
        tenant_id: tenant.clone(),
        alias: alias.to_string(),
        key_hash: hash_secret(&secret),
        created_by: identity.user_id.clone(),
        active: true,
        expires_at: input.expires_at,
        entities: input.entities,
        created_at: Utc::now(),
    };
    let id = key.id.clone();
    info!(key = %id, alias = %key.alias, tenant = %key.tenant_id, "created API key");
    store.api_keys.insert(id.clone(), key);
    Ok(IssuedKey { id, secret })
}

/// Deactivate a key of the caller's tenant
pub fn deactivate_api_key(
    store: &mut Store,
    ctx: &TenantContext,
    key_id: &ApiKeyId,
) -> Result<(), ApiError> {
    require_key_admin(ctx)?;
    let key = store
        .api_keys
        .get_mut(key_id)
        .filter(|k| ctx.is_member_of(&k.tenant_id))
        .ok_or_else(|| ApiError::KeyNotFound(key_id.to_string()))?;
    key.active = false;
    info!(key = %key_id, "deactivated API key");
    Ok(())
}

/// Key matching a presented secret, if it is usable at `now`
pub fn authenticate<'s>(
    store: &'s Store,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<&'s ApiKey, ApiError> {
    let hash = hash_secret(secret);
    let key = store
        .api_keys
        .values()
        .find(|k| k.key_hash == hash)
        .ok_or(ApiError::Unauthorized)?;
    if !key.active {
        return Err(ApiError::Inactive(key.id.to_string()));
    }
    if key.is_expired(now) {
        return Err(ApiError::Expired(key.id.to_string()));
    }
    Ok(key)
}

// =========================================================================
// Gateway
// =========================================================================

/// One keyed call against `/api/{entity_slug}[/{row_id}]`
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: ApiMethod,
    pub entity_slug: String,
    pub row_id: Option<RowId>,
    /// `{"values": {...}, "linkedAccountId": "..."}` for POST and PUT
    pub body: Option<Json>,
}

impl ApiRequest {
    pub fn new(method: ApiMethod, entity_slug: impl Into<String>) -> Self {
        Self {
            method,
            entity_slug: entity_slug.into(),
            row_id: None,
            body: None,
        }
    }

    pub fn row(mut self, row_id: RowId) -> Self {
        self.row_id = Some(row_id);
        self
    }

    pub fn body(mut self, body: Json) -> Self {
        self.body = Some(body);
        self
    }

    pub fn endpoint(&self) -> String {
        match &self.row_id {
            Some(id) => format!("/api/{}/{}", self.entity_slug, id),
            None => format!("/api/{}", self.entity_slug),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Json,
}

impl ApiResponse {
    fn ok(body: Json) -> Self {
        Self { status: 200, body }
    }

    fn created(body: Json) -> Self {
        Self { status: 201, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn error_message(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        self.body
            .get("error")
            .and_then(|e| e.as_str())
            .map(str::to_string)
    }
}

fn row_error_response(err: RowError) -> ApiResponse {
    match &err {
        RowError::RowNotFound(_) | RowError::EntityNotFound(_) => ApiResponse::error(404, err.to_string()),
        RowError::PermissionDenied(_) => ApiResponse::error(403, err.to_string()),
        RowError::Validation(errors) => ApiResponse {
            status: 400,
            body: json!({
                "error": err.to_string(),
                "fields": errors
                    .iter()
                    .map(|e| json!({ "property": e.property, "message": e.kind.to_string() }))
                    .collect::<Vec<_>>(),
            }),
        },
        _ => ApiResponse::error(400, err.to_string()),
    }
}

/// Keyed row CRUD over a store
pub struct ApiGateway<'s> {
    store: &'s mut Store,
}

impl<'s> ApiGateway<'s> {
    pub fn new(store: &'s mut Store) -> Self {
        Self { store }
    }

    /// Authenticate, authorize and execute one call
    pub fn dispatch(&mut self, secret: &str, request: &ApiRequest) -> ApiResponse {
        let now = Utc::now();
        let key = match authenticate(self.store, secret, now) {
            Ok(key) => key.clone(),
            Err(ApiError::Unauthorized) => {
                warn!(endpoint = %request.endpoint(), "rejected call with unknown API key");
                return ApiResponse::error(401, ApiError::Unauthorized.to_string());
            }
            Err(e) => {
                let response = ApiResponse::error(401, e.to_string());
                let hash = hash_secret(secret);
                let known = self
                    .store
                    .api_keys
                    .values()
                    .find(|k| k.key_hash == hash)
                    .map(|k| k.id.clone());
                if let Some(key_id) = known {
                    self.log_call(&key_id, request, &response, now);
                }
                return response;
            }
        };

        let response = self.execute(&key, request);
        self.log_call(&key.id, request, &response, now);
        debug!(
            key = %key.id,
            method = %request.method,
            endpoint = %request.endpoint(),
            status = response.status,
            "API call"
        );
        response
    }

    fn log_call(&mut self, key_id: &ApiKeyId, request: &ApiRequest, response: &ApiResponse, at: DateTime<Utc>) {
        self.store.api_logs.push(ApiKeyLog {
            api_key_id: key_id.clone(),
            method: request.method,
            endpoint: request.endpoint(),
            status: response.status,
            error: response.error_message(),
            created_at: at,
        });
    }

    fn execute(&mut self, key: &ApiKey, request: &ApiRequest) -> ApiResponse {
        let Some(entity) = self.store.entity_by_slug(&request.entity_slug).cloned() else {
            return ApiResponse::error(404, ApiError::EntityNotFound(request.entity_slug.clone()).to_string());
        };
        if !entity.flags.has_api || !entity.flags.active {
            return ApiResponse::error(404, ApiError::ApiDisabled(entity.slug.clone()).to_string());
        }
        let allowed = key
            .permission_for(&entity.id)
            .is_some_and(|p| p.allows(request.method));
        if !allowed {
            return ApiResponse::error(
                403,
                format!("API key may not {} {}", request.method, entity.slug),
            );
        }
        let ctx = TenantContext::api_key(key.tenant_id.clone(), key.id.clone());

        if let Some(row_id) = &request.row_id {
            let in_scope = self
                .store
                .row(row_id)
                .is_some_and(|r| r.entity_id == entity.id && r.tenant_id == key.tenant_id && !r.is_detail());
            if !in_scope {
                return ApiResponse::error(404, RowError::RowNotFound(row_id.to_string()).to_string());
            }
        }

        let result = match (request.method, &request.row_id) {
            (ApiMethod::Get, None) => self.list(&ctx, &entity),
            (ApiMethod::Get, Some(row_id)) => self.read(&ctx, row_id).map(ApiResponse::ok),
            (ApiMethod::Post, None) => self.create(&ctx, &entity, request.body.as_ref()),
            (ApiMethod::Put, Some(row_id)) => self.update(&ctx, &entity, row_id, request.body.as_ref()),
            (ApiMethod::Delete, Some(row_id)) => rows::delete_row(self.store, &ctx, row_id)
                .map(|removed| ApiResponse::ok(json!({ "deleted": removed.len() }))),
            (ApiMethod::Post, Some(_)) => {
                return ApiResponse::error(400, "POST does not take a row id");
            }
            (ApiMethod::Put | ApiMethod::Delete, None) => {
                return ApiResponse::error(400, format!("{} needs a row id", request.method));
            }
        };
        result.unwrap_or_else(row_error_response)
    }

    fn list(&self, ctx: &TenantContext, entity: &Entity) -> Result<ApiResponse, RowError> {
        let rows = rows::list_rows(self.store, ctx, &entity.id)?;
        let items: Vec<Json> = rows.iter().map(|r| row_json(self.store, r)).collect();
        Ok(ApiResponse::ok(Json::Array(items)))
    }

    fn read(&self, ctx: &TenantContext, row_id: &RowId) -> Result<Json, RowError> {
        let row = rows::get_row(self.store, ctx, row_id)?;
        Ok(row_json(self.store, row))
    }

    fn create(&mut self, ctx: &TenantContext, entity: &Entity, body: Option<&Json>) -> Result<ApiResponse, RowError> {
        let (values, linked) = match split_body(body) {
            Ok(parts) => parts,
            Err(message) => return Ok(ApiResponse::error(400, message)),
        };
        let mut new_row = NewRow::with_values(rows::inputs_from_json(self.store, &entity.id, false, &values)?);
        new_row.linked_account_id = linked;
        let row_id = rows::create_row(self.store, ctx, &entity.id, new_row)?;
        Ok(ApiResponse::created(self.read(ctx, &row_id)?))
    }

    fn update(
        &mut self,
        ctx: &TenantContext,
        entity: &Entity,
        row_id: &RowId,
        body: Option<&Json>,
    ) -> Result<ApiResponse, RowError> {
        let (values, _) = match split_body(body) {
            Ok(parts) => parts,
            Err(message) => return Ok(ApiResponse::error(400, message)),
        };
        let inputs = rows::inputs_from_json(self.store, &entity.id, false, &values)?;
        rows::set_values(self.store, ctx, row_id, inputs)?;
        Ok(ApiResponse::ok(self.read(ctx, row_id)?))
    }
}

fn split_body(body: Option<&Json>) -> Result<(serde_json::Map<String, Json>, Option<AccountId>), String> {
    let Some(body) = body else {
        return Ok((serde_json::Map::new(), None));
    };
    let object = body
        .as_object()
        .ok_or_else(|| "Request body must be a JSON object".to_string())?;
    let values = match object.get("values") {
        None | Some(Json::Null) => serde_json::Map::new(),
        Some(Json::Object(values)) => values.clone(),
        Some(_) => return Err("'values' must be an object keyed by property name".to_string()),
    };
    let linked = object
        .get("linkedAccountId")
        .and_then(|v| v.as_str())
        .map(AccountId::from);
    Ok((values, linked))
}

/// JSON shape of a row as returned by the API
pub fn row_json(store: &Store, row: &Row) -> Json {
    let state = WorkflowEngine::new(store, &row.entity_id)
        .ok()
        .filter(|engine| engine.is_enabled())
        .map(|engine| engine.state_title(row.workflow_state_id.as_ref()));
    json!({
        "id": row.id.to_string(),
        "folio": row.folio.as_ref().map(|f| f.to_string()),
        "version": row.version,
        "state": state,
        "createdAt": row.created_at,
        "values": rows::values_to_json(store, row),
    })
}
