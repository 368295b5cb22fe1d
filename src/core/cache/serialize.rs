//! SQLite serialization for typed enums and identifiers
//!
//! Enums are stored by their textual name, identifiers as their string
//! form, so the database stays readable with the sqlite3 shell.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::core::identity::{
    AccountId, ApiKeyId, EntityId, GroupId, LogId, OptionId, PropertyId, RoleId, RowId, StateId,
    StepId, TenantId, UserId,
};
use crate::entities::{ApiMethod, LogAction, PropertyType, Visibility};

fn invalid_data(message: String) -> FromSqlError {
    FromSqlError::Other(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

// =========================================================================
// PropertyType - ToSql/FromSql
// =========================================================================

impl ToSql for PropertyType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PropertyType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(invalid_data)
    }
}

// =========================================================================
// Visibility - ToSql/FromSql
// =========================================================================

impl ToSql for Visibility {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Visibility {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(invalid_data)
    }
}

// =========================================================================
// LogAction - ToSql/FromSql
// =========================================================================

impl ToSql for LogAction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for LogAction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(invalid_data)
    }
}

// =========================================================================
// ApiMethod - ToSql/FromSql
// =========================================================================

impl ToSql for ApiMethod {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ApiMethod {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(invalid_data)
    }
}

// =========================================================================
// Identifiers - ToSql/FromSql
// =========================================================================

macro_rules! sql_generated_id {
    ($($name:ident),* $(,)?) => {
        $(
            impl ToSql for $name {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $name {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: crate::core::identity::IdParseError| invalid_data(e.to_string()))
                }
            }
        )*
    };
}

macro_rules! sql_principal_id {
    ($($name:ident),* $(,)?) => {
        $(
            impl ToSql for $name {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $name {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    Ok($name::from(value.as_str()?))
                }
            }
        )*
    };
}

sql_generated_id!(EntityId, PropertyId, OptionId, RowId, StateId, StepId, LogId, ApiKeyId);
sql_principal_id!(TenantId, UserId, RoleId, GroupId, AccountId);
