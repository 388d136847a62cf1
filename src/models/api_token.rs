//! API token allow-list.
//!
//! Tokens are opaque bearer strings. Every item operation is gated on "token
//! exists and is active"; anything else fails closed.

use anyhow::{Context, Result};
use diesel::prelude::*;
use rand::RngCore;
use serde::Serialize;

use crate::schema::api_tokens;

#[derive(Debug, Clone, Serialize, Queryable)]
#[diesel(table_name = api_tokens)]
pub struct ApiToken {
    pub token: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = api_tokens)]
pub struct NewApiToken {
    pub token: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: i64,
}

/// Generate a fresh `tok_`-prefixed bearer string.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("tok_{}", hex::encode(bytes))
}

impl ApiToken {
    pub fn create(conn: &mut SqliteConnection, name: &str, now_ms: i64) -> Result<ApiToken> {
        let new_token = NewApiToken {
            token: generate_token(),
            name: name.to_string(),
            is_active: true,
            created_at: now_ms,
        };

        diesel::insert_into(api_tokens::table)
            .values(&new_token)
            .execute(conn)
            .context("Failed to insert API token")?;

        api_tokens::table
            .filter(api_tokens::token.eq(new_token.token))
            .first(conn)
            .context("Failed to load inserted API token")
    }

    pub fn find(conn: &mut SqliteConnection, token: &str) -> Result<Option<ApiToken>> {
        api_tokens::table
            .filter(api_tokens::token.eq(token))
            .first(conn)
            .optional()
            .context("Failed to query API token")
    }

    pub fn list(conn: &mut SqliteConnection) -> Result<Vec<ApiToken>> {
        api_tokens::table
            .order(api_tokens::created_at.desc())
            .load(conn)
            .context("Failed to list API tokens")
    }

    pub fn count(conn: &mut SqliteConnection) -> Result<i64> {
        api_tokens::table
            .count()
            .get_result(conn)
            .context("Failed to count API tokens")
    }

    pub fn set_active(conn: &mut SqliteConnection, token: &str, active: bool) -> Result<bool> {
        let updated = diesel::update(api_tokens::table.filter(api_tokens::token.eq(token)))
            .set(api_tokens::is_active.eq(active))
            .execute(conn)
            .context("Failed to update API token")?;

        Ok(updated == 1)
    }

    pub fn delete(conn: &mut SqliteConnection, token: &str) -> Result<bool> {
        let deleted = diesel::delete(api_tokens::table.filter(api_tokens::token.eq(token)))
            .execute(conn)
            .context("Failed to delete API token")?;

        Ok(deleted == 1)
    }

    /// Best-effort usage tracking; callers ignore the result.
    pub fn touch_last_used(conn: &mut SqliteConnection, token: &str, now_ms: i64) -> Result<()> {
        diesel::update(api_tokens::table.filter(api_tokens::token.eq(token)))
            .set(api_tokens::last_used_at.eq(now_ms))
            .execute(conn)
            .context("Failed to update token last_used_at")?;
        Ok(())
    }

    /// Insert the configured bootstrap token when the table is empty, so a
    /// fresh deployment has one working credential.
    pub fn ensure_bootstrap(conn: &mut SqliteConnection, token: &str, now_ms: i64) -> Result<bool> {
        if Self::count(conn)? > 0 {
            return Ok(false);
        }

        let new_token = NewApiToken {
            token: token.to_string(),
            name: "bootstrap".to_string(),
            is_active: true,
            created_at: now_ms,
        };

        diesel::insert_into(api_tokens::table)
            .values(&new_token)
            .execute(conn)
            .context("Failed to insert bootstrap token")?;

        Ok(true)
    }
}
