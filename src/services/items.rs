//! Item lifecycle manager.
//!
//! Owns the per-item state machine: create (one layer), read with a decrypt
//! attempt, extend (one more layer, optimistic concurrency on `layer_count`),
//! delete, plus list and stats aggregation. All store writes are
//! all-or-nothing: a freshly computed ciphertext that fails to commit is
//! simply discarded and the prior state stays authoritative.

use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::beacon::{BeaconError, RandomnessBeacon};
use crate::crypto::{self, tle, CipherError, Unwrapped, UnwrapError};
use crate::db::{self, DbPool};
use crate::error::ApiError;
use crate::models::item::{Item, ItemKind, ItemSort, NewItem};

pub const MAX_BATCH_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: i64 = 1000;
const DEFAULT_PAGE_SIZE: i64 = 50;
const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub decrypt_at: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Public view of an item. The ciphertext itself is never exposed; content
/// only appears once the item is unlocked and fully unwrapped.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub original_name: Option<String>,
    pub decrypt_at: i64,
    pub created_at: i64,
    pub layer_count: i32,
    pub unlocked: bool,
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendOutcome {
    pub decrypt_at: i64,
    pub layer_count: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub count: usize,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView {
    pub items: Vec<ItemView>,
    pub total: usize,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub total_items: usize,
    pub locked_items: usize,
    pub unlocked_items: usize,
    pub by_type: KindCounts,
    pub avg_lock_duration_minutes: i64,
    pub oldest_item: Option<i64>,
    pub newest_item: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct KindCounts {
    pub text: usize,
    pub image: usize,
}

/// A create request that passed validation: decoded payload bytes plus the
/// resolved unlock instant.
struct ValidatedCreate {
    kind: ItemKind,
    payload: Vec<u8>,
    unlock_at: i64,
    original_name: Option<String>,
    metadata: Option<String>,
}

pub struct ItemService<B> {
    pool: DbPool,
    beacon: Arc<B>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl<B: RandomnessBeacon> ItemService<B> {
    pub fn new(pool: DbPool, beacon: Arc<B>) -> Self {
        Self { pool, beacon }
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub async fn create(&self, request: CreateItemRequest) -> Result<ItemView, ApiError> {
        let now = now_ms();
        let validated = validate_create(&request, now)?;
        let new_item = self.encrypt_to_new_item(validated, now)?;

        let item = db::run(&self.pool, move |conn| Item::create(conn, new_item)).await?;

        debug!(id = %item.id, round = item.unlock_round, "created time-locked item");
        Ok(self.view(&item, now, None))
    }

    /// Batch create: everything is validated up front and the insert is one
    /// transaction, so a bad entry rejects the whole batch.
    pub async fn create_batch(
        &self,
        requests: Vec<CreateItemRequest>,
    ) -> Result<BatchOutcome, ApiError> {
        if requests.len() > MAX_BATCH_SIZE {
            return Err(ApiError::validation(format!(
                "Batch size exceeds maximum of {MAX_BATCH_SIZE} items"
            )));
        }

        let now = now_ms();
        let validated: Vec<ValidatedCreate> = requests
            .iter()
            .map(|request| validate_create(request, now))
            .collect::<Result<_, _>>()?;

        let new_items: Vec<NewItem> = validated
            .into_iter()
            .map(|v| self.encrypt_to_new_item(v, now))
            .collect::<Result<_, _>>()?;

        let ids: Vec<String> = new_items.iter().map(|i| i.id.clone()).collect();
        let count = db::run(&self.pool, move |conn| Item::create_batch(conn, new_items)).await?;

        Ok(BatchOutcome { count, ids })
    }

    fn encrypt_to_new_item(
        &self,
        validated: ValidatedCreate,
        now: i64,
    ) -> Result<NewItem, ApiError> {
        let chain = self.beacon.chain_info();
        let round = chain.round_for_time(validated.unlock_at);

        let ciphertext = tle::encrypt_layer(&validated.payload, round, chain)
            .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?;

        Ok(NewItem {
            id: Uuid::new_v4().to_string(),
            kind: validated.kind.as_str().to_string(),
            ciphertext,
            original_name: validated.original_name,
            unlock_round: round as i64,
            unlock_at: validated.unlock_at,
            layer_count: 1,
            created_at: now,
            metadata: validated.metadata,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Read never mutates state. Before the unlock estimate the content is
    /// withheld; past it a full unwrap is attempted, and a beacon that lags
    /// the estimate simply yields the locked view again.
    pub async fn read(&self, id: &str) -> Result<ItemView, ApiError> {
        let item = self.fetch(id).await?;
        let now = now_ms();

        if !item.is_unlocked(now) {
            return Ok(self.view(&item, now, None));
        }

        match self.try_unwrap(&item).await? {
            Unwrapped::Plaintext(payload) => {
                let content = decode_content(&item, payload)?;
                Ok(self.view(&item, now, Some(content)))
            }
            Unwrapped::NotYetUnlockable { round } => {
                debug!(id = %item.id, round, "unlock estimate passed but round not yet produced");
                Ok(locked_fallback_view(&item))
            }
        }
    }

    // ------------------------------------------------------------------
    // Extend
    // ------------------------------------------------------------------

    /// Add one more time-lock layer. If the item is already unlockable the
    /// recovered plaintext is re-wrapped (keeping the content reachable no
    /// matter how often the lock is extended); a still-locked item gets its
    /// current ciphertext nested as-is. The commit is conditional on the
    /// `layer_count` observed here; losing that race yields `Conflict` and
    /// the caller decides whether to retry.
    pub async fn extend(&self, id: &str, minutes: i64) -> Result<ExtendOutcome, ApiError> {
        if minutes <= 0 {
            return Err(ApiError::validation("Minutes must be positive"));
        }

        let item = self.fetch(id).await?;
        let now = now_ms();
        let expected_layer_count = item.layer_count;

        let payload: Vec<u8> = if item.is_unlocked(now) {
            match self.try_unwrap(&item).await? {
                Unwrapped::Plaintext(plaintext) => plaintext,
                Unwrapped::NotYetUnlockable { round } => {
                    // The estimate was optimistic; treat as still locked and
                    // nest the existing ciphertext instead.
                    debug!(id = %item.id, round, "extend fell back to nested re-encryption");
                    item.ciphertext.clone().into_bytes()
                }
            }
        } else {
            item.ciphertext.clone().into_bytes()
        };

        // Extensions never move the unlock instant backwards.
        let new_unlock_at = now.max(item.unlock_at) + minutes * MINUTE_MS;
        let chain = self.beacon.chain_info();
        let new_round = chain.round_for_time(new_unlock_at);

        let new_ciphertext = tle::encrypt_layer(&payload, new_round, chain)
            .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?;

        let item_id = item.id.clone();
        let committed = db::run(&self.pool, move |conn| {
            Item::conditional_update_encryption(
                conn,
                &item_id,
                &new_ciphertext,
                new_round as i64,
                new_unlock_at,
                expected_layer_count,
                expected_layer_count + 1,
            )
        })
        .await?;

        if !committed {
            return Err(ApiError::Conflict);
        }

        Ok(ExtendOutcome {
            decrypt_at: new_unlock_at,
            layer_count: expected_layer_count + 1,
        })
    }

    // ------------------------------------------------------------------
    // Delete / list / stats
    // ------------------------------------------------------------------

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let id = id.to_string();
        let deleted = db::run(&self.pool, move |conn| Item::delete(conn, &id)).await?;

        if !deleted {
            return Err(ApiError::ItemNotFound);
        }
        Ok(())
    }

    pub async fn list(&self, query: ListQuery) -> Result<ListView, ApiError> {
        let kind = match query.kind.as_deref() {
            None => None,
            Some(s) => Some(
                ItemKind::parse(s)
                    .ok_or_else(|| ApiError::validation("type must be 'text' or 'image'"))?,
            ),
        };

        let status = query.status.as_deref().unwrap_or("all");
        if !matches!(status, "all" | "locked" | "unlocked") {
            return Err(ApiError::validation(
                "status must be 'all', 'locked' or 'unlocked'",
            ));
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit <= 0 || limit > MAX_PAGE_SIZE {
            return Err(ApiError::validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        let offset = query.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ApiError::validation("offset must not be negative"));
        }

        let sort = match query.sort.as_deref() {
            None => ItemSort::CreatedDesc,
            Some(s) => ItemSort::parse(s).ok_or_else(|| {
                ApiError::validation(
                    "sort must be one of created_asc, created_desc, decrypt_asc, decrypt_desc",
                )
            })?,
        };

        let all = db::run(&self.pool, move |conn| Item::list(conn, kind, sort)).await?;
        let now = now_ms();

        // Lock status is derived from the clock, so it is filtered here
        // rather than in SQL.
        let filtered: Vec<Item> = all
            .into_iter()
            .filter(|item| match status {
                "locked" => !item.is_unlocked(now),
                "unlocked" => item.is_unlocked(now),
                _ => true,
            })
            .collect();

        let total = filtered.len();
        let items = filtered
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|item| self.view(&item, now, None))
            .collect();

        Ok(ListView {
            items,
            total,
            limit,
            offset,
        })
    }

    pub async fn stats(&self) -> Result<StatsView, ApiError> {
        let all = db::run(&self.pool, Item::load_all).await?;
        let now = now_ms();

        let total_items = all.len();
        let locked_items = all.iter().filter(|i| !i.is_unlocked(now)).count();
        let text = all.iter().filter(|i| i.kind == "text").count();

        let avg_lock_duration_minutes = if total_items > 0 {
            let total_ms: i64 = all.iter().map(|i| i.unlock_at - i.created_at).sum();
            ((total_ms as f64 / total_items as f64) / MINUTE_MS as f64).round() as i64
        } else {
            0
        };

        Ok(StatsView {
            total_items,
            locked_items,
            unlocked_items: total_items - locked_items,
            by_type: KindCounts {
                text,
                image: total_items - text,
            },
            avg_lock_duration_minutes,
            oldest_item: all.iter().map(|i| i.created_at).min(),
            newest_item: all.iter().map(|i| i.created_at).max(),
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn fetch(&self, id: &str) -> Result<Item, ApiError> {
        let id = id.to_string();
        db::run(&self.pool, move |conn| Item::find(conn, &id))
            .await?
            .ok_or(ApiError::ItemNotFound)
    }

    async fn try_unwrap(&self, item: &Item) -> Result<Unwrapped, ApiError> {
        crypto::unwrap_all(
            &item.ciphertext,
            item.layer_count as u32,
            self.beacon.as_ref(),
        )
        .await
        .map_err(|err| match err {
            UnwrapError::Beacon(BeaconError::Unreachable(detail)) => {
                ApiError::OracleUnavailable(detail)
            }
            UnwrapError::Beacon(BeaconError::InvalidResponse(detail)) => {
                ApiError::Internal(anyhow::anyhow!("beacon returned invalid data: {detail}"))
            }
            UnwrapError::Cipher(cipher) => ApiError::DecryptionFailure(cipher),
            UnwrapError::NoLayers => {
                ApiError::Internal(anyhow::anyhow!("stored item has layer_count 0"))
            }
        })
    }

    fn view(&self, item: &Item, now: i64, content: Option<String>) -> ItemView {
        let unlocked = item.is_unlocked(now);
        ItemView {
            id: item.id.clone(),
            kind: item.kind.clone(),
            original_name: item.original_name.clone(),
            decrypt_at: item.unlock_at,
            created_at: item.created_at,
            layer_count: item.layer_count,
            unlocked,
            metadata: parse_metadata(item),
            content,
            time_remaining_ms: if unlocked {
                None
            } else {
                Some(item.unlock_at - now)
            },
        }
    }
}

/// Locked view used when the clock says "unlockable" but the beacon has not
/// produced the round yet: the estimate was optimistic, so report zero
/// remaining time rather than an error.
fn locked_fallback_view(item: &Item) -> ItemView {
    ItemView {
        id: item.id.clone(),
        kind: item.kind.clone(),
        original_name: item.original_name.clone(),
        decrypt_at: item.unlock_at,
        created_at: item.created_at,
        layer_count: item.layer_count,
        unlocked: false,
        metadata: parse_metadata(item),
        content: None,
        time_remaining_ms: Some(0),
    }
}

fn parse_metadata(item: &Item) -> Option<serde_json::Value> {
    let raw = item.metadata.as_deref()?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(id = %item.id, "stored metadata is not valid JSON: {err}");
            None
        }
    }
}

fn validate_create(request: &CreateItemRequest, now: i64) -> Result<ValidatedCreate, ApiError> {
    let kind = ItemKind::parse(&request.kind)
        .ok_or_else(|| ApiError::validation("type must be 'text' or 'image'"))?;

    if request.content.is_empty() {
        return Err(ApiError::validation("Content cannot be empty"));
    }

    let unlock_at = match (request.decrypt_at, request.duration_minutes) {
        (Some(decrypt_at), _) => {
            if decrypt_at <= now {
                return Err(ApiError::invalid_time("decryptAt must be in the future"));
            }
            decrypt_at
        }
        (None, Some(minutes)) => {
            if minutes <= 0 {
                return Err(ApiError::validation("Duration must be positive"));
            }
            now + minutes * MINUTE_MS
        }
        (None, None) => {
            return Err(ApiError::validation(
                "Either durationMinutes or decryptAt must be provided",
            ))
        }
    };

    let payload = match kind {
        ItemKind::Text => request.content.clone().into_bytes(),
        ItemKind::Image => base64::engine::general_purpose::STANDARD
            .decode(&request.content)
            .map_err(|_| ApiError::invalid_content("Image content must be base64 encoded"))?,
    };

    let metadata = match &request.metadata {
        None => None,
        Some(value) => {
            if !value.is_object() {
                return Err(ApiError::validation("metadata must be a JSON object"));
            }
            Some(
                serde_json::to_string(value)
                    .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?,
            )
        }
    };

    Ok(ValidatedCreate {
        kind,
        payload,
        unlock_at,
        original_name: match kind {
            ItemKind::Image => Some("image.png".to_string()),
            ItemKind::Text => None,
        },
        metadata,
    })
}

fn decode_content(item: &Item, payload: Vec<u8>) -> Result<String, ApiError> {
    match item.parsed_kind() {
        Some(ItemKind::Text) => String::from_utf8(payload).map_err(|_| {
            ApiError::DecryptionFailure(CipherError::Malformed(
                "decrypted text is not valid UTF-8".to_string(),
            ))
        }),
        Some(ItemKind::Image) => {
            Ok(base64::engine::general_purpose::STANDARD.encode(payload))
        }
        None => Err(ApiError::Internal(anyhow::anyhow!(
            "stored item has unknown kind '{}'",
            item.kind
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_request(content: &str) -> CreateItemRequest {
        CreateItemRequest {
            kind: "text".to_string(),
            content: content.to_string(),
            duration_minutes: Some(60),
            decrypt_at: None,
            metadata: None,
        }
    }

    #[test]
    fn create_validation_boundaries() {
        let now = 1_000_000;

        assert!(validate_create(&text_request("hello"), now).is_ok());

        let empty = text_request("");
        assert!(matches!(
            validate_create(&empty, now),
            Err(ApiError::Validation { .. })
        ));

        let mut past = text_request("x");
        past.decrypt_at = Some(now);
        past.duration_minutes = None;
        assert!(matches!(
            validate_create(&past, now),
            Err(ApiError::Validation { code: "INVALID_TIME", .. })
        ));

        let mut neither = text_request("x");
        neither.duration_minutes = None;
        assert!(validate_create(&neither, now).is_err());

        let mut bad_kind = text_request("x");
        bad_kind.kind = "video".to_string();
        assert!(validate_create(&bad_kind, now).is_err());

        let mut bad_image = text_request("not!!base64%%");
        bad_image.kind = "image".to_string();
        assert!(matches!(
            validate_create(&bad_image, now),
            Err(ApiError::Validation { code: "INVALID_CONTENT", .. })
        ));
    }

    #[test]
    fn duration_resolves_relative_to_now() {
        let now = 500_000;
        let validated = validate_create(&text_request("hello"), now).unwrap();
        assert_eq!(validated.unlock_at, now + 60 * MINUTE_MS);
        assert_eq!(validated.kind, ItemKind::Text);
        assert!(validated.original_name.is_none());
    }

    #[test]
    fn image_gets_a_display_name() {
        let mut request = text_request(&base64::engine::general_purpose::STANDARD.encode(b"png"));
        request.kind = "image".to_string();

        let validated = validate_create(&request, 1_000).unwrap();
        assert_eq!(validated.payload, b"png");
        assert_eq!(validated.original_name.as_deref(), Some("image.png"));
    }
}
