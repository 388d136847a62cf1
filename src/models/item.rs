//! Item model and store operations.
//!
//! An item is one unit of time-lock-encrypted content. Everything except the
//! encryption tuple (`ciphertext`, `unlock_round`, `unlock_at`, `layer_count`)
//! is immutable after creation, and that tuple is only ever replaced as a
//! whole by [`Item::conditional_update_encryption`].

use anyhow::{Context, Result};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::items;

/// Content kind. The cipher layers never look at this; it only matters at the
/// boundary where bytes are decoded back into a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Image,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Text => "text",
            ItemKind::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ItemKind::Text),
            "image" => Some(ItemKind::Image),
            _ => None,
        }
    }
}

/// Column order must match schema.rs exactly (Queryable maps by position).
#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = items)]
pub struct Item {
    pub id: String,
    pub kind: String,
    pub ciphertext: String,
    pub original_name: Option<String>,
    pub unlock_round: i64,
    pub unlock_at: i64,
    pub layer_count: i32,
    pub created_at: i64,
    pub metadata: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = items)]
pub struct NewItem {
    pub id: String,
    pub kind: String,
    pub ciphertext: String,
    pub original_name: Option<String>,
    pub unlock_round: i64,
    pub unlock_at: i64,
    pub layer_count: i32,
    pub created_at: i64,
    pub metadata: Option<String>,
}

/// Sort order for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSort {
    CreatedAsc,
    CreatedDesc,
    UnlockAsc,
    UnlockDesc,
}

impl ItemSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created_asc" => Some(ItemSort::CreatedAsc),
            "created_desc" => Some(ItemSort::CreatedDesc),
            "decrypt_asc" => Some(ItemSort::UnlockAsc),
            "decrypt_desc" => Some(ItemSort::UnlockDesc),
            _ => None,
        }
    }
}

impl Item {
    pub fn create(conn: &mut SqliteConnection, new_item: NewItem) -> Result<Item> {
        let item_id = new_item.id.clone();

        diesel::insert_into(items::table)
            .values(&new_item)
            .execute(conn)
            .context("Failed to insert item")?;

        items::table
            .filter(items::id.eq(item_id))
            .first(conn)
            .context("Failed to load inserted item")
    }

    /// Insert a whole batch inside one transaction, all-or-nothing.
    pub fn create_batch(conn: &mut SqliteConnection, new_items: Vec<NewItem>) -> Result<usize> {
        conn.transaction(|conn| {
            diesel::insert_into(items::table)
                .values(&new_items)
                .execute(conn)
        })
        .context("Failed to insert item batch")
    }

    pub fn find(conn: &mut SqliteConnection, item_id: &str) -> Result<Option<Item>> {
        items::table
            .filter(items::id.eq(item_id))
            .first(conn)
            .optional()
            .context("Failed to query item")
    }

    /// Replace the encryption tuple, conditioned on `layer_count` still being
    /// what the caller observed. Returns false when the guard misses, which
    /// means a concurrent extend won the race.
    pub fn conditional_update_encryption(
        conn: &mut SqliteConnection,
        item_id: &str,
        new_ciphertext: &str,
        new_unlock_round: i64,
        new_unlock_at: i64,
        expected_layer_count: i32,
        new_layer_count: i32,
    ) -> Result<bool> {
        let updated = diesel::update(
            items::table
                .filter(items::id.eq(item_id))
                .filter(items::layer_count.eq(expected_layer_count)),
        )
        .set((
            items::ciphertext.eq(new_ciphertext),
            items::unlock_round.eq(new_unlock_round),
            items::unlock_at.eq(new_unlock_at),
            items::layer_count.eq(new_layer_count),
        ))
        .execute(conn)
        .context("Failed to update item encryption")?;

        Ok(updated == 1)
    }

    /// Returns false when the item was already absent.
    pub fn delete(conn: &mut SqliteConnection, item_id: &str) -> Result<bool> {
        let deleted = diesel::delete(items::table.filter(items::id.eq(item_id)))
            .execute(conn)
            .context("Failed to delete item")?;

        Ok(deleted == 1)
    }

    /// Load items, kind-filtered in SQL and ordered. Lock-status filtering is
    /// time-derived and happens in the caller.
    pub fn list(
        conn: &mut SqliteConnection,
        kind: Option<ItemKind>,
        sort: ItemSort,
    ) -> Result<Vec<Item>> {
        let mut query = items::table.into_boxed();

        if let Some(kind) = kind {
            query = query.filter(items::kind.eq(kind.as_str()));
        }

        query = match sort {
            ItemSort::CreatedAsc => query.order(items::created_at.asc()),
            ItemSort::CreatedDesc => query.order(items::created_at.desc()),
            ItemSort::UnlockAsc => query.order(items::unlock_at.asc()),
            ItemSort::UnlockDesc => query.order(items::unlock_at.desc()),
        };

        query.load(conn).context("Failed to list items")
    }

    pub fn load_all(conn: &mut SqliteConnection) -> Result<Vec<Item>> {
        items::table.load(conn).context("Failed to load items")
    }

    pub fn is_unlocked(&self, now_ms: i64) -> bool {
        self.unlock_at <= now_ms
    }

    pub fn parsed_kind(&self) -> Option<ItemKind> {
        ItemKind::parse(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    fn test_conn() -> (TempDir, db::DbPool) {
        let dir = TempDir::new().unwrap();
        let pool = db::create_pool(dir.path().join("items.db").to_str().unwrap()).unwrap();
        db::init_schema(&mut pool.get().unwrap()).unwrap();
        (dir, pool)
    }

    fn sample_item(id: &str) -> NewItem {
        NewItem {
            id: id.to_string(),
            kind: "text".to_string(),
            ciphertext: "opaque".to_string(),
            original_name: None,
            unlock_round: 100,
            unlock_at: 1_700_000_000_000,
            layer_count: 1,
            created_at: 1_690_000_000_000,
            metadata: None,
        }
    }

    #[test]
    fn create_and_find_round_trip() {
        let (_dir, pool) = test_conn();
        let mut conn = pool.get().unwrap();

        let created = Item::create(&mut conn, sample_item("a")).unwrap();
        assert_eq!(created.layer_count, 1);

        let found = Item::find(&mut conn, "a").unwrap().unwrap();
        assert_eq!(found.ciphertext, "opaque");
        assert!(Item::find(&mut conn, "missing").unwrap().is_none());
    }

    #[test]
    fn conditional_update_detects_stale_layer_count() {
        let (_dir, pool) = test_conn();
        let mut conn = pool.get().unwrap();
        Item::create(&mut conn, sample_item("a")).unwrap();

        // First writer observed layer_count 1 and wins.
        let won =
            Item::conditional_update_encryption(&mut conn, "a", "ct2", 200, 2_000, 1, 2).unwrap();
        assert!(won);

        // Second writer also observed 1; its guard now misses.
        let lost =
            Item::conditional_update_encryption(&mut conn, "a", "ct3", 300, 3_000, 1, 2).unwrap();
        assert!(!lost);

        // Exactly one increment happened.
        let item = Item::find(&mut conn, "a").unwrap().unwrap();
        assert_eq!(item.layer_count, 2);
        assert_eq!(item.ciphertext, "ct2");
        assert_eq!(item.unlock_round, 200);
    }

    #[test]
    fn delete_reports_missing() {
        let (_dir, pool) = test_conn();
        let mut conn = pool.get().unwrap();
        Item::create(&mut conn, sample_item("a")).unwrap();

        assert!(Item::delete(&mut conn, "a").unwrap());
        assert!(!Item::delete(&mut conn, "a").unwrap());
    }

    #[test]
    fn list_filters_kind_and_sorts() {
        let (_dir, pool) = test_conn();
        let mut conn = pool.get().unwrap();

        let mut a = sample_item("a");
        a.created_at = 10;
        let mut b = sample_item("b");
        b.created_at = 20;
        b.kind = "image".to_string();
        Item::create(&mut conn, a).unwrap();
        Item::create(&mut conn, b).unwrap();

        let all = Item::list(&mut conn, None, ItemSort::CreatedDesc).unwrap();
        assert_eq!(all.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), ["b", "a"]);

        let images = Item::list(&mut conn, Some(ItemKind::Image), ItemSort::CreatedAsc).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id, "b");
    }
}
