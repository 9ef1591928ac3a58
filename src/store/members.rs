use anyhow::{Context, Result};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::{now_rfc3339, Store};

/// A known contact with an optional phone number. Created out-of-band by
/// member management; conversation resolution only reads these rows.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

impl Member {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

impl Store {
    #[allow(dead_code)]
    pub async fn insert_member(
        &self,
        first_name: &str,
        last_name: &str,
        phone: Option<&str>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO members (id, first_name, last_name, phone, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![&id, first_name, last_name, phone, now_rfc3339()],
        )
        .context("Failed to insert member")?;
        Ok(id)
    }

    /// Exact-string phone lookup. Returns the first match when several
    /// members share a number.
    pub async fn member_by_phone(&self, phone: &str) -> Result<Option<Member>> {
        let conn = self.conn.lock().await;
        let member = conn
            .query_row(
                "SELECT id, first_name, last_name, phone FROM members
                 WHERE phone = ?1 LIMIT 1",
                rusqlite::params![phone],
                parse_member_row,
            )
            .optional()
            .context("Failed to look up member by phone")?;
        Ok(member)
    }

    /// All members with a phone on file, for the digit-equality scan
    /// fallback. Stored numbers follow no single format, so this is the
    /// only lookup that works on dirty data.
    pub async fn members_with_phone(&self) -> Result<Vec<Member>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, first_name, last_name, phone FROM members
             WHERE phone IS NOT NULL",
        )?;

        let members = stmt
            .query_map([], parse_member_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list members with phone")?;

        Ok(members)
    }

    #[allow(dead_code)]
    pub async fn insert_group(&self, name: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO groups (id, name, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![&id, name, now_rfc3339()],
        )
        .context("Failed to insert group")?;
        Ok(id)
    }

    #[allow(dead_code)]
    pub async fn add_group_member(&self, group_id: &str, member_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO group_members (group_id, member_id) VALUES (?1, ?2)",
            rusqlite::params![group_id, member_id],
        )
        .context("Failed to add group member")?;
        Ok(())
    }
}

fn parse_member_row(row: &rusqlite::Row) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        phone: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_member_by_phone_exact() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_member("Ada", "Lovelace", Some("555-123-4567"))
            .await
            .unwrap();

        let found = store.member_by_phone("555-123-4567").await.unwrap();
        assert_eq!(found.unwrap().display_name(), "Ada Lovelace");

        let missing = store.member_by_phone("5551234567").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_members_with_phone_skips_phoneless() {
        let store = Store::open_in_memory().unwrap();
        store.insert_member("No", "Phone", None).await.unwrap();
        store
            .insert_member("Has", "Phone", Some("(555) 111-2222"))
            .await
            .unwrap();

        let members = store.members_with_phone().await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].first_name, "Has");
    }
}
