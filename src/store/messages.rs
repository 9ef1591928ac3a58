use anyhow::{Context, Result};
use uuid::Uuid;

use super::conversations::ConversationRef;
use super::{now_rfc3339, Store};

/// Fields for one inbound or outbound message row. Numbers are stored
/// exactly as the provider sent them.
#[derive(Debug)]
pub struct NewMessage<'a> {
    pub provider_sid: &'a str,
    pub direction: &'a str,
    pub from_number: &'a str,
    pub to_number: &'a str,
    pub body: &'a str,
    pub status: &'a str,
    pub member_id: Option<&'a str>,
    pub conversation_id: Option<&'a str>,
    pub delivered_at: &'a str,
}

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct MessageRecord {
    pub id: String,
    pub provider_sid: String,
    pub direction: String,
    pub from_number: String,
    pub to_number: String,
    pub body: String,
    pub status: String,
    pub member_id: Option<String>,
    pub conversation_id: Option<String>,
    pub delivered_at: Option<String>,
}

/// One row of the bounded recent-history window used by the digits
/// fallback: conversation id, raw from/to numbers, conversation created_at.
pub type RecentNumbers = (String, String, String, String);

impl Store {
    pub async fn insert_message(&self, message: &NewMessage<'_>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO messages
             (id, provider_sid, direction, from_number, to_number, body,
              status, member_id, conversation_id, delivered_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                &id,
                message.provider_sid,
                message.direction,
                message.from_number,
                message.to_number,
                message.body,
                message.status,
                message.member_id,
                message.conversation_id,
                message.delivered_at,
                now_rfc3339(),
            ],
        )
        .context("Failed to insert message")?;
        Ok(id)
    }

    /// All messages in a conversation, oldest first.
    #[allow(dead_code)]
    pub async fn messages_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, provider_sid, direction, from_number, to_number, body,
                    status, member_id, conversation_id, delivered_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC",
        )?;

        let messages = stmt
            .query_map(rusqlite::params![conversation_id], parse_message_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to load messages")?;

        Ok(messages)
    }

    /// Distinct conversations that have a message whose sender or recipient
    /// number equals one of the three normalized forms, exact-string.
    pub async fn conversations_by_exact_number(
        &self,
        forms: [&str; 3],
    ) -> Result<Vec<ConversationRef>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT c.id, c.created_at
             FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE m.from_number IN (?1, ?2, ?3)
                OR m.to_number IN (?1, ?2, ?3)",
        )?;

        let refs = stmt
            .query_map(rusqlite::params![forms[0], forms[1], forms[2]], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to search message history by number")?;

        Ok(refs)
    }

    /// The most recent messages that belong to a conversation, newest
    /// first, capped. Number comparison happens in the caller.
    pub async fn recent_message_numbers(&self, limit: u32) -> Result<Vec<RecentNumbers>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT m.conversation_id, m.from_number, m.to_number, c.created_at
             FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             ORDER BY m.created_at DESC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![limit], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to scan recent message history")?;

        Ok(rows)
    }
}

fn parse_message_row(row: &rusqlite::Row) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        provider_sid: row.get(1)?,
        direction: row.get(2)?,
        from_number: row.get(3)?,
        to_number: row.get(4)?,
        body: row.get(5)?,
        status: row.get(6)?,
        member_id: row.get(7)?,
        conversation_id: row.get(8)?,
        delivered_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound<'a>(sid: &'a str, conversation_id: Option<&'a str>, now: &'a str) -> NewMessage<'a> {
        NewMessage {
            provider_sid: sid,
            direction: "inbound",
            from_number: "+15551234567",
            to_number: "+15559990000",
            body: "hello",
            status: "delivered",
            member_id: None,
            conversation_id,
            delivered_at: now,
        }
    }

    #[tokio::test]
    async fn test_raw_numbers_preserved() {
        let store = Store::open_in_memory().unwrap();
        let conv = store
            .insert_conversation("t", "general", None)
            .await
            .unwrap();
        let now = now_rfc3339();
        store
            .insert_message(&inbound("SM1", Some(&conv), &now))
            .await
            .unwrap();

        let messages = store.messages_for_conversation(&conv).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].from_number, "+15551234567");
        assert_eq!(messages[0].status, "delivered");
        assert_eq!(messages[0].delivered_at.as_deref(), Some(now.as_str()));
    }

    #[tokio::test]
    async fn test_duplicate_provider_sid_yields_two_rows() {
        // Documented current behavior: no uniqueness constraint on the
        // provider sid, so a redelivered webhook appends a second row.
        let store = Store::open_in_memory().unwrap();
        let conv = store
            .insert_conversation("t", "general", None)
            .await
            .unwrap();
        let now = now_rfc3339();
        store
            .insert_message(&inbound("SM1", Some(&conv), &now))
            .await
            .unwrap();
        store
            .insert_message(&inbound("SM1", Some(&conv), &now))
            .await
            .unwrap();

        let messages = store.messages_for_conversation(&conv).await.unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn test_exact_number_search_finds_distinct_conversations() {
        let store = Store::open_in_memory().unwrap();
        let conv = store
            .insert_conversation("t", "general", None)
            .await
            .unwrap();
        let now = now_rfc3339();
        // Two outbound messages to the same formatted number, one conversation
        for sid in ["SM1", "SM2"] {
            store
                .insert_message(&NewMessage {
                    provider_sid: sid,
                    direction: "outbound",
                    from_number: "+15559990000",
                    to_number: "555-123-4567",
                    body: "hi",
                    status: "sent",
                    member_id: None,
                    conversation_id: Some(&conv),
                    delivered_at: &now,
                })
                .await
                .unwrap();
        }

        let refs = store
            .conversations_by_exact_number(["555-123-4567", "15551234567", "5551234567"])
            .await
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].0, conv);
    }

    #[tokio::test]
    async fn test_recent_window_skips_orphan_messages() {
        let store = Store::open_in_memory().unwrap();
        let now = now_rfc3339();
        // No conversation reference: excluded from the fallback scan
        store.insert_message(&inbound("SM1", None, &now)).await.unwrap();

        let rows = store.recent_message_numbers(200).await.unwrap();
        assert!(rows.is_empty());
    }
}
