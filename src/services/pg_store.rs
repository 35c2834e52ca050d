use crate::schema::ScheduledMessage;
use crate::services::store::{MessageStore, MessageUpdate, StoreError};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl MessageStore for PgMessageStore {
    async fn claim_due(&self, max_batch: i64) -> Result<Vec<ScheduledMessage>, StoreError> {
        // the procedure selects due, active, pending rows FOR UPDATE SKIP LOCKED
        // and flips them to 'processing' before returning them
        let rows = sqlx::query_as::<_, ScheduledMessage>(
            "SELECT * FROM claim_due_scheduled_messages($1::int)",
        )
        .bind(max_batch)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update(&self, id: Uuid, update: &MessageUpdate) -> Result<(), StoreError> {
        match update {
            MessageUpdate::Sent {
                provider_message_id,
                sent_at,
            } => {
                sqlx::query(
                    r#"
                    UPDATE scheduled_messages
                    SET status = 'sent', sent_at = $2, provider_message_id = $3, last_error = NULL
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(sent_at)
                .bind(provider_message_id.as_deref())
                .execute(&self.pool)
                .await?;
            }
            MessageUpdate::Attempted {
                status,
                attempts,
                last_error,
            } => {
                sqlx::query(
                    r#"
                    UPDATE scheduled_messages
                    SET status = $2, attempts = $3, last_error = $4
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(status.as_str())
                .bind(attempts)
                .bind(last_error)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MessageStatus;
    use chrono::{DateTime, Utc};
    use sqlx::postgres::PgConnectOptions;
    use std::str::FromStr;

    const SCHEMA_SQL: &str = r#"
        CREATE TABLE scheduled_messages (
            id uuid PRIMARY KEY,
            to_phone text,
            contact_name text,
            message text NOT NULL,
            status text NOT NULL DEFAULT 'pending',
            attempts integer NOT NULL DEFAULT 0,
            last_error text,
            provider_message_id text,
            sent_at timestamptz,
            scheduled_at timestamptz NOT NULL DEFAULT now(),
            is_active boolean NOT NULL DEFAULT true
        );

        CREATE FUNCTION claim_due_scheduled_messages(p_limit integer)
        RETURNS SETOF scheduled_messages
        LANGUAGE sql AS $$
            WITH claimed AS (
                UPDATE scheduled_messages m
                SET status = 'processing'
                FROM (
                    SELECT id FROM scheduled_messages
                    WHERE status = 'pending' AND is_active AND scheduled_at <= now()
                    ORDER BY scheduled_at, id
                    LIMIT p_limit
                    FOR UPDATE SKIP LOCKED
                ) due
                WHERE m.id = due.id
                RETURNING m.*
            )
            SELECT * FROM claimed ORDER BY scheduled_at, id
        $$;
    "#;

    /// A throwaway schema on the server named by `TEST_DATABASE_URL`.
    struct TestDb {
        store: PgMessageStore,
        admin: PgPool,
        schema: String,
    }

    impl TestDb {
        async fn isolated() -> Option<Self> {
            let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
                eprintln!("TEST_DATABASE_URL not set, skipping postgres store test");
                return None;
            };
            let admin = PgPoolOptions::new()
                .max_connections(1)
                .connect(&url)
                .await
                .unwrap();
            let schema = format!("dispatch_{}", Uuid::new_v4().simple());
            sqlx::raw_sql(&format!("CREATE SCHEMA {schema}"))
                .execute(&admin)
                .await
                .unwrap();

            let options = PgConnectOptions::from_str(&url)
                .unwrap()
                .options([("search_path", schema.as_str())]);
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .connect_with(options)
                .await
                .unwrap();
            sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await.unwrap();

            Some(Self {
                store: PgMessageStore::new(pool),
                admin,
                schema,
            })
        }

        async fn run_sql(&self, sql: &str) {
            sqlx::raw_sql(sql).execute(&self.store.pool).await.unwrap();
        }

        async fn insert(&self, phone: &str, scheduled_at: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.run_sql(&format!(
                "INSERT INTO scheduled_messages (id, to_phone, message, scheduled_at) \
                 VALUES ('{id}', '{phone}', 'hello {{name}}', {scheduled_at})"
            ))
            .await;
            id
        }

        async fn fetch(&self, id: Uuid) -> ScheduledMessage {
            sqlx::query_as::<_, ScheduledMessage>("SELECT * FROM scheduled_messages WHERE id = $1")
                .bind(id)
                .fetch_one(&self.store.pool)
                .await
                .unwrap()
        }

        async fn cleanup(self) {
            self.store.pool.close().await;
            sqlx::raw_sql(&format!("DROP SCHEMA {} CASCADE", self.schema))
                .execute(&self.admin)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn claim_returns_due_pending_rows_in_schedule_order() {
        let Some(db) = TestDb::isolated().await else {
            return;
        };
        let later = db.insert("0501111111", "now() - interval '1 minute'").await;
        let earlier = db.insert("0502222222", "now() - interval '1 hour'").await;
        db.insert("0503333333", "now() + interval '1 hour'").await;
        let inactive = db.insert("0504444444", "now() - interval '2 hours'").await;
        db.run_sql(&format!(
            "UPDATE scheduled_messages SET is_active = false WHERE id = '{inactive}'"
        ))
        .await;
        let sent = db.insert("0505555555", "now() - interval '2 hours'").await;
        db.run_sql(&format!(
            "UPDATE scheduled_messages SET status = 'sent' WHERE id = '{sent}'"
        ))
        .await;

        let claimed = db.store.claim_due(50).await.unwrap();

        let ids: Vec<Uuid> = claimed.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![earlier, later]);
        assert!(claimed.iter().all(|m| m.status == MessageStatus::Processing));
        assert_eq!(claimed[0].to_phone.as_deref(), Some("0502222222"));
        assert_eq!(db.fetch(later).await.status, MessageStatus::Processing);
        assert!(db.store.claim_due(50).await.unwrap().is_empty());

        db.cleanup().await;
    }

    #[tokio::test]
    async fn claim_respects_batch_limit() {
        let Some(db) = TestDb::isolated().await else {
            return;
        };
        let first = db.insert("0501111111", "now() - interval '3 minutes'").await;
        let second = db.insert("0502222222", "now() - interval '2 minutes'").await;

        let claimed = db.store.claim_due(1).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, first);
        assert_eq!(db.fetch(second).await.status, MessageStatus::Pending);

        db.cleanup().await;
    }

    #[tokio::test]
    async fn sent_update_records_receipt_and_clears_error() {
        let Some(db) = TestDb::isolated().await else {
            return;
        };
        let id = db.insert("0501111111", "now()").await;
        db.run_sql(&format!(
            "UPDATE scheduled_messages SET status = 'processing', attempts = 2, \
             last_error = 'timed out' WHERE id = '{id}'"
        ))
        .await;
        let sent_at: DateTime<Utc> = DateTime::from_timestamp(1_767_600_000, 0).unwrap();

        db.store
            .update(
                id,
                &MessageUpdate::Sent {
                    provider_message_id: Some("BAE5F4C1".to_string()),
                    sent_at,
                },
            )
            .await
            .unwrap();

        let row = db.fetch(id).await;
        assert_eq!(row.status, MessageStatus::Sent);
        assert_eq!(row.sent_at, Some(sent_at));
        assert_eq!(row.provider_message_id.as_deref(), Some("BAE5F4C1"));
        assert_eq!(row.last_error, None);
        assert_eq!(row.attempts, 2);

        db.cleanup().await;
    }

    #[tokio::test]
    async fn attempted_update_writes_status_attempts_and_error() {
        let Some(db) = TestDb::isolated().await else {
            return;
        };
        let id = db.insert("0501111111", "now()").await;

        db.store
            .update(
                id,
                &MessageUpdate::Attempted {
                    status: MessageStatus::Failed,
                    attempts: 5,
                    last_error: "provider returned 502".to_string(),
                },
            )
            .await
            .unwrap();

        let row = db.fetch(id).await;
        assert_eq!(row.status, MessageStatus::Failed);
        assert_eq!(row.attempts, 5);
        assert_eq!(row.last_error.as_deref(), Some("provider returned 502"));
        assert_eq!(row.sent_at, None);

        db.cleanup().await;
    }
}
