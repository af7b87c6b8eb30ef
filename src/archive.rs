//! Archive sink for message metadata, written strictly before deletion.

use crate::error::Result;
use crate::models::MessageRecord;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;

/// Where a page's records go before the delete batch is issued. Kept as a
/// trait so the pipeline can be driven against a recording sink in tests.
#[async_trait]
pub trait ArchiveSink {
    async fn append_records(&self, account: &str, records: &[MessageRecord]) -> Result<()>;
}

pub struct SqliteArchive {
    pool: SqlitePool,
}

impl SqliteArchive {
    pub async fn new(database_url: &str) -> Result<Self> {
        use sqlx::sqlite::SqliteConnectOptions;
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let schema = include_str!("../schema.sql");
        for statement in schema.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveSink for SqliteArchive {
    async fn append_records(&self, account: &str, records: &[MessageRecord]) -> Result<()> {
        let archived_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        for record in records {
            sqlx::query(
                "INSERT INTO archived_messages \
                 (account, original_id, from_address, to_addresses, subject, received_at, body, archived_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(account)
            .bind(&record.original_id)
            .bind(&record.from)
            .bind(record.to.join(", "))
            .bind(&record.subject)
            .bind(&record.received_at)
            .bind(&record.body)
            .bind(&archived_at)
            .execute(&self.pool)
            .await?;
        }
        tracing::debug!(account, count = records.len(), "archived page");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MoveState;
    use sqlx::Row;

    fn record(id: &str) -> MessageRecord {
        MessageRecord {
            original_id: id.into(),
            from: "sender@x.com".into(),
            to: vec!["a@x.com".into(), "b@x.com".into()],
            subject: "old mail".into(),
            received_at: "2026-06-01T08:00:00Z".into(),
            body: "body text".into(),
            state: MoveState::Fetched,
        }
    }

    #[tokio::test]
    async fn appends_rows_for_each_record() {
        let archive = SqliteArchive::new("sqlite::memory:").await.unwrap();
        archive.run_migrations().await.unwrap();

        archive
            .append_records("a@x.com", &[record("m1"), record("m2")])
            .await
            .unwrap();
        archive.append_records("b@x.com", &[record("m3")]).await.unwrap();

        let rows = sqlx::query(
            "SELECT original_id, to_addresses FROM archived_messages WHERE account = ? ORDER BY original_id",
        )
        .bind("a@x.com")
        .fetch_all(&archive.pool)
        .await
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get::<String, _>(0), "m1");
        assert_eq!(rows[0].get::<String, _>(1), "a@x.com, b@x.com");
    }
}
