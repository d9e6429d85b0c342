use sqlx::PgPool;

/// Processed payment-provider events, keyed by the provider's event id
pub struct WebhookEventLog;

impl WebhookEventLog {
    /// Records an event id; returns false if it was already recorded
    pub async fn record(pool: &PgPool, event_id: &str, event_type: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Removes a record so a failed event can be redelivered
    pub async fn forget(pool: &PgPool, event_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM webhook_events WHERE id = $1")
            .bind(event_id)
            .execute(pool)
            .await?;

        Ok(())
    }
}
