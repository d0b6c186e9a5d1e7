use super::{Bound, DataSources, PgTx, db_span, expect_row};
use crate::{
    model::OutboxEvent,
    repo::{OutboxRepository, RepoError},
};
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgOutboxRepository {
    bound: Bound,
}

impl PgOutboxRepository {
    #[must_use]
    pub fn new(sources: &DataSources) -> Self {
        Self {
            bound: Bound::new(sources),
        }
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    type Tx = PgTx;

    fn with_tx(&self, tx: &PgTx) -> Self {
        Self {
            bound: self.bound.with_tx(tx),
        }
    }

    async fn create(&self, event: &OutboxEvent) -> Result<(), RepoError> {
        const QUERY: &str = r"
            INSERT INTO outbox_events (
                id, aggregate_type, aggregate_id, event_type, payload, trace_context, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        self.bound
            .writer()
            .execute(
                db_span("INSERT", QUERY),
                sqlx::query(QUERY)
                    .bind(event.id)
                    .bind(&event.aggregate_type)
                    .bind(&event.aggregate_id)
                    .bind(&event.event_type)
                    .bind(&event.payload)
                    .bind(&event.trace_context)
                    .bind(event.created_at),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        const QUERY: &str = "DELETE FROM outbox_events WHERE id = $1";
        let rows = self
            .bound
            .writer()
            .execute(db_span("DELETE", QUERY), sqlx::query(QUERY).bind(id))
            .await?;
        expect_row(rows)
    }
}
