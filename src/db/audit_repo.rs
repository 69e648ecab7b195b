// src/db/audit_repo.rs

use sqlx::{PgPool, Postgres, Executor};
use uuid::Uuid;
use crate::{common::error::AppError, models::audit::AuditLog};

#[derive(Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Grava uma entrada de auditoria. Sempre chamado dentro da mesma
    /// transação da mutação que descreve; falha aqui desfaz tudo.
    pub async fn insert<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        entity: &str,
        entity_id: Uuid,
        action: &str,
        actor_id: Uuid,
        detail: Option<serde_json::Value>,
    ) -> Result<AuditLog, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (clinic_id, entity, entity_id, action, actor_id, detail)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(clinic_id)
        .bind(entity)
        .bind(entity_id)
        .bind(action)
        .bind(actor_id)
        .bind(detail)
        .fetch_one(executor)
        .await?;

        Ok(entry)
    }

    pub async fn list_for_entity<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        entity: &str,
        entity_id: Uuid,
    ) -> Result<Vec<AuditLog>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entries = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE clinic_id = $1 AND entity = $2 AND entity_id = $3
            ORDER BY created_at ASC
            "#,
        )
        .bind(clinic_id)
        .bind(entity)
        .bind(entity_id)
        .fetch_all(executor)
        .await?;

        Ok(entries)
    }
}
