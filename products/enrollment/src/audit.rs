use async_trait::async_trait;
use chrono::Utc;
use entity::audit_log::{self, Action, Severity};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

/// One structured record of something that happened to a business entity.
#[derive(Clone, Debug)]
pub struct AuditEntry {
    pub action: Action,
    pub description: String,
    pub entity_type: &'static str,
    pub entity_id: Option<Uuid>,
    pub severity: Severity,
    pub metadata: Value,
    pub actor_id: Option<Uuid>,
}

impl AuditEntry {
    pub fn new(
        action: Action,
        entity_type: &'static str,
        entity_id: Option<Uuid>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action,
            description: description.into(),
            entity_type,
            entity_id,
            severity: Severity::Info,
            metadata: json!({}),
            actor_id: None,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }
}

/// Receives audit entries after the work they describe has committed.
/// Implementations must not fail the caller.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

pub struct DbAuditSink {
    db: Arc<DatabaseConnection>,
}

impl DbAuditSink {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for DbAuditSink {
    async fn record(&self, entry: AuditEntry) {
        if entry.severity == Severity::Critical {
            tracing::error!(
                action = ?entry.action,
                entity_id = ?entry.entity_id,
                "{}",
                entry.description
            );
        }
        let action = entry.action;
        if let Err(err) = insert_entry(self.db.as_ref(), entry).await {
            tracing::warn!(error = %err, ?action, "failed to write audit entry");
        }
    }
}

async fn insert_entry<C: ConnectionTrait>(db: &C, entry: AuditEntry) -> Result<(), DbErr> {
    let row = audit_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        action: Set(entry.action),
        description: Set(entry.description),
        entity_type: Set(entry.entity_type.to_string()),
        entity_id: Set(entry.entity_id),
        severity: Set(entry.severity),
        metadata: Set(entry.metadata),
        actor_id: Set(entry.actor_id),
        created_at: Set(Utc::now().into()),
    };
    audit_log::Entity::insert(row)
        .exec_without_returning(db)
        .await
        .map(|_| ())
}

/// Newest entries first, optionally narrowed to one entity.
pub async fn recent_entries<C: ConnectionTrait>(
    db: &C,
    entity_id: Option<Uuid>,
    limit: u64,
) -> Result<Vec<audit_log::Model>, DbErr> {
    let mut query = audit_log::Entity::find();
    if let Some(entity_id) = entity_id {
        query = query.filter(audit_log::Column::EntityId.eq(entity_id));
    }
    query
        .order_by_desc(audit_log::Column::CreatedAt)
        .limit(limit)
        .all(db)
        .await
}
