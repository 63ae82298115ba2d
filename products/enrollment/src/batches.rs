use chrono::{NaiveDate, Utc};
use entity::audit_log::Action;
use entity::batch;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, QueryOrder};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    AuditEntry, Enrollment,
    error::{EnrollmentError, EnrollmentResult},
};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    pub name: String,
    #[serde(default)]
    pub level: Option<String>,
    pub total_seats: i32,
    #[serde(default)]
    pub starts_on: Option<NaiveDate>,
}

impl Enrollment {
    #[instrument(skip_all)]
    pub async fn create_batch(
        &self,
        input: NewBatch,
        actor: Option<Uuid>,
    ) -> EnrollmentResult<batch::Model> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(EnrollmentError::validation("name is required"));
        }
        if input.total_seats <= 0 {
            return Err(EnrollmentError::validation(
                "totalSeats must be greater than zero",
            ));
        }
        let now = Utc::now();
        let created = batch::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            level: Set(input
                .level
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())),
            total_seats: Set(input.total_seats),
            enrolled_count: Set(0),
            starts_on: Set(input.starts_on),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db())
        .await?;

        self.audit
            .record(
                AuditEntry::new(
                    Action::BatchCreated,
                    "batch",
                    Some(created.id),
                    format!("Batch {} created", created.name),
                )
                .metadata(json!({ "totalSeats": created.total_seats }))
                .actor(actor),
            )
            .await;
        Ok(created)
    }

    pub async fn get_batch(&self, batch_id: Uuid) -> EnrollmentResult<batch::Model> {
        batch::Entity::find_by_id(batch_id)
            .one(self.db())
            .await?
            .ok_or(EnrollmentError::NotFound("batch"))
    }

    pub async fn list_batches(&self) -> EnrollmentResult<Vec<batch::Model>> {
        Ok(batch::Entity::find()
            .order_by_asc(batch::Column::Name)
            .all(self.db())
            .await?)
    }
}
