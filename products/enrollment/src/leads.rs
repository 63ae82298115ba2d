use chrono::Utc;
use entity::audit_log::Action;
use entity::{batch, lead};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    AuditEntry, Enrollment,
    error::{EnrollmentError, EnrollmentResult},
};

const MAX_NAME_LEN: usize = 256;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLead {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub source: Option<lead::Source>,
    #[serde(default)]
    pub quality: Option<lead::Quality>,
    #[serde(default)]
    pub interested_level: Option<String>,
    #[serde(default)]
    pub batch_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPatch {
    #[serde(default)]
    pub status: Option<lead::Status>,
    #[serde(default)]
    pub quality: Option<lead::Quality>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub interested_level: Option<String>,
    #[serde(default)]
    pub batch_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_name(raw: &str) -> EnrollmentResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(EnrollmentError::validation("name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(EnrollmentError::validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_email(email: Option<String>) -> EnrollmentResult<Option<String>> {
    match clean(email) {
        Some(email) if !email.contains('@') => {
            Err(EnrollmentError::validation("email must contain '@'"))
        }
        other => Ok(other.map(|e| e.to_ascii_lowercase())),
    }
}

/// Whether a lead may move from `from` to `to` outside the conversion
/// workflow.
pub fn transition_allowed(from: lead::Status, to: lead::Status) -> EnrollmentResult<()> {
    use lead::Status::*;
    match (from, to) {
        (_, Converted) => Err(EnrollmentError::validation(
            "leads are converted through pay-and-convert only",
        )),
        (Converted, _) => Err(EnrollmentError::conflict("lead is already converted")),
        (Lost, New) | (Lost, Lost) => Ok(()),
        (Lost, _) => Err(EnrollmentError::conflict(
            "lost leads can only be reopened as NEW",
        )),
        _ => Ok(()),
    }
}

impl Enrollment {
    async fn ensure_batch(&self, batch_id: Option<Uuid>) -> EnrollmentResult<()> {
        if let Some(batch_id) = batch_id {
            batch::Entity::find_by_id(batch_id)
                .one(self.db())
                .await?
                .ok_or(EnrollmentError::NotFound("batch"))?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(source = ?input.source))]
    pub async fn create_lead(
        &self,
        input: NewLead,
        actor: Option<Uuid>,
    ) -> EnrollmentResult<lead::Model> {
        let name = validate_name(&input.name)?;
        let email = validate_email(input.email)?;
        self.ensure_batch(input.batch_id).await?;
        let now = Utc::now();
        let created = lead::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            email: Set(email),
            phone: Set(clean(input.phone)),
            whatsapp: Set(clean(input.whatsapp)),
            status: Set(lead::Status::New),
            quality: Set(input.quality),
            source: Set(input.source.unwrap_or(lead::Source::Other)),
            interested_level: Set(clean(input.interested_level)),
            batch_id: Set(input.batch_id),
            converted: Set(false),
            converted_date: Set(None),
            student_id: Set(None),
            notes: Set(clean(input.notes)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db())
        .await?;

        self.audit
            .record(
                AuditEntry::new(
                    Action::LeadCreated,
                    "lead",
                    Some(created.id),
                    format!("Lead {} created", created.name),
                )
                .metadata(json!({ "source": created.source }))
                .actor(actor),
            )
            .await;
        Ok(created)
    }

    #[instrument(skip_all, fields(%lead_id))]
    pub async fn update_lead(
        &self,
        lead_id: Uuid,
        patch: LeadPatch,
        actor: Option<Uuid>,
    ) -> EnrollmentResult<lead::Model> {
        let existing = lead::Entity::find_by_id(lead_id)
            .one(self.db())
            .await?
            .ok_or(EnrollmentError::NotFound("lead"))?;
        if let Some(status) = patch.status {
            transition_allowed(existing.status, status)?;
        }
        self.ensure_batch(patch.batch_id).await?;

        let previous_status = existing.status;
        let mut changes = lead::ActiveModel {
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        if let Some(status) = patch.status {
            changes.status = Set(status);
        }
        if let Some(quality) = patch.quality {
            changes.quality = Set(Some(quality));
        }
        if patch.email.is_some() {
            changes.email = Set(validate_email(patch.email)?);
        }
        if patch.phone.is_some() {
            changes.phone = Set(clean(patch.phone));
        }
        if patch.whatsapp.is_some() {
            changes.whatsapp = Set(clean(patch.whatsapp));
        }
        if patch.interested_level.is_some() {
            changes.interested_level = Set(clean(patch.interested_level));
        }
        if let Some(batch_id) = patch.batch_id {
            changes.batch_id = Set(Some(batch_id));
        }
        if patch.notes.is_some() {
            changes.notes = Set(clean(patch.notes));
        }
        let expected = patch.status.map(|_| previous_status);
        self.write_patch(lead_id, expected, changes).await?;
        let updated = self.get_lead(lead_id).await?;

        self.audit
            .record(
                AuditEntry::new(
                    Action::LeadUpdated,
                    "lead",
                    Some(updated.id),
                    format!("Lead {} updated", updated.name),
                )
                .metadata(json!({ "from": previous_status, "to": updated.status }))
                .actor(actor),
            )
            .await;
        Ok(updated)
    }

    /// Apply `changes` to the lead. A status change only lands while the
    /// lead is unconverted and still in the status it was read with.
    async fn write_patch(
        &self,
        lead_id: Uuid,
        expected_status: Option<lead::Status>,
        changes: lead::ActiveModel,
    ) -> EnrollmentResult<()> {
        let mut write = lead::Entity::update_many()
            .set(changes)
            .filter(lead::Column::Id.eq(lead_id));
        if let Some(expected) = expected_status {
            write = write
                .filter(lead::Column::Converted.eq(false))
                .filter(lead::Column::Status.eq(expected));
        }
        let written = write.exec(self.db()).await?;
        if written.rows_affected == 0 {
            return Err(EnrollmentError::conflict(
                "lead changed while it was being updated; reload and retry",
            ));
        }
        Ok(())
    }

    pub async fn get_lead(&self, lead_id: Uuid) -> EnrollmentResult<lead::Model> {
        lead::Entity::find_by_id(lead_id)
            .one(self.db())
            .await?
            .ok_or(EnrollmentError::NotFound("lead"))
    }

    pub async fn list_leads(
        &self,
        status: Option<lead::Status>,
        limit: u64,
        offset: u64,
    ) -> EnrollmentResult<Vec<lead::Model>> {
        let mut query = lead::Entity::find();
        if let Some(status) = status {
            query = query.filter(lead::Column::Status.eq(status));
        }
        Ok(query
            .order_by_desc(lead::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(self.db())
            .await?)
    }
}
