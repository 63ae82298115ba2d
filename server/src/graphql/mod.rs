//! Read-only GraphQL surface. Writes go through the REST routes so every
//! mutation passes the rate limiter and the idempotency rules.

use std::sync::Arc;

use async_graphql::{
    Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object, Schema, SimpleObject,
};
use entity::{lead, student};
use platform_api::ApiError;
use platform_authn::{CurrentUser, UserRole};
use products_enrollment::{
    Enrollment, EnrollmentError, OutstandingReport,
    audit::recent_entries,
    students::StudentFilter,
    views::{AuditEntryView, BatchView, InvoiceView, LeadView, PaymentView, StudentView},
};
use sea_orm::ActiveEnum;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

pub type SchemaType = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

const MAX_PAGE: i32 = 200;

pub fn build_schema(enrollment: Arc<Enrollment>) -> SchemaType {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(enrollment)
        .finish()
}

/// SDL snapshot, printable without a database.
pub fn sdl() -> String {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .finish()
        .sdl()
}

#[derive(Default)]
pub struct QueryRoot;

fn viewer<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a CurrentUser> {
    let user = ctx
        .data_opt::<CurrentUser>()
        .ok_or_else(|| ApiError::Unauthorized.extend())?;
    if !user.has_role(UserRole::Viewer) {
        return Err(ApiError::Forbidden.extend());
    }
    Ok(user)
}

fn enrollment<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a Arc<Enrollment>> {
    ctx.data::<Arc<Enrollment>>()
}

fn gql(err: EnrollmentError) -> async_graphql::Error {
    ApiError::from(err).extend()
}

/// Lookups that miss resolve to `null` rather than an error.
fn found<T>(result: Result<T, EnrollmentError>) -> async_graphql::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(EnrollmentError::NotFound(_)) => Ok(None),
        Err(err) => Err(gql(err)),
    }
}

fn page(first: Option<i32>, offset: Option<i32>) -> (u64, u64) {
    (
        first.unwrap_or(50).clamp(1, MAX_PAGE) as u64,
        offset.unwrap_or(0).max(0) as u64,
    )
}

fn parse_label<E: ActiveEnum<Value = String>>(field: &str, raw: &str) -> async_graphql::Result<E> {
    E::try_from_value(&raw.trim().to_ascii_uppercase())
        .map_err(|_| ApiError::invalid(format!("unknown {field} {raw:?}")).extend())
}

#[derive(Clone, Debug, SimpleObject, Serialize)]
pub struct HealthPayload {
    pub ok: bool,
    pub db_ok: bool,
}

#[Object]
impl QueryRoot {
    #[instrument(name = "graphql.health", skip_all)]
    async fn health(&self, ctx: &Context<'_>) -> async_graphql::Result<HealthPayload> {
        let db_ok = platform_db::ping(enrollment(ctx)?.db()).await;
        Ok(HealthPayload { ok: db_ok, db_ok })
    }

    #[instrument(name = "graphql.version", skip_all)]
    async fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    #[instrument(name = "graphql.leads", skip_all)]
    async fn leads(
        &self,
        ctx: &Context<'_>,
        status: Option<String>,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<LeadView>> {
        viewer(ctx)?;
        let status = status
            .map(|raw| parse_label::<lead::Status>("lead status", &raw))
            .transpose()?;
        let (limit, skip) = page(first, offset);
        let leads = enrollment(ctx)?
            .list_leads(status, limit, skip)
            .await
            .map_err(gql)?;
        Ok(leads.into_iter().map(LeadView::from).collect())
    }

    async fn lead(&self, ctx: &Context<'_>, id: Uuid) -> async_graphql::Result<Option<LeadView>> {
        viewer(ctx)?;
        Ok(found(enrollment(ctx)?.get_lead(id).await)?.map(LeadView::from))
    }

    async fn invoice(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
    ) -> async_graphql::Result<Option<InvoiceView>> {
        viewer(ctx)?;
        Ok(found(enrollment(ctx)?.get_invoice(id).await)?.map(InvoiceView::from))
    }

    async fn invoices_for_lead(
        &self,
        ctx: &Context<'_>,
        lead_id: Uuid,
    ) -> async_graphql::Result<Vec<InvoiceView>> {
        viewer(ctx)?;
        let invoices = enrollment(ctx)?
            .invoices_for_lead(lead_id)
            .await
            .map_err(gql)?;
        Ok(invoices.into_iter().map(InvoiceView::from).collect())
    }

    #[instrument(name = "graphql.students", skip_all)]
    async fn students(
        &self,
        ctx: &Context<'_>,
        payment_status: Option<String>,
        batch_id: Option<Uuid>,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<StudentView>> {
        viewer(ctx)?;
        let payment_status = payment_status
            .map(|raw| parse_label::<student::PaymentStatus>("payment status", &raw))
            .transpose()?;
        let (limit, skip) = page(first, offset);
        let students = enrollment(ctx)?
            .list_students(
                StudentFilter {
                    payment_status,
                    batch_id,
                },
                limit,
                skip,
            )
            .await
            .map_err(gql)?;
        Ok(students.into_iter().map(StudentView::from).collect())
    }

    async fn student(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
    ) -> async_graphql::Result<Option<StudentView>> {
        viewer(ctx)?;
        Ok(found(enrollment(ctx)?.get_student(id).await)?.map(StudentView::from))
    }

    async fn payments(
        &self,
        ctx: &Context<'_>,
        student_id: Uuid,
    ) -> async_graphql::Result<Vec<PaymentView>> {
        viewer(ctx)?;
        let payments = enrollment(ctx)?
            .payments_for_student(student_id)
            .await
            .map_err(gql)?;
        Ok(payments.into_iter().map(PaymentView::from).collect())
    }

    async fn batches(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<BatchView>> {
        viewer(ctx)?;
        let batches = enrollment(ctx)?.list_batches().await.map_err(gql)?;
        Ok(batches.into_iter().map(BatchView::from).collect())
    }

    async fn batch(&self, ctx: &Context<'_>, id: Uuid) -> async_graphql::Result<Option<BatchView>> {
        viewer(ctx)?;
        Ok(found(enrollment(ctx)?.get_batch(id).await)?.map(BatchView::from))
    }

    #[instrument(name = "graphql.audit_log", skip_all)]
    async fn audit_log(
        &self,
        ctx: &Context<'_>,
        entity_id: Option<Uuid>,
        first: Option<i32>,
    ) -> async_graphql::Result<Vec<AuditEntryView>> {
        let user = viewer(ctx)?;
        if !user.has_role(UserRole::Admin) {
            return Err(ApiError::Forbidden.extend());
        }
        let (limit, _) = page(first, None);
        let rows = recent_entries(enrollment(ctx)?.db(), entity_id, limit)
            .await
            .map_err(|err| gql(err.into()))?;
        Ok(rows.into_iter().map(AuditEntryView::from).collect())
    }

    #[instrument(name = "graphql.outstanding", skip_all)]
    async fn outstanding(
        &self,
        ctx: &Context<'_>,
        base_currency: Option<String>,
    ) -> async_graphql::Result<OutstandingReport> {
        viewer(ctx)?;
        enrollment(ctx)?
            .outstanding_report(base_currency.as_deref())
            .await
            .map_err(gql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::{Request, Value as GqlValue};
    use serde_json::json;

    #[tokio::test]
    async fn version_needs_no_viewer() {
        let schema = Schema::build(QueryRoot, EmptyMutation, EmptySubscription).finish();
        let response = schema.execute(Request::new("{ version }")).await;
        assert!(response.errors.is_empty());
        let body = response.data.into_json().unwrap();
        assert_eq!(body, json!({ "version": env!("CARGO_PKG_VERSION") }));
    }

    #[tokio::test]
    async fn reads_require_a_caller() {
        let schema = Schema::build(QueryRoot, EmptyMutation, EmptySubscription).finish();
        let response = schema.execute(Request::new("{ batches { id } }")).await;
        let error = response.errors.first().expect("an error");
        let code = error
            .extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .cloned();
        assert_eq!(code, Some(GqlValue::from("UNAUTHORIZED")));
    }

    #[test]
    fn sdl_lists_the_read_surface() {
        let sdl = sdl();
        for field in ["leads(", "outstanding(", "auditLog(", "student("] {
            assert!(sdl.contains(field), "missing {field}");
        }
    }
}
