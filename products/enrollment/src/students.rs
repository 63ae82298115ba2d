use entity::{payment, student};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use uuid::Uuid;

use crate::{
    Enrollment,
    error::{EnrollmentError, EnrollmentResult},
};

#[derive(Clone, Debug, Default)]
pub struct StudentFilter {
    pub payment_status: Option<student::PaymentStatus>,
    pub batch_id: Option<Uuid>,
}

impl Enrollment {
    pub async fn get_student(&self, student_id: Uuid) -> EnrollmentResult<student::Model> {
        student::Entity::find_by_id(student_id)
            .one(self.db())
            .await?
            .ok_or(EnrollmentError::NotFound("student"))
    }

    pub async fn list_students(
        &self,
        filter: StudentFilter,
        limit: u64,
        offset: u64,
    ) -> EnrollmentResult<Vec<student::Model>> {
        let mut query = student::Entity::find();
        if let Some(status) = filter.payment_status {
            query = query.filter(student::Column::PaymentStatus.eq(status));
        }
        if let Some(batch_id) = filter.batch_id {
            query = query.filter(student::Column::BatchId.eq(batch_id));
        }
        Ok(query
            .order_by_desc(student::Column::EnrolledAt)
            .limit(limit)
            .offset(offset)
            .all(self.db())
            .await?)
    }

    pub async fn payments_for_student(
        &self,
        student_id: Uuid,
    ) -> EnrollmentResult<Vec<payment::Model>> {
        Ok(payment::Entity::find()
            .filter(payment::Column::StudentId.eq(student_id))
            .order_by_asc(payment::Column::PaidAt)
            .all(self.db())
            .await?)
    }
}
