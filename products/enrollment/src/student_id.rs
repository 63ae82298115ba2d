use chrono::{DateTime, Utc};
use rand::Rng;

/// Attempts at inserting a student before a code collision fails the
/// conversion.
pub const MAX_STUDENT_CODE_ATTEMPTS: usize = 5;

/// Produces human-readable student codes. Uniqueness is enforced by the
/// database; generators only need to make collisions unlikely.
pub trait StudentIdGenerator: Send + Sync {
    fn generate(&self, enrolled_at: DateTime<Utc>) -> String;
}

/// `STU-YYYYMM-NNNN` with a random four digit suffix.
#[derive(Clone, Debug, Default)]
pub struct RandomStudentIds;

impl StudentIdGenerator for RandomStudentIds {
    fn generate(&self, enrolled_at: DateTime<Utc>) -> String {
        let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
        format!("STU-{}-{suffix:04}", enrolled_at.format("%Y%m"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn codes_carry_enrollment_month() {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        let code = RandomStudentIds.generate(at);
        assert!(code.starts_with("STU-202601-"), "{code}");
        assert_eq!(code.len(), "STU-202601-0000".len());
        assert!(code[11..].chars().all(|c| c.is_ascii_digit()));
    }
}
