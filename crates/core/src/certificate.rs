//! Certificate domain records.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::ProcessId;

/// Business payload of a certificate event.
///
/// This is what the API enqueues and what the worker re-hydrates from the
/// ledger on every delivery. Subject hours are kept in a sorted map so
/// rendering order is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificatePayload {
    pub process_id: ProcessId,
    pub registration: String,
    pub student_name: String,
    pub student_born_date: NaiveDate,
    pub document_type: String,
    pub document_number: String,
    pub course_name: String,
    /// Subject name to workload hours.
    pub course_subjects: BTreeMap<String, u32>,
    pub utilization_percentage: f64,
    pub conclusion_date: NaiveDate,
}

impl CertificatePayload {
    /// Total course workload, the sum of all subject hours.
    pub fn workload_hours(&self) -> u32 {
        self.course_subjects.values().sum()
    }

    /// Validate the business fields before enqueueing.
    pub fn validate(&self) -> DomainResult<()> {
        if self.registration.trim().is_empty() {
            return Err(DomainError::validation("registration must not be empty"));
        }
        if self.student_name.trim().is_empty() {
            return Err(DomainError::validation("student name must not be empty"));
        }
        if self.course_name.trim().is_empty() {
            return Err(DomainError::validation("course name must not be empty"));
        }
        if self.course_subjects.is_empty() {
            return Err(DomainError::validation("course must have at least one subject"));
        }
        if !(0.0..=100.0).contains(&self.utilization_percentage) {
            return Err(DomainError::validation(
                "utilization percentage must be within 0..=100",
            ));
        }
        Ok(())
    }
}

/// An issued certificate as persisted after generation.
///
/// `sign` names both artifacts in object storage; the presigned links are
/// minted on demand and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    /// Lowercase hex SHA-256 over the process id and a fresh UUID.
    pub sign: String,
    pub registration: String,
    pub student_name: String,
    pub course_name: String,
    pub workload_hours: u32,
    pub utilization_percentage: f64,
    /// Storage key of the PDF artifact.
    pub pdf_object: String,
    /// Storage key of the QR PNG artifact.
    pub png_object: String,
    pub issued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CertificatePayload {
        CertificatePayload {
            process_id: ProcessId::from_i64(1),
            registration: "4655".into(),
            student_name: "maria clara da silva".into(),
            student_born_date: NaiveDate::from_ymd_opt(2001, 3, 14).unwrap(),
            document_type: "CPF".into(),
            document_number: "123.456.789-00".into(),
            course_name: "data engineering".into(),
            course_subjects: BTreeMap::from([
                ("Databases".to_string(), 60),
                ("Distributed Systems".to_string(), 80),
            ]),
            utilization_percentage: 87.5,
            conclusion_date: NaiveDate::from_ymd_opt(2024, 11, 30).unwrap(),
        }
    }

    #[test]
    fn workload_is_the_sum_of_subject_hours() {
        assert_eq!(payload().workload_hours(), 140);
    }

    #[test]
    fn valid_payload_passes_validation() {
        assert!(payload().validate().is_ok());
    }

    #[test]
    fn empty_registration_fails_validation() {
        let mut p = payload();
        p.registration = "  ".into();
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn out_of_range_utilization_fails_validation() {
        let mut p = payload();
        p.utilization_percentage = 104.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn subjects_are_required() {
        let mut p = payload();
        p.course_subjects.clear();
        assert!(p.validate().is_err());
    }
}
