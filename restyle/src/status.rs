//! Status lookups over recorded job outcomes.

use std::sync::Arc;

use serde::Serialize;

use crate::error::JobError;
use crate::store::SessionStore;

/// What a status lookup reports. Pending, failed and unknown identifiers all
/// look the same: nothing is recorded until a job succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl JobStatus {
    fn absent() -> Self {
        Self {
            received: false,
            image: None,
        }
    }
}

pub struct StatusService {
    store: Arc<dyn SessionStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn get_status(&self, identifier: Option<&str>) -> Result<JobStatus, JobError> {
        let identifier = match identifier {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(JobError::Validation(
                    "Missing id query parameter".to_string(),
                ));
            }
        };

        Ok(match self.store.get(identifier) {
            Some(outcome) => JobStatus {
                received: true,
                image: Some(outcome.artifact_url.clone()),
            },
            None => JobStatus::absent(),
        })
    }
}
