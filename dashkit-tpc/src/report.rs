//! Report instances as seen by the TPCreator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One ingested report payload; only its tags matter here
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportInstance {
    pub report_instance_id: Uuid,
    pub owner_id: Uuid,
    pub report_id: Uuid,
    /// Tags in submission order
    pub all_tags: Vec<String>,
    pub created: DateTime<Utc>,
}

impl ReportInstance {
    pub fn new(owner_id: Uuid, report_id: Uuid, all_tags: Vec<String>) -> Self {
        Self {
            report_instance_id: Uuid::new_v4(),
            owner_id,
            report_id,
            all_tags,
            created: Utc::now(),
        }
    }
}
