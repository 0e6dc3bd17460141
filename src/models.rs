use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::enums::{AssignmentStatus, CanvassResult, CanvassResultCategory};
use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = prospects)]
pub struct Prospect {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub zip5: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_vol_prospect: bool,
    pub vol_yes_at: Option<DateTime<Utc>>,
    pub suppressed_at: Option<DateTime<Utc>>,
    pub is_demo: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prospect {
    pub fn has_email(&self) -> bool {
        !self.email.is_empty()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = prospects)]
pub struct NewProspect {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub zip5: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_vol_prospect: bool,
    pub vol_yes_at: Option<DateTime<Utc>>,
    pub is_demo: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = leaders)]
pub struct Leader {
    pub id: Uuid,
    pub email: String,
    pub added_by: Option<Uuid>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub verified_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Leader {
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = leaders)]
pub struct NewLeader {
    pub id: Uuid,
    pub email: String,
    pub added_by: Option<Uuid>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = assignments)]
#[diesel(belongs_to(Leader))]
#[diesel(belongs_to(Prospect))]
pub struct Assignment {
    pub id: Uuid,
    pub leader_id: Uuid,
    pub prospect_id: Uuid,
    pub suppressed_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    /// Derives the current status from suppression state and the latest
    /// contact event. Never cached: a new event changes the answer.
    pub fn status(
        &self,
        prospect_suppressed: bool,
        latest_category: Option<CanvassResultCategory>,
    ) -> AssignmentStatus {
        AssignmentStatus::derive(
            self.suppressed_at.is_some(),
            prospect_suppressed,
            latest_category,
        )
    }

    pub fn is_live(&self) -> bool {
        self.suppressed_at.is_none() && self.expired_at.is_none()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = assignments)]
pub struct NewAssignment {
    pub id: Uuid,
    pub leader_id: Uuid,
    pub prospect_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = contact_events)]
#[diesel(belongs_to(Assignment))]
pub struct ContactEvent {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub result: CanvassResult,
    pub result_category: CanvassResultCategory,
    pub note: String,
    pub metadata: Option<serde_json::Value>,
    pub ma_event_id: Option<i64>,
    pub ma_timeslot_ids: Option<Vec<i64>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = contact_events)]
pub struct NewContactEvent {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub result: CanvassResult,
    pub result_category: CanvassResultCategory,
    pub note: String,
    pub metadata: Option<serde_json::Value>,
    pub ma_event_id: Option<i64>,
    pub ma_timeslot_ids: Option<Vec<i64>>,
}
