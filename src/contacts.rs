use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::enums::{CanvassResult, CanvassResultCategory};
use crate::error::{AppError, AppResult};
use crate::mobilize::{AttendanceRequestPerson, EventRegistrar};
use crate::models::{Assignment, ContactEvent, NewContactEvent, Prospect};
use crate::schema::{assignments, contact_events, prospects};

#[derive(Debug, Clone)]
pub struct ContactEventInput {
    pub result: CanvassResult,
    /// Explicit category override; derived from `result` when absent.
    pub result_category: Option<CanvassResultCategory>,
    pub note: String,
    pub metadata: Option<serde_json::Value>,
    pub ma_event_id: Option<i64>,
    pub ma_timeslot_ids: Option<Vec<i64>>,
}

impl ContactEventInput {
    pub fn new(result: CanvassResult) -> Self {
        Self {
            result,
            result_category: None,
            note: String::new(),
            metadata: None,
            ma_event_id: None,
            ma_timeslot_ids: None,
        }
    }
}

/// Records a contact outcome against an assignment owned by the leader.
///
/// UNREACHABLE outcomes suppress the assignment and its prospect together
/// with the event in one transaction; the prospect is then out of allocation
/// system-wide, permanently. Other outcomes carrying an event signup register
/// attendance with the external registrar first, so a registration failure
/// leaves no local state behind. Demo prospects never reach the registrar.
pub fn record_contact(
    conn: &mut PgConnection,
    registrar: &dyn EventRegistrar,
    leader_id: Uuid,
    assignment_id: Uuid,
    input: ContactEventInput,
) -> AppResult<ContactEvent> {
    let assignment: Assignment = assignments::table
        .find(assignment_id)
        .filter(assignments::leader_id.eq(leader_id))
        .first(conn)
        .optional()?
        .ok_or(AppError::NotFound)?;

    let prospect: Prospect = prospects::table.find(assignment.prospect_id).first(conn)?;

    let category = input
        .result_category
        .unwrap_or_else(|| input.result.category());

    if category == CanvassResultCategory::Unreachable {
        return record_unreachable(conn, &assignment, &prospect, category, input);
    }

    if let (Some(event_id), Some(timeslot_ids)) = (input.ma_event_id, &input.ma_timeslot_ids) {
        if !timeslot_ids.is_empty() && !prospect.is_demo {
            if !prospect.has_email() {
                return Err(AppError::validation(
                    "prospect has no email address for event signup",
                ));
            }
            // External confirmation comes first; nothing is persisted if the
            // registrar rejects the signup.
            registrar.register_attendance(
                &attendance_person(&prospect),
                event_id,
                timeslot_ids,
            )?;
        }
    }

    let event = insert_event(conn, &assignment, category, input)?;
    Ok(event)
}

/// Terminal cascade: suppress the assignment and prospect (set-once) and
/// persist the event atomically. A concurrent reader never sees one without
/// the other.
///
/// Set-once is enforced in the UPDATE predicates themselves, not on the rows
/// read earlier: a cascade committed by another session between our read and
/// this transaction must not have its timestamp overwritten.
fn record_unreachable(
    conn: &mut PgConnection,
    assignment: &Assignment,
    prospect: &Prospect,
    category: CanvassResultCategory,
    input: ContactEventInput,
) -> AppResult<ContactEvent> {
    conn.transaction(|conn| {
        let now = Utc::now();
        diesel::update(
            assignments::table
                .filter(assignments::id.eq(assignment.id))
                .filter(assignments::suppressed_at.is_null()),
        )
        .set((
            assignments::suppressed_at.eq(now),
            assignments::updated_at.eq(now),
        ))
        .execute(conn)?;
        diesel::update(
            prospects::table
                .filter(prospects::id.eq(prospect.id))
                .filter(prospects::suppressed_at.is_null()),
        )
        .set((
            prospects::suppressed_at.eq(now),
            prospects::updated_at.eq(now),
        ))
        .execute(conn)?;

        tracing::info!(
            assignment_id = %assignment.id,
            prospect_id = %prospect.id,
            "unreachable contact suppressed prospect system-wide"
        );
        insert_event(conn, assignment, category, input)
    })
}

fn insert_event(
    conn: &mut PgConnection,
    assignment: &Assignment,
    category: CanvassResultCategory,
    input: ContactEventInput,
) -> AppResult<ContactEvent> {
    let new_event = NewContactEvent {
        id: Uuid::new_v4(),
        assignment_id: assignment.id,
        result: input.result,
        result_category: category,
        note: input.note,
        metadata: input.metadata,
        ma_event_id: input.ma_event_id,
        ma_timeslot_ids: input.ma_timeslot_ids,
    };

    let event: ContactEvent = diesel::insert_into(contact_events::table)
        .values(&new_event)
        .get_result(conn)?;
    Ok(event)
}

fn attendance_person(prospect: &Prospect) -> AttendanceRequestPerson {
    AttendanceRequestPerson {
        given_name: prospect.first_name.clone(),
        family_name: prospect.last_name.clone(),
        email_address: prospect.email.clone(),
        postal_code: prospect.zip5.clone(),
        phone_number: (!prospect.phone.is_empty()).then(|| prospect.phone.clone()),
    }
}
