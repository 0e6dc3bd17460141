use chrono::{Duration, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use uuid::Uuid;

use crate::assignments::delete_demo_assignments;
use crate::error::{AppError, AppResult};
use crate::models::{Leader, NewLeader};
use crate::schema::{assignments, contact_events, leaders};

/// Contacted prospects a leader needs before earning an invite.
pub const CONTACT_COUNT_TO_INVITE: i64 = 10;

/// Invites a leader may create within a trailing 24 hours.
pub const DAILY_INVITE_LIMIT: i64 = 3;

/// Number of distinct prospects assigned to this leader that have at least
/// one contact event, regardless of outcome.
pub fn assignment_contacts_count(conn: &mut PgConnection, leader_id: Uuid) -> AppResult<i64> {
    let contacted_prospects: Vec<Uuid> = assignments::table
        .filter(assignments::leader_id.eq(leader_id))
        .filter(exists(
            contact_events::table.filter(contact_events::assignment_id.eq(assignments::id)),
        ))
        .select(assignments::prospect_id)
        .distinct()
        .load(conn)?;

    Ok(contacted_prospects.len() as i64)
}

pub fn remaining_contacts_count(conn: &mut PgConnection, leader_id: Uuid) -> AppResult<i64> {
    let contacted = assignment_contacts_count(conn, leader_id)?;
    Ok((CONTACT_COUNT_TO_INVITE - contacted).max(0))
}

/// The most recently invited leader, if any.
pub fn latest_invite(conn: &mut PgConnection, leader_id: Uuid) -> AppResult<Option<Leader>> {
    let invite = leaders::table
        .filter(leaders::added_by.eq(leader_id))
        .order(leaders::created_at.desc())
        .first(conn)
        .optional()?;
    Ok(invite)
}

/// Whether the leader has earned the right to invite another leader: ten
/// contacted prospects, and when they have invited before, their latest
/// invitee must also have reached ten and the daily invite budget must not
/// be exhausted.
pub fn has_invite(conn: &mut PgConnection, leader_id: Uuid) -> AppResult<bool> {
    let contacted_enough =
        assignment_contacts_count(conn, leader_id)? >= CONTACT_COUNT_TO_INVITE;

    let Some(invite) = latest_invite(conn, leader_id)? else {
        return Ok(contacted_enough);
    };

    let invitee_contacted_enough =
        assignment_contacts_count(conn, invite.id)? >= CONTACT_COUNT_TO_INVITE;

    let day_ago = Utc::now() - Duration::days(1);
    let invites_today: i64 = leaders::table
        .filter(leaders::added_by.eq(leader_id))
        .filter(leaders::created_at.ge(day_ago))
        .count()
        .get_result(conn)?;

    Ok(contacted_enough && invitee_contacted_enough && invites_today < DAILY_INVITE_LIMIT)
}

/// Creates an invited leader with the invite chain recorded, enforcing the
/// eligibility gate.
pub fn create_invite(
    conn: &mut PgConnection,
    inviter_id: Uuid,
    email: &str,
) -> AppResult<Leader> {
    conn.transaction(|conn| {
        if !has_invite(conn, inviter_id)? {
            return Err(AppError::validation("leader has not earned an invite"));
        }

        let new_leader = NewLeader {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            added_by: Some(inviter_id),
            latitude: None,
            longitude: None,
            verified_at: None,
        };
        let leader: Leader = diesel::insert_into(leaders::table)
            .values(&new_leader)
            .get_result(conn)?;

        tracing::info!(inviter_id = %inviter_id, invitee_id = %leader.id, "created leader invite");
        Ok(leader)
    })
}

/// Marks the leader verified and drops their demo assignments in one
/// transaction. Demo work is deleted outright, never carried over.
pub fn verify_leader(conn: &mut PgConnection, leader_id: Uuid) -> AppResult<Leader> {
    conn.transaction(|conn| {
        let leader: Leader = leaders::table
            .find(leader_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(AppError::NotFound)?;

        let now = Utc::now();
        if leader.verified_at.is_none() {
            diesel::update(leaders::table.find(leader.id))
                .set((leaders::verified_at.eq(now), leaders::updated_at.eq(now)))
                .execute(conn)?;
        }
        let deleted = delete_demo_assignments(conn, leader.id)?;
        tracing::info!(leader_id = %leader.id, demo_assignments_deleted = deleted, "verified leader");

        let refreshed = leaders::table.find(leader.id).first(conn)?;
        Ok(refreshed)
    })
}
