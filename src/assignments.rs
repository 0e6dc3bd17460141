use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use diesel::dsl::{exists, not};
use diesel::prelude::*;
use uuid::Uuid;

use crate::enums::{AssignmentStatus, CanvassResultCategory};
use crate::error::{AppError, AppResult};
use crate::geo::{self, Point};
use crate::models::{Assignment, Leader, NewAssignment, Prospect};
use crate::schema::{assignments, contact_events, leaders, prospects};

/// Maximum number of prospects handed out per allocation request.
pub const ASSIGNMENT_BATCH_SIZE: usize = 10;

/// Expanding search tiers. Each radius is 3x the previous so local supply is
/// exhausted before the search widens.
pub const ASSIGNMENT_RADII_MILES: [f64; 6] = [3.0, 9.0, 27.0, 81.0, 243.0, 729.0];

/// An assignment not successfully contacted within this window expires.
pub const ASSIGNMENT_DURATION_DAYS: i64 = 7;

/// Gate-checks and allocates in one transaction, serialized per leader by a
/// row lock so concurrent requests cannot double-dip.
pub fn request_assignments(
    conn: &mut PgConnection,
    leader_id: Uuid,
    quota: usize,
    location: Option<Point>,
) -> AppResult<Vec<Assignment>> {
    conn.transaction(|conn| {
        let leader: Leader = leaders::table
            .find(leader_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(AppError::NotFound)?;

        if has_outstanding_assignments(conn, leader.id)? {
            return Err(AppError::OutstandingAssignments);
        }

        assign(conn, &leader, quota, location)
    })
}

/// Allocates up to `quota` prospects to the leader. Unverified leaders only
/// ever receive demo prospects; verified leaders get the tiered geographic
/// search. Returns the newly created assignments, possibly fewer than quota.
///
/// All-or-nothing: the batch runs in its own transaction (a savepoint under
/// [`request_assignments`]), so a failure partway through the batch, such as
/// losing a race on the unique (leader, prospect) constraint, persists no
/// assignments at all.
pub fn assign(
    conn: &mut PgConnection,
    leader: &Leader,
    quota: usize,
    location: Option<Point>,
) -> AppResult<Vec<Assignment>> {
    let quota = quota.min(ASSIGNMENT_BATCH_SIZE);

    let created = conn.transaction(|conn| {
        if leader.is_verified() {
            assign_to_verified_leader(conn, leader, quota, location)
        } else {
            assign_to_unverified_leader(conn, leader, quota)
        }
    })?;

    tracing::info!(
        leader_id = %leader.id,
        requested = quota,
        created = created.len(),
        verified = leader.is_verified(),
        "allocated vol prospect assignments"
    );
    Ok(created)
}

fn assign_to_unverified_leader(
    conn: &mut PgConnection,
    leader: &Leader,
    quota: usize,
) -> AppResult<Vec<Assignment>> {
    let demo_prospects: Vec<Prospect> = prospects::table
        .filter(prospects::is_demo.eq(true))
        .filter(prospects::is_vol_prospect.eq(true))
        .filter(prospects::suppressed_at.is_null())
        .filter(not(exists(
            assignments::table
                .filter(assignments::leader_id.eq(leader.id))
                .filter(assignments::prospect_id.eq(prospects::id)),
        )))
        .order(prospects::created_at.asc())
        .limit(quota as i64)
        .load(conn)?;

    create_assignments(conn, leader.id, &demo_prospects)
}

fn assign_to_verified_leader(
    conn: &mut PgConnection,
    leader: &Leader,
    quota: usize,
    location: Option<Point>,
) -> AppResult<Vec<Assignment>> {
    let origin = location
        .or_else(|| match (leader.latitude, leader.longitude) {
            (Some(latitude), Some(longitude)) => Some(Point::new(latitude, longitude)),
            _ => None,
        })
        .ok_or_else(|| AppError::validation("leader has no coordinates to search from"))?;

    // Anti-join semantics as precomputed exclusion sets: prospects this
    // leader has ever been assigned, and prospects under live assignment to
    // anyone.
    let already_assigned: HashSet<Uuid> = assignments::table
        .filter(assignments::leader_id.eq(leader.id))
        .select(assignments::prospect_id)
        .load::<Uuid>(conn)?
        .into_iter()
        .collect();
    let live_elsewhere: HashSet<Uuid> = assignments::table
        .filter(assignments::suppressed_at.is_null())
        .filter(assignments::expired_at.is_null())
        .select(assignments::prospect_id)
        .load::<Uuid>(conn)?
        .into_iter()
        .collect();

    let mut selected: Vec<Prospect> = Vec::new();
    let mut selected_ids: HashSet<Uuid> = HashSet::new();

    for radius in ASSIGNMENT_RADII_MILES {
        let remaining = quota.saturating_sub(selected.len());
        if remaining == 0 {
            break;
        }

        let mut tier: Vec<Prospect> = geo::prospects_within_radius(conn, origin, radius)?
            .into_iter()
            .map(|(prospect, _distance)| prospect)
            .filter(|prospect| {
                prospect.is_vol_prospect
                    && !prospect.is_demo
                    && prospect.suppressed_at.is_none()
                    && !already_assigned.contains(&prospect.id)
                    && !live_elsewhere.contains(&prospect.id)
                    && !selected_ids.contains(&prospect.id)
            })
            .collect();

        // Within a tier, most recent vol-yes gets contacted first.
        tier.sort_by(|a, b| b.vol_yes_at.cmp(&a.vol_yes_at));

        for prospect in tier.into_iter().take(remaining) {
            selected_ids.insert(prospect.id);
            selected.push(prospect);
        }
    }

    create_assignments(conn, leader.id, &selected)
}

fn create_assignments(
    conn: &mut PgConnection,
    leader_id: Uuid,
    selected: &[Prospect],
) -> AppResult<Vec<Assignment>> {
    if selected.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<NewAssignment> = selected
        .iter()
        .map(|prospect| NewAssignment {
            id: Uuid::new_v4(),
            leader_id,
            prospect_id: prospect.id,
        })
        .collect();

    // One statement for the whole batch; a constraint violation on any row
    // inserts none of them.
    let created = diesel::insert_into(assignments::table)
        .values(&rows)
        .get_results(conn)?;
    Ok(created)
}

/// Whether the leader has live assignments with no contact recorded yet.
/// Leaders must work through these before requesting more.
pub fn has_outstanding_assignments(conn: &mut PgConnection, leader_id: Uuid) -> AppResult<bool> {
    let outstanding = assignments::table
        .filter(assignments::leader_id.eq(leader_id))
        .filter(assignments::suppressed_at.is_null())
        .filter(assignments::expired_at.is_null())
        .filter(not(exists(
            contact_events::table.filter(contact_events::assignment_id.eq(assignments::id)),
        )));

    let any: bool = diesel::select(exists(outstanding)).get_result(conn)?;
    Ok(any)
}

/// Manual skip: suppresses the assignment (set-once) without touching the
/// prospect. Ownership mismatches surface as not-found.
pub fn suppress_assignment(
    conn: &mut PgConnection,
    leader_id: Uuid,
    assignment_id: Uuid,
    note: Option<&str>,
) -> AppResult<Assignment> {
    conn.transaction(|conn| {
        let assignment: Assignment = assignments::table
            .find(assignment_id)
            .filter(assignments::leader_id.eq(leader_id))
            .first(conn)
            .optional()?
            .ok_or(AppError::NotFound)?;

        let now = Utc::now();
        // Set-once lives in the predicate so a cascade committed after the
        // read above keeps its original timestamp.
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
        if let Some(note) = note {
            diesel::update(assignments::table.find(assignment.id))
                .set((assignments::note.eq(note), assignments::updated_at.eq(now)))
                .execute(conn)?;
        }

        let refreshed = assignments::table.find(assignment.id).first(conn)?;
        Ok(refreshed)
    })
}

/// Recomputes the derived status from current suppression state and the
/// latest contact event.
pub fn assignment_status(
    conn: &mut PgConnection,
    assignment: &Assignment,
) -> AppResult<AssignmentStatus> {
    let prospect_suppressed_at: Option<DateTime<Utc>> = prospects::table
        .find(assignment.prospect_id)
        .select(prospects::suppressed_at)
        .first(conn)?;

    let latest_category: Option<CanvassResultCategory> = contact_events::table
        .filter(contact_events::assignment_id.eq(assignment.id))
        .order(contact_events::created_at.desc())
        .select(contact_events::result_category)
        .first(conn)
        .optional()?;

    // Re-read the row so a stale in-memory copy cannot mask a cascade.
    let refreshed: Assignment = assignments::table.find(assignment.id).first(conn)?;

    Ok(refreshed.status(prospect_suppressed_at.is_some(), latest_category))
}

/// Marks every overdue assignment expired: live, older than the assignment
/// duration, and never successfully contacted. Idempotent.
pub fn expire_assignments(conn: &mut PgConnection) -> AppResult<usize> {
    let now = Utc::now();
    let cutoff = now - Duration::days(ASSIGNMENT_DURATION_DAYS);

    let affected = diesel::update(
        assignments::table
            .filter(assignments::suppressed_at.is_null())
            .filter(assignments::expired_at.is_null())
            .filter(assignments::created_at.lt(cutoff))
            .filter(not(exists(
                contact_events::table
                    .filter(contact_events::assignment_id.eq(assignments::id))
                    .filter(
                        contact_events::result_category.eq(CanvassResultCategory::Successful),
                    ),
            ))),
    )
    .set((
        assignments::expired_at.eq(now),
        assignments::updated_at.eq(now),
    ))
    .execute(conn)?;

    tracing::info!(affected, "expired overdue assignments");
    Ok(affected)
}

/// Window of creation times whose assignments expire in `days` days.
/// With `exact = false` the bounds snap to UTC day boundaries so downstream
/// notifications go out at a consistent time of day.
pub fn expiry_window(
    now: DateTime<Utc>,
    days: i64,
    exact: bool,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    if days >= ASSIGNMENT_DURATION_DAYS {
        return Err(AppError::validation(
            "cannot offset expiration date by more than the assignment duration",
        ));
    }

    let mut window_start = now - Duration::days(ASSIGNMENT_DURATION_DAYS - days);
    let mut window_end = window_start + Duration::days(1);
    if !exact {
        window_start = window_start
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        window_end = window_end.date_naive().and_time(NaiveTime::MIN).and_utc();
    }
    Ok((window_start, window_end))
}

/// Lists live assignments that will expire in `days` days and have not been
/// successfully contacted.
pub fn expiring_assignments(
    conn: &mut PgConnection,
    days: i64,
    exact: bool,
) -> AppResult<Vec<Assignment>> {
    let (window_start, window_end) = expiry_window(Utc::now(), days, exact)?;

    let rows = assignments::table
        .filter(assignments::suppressed_at.is_null())
        .filter(assignments::expired_at.is_null())
        .filter(assignments::created_at.ge(window_start))
        .filter(assignments::created_at.lt(window_end))
        .filter(not(exists(
            contact_events::table
                .filter(contact_events::assignment_id.eq(assignments::id))
                .filter(contact_events::result_category.eq(CanvassResultCategory::Successful)),
        )))
        .order(assignments::created_at.asc())
        .load(conn)?;

    Ok(rows)
}

/// Deletes the leader's demo assignments (contact events go with them via
/// FK cascade). Called when a leader verifies; demo work is not retained.
pub fn delete_demo_assignments(conn: &mut PgConnection, leader_id: Uuid) -> AppResult<usize> {
    let demo_prospect_ids = prospects::table
        .filter(prospects::is_demo.eq(true))
        .select(prospects::id);

    let deleted = diesel::delete(
        assignments::table
            .filter(assignments::leader_id.eq(leader_id))
            .filter(assignments::prospect_id.eq_any(demo_prospect_ids)),
    )
    .execute(conn)?;

    Ok(deleted)
}
