use std::env;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use once_cell::sync::Lazy;
use uuid::Uuid;

use switchboard::db::{self, PgPool, PgPooledConnection};
use switchboard::geo::Point;
use switchboard::mobilize::{
    AttendanceReceipt, AttendanceRequestPerson, EventRegistrar, RegistrarError,
};
use switchboard::models::{Assignment, Leader, NewAssignment, NewLeader, NewProspect, Prospect};
use switchboard::schema::{assignments, contact_events, leaders, prospects};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Somerville, MA. Fixture geography hangs off this point.
pub const ORIGIN: Point = Point {
    latitude: 42.3876,
    longitude: -71.0995,
};

pub struct TestDb {
    pub pool: PgPool,
}

impl TestDb {
    pub fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;
        let pool = db::init_pool(&database_url, db::DEFAULT_MAX_POOL_SIZE)?;

        let mut conn = pool.get().context("failed to acquire connection")?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;

        Ok(Self { pool })
    }

    pub fn conn(&self) -> Result<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| anyhow!("failed to get database connection: {err}"))
    }
}

pub fn acquire_db_lock() -> MutexGuard<'static, ()> {
    DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE contact_events, assignments, leaders, prospects RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}

/// A point approximately `miles` due north of the origin.
pub fn point_at_miles(origin: Point, miles: f64) -> Point {
    Point::new(origin.latitude + miles / 69.086, origin.longitude)
}

pub fn insert_prospect(
    conn: &mut PgConnection,
    name: &str,
    point: Option<Point>,
    vol_yes_at: Option<DateTime<Utc>>,
) -> Result<Prospect> {
    insert_prospect_opts(conn, name, point, vol_yes_at, false)
}

pub fn insert_demo_prospect(conn: &mut PgConnection, name: &str) -> Result<Prospect> {
    insert_prospect_opts(conn, name, None, None, true)
}

fn insert_prospect_opts(
    conn: &mut PgConnection,
    name: &str,
    point: Option<Point>,
    vol_yes_at: Option<DateTime<Utc>>,
    is_demo: bool,
) -> Result<Prospect> {
    let new_prospect = NewProspect {
        id: Uuid::new_v4(),
        first_name: name.to_string(),
        last_name: "Volunteer".to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        phone: String::new(),
        zip5: "02144".to_string(),
        city: name.to_string(),
        latitude: point.map(|p| p.latitude),
        longitude: point.map(|p| p.longitude),
        is_vol_prospect: true,
        vol_yes_at,
        is_demo,
    };
    let prospect = diesel::insert_into(prospects::table)
        .values(&new_prospect)
        .get_result(conn)
        .context("failed to insert prospect")?;
    Ok(prospect)
}

pub fn insert_leader(
    conn: &mut PgConnection,
    email: &str,
    point: Option<Point>,
    verified: bool,
) -> Result<Leader> {
    let new_leader = NewLeader {
        id: Uuid::new_v4(),
        email: email.to_string(),
        added_by: None,
        latitude: point.map(|p| p.latitude),
        longitude: point.map(|p| p.longitude),
        verified_at: verified.then(Utc::now),
    };
    let leader = diesel::insert_into(leaders::table)
        .values(&new_leader)
        .get_result(conn)
        .context("failed to insert leader")?;
    Ok(leader)
}

pub fn insert_invited_leader(
    conn: &mut PgConnection,
    email: &str,
    added_by: Uuid,
) -> Result<Leader> {
    let new_leader = NewLeader {
        id: Uuid::new_v4(),
        email: email.to_string(),
        added_by: Some(added_by),
        latitude: None,
        longitude: None,
        verified_at: None,
    };
    let leader = diesel::insert_into(leaders::table)
        .values(&new_leader)
        .get_result(conn)
        .context("failed to insert invited leader")?;
    Ok(leader)
}

pub fn insert_assignment(
    conn: &mut PgConnection,
    leader_id: Uuid,
    prospect_id: Uuid,
) -> Result<Assignment> {
    let new_assignment = NewAssignment {
        id: Uuid::new_v4(),
        leader_id,
        prospect_id,
    };
    let assignment = diesel::insert_into(assignments::table)
        .values(&new_assignment)
        .get_result(conn)
        .context("failed to insert assignment")?;
    Ok(assignment)
}

pub fn backdate_assignment(
    conn: &mut PgConnection,
    assignment_id: Uuid,
    created_at: DateTime<Utc>,
) -> Result<()> {
    diesel::update(assignments::table.find(assignment_id))
        .set(assignments::created_at.eq(created_at))
        .execute(conn)
        .context("failed to backdate assignment")?;
    Ok(())
}

pub fn backdate_leader(
    conn: &mut PgConnection,
    leader_id: Uuid,
    created_at: DateTime<Utc>,
) -> Result<()> {
    diesel::update(leaders::table.find(leader_id))
        .set(leaders::created_at.eq(created_at))
        .execute(conn)
        .context("failed to backdate leader")?;
    Ok(())
}

pub fn backdate_contact_event(
    conn: &mut PgConnection,
    event_id: Uuid,
    created_at: DateTime<Utc>,
) -> Result<()> {
    diesel::update(contact_events::table.find(event_id))
        .set(contact_events::created_at.eq(created_at))
        .execute(conn)
        .context("failed to backdate contact event")?;
    Ok(())
}

pub fn reload_assignment(conn: &mut PgConnection, assignment_id: Uuid) -> Result<Assignment> {
    assignments::table
        .find(assignment_id)
        .first(conn)
        .context("failed to reload assignment")
}

pub fn reload_prospect(conn: &mut PgConnection, prospect_id: Uuid) -> Result<Prospect> {
    prospects::table
        .find(prospect_id)
        .first(conn)
        .context("failed to reload prospect")
}

pub fn assigned_prospect_ids(conn: &mut PgConnection, leader_id: Uuid) -> Result<Vec<Uuid>> {
    assignments::table
        .filter(assignments::leader_id.eq(leader_id))
        .select(assignments::prospect_id)
        .order(assignments::created_at.asc())
        .load(conn)
        .context("failed to load assigned prospect ids")
}

pub fn contact_event_count(conn: &mut PgConnection, assignment_id: Uuid) -> Result<i64> {
    let count = contact_events::table
        .filter(contact_events::assignment_id.eq(assignment_id))
        .count()
        .get_result(conn)
        .context("failed to count contact events")?;
    Ok(count)
}

/// In-memory registrar standing in for Mobilize America.
#[derive(Default)]
pub struct FakeRegistrar {
    calls: Mutex<Vec<RecordedRegistration>>,
    fail_with: Mutex<Option<RegistrarError>>,
}

#[derive(Debug, Clone)]
pub struct RecordedRegistration {
    pub email: String,
    pub event_id: i64,
    pub timeslot_ids: Vec<i64>,
}

impl FakeRegistrar {
    pub fn fail_next(&self, error: RegistrarError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> Vec<RecordedRegistration> {
        self.calls.lock().unwrap().clone()
    }
}

impl EventRegistrar for FakeRegistrar {
    fn register_attendance(
        &self,
        person: &AttendanceRequestPerson,
        event_id: i64,
        timeslot_ids: &[i64],
    ) -> Result<AttendanceReceipt, RegistrarError> {
        self.calls.lock().unwrap().push(RecordedRegistration {
            email: person.email_address.clone(),
            event_id,
            timeslot_ids: timeslot_ids.to_vec(),
        });
        if let Some(error) = self.fail_with.lock().unwrap().take() {
            return Err(error);
        }
        Ok(AttendanceReceipt {
            registered_timeslot_ids: timeslot_ids.to_vec(),
            already_registered_timeslot_ids: Vec::new(),
        })
    }
}
