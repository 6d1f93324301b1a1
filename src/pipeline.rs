//! Joins feed entities against the reference tables and keeps the buses on
//! the tracked route that are currently active.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::RouteConfig;
use crate::error::ProjectionError;
use crate::feed::{FeedDocument, RawEntity, VehicleReport};
use crate::reference::ReferenceTables;

pub const UNKNOWN_STOP: &str = "Unknown";
pub const SCHEDULED: &str = "SCHEDULED";

/// Rider-facing direction of travel. Only `direction_id == 1` is westbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Westbound,
    Eastbound,
}

impl Direction {
    pub fn from_direction_id(direction_id: Option<i64>) -> Self {
        match direction_id {
            Some(1) => Direction::Westbound,
            _ => Direction::Eastbound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// One active bus as returned by `/api/buses`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusStatus {
    pub label: String,
    pub direction: Direction,
    pub stop: String,
    pub position: Position,
    pub status: Value,
    pub last_updated: DateTime<Utc>,
}

/// What happened to a single entity.
#[derive(Debug)]
enum Outcome {
    Active(BusStatus),
    OtherRoute,
    UnknownTrip,
    Inactive,
}

/// Runs the whole join → filter → classify pass over `feed`.
///
/// Output keeps feed order. Entities that cannot be projected are logged and
/// skipped; they never fail the batch.
pub fn active_buses(
    feed: &FeedDocument,
    tables: &ReferenceTables,
    route: &RouteConfig,
    now: DateTime<Utc>,
) -> Vec<BusStatus> {
    let mut buses = Vec::new();
    let (mut other_route, mut unknown_trip, mut inactive, mut skipped) = (0, 0, 0, 0);

    for (index, value) in feed.entity.iter().enumerate() {
        match classify(value, tables, route, now) {
            Ok(Outcome::Active(bus)) => buses.push(bus),
            Ok(Outcome::OtherRoute) => other_route += 1,
            Ok(Outcome::UnknownTrip) => unknown_trip += 1,
            Ok(Outcome::Inactive) => inactive += 1,
            Err(e) => {
                skipped += 1;
                debug!(index, error = %e, "Skipping feed entity");
            }
        }
    }

    debug!(
        entities = feed.entity.len(),
        active = buses.len(),
        other_route,
        unknown_trip,
        inactive,
        skipped,
        "Feed classified"
    );
    buses
}

fn classify(
    value: &Value,
    tables: &ReferenceTables,
    route: &RouteConfig,
    now: DateTime<Utc>,
) -> Result<Outcome, ProjectionError> {
    let raw = RawEntity::from_value(value)?;
    if raw.route_id() != Some(route.route_id.as_str()) {
        return Ok(Outcome::OtherRoute);
    }

    let report = raw.into_report()?;
    if !tables.trips.contains_key(&report.trip_id) {
        return Ok(Outcome::UnknownTrip);
    }

    let reported_at = DateTime::from_timestamp(report.timestamp, 0)
        .ok_or(ProjectionError::InvalidTimestamp(report.timestamp))?;
    if !is_active(&report, reported_at, route, now) {
        return Ok(Outcome::Inactive);
    }

    Ok(Outcome::Active(project(report, reported_at, tables)))
}

/// Scheduled and reported within the freshness window. Reports stamped in
/// the future count as fresh.
fn is_active(
    report: &VehicleReport,
    reported_at: DateTime<Utc>,
    route: &RouteConfig,
    now: DateTime<Utc>,
) -> bool {
    report.schedule_relationship == SCHEDULED && now - reported_at < route.freshness
}

fn project(report: VehicleReport, reported_at: DateTime<Utc>, tables: &ReferenceTables) -> BusStatus {
    let stop = tables
        .stop_name(&report.stop_id)
        .unwrap_or(UNKNOWN_STOP)
        .to_string();

    BusStatus {
        label: report.label,
        direction: Direction::from_direction_id(report.direction_id),
        stop,
        position: Position {
            lat: report.latitude,
            lon: report.longitude,
        },
        status: report.current_status,
        last_updated: reported_at,
    }
}
