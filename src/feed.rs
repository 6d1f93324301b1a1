//! JSON vehicle position feed.
//!
//! The document is only validated at the top level: it must be an object with
//! an `entity` array. Each entity stays an untyped [`Value`] until the pipeline
//! projects it, so one bad vehicle cannot fail the whole feed.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{FetchError, ProjectionError};

/// The parsed feed: its entities in feed order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedDocument {
    pub entity: Vec<Value>,
}

/// Parses a feed body.
///
/// # Errors
///
/// Returns [`FetchError::Parse`] if the body is not JSON or has no `entity` array.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, FetchError> {
    serde_json::from_slice(bytes).map_err(FetchError::Parse)
}

/// Loosely typed view of `entity.vehicle`. Every field is optional here;
/// [`RawEntity::into_report`] decides which ones are required.
#[derive(Debug, Default, Deserialize)]
pub struct RawEntity {
    #[serde(default)]
    pub vehicle: Option<RawVehicle>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawVehicle {
    #[serde(default)]
    pub trip: Option<RawTrip>,
    #[serde(default)]
    pub vehicle: Option<RawDescriptor>,
    #[serde(default)]
    pub position: Option<RawPosition>,
    #[serde(default)]
    pub current_status: Option<Value>,
    #[serde(default)]
    pub stop_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<EpochSeconds>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawTrip {
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub direction_id: Option<i64>,
    #[serde(default)]
    pub schedule_relationship: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawDescriptor {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPosition {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Protobuf JSON renders 64-bit integers as strings, and some producers send
/// fractional seconds. Fractions are truncated to whole seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EpochSeconds {
    Number(i64),
    Float(f64),
    Text(String),
}

fn whole_seconds(secs: f64) -> Option<i64> {
    let secs = secs.trunc();
    (secs.is_finite() && secs >= i64::MIN as f64 && secs < i64::MAX as f64).then_some(secs as i64)
}

impl EpochSeconds {
    fn value(&self) -> Option<i64> {
        match self {
            EpochSeconds::Number(n) => Some(*n),
            EpochSeconds::Float(f) => whole_seconds(*f),
            EpochSeconds::Text(s) => {
                let s = s.trim();
                s.parse()
                    .ok()
                    .or_else(|| s.parse().ok().and_then(whole_seconds))
            }
        }
    }
}

/// A vehicle entity with every field the pipeline relies on present.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleReport {
    pub route_id: String,
    pub trip_id: String,
    pub direction_id: Option<i64>,
    pub schedule_relationship: String,
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
    pub current_status: Value,
    pub stop_id: String,
    pub timestamp: i64,
}

impl RawEntity {
    pub fn from_value(value: &Value) -> Result<Self, ProjectionError> {
        Ok(Self::deserialize(value)?)
    }

    /// The entity's `vehicle.trip.route_id`, if it has one.
    pub fn route_id(&self) -> Option<&str> {
        self.vehicle
            .as_ref()?
            .trip
            .as_ref()?
            .route_id
            .as_deref()
    }

    /// Checks for every required field in one place.
    pub fn into_report(self) -> Result<VehicleReport, ProjectionError> {
        use ProjectionError::MissingField;

        let vehicle = self.vehicle.ok_or(MissingField("vehicle"))?;
        let trip = vehicle.trip.ok_or(MissingField("vehicle.trip"))?;
        let position = vehicle.position.ok_or(MissingField("vehicle.position"))?;
        let timestamp = vehicle.timestamp.ok_or(MissingField("vehicle.timestamp"))?;

        Ok(VehicleReport {
            route_id: trip.route_id.ok_or(MissingField("vehicle.trip.route_id"))?,
            trip_id: trip.trip_id.ok_or(MissingField("vehicle.trip.trip_id"))?,
            direction_id: trip.direction_id,
            schedule_relationship: trip
                .schedule_relationship
                .ok_or(MissingField("vehicle.trip.schedule_relationship"))?,
            label: vehicle
                .vehicle
                .and_then(|d| d.label)
                .ok_or(MissingField("vehicle.vehicle.label"))?,
            latitude: position
                .latitude
                .ok_or(MissingField("vehicle.position.latitude"))?,
            longitude: position
                .longitude
                .ok_or(MissingField("vehicle.position.longitude"))?,
            current_status: vehicle
                .current_status
                .filter(|v| !v.is_null())
                .ok_or(MissingField("vehicle.current_status"))?,
            stop_id: vehicle.stop_id.ok_or(MissingField("vehicle.stop_id"))?,
            timestamp: timestamp
                .value()
                .ok_or(MissingField("vehicle.timestamp"))?,
        })
    }
}
