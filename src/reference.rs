//! Static GTFS reference tables: trips for the tracked route and all stops.
//!
//! Both tables are read with the `csv` crate straight into serde records.
//! Extra columns are ignored, but a missing required column or an unparsable
//! row fails the whole load.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info};

use crate::config::ReferencePaths;
use crate::error::{ReferenceLoadError, TrackerError};

/// One row of `trips.txt`. Only the join keys are read; every other column
/// is ignored, whatever it holds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TripRecord {
    pub trip_id: String,
    pub route_id: String,
}

/// One row of `stops.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StopRecord {
    pub stop_id: String,
    pub stop_name: String,
}

pub type TripTable = HashMap<String, TripRecord>;
pub type StopTable = HashMap<String, StopRecord>;

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Reads trips, keeping only those on `route_id`. Later duplicates of a
/// `trip_id` replace earlier ones.
pub fn read_trips<R: Read>(reader: R, route_id: &str) -> Result<TripTable, csv::Error> {
    let mut trips = HashMap::new();
    for rec in csv_reader(reader).deserialize() {
        let trip: TripRecord = rec?;
        if trip.route_id == route_id {
            trips.insert(trip.trip_id.clone(), trip);
        }
    }
    Ok(trips)
}

/// Reads every stop. Later duplicates of a `stop_id` replace earlier ones.
pub fn read_stops<R: Read>(reader: R) -> Result<StopTable, csv::Error> {
    let mut stops = HashMap::new();
    for rec in csv_reader(reader).deserialize() {
        let stop: StopRecord = rec?;
        stops.insert(stop.stop_id.clone(), stop);
    }
    Ok(stops)
}

fn open(path: &Path) -> Result<File, ReferenceLoadError> {
    File::open(path).map_err(|source| ReferenceLoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_trips(path: &Path, route_id: &str) -> Result<TripTable, ReferenceLoadError> {
    read_trips(open(path)?, route_id).map_err(|source| ReferenceLoadError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_stops(path: &Path) -> Result<StopTable, ReferenceLoadError> {
    read_stops(open(path)?).map_err(|source| ReferenceLoadError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

/// The two lookup tables the pipeline joins against. Immutable once built.
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    pub trips: TripTable,
    pub stops: StopTable,
    pub loaded_at: DateTime<Utc>,
}

impl ReferenceTables {
    pub fn new(trips: TripTable, stops: StopTable) -> Self {
        Self {
            trips,
            stops,
            loaded_at: Utc::now(),
        }
    }

    /// Loads both tables from disk. Blocking.
    #[tracing::instrument(skip(paths), fields(trips = %paths.trips.display(), stops = %paths.stops.display()))]
    pub fn load(paths: &ReferencePaths, route_id: &str) -> Result<Self, ReferenceLoadError> {
        let trips = load_trips(&paths.trips, route_id)?;
        let stops = load_stops(&paths.stops)?;
        info!(
            trip_count = trips.len(),
            stop_count = stops.len(),
            "Reference tables loaded"
        );
        Ok(Self::new(trips, stops))
    }

    /// Runs [`ReferenceTables::load`] on the blocking pool.
    pub async fn load_async(
        paths: ReferencePaths,
        route_id: String,
    ) -> Result<Self, TrackerError> {
        tokio::task::spawn_blocking(move || Self::load(&paths, &route_id))
            .await
            .map_err(|e| TrackerError::Internal(e.to_string()))?
            .map_err(Into::into)
    }

    pub fn stop_name(&self, stop_id: &str) -> Option<&str> {
        self.stops.get(stop_id).map(|s| s.stop_name.as_str())
    }
}

/// Shared, swappable handle on the current [`ReferenceTables`].
///
/// Readers take a cheap `Arc` clone and never block on a reload; the reloader
/// builds a complete replacement before publishing it.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    current: Arc<RwLock<Arc<ReferenceTables>>>,
}

impl ReferenceStore {
    pub fn new(tables: ReferenceTables) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(tables))),
        }
    }

    pub fn snapshot(&self) -> Arc<ReferenceTables> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn publish(&self, tables: ReferenceTables) {
        let tables = Arc::new(tables);
        match self.current.write() {
            Ok(mut guard) => *guard = tables,
            Err(poisoned) => *poisoned.into_inner() = tables,
        }
        debug!("Published new reference tables");
    }

    /// Loads a fresh pair of tables and publishes them. On failure nothing is
    /// published and the current tables stay in service.
    pub async fn reload(&self, paths: ReferencePaths, route_id: String) -> Result<(), TrackerError> {
        let tables = ReferenceTables::load_async(paths, route_id).await?;
        let replaced = self.snapshot().loaded_at;
        info!(
            replaced = %replaced,
            loaded_at = %tables.loaded_at,
            "Reference tables reloaded"
        );
        self.publish(tables);
        Ok(())
    }

    /// Rebuilds the tables every `every`, keeping the previous ones when a
    /// reload fails.
    pub fn spawn_reloader(
        &self,
        paths: ReferencePaths,
        route_id: String,
        every: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick fires immediately and the tables are already fresh
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = store.reload(paths.clone(), route_id.clone()).await {
                    let in_service = store.snapshot().loaded_at;
                    error!(
                        error = %e,
                        in_service = %in_service,
                        "Reference reload failed, keeping previous tables"
                    );
                }
            }
        })
    }
}
