//! Runtime configuration.
//!
//! [`Settings`] is the command line / environment surface. Everything the core
//! needs is collapsed into a [`TrackerConfig`] which is passed explicitly to
//! the loader, fetcher and pipeline.

use anyhow::{Result, bail};
use chrono::TimeDelta;
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ROUTE_ID: &str = "100162";
pub const DEFAULT_FEED_URL: &str =
    "https://s3.amazonaws.com/kcm-alerts-realtime-prod/vehiclepositions_pb.json";

/// The route being tracked and how recent a report must be to count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub route_id: String,
    pub freshness: TimeDelta,
}

impl RouteConfig {
    pub fn new(route_id: impl Into<String>, freshness: TimeDelta) -> Self {
        Self {
            route_id: route_id.into(),
            freshness,
        }
    }
}

/// Locations of the static GTFS tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePaths {
    pub trips: PathBuf,
    pub stops: PathBuf,
}

/// How the reference tables are kept up to date while serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadPolicy {
    /// Load once at startup.
    Never,
    /// Rebuild in the background on a fixed interval.
    Every(Duration),
    /// Load inside every request.
    PerRequest,
}

/// Core configuration shared by every stage.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub route: RouteConfig,
    pub feed_url: String,
    pub references: ReferencePaths,
    pub reload: ReloadPolicy,
}

/// Settings for the tracker, read from flags or the environment.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// GTFS route_id to track
    #[arg(long, env = "ROUTE_ID", default_value = DEFAULT_ROUTE_ID)]
    pub route_id: String,

    /// JSON vehicle position feed
    #[arg(long, env = "FEED_URL", default_value = DEFAULT_FEED_URL)]
    pub feed_url: String,

    /// Maximum age in seconds of a position report for a bus to be active
    #[arg(long, env = "FRESHNESS_SECS", default_value_t = 600)]
    pub freshness_secs: u64,

    /// Path to the GTFS trips table
    #[arg(long = "trips", env = "TRIPS_PATH", default_value = "trips.txt")]
    pub trips_path: PathBuf,

    /// Path to the GTFS stops table
    #[arg(long = "stops", env = "STOPS_PATH", default_value = "stops.txt")]
    pub stops_path: PathBuf,

    /// Overall timeout in seconds for the feed request
    #[arg(long, env = "FEED_TIMEOUT_SECS", default_value_t = 30)]
    pub feed_timeout_secs: u64,

    /// Rebuild the reference tables every N seconds (0 = never)
    #[arg(long, env = "REFERENCE_RELOAD_SECS", default_value_t = 0)]
    pub reference_reload_secs: u64,

    /// Load the reference tables on every request instead of caching them
    #[arg(long, default_value_t = false, conflicts_with = "reference_reload_secs")]
    pub reload_per_request: bool,
}

impl Settings {
    /// Builds the core configuration, rejecting values the pipeline cannot use.
    pub fn tracker_config(&self) -> Result<TrackerConfig> {
        if self.route_id.trim().is_empty() {
            bail!("route id must not be empty");
        }
        if self.freshness_secs == 0 {
            bail!("freshness window must be at least one second");
        }
        let Ok(secs) = i64::try_from(self.freshness_secs) else {
            bail!("freshness window of {}s is too large", self.freshness_secs);
        };
        let Some(freshness) = TimeDelta::try_seconds(secs) else {
            bail!("freshness window of {}s is too large", self.freshness_secs);
        };

        let reload = if self.reload_per_request {
            ReloadPolicy::PerRequest
        } else if self.reference_reload_secs > 0 {
            ReloadPolicy::Every(Duration::from_secs(self.reference_reload_secs))
        } else {
            ReloadPolicy::Never
        };

        Ok(TrackerConfig {
            route: RouteConfig::new(self.route_id.trim(), freshness),
            feed_url: self.feed_url.clone(),
            references: ReferencePaths {
                trips: self.trips_path.clone(),
                stops: self.stops_path.clone(),
            },
            reload,
        })
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }
}

/// Settings only the HTTP server needs.
#[derive(Args, Debug, Clone)]
pub struct ServerSettings {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Directory served under /static
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Landing page served at /
    #[arg(long, env = "INDEX_FILE", default_value = "index.html")]
    pub index_file: PathBuf,
}
