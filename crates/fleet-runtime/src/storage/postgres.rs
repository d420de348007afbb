//! PostgreSQL persistence
//!
//! Tables:
//! - location_samples: raw position history
//! - fuel_events: submitted fills (written by the surrounding CRUD layer)
//! - safety_events, fuel_alerts, geofence_alerts, route_deviations: detector output
//! - geofences, vehicles, trips: read-only reference data

use super::{TelemetryStore, TimeRange};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::{
    FuelAlert, FuelEvent, FuelStatus, GeoPoint, Geofence, GeofenceAlert, GeofenceShape,
    LocationSample, RouteDeviation, SafetyEvent, TimeWindow, TripPlan, ZoneKind,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};

fn storage_err(context: &str) -> impl Fn(sqlx::Error) -> RuntimeError + '_ {
    move |e| RuntimeError::Storage(format!("{}: {}", context, e))
}

/// Parse a SCREAMING_SNAKE / lowercase enum stored as text
fn parse_text_enum<T: serde::de::DeserializeOwned>(value: &str, column: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|e| RuntimeError::Storage(format!("invalid {} '{}': {}", column, value, e)))
}

/// [`TelemetryStore`] backed by a PostgreSQL pool
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a bounded pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        tracing::info!("Connecting telemetry store (max_connections={})", max_connections);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(storage_err("failed to connect"))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn sample_from_row(row: &PgRow) -> Result<LocationSample> {
        let err = storage_err("failed to decode location sample");
        Ok(LocationSample {
            vehicle_id: row.try_get("vehicle_id").map_err(&err)?,
            driver_id: row.try_get("driver_id").map_err(&err)?,
            trip_id: row.try_get("trip_id").map_err(&err)?,
            latitude: row.try_get("latitude").map_err(&err)?,
            longitude: row.try_get("longitude").map_err(&err)?,
            speed: row.try_get("speed").map_err(&err)?,
            heading: row.try_get("heading").map_err(&err)?,
            accuracy: row.try_get("accuracy").map_err(&err)?,
            captured_at: row.try_get("captured_at").map_err(&err)?,
            received_at: row.try_get("received_at").map_err(&err)?,
            source: row.try_get("source").map_err(&err)?,
        })
    }

    fn fuel_event_from_row(row: &PgRow) -> Result<FuelEvent> {
        let err = storage_err("failed to decode fuel event");
        let status: String = row.try_get("status").map_err(&err)?;
        Ok(FuelEvent {
            id: row.try_get("id").map_err(&err)?,
            vehicle_id: row.try_get("vehicle_id").map_err(&err)?,
            driver_id: row.try_get("driver_id").map_err(&err)?,
            liters: row.try_get("liters").map_err(&err)?,
            amount: row.try_get("amount").map_err(&err)?,
            odometer: row.try_get("odometer").map_err(&err)?,
            latitude: row.try_get("latitude").map_err(&err)?,
            longitude: row.try_get("longitude").map_err(&err)?,
            station_id: row.try_get("station_id").map_err(&err)?,
            captured_at: row.try_get("captured_at").map_err(&err)?,
            fraud_score: row.try_get("fraud_score").map_err(&err)?,
            fraud_reason: row.try_get("fraud_reason").map_err(&err)?,
            status: parse_text_enum::<FuelStatus>(&status, "status")?,
        })
    }

    fn geofence_from_row(row: &PgRow) -> Result<Geofence> {
        let err = storage_err("failed to decode geofence");
        let shape: String = row.try_get("shape").map_err(&err)?;
        let zone: String = row.try_get("zone").map_err(&err)?;
        let time_window: Option<Json<TimeWindow>> = row.try_get("time_window").map_err(&err)?;
        Ok(Geofence {
            id: row.try_get("id").map_err(&err)?,
            name: row.try_get("name").map_err(&err)?,
            shape: parse_text_enum::<GeofenceShape>(&shape, "shape")?,
            coordinates: row.try_get("coordinates").map_err(&err)?,
            zone: parse_text_enum::<ZoneKind>(&zone, "zone")?,
            active: row.try_get("active").map_err(&err)?,
            vehicle_ids: row.try_get("vehicle_ids").map_err(&err)?,
            time_window: time_window.map(|w| w.0),
        })
    }
}

#[async_trait]
impl TelemetryStore for PostgresStore {
    async fn insert_locations(&self, samples: &[LocationSample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO location_samples (vehicle_id, driver_id, trip_id, latitude, longitude, \
             speed, heading, accuracy, captured_at, received_at, source) ",
        );
        builder.push_values(samples, |mut row, s| {
            row.push_bind(&s.vehicle_id)
                .push_bind(&s.driver_id)
                .push_bind(&s.trip_id)
                .push_bind(s.latitude)
                .push_bind(s.longitude)
                .push_bind(s.speed)
                .push_bind(s.heading)
                .push_bind(s.accuracy)
                .push_bind(s.captured_at)
                .push_bind(s.received_at)
                .push_bind(&s.source);
        });

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(storage_err("failed to insert location batch"))?;

        tracing::debug!("Inserted {} location samples", result.rows_affected());
        Ok(())
    }

    async fn recent_locations(
        &self,
        vehicle_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<LocationSample>> {
        let rows = sqlx::query(
            r#"
            SELECT vehicle_id, driver_id, trip_id, latitude, longitude, speed, heading,
                   accuracy, captured_at, received_at, source
            FROM location_samples
            WHERE vehicle_id = $1 AND captured_at >= $2 AND captured_at < $3
            ORDER BY captured_at DESC
            LIMIT $4
            "#,
        )
        .bind(vehicle_id)
        .bind(range.start)
        .bind(range.end)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err("failed to query recent locations"))?;

        rows.iter().map(Self::sample_from_row).collect()
    }

    async fn slow_run_start(
        &self,
        vehicle_id: &str,
        max_speed: f64,
        range: TimeRange,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MIN(captured_at) AS run_start
            FROM location_samples
            WHERE vehicle_id = $1 AND captured_at >= $3 AND captured_at < $4
              AND captured_at > COALESCE(
                  (SELECT MAX(captured_at) FROM location_samples
                   WHERE vehicle_id = $1 AND captured_at >= $3 AND captured_at < $4 AND speed > $2),
                  '-infinity'::timestamptz)
            "#,
        )
        .bind(vehicle_id)
        .bind(max_speed)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err("failed to query idle run start"))?;

        row.try_get("run_start")
            .map_err(storage_err("failed to decode idle run start"))
    }

    async fn fuel_events(&self, vehicle_id: &str, range: TimeRange) -> Result<Vec<FuelEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vehicle_id, driver_id, liters, amount, odometer, latitude, longitude,
                   station_id, captured_at, fraud_score, fraud_reason, status
            FROM fuel_events
            WHERE vehicle_id = $1 AND captured_at >= $2 AND captured_at < $3
            ORDER BY captured_at ASC
            "#,
        )
        .bind(vehicle_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err("failed to query fuel events"))?;

        rows.iter().map(Self::fuel_event_from_row).collect()
    }

    async fn insert_safety_event(&self, event: &SafetyEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO safety_events (
                id, vehicle_id, driver_id, trip_id, kind, severity, value, threshold,
                unit, latitude, longitude, occurred_at, details
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(event.id)
        .bind(&event.vehicle_id)
        .bind(&event.driver_id)
        .bind(&event.trip_id)
        .bind(event.kind.as_str())
        .bind(event.severity.as_str())
        .bind(event.value)
        .bind(event.threshold)
        .bind(&event.unit)
        .bind(event.location.lat)
        .bind(event.location.lon)
        .bind(event.timestamp)
        .bind(&event.details)
        .execute(&self.pool)
        .await
        .map_err(storage_err("failed to insert safety event"))?;
        Ok(())
    }

    async fn insert_fuel_alert(&self, alert: &FuelAlert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fuel_alerts (
                id, fuel_event_id, vehicle_id, driver_id, score, reason, warnings, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(alert.id)
        .bind(&alert.fuel_event_id)
        .bind(&alert.vehicle_id)
        .bind(&alert.driver_id)
        .bind(alert.score)
        .bind(&alert.reason)
        .bind(&alert.warnings)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err("failed to insert fuel alert"))?;
        Ok(())
    }

    async fn insert_geofence_alert(&self, alert: &GeofenceAlert) -> Result<()> {
        let transition = serde_json::to_value(alert.transition)?;
        sqlx::query(
            r#"
            INSERT INTO geofence_alerts (
                id, vehicle_id, geofence_id, geofence_name, transition, latitude, longitude, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(alert.id)
        .bind(&alert.vehicle_id)
        .bind(&alert.geofence_id)
        .bind(&alert.geofence_name)
        .bind(transition.as_str().unwrap_or_default())
        .bind(alert.location.lat)
        .bind(alert.location.lon)
        .bind(alert.timestamp)
        .execute(&self.pool)
        .await
        .map_err(storage_err("failed to insert geofence alert"))?;
        Ok(())
    }

    async fn insert_route_deviation(&self, deviation: &RouteDeviation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO route_deviations (
                id, vehicle_id, trip_id, distance_m, threshold_m, latitude, longitude, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(deviation.id)
        .bind(&deviation.vehicle_id)
        .bind(&deviation.trip_id)
        .bind(deviation.distance_m)
        .bind(deviation.threshold_m)
        .bind(deviation.location.lat)
        .bind(deviation.location.lon)
        .bind(deviation.timestamp)
        .execute(&self.pool)
        .await
        .map_err(storage_err("failed to insert route deviation"))?;
        Ok(())
    }

    async fn active_geofences(&self) -> Result<Vec<Geofence>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, shape, coordinates, zone, active, vehicle_ids, time_window
            FROM geofences
            WHERE active = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err("failed to load geofences"))?;

        rows.iter().map(Self::geofence_from_row).collect()
    }

    async fn tank_capacity(&self, vehicle_id: &str) -> Result<Option<f64>> {
        let row = sqlx::query("SELECT tank_capacity FROM vehicles WHERE id = $1")
            .bind(vehicle_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("failed to read tank capacity"))?;

        match row {
            Some(row) => row
                .try_get::<Option<f64>, _>("tank_capacity")
                .map_err(storage_err("failed to decode tank capacity")),
            None => Ok(None),
        }
    }

    async fn last_odometer(&self, vehicle_id: &str, before: DateTime<Utc>) -> Result<Option<f64>> {
        let row = sqlx::query(
            r#"
            SELECT odometer FROM fuel_events
            WHERE vehicle_id = $1 AND captured_at < $2 AND odometer IS NOT NULL
            ORDER BY captured_at DESC
            LIMIT 1
            "#,
        )
        .bind(vehicle_id)
        .bind(before)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err("failed to read last odometer"))?;

        match row {
            Some(row) => row
                .try_get::<Option<f64>, _>("odometer")
                .map_err(storage_err("failed to decode odometer")),
            None => Ok(None),
        }
    }

    async fn active_trip_plan(&self, vehicle_id: &str) -> Result<Option<TripPlan>> {
        let row = sqlx::query(
            r#"
            SELECT id, vehicle_id, destination_lat, destination_lon, planned_path
            FROM trips
            WHERE vehicle_id = $1 AND status = 'active'
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err("failed to read active trip"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let err = storage_err("failed to decode trip");
        let path: Option<Json<Vec<GeoPoint>>> = row.try_get("planned_path").map_err(&err)?;
        Ok(Some(TripPlan {
            trip_id: row.try_get("id").map_err(&err)?,
            vehicle_id: row.try_get("vehicle_id").map_err(&err)?,
            destination: GeoPoint::new(
                row.try_get("destination_lat").map_err(&err)?,
                row.try_get("destination_lon").map_err(&err)?,
            ),
            path: path.map(|p| p.0).unwrap_or_default(),
        }))
    }
}
