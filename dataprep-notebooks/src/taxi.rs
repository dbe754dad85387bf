//! NYC yellow taxi trips, January 2023

use anyhow::Context;

use dataprep_core::{
    col, lit, ExecutionPolicy, FileFormat, JoinKind, LazyQuery, Reducer, Result, SortKey,
};
use dataprep_duckdb::open_session;
use dataprep_readers::{FetchRequest, Fetcher, Loader};

use crate::{show, NotebookConfig};

/// One month of yellow cab trips
pub const TRIPS_URL: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data/yellow_tripdata_2023-01.parquet";

/// Taxi zone lookup table
pub const ZONES_URL: &str = "https://d37ci6vzurychx.cloudfront.net/misc/taxi_zone_lookup.csv";

/// Trip count and average fare and distance per pickup borough, busiest first
pub fn trips_by_borough(trips: &LazyQuery, zones: &LazyQuery) -> Result<LazyQuery> {
    trips
        .join(zones, &[("PULocationID", "LocationID")], JoinKind::Left)?
        .aggregate(
            &["Borough"],
            vec![
                Reducer::count("trips"),
                Reducer::mean("fare_amount", "mean_fare"),
                Reducer::mean("trip_distance", "mean_distance"),
            ],
        )?
        .sort(vec![SortKey::desc("trips"), SortKey::asc("Borough")])
}

/// Trips with more than four passengers that left a tip, largest tip first
pub fn generous_groups(trips: &LazyQuery) -> Result<LazyQuery> {
    trips
        .filter(col("passenger_count").gt(lit(4)).and(col("tip_amount").gt(lit(0.0))))?
        .mutate("tip_share", col("tip_amount") / col("total_amount"))?
        .select(&["tpep_pickup_datetime", "passenger_count", "tip_amount", "tip_share"])?
        .sort(vec![SortKey::desc("tip_amount")])
}

/// Pickups per hour of day
pub fn hourly_pickups_sql(table: &str) -> String {
    format!(
        "SELECT hour(\"tpep_pickup_datetime\") AS \"hour\", COUNT(*) AS \"trips\" \
         FROM \"{table}\" GROUP BY 1 ORDER BY 1"
    )
}

/// Download, load and explore the taxi data
pub fn run(config: &NotebookConfig) -> anyhow::Result<()> {
    let taxi_dir = config.data_dir.join("taxi");
    let requests = [
        FetchRequest::new(TRIPS_URL, taxi_dir.join("yellow_tripdata_2023-01.parquet")),
        FetchRequest::new(ZONES_URL, taxi_dir.join("taxi_zone_lookup.csv")),
    ];

    let fetcher = Fetcher::http(&config.fetch)?;
    #[cfg(feature = "parallel")]
    let paths = fetcher.fetch_all_parallel(&requests);
    #[cfg(not(feature = "parallel"))]
    let paths = fetcher.fetch_all(&requests);
    let paths = paths.context("downloading taxi data")?;

    let loader = Loader::new(config.csv);
    let trips = loader.load(&paths[0], FileFormat::Parquet)?;
    let zones = loader.load(&paths[1], FileFormat::Csv)?;

    let session = open_session(config.session.clone())?;
    let preview_rows = config.session.preview_rows;

    let trip_table = session.table(&trips)?;
    show("Trips", &trip_table.preview(preview_rows)?);

    let zone_table = session.table(&zones)?;
    show("Trips by pickup borough", &trips_by_borough(&trip_table, &zone_table)?.collect()?);
    show("Generous groups", &generous_groups(&trip_table)?.preview(preview_rows)?);
    show("Pickups per hour", &session.sql(&hourly_pickups_sql(trips.name()))?);

    // The zone table is small enough to keep materialized.
    let eager_zones = zone_table.with_policy(ExecutionPolicy::Eager)?;
    let manhattan = eager_zones.filter(col("Borough").eq(lit("Manhattan")))?;
    show("Manhattan zones", &manhattan.preview(preview_rows)?);
    Ok(())
}
