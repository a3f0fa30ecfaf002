//! Integration tests for the dispatch repositories.
//!
//! Run against a real database; `DATABASE_URL` must point at a server the
//! test harness can create scratch databases on.

use chrono::Utc;
use sqlx::PgPool;
use towtruck_core::accident::AccidentStatus;
use towtruck_core::types::DbId;
use towtruck_db::models::audit::CreateAuditLog;
use towtruck_db::repositories::{AccidentRepo, AuditLogRepo, DriverRepo, EventRepo, StationRepo};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn insert_station(pool: &PgPool, name: &str) -> DbId {
    sqlx::query_scalar("INSERT INTO stations (name, location) VALUES ($1, 'Depot Rd') RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn insert_account(pool: &PgPool, username: &str, kind: &str, station_id: Option<DbId>) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO user_accounts (username, kind, station_id) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(username)
    .bind(kind)
    .bind(station_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_accident(pool: &PgPool, station_id: DbId, reporter: DbId, minutes_ago: i64) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO accidents (reported_by, station_id, location, date_reported) \
         VALUES ($1, $2, 'Route 9', NOW() - make_interval(mins => $3::int)) RETURNING id",
    )
    .bind(reporter)
    .bind(station_id)
    .bind(minutes_ago as i32)
    .fetch_one(pool)
    .await
    .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_status_lookup_is_seeded(pool: PgPool) {
    towtruck_db::health_check(&pool).await.unwrap();

    let names: Vec<(i16, String)> = sqlx::query_as("SELECT id, name FROM accident_statuses ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();

    let expected: Vec<(i16, String)> = AccidentStatus::ALL
        .iter()
        .map(|s| (s.id(), s.as_str().to_string()))
        .collect();
    assert_eq!(names, expected);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_backlog_is_oldest_first(pool: PgPool) {
    let station = insert_station(&pool, "North").await;
    let hq = insert_account(&pool, "hq", "HQ_EMPLOYEE", None).await;
    let newer = insert_accident(&pool, station, hq, 1).await;
    let older = insert_accident(&pool, station, hq, 10).await;

    let backlog: Vec<DbId> = AccidentRepo::list_backlog(&pool, station)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.id)
        .collect();

    assert_eq!(backlog, vec![older, newer]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_assignment_round_trips_through_update(pool: PgPool) {
    let station = insert_station(&pool, "North").await;
    let hq = insert_account(&pool, "hq", "HQ_EMPLOYEE", None).await;
    let driver_id = insert_account(&pool, "dave", "DRIVER", Some(station)).await;
    let accident_id = insert_accident(&pool, station, hq, 0).await;

    let mut accident = AccidentRepo::find_by_id(&pool, accident_id)
        .await
        .unwrap()
        .unwrap()
        .into_domain()
        .unwrap();
    accident.assign(driver_id, Utc::now());
    let saved = AccidentRepo::update(&pool, &accident).await.unwrap().unwrap();
    assert_eq!(saved.assigned_to, Some(driver_id));

    let mut driver = DriverRepo::find_by_id(&pool, driver_id)
        .await
        .unwrap()
        .unwrap()
        .into_domain()
        .unwrap();
    driver.on_duty = true;
    let saved = DriverRepo::update(&pool, &driver).await.unwrap().unwrap();
    assert!(saved.is_on_duty);

    assert!(AccidentRepo::list_backlog(&pool, station).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_station_listing_skips_hq_accounts(pool: PgPool) {
    let station = insert_station(&pool, "North").await;
    insert_account(&pool, "hq", "HQ_EMPLOYEE", Some(station)).await;
    let driver = insert_account(&pool, "dave", "DRIVER", Some(station)).await;

    let drivers = DriverRepo::list_by_station(&pool, station).await.unwrap();

    assert_eq!(drivers.len(), 1);
    assert_eq!(drivers[0].id, driver);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_deleting_station_detaches_drivers_and_drops_history(pool: PgPool) {
    let station = insert_station(&pool, "North").await;
    let other = insert_station(&pool, "South").await;
    let driver = insert_account(&pool, "dave", "DRIVER", Some(station)).await;
    let closed = insert_accident(&pool, station, driver, 30).await;
    sqlx::query("UPDATE accidents SET status_id = 4 WHERE id = $1")
        .bind(closed)
        .execute(&pool)
        .await
        .unwrap();
    let elsewhere = insert_accident(&pool, other, driver, 5).await;

    assert!(StationRepo::delete(&pool, station).await.unwrap());

    let row = DriverRepo::find_by_id(&pool, driver).await.unwrap().unwrap();
    assert_eq!(row.station_id, None);
    assert!(AccidentRepo::find_by_id(&pool, closed).await.unwrap().is_none());
    assert!(AccidentRepo::find_by_id(&pool, elsewhere).await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_audit_rows_link_to_event(pool: PgPool) {
    let event_type = EventRepo::get_event_type_by_name(&pool, "accident.assigned")
        .await
        .unwrap()
        .expect("seeded event type");
    let event_id = EventRepo::insert(&pool, event_type.id, Some(1), Some(2), Some(3), &serde_json::json!({}))
        .await
        .unwrap();

    let entry = CreateAuditLog {
        event_id: Some(event_id),
        change_type: "UPDATE".into(),
        entity_type: "accident".into(),
        entity_id: 2,
        field: "assigned_to".into(),
        old_value: None,
        new_value: Some("3".into()),
        integrity_hash: "abc".into(),
    };
    AuditLogRepo::batch_insert(&pool, &[entry]).await.unwrap();

    assert_eq!(AuditLogRepo::find_last_hash(&pool).await.unwrap().as_deref(), Some("abc"));
    let history = AuditLogRepo::list_for_entity(&pool, "accident", 2).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_id, Some(event_id));
}
