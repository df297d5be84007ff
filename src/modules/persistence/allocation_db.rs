use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::{
    millis_to_utc, Allocation, AllocationStatus, ClientIdentity, LeaseStats, SlotSnapshot,
    WorkOutcome,
};

const ALLOCATION_COLUMNS: &str = "id, allocation_key, work_slot_id, work_date, proxy_id, \
     proxy_epoch, client_ip, instance_number, user_folder, status, allocated_at, expires_at, \
     completed_at";

fn map_allocation(row: &Row<'_>) -> rusqlite::Result<Allocation> {
    let status: String = row.get(9)?;
    let status = AllocationStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            rusqlite::types::Type::Text,
            format!("unknown allocation status '{}'", status).into(),
        )
    })?;
    Ok(Allocation {
        id: row.get(0)?,
        allocation_key: row.get(1)?,
        work_slot_id: row.get(2)?,
        work_date: row.get(3)?,
        proxy_id: row.get(4)?,
        proxy_epoch: row.get(5)?,
        client: ClientIdentity {
            client_ip: row.get(6)?,
            instance_number: row.get(7)?,
            user_folder: row.get(8)?,
        },
        status,
        allocated_at: row.get(10)?,
        expires_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

pub struct NewAllocation<'a> {
    pub allocation_key: &'a str,
    pub work_date: NaiveDate,
    pub proxy_id: i64,
    pub proxy_epoch: i64,
    pub client: &'a ClientIdentity,
    pub expires_at: i64,
    pub snapshot: &'a SlotSnapshot,
}

/// Inserts a live lease. A second live lease for the same slot, day and
/// client tuple violates the partial unique index and surfaces as a store error.
pub fn insert_allocation(
    conn: &Connection,
    alloc: &NewAllocation<'_>,
    now: i64,
) -> AppResult<Allocation> {
    conn.execute(
        "INSERT INTO work_allocations
            (allocation_key, work_slot_id, work_date, proxy_id, proxy_epoch, client_ip,
             instance_number, user_folder, status, allocated_at, expires_at, work_slot_snapshot)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'allocated', ?9, ?10, ?11)",
        params![
            alloc.allocation_key,
            alloc.snapshot.id,
            alloc.work_date,
            alloc.proxy_id,
            alloc.proxy_epoch,
            alloc.client.client_ip,
            alloc.client.instance_number,
            alloc.client.user_folder,
            now,
            alloc.expires_at,
            serde_json::to_string(alloc.snapshot)?,
        ],
    )?;
    let id = conn.last_insert_rowid();
    let sql = format!("SELECT {} FROM work_allocations WHERE id = ?1", ALLOCATION_COLUMNS);
    Ok(conn.query_row(&sql, params![id], map_allocation)?)
}

pub fn find_by_key(conn: &Connection, key: &str) -> AppResult<Option<Allocation>> {
    let sql = format!(
        "SELECT {} FROM work_allocations WHERE allocation_key = ?1",
        ALLOCATION_COLUMNS
    );
    Ok(conn.query_row(&sql, params![key], map_allocation).optional()?)
}

pub fn load_snapshot(conn: &Connection, id: i64) -> AppResult<SlotSnapshot> {
    let raw: String = conn.query_row(
        "SELECT work_slot_snapshot FROM work_allocations WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(serde_json::from_str(&raw)?)
}

/// Moves a live lease to `completed`. `false` means it was already terminal.
pub fn mark_completed(conn: &Connection, id: i64, now: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE work_allocations SET status = 'completed', completed_at = ?2
         WHERE id = ?1 AND status = 'allocated'",
        params![id, now],
    )?;
    Ok(changed == 1)
}

pub fn mark_expired(conn: &Connection, id: i64, now: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE work_allocations SET status = 'expired', completed_at = ?2
         WHERE id = ?1 AND status = 'allocated'",
        params![id, now],
    )?;
    Ok(changed == 1)
}

pub fn list_expired(conn: &Connection, now: i64) -> AppResult<Vec<Allocation>> {
    let sql = format!(
        "SELECT {} FROM work_allocations
         WHERE status = 'allocated' AND expires_at < ?1
         ORDER BY expires_at ASC",
        ALLOCATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![now], map_allocation)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Pushes the deadline of a live lease to at least `now + secs`; never shortens it.
pub fn extend_lease(conn: &Connection, key: &str, secs: i64, now: i64) -> AppResult<i64> {
    let target = now.saturating_add(secs.saturating_mul(1000));
    let changed = conn.execute(
        "UPDATE work_allocations SET expires_at = MAX(expires_at, ?2)
         WHERE allocation_key = ?1 AND status = 'allocated'",
        params![key, target],
    )?;
    if changed == 0 {
        return Err(AppError::AllocationNotActive(key.to_string()));
    }
    Ok(conn.query_row(
        "SELECT expires_at FROM work_allocations WHERE allocation_key = ?1",
        params![key],
        |row| row.get(0),
    )?)
}

pub fn insert_work_result(
    conn: &Connection,
    allocation: &Allocation,
    outcome: &WorkOutcome,
    now: i64,
) -> AppResult<i64> {
    // Without a worker report the lease's grant-time settings are what applied.
    let applied = match &outcome.applied_settings {
        Some(settings) => settings.clone(),
        None => load_snapshot(conn, allocation.id)?.settings,
    };
    let applied = serde_json::to_string(&applied)?;
    let block_details = outcome
        .block_info
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO work_results
            (allocation_id, started_at, completed_at, execution_time_ms, client_ip,
             instance_number, user_folder, applied_settings, status, status_code, current_page,
             is_blocked, block_details, performance, products, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            allocation.id,
            outcome.execution.started_at,
            outcome.execution.completed_at,
            outcome.execution.execution_time_ms,
            allocation.client.client_ip,
            outcome
                .execution
                .instance_number
                .unwrap_or(allocation.client.instance_number),
            outcome
                .execution
                .user_folder
                .unwrap_or(allocation.client.user_folder),
            applied,
            outcome.result.status,
            outcome.result.status_code,
            outcome.result.current_page,
            outcome.is_blocked(),
            block_details,
            serde_json::to_string(&outcome.performance)?,
            serde_json::to_string(&outcome.products)?,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub struct ActivityEntry<'a> {
    pub client: &'a ClientIdentity,
    pub allocation_id: Option<i64>,
    pub work_slot_id: Option<i64>,
    pub status: &'a str,
    pub execution_time_ms: Option<i64>,
}

pub fn insert_activity(conn: &Connection, entry: &ActivityEntry<'_>, now: i64) -> AppResult<()> {
    conn.execute(
        "INSERT INTO client_activity_logs
            (client_ip, instance_number, user_folder, allocation_id, work_slot_id, status,
             execution_time_ms, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.client.client_ip,
            entry.client.instance_number,
            entry.client.user_folder,
            entry.allocation_id,
            entry.work_slot_id,
            entry.status,
            entry.execution_time_ms,
            now
        ],
    )?;
    Ok(())
}

pub fn count_activity(conn: &Connection, allocation_id: i64, status: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM client_activity_logs WHERE allocation_id = ?1 AND status = ?2",
        params![allocation_id, status],
        |row| row.get(0),
    )?)
}

/// Records that a client asked for work, tracking the widest instance and
/// folder numbers seen from it.
pub fn touch_client(conn: &Connection, client: &ClientIdentity, now: i64) -> AppResult<()> {
    conn.execute(
        "INSERT INTO clients
            (client_ip, first_seen_at, last_seen_at, total_requests, observed_max_instance,
             observed_max_user_folder)
         VALUES (?1, ?2, ?2, 1, ?3, ?4)
         ON CONFLICT(client_ip) DO UPDATE SET
            last_seen_at = excluded.last_seen_at,
            total_requests = clients.total_requests + 1,
            observed_max_instance = MAX(clients.observed_max_instance, excluded.observed_max_instance),
            observed_max_user_folder =
                MAX(clients.observed_max_user_folder, excluded.observed_max_user_folder)",
        params![
            client.client_ip,
            now,
            client.instance_number,
            client.user_folder
        ],
    )?;
    Ok(())
}

/// Lease counters over allocations dated `today` or the day before.
pub fn lease_stats(conn: &Connection, today: NaiveDate, now: i64) -> AppResult<LeaseStats> {
    let since = today.pred_opt().unwrap_or(today);
    let (active, expired_total, expired_today, pending_timeout, next_timeout) = conn.query_row(
        "SELECT
            COALESCE(SUM(status = 'allocated'), 0),
            COALESCE(SUM(status = 'expired'), 0),
            COALESCE(SUM(status = 'expired' AND work_date = ?1), 0),
            COALESCE(SUM(status = 'allocated' AND expires_at < ?3), 0),
            MIN(CASE WHEN status = 'allocated' THEN expires_at END)
         FROM work_allocations
         WHERE work_date >= ?2",
        params![today, since, now],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        },
    )?;
    Ok(LeaseStats {
        active,
        expired_total,
        expired_today,
        pending_timeout,
        next_timeout: next_timeout.map(millis_to_utc),
    })
}
