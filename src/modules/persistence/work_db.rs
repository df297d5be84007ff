use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::db::json_column;
use crate::error::{AppError, AppResult};
use crate::models::{
    ClientIdentity, DailyTracking, NewWorkSlot, SlotSettings, SlotSettingsPatch, WorkSlot,
    WorkSlotSummary,
};

const SLOT_COLUMNS: &str =
    "id, keyword, code, start_date, end_date, daily_target, priority, is_active, settings";

const SLOT_COLUMNS_QUALIFIED: &str = "s.id, s.keyword, s.code, s.start_date, s.end_date, \
     s.daily_target, s.priority, s.is_active, s.settings";

fn map_slot(row: &Row<'_>) -> rusqlite::Result<WorkSlot> {
    let raw_settings: String = row.get(8)?;
    Ok(WorkSlot {
        id: row.get(0)?,
        keyword: row.get(1)?,
        code: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        daily_target: row.get(5)?,
        priority: row.get(6)?,
        is_active: row.get(7)?,
        settings: json_column(8, &raw_settings)?,
    })
}

fn map_tracking(row: &Row<'_>) -> rusqlite::Result<DailyTracking> {
    Ok(DailyTracking {
        work_slot_id: row.get(0)?,
        work_date: row.get(1)?,
        target_count: row.get(2)?,
        allocated_count: row.get(3)?,
        completed_count: row.get(4)?,
        failed_count: row.get(5)?,
    })
}

pub fn create_work_slot(conn: &Connection, slot: &NewWorkSlot, now: i64) -> AppResult<WorkSlot> {
    if slot.keyword.trim().is_empty() {
        return Err(AppError::InvalidRequest("keyword must not be empty".into()));
    }
    if slot.end_date < slot.start_date {
        return Err(AppError::InvalidRequest(
            "end_date must not precede start_date".into(),
        ));
    }
    if slot.daily_target < 1 {
        return Err(AppError::InvalidRequest(
            "daily_target must be at least 1".into(),
        ));
    }
    let settings = serde_json::to_string(&slot.settings)?;
    conn.execute(
        "INSERT INTO work_slots
            (keyword, code, start_date, end_date, daily_target, priority, is_active, settings,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, ?8)",
        params![
            slot.keyword.trim(),
            slot.code,
            slot.start_date,
            slot.end_date,
            slot.daily_target,
            slot.priority,
            settings,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_work_slot(conn, id)?.ok_or_else(|| AppError::NotFound(format!("work slot {}", id)))
}

pub fn get_work_slot(conn: &Connection, id: i64) -> AppResult<Option<WorkSlot>> {
    let sql = format!("SELECT {} FROM work_slots WHERE id = ?1", SLOT_COLUMNS);
    Ok(conn.query_row(&sql, params![id], map_slot).optional()?)
}

pub fn get_tracking(
    conn: &Connection,
    slot_id: i64,
    date: NaiveDate,
) -> AppResult<Option<DailyTracking>> {
    Ok(conn
        .query_row(
            "SELECT work_slot_id, work_date, target_count, allocated_count, completed_count,
                    failed_count
             FROM daily_work_tracking WHERE work_slot_id = ?1 AND work_date = ?2",
            params![slot_id, date],
            map_tracking,
        )
        .optional()?)
}

/// Every slot, newest first, joined with its counters for `date`.
pub fn list_work_slot_summaries(
    conn: &Connection,
    date: NaiveDate,
) -> AppResult<Vec<WorkSlotSummary>> {
    let sql = format!("SELECT {} FROM work_slots ORDER BY id DESC", SLOT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let slots = stmt
        .query_map([], map_slot)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut summaries = Vec::with_capacity(slots.len());
    for slot in slots {
        let tracking = get_tracking(conn, slot.id, date)?;
        let completion_rate = tracking
            .as_ref()
            .filter(|t| t.target_count > 0)
            .map(|t| {
                let pct = t.completed_count as f64 / t.target_count as f64 * 100.0;
                (pct * 100.0).round() / 100.0
            })
            .unwrap_or(0.0);
        let status = slot.phase_on(date);
        summaries.push(WorkSlotSummary {
            slot,
            tracking,
            completion_rate,
            status,
        });
    }
    Ok(summaries)
}

pub fn update_slot_settings(
    conn: &Connection,
    id: i64,
    patch: &SlotSettingsPatch,
    now: i64,
) -> AppResult<SlotSettings> {
    if patch.is_empty() {
        return Err(AppError::InvalidRequest(
            "no recognised settings in request".into(),
        ));
    }
    let mut slot =
        get_work_slot(conn, id)?.ok_or_else(|| AppError::NotFound(format!("work slot {}", id)))?;
    patch.apply(&mut slot.settings);
    conn.execute(
        "UPDATE work_slots SET settings = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, serde_json::to_string(&slot.settings)?, now],
    )?;
    Ok(slot.settings)
}

/// Creates missing tracking rows for every active slot whose window covers
/// `date`. Returns how many tracking rows exist for `date` afterwards.
pub fn init_daily_tracking(conn: &Connection, date: NaiveDate) -> AppResult<i64> {
    let created = conn.execute(
        "INSERT OR IGNORE INTO daily_work_tracking (work_slot_id, work_date, target_count)
         SELECT id, ?1, daily_target FROM work_slots
         WHERE is_active = 1 AND start_date <= ?1 AND end_date >= ?1",
        params![date],
    )?;
    if created > 0 {
        tracing::debug!("Initialized {} daily tracking rows for {}", created, date);
    }
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM daily_work_tracking WHERE work_date = ?1",
        params![date],
        |row| row.get(0),
    )?)
}

/// Picks the least-filled in-window slot with remaining quota that this exact
/// client tuple does not already hold a live lease on. Ties break on priority
/// (lower first) and then randomly.
pub fn pick_available_slot(
    conn: &Connection,
    date: NaiveDate,
    client: &ClientIdentity,
) -> AppResult<Option<WorkSlot>> {
    let sql = format!(
        "SELECT {} FROM work_slots s
         JOIN daily_work_tracking t ON t.work_slot_id = s.id AND t.work_date = ?1
         WHERE s.is_active = 1
           AND s.start_date <= ?1 AND s.end_date >= ?1
           AND t.allocated_count < t.target_count
           AND NOT EXISTS (
               SELECT 1 FROM work_allocations a
               WHERE a.work_slot_id = s.id AND a.work_date = ?1
                 AND a.client_ip = ?2 AND a.instance_number = ?3 AND a.user_folder = ?4
                 AND a.status = 'allocated'
           )
         ORDER BY CAST(t.allocated_count AS REAL) / MAX(t.target_count, 1) ASC,
                  s.priority ASC,
                  RANDOM()
         LIMIT 1",
        SLOT_COLUMNS_QUALIFIED
    );
    Ok(conn
        .query_row(
            &sql,
            params![date, client.client_ip, client.instance_number, client.user_folder],
            map_slot,
        )
        .optional()?)
}

/// Takes one unit of the day's quota. Returns `false` when the quota is gone.
pub fn reserve_slot(conn: &Connection, slot_id: i64, date: NaiveDate, now: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE daily_work_tracking
         SET allocated_count = allocated_count + 1,
             first_allocation_at = COALESCE(first_allocation_at, ?3),
             last_allocation_at = ?3
         WHERE work_slot_id = ?1 AND work_date = ?2 AND allocated_count < target_count",
        params![slot_id, date, now],
    )?;
    Ok(changed == 1)
}

pub fn record_slot_outcome(
    conn: &Connection,
    slot_id: i64,
    date: NaiveDate,
    success: bool,
) -> AppResult<()> {
    let sql = if success {
        "UPDATE daily_work_tracking SET completed_count = completed_count + 1
         WHERE work_slot_id = ?1 AND work_date = ?2"
    } else {
        "UPDATE daily_work_tracking SET failed_count = failed_count + 1
         WHERE work_slot_id = ?1 AND work_date = ?2"
    };
    conn.execute(sql, params![slot_id, date])?;
    Ok(())
}

/// Returns a reserved unit after a lease timed out and counts it as failed.
pub fn release_slot(conn: &Connection, slot_id: i64, date: NaiveDate) -> AppResult<()> {
    conn.execute(
        "UPDATE daily_work_tracking
         SET allocated_count = MAX(allocated_count - 1, 0),
             failed_count = failed_count + 1
         WHERE work_slot_id = ?1 AND work_date = ?2",
        params![slot_id, date],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::persistence::db::temp_store;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    pub(crate) fn new_slot(keyword: &str, target: i64, priority: i64) -> NewWorkSlot {
        NewWorkSlot {
            keyword: keyword.into(),
            code: None,
            start_date: day(1),
            end_date: day(31),
            daily_target: target,
            priority,
            settings: SlotSettings::default(),
        }
    }

    #[test]
    fn create_rejects_inverted_window() {
        let (_dir, store) = temp_store();
        let mut slot = new_slot("k", 5, 0);
        slot.end_date = day(1);
        slot.start_date = day(2);
        let err = store.write(|tx| create_work_slot(tx, &slot, 0)).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn init_daily_only_covers_active_in_window_slots() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                create_work_slot(tx, &new_slot("a", 5, 0), 0)?;
                let paused = create_work_slot(tx, &new_slot("b", 5, 0), 0)?;
                tx.execute(
                    "UPDATE work_slots SET is_active = 0 WHERE id = ?1",
                    params![paused.id],
                )?;
                let mut later = new_slot("c", 5, 0);
                later.start_date = day(20);
                create_work_slot(tx, &later, 0)?;
                assert_eq!(init_daily_tracking(tx, day(10))?, 1);
                assert_eq!(init_daily_tracking(tx, day(10))?, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn pick_prefers_lowest_fill_ratio_then_priority() {
        let (_dir, store) = temp_store();
        let client = ClientIdentity::new("10.1.1.1", 1, 1);
        store
            .write(|tx| {
                let busy = create_work_slot(tx, &new_slot("busy", 10, 0), 0)?;
                let low = create_work_slot(tx, &new_slot("low", 10, 5), 0)?;
                let high = create_work_slot(tx, &new_slot("high", 10, 1), 0)?;
                init_daily_tracking(tx, day(3))?;
                assert!(reserve_slot(tx, busy.id, day(3), 1)?);
                let picked = pick_available_slot(tx, day(3), &client)?.expect("slot");
                assert_eq!(picked.id, high.id);
                assert!(reserve_slot(tx, high.id, day(3), 2)?);
                let picked = pick_available_slot(tx, day(3), &client)?.expect("slot");
                assert_eq!(picked.id, low.id);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn reserve_never_exceeds_target_and_release_floors() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let slot = create_work_slot(tx, &new_slot("one", 1, 0), 0)?;
                init_daily_tracking(tx, day(4))?;
                assert!(reserve_slot(tx, slot.id, day(4), 1)?);
                assert!(!reserve_slot(tx, slot.id, day(4), 2)?);
                let client = ClientIdentity::new("10.1.1.1", 1, 1);
                assert!(pick_available_slot(tx, day(4), &client)?.is_none());
                release_slot(tx, slot.id, day(4))?;
                release_slot(tx, slot.id, day(4))?;
                let t = get_tracking(tx, slot.id, day(4))?.expect("tracking");
                assert_eq!(t.allocated_count, 0);
                assert_eq!(t.failed_count, 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn summaries_report_rate_and_phase() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let slot = create_work_slot(tx, &new_slot("rate", 3, 0), 0)?;
                init_daily_tracking(tx, day(5))?;
                record_slot_outcome(tx, slot.id, day(5), true)?;
                record_slot_outcome(tx, slot.id, day(5), false)?;
                let list = list_work_slot_summaries(tx, day(5))?;
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].completion_rate, 33.33);
                assert_eq!(list[0].tracking.as_ref().map(|t| t.failed_count), Some(1));
                assert_eq!(
                    list_work_slot_summaries(tx, NaiveDate::from_ymd_opt(2026, 4, 2).unwrap())?[0]
                        .status,
                    crate::models::SlotPhase::Expired
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn settings_patch_persists_and_rejects_empty() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let slot = create_work_slot(tx, &new_slot("s", 3, 0), 0)?;
                let patch = SlotSettingsPatch {
                    block_mercury: Some(true),
                    ..Default::default()
                };
                let updated = update_slot_settings(tx, slot.id, &patch, 1)?;
                assert!(updated.block_mercury);
                assert!(get_work_slot(tx, slot.id)?.expect("slot").settings.block_mercury);
                let err = update_slot_settings(tx, slot.id, &SlotSettingsPatch::default(), 2)
                    .unwrap_err();
                assert_eq!(err.code(), "INVALID_REQUEST");
                let missing = update_slot_settings(tx, 999, &patch, 2).unwrap_err();
                assert_eq!(missing.code(), "NOT_FOUND");
                Ok(())
            })
            .unwrap();
    }
}
