use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::AppResult;
use crate::models::{NewProxy, ProxyResource, ProxyStatus};

const PROXY_COLUMNS: &str = "id, server_ip, port, external_ip, use_count, status, last_used_at, \
     last_toggle_at, rotation_epoch";

fn map_proxy(row: &Row<'_>) -> rusqlite::Result<ProxyResource> {
    let status: String = row.get(5)?;
    Ok(ProxyResource {
        id: row.get(0)?,
        server_ip: row.get(1)?,
        port: row.get(2)?,
        external_ip: row.get(3)?,
        use_count: row.get(4)?,
        status: ProxyStatus::parse(&status),
        last_used_at: row.get(6)?,
        last_toggle_at: row.get(7)?,
        rotation_epoch: row.get(8)?,
    })
}

/// Registers a proxy, or refreshes status and external address of an
/// existing (server_ip, port) pair. Counters are left untouched on update.
pub fn upsert_proxy(conn: &Connection, proxy: &NewProxy, now: i64) -> AppResult<ProxyResource> {
    conn.execute(
        "INSERT INTO proxies (server_ip, port, external_ip, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(server_ip, port) DO UPDATE SET
            external_ip = COALESCE(excluded.external_ip, proxies.external_ip),
            status = excluded.status,
            updated_at = excluded.updated_at",
        params![
            proxy.server_ip,
            proxy.port,
            proxy.external_ip,
            proxy.status.as_str(),
            now
        ],
    )?;
    let sql = format!(
        "SELECT {} FROM proxies WHERE server_ip = ?1 AND port = ?2",
        PROXY_COLUMNS
    );
    Ok(conn.query_row(&sql, params![proxy.server_ip, proxy.port], map_proxy)?)
}

pub fn get_proxy(conn: &Connection, id: i64) -> AppResult<Option<ProxyResource>> {
    let sql = format!("SELECT {} FROM proxies WHERE id = ?1", PROXY_COLUMNS);
    Ok(conn.query_row(&sql, params![id], map_proxy).optional()?)
}

pub fn list_proxies(conn: &Connection) -> AppResult<Vec<ProxyResource>> {
    let sql = format!("SELECT {} FROM proxies ORDER BY id", PROXY_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], map_proxy)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Least used active proxy still below `cap`; ties go to the one idle longest.
pub fn pick_available(conn: &Connection, cap: i64) -> AppResult<Option<ProxyResource>> {
    let sql = format!(
        "SELECT {} FROM proxies
         WHERE status = 'active' AND use_count < ?1
         ORDER BY use_count ASC, COALESCE(last_used_at, 0) ASC, id ASC
         LIMIT 1",
        PROXY_COLUMNS
    );
    Ok(conn.query_row(&sql, params![cap], map_proxy).optional()?)
}

/// Returns `false` when the proxy reached `cap` in the meantime.
pub fn increment_use(conn: &Connection, id: i64, cap: i64, now: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE proxies SET use_count = use_count + 1, last_used_at = ?3, updated_at = ?3
         WHERE id = ?1 AND use_count < ?2",
        params![id, cap, now],
    )?;
    Ok(changed == 1)
}

/// Gives back one use, but only while the proxy is still in the rotation epoch
/// the lease was granted in. A rotated proxy already started from zero.
pub fn release_use(conn: &Connection, id: i64, epoch: i64, now: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE proxies SET use_count = MAX(use_count - 1, 0), updated_at = ?3
         WHERE id = ?1 AND rotation_epoch = ?2",
        params![id, epoch, now],
    )?;
    Ok(changed == 1)
}

pub fn record_rotation(conn: &Connection, id: i64, new_ip: &str, now: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE proxies SET use_count = 0, external_ip = ?2, last_toggle_at = ?3,
            rotation_epoch = rotation_epoch + 1, updated_at = ?3
         WHERE id = ?1",
        params![id, new_ip, now],
    )?;
    Ok(changed == 1)
}

#[derive(Debug, Clone)]
pub struct ToggleLogEntry<'a> {
    pub proxy_id: i64,
    pub old_ip: Option<&'a str>,
    pub new_ip: &'a str,
    pub processing_ms: Option<i64>,
    pub is_virtual: bool,
}

pub fn insert_toggle_log(conn: &Connection, entry: &ToggleLogEntry<'_>, now: i64) -> AppResult<()> {
    conn.execute(
        "INSERT INTO proxy_toggle_logs (proxy_id, old_ip, new_ip, processing_ms, is_virtual, toggled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.proxy_id,
            entry.old_ip,
            entry.new_ip,
            entry.processing_ms,
            entry.is_virtual,
            now
        ],
    )?;
    Ok(())
}

pub fn count_toggle_logs(conn: &Connection, proxy_id: i64) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM proxy_toggle_logs WHERE proxy_id = ?1",
        params![proxy_id],
        |row| row.get(0),
    )?)
}

/// Active proxies sitting at `cap` with no live lease that were last used
/// before `idle_before`.
pub fn list_saturated_idle(
    conn: &Connection,
    cap: i64,
    idle_before: i64,
) -> AppResult<Vec<ProxyResource>> {
    let sql = format!(
        "SELECT {} FROM proxies p
         WHERE p.status = 'active' AND p.use_count >= ?1
           AND COALESCE(p.last_used_at, 0) < ?2
           AND NOT EXISTS (
               SELECT 1 FROM work_allocations a
               WHERE a.proxy_id = p.id AND a.status = 'allocated'
           )
         ORDER BY p.id",
        PROXY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![cap, idle_before], map_proxy)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
pub(crate) fn set_use_count(conn: &Connection, id: i64, use_count: i64) -> AppResult<()> {
    conn.execute(
        "UPDATE proxies SET use_count = ?2 WHERE id = ?1",
        params![id, use_count],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::persistence::db::temp_store;

    fn new_proxy(port: u16) -> NewProxy {
        NewProxy {
            server_ip: "192.168.0.10".into(),
            port,
            external_ip: Some("1.2.3.4".into()),
            status: ProxyStatus::Active,
        }
    }

    #[test]
    fn upsert_keeps_counters_and_refreshes_status() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let p = upsert_proxy(tx, &new_proxy(10011), 1)?;
                assert!(increment_use(tx, p.id, 20, 2)?);
                let again = upsert_proxy(
                    tx,
                    &NewProxy {
                        status: ProxyStatus::Inactive,
                        external_ip: None,
                        ..new_proxy(10011)
                    },
                    3,
                )?;
                assert_eq!(again.id, p.id);
                assert_eq!(again.use_count, 1);
                assert_eq!(again.status, ProxyStatus::Inactive);
                assert_eq!(again.external_ip.as_deref(), Some("1.2.3.4"));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn increment_stops_at_cap_and_pick_skips_saturated() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let a = upsert_proxy(tx, &new_proxy(10011), 0)?;
                let b = upsert_proxy(tx, &new_proxy(10012), 0)?;
                set_use_count(tx, a.id, 1)?;
                assert!(increment_use(tx, a.id, 2, 5)?);
                assert!(!increment_use(tx, a.id, 2, 6)?);
                let picked = pick_available(tx, 2)?.expect("b is free");
                assert_eq!(picked.id, b.id);
                set_use_count(tx, b.id, 2)?;
                assert!(pick_available(tx, 2)?.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn release_is_ignored_after_rotation() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let p = upsert_proxy(tx, &new_proxy(10011), 0)?;
                increment_use(tx, p.id, 20, 1)?;
                assert!(record_rotation(tx, p.id, "5.6.7.8", 2)?);
                let rotated = get_proxy(tx, p.id)?.expect("proxy");
                assert_eq!(rotated.use_count, 0);
                assert_eq!(rotated.rotation_epoch, p.rotation_epoch + 1);
                assert!(!release_use(tx, p.id, p.rotation_epoch, 3)?);
                increment_use(tx, p.id, 20, 4)?;
                assert!(release_use(tx, p.id, rotated.rotation_epoch, 5)?);
                assert!(release_use(tx, p.id, rotated.rotation_epoch, 6)?);
                assert_eq!(get_proxy(tx, p.id)?.expect("proxy").use_count, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn saturated_idle_ignores_recent_and_inactive() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let idle = upsert_proxy(tx, &new_proxy(10011), 0)?;
                let recent = upsert_proxy(tx, &new_proxy(10012), 0)?;
                let off = upsert_proxy(
                    tx,
                    &NewProxy {
                        status: ProxyStatus::Inactive,
                        ..new_proxy(10013)
                    },
                    0,
                )?;
                for p in [&idle, &recent, &off] {
                    set_use_count(tx, p.id, 20)?;
                }
                tx.execute(
                    "UPDATE proxies SET last_used_at = 10 WHERE id IN (?1, ?2)",
                    params![idle.id, off.id],
                )?;
                tx.execute(
                    "UPDATE proxies SET last_used_at = 1000 WHERE id = ?1",
                    params![recent.id],
                )?;
                let found = list_saturated_idle(tx, 20, 500)?;
                assert_eq!(found.len(), 1);
                assert_eq!(found[0].id, idle.id);
                Ok(())
            })
            .unwrap();
    }
}
