use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{ok, Success};
use crate::error::AppResult;
use crate::hub::clock::{now_millis, today};
use crate::models::{NewWorkSlot, SlotSettings, SlotSettingsPatch, WorkSlot, WorkSlotSummary};
use crate::modules::persistence::work_db;
use crate::server::state::AppState;

#[derive(Deserialize, Debug, Default)]
pub(crate) struct DateQuery {
    date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub(crate) struct CreatedBody {
    work_slot: WorkSlot,
}

pub(crate) async fn create_work_slot(
    State(state): State<AppState>,
    Json(slot): Json<NewWorkSlot>,
) -> AppResult<(StatusCode, Json<Success<CreatedBody>>)> {
    let date = today();
    let work_slot = state
        .hub
        .store
        .run_blocking(move |store| {
            store.write(|tx| {
                let created = work_db::create_work_slot(tx, &slot, now_millis())?;
                work_db::init_daily_tracking(tx, date)?;
                Ok(created)
            })
        })
        .await?;
    tracing::info!(
        "Created work slot {} '{}' (target {}/day)",
        work_slot.id,
        work_slot.keyword,
        work_slot.daily_target
    );
    Ok((StatusCode::CREATED, ok(CreatedBody { work_slot })?))
}

#[derive(Serialize)]
pub(crate) struct SlotListBody {
    date: NaiveDate,
    work_slots: Vec<WorkSlotSummary>,
}

pub(crate) async fn list_work_slots(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> AppResult<Json<Success<SlotListBody>>> {
    let date = query.date.unwrap_or_else(today);
    let work_slots = state
        .hub
        .store
        .run_blocking(move |store| {
            store.read(|conn| work_db::list_work_slot_summaries(conn, date))
        })
        .await?;
    ok(SlotListBody { date, work_slots })
}

#[derive(Serialize)]
pub(crate) struct SettingsBody {
    work_slot_id: i64,
    settings: SlotSettings,
}

pub(crate) async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<SlotSettingsPatch>,
) -> AppResult<Json<Success<SettingsBody>>> {
    let settings = state
        .hub
        .store
        .run_blocking(move |store| {
            store.write(|tx| work_db::update_slot_settings(tx, id, &patch, now_millis()))
        })
        .await?;
    tracing::info!("Updated settings of work slot {}", id);
    ok(SettingsBody {
        work_slot_id: id,
        settings,
    })
}

#[derive(Serialize)]
pub(crate) struct InitDailyBody {
    work_date: NaiveDate,
    tracked_slots: i64,
}

pub(crate) async fn init_daily(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> AppResult<Json<Success<InitDailyBody>>> {
    let work_date = query.date.unwrap_or_else(today);
    let tracked_slots = state
        .hub
        .store
        .run_blocking(move |store| store.write(|tx| work_db::init_daily_tracking(tx, work_date)))
        .await?;
    tracing::info!(
        "Daily tracking ready for {} ({} slot(s))",
        work_date,
        tracked_slots
    );
    ok(InitDailyBody {
        work_date,
        tracked_slots,
    })
}
