use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Feature toggles handed to workers. Unknown keys survive in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotSettings {
    #[serde(default)]
    pub cart_click_enabled: bool,
    #[serde(default)]
    pub block_mercury: bool,
    #[serde(default)]
    pub block_image_cdn: bool,
    #[serde(default)]
    pub block_img1a_cdn: bool,
    #[serde(default)]
    pub block_thumbnail_cdn: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotSettingsPatch {
    pub cart_click_enabled: Option<bool>,
    pub block_mercury: Option<bool>,
    pub block_image_cdn: Option<bool>,
    pub block_img1a_cdn: Option<bool>,
    pub block_thumbnail_cdn: Option<bool>,
}

impl SlotSettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.cart_click_enabled.is_none()
            && self.block_mercury.is_none()
            && self.block_image_cdn.is_none()
            && self.block_img1a_cdn.is_none()
            && self.block_thumbnail_cdn.is_none()
    }

    pub fn apply(&self, settings: &mut SlotSettings) {
        if let Some(v) = self.cart_click_enabled {
            settings.cart_click_enabled = v;
        }
        if let Some(v) = self.block_mercury {
            settings.block_mercury = v;
        }
        if let Some(v) = self.block_image_cdn {
            settings.block_image_cdn = v;
        }
        if let Some(v) = self.block_img1a_cdn {
            settings.block_img1a_cdn = v;
        }
        if let Some(v) = self.block_thumbnail_cdn {
            settings.block_thumbnail_cdn = v;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSlot {
    pub id: i64,
    pub keyword: String,
    pub code: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_target: i64,
    pub priority: i64,
    pub is_active: bool,
    pub settings: SlotSettings,
}

impl WorkSlot {
    pub fn phase_on(&self, date: NaiveDate) -> SlotPhase {
        if date < self.start_date {
            SlotPhase::Pending
        } else if date > self.end_date {
            SlotPhase::Expired
        } else if !self.is_active {
            SlotPhase::Paused
        } else {
            SlotPhase::Active
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkSlot {
    pub keyword: String,
    #[serde(default)]
    pub code: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_daily_target", alias = "daily_work_count")]
    pub daily_target: i64,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub settings: SlotSettings,
}

fn default_daily_target() -> i64 {
    100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPhase {
    Pending,
    Expired,
    Paused,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTracking {
    pub work_slot_id: i64,
    pub work_date: NaiveDate,
    pub target_count: i64,
    pub allocated_count: i64,
    pub completed_count: i64,
    pub failed_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSlotSummary {
    #[serde(flatten)]
    pub slot: WorkSlot,
    pub tracking: Option<DailyTracking>,
    pub completion_rate: f64,
    pub status: SlotPhase,
}

/// Work definition as handed to a client inside an allocation grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSlotView {
    pub id: i64,
    pub keyword: String,
    pub code: Option<String>,
}

/// Frozen copy of a slot stored with each allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub id: i64,
    pub keyword: String,
    pub code: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub priority: i64,
    pub is_active: bool,
    pub settings: SlotSettings,
    pub snapshot_at: DateTime<Utc>,
}

impl SlotSnapshot {
    pub fn of(slot: &WorkSlot, at: DateTime<Utc>) -> Self {
        Self {
            id: slot.id,
            keyword: slot.keyword.clone(),
            code: slot.code.clone(),
            start_date: slot.start_date,
            end_date: slot.end_date,
            priority: slot.priority,
            is_active: slot.is_active,
            settings: slot.settings.clone(),
            snapshot_at: at,
        }
    }
}
