use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::proxy::ProxyView;
use super::work::{SlotSettings, WorkSlotView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Allocated,
    Completed,
    Expired,
}

impl AllocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::Allocated => "allocated",
            AllocationStatus::Completed => "completed",
            AllocationStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "allocated" => Some(AllocationStatus::Allocated),
            "completed" => Some(AllocationStatus::Completed),
            "expired" => Some(AllocationStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AllocationStatus::Allocated)
    }
}

/// Identity of a logical worker: host address, browser instance, profile folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub client_ip: String,
    pub instance_number: i64,
    pub user_folder: i64,
}

impl ClientIdentity {
    pub fn new(client_ip: impl Into<String>, instance_number: i64, user_folder: i64) -> Self {
        Self {
            client_ip: client_ip.into(),
            instance_number,
            user_folder,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub id: i64,
    pub allocation_key: String,
    pub work_slot_id: i64,
    pub work_date: NaiveDate,
    pub proxy_id: i64,
    pub proxy_epoch: i64,
    #[serde(flatten)]
    pub client: ClientIdentity,
    pub status: AllocationStatus,
    pub allocated_at: i64,
    pub expires_at: i64,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationGrant {
    pub allocation_key: String,
    pub work: WorkSlotView,
    pub proxy: ProxyView,
    pub settings: SlotSettings,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub key: String,
    pub status: AllocationStatus,
    pub allocated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AllocationSummary {
    pub fn of(allocation: &Allocation) -> Self {
        Self {
            key: allocation.allocation_key.clone(),
            status: allocation.status,
            allocated_at: millis_to_utc(allocation.allocated_at),
            expires_at: millis_to_utc(allocation.expires_at),
            completed_at: allocation.completed_at.map(millis_to_utc),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionInfo {
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub execution_time_ms: Option<i64>,
    #[serde(default)]
    pub instance_number: Option<i64>,
    #[serde(default)]
    pub user_folder: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultInfo {
    pub status: String,
    #[serde(default)]
    pub status_code: Option<i64>,
    #[serde(default)]
    pub current_page: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceInfo {
    #[serde(default)]
    pub page_load_time_ms: Option<i64>,
    #[serde(default)]
    pub dom_ready_time_ms: Option<i64>,
    #[serde(default)]
    pub first_product_time_ms: Option<i64>,
    #[serde(default)]
    pub total_requests: Option<i64>,
    #[serde(default)]
    pub blocked_requests: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductResult {
    pub product_id: i64,
    pub product_name: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<i64>,
}

/// What a worker reports when it is done with an allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOutcome {
    #[serde(default)]
    pub execution: ExecutionInfo,
    #[serde(default)]
    pub applied_settings: Option<SlotSettings>,
    pub result: ResultInfo,
    #[serde(default)]
    pub products: Vec<ProductResult>,
    #[serde(default)]
    pub performance: PerformanceInfo,
    #[serde(default)]
    pub block_info: Option<serde_json::Value>,
}

impl WorkOutcome {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            execution: ExecutionInfo::default(),
            applied_settings: None,
            result: ResultInfo {
                status: status.into(),
                status_code: None,
                current_page: None,
            },
            products: Vec::new(),
            performance: PerformanceInfo::default(),
            block_info: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.status == "success"
    }

    pub fn is_blocked(&self) -> bool {
        self.result.status == "blocked"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResultRequest {
    pub allocation_key: String,
    #[serde(flatten)]
    pub outcome: WorkOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionAck {
    pub result_id: i64,
    pub toggle_enqueued: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseStats {
    pub active: i64,
    pub expired_total: i64,
    pub expired_today: i64,
    pub pending_timeout: i64,
    pub next_timeout: Option<DateTime<Utc>>,
}

pub fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            AllocationStatus::Allocated,
            AllocationStatus::Completed,
            AllocationStatus::Expired,
        ] {
            assert_eq!(AllocationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AllocationStatus::parse("bogus"), None);
        assert!(!AllocationStatus::Allocated.is_terminal());
        assert!(AllocationStatus::Expired.is_terminal());
    }

    #[test]
    fn submit_request_flattens_outcome_fields() {
        let req: SubmitResultRequest = serde_json::from_str(
            r#"{
                "allocation_key": "WA-20260301-abcdef012345",
                "execution": {"execution_time_ms": 1500, "instance_number": 2},
                "result": {"status": "success", "status_code": 200},
                "products": [{"product_id": 9, "product_name": "mug"}]
            }"#,
        )
        .expect("parse submit request");
        assert_eq!(req.allocation_key, "WA-20260301-abcdef012345");
        assert!(req.outcome.is_success());
        assert_eq!(req.outcome.execution.execution_time_ms, Some(1500));
        assert_eq!(req.outcome.products.len(), 1);
    }
}
