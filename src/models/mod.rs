pub mod allocation;
pub mod config;
pub mod proxy;
pub mod work;

pub use allocation::{
    millis_to_utc, Allocation, AllocationGrant, AllocationStatus, AllocationSummary,
    ClientIdentity, CompletionAck, LeaseStats, SubmitResultRequest, WorkOutcome,
};
pub use config::{AllocationConfig, AppConfig, ReclaimConfig, ToggleConfig};
pub use proxy::{NewProxy, ProxyResource, ProxyStatus, ProxyView};
pub use work::{
    DailyTracking, NewWorkSlot, SlotPhase, SlotSettings, SlotSettingsPatch, SlotSnapshot,
    WorkSlot, WorkSlotSummary, WorkSlotView,
};
