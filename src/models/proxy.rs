use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStatus {
    #[default]
    Active,
    Inactive,
}

impl ProxyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyStatus::Active => "active",
            ProxyStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("active") {
            ProxyStatus::Active
        } else {
            ProxyStatus::Inactive
        }
    }
}

/// An egress point with a bounded reuse counter. `rotation_epoch` advances on
/// every successful rotation so stale leases can tell their counter was reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResource {
    pub id: i64,
    pub server_ip: String,
    pub port: u16,
    pub external_ip: Option<String>,
    pub use_count: i64,
    pub status: ProxyStatus,
    pub last_used_at: Option<i64>,
    pub last_toggle_at: Option<i64>,
    pub rotation_epoch: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProxy {
    pub server_ip: String,
    pub port: u16,
    #[serde(default)]
    pub external_ip: Option<String>,
    #[serde(default)]
    pub status: ProxyStatus,
}

/// Proxy as handed to a client inside an allocation grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyView {
    pub id: i64,
    pub ip: String,
    pub port: u16,
    pub external_ip: Option<String>,
    #[serde(rename = "type")]
    pub proxy_type: String,
    pub use_count: i64,
}

impl ProxyView {
    pub fn from_resource(proxy: &ProxyResource) -> Self {
        Self {
            id: proxy.id,
            ip: proxy.server_ip.clone(),
            port: proxy.port,
            external_ip: proxy.external_ip.clone(),
            proxy_type: "socks5".to_string(),
            use_count: proxy.use_count,
        }
    }
}
