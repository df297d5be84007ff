use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::types::{ToggleOutcome, ToggleTarget};
use crate::constants::{VIRTUAL_DELAY_MAX_MS, VIRTUAL_DELAY_MIN_MS};
use crate::error::AppResult;
use crate::models::ToggleConfig;

/// Something that can rotate the public address of a proxy.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn actuate(&self, target: &ToggleTarget) -> ToggleOutcome;
}

#[derive(Debug, Deserialize)]
struct DeviceStatus {
    #[serde(default, alias = "globalCooldownRemaining")]
    global_cooldown_remaining: f64,
}

#[derive(Debug, Deserialize)]
struct DeviceToggleResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    old_ip: Option<String>,
    #[serde(default)]
    new_ip: Option<String>,
    #[serde(default)]
    processing_ms: Option<i64>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    remaining_seconds: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.0))
}

/// Talks to the rotation device over HTTP. Virtual targets never reach the
/// device and are handled by [`VirtualActuator`].
pub struct HttpActuator {
    client: Client,
    base_url: String,
    status_timeout: Duration,
    toggle_timeout: Duration,
    subnet_port_base: u16,
    virtual_port_threshold: u16,
    virtual_actuator: VirtualActuator,
}

impl HttpActuator {
    pub fn new(config: &ToggleConfig) -> AppResult<Self> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(config.status_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.actuator_url.trim_end_matches('/').to_string(),
            status_timeout: Duration::from_secs(config.status_timeout_secs),
            toggle_timeout: Duration::from_secs(config.toggle_timeout_secs),
            subnet_port_base: config.subnet_port_base,
            virtual_port_threshold: config.virtual_port_threshold,
            virtual_actuator: VirtualActuator::default(),
        })
    }

    async fn device_cooldown(&self) -> Result<Duration, String> {
        let resp = self
            .client
            .get(format!("{}/status", self.base_url))
            .timeout(self.status_timeout)
            .send()
            .await
            .map_err(|e| format!("status request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("status request returned {}", resp.status()));
        }
        let status: DeviceStatus = resp
            .json()
            .await
            .map_err(|e| format!("invalid status payload: {}", e))?;
        Ok(secs_to_duration(status.global_cooldown_remaining))
    }

    async fn toggle_device(&self, target: &ToggleTarget) -> ToggleOutcome {
        let Some(subnet) = target.subnet(self.subnet_port_base) else {
            return ToggleOutcome::Failed {
                reason: format!(
                    "port {} is below subnet base {}",
                    target.port, self.subnet_port_base
                ),
            };
        };

        let resp = match self
            .client
            .get(format!("{}/toggle/{}", self.base_url, subnet))
            .timeout(self.toggle_timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return ToggleOutcome::Failed {
                    reason: format!("toggle request failed: {}", e),
                }
            }
        };

        if resp.status() == StatusCode::LOCKED {
            return ToggleOutcome::Locked;
        }
        let http_status = resp.status();
        let body: DeviceToggleResponse = match resp.json().await {
            Ok(body) => body,
            Err(e) => {
                return ToggleOutcome::Failed {
                    reason: format!("toggle returned {} with unreadable body: {}", http_status, e),
                }
            }
        };

        if body.success {
            return match body.new_ip {
                Some(new_ip) => ToggleOutcome::Rotated {
                    old_ip: body.old_ip.or_else(|| target.external_ip.clone()),
                    new_ip,
                    processing_ms: body.processing_ms,
                    is_virtual: false,
                },
                None => ToggleOutcome::Failed {
                    reason: "device reported success without a new address".to_string(),
                },
            };
        }
        if body.error_code.as_deref() == Some("GLOBAL_COOLDOWN") {
            return ToggleOutcome::Cooldown {
                remaining: secs_to_duration(body.remaining_seconds.unwrap_or(0.0)),
            };
        }
        ToggleOutcome::Failed {
            reason: body
                .error
                .or(body.error_code)
                .unwrap_or_else(|| format!("toggle failed with HTTP {}", http_status)),
        }
    }
}

#[async_trait]
impl Actuator for HttpActuator {
    async fn actuate(&self, target: &ToggleTarget) -> ToggleOutcome {
        if target.is_virtual(self.virtual_port_threshold) {
            return self.virtual_actuator.actuate(target).await;
        }

        match self.device_cooldown().await {
            Ok(remaining) if !remaining.is_zero() => {
                return ToggleOutcome::Cooldown { remaining };
            }
            Ok(_) => {}
            Err(reason) => return ToggleOutcome::Failed { reason },
        }

        tracing::info!(
            "Toggling proxy {} ({}:{})",
            target.proxy_id,
            target.server_ip,
            target.port
        );
        self.toggle_device(target).await
    }
}

/// Simulates a rotation: short random delay, fresh `203.x.y.z` address.
#[derive(Debug, Clone, Default)]
pub struct VirtualActuator;

impl VirtualActuator {
    fn random_address() -> String {
        let mut rng = rand::thread_rng();
        format!(
            "203.{}.{}.{}",
            rng.gen_range(0..=254u8),
            rng.gen_range(0..=254u8),
            rng.gen_range(1..=254u8)
        )
    }
}

#[async_trait]
impl Actuator for VirtualActuator {
    async fn actuate(&self, target: &ToggleTarget) -> ToggleOutcome {
        let delay_ms = rand::thread_rng().gen_range(VIRTUAL_DELAY_MIN_MS..=VIRTUAL_DELAY_MAX_MS);
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let new_ip = Self::random_address();
        tracing::info!(
            "Virtual toggle for proxy {}: {} -> {}",
            target.proxy_id,
            target.external_ip.as_deref().unwrap_or("unknown"),
            new_ip
        );
        ToggleOutcome::Rotated {
            old_ip: target.external_ip.clone(),
            new_ip,
            processing_ms: Some(started.elapsed().as_millis() as i64),
            is_virtual: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn virtual_actuator_manufactures_documentation_range_address() {
        let target = ToggleTarget {
            proxy_id: 7,
            server_ip: "10.1.2.3".into(),
            port: 20001,
            external_ip: Some("1.1.1.1".into()),
        };
        match VirtualActuator.actuate(&target).await {
            ToggleOutcome::Rotated {
                old_ip,
                new_ip,
                processing_ms,
                is_virtual,
            } => {
                assert!(new_ip.starts_with("203."));
                assert_eq!(new_ip.split('.').count(), 4);
                assert_eq!(old_ip.as_deref(), Some("1.1.1.1"));
                assert!(processing_ms.unwrap_or(0) >= VIRTUAL_DELAY_MIN_MS as i64);
                assert!(is_virtual);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_device_is_a_plain_failure() {
        let config = ToggleConfig {
            actuator_url: "http://127.0.0.1:9".into(),
            status_timeout_secs: 1,
            ..ToggleConfig::default()
        };
        let actuator = HttpActuator::new(&config).unwrap();
        let target = ToggleTarget {
            proxy_id: 1,
            server_ip: "192.168.5.5".into(),
            port: 10011,
            external_ip: None,
        };
        assert!(matches!(
            actuator.actuate(&target).await,
            ToggleOutcome::Failed { .. }
        ));
    }

    #[test]
    fn status_payload_accepts_both_spellings() {
        let a: DeviceStatus = serde_json::from_str(r#"{"global_cooldown_remaining": 12}"#).unwrap();
        let b: DeviceStatus = serde_json::from_str(r#"{"globalCooldownRemaining": 3.5}"#).unwrap();
        assert_eq!(secs_to_duration(a.global_cooldown_remaining), Duration::from_secs(12));
        assert_eq!(
            secs_to_duration(b.global_cooldown_remaining),
            Duration::from_millis(3500)
        );
    }
}
