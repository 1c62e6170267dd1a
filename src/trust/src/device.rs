//! Device trust records
//!
//! Each (user, device) pair carries a fingerprint digest, a numeric score
//! that accumulates and decays with observed activity, and an explicit
//! `trusted` flag. The flag is a separate binary gate: a high score never
//! flips it, only `mark_trusted`/`revoke_trust` do.

use crate::error::{Result, TrustError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Maximum activity events retained per device
const MAX_ACTIVITY_HISTORY: usize = 1000;

/// Neutral starting score for a new device
const NEUTRAL_SCORE: f64 = 50.0;

/// Idle half-life for score decay toward neutral (14 days)
const DECAY_HALF_LIFE_SECS: i64 = 14 * 24 * 3600;

/// Device-level events feeding the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceActivityKind {
    /// Successful sign-in from this device
    SuccessfulLogin,

    /// Failed sign-in attempt
    FailedLogin,

    /// Device passed a compliance/attestation check
    AttestationPassed,

    /// Device failed a compliance/attestation check
    AttestationFailed,

    /// Device seen on a previously unknown network
    NewNetworkObserved,

    /// Anomalous behavior flagged by the risk pipeline
    AnomalyDetected,
}

impl DeviceActivityKind {
    /// Score delta applied when this event is recorded
    pub fn score_delta(&self) -> f64 {
        match self {
            DeviceActivityKind::SuccessfulLogin => 1.0,
            DeviceActivityKind::AttestationPassed => 5.0,
            DeviceActivityKind::NewNetworkObserved => -1.0,
            DeviceActivityKind::FailedLogin => -3.0,
            DeviceActivityKind::AttestationFailed => -10.0,
            DeviceActivityKind::AnomalyDetected => -15.0,
        }
    }
}

/// One appended device event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceActivity {
    /// Unique event id
    pub id: Uuid,

    /// Event kind
    pub kind: DeviceActivityKind,

    /// When the event was observed
    pub recorded_at: DateTime<Utc>,

    /// Optional structured context
    pub metadata: Option<serde_json::Value>,
}

/// Per (user, device) trust record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTrust {
    /// Owning principal
    pub user_id: String,

    /// Device identifier
    pub device_id: String,

    /// blake3 digest of the device fingerprint material (hex)
    pub fingerprint: String,

    /// Explicit trust gate, independent of the numeric score
    pub trusted: bool,

    /// Activity-driven score in [0, 100]
    pub score: f64,

    /// Whether the device passed its last compliance check
    pub compliant: bool,

    /// Security features reported at registration (e.g. "secure-enclave")
    pub security_features: Vec<String>,

    /// First registration time
    pub first_seen: DateTime<Utc>,

    /// Last recorded activity
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeviceKey {
    user_id: String,
    device_id: String,
}

struct DeviceState {
    record: DeviceTrust,
    activity: VecDeque<DeviceActivity>,
}

/// Thread-safe device trust registry
#[derive(Clone)]
pub struct DeviceTrustManager {
    devices: Arc<DashMap<DeviceKey, DeviceState>>,
}

impl DeviceTrustManager {
    pub fn new() -> Self {
        Self {
            devices: Arc::new(DashMap::new()),
        }
    }

    /// Register a device for a user. The (user, device) pair is unique;
    /// re-registering an existing pair is an error.
    pub fn register(
        &self,
        user_id: &str,
        device_id: &str,
        fingerprint_material: &[u8],
        security_features: Vec<String>,
    ) -> Result<DeviceTrust> {
        let key = DeviceKey {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        };

        if self.devices.contains_key(&key) {
            return Err(TrustError::DuplicateDevice {
                user_id: user_id.to_string(),
                device_id: device_id.to_string(),
            });
        }

        let now = Utc::now();
        let record = DeviceTrust {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            fingerprint: blake3::hash(fingerprint_material).to_hex().to_string(),
            trusted: false,
            score: NEUTRAL_SCORE,
            compliant: false,
            security_features,
            first_seen: now,
            last_seen: now,
        };

        self.devices.insert(
            key,
            DeviceState {
                record: record.clone(),
                activity: VecDeque::with_capacity(64),
            },
        );

        info!(user = user_id, device = device_id, "device registered");
        Ok(record)
    }

    /// Append a device event and apply its score delta.
    ///
    /// The score first decays toward neutral based on idle time, then the
    /// event delta is applied and the result clamped to [0, 100].
    pub fn record_activity(
        &self,
        user_id: &str,
        device_id: &str,
        kind: DeviceActivityKind,
        metadata: Option<serde_json::Value>,
    ) -> Result<DeviceTrust> {
        let key = DeviceKey {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        };

        let mut state = self.devices.get_mut(&key).ok_or(TrustError::UnknownDevice {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        })?;

        let now = Utc::now();
        let decayed = decayed_score(state.record.score, state.record.last_seen, now);
        state.record.score = (decayed + kind.score_delta()).clamp(0.0, 100.0);
        state.record.last_seen = now;

        match kind {
            DeviceActivityKind::AttestationPassed => state.record.compliant = true,
            DeviceActivityKind::AttestationFailed => state.record.compliant = false,
            _ => {}
        }

        if state.activity.len() >= MAX_ACTIVITY_HISTORY {
            state.activity.pop_front();
        }
        state.activity.push_back(DeviceActivity {
            id: Uuid::new_v4(),
            kind,
            recorded_at: now,
            metadata,
        });

        debug!(
            user = user_id,
            device = device_id,
            ?kind,
            score = state.record.score,
            "device activity recorded"
        );

        Ok(state.record.clone())
    }

    /// Flip the explicit trust gate on
    pub fn mark_trusted(&self, user_id: &str, device_id: &str) -> Result<()> {
        self.set_trusted(user_id, device_id, true)
    }

    /// Flip the explicit trust gate off
    pub fn revoke_trust(&self, user_id: &str, device_id: &str) -> Result<()> {
        self.set_trusted(user_id, device_id, false)
    }

    fn set_trusted(&self, user_id: &str, device_id: &str, trusted: bool) -> Result<()> {
        let key = DeviceKey {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        };

        let mut state = self.devices.get_mut(&key).ok_or(TrustError::UnknownDevice {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        })?;

        state.record.trusted = trusted;
        info!(user = user_id, device = device_id, trusted, "device trust flag set");
        Ok(())
    }

    /// Whether the device's explicit trust flag is set. Unknown devices are
    /// untrusted.
    pub fn is_trusted(&self, user_id: &str, device_id: &str) -> bool {
        let key = DeviceKey {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        };
        self.devices.get(&key).map(|s| s.record.trusted).unwrap_or(false)
    }

    /// Current record for a device
    pub fn get(&self, user_id: &str, device_id: &str) -> Option<DeviceTrust> {
        let key = DeviceKey {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        };
        self.devices.get(&key).map(|s| s.record.clone())
    }

    /// Activity log for a device, oldest first
    pub fn activity(&self, user_id: &str, device_id: &str) -> Vec<DeviceActivity> {
        let key = DeviceKey {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        };
        self.devices
            .get(&key)
            .map(|s| s.activity.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl Default for DeviceTrustManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential decay toward the neutral score over idle time
fn decayed_score(score: f64, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let idle_secs = (now - last_seen).num_seconds().max(0);
    if idle_secs == 0 {
        return score;
    }

    let half_lives = idle_secs as f64 / DECAY_HALF_LIFE_SECS as f64;
    NEUTRAL_SCORE + (score - NEUTRAL_SCORE) * 0.5_f64.powf(half_lives)
}
