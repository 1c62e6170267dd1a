//! Common types for trust scoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lower bound of every score and sub-score
pub const MIN_SCORE: f64 = 0.0;

/// Upper bound of every score and sub-score
pub const MAX_SCORE: f64 = 100.0;

/// Identity of a trust-scored entity: a user seen on a device from a
/// network origin. Each distinct triple has its own score and history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustSubject {
    /// Principal identifier
    pub user_id: String,

    /// Device identifier
    pub device_id: String,

    /// Network origin (CIDR, ASN tag, or named zone)
    pub network_origin: String,
}

impl TrustSubject {
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        network_origin: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            network_origin: network_origin.into(),
        }
    }
}

/// Risk signal categories feeding the aggregate score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Device posture (compliance, attestation, patch level)
    Device,

    /// Network reputation of the request origin
    Network,

    /// Behavioral consistency (access patterns, velocity)
    Behavior,

    /// Authentication strength (MFA, credential age)
    Authentication,

    /// Geographic plausibility
    Location,
}

impl SignalKind {
    /// All signal kinds, in aggregation order
    pub const ALL: [SignalKind; 5] = [
        SignalKind::Device,
        SignalKind::Network,
        SignalKind::Behavior,
        SignalKind::Authentication,
        SignalKind::Location,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Device => "device",
            SignalKind::Network => "network",
            SignalKind::Behavior => "behavior",
            SignalKind::Authentication => "authentication",
            SignalKind::Location => "location",
        }
    }
}

/// Per-signal sub-scores, each bounded to [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    pub device: f64,
    pub network: f64,
    pub behavior: f64,
    pub authentication: f64,
    pub location: f64,
}

impl SignalScores {
    /// All sub-scores at the neutral starting value
    pub fn neutral(value: f64) -> Self {
        Self {
            device: value,
            network: value,
            behavior: value,
            authentication: value,
            location: value,
        }
    }

    pub fn get(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Device => self.device,
            SignalKind::Network => self.network,
            SignalKind::Behavior => self.behavior,
            SignalKind::Authentication => self.authentication,
            SignalKind::Location => self.location,
        }
    }

    pub fn set(&mut self, kind: SignalKind, value: f64) {
        let slot = match kind {
            SignalKind::Device => &mut self.device,
            SignalKind::Network => &mut self.network,
            SignalKind::Behavior => &mut self.behavior,
            SignalKind::Authentication => &mut self.authentication,
            SignalKind::Location => &mut self.location,
        };
        *slot = value.clamp(MIN_SCORE, MAX_SCORE);
    }
}

/// Latest committed trust snapshot for a subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScore {
    /// The scored subject
    pub subject: TrustSubject,

    /// Weighted aggregate of the sub-scores, bounded to [0, 100]
    pub score: f64,

    /// Named sub-scores
    pub signals: SignalScores,

    /// Free-form factors that contributed to the current score
    pub factors: Vec<String>,

    /// Active risk indicators (sub-scores below the risk threshold)
    pub risks: Vec<String>,

    /// Operator-facing recommendations
    pub recommendations: Vec<String>,

    /// When the aggregate was last recomputed
    pub calculated_at: DateTime<Utc>,
}

/// One score transition. Rows are append-only and never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScoreChange {
    /// Unique row id
    pub id: Uuid,

    /// Aggregate before the transition
    pub previous_score: f64,

    /// Aggregate after the transition
    pub new_score: f64,

    /// Which signal triggered the recomputation
    pub signal: SignalKind,

    /// Free-text reason supplied by the signal source
    pub reason: String,

    /// When the transition was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Tracker configuration: signal weights and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Weight of the device sub-score
    pub device_weight: f64,

    /// Weight of the network sub-score
    pub network_weight: f64,

    /// Weight of the behavior sub-score
    pub behavior_weight: f64,

    /// Weight of the authentication sub-score
    pub authentication_weight: f64,

    /// Weight of the location sub-score
    pub location_weight: f64,

    /// Score assigned to every sub-score before any signal arrives
    pub initial_score: f64,

    /// Sub-scores below this value are reported as risks
    pub risk_threshold: f64,

    /// Aggregates below this value carry a step-up recommendation
    pub step_up_threshold: f64,
}

impl TrustConfig {
    pub fn weight(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Device => self.device_weight,
            SignalKind::Network => self.network_weight,
            SignalKind::Behavior => self.behavior_weight,
            SignalKind::Authentication => self.authentication_weight,
            SignalKind::Location => self.location_weight,
        }
    }

    /// Sum of all signal weights
    pub fn total_weight(&self) -> f64 {
        SignalKind::ALL.iter().map(|k| self.weight(*k)).sum()
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            device_weight: 0.25,
            network_weight: 0.20,
            behavior_weight: 0.20,
            authentication_weight: 0.25,
            location_weight: 0.10,
            initial_score: 50.0,
            risk_threshold: 40.0,
            step_up_threshold: 60.0,
        }
    }
}
