//! # Sentinel Trust
//!
//! Risk subsystem for the Sentinel platform: maintains a continuously
//! updated, weighted trust score per (user, device, network origin) and a
//! per-device trust record driven by observed activity.
//!
//! The authorization engine reads the latest committed score snapshot at
//! decision time; recomputation happens when signals are recorded, never
//! inside a request's critical path.
//!
//! ## Example
//!
//! ```rust
//! use sentinel_trust::{TrustTracker, TrustSubject, SignalKind};
//!
//! let tracker = TrustTracker::new();
//! let subject = TrustSubject::new("user-1", "device-a", "10.0.0.0/8");
//!
//! tracker.record_signal(&subject, SignalKind::Authentication, 90.0, "mfa success").unwrap();
//! let snapshot = tracker.snapshot(&subject).unwrap();
//! assert!(snapshot.score > 50.0);
//! ```

pub mod device;
pub mod error;
pub mod tracker;
pub mod types;

pub use device::{DeviceActivity, DeviceActivityKind, DeviceTrust, DeviceTrustManager};
pub use error::{Result, TrustError};
pub use tracker::TrustTracker;
pub use types::{
    SignalKind, SignalScores, TrustConfig, TrustScore, TrustScoreChange, TrustSubject,
};
