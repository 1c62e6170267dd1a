//! Trust score tracking
//!
//! Maintains one weighted aggregate per (user, device, network origin) with:
//! - Five bounded sub-scores (device, network, behavior, authentication, location)
//! - Append-only history of every score transition
//! - Thread-safe concurrent access via DashMap
//!
//! Readers (the decision facade) take the latest committed snapshot and never
//! trigger a recomputation.

use crate::error::{Result, TrustError};
use crate::types::{
    SignalKind, SignalScores, TrustConfig, TrustScore, TrustScoreChange, TrustSubject, MAX_SCORE,
    MIN_SCORE,
};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Most recent contributing factors kept on a snapshot
const MAX_FACTORS: usize = 64;

/// Per-subject trust state
#[derive(Debug, Clone)]
struct SubjectTrust {
    /// Current snapshot
    snapshot: TrustScore,

    /// Every score transition, oldest first. Never truncated or edited.
    history: Vec<TrustScoreChange>,
}

impl SubjectTrust {
    fn new(subject: TrustSubject, config: &TrustConfig) -> Self {
        Self {
            snapshot: TrustScore {
                subject,
                score: config.initial_score,
                signals: SignalScores::neutral(config.initial_score),
                factors: Vec::new(),
                risks: Vec::new(),
                recommendations: Vec::new(),
                calculated_at: Utc::now(),
            },
            history: Vec::new(),
        }
    }
}

/// Thread-safe trust score tracker
#[derive(Clone)]
pub struct TrustTracker {
    /// Subject trust state (thread-safe)
    subjects: Arc<DashMap<TrustSubject, SubjectTrust>>,

    /// Configuration
    config: Arc<TrustConfig>,
}

impl TrustTracker {
    /// Create a tracker with default configuration
    pub fn new() -> Self {
        Self::with_config(TrustConfig::default())
    }

    /// Create a tracker with custom configuration
    pub fn with_config(config: TrustConfig) -> Self {
        Self {
            subjects: Arc::new(DashMap::new()),
            config: Arc::new(config),
        }
    }

    /// Record a risk signal and recompute the aggregate.
    ///
    /// Clamps the value to [0, 100], updates the sub-score, recomputes the
    /// weighted aggregate, and appends a history row with the previous and
    /// new aggregate. Returns the fresh snapshot.
    pub fn record_signal(
        &self,
        subject: &TrustSubject,
        kind: SignalKind,
        value: f64,
        reason: &str,
    ) -> Result<TrustScore> {
        if !value.is_finite() {
            return Err(TrustError::InvalidSignal(format!(
                "{} signal for {} is not finite",
                kind.as_str(),
                subject.user_id
            )));
        }

        let mut entry = self
            .subjects
            .entry(subject.clone())
            .or_insert_with(|| SubjectTrust::new(subject.clone(), &self.config));

        let previous = entry.snapshot.score;
        entry.snapshot.signals.set(kind, value);

        let new_score = self.aggregate(&entry.snapshot.signals);
        entry.snapshot.score = new_score;
        entry.snapshot.calculated_at = Utc::now();
        entry
            .snapshot
            .factors
            .push(format!("{}: {}", kind.as_str(), reason));
        // Factors are a window onto recent signals, not the full record;
        // the history below keeps every transition.
        if entry.snapshot.factors.len() > MAX_FACTORS {
            let excess = entry.snapshot.factors.len() - MAX_FACTORS;
            entry.snapshot.factors.drain(..excess);
        }
        self.reassess(&mut entry.snapshot);

        entry.history.push(TrustScoreChange {
            id: Uuid::new_v4(),
            previous_score: previous,
            new_score,
            signal: kind,
            reason: reason.to_string(),
            recorded_at: Utc::now(),
        });

        debug!(
            user = %subject.user_id,
            signal = kind.as_str(),
            previous,
            new = new_score,
            "trust score recomputed"
        );

        Ok(entry.snapshot.clone())
    }

    /// Latest committed snapshot for a subject, if one exists
    pub fn snapshot(&self, subject: &TrustSubject) -> Option<TrustScore> {
        self.subjects.get(subject).map(|e| e.snapshot.clone())
    }

    /// Current aggregate score. Unseen subjects get the neutral default.
    pub fn score(&self, subject: &TrustSubject) -> f64 {
        self.subjects
            .get(subject)
            .map(|e| e.snapshot.score)
            .unwrap_or(self.config.initial_score)
    }

    /// Full transition history for a subject, oldest first
    pub fn history(&self, subject: &TrustSubject) -> Vec<TrustScoreChange> {
        self.subjects
            .get(subject)
            .map(|e| e.history.clone())
            .unwrap_or_default()
    }

    /// Number of recorded transitions for a subject
    pub fn history_len(&self, subject: &TrustSubject) -> usize {
        self.subjects.get(subject).map(|e| e.history.len()).unwrap_or(0)
    }

    /// Number of tracked subjects
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    /// Weighted aggregate of the sub-scores
    fn aggregate(&self, signals: &SignalScores) -> f64 {
        let total_weight = self.config.total_weight();
        if total_weight <= 0.0 {
            return self.config.initial_score;
        }

        let weighted: f64 = SignalKind::ALL
            .iter()
            .map(|k| signals.get(*k) * self.config.weight(*k))
            .sum();

        (weighted / total_weight).clamp(MIN_SCORE, MAX_SCORE)
    }

    /// Rebuild the risk and recommendation lists from the current sub-scores
    fn reassess(&self, snapshot: &mut TrustScore) {
        snapshot.risks.clear();
        for kind in SignalKind::ALL {
            let value = snapshot.signals.get(kind);
            if value < self.config.risk_threshold {
                snapshot
                    .risks
                    .push(format!("{} score below threshold ({:.1})", kind.as_str(), value));
            }
        }

        snapshot.recommendations.clear();
        if snapshot.score < self.config.step_up_threshold {
            snapshot
                .recommendations
                .push("require step-up verification".to_string());
        }
    }
}

impl Default for TrustTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> TrustSubject {
        TrustSubject::new("user-1", "device-a", "office-lan")
    }

    #[test]
    fn test_unseen_subject_gets_neutral_score() {
        let tracker = TrustTracker::new();
        assert_eq!(tracker.score(&subject()), 50.0);
        assert!(tracker.snapshot(&subject()).is_none());
    }

    #[test]
    fn test_record_signal_moves_aggregate() {
        let tracker = TrustTracker::new();
        let snap = tracker
            .record_signal(&subject(), SignalKind::Authentication, 100.0, "mfa")
            .unwrap();

        // 0.25 weight moved from 50 to 100: aggregate = 50 + 0.25*50 = 62.5
        assert!((snap.score - 62.5).abs() < 1e-9);
        assert_eq!(snap.signals.authentication, 100.0);
    }

    #[test]
    fn test_history_is_append_only() {
        let tracker = TrustTracker::new();
        let s = subject();

        tracker.record_signal(&s, SignalKind::Device, 30.0, "unpatched").unwrap();
        let first = tracker.history(&s);
        assert_eq!(first.len(), 1);

        tracker.record_signal(&s, SignalKind::Network, 80.0, "known vpn").unwrap();
        tracker.record_signal(&s, SignalKind::Behavior, 20.0, "odd hours").unwrap();

        let all = tracker.history(&s);
        assert_eq!(all.len(), 3);
        // Earlier rows are untouched
        assert_eq!(all[0].id, first[0].id);
        assert_eq!(all[0].previous_score, first[0].previous_score);
        assert_eq!(all[0].new_score, first[0].new_score);
        // Transitions chain: each row's previous equals the prior row's new
        assert_eq!(all[1].previous_score, all[0].new_score);
        assert_eq!(all[2].previous_score, all[1].new_score);
    }

    #[test]
    fn test_factors_bounded_history_complete() {
        let tracker = TrustTracker::new();
        let s = subject();

        for i in 0..200 {
            tracker
                .record_signal(&s, SignalKind::Behavior, 60.0, &format!("event-{}", i))
                .unwrap();
        }

        let snap = tracker.snapshot(&s).unwrap();
        assert_eq!(snap.factors.len(), MAX_FACTORS);
        // Oldest factors are dropped, newest kept
        assert!(snap.factors.last().unwrap().contains("event-199"));
        assert!(!snap.factors.iter().any(|f| f.ends_with("event-0")));
        // The history keeps every transition regardless
        assert_eq!(tracker.history_len(&s), 200);
    }

    #[test]
    fn test_signal_value_clamped() {
        let tracker = TrustTracker::new();
        let snap = tracker
            .record_signal(&subject(), SignalKind::Location, 500.0, "impossible travel")
            .unwrap();
        assert_eq!(snap.signals.location, 100.0);
    }

    #[test]
    fn test_non_finite_signal_rejected() {
        let tracker = TrustTracker::new();
        let result = tracker.record_signal(&subject(), SignalKind::Device, f64::NAN, "bad");
        assert!(matches!(result, Err(TrustError::InvalidSignal(_))));
    }

    #[test]
    fn test_low_subscore_reported_as_risk() {
        let tracker = TrustTracker::new();
        let snap = tracker
            .record_signal(&subject(), SignalKind::Behavior, 10.0, "velocity anomaly")
            .unwrap();

        assert!(snap.risks.iter().any(|r| r.contains("behavior")));
        assert!(snap
            .recommendations
            .iter()
            .any(|r| r.contains("step-up")));
    }

    #[test]
    fn test_subjects_are_independent() {
        let tracker = TrustTracker::new();
        let a = TrustSubject::new("user-1", "device-a", "lan");
        let b = TrustSubject::new("user-1", "device-a", "cafe-wifi");

        tracker.record_signal(&a, SignalKind::Network, 90.0, "corp").unwrap();
        assert_eq!(tracker.score(&b), 50.0);
        assert_eq!(tracker.history_len(&b), 0);
    }

    #[test]
    fn test_concurrent_recording() {
        use std::thread;

        let tracker = TrustTracker::new();
        let mut handles = vec![];

        for i in 0..8 {
            let tracker = tracker.clone();
            handles.push(thread::spawn(move || {
                let s = TrustSubject::new(format!("user-{}", i), "device", "lan");
                for _ in 0..10 {
                    tracker.record_signal(&s, SignalKind::Behavior, 70.0, "ok").unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.subject_count(), 8);
        let s = TrustSubject::new("user-0", "device", "lan");
        assert_eq!(tracker.history_len(&s), 10);
    }
}
