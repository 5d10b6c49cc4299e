//! In-memory registry of named calibration sessions.
//!
//! The registry itself is not locked: mutation goes through `&mut self` and
//! sharing across tasks is up to the host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::CalibrationConfig;
use crate::types::{CalibrationMethod, CalibrationProgress, CalibrationResult, GroundTruth, ParameterSet};

use super::calibrator::Calibrator;
use super::objective::SimulationRunner;
use super::CalibrationError;

struct Session {
    calibrator: Arc<Calibrator>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<CalibrationResult>,
}

/// One completed session's position in a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRanking {
    /// 1-based
    pub rank: usize,
    pub name: String,
    pub method: CalibrationMethod,
    pub best_accuracy: f64,
    pub best_score: f64,
    pub success: bool,
    pub n_iterations: usize,
    pub elapsed_seconds: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Completed sessions ordered by best accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionComparison {
    pub rankings: Vec<SessionRanking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_session: Option<String>,
    /// Requested sessions that have not been run yet
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<String>,
}

#[derive(Default)]
pub struct CalibrationManager {
    sessions: BTreeMap<String, Session>,
}

impl CalibrationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Names are unique.
    pub fn create_session<R>(
        &mut self,
        name: impl Into<String>,
        config: CalibrationConfig,
        runner: R,
    ) -> Result<(), CalibrationError>
    where
        R: SimulationRunner + 'static,
    {
        let name = name.into();
        if self.sessions.contains_key(&name) {
            return Err(CalibrationError::DuplicateSession(name));
        }
        let calibrator = Calibrator::new(config, Arc::new(runner))?;
        info!(session = %name, method = %calibrator.config().method, "Calibration session created");
        self.sessions.insert(
            name,
            Session {
                calibrator: Arc::new(calibrator),
                created_at: Utc::now(),
                completed_at: None,
                result: None,
            },
        );
        Ok(())
    }

    /// Run a session to completion, replacing any earlier result.
    pub fn run_session(
        &mut self,
        name: &str,
        ground_truth: &GroundTruth,
        initial: Option<&ParameterSet>,
    ) -> Result<CalibrationResult, CalibrationError> {
        let session = self
            .sessions
            .get_mut(name)
            .ok_or_else(|| CalibrationError::UnknownSession(name.to_string()))?;
        let result = session.calibrator.calibrate(ground_truth, initial);
        session.completed_at = Some(Utc::now());
        session.result = Some(result.clone());
        Ok(result)
    }

    /// Async form of [`run_session`](Self::run_session) on the blocking pool.
    pub async fn run_session_async(
        &mut self,
        name: &str,
        ground_truth: GroundTruth,
        initial: Option<ParameterSet>,
    ) -> Result<CalibrationResult, CalibrationError> {
        let calibrator = self
            .sessions
            .get(name)
            .map(|s| Arc::clone(&s.calibrator))
            .ok_or_else(|| CalibrationError::UnknownSession(name.to_string()))?;
        let result = calibrator.calibrate_async(ground_truth, initial).await?;
        if let Some(session) = self.sessions.get_mut(name) {
            session.completed_at = Some(Utc::now());
            session.result = Some(result.clone());
        }
        Ok(result)
    }

    /// Rank completed sessions by best accuracy (ties keep name order).
    ///
    /// `names` restricts the comparison; `None` compares every session.
    pub fn compare_sessions(&self, names: Option<&[&str]>) -> Result<SessionComparison, CalibrationError> {
        let selected: Vec<(&String, &Session)> = match names {
            Some(names) => names
                .iter()
                .map(|n| {
                    self.sessions
                        .get_key_value(*n)
                        .ok_or_else(|| CalibrationError::UnknownSession((*n).to_string()))
                })
                .collect::<Result<_, _>>()?,
            None => self.sessions.iter().collect(),
        };

        let mut pending = Vec::new();
        let mut rankings = Vec::new();
        for (name, session) in selected {
            let Some(result) = &session.result else {
                pending.push(name.clone());
                continue;
            };
            rankings.push(SessionRanking {
                rank: 0,
                name: name.clone(),
                method: result.method,
                best_accuracy: result.best_metrics.accuracy,
                best_score: result.best_score,
                success: result.success,
                n_iterations: result.n_iterations,
                elapsed_seconds: result.elapsed_seconds,
                created_at: session.created_at,
                completed_at: session.completed_at,
            });
        }

        rankings.sort_by(|a, b| b.best_accuracy.total_cmp(&a.best_accuracy));
        for (i, ranking) in rankings.iter_mut().enumerate() {
            ranking.rank = i + 1;
        }

        Ok(SessionComparison {
            best_session: rankings.first().map(|r| r.name.clone()),
            rankings,
            pending,
        })
    }

    pub fn get_session_progress(&self, name: &str) -> Result<CalibrationProgress, CalibrationError> {
        self.sessions
            .get(name)
            .map(|s| s.calibrator.get_progress())
            .ok_or_else(|| CalibrationError::UnknownSession(name.to_string()))
    }

    pub fn session_result(&self, name: &str) -> Result<Option<&CalibrationResult>, CalibrationError> {
        self.sessions
            .get(name)
            .map(|s| s.result.as_ref())
            .ok_or_else(|| CalibrationError::UnknownSession(name.to_string()))
    }

    pub fn remove_session(&mut self, name: &str) -> Result<(), CalibrationError> {
        self.sessions
            .remove(name)
            .map(|_| info!(session = %name, "Calibration session removed"))
            .ok_or_else(|| CalibrationError::UnknownSession(name.to_string()))
    }

    /// Session names in sorted order.
    pub fn session_names(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
