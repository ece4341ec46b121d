//! Translates elapsed run time into a target VU count.
use std::time::Duration;
use volley_core::{validate_stages, ConfigurationError, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Vus(u64),
    /// Elapsed time is past the end of the last stage.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    Up(u64),
    Down(u64),
    Hold,
    Complete,
}

#[derive(Debug, Clone)]
pub struct StageScheduler {
    stages: Vec<Stage>,
    total: Duration,
}

impl StageScheduler {
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigurationError> {
        validate_stages(&stages)?;
        let total = stages.iter().map(|s| s.duration).sum();
        Ok(Self { stages, total })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Target VU count at `elapsed`, linearly interpolated between the previous stage's target
    /// (zero before the first stage) and the current stage's target.
    ///
    /// A zero-length stage is an instantaneous jump to its target. At exactly the end of the
    /// last stage this is the final target.
    pub fn target_at(&self, elapsed: Duration) -> Target {
        if elapsed > self.total {
            return Target::Complete;
        }

        let mut stage_start = Duration::ZERO;
        let mut prev_target = 0;
        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let diff = stage.target as f64 - prev_target as f64;
                let target = (prev_target as f64 + diff * progress).round().max(0.);
                return Target::Vus(target as u64);
            }
            stage_start = stage_end;
            prev_target = stage.target;
        }

        Target::Vus(prev_target)
    }

    pub fn decide(&self, elapsed: Duration, current: u64) -> ScaleDecision {
        match self.target_at(elapsed) {
            Target::Complete => ScaleDecision::Complete,
            Target::Vus(target) if target > current => ScaleDecision::Up(target - current),
            Target::Vus(target) if target < current => ScaleDecision::Down(current - target),
            Target::Vus(_) => ScaleDecision::Hold,
        }
    }

    /// Index of the stage running at `elapsed`, skipping zero-length stages.
    pub fn stage_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (i, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return Some(i);
            }
        }
        None
    }
}
