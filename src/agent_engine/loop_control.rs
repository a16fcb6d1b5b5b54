use std::time::Instant;

use crate::agent_engine::state::LoopConfig;

pub struct LoopController {
    config: LoopConfig,
    start_time: Instant,
    profiles: u32,
    idle_streak: u32,
}

impl LoopController {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            profiles: 0,
            idle_streak: 0,
        }
    }

    pub fn profiles_evaluated(&self) -> u32 {
        self.profiles
    }

    pub fn record_profile(&mut self) {
        self.profiles += 1;
        self.idle_streak = 0;
    }

    /// Count a non-profile cycle. True when a popup dismissal is due; the streak
    /// then starts over.
    pub fn record_idle(&mut self) -> bool {
        if self.config.popup_after_idle_cycles == 0 {
            return false;
        }
        self.idle_streak += 1;
        if self.idle_streak >= self.config.popup_after_idle_cycles {
            self.idle_streak = 0;
            return true;
        }
        false
    }

    /// Why the loop should stop, if a limit is reached.
    pub fn stop_reason(&self) -> Option<String> {
        if let Some(max) = self.config.max_profiles {
            if self.profiles >= max {
                return Some(format!("evaluated {} of {max} profiles", self.profiles));
            }
        }
        if let Some(max_min) = self.config.max_duration_minutes {
            if self.start_time.elapsed().as_secs() / 60 >= max_min as u64 {
                return Some(format!("ran for {max_min} minutes"));
            }
        }
        None
    }

    pub fn should_stop(&self) -> bool {
        self.stop_reason().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_by_default() {
        let mut ctrl = LoopController::new(LoopConfig::default());
        for _ in 0..100 {
            ctrl.record_profile();
        }
        assert!(!ctrl.should_stop());
        assert!(!ctrl.record_idle());
    }

    #[test]
    fn stops_after_max_profiles() {
        let mut ctrl = LoopController::new(LoopConfig {
            max_profiles: Some(2),
            ..Default::default()
        });
        ctrl.record_profile();
        assert!(!ctrl.should_stop());
        ctrl.record_profile();
        assert_eq!(ctrl.stop_reason().as_deref(), Some("evaluated 2 of 2 profiles"));
    }

    #[test]
    fn zero_minutes_stops_immediately() {
        let ctrl = LoopController::new(LoopConfig {
            max_duration_minutes: Some(0),
            ..Default::default()
        });
        assert!(ctrl.should_stop());
    }

    #[test]
    fn popup_due_every_n_idle_cycles() {
        let mut ctrl = LoopController::new(LoopConfig {
            popup_after_idle_cycles: 2,
            ..Default::default()
        });
        assert!(!ctrl.record_idle());
        assert!(ctrl.record_idle());
        assert!(!ctrl.record_idle());
        ctrl.record_profile();
        assert!(!ctrl.record_idle());
        assert!(ctrl.record_idle());
    }
}
