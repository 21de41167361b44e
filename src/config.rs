//! `PoolConfig`: the construction-time parameters named in `§4.1`/`§6`, plus
//! the ambient knobs a real deployment needs (auditor-loop toggle,
//! force-clean-on-detach, liveness poll interval).

use std::time::Duration;

use crate::error::PoolError;

/// Configuration for a [`crate::PoolHandle`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Byte budget for the CPU pool.
    pub cpu_budget: u64,
    /// Byte budget for each GPU pool (host-visible and device-local share
    /// the same budget value, charged independently).
    pub gpu_budget: u64,
    /// Fraction of `cpu_budget` usable for buffer payload, reserving
    /// headroom for bookkeeping. Spec default: `0.9`.
    pub max_shm_usage_frac: f64,
    /// Whether to spawn the background liveness loop (`§4.8`) on attach.
    pub enable_auditor_loop: bool,
    /// If set, detach clears every process record rather than only this
    /// process's own (test/debug use, `§4.9`).
    pub force_clean_on_detach: bool,
    /// How often the liveness loop re-audits.
    pub liveness_poll_interval: Duration,
}

impl PoolConfig {
    /// Validate field ranges, catching misconfiguration before it produces
    /// confusing runtime behavior.
    pub fn validate(&self) -> Result<(), PoolError> {
        if !(0.0..=1.0).contains(&self.max_shm_usage_frac) {
            return Err(PoolError::InvalidConfig(
                "max_shm_usage_frac must be within [0.0, 1.0]",
            ));
        }
        if self.cpu_budget == 0 {
            return Err(PoolError::InvalidConfig("cpu_budget must be nonzero"));
        }
        if self.liveness_poll_interval.is_zero() {
            return Err(PoolError::InvalidConfig(
                "liveness_poll_interval must be nonzero",
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cpu_budget: crate::util::size::mb(64) as u64,
            gpu_budget: crate::util::size::mb(256) as u64,
            max_shm_usage_frac: 0.9,
            enable_auditor_loop: true,
            force_clean_on_detach: false,
            liveness_poll_interval: Duration::from_millis(250),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn frac_out_of_range_is_rejected() {
        let mut cfg = PoolConfig::default();
        cfg.max_shm_usage_frac = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let mut cfg = PoolConfig::default();
        cfg.cpu_budget = 0;
        assert!(cfg.validate().is_err());
    }
}
