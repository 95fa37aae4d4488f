//! Environment-driven iteration diagnostics (`QPSOLVER_DIAGNOSTICS`,
//! `QPSOLVER_DIAGNOSTICS_EVERY`), emitted through `log::debug!`.

use std::env;

/// Per-iteration debug logging switches.
#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    /// Emit the step breakdown (α_aff, μ_aff, min s, min z, retry flag)
    pub enabled: bool,
    /// Log every k-th iteration only
    pub every: usize,
}

impl DiagnosticsConfig {
    pub fn from_env() -> Self {
        let enabled = match env::var("QPSOLVER_DIAGNOSTICS") {
            Ok(v) => v != "0" && v.to_lowercase() != "false",
            Err(_) => false,
        };

        let every = env::var("QPSOLVER_DIAGNOSTICS_EVERY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(1);

        Self { enabled, every }
    }

    #[inline]
    pub fn should_log(&self, iter: usize) -> bool {
        self.enabled && (iter % self.every == 0)
    }
}
