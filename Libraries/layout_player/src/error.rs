//! Error taxonomy shared by the parser, the HTTP sources and the session driver.
//! None of these are process-fatal: every error state is left by issuing a fresh load.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlayerError {
    /// Transport failure or non-success HTTP status while fetching a manifest.
    #[error("failed to fetch manifest {url}: {reason}")]
    ManifestFetch { url: String, reason: String },

    /// The manifest parsed, but no entry resolved to a layout.
    #[error("no layouts found")]
    ManifestParseEmpty,

    /// The playback engine rejected a load, a variant selection or a reload.
    #[error("engine load failed [{category}/{code}]: {message}")]
    EngineLoad {
        code: i64,
        category: String,
        message: String,
    },

    /// The engine never confirmed a layout switch; the controller moved on anyway.
    #[error("switch to layout '{layout}' was not confirmed within {timeout_ms} ms")]
    SwitchTimeout { layout: String, timeout_ms: u64 },

    /// Region metadata could not be fetched; only click-to-switch is degraded.
    #[error("failed to fetch region config: {0}")]
    RegionConfigFetch(String),

    /// No bearer token could be obtained; a manual token can be supplied instead.
    #[error("failed to acquire auth token: {0}")]
    TokenAcquisition(String),
}

impl PlayerError {
    pub fn manifest_fetch<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        Self::ManifestFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Errors that only degrade a feature rather than moving the session to `Error`.
    pub fn is_degraded_only(&self) -> bool {
        matches!(
            self,
            Self::RegionConfigFetch(_) | Self::TokenAcquisition(_) | Self::SwitchTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifest_message_is_user_facing() {
        assert_eq!(PlayerError::ManifestParseEmpty.to_string(), "no layouts found");
    }

    #[test]
    fn engine_errors_carry_code_and_category() {
        let err = PlayerError::EngineLoad {
            code: 1002,
            category: "network".into(),
            message: "bad http status".into(),
        };
        assert_eq!(err.to_string(), "engine load failed [network/1002]: bad http status");
        assert!(!err.is_degraded_only());
    }

    #[test]
    fn region_and_token_errors_only_degrade() {
        assert!(PlayerError::RegionConfigFetch("503".into()).is_degraded_only());
        assert!(PlayerError::TokenAcquisition("blocked".into()).is_degraded_only());
        assert!(!PlayerError::manifest_fetch("http://a/b.m3u8", "404").is_degraded_only());
    }
}
