//! Capability service health status.

use serde::{Deserialize, Serialize};

/// Last known health of a capability service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Healthy and accepting requests.
    #[default]
    Online,
    /// Unreachable.
    Offline,
    /// Reachable but answering slowly or with errors.
    Degraded,
    /// Reachable but refusing additional load.
    Overloaded,
}

impl ServiceStatus {
    /// Whether the router may select the service as a candidate.
    #[must_use]
    pub fn is_routable(self) -> bool {
        matches!(self, Self::Online | Self::Degraded)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Degraded => "degraded",
            Self::Overloaded => "overloaded",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routable_statuses() {
        assert!(ServiceStatus::Online.is_routable());
        assert!(ServiceStatus::Degraded.is_routable());
        assert!(!ServiceStatus::Offline.is_routable());
        assert!(!ServiceStatus::Overloaded.is_routable());
    }

    #[test]
    fn display_matches_serde() {
        for status in [
            ServiceStatus::Online,
            ServiceStatus::Offline,
            ServiceStatus::Degraded,
            ServiceStatus::Overloaded,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json.as_str().unwrap(), status.to_string());
        }
    }
}
