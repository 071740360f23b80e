//! Beacon Location crate - single-shot geolocation bridge.
//!
//! Provides a trait-based abstraction over the platform's position source,
//! a bridge that bounds each lookup with a timeout, and simple providers for
//! fixed, denied, and unavailable positions.

use std::time::Duration;

use async_trait::async_trait;

use beacon_core::config::LocationConfig;
use beacon_core::types::Coordinates;

// =============================================================================
// Errors
// =============================================================================

/// Why no position could be obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable: {0}")]
    Unavailable(String),
    #[error("location lookup timed out after {0} seconds")]
    Timeout(u64),
}

// =============================================================================
// Trait
// =============================================================================

/// Source of the device's current position.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Resolve the current position once. No polling, no tracking.
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

// =============================================================================
// Bridge
// =============================================================================

/// Wraps a provider so every lookup is bounded in time and validated.
pub struct LocationBridge {
    provider: Box<dyn LocationProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for LocationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationBridge")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LocationBridge {
    pub fn new(provider: Box<dyn LocationProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Build the bridge described by the `[location]` config section.
    pub fn from_config(config: &LocationConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let provider: Box<dyn LocationProvider> = if !config.enabled {
            Box::new(DeniedLocationProvider)
        } else {
            match (config.latitude, config.longitude) {
                (Some(latitude), Some(longitude)) => Box::new(StaticLocationProvider::new(
                    Coordinates {
                        latitude,
                        longitude,
                    },
                )),
                _ => Box::new(UnavailableLocationProvider::new("no position source configured")),
            }
        };
        Self::new(provider, timeout)
    }

    /// Single-shot position lookup.
    pub async fn get_current_position(&self) -> Result<Coordinates, LocationError> {
        let secs = self.timeout.as_secs();
        let coords = tokio::time::timeout(self.timeout, self.provider.current_position())
            .await
            .map_err(|_| LocationError::Timeout(secs))??;

        // Reject fixes a broken provider might report.
        let coords = Coordinates::new(coords.latitude, coords.longitude)
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;
        tracing::debug!(
            latitude = coords.latitude,
            longitude = coords.longitude,
            "Position resolved"
        );
        Ok(coords)
    }
}

// =============================================================================
// Providers
// =============================================================================

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct StaticLocationProvider {
    coordinates: Coordinates,
}

impl StaticLocationProvider {
    pub fn new(coordinates: Coordinates) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl LocationProvider for StaticLocationProvider {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Ok(self.coordinates)
    }
}

/// The user has not granted location access.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeniedLocationProvider;

#[async_trait]
impl LocationProvider for DeniedLocationProvider {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::PermissionDenied)
    }
}

/// No position source exists on this platform.
#[derive(Debug, Clone)]
pub struct UnavailableLocationProvider {
    reason: String,
}

impl UnavailableLocationProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LocationProvider for UnavailableLocationProvider {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::Unavailable(self.reason.clone()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowProvider;

    #[async_trait]
    impl LocationProvider for SlowProvider {
        async fn current_position(&self) -> Result<Coordinates, LocationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Coordinates {
                latitude: 0.0,
                longitude: 0.0,
            })
        }
    }

    fn bridge(provider: impl LocationProvider + 'static) -> LocationBridge {
        LocationBridge::new(Box::new(provider), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_static_provider_resolves() {
        let coords = Coordinates::new(51.5074, -0.1278).unwrap();
        let result = bridge(StaticLocationProvider::new(coords))
            .get_current_position()
            .await
            .unwrap();
        assert_eq!(result, coords);
    }

    #[tokio::test]
    async fn test_denied_provider() {
        let err = bridge(DeniedLocationProvider)
            .get_current_position()
            .await
            .unwrap_err();
        assert_eq!(err, LocationError::PermissionDenied);
        assert_eq!(err.to_string(), "location permission denied");
    }

    #[tokio::test]
    async fn test_unavailable_provider() {
        let err = bridge(UnavailableLocationProvider::new("no gps"))
            .get_current_position()
            .await
            .unwrap_err();
        assert_eq!(err, LocationError::Unavailable("no gps".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let err = bridge(SlowProvider).get_current_position().await.unwrap_err();
        assert_eq!(err, LocationError::Timeout(5));
    }

    #[tokio::test]
    async fn test_out_of_range_fix_rejected() {
        let broken = StaticLocationProvider::new(Coordinates {
            latitude: 123.0,
            longitude: 0.0,
        });
        let err = bridge(broken).get_current_position().await.unwrap_err();
        assert!(matches!(err, LocationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_from_config_variants() {
        let disabled = LocationConfig {
            enabled: false,
            latitude: Some(1.0),
            longitude: Some(2.0),
            ..LocationConfig::default()
        };
        assert_eq!(
            LocationBridge::from_config(&disabled)
                .get_current_position()
                .await
                .unwrap_err(),
            LocationError::PermissionDenied
        );

        let missing = LocationConfig::default();
        assert!(matches!(
            LocationBridge::from_config(&missing)
                .get_current_position()
                .await
                .unwrap_err(),
            LocationError::Unavailable(_)
        ));

        let fixed = LocationConfig {
            latitude: Some(-33.8688),
            longitude: Some(151.2093),
            ..LocationConfig::default()
        };
        let coords = LocationBridge::from_config(&fixed)
            .get_current_position()
            .await
            .unwrap();
        assert_eq!(coords.latitude, -33.8688);
        assert_eq!(coords.longitude, 151.2093);
    }
}
