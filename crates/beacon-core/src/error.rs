use thiserror::Error;

/// Top-level error type for the Beacon system.
///
/// Subsystem crates define their own error types where the failure modes are
/// specific (voice, location, backend) and convert into `BeaconError` at the
/// crate boundary so that `?` works from the binary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BeaconError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid locale: {0}")]
    InvalidLocale(String),

    #[error("Invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for BeaconError {
    fn from(err: toml::de::Error) -> Self {
        BeaconError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BeaconError {
    fn from(err: toml::ser::Error) -> Self {
        BeaconError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BeaconError {
    fn from(err: serde_json::Error) -> Self {
        BeaconError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Beacon operations.
pub type Result<T> = std::result::Result<T, BeaconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BeaconError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = BeaconError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");

        let err = BeaconError::InvalidLocale("??".to_string());
        assert_eq!(err.to_string(), "Invalid locale: ??");

        let err = BeaconError::UnknownRole("tool".to_string());
        assert_eq!(err.to_string(), "Unknown role: tool");
    }

    #[test]
    fn test_invalid_coordinates_display() {
        let err = BeaconError::InvalidCoordinates {
            latitude: 91.5,
            longitude: -200.0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid coordinates: latitude 91.5, longitude -200"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BeaconError = io_err.into();
        assert!(matches!(err, BeaconError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: BeaconError = parse_err.into();
        assert!(matches!(err, BeaconError::Config(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: BeaconError = json_err.into();
        assert!(matches!(err, BeaconError::Serialization(_)));
    }
}
