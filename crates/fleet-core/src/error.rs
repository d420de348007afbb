//! Error types for Fleet Core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Latitude or longitude outside the valid range
    #[error("Invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    /// Geofence coordinates do not describe a usable shape
    #[error("Invalid geometry for geofence '{id}': {reason}")]
    InvalidGeometry { id: String, reason: String },

    /// Topic string does not follow `fleet/<entity>/<id>/<facet>`
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// Invalid field value
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_coordinates_display() {
        let err = CoreError::InvalidCoordinates { lat: 91.0, lon: 10.0 };
        assert_eq!(err.to_string(), "Invalid coordinates: lat=91, lon=10");
    }

    #[test]
    fn test_invalid_topic_display() {
        let err = CoreError::InvalidTopic {
            topic: "foo/bar".to_string(),
            reason: "missing root".to_string(),
        };
        assert!(err.to_string().contains("foo/bar"));
        assert!(err.to_string().contains("missing root"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
