use thiserror::Error;

/// Domain errors raised by the harmonization pipeline.
/// They are surfaced through `anyhow::Result` like every other failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HdError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid configuration value for `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Reprojection from EPSG:{from} to EPSG:{to} requires the `proj` feature")]
    ReprojectionUnavailable { from: i32, to: i32 },

    #[error("Dataset `{name}` is in EPSG:{found}, expected EPSG:{expected}")]
    CrsMismatch {
        name: String,
        found: i32,
        expected: i32,
    },

    #[error("Invalid dataset `{name}`: {reason}")]
    InvalidDataset { name: String, reason: String },

    #[error("Unknown {kind} `{value}`")]
    UnknownValue { kind: &'static str, value: String },
}

impl HdError {
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        HdError::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn dataset(name: &str, reason: impl Into<String>) -> Self {
        HdError::InvalidDataset {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = HdError::ReprojectionUnavailable {
            from: 4326,
            to: 3034,
        };
        assert_eq!(
            err.to_string(),
            "Reprojection from EPSG:4326 to EPSG:3034 requires the `proj` feature"
        );

        let err = HdError::config("grid.stepsize", "must be positive");
        assert!(err.to_string().contains("grid.stepsize"));
    }
}
