use std::path::PathBuf;

use thiserror::Error;

use crate::floating_type_mod::FT;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("unknown parameter '{name}'")]
    Unknown { name: String },

    #[error("parameter '{name}' is read-only")]
    ReadOnly { name: String },

    #[error("parameter '{name}' must be at least {min} (got {value})")]
    BelowMinimum { name: String, value: FT, min: FT },

    #[error("parameter '{name}' expects {expected} (got '{value}')")]
    WrongType {
        name: String,
        expected: &'static str,
        value: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed reading '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed parsing '{path}'")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to unpack configuration")]
    Unpack(#[from] serde_yaml::Error),

    #[error("not able to find attribute '{0}' in the simulation config")]
    UnknownOverride(String),

    #[error("invalid value for '{name}': {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("malformed parameter assignment '{0}' (expected NAME=VALUE)")]
    MalformedAssignment(String),

    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
