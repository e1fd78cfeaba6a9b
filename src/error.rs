use crate::Approach;

/// Reasons a [JunctionConfig](crate::JunctionConfig) is rejected before a run starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The inbound rate of an approach differs from the sum of its outbound rates.
    #[error(
        "inbound value for {approach} ({inbound} vph) must be equal to the sum of its outbound values ({outbound} vph)"
    )]
    FlowMismatch {
        approach: Approach,
        inbound: u32,
        outbound: u32,
    },

    /// A rate is above the maximum.
    #[error("{approach} {field} value {value} vph must not exceed {max} vph")]
    RateOutOfRange {
        approach: Approach,
        field: String,
        value: u32,
        max: u32,
    },

    /// An approach names itself as an outbound destination.
    #[error("{approach} cannot send traffic back to {approach}")]
    UTurnFlow { approach: Approach },

    /// No flow would be generated.
    #[error("all values cannot be zero")]
    AllZero,

    /// The lane count is outside the supported range.
    #[error("number of lanes must be between {min} and {max}, got {value}")]
    LaneCount { value: u8, min: u8, max: u8 },
}

/// Errors raised by the simulation core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    /// The run configuration failed validation.
    #[error("invalid junction configuration: {0}")]
    Config(#[from] ConfigError),

    /// A vehicle was asked to leave by the approach it entered from.
    #[error("no path exists from {from} back to {from}")]
    UTurn { from: Approach },

    /// The operation requires a started run.
    #[error("the simulation has not been started")]
    NotRunning,
}
