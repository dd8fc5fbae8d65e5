//! Endpoint kinds, connection interpolation, and processor properties.
//!
//! Shared between the AST and HEART so connection records survive lowering
//! unchanged.

use std::fmt;

/// What flows through an endpoint.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum EndpointKind {
    /// A synchronous sample channel, advanced once per `advance()`.
    Stream,
    /// A control value, stable between changes.
    Value,
    /// Asynchronous typed messages at specific sample indexes.
    Event,
}

impl EndpointKind {
    /// Contextual keyword spelling (`stream`/`value`) or the `event`
    /// keyword.
    pub fn text(self) -> &'static str {
        match self {
            EndpointKind::Stream => "stream",
            EndpointKind::Value => "value",
            EndpointKind::Event => "event",
        }
    }

    pub fn from_text(s: &str) -> Option<Self> {
        Some(match s {
            "stream" => EndpointKind::Stream,
            "value" => EndpointKind::Value,
            "event" => EndpointKind::Event,
            _ => return None,
        })
    }

    pub fn is_event(self) -> bool {
        self == EndpointKind::Event
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Resampling mode for a connection whose source and destination run at
/// different clock rates.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum InterpolationType {
    #[default]
    None,
    Latch,
    Linear,
    Sinc,
    Fast,
    Best,
}

impl InterpolationType {
    pub fn text(self) -> &'static str {
        match self {
            InterpolationType::None => "none",
            InterpolationType::Latch => "latch",
            InterpolationType::Linear => "linear",
            InterpolationType::Sinc => "sinc",
            InterpolationType::Fast => "fast",
            InterpolationType::Best => "best",
        }
    }

    pub fn from_text(s: &str) -> Option<Self> {
        Some(match s {
            "none" => InterpolationType::None,
            "latch" => InterpolationType::Latch,
            "linear" => InterpolationType::Linear,
            "sinc" => InterpolationType::Sinc,
            "fast" => InterpolationType::Fast,
            "best" => InterpolationType::Best,
            _ => return None,
        })
    }
}

/// Built-in `processor.xyz` property expressions.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ProcessorProperty {
    /// Samples per second the processor runs at (float64).
    Frequency,
    /// Seconds per sample (float64).
    Period,
    /// Unique instance id within the session (int32).
    Id,
    /// Session id (int32).
    Session,
}

impl ProcessorProperty {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "frequency" => ProcessorProperty::Frequency,
            "period" => ProcessorProperty::Period,
            "id" => ProcessorProperty::Id,
            "session" => ProcessorProperty::Session,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcessorProperty::Frequency => "frequency",
            ProcessorProperty::Period => "period",
            ProcessorProperty::Id => "id",
            ProcessorProperty::Session => "session",
        }
    }

    /// True for the float64-typed properties.
    pub fn is_float(self) -> bool {
        matches!(self, ProcessorProperty::Frequency | ProcessorProperty::Period)
    }
}
