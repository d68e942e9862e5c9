//! Types exchanged with a [`Client`](crate::client::Client) implementation.
//!
//! These mirror the legacy wire records but use plain Rust types, so client
//! code never touches prost structures.

use std::collections::HashMap;

pub type Config = HashMap<String, Scalar>;
pub type Metrics = HashMap<String, Scalar>;
pub type Properties = HashMap<String, Scalar>;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Bytes(Vec<u8>),
    Float(f64),
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Code {
    #[default]
    Ok,
    GetPropertiesNotImplemented,
    GetParametersNotImplemented,
    FitNotImplemented,
    EvaluateNotImplemented,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn ok() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters {
    pub tensors: Vec<Vec<u8>>,
    pub tensor_type: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetParametersIns {
    pub config: Config,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetParametersRes {
    pub status: Status,
    pub parameters: Parameters,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetPropertiesIns {
    pub config: Config,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetPropertiesRes {
    pub status: Status,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitIns {
    pub parameters: Parameters,
    pub config: Config,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitRes {
    pub status: Status,
    pub parameters: Parameters,
    pub num_examples: i64,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateIns {
    pub parameters: Parameters,
    pub config: Config,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateRes {
    pub status: Status,
    pub loss: f32,
    pub num_examples: i64,
    pub metrics: Metrics,
}
