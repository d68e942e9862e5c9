//! Conversions between the wire records and the client-facing types.

use crate::error::{ClientError, Result};
use crate::proto;
use crate::typing as local;

pub fn parameters_to_proto(parameters: local::Parameters) -> proto::Parameters {
    proto::Parameters {
        tensors: parameters.tensors,
        tensor_type: parameters.tensor_type,
    }
}

pub fn parameters_from_proto(params_msg: proto::Parameters) -> local::Parameters {
    local::Parameters {
        tensors: params_msg.tensors,
        tensor_type: params_msg.tensor_type,
    }
}

pub fn scalar_to_proto(scalar: local::Scalar) -> proto::Scalar {
    let value = match scalar {
        local::Scalar::Bool(value) => proto::scalar::Scalar::Bool(value),
        local::Scalar::Bytes(value) => proto::scalar::Scalar::Bytes(value),
        local::Scalar::Float(value) => proto::scalar::Scalar::Double(value),
        local::Scalar::Int(value) => proto::scalar::Scalar::Sint64(value),
        local::Scalar::Str(value) => proto::scalar::Scalar::String(value),
    };
    proto::Scalar {
        scalar: Some(value),
    }
}

pub fn scalar_from_proto(scalar_msg: proto::Scalar) -> Result<local::Scalar> {
    match scalar_msg.scalar {
        Some(proto::scalar::Scalar::Double(value)) => Ok(local::Scalar::Float(value)),
        Some(proto::scalar::Scalar::Sint64(value)) => Ok(local::Scalar::Int(value)),
        Some(proto::scalar::Scalar::Bool(value)) => Ok(local::Scalar::Bool(value)),
        Some(proto::scalar::Scalar::String(value)) => Ok(local::Scalar::Str(value)),
        Some(proto::scalar::Scalar::Bytes(value)) => Ok(local::Scalar::Bytes(value)),
        None => Err(ClientError::ProtocolMismatch(
            "Scalar carries no value".to_string(),
        )),
    }
}

/// Converts a config/metrics/properties map; fails on the first empty scalar.
pub fn scalar_map_from_proto(map: proto::ScalarMap) -> Result<local::Config> {
    map.into_iter()
        .map(|(key, value)| Ok((key, scalar_from_proto(value)?)))
        .collect()
}

pub fn scalar_map_to_proto(map: local::Config) -> proto::ScalarMap {
    map.into_iter()
        .map(|(key, value)| (key, scalar_to_proto(value)))
        .collect()
}

fn code_to_proto(code: local::Code) -> proto::Code {
    match code {
        local::Code::Ok => proto::Code::Ok,
        local::Code::GetPropertiesNotImplemented => proto::Code::GetPropertiesNotImplemented,
        local::Code::GetParametersNotImplemented => proto::Code::GetParametersNotImplemented,
        local::Code::FitNotImplemented => proto::Code::FitNotImplemented,
        local::Code::EvaluateNotImplemented => proto::Code::EvaluateNotImplemented,
    }
}

fn status_to_proto(status: local::Status) -> proto::Status {
    proto::Status {
        code: code_to_proto(status.code).into(),
        message: status.message,
    }
}

fn required_parameters(parameters: Option<proto::Parameters>, ins: &str) -> Result<local::Parameters> {
    parameters
        .map(parameters_from_proto)
        .ok_or_else(|| ClientError::ProtocolMismatch(format!("{} without parameters", ins)))
}

pub fn get_parameters_ins_from_proto(
    msg: proto::server_message::GetParametersIns,
) -> Result<local::GetParametersIns> {
    Ok(local::GetParametersIns {
        config: scalar_map_from_proto(msg.config)?,
    })
}

pub fn get_parameters_res_to_proto(
    res: local::GetParametersRes,
) -> proto::client_message::GetParametersRes {
    proto::client_message::GetParametersRes {
        status: Some(status_to_proto(res.status)),
        parameters: Some(parameters_to_proto(res.parameters)),
    }
}

pub fn get_properties_ins_from_proto(
    msg: proto::server_message::GetPropertiesIns,
) -> Result<local::GetPropertiesIns> {
    Ok(local::GetPropertiesIns {
        config: scalar_map_from_proto(msg.config)?,
    })
}

pub fn get_properties_res_to_proto(
    res: local::GetPropertiesRes,
) -> proto::client_message::GetPropertiesRes {
    proto::client_message::GetPropertiesRes {
        status: Some(status_to_proto(res.status)),
        properties: scalar_map_to_proto(res.properties),
    }
}

pub fn fit_ins_from_proto(msg: proto::server_message::FitIns) -> Result<local::FitIns> {
    Ok(local::FitIns {
        parameters: required_parameters(msg.parameters, "FitIns")?,
        config: scalar_map_from_proto(msg.config)?,
    })
}

pub fn fit_res_to_proto(res: local::FitRes) -> proto::client_message::FitRes {
    proto::client_message::FitRes {
        status: Some(status_to_proto(res.status)),
        parameters: Some(parameters_to_proto(res.parameters)),
        num_examples: res.num_examples,
        metrics: scalar_map_to_proto(res.metrics),
    }
}

pub fn evaluate_ins_from_proto(
    msg: proto::server_message::EvaluateIns,
) -> Result<local::EvaluateIns> {
    Ok(local::EvaluateIns {
        parameters: required_parameters(msg.parameters, "EvaluateIns")?,
        config: scalar_map_from_proto(msg.config)?,
    })
}

pub fn evaluate_res_to_proto(res: local::EvaluateRes) -> proto::client_message::EvaluateRes {
    proto::client_message::EvaluateRes {
        status: Some(status_to_proto(res.status)),
        loss: res.loss,
        num_examples: res.num_examples,
        metrics: scalar_map_to_proto(res.metrics),
    }
}
