//! Dispatch of legacy server messages to a `Client`.

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::proto;
use crate::serde;
use crate::task_handler;

/// Reply to one legacy server message.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyOutcome {
    pub message: proto::ClientMessage,
    /// Seconds the server asked us to wait before reconnecting; zero means
    /// disconnect for good.
    pub sleep_duration: i64,
    pub keep_going: bool,
}

/// Reply to one `TaskIns`, ready to be stamped and pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub task_res: proto::TaskRes,
    pub sleep_duration: i64,
    pub keep_going: bool,
}

fn reconnect(reconnect_msg: proto::server_message::ReconnectIns) -> (proto::ClientMessage, i64) {
    let (reason, sleep_duration) = if reconnect_msg.seconds != 0 {
        (proto::Reason::Reconnect, reconnect_msg.seconds)
    } else {
        (proto::Reason::Ack, 0)
    };

    let disconnect_res = proto::client_message::DisconnectRes {
        reason: reason.into(),
    };
    let message = proto::ClientMessage {
        msg: Some(proto::client_message::Msg::DisconnectRes(disconnect_res)),
    };
    (message, sleep_duration)
}

fn client_message(msg: proto::client_message::Msg) -> proto::ClientMessage {
    proto::ClientMessage { msg: Some(msg) }
}

pub fn handle_legacy_message(
    client: &dyn Client,
    server_msg: proto::ServerMessage,
) -> Result<LegacyOutcome> {
    use proto::client_message::Msg as Reply;
    use proto::server_message::Msg;

    let message = match server_msg.msg {
        Some(Msg::ReconnectIns(reconnect_ins)) => {
            let (message, sleep_duration) = reconnect(reconnect_ins);
            return Ok(LegacyOutcome {
                message,
                sleep_duration,
                keep_going: false,
            });
        }
        Some(Msg::GetPropertiesIns(ins)) => {
            let res = client.get_properties(serde::get_properties_ins_from_proto(ins)?);
            client_message(Reply::GetPropertiesRes(serde::get_properties_res_to_proto(res)))
        }
        Some(Msg::GetParametersIns(ins)) => {
            let res = client.get_parameters(serde::get_parameters_ins_from_proto(ins)?);
            client_message(Reply::GetParametersRes(serde::get_parameters_res_to_proto(res)))
        }
        Some(Msg::FitIns(ins)) => {
            let res = client.fit(serde::fit_ins_from_proto(ins)?);
            client_message(Reply::FitRes(serde::fit_res_to_proto(res)))
        }
        Some(Msg::EvaluateIns(ins)) => {
            let res = client.evaluate(serde::evaluate_ins_from_proto(ins)?);
            client_message(Reply::EvaluateRes(serde::evaluate_res_to_proto(res)))
        }
        None => {
            return Err(ClientError::ProtocolMismatch(
                "Unknown server message".to_string(),
            ))
        }
    };

    Ok(LegacyOutcome {
        message,
        sleep_duration: 0,
        keep_going: true,
    })
}

pub fn handle(client: &dyn Client, task_ins: proto::TaskIns) -> Result<TaskOutcome> {
    let server_msg =
        task_handler::get_server_message_from_task_ins(&task_ins, false).ok_or_else(|| {
            ClientError::ProtocolMismatch(format!(
                "TaskIns {} carries no legacy server message",
                task_ins.task_id
            ))
        })?;

    let outcome = handle_legacy_message(client, server_msg)?;
    Ok(TaskOutcome {
        task_res: task_handler::wrap_client_message_in_task_res(outcome.message),
        sleep_duration: outcome.sleep_duration,
        keep_going: outcome.keep_going,
    })
}
