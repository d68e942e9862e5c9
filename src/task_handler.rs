use crate::proto;

/// A `TaskIns` is usable when it carries a task with either a legacy server
/// message or a secure-aggregation block. With `discard_reconnect_ins`, a
/// legacy `ReconnectIns` does not count.
pub fn validate_task_ins(task_ins: &proto::TaskIns, discard_reconnect_ins: bool) -> bool {
    let Some(task) = &task_ins.task else {
        return false;
    };

    let has_legacy_server_msg = task.legacy_server_message.as_ref().is_some_and(|msg| {
        !(discard_reconnect_ins
            && matches!(msg.msg, Some(proto::server_message::Msg::ReconnectIns(..))))
    });

    has_legacy_server_msg || task.sa.is_some()
}

/// A `TaskRes` is valid only while unstamped: ids, producer, consumer and
/// ancestry are filled in by [`configure_task_res`] right before it is pushed.
pub fn validate_task_res(task_res: &proto::TaskRes) -> bool {
    let task_res_is_uninitialized =
        task_res.task_id.is_empty() && task_res.group_id.is_empty() && task_res.workload_id == 0;

    let task_is_uninitialized = task_res.task.as_ref().map_or(true, |task| {
        task.producer.is_none() && task.consumer.is_none() && task.ancestry.is_empty()
    });

    task_res_is_uninitialized && task_is_uninitialized
}

/// Only the head of the list is considered; one task surfaces per pull.
pub fn get_task_ins(response: &proto::PullTaskInsResponse) -> Option<proto::TaskIns> {
    response.task_ins_list.first().cloned()
}

pub fn get_server_message_from_task_ins(
    task_ins: &proto::TaskIns,
    exclude_reconnect_ins: bool,
) -> Option<proto::ServerMessage> {
    if !validate_task_ins(task_ins, exclude_reconnect_ins) {
        return None;
    }
    task_ins
        .task
        .as_ref()
        .and_then(|task| task.legacy_server_message.clone())
}

pub fn wrap_client_message_in_task_res(client_message: proto::ClientMessage) -> proto::TaskRes {
    proto::TaskRes {
        task: Some(proto::Task {
            legacy_client_message: Some(client_message),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Stamps a result with the identity of the instruction it answers.
pub fn configure_task_res(
    mut task_res: proto::TaskRes,
    ref_task_ins: &proto::TaskIns,
    producer: proto::Node,
) -> proto::TaskRes {
    task_res.task_id = String::new();
    task_res.group_id = ref_task_ins.group_id.clone();
    task_res.workload_id = ref_task_ins.workload_id;

    let task = task_res.task.get_or_insert_with(proto::Task::default);
    task.producer = Some(producer);
    task.consumer = ref_task_ins.task.as_ref().and_then(|t| t.producer.clone());
    task.ancestry = vec![ref_task_ins.task_id.clone()];

    task_res
}
