use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::{ClientConfig, Transport};
use crate::error::Result;
use crate::grpc_bidi::{self as bidi, Termination};
use crate::grpc_rere::{FleetApi, GrpcRereConnection};
use crate::message_handler as handler;

/// How a session ended. The library never reconnects by itself; a
/// server-requested delay is handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOutcome {
    pub reconnect_after: Option<Duration>,
}

impl SessionOutcome {
    fn from_sleep_duration(sleep_duration: i64) -> Self {
        let reconnect_after = u64::try_from(sleep_duration)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Self { reconnect_after }
    }
}

/// Runs one session against the server using the configured transport.
pub async fn start_client<C>(config: &ClientConfig, client: Arc<C>) -> Result<SessionOutcome>
where
    C: Client + 'static,
{
    info!(
        address = %config.server_address,
        transport = ?config.transport,
        tls = config.use_tls,
        "starting client"
    );
    match config.transport {
        Transport::Rere => {
            let conn = GrpcRereConnection::connect(config).await?;
            run_rere_session(conn, client.as_ref(), config.poll_interval()).await
        }
        Transport::Bidi => run_bidi_session(config, client).await,
    }
}

/// Register, work through tasks until told to stop, deregister. The node is
/// deregistered on the way out even when serving failed.
pub async fn run_rere_session<F: FleetApi>(
    mut conn: GrpcRereConnection<F>,
    client: &dyn Client,
    poll_interval: Duration,
) -> Result<SessionOutcome> {
    conn.create_node().await?;

    let served = serve_tasks(&mut conn, client, poll_interval).await;
    let deleted = conn.delete_node().await;
    let sleep_duration = served?;
    deleted?;

    let session = SessionOutcome::from_sleep_duration(sleep_duration);
    info!(reconnect_after = ?session.reconnect_after, "disconnected");
    Ok(session)
}

async fn serve_tasks<F: FleetApi>(
    conn: &mut GrpcRereConnection<F>,
    client: &dyn Client,
    poll_interval: Duration,
) -> Result<i64> {
    loop {
        let Some(task_ins) = conn.receive().await? else {
            debug!(?poll_interval, "no task received");
            tokio::time::sleep(poll_interval).await;
            continue;
        };

        let outcome = handler::handle(client, task_ins).map_err(|err| {
            warn!(error = %err, "couldn't handle task");
            err
        })?;

        conn.send(outcome.task_res).await?;
        if !outcome.keep_going {
            return Ok(outcome.sleep_duration);
        }
    }
}

async fn run_bidi_session<C>(config: &ClientConfig, client: Arc<C>) -> Result<SessionOutcome>
where
    C: Client + 'static,
{
    let bridge = bidi::open(config, bidi::client_handler(client)).await?;
    let summary = bridge.wait().await?;
    if !summary.failures.is_empty() {
        warn!(count = summary.failures.len(), "messages left unanswered");
    }

    let session = match summary.termination {
        Termination::Failed(err) => return Err(err),
        Termination::Disconnected { sleep_duration } => {
            SessionOutcome::from_sleep_duration(sleep_duration)
        }
        Termination::Completed | Termination::OutboundClosed => SessionOutcome::default(),
    };
    info!(handled = summary.handled, reconnect_after = ?session.reconnect_after, "disconnected");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn non_positive_sleep_means_no_reconnect() {
        assert_eq!(SessionOutcome::from_sleep_duration(0).reconnect_after, None);
        assert_eq!(SessionOutcome::from_sleep_duration(-4).reconnect_after, None);
        assert_eq!(
            SessionOutcome::from_sleep_duration(12).reconnect_after,
            Some(Duration::from_secs(12))
        );
    }
}
