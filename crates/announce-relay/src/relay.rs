//! Update loop: long-poll the Bot API and dispatch each update.

use std::sync::Arc;
use std::time::Duration;

use announce_core::coordinator::NOT_AVAILABLE_TEXT;
use announce_core::{Coordinator, InboundEvent, Outcome, Transport};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::telegram::{Routed, TelegramClient, route};

/// Fibonacci delay sequence in seconds (capped at 21s) between failed polls.
const FIB_DELAYS: [u64; 8] = [1, 1, 2, 3, 5, 8, 13, 21];

/// Poll forever. Every update is handled on its own task in `tasks`, so a
/// slow fan-out never holds up the next button press.
pub async fn run(
    client: Arc<TelegramClient>,
    coordinator: Arc<Coordinator>,
    poll_timeout_secs: u64,
    tasks: &mut JoinSet<()>,
) {
    let mut offset = 0;
    let mut fib_index = 0;

    loop {
        reap(tasks);
        match client.get_updates(offset, poll_timeout_secs).await {
            Ok(updates) => {
                fib_index = 0;
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let update_id = update.update_id;
                    match route(update) {
                        Routed::Event(event) => dispatch(update_id, event, &coordinator, tasks),
                        Routed::UnknownCallback(callback_id) => {
                            let client = client.clone();
                            tasks.spawn(async move {
                                if let Err(e) = client.acknowledge_decision(&callback_id, NOT_AVAILABLE_TEXT).await {
                                    warn!("Failed to answer unknown callback {callback_id}: {e}");
                                }
                            });
                        }
                        Routed::Ignored => debug!("Ignoring update {update_id}"),
                    }
                }
            }
            Err(e) => {
                let delay = FIB_DELAYS[fib_index];
                warn!("Polling failed: {e}; retrying in {delay}s");
                tokio::time::sleep(Duration::from_secs(delay)).await;
                fib_index = (fib_index + 1).min(FIB_DELAYS.len() - 1);
            }
        }
    }
}

fn dispatch(update_id: i64, event: InboundEvent, coordinator: &Arc<Coordinator>, tasks: &mut JoinSet<()>) {
    let coordinator = coordinator.clone();
    tasks.spawn(async move {
        match coordinator.handle(event).await {
            Ok(Outcome::Sent(report)) if !report.failed.is_empty() => {
                warn!(
                    "Update {update_id}: broadcast reached {} of {} recipients",
                    report.delivered,
                    report.attempted()
                );
            }
            Ok(outcome) => debug!("Update {update_id} handled: {outcome:?}"),
            Err(e) => error!("Update {update_id} failed: {e}"),
        }
    });
}

/// Collect finished update tasks.
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            error!("Update task panicked: {e}");
        }
    }
}

/// Wait up to `grace` for in-flight updates, then abort the rest.
/// Returns how many were aborted.
pub async fn drain(tasks: &mut JoinSet<()>, grace: Duration) -> usize {
    let finished = tokio::time::timeout(grace, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Update task panicked: {e}");
            }
        }
    })
    .await;
    if finished.is_ok() {
        return 0;
    }
    let aborted = tasks.len();
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    aborted
}

/// Log who we are before polling starts.
pub async fn announce(client: &TelegramClient) -> Result<(), announce_core::TransportError> {
    let me = client.get_me().await?;
    info!(
        "Bot started successfully as @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_waits_for_quick_tasks() {
        let mut tasks = JoinSet::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(());
        });

        assert_eq!(drain(&mut tasks, Duration::from_secs(5)).await, 0);
        assert!(rx.await.is_ok());
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn drain_aborts_stuck_tasks_after_grace() {
        let mut tasks = JoinSet::new();
        tasks.spawn(async {});
        tasks.spawn(std::future::pending::<()>());

        assert_eq!(drain(&mut tasks, Duration::from_millis(50)).await, 1);
        assert!(tasks.is_empty());
    }
}
