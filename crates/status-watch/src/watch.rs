//! Watch command - follow live service status

use std::future::Future;
use std::io;

use anyhow::{bail, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use status_stream::{CloseReason, StatusClient, Subscription, SubscriptionState};
use tokio::sync::{mpsc, watch};

use crate::output::{OutputContext, TerminalSink};

/// Subscribe to every service and print statuses until Ctrl+C
///
/// Returns an error if any subscription ended with a terminal failure.
pub async fn watch(client: &StatusClient, services: &[String], ctx: &OutputContext) -> Result<()> {
    let prefix = services.len() > 1;
    let (write_errors_tx, write_errors) = mpsc::unbounded_channel();

    let mut subscriptions: Vec<(&str, Subscription)> = Vec::with_capacity(services.len());
    for service in services {
        let sink = TerminalSink::new(
            service.as_str(),
            ctx.format,
            prefix,
            write_errors_tx.clone(),
        );
        let subscription = client
            .open(service, sink)
            .with_context(|| format!("Failed to subscribe to '{}'", service))?;

        ctx.info(&format!("Watching {} ({})", service, subscription.url()));
        tokio::spawn(report_state(
            service.clone(),
            subscription.watch_state(),
            ctx.clone(),
        ));
        subscriptions.push((service.as_str(), subscription));
    }
    drop(write_errors_tx);
    ctx.info("Press Ctrl+C to stop");

    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")
    };
    follow(&subscriptions, write_errors, ctrl_c, ctx).await
}

/// Wait for `shutdown`, an output failure, or every subscription to close
///
/// All subscriptions are closed on return. A closed stdout ends the watch
/// quietly; any other write error or a terminal failure is an error.
async fn follow<F>(
    subscriptions: &[(&str, Subscription)],
    mut write_errors: mpsc::UnboundedReceiver<io::Error>,
    shutdown: F,
    ctx: &OutputContext,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let mut failures = 0usize;
    let mut write_error = None;
    {
        let mut closed: FuturesUnordered<_> = subscriptions
            .iter()
            .map(|(service, subscription)| async move { (*service, subscription.closed().await) })
            .collect();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result?;
                    ctx.info("\nStopping...");
                    break;
                }
                Some(e) = write_errors.recv() => {
                    write_error = Some(e);
                    break;
                }
                next = closed.next() => match next {
                    Some((service, CloseReason::Terminal(e))) => {
                        failures += 1;
                        ctx.error(&format!("{}: stream closed: {}", service, e));
                    }
                    Some((_, CloseReason::Cancelled)) => {}
                    None => break,
                },
            }
        }
    }

    for (_, subscription) in subscriptions {
        subscription.close();
    }

    match write_error {
        Some(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
        Some(e) => return Err(e).context("Failed to write status"),
        None => {}
    }
    if failures > 0 {
        bail!("{} of {} subscription(s) failed", failures, subscriptions.len());
    }
    Ok(())
}

/// Print connection changes of one subscription
async fn report_state(
    service: String,
    mut state: watch::Receiver<SubscriptionState>,
    ctx: OutputContext,
) {
    let mut was_open = false;
    while state.changed().await.is_ok() {
        let current = state.borrow_and_update().clone();
        match current {
            SubscriptionState::Open => {
                was_open = true;
                ctx.success(&format!("{}: connected", service));
            }
            SubscriptionState::Connecting if was_open => {
                was_open = false;
                ctx.warn(&format!("{}: connection lost, reconnecting...", service));
            }
            SubscriptionState::Connecting => {}
            SubscriptionState::Closed(_) => break,
        }
    }
}
