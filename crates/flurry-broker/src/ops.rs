//! The three rendezvous operations.
//!
//! These are the concurrent procedures behind the broker's HTTP surface,
//! expressed over opaque byte payloads. Each returns an outcome enum; the
//! transport layer maps outcomes to status codes. No outcome is retried;
//! every failure is terminal for the participating proxy record.

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::debug;

use crate::context::BrokerContext;
use crate::snowflake::PendingProxy;

/// Result of a client posting an offer.
#[derive(Debug, PartialEq, Eq)]
pub enum ClientOutcome {
    /// Matched, and the proxy answered within the budget.
    Matched(Bytes),
    /// No proxy was available; nothing was allocated.
    NoProxies,
    /// Matched, but the proxy stayed silent past the budget.
    TimedOut,
}

/// Result of a proxy long-polling for work.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// A client offer arrived within the budget.
    Offer(Bytes),
    /// No client turned up; the proxy should poll again.
    TimedOut,
}

/// Result of a proxy posting an answer.
#[derive(Debug, PartialEq, Eq)]
pub enum AnswerOutcome {
    Delivered,
    /// The session id resolves to no live record.
    UnknownSession,
    EmptyBody,
}

/// Pairs a client offer with the least-loaded available proxy and waits for
/// that proxy's answer.
///
/// The offer send cannot block: the record was just popped from the
/// registry, which guarantees its receiver loop is active and its one-slot
/// inbox is free. Whatever the outcome, the record's session ends here:
/// a successful exchange is complete, and after a timeout any late answer
/// must be rejected rather than delivered to nobody.
pub async fn client_offer(ctx: &BrokerContext, offer: Bytes) -> ClientOutcome {
    let Some(snowflake) = ctx.pop_snowflake() else {
        debug!("client offer refused, no proxies available");
        return ClientOutcome::NoProxies;
    };

    snowflake.add_client();
    snowflake.send_offer(offer);
    let answer = snowflake.recv_answer(ctx.config().client_timeout).await;
    ctx.end_session(&snowflake);

    match answer {
        Some(bytes) => {
            debug!(id = snowflake.id(), "rendezvous complete");
            ClientOutcome::Matched(bytes)
        }
        None => {
            debug!(id = snowflake.id(), "matched proxy never answered");
            ClientOutcome::TimedOut
        }
    }
}

/// Registers a polling proxy under `id` and waits for a client offer.
///
/// Admission happens on the serialiser; this procedure only parks on the
/// delivery channel. `None` on that channel is the forwarder's timeout
/// signal; an elapsed local budget or a torn-down broker reads the same.
pub async fn proxy_poll(ctx: &BrokerContext, id: &str) -> PollOutcome {
    let (offer_tx, offer_rx) = oneshot::channel();
    ctx.enqueue(PendingProxy {
        id: id.to_owned(),
        offer_tx,
    });

    match tokio::time::timeout(ctx.config().proxy_timeout, offer_rx).await {
        Ok(Ok(Some(offer))) => PollOutcome::Offer(offer),
        _ => PollOutcome::TimedOut,
    }
}

/// Routes a proxy's answer to the client blocked on the matching offer.
///
/// Delivery never blocks: either the client path has a receiver armed, or it
/// has already resigned and the answer is discarded with the record.
pub fn proxy_answer(ctx: &BrokerContext, id: &str, body: Bytes) -> AnswerOutcome {
    let Some(snowflake) = ctx.lookup(id) else {
        debug!(id, "answer for unknown session");
        return AnswerOutcome::UnknownSession;
    };
    if body.is_empty() {
        return AnswerOutcome::EmptyBody;
    }
    snowflake.send_answer(body);
    AnswerOutcome::Delivered
}
