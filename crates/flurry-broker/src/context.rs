//! Broker context: availability registry, session index, and the admission
//! serialiser.
//!
//! All registry and session-index mutation happens under one linearisation:
//! admissions funnel through an unbounded channel drained by a single
//! serialiser task, and every other mutation (pop, expiry, retirement) takes
//! the one state mutex. The mutex is `std::sync` and is never held across an
//! await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::heap::SnowflakeHeap;
use crate::snowflake::{PendingProxy, Snowflake};

struct BrokerState {
    snowflakes: SnowflakeHeap,
    id_map: HashMap<String, Arc<Snowflake>>,
}

impl BrokerState {
    /// Drops the session-index entry for `snowflake`, identity-guarded: a
    /// record displaced by a duplicate poll cannot evict its successor.
    fn remove_session(&mut self, snowflake: &Arc<Snowflake>) {
        let is_current = self
            .id_map
            .get(snowflake.id())
            .is_some_and(|current| Arc::ptr_eq(current, snowflake));
        if is_current {
            self.id_map.remove(snowflake.id());
        }
    }
}

/// Singleton coordinator owning the registry and session index.
///
/// One instance per process; request handlers share it behind `Arc`.
pub struct BrokerContext {
    state: Mutex<BrokerState>,
    create_tx: mpsc::UnboundedSender<PendingProxy>,
    create_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PendingProxy>>,
    config: BrokerConfig,
}

impl BrokerContext {
    pub fn new(config: BrokerConfig) -> Arc<Self> {
        let (create_tx, create_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            state: Mutex::new(BrokerState {
                snowflakes: SnowflakeHeap::new(),
                id_map: HashMap::new(),
            }),
            create_tx,
            create_rx: tokio::sync::Mutex::new(create_rx),
            config,
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Starts the admission serialiser on the current runtime.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(self);
        tokio::spawn(ctx.run())
    }

    /// Admission serialiser loop. Exactly one logical consumer drains the
    /// admission channel; running this twice concurrently would serialise on
    /// the receiver lock anyway.
    pub async fn run(self: Arc<Self>) {
        while let Some(pending) = self.next_pending().await {
            self.admit(pending);
        }
        debug!("admission channel closed, serialiser exiting");
    }

    /// Queues a polling proxy for admission.
    pub fn enqueue(&self, pending: PendingProxy) {
        // Failure means the context is tearing down; the dropped oneshot
        // surfaces as a timeout on the polling side.
        let _ = self.create_tx.send(pending);
    }

    /// Receives the next admission request. Used by the serialiser loop and
    /// by tests that drive admission by hand.
    pub async fn next_pending(&self) -> Option<PendingProxy> {
        self.create_rx.lock().await.recv().await
    }

    /// Admits one polling proxy: registers a fresh record and starts the
    /// forwarder that ferries the matched offer (or the timeout signal) back
    /// to the poll handler.
    pub fn admit(self: &Arc<Self>, pending: PendingProxy) {
        let snowflake = self.add_snowflake(&pending.id);
        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            let offer = snowflake.recv_offer(ctx.config.proxy_timeout).await;
            if offer.is_none() {
                ctx.expire(&snowflake);
            }
            let _ = pending.offer_tx.send(offer);
        });
    }

    /// Registers a new proxy record under `id` with no assigned clients.
    ///
    /// A duplicate id displaces the previous record in the session index;
    /// the old record keeps its registry slot until its own poll times out.
    pub fn add_snowflake(&self, id: &str) -> Arc<Snowflake> {
        let snowflake = Arc::new(Snowflake::new(id));
        let mut state = self.lock_state();
        state.snowflakes.push(snowflake.clone());
        if state.id_map.insert(id.to_owned(), snowflake.clone()).is_some() {
            warn!(id, "duplicate session id, displacing previous proxy");
        }
        debug!(id, available = state.snowflakes.len(), "proxy registered");
        snowflake
    }

    /// Claims the least-loaded proxy for a client, or `None` when no proxy
    /// is available. The claimed record stays in the session index so the
    /// proxy's answer can still be routed to it.
    pub fn pop_snowflake(&self) -> Option<Arc<Snowflake>> {
        self.lock_state().snowflakes.pop()
    }

    /// Looks up a proxy record by session id.
    pub fn lookup(&self, id: &str) -> Option<Arc<Snowflake>> {
        self.lock_state().id_map.get(id).cloned()
    }

    /// Retires a matched record: its session id stops resolving, so any
    /// later answer gets 410.
    pub fn end_session(&self, snowflake: &Arc<Snowflake>) {
        self.lock_state().remove_session(snowflake);
    }

    /// Forgets a proxy whose poll timed out with no client match.
    ///
    /// Returns `false` without touching anything when the record is no
    /// longer in the registry; a client claimed it concurrently and the
    /// match now owns cleanup.
    pub fn expire(&self, snowflake: &Arc<Snowflake>) -> bool {
        let mut state = self.lock_state();
        let index = snowflake.index();
        if index < 0 {
            return false;
        }
        state.snowflakes.remove(index as usize);
        state.remove_session(snowflake);
        debug!(id = snowflake.id(), "proxy poll expired unmatched");
        true
    }

    /// Number of proxies currently available for matching.
    pub fn available(&self) -> usize {
        self.lock_state().snowflakes.len()
    }

    /// Session ids of every live proxy, for the debug surface.
    pub fn session_ids(&self) -> Vec<String> {
        self.lock_state().id_map.keys().cloned().collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, BrokerState> {
        // Poisoning cannot leave the state half-mutated: every critical
        // section is a handful of infallible container operations.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Arc<BrokerContext> {
        BrokerContext::new(BrokerConfig::default())
    }

    #[test]
    fn test_add_snowflake_registers_in_both_structures() {
        let ctx = ctx();
        assert_eq!(ctx.available(), 0);
        assert!(ctx.session_ids().is_empty());

        let s = ctx.add_snowflake("foo");
        assert_eq!(ctx.available(), 1);
        assert_eq!(ctx.session_ids(), vec!["foo".to_owned()]);
        assert!(s.index() >= 0);
        assert!(Arc::ptr_eq(&ctx.lookup("foo").unwrap(), &s));
    }

    #[test]
    fn test_pop_removes_from_registry_but_not_session_index() {
        let ctx = ctx();
        let s = ctx.add_snowflake("foo");

        let popped = ctx.pop_snowflake().unwrap();
        assert!(Arc::ptr_eq(&popped, &s));
        assert_eq!(popped.index(), -1);
        assert_eq!(ctx.available(), 0);
        // Still Matched: the answer path must find it.
        assert!(ctx.lookup("foo").is_some());
    }

    #[test]
    fn test_end_session_makes_id_unresolvable() {
        let ctx = ctx();
        let s = ctx.add_snowflake("foo");
        ctx.pop_snowflake();
        ctx.end_session(&s);
        assert!(ctx.lookup("foo").is_none());
    }

    #[test]
    fn test_expire_removes_available_record() {
        let ctx = ctx();
        let s = ctx.add_snowflake("foo");
        assert!(ctx.expire(&s));
        assert_eq!(s.index(), -1);
        assert_eq!(ctx.available(), 0);
        assert!(ctx.lookup("foo").is_none());
    }

    #[test]
    fn test_expire_yields_to_concurrent_match() {
        let ctx = ctx();
        let s = ctx.add_snowflake("foo");
        let popped = ctx.pop_snowflake().unwrap();
        assert!(Arc::ptr_eq(&popped, &s));

        // The record left the registry before the poll timed out: expiry
        // must not disturb the in-flight match.
        assert!(!ctx.expire(&s));
        assert!(ctx.lookup("foo").is_some());
    }

    #[test]
    fn test_duplicate_id_displaces_previous_record() {
        let ctx = ctx();
        let old = ctx.add_snowflake("dup");
        let new = ctx.add_snowflake("dup");
        assert!(!Arc::ptr_eq(&old, &new));

        // Last writer wins in the session index; both keep registry slots.
        assert!(Arc::ptr_eq(&ctx.lookup("dup").unwrap(), &new));
        assert_eq!(ctx.available(), 2);

        // The displaced record's own cleanup cannot evict its successor.
        assert!(ctx.expire(&old));
        assert!(Arc::ptr_eq(&ctx.lookup("dup").unwrap(), &new));
        assert_eq!(ctx.available(), 1);
    }

    #[test]
    fn test_pop_prefers_least_loaded() {
        let ctx = ctx();
        {
            let mut state = ctx.lock_state();
            for clients in [4, 5, 3] {
                let s = Arc::new(Snowflake::with_clients(format!("p{clients}"), clients));
                state.id_map.insert(s.id().to_owned(), s.clone());
                state.snowflakes.push(s);
            }
        }
        let popped = ctx.pop_snowflake().unwrap();
        assert_eq!(popped.clients(), 3);
    }

    #[tokio::test]
    async fn test_admission_registers_and_forwards_offer() {
        let ctx = ctx();
        let (tx, rx) = tokio::sync::oneshot::channel();
        ctx.admit(PendingProxy {
            id: "test".to_owned(),
            offer_tx: tx,
        });

        assert_eq!(ctx.available(), 1);
        let s = ctx.lookup("test").unwrap();
        s.send_offer(bytes::Bytes::from_static(b"fake offer"));

        let delivered = rx.await.unwrap();
        assert_eq!(delivered, Some(bytes::Bytes::from_static(b"fake offer")));
    }

    #[tokio::test]
    async fn test_admission_forwarder_expires_on_timeout() {
        let ctx = BrokerContext::new(BrokerConfig {
            proxy_timeout: std::time::Duration::from_millis(30),
            ..BrokerConfig::default()
        });
        let (tx, rx) = tokio::sync::oneshot::channel();
        ctx.admit(PendingProxy {
            id: "test".to_owned(),
            offer_tx: tx,
        });

        let delivered = rx.await.unwrap();
        assert_eq!(delivered, None);
        assert_eq!(ctx.available(), 0);
        assert!(ctx.lookup("test").is_none());
    }
}
