//! Shared rate-limit cooldown.
//!
//! A [`CooldownGate`] holds one "not before" instant. Every attempt waits on
//! it before touching the network, and any attempt that learns about a rate
//! limit pushes it forward. The instant never moves backwards.
//!
//! Gates are handed out by a [`CooldownRegistry`], keyed by endpoint origin
//! so a throttled provider does not stall partners pointed elsewhere. The
//! `global` scope collapses every endpoint onto one gate.

use parlance_config::CooldownScope;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
pub struct CooldownGate {
    active_until: Mutex<Option<Instant>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_until(&self) -> Option<Instant> {
        *self
            .active_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left before requests may be issued again.
    pub fn remaining(&self) -> Duration {
        self.active_until()
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Suspend until the cooldown has passed. Returns immediately when idle.
    ///
    /// Re-checks after every wake-up because another caller may have pushed
    /// the deadline while this one slept.
    pub async fn wait(&self) {
        loop {
            let until = match self.active_until() {
                Some(until) if until > Instant::now() => until,
                _ => return,
            };
            tokio::time::sleep_until(until).await;
        }
    }

    /// Extend the cooldown to at least `now + delay`. Returns the new deadline.
    pub fn bump(&self, delay: Duration) -> Instant {
        let candidate = Instant::now() + delay;
        let mut guard = self
            .active_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let next = match *guard {
            Some(current) if current >= candidate => current,
            _ => candidate,
        };
        *guard = Some(next);
        next
    }
}

/// Hands out shared gates, one per endpoint origin (or one overall).
#[derive(Debug)]
pub struct CooldownRegistry {
    scope: CooldownScope,
    gates: Mutex<HashMap<String, Arc<CooldownGate>>>,
}

const GLOBAL_KEY: &str = "*";

impl CooldownRegistry {
    pub fn new(scope: CooldownScope) -> Self {
        Self {
            scope,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> CooldownScope {
        self.scope
    }

    /// The gate guarding requests to `url`.
    pub fn gate_for(&self, url: &str) -> Arc<CooldownGate> {
        let key = match self.scope {
            CooldownScope::Global => GLOBAL_KEY.to_string(),
            CooldownScope::Origin => origin_key(url),
        };

        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        gates
            .entry(key)
            .or_insert_with_key(|key| {
                debug!(origin = %key, "Creating cooldown gate");
                Arc::new(CooldownGate::new())
            })
            .clone()
    }
}

impl Default for CooldownRegistry {
    fn default() -> Self {
        Self::new(CooldownScope::default())
    }
}

/// `scheme://host[:port]` of a URL; the raw string when it does not parse.
pub fn origin_key(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.origin().ascii_serialization(),
        Err(_) => url.to_string(),
    }
}
