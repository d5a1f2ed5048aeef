use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::engine::CoreError;

/// Cooperative abort flag shared between a running scan and whoever may cancel it.
///
/// Scanners poll it once per tag event, so abort latency is one tag, not the
/// remaining file size.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
  flag: Arc<AtomicBool>,
}

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn reset(&self) {
    self.flag.store(false, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }
}

/// Handle for one in-flight search, returned by `CoreEngine::begin_search`.
/// Dropping it unregisters the search.
pub struct SearchTicket {
  id: String,
  token: CancellationToken,
  registry: SearchRegistry,
}

impl SearchTicket {
  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn token(&self) -> &CancellationToken {
    &self.token
  }
}

impl Drop for SearchTicket {
  fn drop(&mut self) {
    self.registry.release(&self.id);
  }
}

/// Tokens of in-flight searches keyed by request id.
#[derive(Clone, Default)]
pub(crate) struct SearchRegistry {
  active: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl SearchRegistry {
  pub(crate) fn issue(&self) -> SearchTicket {
    let id = Uuid::new_v4().to_string();
    let token = CancellationToken::new();
    self.active.lock().insert(id.clone(), token.clone());
    SearchTicket {
      id,
      token,
      registry: self.clone(),
    }
  }

  pub(crate) fn cancel(&self, id: &str) -> Result<(), CoreError> {
    let token = self
      .active
      .lock()
      .get(id)
      .cloned()
      .ok_or_else(|| CoreError::UnknownSearch(id.to_string()))?;
    token.cancel();
    Ok(())
  }

  pub(crate) fn cancel_all(&self) -> usize {
    let active = self.active.lock();
    for token in active.values() {
      token.cancel();
    }
    active.len()
  }

  pub(crate) fn release(&self, id: &str) {
    self.active.lock().remove(id);
  }

  pub(crate) fn in_flight(&self) -> usize {
    self.active.lock().len()
  }
}
