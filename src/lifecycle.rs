//! Worker lifecycle state machine.

use color_eyre::{eyre::eyre, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::info;

/// Lifecycle states of the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
  #[default]
  Uninstalled,
  /// Install event running
  Installing,
  /// Installed, waiting to activate
  Installed,
  /// Activate event running
  Activating,
  /// Serving fetches
  Active,
  /// Install failed; this instance will never serve
  Redundant,
}

impl LifecycleState {
  pub fn can_intercept_fetch(self) -> bool {
    self == LifecycleState::Active
  }
}

impl fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      LifecycleState::Uninstalled => "uninstalled",
      LifecycleState::Installing => "installing",
      LifecycleState::Installed => "installed",
      LifecycleState::Activating => "activating",
      LifecycleState::Active => "active",
      LifecycleState::Redundant => "redundant",
    };
    f.write_str(name)
  }
}

fn is_valid_transition(from: LifecycleState, to: LifecycleState) -> bool {
  use LifecycleState::*;

  matches!(
    (from, to),
    (Uninstalled, Installing)
      | (Installing, Installed)
      | (Installing, Redundant)
      | (Installed, Activating)
      | (Activating, Active)
      // Restart of a worker whose generation is already installed
      | (Uninstalled, Activating)
  )
}

/// Tracks the current state and whether waiting was skipped.
#[derive(Debug, Default)]
pub struct Lifecycle {
  state: Mutex<LifecycleState>,
  skip_waiting: AtomicBool,
}

impl Lifecycle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> LifecycleState {
    self.state.lock().map(|s| *s).unwrap_or(LifecycleState::Redundant)
  }

  /// Move to `to`, rejecting transitions the lifecycle does not allow.
  pub fn transition(&self, to: LifecycleState) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !is_valid_transition(*state, to) {
      return Err(eyre!("Invalid lifecycle transition {} -> {}", *state, to));
    }

    info!(from = %*state, to = %to, "lifecycle transition");
    *state = to;
    Ok(())
  }

  /// Activate as soon as installed instead of waiting for open pages to close.
  pub fn skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  pub fn is_skipping_waiting(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }
}
