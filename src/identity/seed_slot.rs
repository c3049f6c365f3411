//! Temporary seed phrase holder with auto-clear.
//!
//! After a create (or a backup confirmation) the phrase stays readable for a
//! bounded display window. Exactly one timer is live per slot: every `set`,
//! `rearm` or `cancel` aborts the previous one, and a generation counter
//! keeps an already-fired timer from clearing a newer value.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::crypto::{MasterSecret, SeedPhrase};

/// Default display window (5 minutes)
pub const DEFAULT_DISPLAY_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct SlotState {
    phrase: Option<SeedPhrase>,
    /// Master secret of a created identity awaiting backup confirmation
    pending: Option<MasterSecret>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl SlotState {
    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }
}

pub struct SeedSlot {
    state: Arc<Mutex<SlotState>>,
    window: Duration,
}

impl SeedSlot {
    pub fn new(window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState::default())),
            window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // Slot state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a phrase (and optionally its pending master secret), replacing
    /// any previous value and timer. Must be called inside a tokio runtime.
    pub fn set(&self, phrase: SeedPhrase, pending: Option<MasterSecret>) {
        let mut state = self.lock();
        state.abort_timer();
        state.phrase = Some(phrase);
        state.pending = pending;
        self.arm(&mut state);
    }

    /// Restart the display window for the phrase currently held.
    pub fn rearm(&self) -> bool {
        let mut state = self.lock();
        state.abort_timer();
        if state.phrase.is_none() {
            return false;
        }
        self.arm(&mut state);
        true
    }

    fn arm(&self, state: &mut SlotState) {
        let generation = state.generation;
        let weak: Weak<Mutex<SlotState>> = Arc::downgrade(&self.state);
        let window = self.window;

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut state = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if state.generation == generation {
                state.phrase = None;
                state.pending = None;
                state.timer = None;
                debug!("Temporary seed phrase expired");
            }
        }));
    }

    /// Copy of the phrase while the window is open.
    pub fn phrase(&self) -> Option<String> {
        self.lock().phrase.as_ref().map(|p| p.as_str().to_string())
    }

    pub fn has_phrase(&self) -> bool {
        self.lock().phrase.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Copy of the pending master secret, left in place.
    pub fn pending(&self) -> Option<MasterSecret> {
        self.lock().pending.clone()
    }

    /// Remove the pending master secret, leaving the phrase in place.
    pub fn take_pending(&self) -> Option<MasterSecret> {
        self.lock().pending.take()
    }

    /// Cancel the timer and wipe the slot. Idempotent.
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.abort_timer();
        state.phrase = None;
        state.pending = None;
    }
}

impl Default for SeedSlot {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_WINDOW)
    }
}

impl Drop for SeedSlot {
    fn drop(&mut self) {
        self.lock().abort_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn phrase() -> SeedPhrase {
        SeedPhrase::parse(PHRASE).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_clears_after_window() {
        let slot = SeedSlot::new(Duration::from_secs(300));
        slot.set(phrase(), Some(MasterSecret::from_bytes([1u8; 32])));
        assert_eq!(slot.phrase().as_deref(), Some(PHRASE));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(slot.has_phrase());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!slot.has_phrase());
        assert!(!slot.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_timer() {
        let slot = SeedSlot::new(Duration::from_secs(300));
        slot.set(phrase(), None);

        tokio::time::sleep(Duration::from_secs(200)).await;
        slot.set(phrase(), None);

        // First timer would have fired here
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert!(slot.has_phrase());

        tokio::time::sleep(Duration::from_secs(151)).await;
        assert!(!slot.has_phrase());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_extends_window() {
        let slot = SeedSlot::new(Duration::from_secs(300));
        slot.set(phrase(), Some(MasterSecret::from_bytes([2u8; 32])));

        tokio::time::sleep(Duration::from_secs(250)).await;
        assert!(slot.take_pending().is_some());
        assert!(slot.rearm());

        tokio::time::sleep(Duration::from_secs(250)).await;
        assert!(slot.has_phrase());
        assert!(!slot.has_pending());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let slot = SeedSlot::default();
        slot.set(phrase(), None);
        slot.cancel();
        slot.cancel();
        assert!(slot.phrase().is_none());
        assert!(!slot.rearm());
    }
}
