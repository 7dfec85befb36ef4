use arboard::Clipboard;
use log::{error, info};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A code block address: (message index, block id).
pub type BlockKey = (usize, usize);

/// Session-wide system clipboard.
///
/// On X11 and bare Wayland the copied text is served by the owning `Clipboard`, so the
/// handle has to outlive the copy. It is opened on first use and then kept.
#[derive(Default)]
pub struct SystemClipboard {
    clipboard: Option<Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the given text to the system clipboard.
    pub fn copy(&mut self, text: &str) -> Result<(), String> {
        if self.clipboard.is_none() {
            let opened = Clipboard::new().map_err(|e| {
                let msg = format!("Failed to initialize clipboard: {}", e);
                error!("[PHASE: chat] [STEP: copy] {}", msg);
                msg
            })?;
            self.clipboard = Some(opened);
        }
        let Some(clipboard) = self.clipboard.as_mut() else {
            return Err("Clipboard not available".to_string());
        };
        clipboard.set_text(text).map_err(|e| {
            let msg = format!("Failed to set clipboard text: {}", e);
            error!("[PHASE: chat] [STEP: copy] {}", msg);
            msg
        })
    }
}

/// Per-block "copied" confirmations. Each block's confirmation lasts `duration` from
/// its own copy, independently of the others.
#[derive(Debug, Clone)]
pub struct CopyTracker {
    duration: Duration,
    copied_at: HashMap<BlockKey, Instant>,
}

impl CopyTracker {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            copied_at: HashMap::new(),
        }
    }

    /// Copy `code` with `copier`; on success start the block's confirmation at `now`.
    /// Failure is logged only.
    pub fn copy_with<F>(&mut self, key: BlockKey, code: &str, now: Instant, copier: F) -> bool
    where
        F: FnOnce(&str) -> Result<(), String>,
    {
        match copier(code) {
            Ok(()) => {
                info!(
                    "[PHASE: chat] [STEP: copy] Copied block {} of message {} ({} chars)",
                    key.1,
                    key.0,
                    code.chars().count()
                );
                self.copied_at.insert(key, now);
                true
            }
            Err(e) => {
                error!("[PHASE: chat] [STEP: copy] Copy failed: {}", e);
                false
            }
        }
    }

    pub fn is_copied(&self, key: BlockKey, now: Instant) -> bool {
        self.copied_at
            .get(&key)
            .map(|at| now.saturating_duration_since(*at) < self.duration)
            .unwrap_or(false)
    }

    /// Forget confirmations that have run out.
    pub fn expire(&mut self, now: Instant) {
        let duration = self.duration;
        self.copied_at
            .retain(|_, at| now.saturating_duration_since(*at) < duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_lasts_exactly_the_configured_duration() {
        let mut t = CopyTracker::new(Duration::from_millis(2000));
        let t0 = Instant::now();
        assert!(t.copy_with((1, 0), "SELECT 1", t0, |_| Ok(())));

        assert!(t.is_copied((1, 0), t0));
        assert!(t.is_copied((1, 0), t0 + Duration::from_millis(1999)));
        assert!(!t.is_copied((1, 0), t0 + Duration::from_millis(2000)));
    }

    #[test]
    fn confirmations_are_per_block() {
        let mut t = CopyTracker::new(Duration::from_millis(500));
        let t0 = Instant::now();
        t.copy_with((1, 0), "a", t0, |_| Ok(()));
        t.copy_with((1, 1), "b", t0 + Duration::from_millis(300), |_| Ok(()));

        let at = t0 + Duration::from_millis(600);
        assert!(!t.is_copied((1, 0), at));
        assert!(t.is_copied((1, 1), at));
        assert!(!t.is_copied((3, 0), at));

        t.expire(at);
        assert!(t.is_copied((1, 1), at));
        t.expire(t0 + Duration::from_secs(5));
        assert!(!t.is_copied((1, 1), t0 + Duration::from_millis(700)));
    }

    #[test]
    fn failed_copy_shows_no_confirmation() {
        let mut t = CopyTracker::new(Duration::from_millis(2000));
        let t0 = Instant::now();
        assert!(!t.copy_with((0, 0), "x", t0, |_| Err("no display".to_string())));
        assert!(!t.is_copied((0, 0), t0));
    }

    #[test]
    fn clipboard_opens_lazily_and_stays_open() {
        let mut c = SystemClipboard::new();
        assert!(c.clipboard.is_none());
        // Headless hosts have no clipboard; there the copy fails and nothing is kept.
        match c.copy("SELECT 1") {
            Ok(()) => assert!(c.clipboard.is_some()),
            Err(_) => assert!(c.clipboard.is_none()),
        }
    }

    #[test]
    fn recopy_restarts_the_timer() {
        let mut t = CopyTracker::new(Duration::from_millis(1000));
        let t0 = Instant::now();
        t.copy_with((0, 0), "x", t0, |_| Ok(()));
        t.copy_with((0, 0), "x", t0 + Duration::from_millis(800), |_| Ok(()));
        assert!(t.is_copied((0, 0), t0 + Duration::from_millis(1500)));
    }
}
