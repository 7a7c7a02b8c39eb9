use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::services::card_template::CardLayout;

/// Hands out off-screen render targets and tracks how many are alive
#[derive(Debug, Clone, Default)]
pub struct RenderHost {
    live: Arc<AtomicUsize>,
}

impl RenderHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires a fresh, empty render target. It is released when dropped.
    pub fn acquire(&self) -> RenderTarget {
        let id = Uuid::new_v4();
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(render_target = %id, live, "Acquired render target");

        RenderTarget {
            id,
            live: Arc::clone(&self.live),
            layout: None,
        }
    }

    /// Number of render targets not yet released
    pub fn live_targets(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Scoped off-screen node hosting one card layout during export
#[derive(Debug)]
pub struct RenderTarget {
    id: Uuid,
    live: Arc<AtomicUsize>,
    layout: Option<CardLayout>,
}

impl RenderTarget {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn populate(&mut self, layout: CardLayout) {
        self.layout = Some(layout);
    }

    pub fn layout(&self) -> Option<&CardLayout> {
        self.layout.as_ref()
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        let live = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::debug!(render_target = %self.id, live, "Released render target");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_release_on_drop() {
        let host = RenderHost::new();
        let a = host.acquire();
        let b = host.acquire();
        assert_ne!(a.id(), b.id());
        assert_eq!(host.live_targets(), 2);

        drop(a);
        assert_eq!(host.live_targets(), 1);
        drop(b);
        assert_eq!(host.live_targets(), 0);
    }

    #[test]
    fn test_target_released_on_early_return() {
        fn fails(host: &RenderHost) -> Result<(), &'static str> {
            let target = host.acquire();
            if target.layout().is_none() {
                return Err("not populated");
            }
            Ok(())
        }

        let host = RenderHost::new();
        assert!(fails(&host).is_err());
        assert_eq!(host.live_targets(), 0);
    }
}
