use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::hls::pane::Pane;

/// Bounded FIFO of playlist panes. When live, capacity is the configured
/// window size; otherwise it is effectively unbounded.
#[derive(Debug)]
pub struct SlidingWindow {
    pub size: usize,
    /// Unlink the segment file of an evicted pane.
    pub delete: bool,
    panes: VecDeque<Pane>,
}

impl SlidingWindow {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            delete: false,
            panes: VecDeque::new(),
        }
    }

    pub fn push(&mut self, pane: Pane) {
        self.panes.push_back(pane);
    }

    /// Evict front panes while over capacity, returning them so the caller
    /// can account for discontinuity tags sliding out of the window.
    pub fn trim(&mut self) -> Vec<Pane> {
        let mut evicted = Vec::new();
        while self.panes.len() > self.size {
            let popped = self.panes.pop_front().expect("over capacity");
            if self.delete {
                match std::fs::remove_file(&popped.path) {
                    Ok(()) => debug!("deleted {}", popped.path.display()),
                    Err(e) => warn!("failed to delete {}: {}", popped.path.display(), e),
                }
            }
            evicted.push(popped);
        }
        evicted
    }

    pub fn front(&self) -> Option<&Pane> {
        self.panes.front()
    }

    pub fn back_mut(&mut self) -> Option<&mut Pane> {
        self.panes.back_mut()
    }

    pub fn len(&self) -> usize {
        self.panes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    /// All pane texts joined in order.
    pub fn render_all(&self) -> String {
        self.panes.iter().map(Pane::render).collect()
    }
}
