//! Editor state around the gallery.
//!
//! Exactly one template is current. Edits flow through an [`EditSubscription`]
//! bound to that template; switching templates swaps the subscription in one
//! step, so an edit can never land on the template that was current before.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::Result;
use crate::gallery::{Gallery, Snapshot};
use crate::store::SnapshotStore;

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Change listener bound to one template slot.
///
/// Dropping it detaches the listener.
#[derive(Debug, PartialEq, Eq)]
pub struct EditSubscription {
    id: u64,
    index: usize,
}

impl EditSubscription {
    fn bind(index: usize) -> Self {
        let id = NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed);
        debug!(id, index, "edit listener bound");
        Self { id, index }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for EditSubscription {
    fn drop(&mut self) {
        debug!(id = self.id, index = self.index, "edit listener detached");
    }
}

/// Current template, its buffer and its dirty flag
pub struct Workbench<S> {
    gallery: Gallery<S>,
    buffer: String,
    dirty: bool,
    subscription: EditSubscription,
}

impl<S: SnapshotStore> Workbench<S> {
    /// Open the gallery with template 0 current
    pub fn open(gallery: Gallery<S>) -> Result<Self> {
        Self::open_at(gallery, 0)
    }

    pub fn open_at(gallery: Gallery<S>, index: usize) -> Result<Self> {
        let snapshot = gallery.select(index)?;
        Ok(Self {
            gallery,
            buffer: snapshot.text,
            dirty: snapshot.dirty,
            subscription: EditSubscription::bind(index),
        })
    }

    pub fn gallery(&self) -> &Gallery<S> {
        &self.gallery
    }

    pub fn current(&self) -> usize {
        self.subscription.index
    }

    pub fn subscription(&self) -> &EditSubscription {
        &self.subscription
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Make `index` current.
    ///
    /// The target snapshot is loaded before anything changes; on error the
    /// workbench still points at the previous template.
    pub fn switch_to(&mut self, index: usize) -> Result<Snapshot> {
        let snapshot = self.gallery.select(index)?;

        let previous = std::mem::replace(&mut self.subscription, EditSubscription::bind(index));
        drop(previous);
        self.buffer = snapshot.text.clone();
        self.dirty = snapshot.dirty;

        Ok(snapshot)
    }

    /// Replace the buffer; persisted against the bound template
    pub fn edit(&mut self, text: &str) -> Result<Snapshot> {
        let snapshot = self.gallery.on_edit(self.subscription.index, text)?;
        self.buffer = snapshot.text.clone();
        self.dirty = snapshot.dirty;
        Ok(snapshot)
    }

    /// Explicitly persist the buffer as it is
    pub fn save(&mut self) -> Result<Snapshot> {
        let text = std::mem::take(&mut self.buffer);
        let result = self.gallery.on_edit(self.subscription.index, &text);
        self.buffer = text;
        let snapshot = result?;
        self.dirty = snapshot.dirty;
        Ok(snapshot)
    }

    /// Restore the current template's original code
    pub fn reset(&mut self) -> Result<Snapshot> {
        let snapshot = self.gallery.reset(self.subscription.index)?;
        self.buffer = snapshot.text.clone();
        self.dirty = false;
        Ok(snapshot)
    }
}
