//! Template gallery: original templates plus their persisted snapshots.

use tracing::{debug, info};

use crate::error::{GalleryError, Result};
use crate::store::{SnapshotStore, snapshot_key};
use crate::template::{Locale, Template, builtin_templates};

/// The text shown for one template slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub index: usize,
    pub text: String,
    /// `text` differs from the template's original code
    pub dirty: bool,
}

/// Ordered templates backed by a snapshot store
pub struct Gallery<S> {
    locale: Locale,
    templates: Vec<Template>,
    store: S,
}

impl<S: SnapshotStore> Gallery<S> {
    /// Gallery of the built-in templates for `locale`
    pub fn new(locale: Locale, store: S) -> Self {
        Self::with_templates(locale, builtin_templates(locale), store)
    }

    pub fn with_templates(locale: Locale, templates: Vec<Template>, store: S) -> Self {
        Self {
            locale,
            templates,
            store,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn list_templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Original template at `index`
    pub fn template(&self, index: usize) -> Result<&Template> {
        self.templates
            .get(index)
            .ok_or(GalleryError::IndexOutOfRange {
                index,
                len: self.templates.len(),
            })
    }

    /// Persisted text for `index`, or the original code if never edited
    pub fn select(&self, index: usize) -> Result<Snapshot> {
        let original = &self.template(index)?.code;
        let text = self
            .store
            .get(&snapshot_key(index))?
            .unwrap_or_else(|| original.clone());
        let dirty = text != *original;
        Ok(Snapshot { index, text, dirty })
    }

    /// Persist an edit; dirty when the text differs from the original
    pub fn on_edit(&mut self, index: usize, text: &str) -> Result<Snapshot> {
        let dirty = text != self.template(index)?.code;
        self.store.set(&snapshot_key(index), text)?;
        debug!(index, dirty, "template edited");
        Ok(Snapshot {
            index,
            text: text.to_string(),
            dirty,
        })
    }

    /// Restore the original text and overwrite the persisted snapshot
    pub fn reset(&mut self, index: usize) -> Result<Snapshot> {
        let original = self.template(index)?.code.clone();
        self.store.set(&snapshot_key(index), &original)?;
        info!(index, "template reset to original");
        Ok(Snapshot {
            index,
            text: original,
            dirty: false,
        })
    }
}
