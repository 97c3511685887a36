//! Session-scoped preview cache.
//!
//! Holds the most recent result per `(style_id, orientation)`. Entries never
//! expire on their own: the same photo rendered in the same style and
//! orientation yields the same picture, so an entry stays valid until the
//! photo or the crop changes. The cache remembers which photo it was filled
//! against ([`PreviewCache::bind_image`]) and empties itself when that
//! changes.

use std::collections::HashMap;

use serde::Serialize;
use stylecanvas_core::preview::PreviewPayload;
use stylecanvas_core::style::Orientation;
use stylecanvas_core::types::EpochMillis;

/// One cached preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub orientation: Orientation,
    pub generated_at: EpochMillis,
    pub payload: PreviewPayload,
}

impl CacheEntry {
    pub fn new(orientation: Orientation, generated_at: EpochMillis, payload: PreviewPayload) -> Self {
        Self {
            orientation,
            generated_at,
            payload,
        }
    }

    pub fn url(&self) -> &str {
        &self.payload.preview_url
    }
}

#[derive(Debug, Default)]
pub struct PreviewCache {
    entries: HashMap<String, HashMap<Orientation, CacheEntry>>,
    /// Content hash of the photo the entries were generated from.
    image_hash: Option<String>,
}

impl PreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, style_id: &str, orientation: Orientation) -> Option<&CacheEntry> {
        self.entries.get(style_id)?.get(&orientation)
    }

    /// Store `entry`, replacing whatever was cached for the same style and
    /// orientation.
    pub fn set(&mut self, style_id: impl Into<String>, entry: CacheEntry) {
        self.entries
            .entry(style_id.into())
            .or_default()
            .insert(entry.orientation, entry);
    }

    /// Drop every entry for `orientation`, except those of `keep_style`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_orientation(&mut self, orientation: Orientation, keep_style: Option<&str>) -> usize {
        let mut removed = 0;
        for (style_id, by_orientation) in self.entries.iter_mut() {
            if keep_style == Some(style_id.as_str()) {
                continue;
            }
            if by_orientation.remove(&orientation).is_some() {
                removed += 1;
            }
        }
        self.entries.retain(|_, by_orientation| !by_orientation.is_empty());
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Associate the cache with a photo.
    ///
    /// Clears every entry when `image_hash` differs from the photo the cache
    /// was filled against. Returns `true` if entries were discarded.
    pub fn bind_image(&mut self, image_hash: &str) -> bool {
        if self.image_hash.as_deref() == Some(image_hash) {
            return false;
        }
        let had_entries = !self.is_empty();
        self.clear();
        self.image_hash = Some(image_hash.to_string());
        had_entries
    }

    /// Total number of `(style, orientation)` entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
