//! Per-(message, platform) preview cache.

use dashmap::DashMap;

use super::models::{Platform, SharePreview};

/// Process-lifetime cache of formatted previews.
///
/// Write-once per key: a finalized message never changes, so entries are
/// never stale. Failed formats are not cached, keeping them retryable. No
/// eviction; growth is bounded by session message count.
#[derive(Debug, Default)]
pub struct SharePreviewCache {
    entries: DashMap<(String, Platform), SharePreview>,
}

impl SharePreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, message_id: &str, platform: Platform) -> Option<SharePreview> {
        self.entries
            .get(&(message_id.to_string(), platform))
            .map(|e| e.value().clone())
    }

    pub fn insert(&self, message_id: &str, platform: Platform, preview: SharePreview) {
        self.entries
            .insert((message_id.to_string(), platform), preview);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
