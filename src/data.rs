use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::logging;
use crate::supabase::{AlertRecord, Client, ThumbnailRecord};

pub trait AlertService: Send + Sync {
    /// Window `[offset, offset + limit)` of the alert table, newest
    /// detection first. Past-the-end windows are empty, not errors.
    fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<AlertRecord>>;
}

pub trait ThumbnailService: Send + Sync {
    /// Upsert keyed on the alert id.
    fn save(&self, record: ThumbnailRecord) -> Result<()>;
    /// Point lookup. `Ok(None)` is the normal not-captured-yet outcome;
    /// callers treat errors as absent too (display degrades, nothing fails).
    fn load(&self, video_id: &str) -> Result<Option<ThumbnailRecord>>;
}

pub struct SupabaseAlertService {
    client: Arc<Client>,
}

impl SupabaseAlertService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl AlertService for SupabaseAlertService {
    fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<AlertRecord>> {
        self.client
            .fetch_alerts(limit, offset)
            .context("fetch alert page")
    }
}

pub struct SupabaseThumbnailService {
    client: Arc<Client>,
}

impl SupabaseThumbnailService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl ThumbnailService for SupabaseThumbnailService {
    fn save(&self, record: ThumbnailRecord) -> Result<()> {
        let id = record.video_id.clone();
        self.client
            .upsert_thumbnail(&record)
            .with_context(|| format!("save thumbnail for alert {id}"))
    }

    fn load(&self, video_id: &str) -> Result<Option<ThumbnailRecord>> {
        match self.client.get_thumbnail(video_id) {
            Ok(found) => Ok(found),
            Err(err) => {
                logging::error(format!("thumbnail lookup for {video_id} failed: {err:#}"));
                Ok(None)
            }
        }
    }
}

/// Fixed record set served in windows, for tests and offline preview.
#[derive(Default)]
pub struct MockAlertService {
    records: Vec<AlertRecord>,
}

impl MockAlertService {
    pub fn new(records: Vec<AlertRecord>) -> Self {
        Self { records }
    }
}

impl AlertService for MockAlertService {
    fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<AlertRecord>> {
        if offset >= self.records.len() {
            return Ok(Vec::new());
        }
        let end = (offset + limit).min(self.records.len());
        Ok(self.records[offset..end].to_vec())
    }
}

#[derive(Default)]
pub struct MockThumbnailService {
    entries: Mutex<HashMap<String, ThumbnailRecord>>,
}

impl ThumbnailService for MockThumbnailService {
    fn save(&self, record: ThumbnailRecord) -> Result<()> {
        self.entries
            .lock()
            .insert(record.video_id.clone(), record);
        Ok(())
    }

    fn load(&self, video_id: &str) -> Result<Option<ThumbnailRecord>> {
        Ok(self.entries.lock().get(video_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> AlertRecord {
        AlertRecord {
            id: id.to_string(),
            ..AlertRecord::default()
        }
    }

    #[test]
    fn mock_pages_respect_window_bounds() {
        let service = MockAlertService::new(vec![record("1"), record("2"), record("3")]);
        let first = service.fetch_page(2, 0).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, "1");

        let tail = service.fetch_page(2, 2).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].id, "3");

        assert!(service.fetch_page(2, 3).unwrap().is_empty());
        assert!(service.fetch_page(2, 100).unwrap().is_empty());
    }

    #[test]
    fn thumbnail_save_then_load_round_trips() {
        let service = MockThumbnailService::default();
        assert!(service.load("a-1").unwrap().is_none());

        let saved = ThumbnailRecord::new("a-1", "data:image/jpeg;base64,Zm9v".into(), 12.5);
        service.save(saved.clone()).unwrap();

        let loaded = service.load("a-1").unwrap().expect("stored thumbnail");
        assert_eq!(loaded.thumbnail_data, saved.thumbnail_data);
        assert_eq!(loaded.timestamp, 12.5);
    }

    #[test]
    fn thumbnail_save_is_an_upsert() {
        let service = MockThumbnailService::default();
        service
            .save(ThumbnailRecord::new("a-1", "primero".into(), 1.0))
            .unwrap();
        service
            .save(ThumbnailRecord::new("a-1", "segundo".into(), 2.0))
            .unwrap();

        let loaded = service.load("a-1").unwrap().unwrap();
        assert_eq!(loaded.thumbnail_data, "segundo");
        assert_eq!(service.entries.lock().len(), 1);
    }
}
