//! In-process sheet backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use leadscout_shared::{LeadScoutError, Result};

use crate::SheetBackend;

/// Sheets held in memory, with call counters for assertions.
#[derive(Debug, Default)]
pub struct MemorySheet {
    sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
    reads: AtomicUsize,
    appends: AtomicUsize,
    overwrites: AtomicUsize,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `sheet` holding `rows` (header first).
    pub fn with_sheet(self, sheet: &str, rows: Vec<Vec<&str>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(str::to_string).collect())
            .collect();
        self.lock().insert(sheet.to_string(), rows);
        self
    }

    /// Current contents of `sheet`, if it exists.
    pub fn values(&self, sheet: &str) -> Option<Vec<Vec<String>>> {
        self.lock().get(sheet).cloned()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub fn overwrites(&self) -> usize {
        self.overwrites.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Vec<String>>>> {
        self.sheets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn missing(sheet: &str) -> LeadScoutError {
        LeadScoutError::StoreIo(format!("worksheet {sheet:?} not found"))
    }
}

#[async_trait]
impl SheetBackend for MemorySheet {
    async fn ensure_sheet(&self, sheet: &str) -> Result<()> {
        self.lock().entry(sheet.to_string()).or_default();
        Ok(())
    }

    async fn read_values(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.values(sheet).ok_or_else(|| Self::missing(sheet))
    }

    async fn append_values(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        let mut sheets = self.lock();
        let existing = sheets.get_mut(sheet).ok_or_else(|| Self::missing(sheet))?;
        existing.extend(rows);
        Ok(())
    }

    async fn overwrite_values(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()> {
        self.overwrites.fetch_add(1, Ordering::SeqCst);
        let mut sheets = self.lock();
        let existing = sheets.get_mut(sheet).ok_or_else(|| Self::missing(sheet))?;
        *existing = rows;
        Ok(())
    }
}
