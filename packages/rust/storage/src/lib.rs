//! Spreadsheet-backed lead store.
//!
//! Leads live as rows in a worksheet. [`SheetBackend`] is the raw cell I/O
//! (Google Sheets in production, [`MemorySheet`] in tests) and [`LeadStore`]
//! maps those cells onto [`StoredLead`] values using the sheet's own header.

mod auth;
mod memory;
pub mod schema;
mod sheets;

use std::sync::Arc;

use async_trait::async_trait;
use leadscout_shared::{Result, StoredLead};
use tracing::{info, instrument, warn};

pub use auth::{AuthorizedUserCredentials, GoogleAuth, ServiceAccountCredentials};
pub use memory::MemorySheet;
pub use schema::{Column, DEFAULT_COLUMNS, LeadRow, LeadTable, SheetHeader};
pub use sheets::{GoogleSheetsBackend, SHEETS_API_BASE};

/// Raw cell access to one spreadsheet. Rows are lists of cell strings, header first.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    /// Create the worksheet if it does not exist yet.
    async fn ensure_sheet(&self, sheet: &str) -> Result<()>;

    async fn read_values(&self, sheet: &str) -> Result<Vec<Vec<String>>>;

    async fn append_values(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()>;

    /// Replace the worksheet's contents with `rows`.
    async fn overwrite_values(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()>;
}

#[async_trait]
impl<T: SheetBackend + ?Sized> SheetBackend for Arc<T> {
    async fn ensure_sheet(&self, sheet: &str) -> Result<()> {
        (**self).ensure_sheet(sheet).await
    }

    async fn read_values(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        (**self).read_values(sheet).await
    }

    async fn append_values(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()> {
        (**self).append_values(sheet, rows).await
    }

    async fn overwrite_values(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()> {
        (**self).overwrite_values(sheet, rows).await
    }
}

/// Typed access to the leads worksheet.
#[derive(Clone)]
pub struct LeadStore {
    backend: Arc<dyn SheetBackend>,
    sheet: String,
}

impl LeadStore {
    pub fn new(backend: Arc<dyn SheetBackend>, sheet: impl Into<String>) -> Self {
        Self {
            backend,
            sheet: sheet.into(),
        }
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet
    }

    /// The whole worksheet: header plus every data row.
    #[instrument(skip(self), fields(sheet = %self.sheet))]
    pub async fn read_table(&self) -> Result<LeadTable> {
        self.backend.ensure_sheet(&self.sheet).await?;
        let values = self.backend.read_values(&self.sheet).await?;
        let table = LeadTable::from_values(values);
        info!(rows = table.rows.len(), "read leads");
        Ok(table)
    }

    pub async fn read_leads(&self) -> Result<Vec<StoredLead>> {
        let table = self.read_table().await?;
        Ok(table.rows.into_iter().map(|row| row.lead).collect())
    }

    /// Append `leads` in one batch, in the sheet's column order.
    ///
    /// An empty sheet gets the standard header first. Returns how many rows were written.
    #[instrument(skip_all, fields(sheet = %self.sheet, leads = leads.len()))]
    pub async fn append_leads(&self, leads: &[StoredLead]) -> Result<usize> {
        if leads.is_empty() {
            info!("no new leads to append");
            return Ok(0);
        }

        self.backend.ensure_sheet(&self.sheet).await?;
        let existing = self.backend.read_values(&self.sheet).await?;
        let has_header = existing
            .first()
            .is_some_and(|row| row.iter().any(|c| !c.trim().is_empty()));

        let mut rows = Vec::with_capacity(leads.len() + 1);
        let header = if has_header {
            SheetHeader::parse(&existing[0])
        } else {
            info!("sheet has no header, writing one");
            let header = SheetHeader::standard();
            rows.push(header.labels().to_vec());
            header
        };

        let missing = header.missing();
        if !missing.is_empty() {
            let labels: Vec<_> = missing.iter().map(|c| c.label()).collect();
            warn!(columns = ?labels, "sheet has no column for some lead fields; they are not written");
        }

        rows.extend(leads.iter().map(|lead| header.row_for(lead, &[])));
        self.backend.append_values(&self.sheet, rows).await?;
        info!(appended = leads.len(), "appended leads");
        Ok(leads.len())
    }

    /// Replace the worksheet with `table`, header included.
    #[instrument(skip_all, fields(sheet = %self.sheet, rows = table.rows.len()))]
    pub async fn overwrite_leads(&self, table: &LeadTable) -> Result<()> {
        self.backend.ensure_sheet(&self.sheet).await?;
        self.backend
            .overwrite_values(&self.sheet, table.to_values())
            .await
    }

    /// Raw values of another worksheet in the same spreadsheet.
    pub async fn read_raw(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        self.backend.read_values(sheet).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(backend: &Arc<MemorySheet>) -> LeadStore {
        LeadStore::new(backend.clone(), "leads")
    }

    fn lead(name: &str, phone: &str) -> StoredLead {
        StoredLead {
            name: name.into(),
            phone: Some(phone.into()),
            website: Some(format!("{}.com", name.to_lowercase())),
            ..StoredLead::default()
        }
    }

    #[tokio::test]
    async fn append_to_empty_sheet_writes_header() {
        let backend = Arc::new(MemorySheet::new());
        let appended = store(&backend)
            .append_leads(&[lead("Acme", "0161 555 0100")])
            .await
            .unwrap();
        assert_eq!(appended, 1);

        let values = backend.values("leads").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0][0], "Name");
        assert_eq!(values[0].len(), DEFAULT_COLUMNS.len());
        assert_eq!(values[1][..4], ["Acme", "0161 555 0100", "", "acme.com"]);
    }

    #[tokio::test]
    async fn append_follows_existing_header_order() {
        let backend = Arc::new(
            MemorySheet::new().with_sheet("leads", vec![vec!["Phone", "Notes", "Name"]]),
        );
        store(&backend)
            .append_leads(&[lead("Beta", "0113 496 0000")])
            .await
            .unwrap();

        let values = backend.values("leads").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], ["0113 496 0000", "", "Beta"]);
    }

    #[tokio::test]
    async fn empty_append_touches_nothing() {
        let backend = Arc::new(MemorySheet::new());
        assert_eq!(store(&backend).append_leads(&[]).await.unwrap(), 0);
        assert_eq!(backend.reads(), 0);
        assert_eq!(backend.appends(), 0);
    }

    #[tokio::test]
    async fn read_round_trips_through_header() {
        let backend = Arc::new(MemorySheet::new().with_sheet(
            "leads",
            vec![
                vec!["Name", "Phone", "Email"],
                vec!["Acme", "0161", "info@acme.com"],
                vec!["Beta"],
            ],
        ));
        let leads = store(&backend).read_leads().await.unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].email.as_deref(), Some("info@acme.com"));
        assert_eq!(leads[1].phone, None);
    }

    #[tokio::test]
    async fn overwrite_replaces_everything() {
        let backend = Arc::new(MemorySheet::new().with_sheet(
            "leads",
            vec![vec!["Name", "Tag"], vec!["Acme", "hot"], vec!["Acme", "cold"]],
        ));
        let store = store(&backend);
        let mut table = store.read_table().await.unwrap();
        table.rows.truncate(1);
        store.overwrite_leads(&table).await.unwrap();

        assert_eq!(
            backend.values("leads").unwrap(),
            vec![vec!["Name", "Tag"], vec!["Acme", "hot"]]
        );
        assert_eq!(backend.overwrites(), 1);
    }

    #[tokio::test]
    async fn missing_source_sheet_is_store_error() {
        let backend = Arc::new(MemorySheet::new());
        let err = store(&backend).read_raw("old_leads").await.unwrap_err();
        assert!(matches!(err, leadscout_shared::LeadScoutError::StoreIo(_)));
    }
}
