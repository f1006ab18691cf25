//! Maintenance passes over the lead store.
//!
//! Each pass reads the whole worksheet, works in memory and writes back at most
//! once. A pass that finds nothing to change leaves the sheet alone.

use std::collections::HashMap;

use leadscout_crawler::{LinkVerifier, Platform};
use leadscout_shared::{LeadScoutError, Result, StoredLead};
use leadscout_storage::{LeadStore, LeadTable};
use tracing::{info, instrument, warn};

use crate::dedupe::{dedupe_by_name, filter_new};
use crate::emails::{EmailReport, EmailValidator};
use crate::import::{SourceColumns, map_source_row};

// ---------------------------------------------------------------------------
// Dedupe by name
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupeReport {
    pub rows_before: usize,
    pub kept: usize,
    pub removed: usize,
    pub blank_dropped: usize,
    pub rewritten: bool,
}

/// Remove later rows that repeat a business name already seen above them.
#[instrument(skip_all, fields(sheet = %store.sheet_name()))]
pub async fn dedupe_store(store: &LeadStore) -> Result<DedupeReport> {
    let LeadTable { header, rows } = store.read_table().await?;
    let rows_before = rows.len();
    let result = dedupe_by_name(rows);

    let mut report = DedupeReport {
        rows_before,
        kept: result.kept.len(),
        removed: result.removed,
        blank_dropped: result.blank_dropped,
        rewritten: false,
    };

    if result.changed() {
        store
            .overwrite_leads(&LeadTable {
                header,
                rows: result.kept,
            })
            .await?;
        report.rewritten = true;
    }

    info!(
        before = rows_before,
        kept = report.kept,
        removed = report.removed,
        blank = report.blank_dropped,
        "dedupe finished"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Link verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Distinct links requested.
    pub checked: usize,
    pub instagram_cleared: usize,
    pub facebook_cleared: usize,
    pub rewritten: bool,
}

impl VerifyReport {
    pub fn cleared(&self) -> usize {
        self.instagram_cleared + self.facebook_cleared
    }
}

fn link_slot(lead: &mut StoredLead, platform: Platform) -> &mut Option<String> {
    match platform {
        Platform::Instagram => &mut lead.instagram,
        Platform::Facebook => &mut lead.facebook,
    }
}

/// Check every stored Instagram and Facebook link and clear the dead ones.
///
/// Each distinct link is requested once even when several rows share it.
#[instrument(skip_all, fields(sheet = %store.sheet_name()))]
pub async fn verify_links(store: &LeadStore, verifier: &LinkVerifier) -> Result<VerifyReport> {
    let mut table = store.read_table().await?;
    let mut verdicts: HashMap<(Platform, String), bool> = HashMap::new();
    let mut report = VerifyReport::default();

    for row in &mut table.rows {
        for platform in [Platform::Instagram, Platform::Facebook] {
            let slot = link_slot(&mut row.lead, platform);
            let Some(link) = slot.as_deref().map(str::trim).filter(|l| !l.is_empty()) else {
                continue;
            };

            let key = (platform, link.to_string());
            let valid = match verdicts.get(&key) {
                Some(valid) => *valid,
                None => {
                    report.checked += 1;
                    let valid = verifier.verify(platform, link).await.is_ok();
                    verdicts.insert(key, valid);
                    valid
                }
            };

            if !valid {
                *slot = None;
                match platform {
                    Platform::Instagram => report.instagram_cleared += 1,
                    Platform::Facebook => report.facebook_cleared += 1,
                }
            }
        }
    }

    if report.cleared() > 0 {
        store.overwrite_leads(&table).await?;
        report.rewritten = true;
    }

    info!(
        checked = report.checked,
        instagram_cleared = report.instagram_cleared,
        facebook_cleared = report.facebook_cleared,
        "link verification finished"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Email validation
// ---------------------------------------------------------------------------

/// Validate every distinct email in the store. Nothing is written back.
#[instrument(skip_all, fields(sheet = %store.sheet_name()))]
pub async fn validate_emails(store: &LeadStore, validator: &EmailValidator) -> Result<EmailReport> {
    let leads = store.read_leads().await?;
    let report = validator
        .report(leads.iter().filter_map(|lead| lead.email.as_deref()))
        .await;

    info!(
        valid = report.valid.len(),
        invalid = report.invalid.len(),
        "email validation finished"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Import from another sheet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Non-blank data rows in the source sheet.
    pub source_rows: usize,
    pub duplicates: usize,
    pub in_batch_duplicates: usize,
    pub unidentifiable: usize,
    pub appended: usize,
}

/// Copy the leads of `source_sheet` that the store does not have yet.
#[instrument(skip_all, fields(source = source_sheet, target = %store.sheet_name()))]
pub async fn import_from_sheet(store: &LeadStore, source_sheet: &str) -> Result<ImportReport> {
    if source_sheet.trim() == store.sheet_name() {
        return Err(LeadScoutError::validation(format!(
            "cannot import sheet {source_sheet:?} into itself"
        )));
    }

    let values = store.read_raw(source_sheet).await?;
    let mut values = values.into_iter();
    let Some(header) = values.next() else {
        warn!("source sheet is empty");
        return Ok(ImportReport::default());
    };

    let columns = SourceColumns::parse(&header);
    if !columns.has_name() {
        return Err(LeadScoutError::validation(format!(
            "sheet {source_sheet:?} has no business name column (expected Business, Name or Company)"
        )));
    }

    let candidates: Vec<StoredLead> = values
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| map_source_row(&columns, &row))
        .collect();
    let source_rows = candidates.len();

    let existing = store.read_leads().await?;
    let filtered = filter_new(candidates, &existing);
    let appended = store.append_leads(&filtered.new).await?;

    let report = ImportReport {
        source_rows,
        duplicates: filtered.duplicates,
        in_batch_duplicates: filtered.in_batch_duplicates,
        unidentifiable: filtered.unidentifiable,
        appended,
    };
    info!(
        source_rows,
        appended,
        duplicates = report.duplicates,
        "import finished"
    );
    Ok(report)
}
