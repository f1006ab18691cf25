//! Sheet column schema and row mapping.
//!
//! The sheet's own header row decides column order. Known columns are matched
//! case-insensitively (with a few aliases); anything else is carried through
//! untouched when rows are rewritten.

use leadscout_shared::{HasLeadKey, StoredLead, non_blank};

/// A lead field that has a column in the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Name,
    Phone,
    Address,
    Website,
    Email,
    Instagram,
    Facebook,
    LinkedIn,
    PlaceId,
    City,
    ContactName,
    Category,
    Rating,
    Reviews,
    MapsUrl,
}

/// Header written to an empty sheet. The first eight match older sheets.
pub const DEFAULT_COLUMNS: [Column; 15] = [
    Column::Name,
    Column::Phone,
    Column::Address,
    Column::Website,
    Column::Email,
    Column::Instagram,
    Column::Facebook,
    Column::LinkedIn,
    Column::PlaceId,
    Column::City,
    Column::ContactName,
    Column::Category,
    Column::Rating,
    Column::Reviews,
    Column::MapsUrl,
];

impl Column {
    pub fn label(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Phone => "Phone",
            Self::Address => "Address",
            Self::Website => "Website",
            Self::Email => "Email",
            Self::Instagram => "Instagram",
            Self::Facebook => "Facebook",
            Self::LinkedIn => "LinkedIn",
            Self::PlaceId => "Place ID",
            Self::City => "City",
            Self::ContactName => "Contact Name",
            Self::Category => "Category",
            Self::Rating => "Rating",
            Self::Reviews => "Reviews",
            Self::MapsUrl => "Maps URL",
        }
    }

    /// Match a header cell to a column.
    pub fn from_header(header: &str) -> Option<Self> {
        let key = header
            .trim()
            .to_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let column = match key.as_str() {
            "name" | "business" | "business name" | "title" => Self::Name,
            "phone" | "phone number" | "telephone" => Self::Phone,
            "address" | "full address" => Self::Address,
            "website" | "web site" => Self::Website,
            "email" | "e mail" | "email address" => Self::Email,
            "instagram" => Self::Instagram,
            "facebook" => Self::Facebook,
            "linkedin" => Self::LinkedIn,
            "place id" | "placeid" => Self::PlaceId,
            "city" => Self::City,
            "contact name" | "contact" => Self::ContactName,
            "category" => Self::Category,
            "rating" => Self::Rating,
            "reviews" | "review count" => Self::Reviews,
            "maps url" | "google maps url" => Self::MapsUrl,
            _ => return None,
        };
        Some(column)
    }

    pub fn get(self, lead: &StoredLead) -> Option<&str> {
        match self {
            Self::Name => Some(lead.name.as_str()),
            Self::Phone => lead.phone.as_deref(),
            Self::Address => lead.address.as_deref(),
            Self::Website => lead.website.as_deref(),
            Self::Email => lead.email.as_deref(),
            Self::Instagram => lead.instagram.as_deref(),
            Self::Facebook => lead.facebook.as_deref(),
            Self::LinkedIn => lead.linkedin.as_deref(),
            Self::PlaceId => lead.place_id.as_deref(),
            Self::City => lead.city.as_deref(),
            Self::ContactName => lead.contact_name.as_deref(),
            Self::Category => lead.category.as_deref(),
            Self::Rating => lead.rating.as_deref(),
            Self::Reviews => lead.reviews.as_deref(),
            Self::MapsUrl => lead.maps_url.as_deref(),
        }
    }

    pub fn set(self, lead: &mut StoredLead, value: &str) {
        let value = non_blank(Some(value.to_string()));
        let slot = match self {
            Self::Name => {
                lead.name = value.unwrap_or_default();
                return;
            }
            Self::Phone => &mut lead.phone,
            Self::Address => &mut lead.address,
            Self::Website => &mut lead.website,
            Self::Email => &mut lead.email,
            Self::Instagram => &mut lead.instagram,
            Self::Facebook => &mut lead.facebook,
            Self::LinkedIn => &mut lead.linkedin,
            Self::PlaceId => &mut lead.place_id,
            Self::City => &mut lead.city,
            Self::ContactName => &mut lead.contact_name,
            Self::Category => &mut lead.category,
            Self::Rating => &mut lead.rating,
            Self::Reviews => &mut lead.reviews,
            Self::MapsUrl => &mut lead.maps_url,
        };
        *slot = value;
    }
}

// ---------------------------------------------------------------------------
// SheetHeader
// ---------------------------------------------------------------------------

/// A sheet's header row and which lead column each cell maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetHeader {
    labels: Vec<String>,
    columns: Vec<Option<Column>>,
}

impl SheetHeader {
    /// Parse an existing header row. A repeated column maps only at its first position.
    pub fn parse(row: &[String]) -> Self {
        let mut columns: Vec<Option<Column>> = Vec::with_capacity(row.len());
        for label in row {
            let column = Column::from_header(label).filter(|c| !columns.contains(&Some(*c)));
            columns.push(column);
        }
        Self {
            labels: row.to_vec(),
            columns,
        }
    }

    /// Header for a new, empty sheet.
    pub fn standard() -> Self {
        Self {
            labels: DEFAULT_COLUMNS.iter().map(|c| c.label().to_string()).collect(),
            columns: DEFAULT_COLUMNS.iter().copied().map(Some).collect(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn position(&self, column: Column) -> Option<usize> {
        self.columns.iter().position(|c| *c == Some(column))
    }

    /// Known columns this header has no cell for.
    pub fn missing(&self) -> Vec<Column> {
        DEFAULT_COLUMNS
            .iter()
            .copied()
            .filter(|c| self.position(*c).is_none())
            .collect()
    }

    /// Read a data row. Short rows are padded with empty cells.
    pub fn lead_from_row(&self, row: &[String]) -> StoredLead {
        let mut lead = StoredLead::default();
        for (index, column) in self.columns.iter().enumerate() {
            if let Some(column) = column {
                let cell = row.get(index).map(String::as_str).unwrap_or_default();
                column.set(&mut lead, cell);
            }
        }
        lead
    }

    /// Lay out `lead` in header order over `base` (the row's original cells).
    ///
    /// Known columns take the lead's value; every other cell keeps what `base` had.
    pub fn row_for(&self, lead: &StoredLead, base: &[String]) -> Vec<String> {
        let width = self.labels.len().max(base.len());
        (0..width)
            .map(|index| match self.columns.get(index).copied().flatten() {
                Some(column) => column.get(lead).unwrap_or_default().to_string(),
                None => base.get(index).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// LeadTable
// ---------------------------------------------------------------------------

/// One data row: the typed lead plus the cells it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadRow {
    pub lead: StoredLead,
    pub cells: Vec<String>,
}

impl LeadRow {
    /// No non-empty cell at all.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

impl HasLeadKey for LeadRow {
    fn lead_name(&self) -> &str {
        &self.lead.name
    }

    fn lead_phone(&self) -> Option<&str> {
        self.lead.phone.as_deref()
    }
}

/// A whole sheet, header included, as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadTable {
    pub header: SheetHeader,
    pub rows: Vec<LeadRow>,
}

impl LeadTable {
    /// Build a table from raw sheet values. An empty sheet gets the standard header.
    pub fn from_values(values: Vec<Vec<String>>) -> Self {
        let mut values = values.into_iter();
        let header = match values.next() {
            Some(first) if first.iter().any(|c| !c.trim().is_empty()) => SheetHeader::parse(&first),
            _ => SheetHeader::standard(),
        };
        let rows = values
            .map(|cells| LeadRow {
                lead: header.lead_from_row(&cells),
                cells,
            })
            .collect();
        Self { header, rows }
    }

    pub fn leads(&self) -> impl Iterator<Item = &StoredLead> {
        self.rows.iter().map(|row| &row.lead)
    }

    /// Header plus every row, ready to write back.
    pub fn to_values(&self) -> Vec<Vec<String>> {
        std::iter::once(self.header.labels().to_vec())
            .chain(
                self.rows
                    .iter()
                    .map(|row| self.header.row_for(&row.lead, &row.cells)),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn header_aliases_and_case() {
        assert_eq!(Column::from_header(" business "), Some(Column::Name));
        assert_eq!(Column::from_header("PLACE_ID"), Some(Column::PlaceId));
        assert_eq!(Column::from_header("E-mail"), Some(Column::Email));
        assert_eq!(Column::from_header("LinkedIn"), Some(Column::LinkedIn));
        assert_eq!(Column::from_header("Notes"), None);
    }

    #[test]
    fn standard_header_order() {
        let header = SheetHeader::standard();
        assert_eq!(
            &header.labels()[..8],
            strings(&[
                "Name", "Phone", "Address", "Website", "Email", "Instagram", "Facebook",
                "LinkedIn"
            ])
            .as_slice()
        );
        assert!(header.missing().is_empty());
    }

    #[test]
    fn reads_short_rows_and_unknown_columns() {
        let header = SheetHeader::parse(&strings(&["Phone", "Notes", "Name", "Email"]));
        let lead = header.lead_from_row(&strings(&["0161 555 0100", "call after 5", "Acme"]));
        assert_eq!(lead.name, "Acme");
        assert_eq!(lead.phone.as_deref(), Some("0161 555 0100"));
        assert_eq!(lead.email, None);
        assert!(header.missing().contains(&Column::Website));
    }

    #[test]
    fn rewrite_keeps_unknown_cells() {
        let values = vec![
            strings(&["Name", "Notes", "Instagram"]),
            strings(&["Acme", "VIP", "https://instagram.com/acme"]),
        ];
        let mut table = LeadTable::from_values(values);
        table.rows[0].lead.instagram = None;

        let written = table.to_values();
        assert_eq!(written[0], strings(&["Name", "Notes", "Instagram"]));
        assert_eq!(written[1], strings(&["Acme", "VIP", ""]));
    }

    #[test]
    fn duplicate_header_maps_first_only() {
        let header = SheetHeader::parse(&strings(&["Name", "Business"]));
        let lead = header.lead_from_row(&strings(&["First", "Second"]));
        assert_eq!(lead.name, "First");
        let row = header.row_for(&lead, &strings(&["First", "Second"]));
        assert_eq!(row, strings(&["First", "Second"]));
    }

    #[test]
    fn empty_sheet_gets_standard_header() {
        let table = LeadTable::from_values(vec![]);
        assert_eq!(table.header, SheetHeader::standard());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn blank_rows_are_detected() {
        let table = LeadTable::from_values(vec![
            strings(&["Name"]),
            strings(&["", "  "]),
            strings(&["Acme"]),
        ]);
        assert!(table.rows[0].is_blank());
        assert!(!table.rows[1].is_blank());
    }
}
