//! Mapping rows from a differently shaped sheet onto leads.

use leadscout_shared::{StoredLead, non_blank};

/// Lead fields an imported sheet can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceField {
    Name,
    ContactName,
    Phone,
    City,
    Website,
}

impl SourceField {
    fn from_header(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        let field = match label.as_str() {
            "business" | "business name" | "name" | "company" | "company name" => Self::Name,
            "owner" | "owner name" | "contact" | "contact name" => Self::ContactName,
            "phone" | "phone number" | "telephone" | "tel" => Self::Phone,
            "city" | "town" => Self::City,
            "website" | "url" | "site" | "web" => Self::Website,
            _ => return None,
        };
        Some(field)
    }
}

/// Column positions of the mappable fields in a source sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumns {
    columns: Vec<Option<SourceField>>,
}

impl SourceColumns {
    /// Read the source header. When a field appears twice, the first column wins.
    pub fn parse(header: &[String]) -> Self {
        let mut columns: Vec<Option<SourceField>> = Vec::with_capacity(header.len());
        for label in header {
            let field = SourceField::from_header(label).filter(|f| !columns.contains(&Some(*f)));
            columns.push(field);
        }
        Self { columns }
    }

    /// True when the header has a business-name column.
    pub fn has_name(&self) -> bool {
        self.columns.contains(&Some(SourceField::Name))
    }
}

/// Map one source row. Fields the source does not carry stay empty.
pub fn map_source_row(columns: &SourceColumns, row: &[String]) -> StoredLead {
    let mut lead = StoredLead::default();
    for (index, field) in columns.columns.iter().enumerate() {
        let (Some(field), Some(cell)) = (field, row.get(index)) else {
            continue;
        };
        let value = non_blank(Some(cell.clone()));
        match field {
            SourceField::Name => lead.name = value.unwrap_or_default(),
            SourceField::ContactName => lead.contact_name = value,
            SourceField::Phone => lead.phone = value,
            SourceField::City => lead.city = value,
            SourceField::Website => lead.website = value,
        }
    }
    lead
}
