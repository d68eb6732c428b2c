//! In-memory ISA-Tab model: one investigation, one study table, one table per
//! assay kind.

use serde::Serialize;

pub const INVESTIGATION_FILE: &str = "i_investigation.txt";
pub const STUDY_FILE: &str = "s_study.txt";

/// One named column of a study or assay table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub header: String,
    pub values: Vec<String>,
}

impl Column {
    pub fn new(header: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            header: header.into(),
            values,
        }
    }

    /// A column repeating one value for every row.
    pub fn constant(header: impl Into<String>, value: &str, rows: usize) -> Self {
        Self::new(header, vec![value.to_string(); rows])
    }
}

/// Column-oriented table. All columns hold the same number of values; header
/// names may repeat (`Term Source REF`, `Unit`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub file_name: String,
    pub columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    pub fn new(file_name: impl Into<String>, row_count: usize, columns: Vec<Column>) -> Self {
        debug_assert!(columns.iter().all(|c| c.values.len() == row_count));
        Self {
            file_name: file_name.into(),
            columns,
            row_count,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    /// First column with the given header.
    pub fn column(&self, header: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.header == header)
    }

    pub fn value(&self, row: usize, header: &str) -> Option<&str> {
        self.column(header)
            .and_then(|c| c.values.get(row))
            .map(String::as_str)
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        (0..self.row_count).map(move |row| {
            self.columns
                .iter()
                .map(|c| c.values.get(row).map(String::as_str).unwrap_or(""))
                .collect()
        })
    }
}

/// `Label<TAB>value<TAB>value...` line of the investigation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvestigationField {
    pub label: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvestigationSection {
    pub name: String,
    pub fields: Vec<InvestigationField>,
}

impl InvestigationSection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn field<I, S>(mut self, label: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.push(InvestigationField {
            label: label.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// A field with no values.
    pub fn empty(self, label: &str) -> Self {
        self.field(label, Vec::<String>::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Investigation {
    pub sections: Vec<InvestigationSection>,
}

impl Investigation {
    pub fn section(&self, name: &str) -> Option<&InvestigationSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Values of `label` within `section`.
    pub fn values(&self, section: &str, label: &str) -> Option<&[String]> {
        self.section(section)?
            .fields
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.values.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IsaTabModel {
    pub investigation: Investigation,
    pub study: Table,
    pub assays: Vec<Table>,
}

impl IsaTabModel {
    pub fn assay_row_count(&self) -> usize {
        self.assays.iter().map(Table::row_count).sum()
    }
}
