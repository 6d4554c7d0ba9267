//! This module maps metadata spreadsheets onto normalized records.
//!
//! Which column ends up in which field is decided by a declarative table of
//! [`FieldSpec`]s: an output name, the header labels it may appear under
//! (first match wins) and an optional cleaning function. The sheets evolved
//! over time, so some fields carry more than one label.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, DataType, Reader, Xlsx};
use serde::Serialize;

use crate::error::{IngestError, Result};
use crate::normalize;

/// A raw spreadsheet cell, reduced to what the cleaners care about
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Trimmed textual rendering. Integral numbers lose their `.0`.
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            Cell::Number(f) => f.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }
}

impl From<&DataType> for Cell {
    fn from(d: &DataType) -> Self {
        match d {
            DataType::Int(i) => Cell::Number(*i as f64),
            DataType::Float(f) | DataType::DateTime(f) => Cell::Number(*f),
            DataType::String(s) => Cell::Text(s.clone()),
            DataType::Bool(b) => Cell::Text(b.to_string()),
            DataType::Error(_) | DataType::Empty => Cell::Empty,
        }
    }
}

/// A cleaned field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Blank,
    Text(String),
    Int(i64),
}

impl Value {
    pub fn from_text(s: String) -> Self {
        if s.is_empty() {
            Value::Blank
        } else {
            Value::Text(s)
        }
    }
}

static EMPTY_CELL: Cell = Cell::Empty;
static BLANK: Value = Value::Blank;

/// Turns a raw cell into a field value, or hands back the offending text
pub type Cleaner = fn(&Cell) -> std::result::Result<Value, String>;

/// One entry of the declarative field table
pub struct FieldSpec {
    pub name: &'static str,
    pub headers: &'static [&'static str],
    pub clean: Option<Cleaner>,
}

/// Where to find the header and the data in a sheet (0-based row indices)
#[derive(Debug, Clone, Copy)]
pub struct SheetLayout {
    pub header_row: usize,
    pub data_start: usize,
}

pub const AMPLICON_LAYOUT: SheetLayout = SheetLayout {
    header_row: 1,
    data_start: 4,
};

pub const AMPLICON_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "bpa_id",
        headers: &["Soil sample unique ID"],
        clean: Some(normalize::clean_identifier),
    },
    FieldSpec {
        name: "sample_extraction_id",
        headers: &["Sample extraction ID"],
        clean: None,
    },
    FieldSpec {
        name: "sequencing_facility",
        headers: &["Sequencing facility"],
        clean: None,
    },
    FieldSpec {
        name: "target",
        headers: &["Target"],
        clean: Some(normalize::upper_trim),
    },
    FieldSpec {
        name: "index",
        headers: &["Index"],
        clean: Some(normalize::truncate_index),
    },
    FieldSpec {
        name: "index1",
        headers: &["Index 1"],
        clean: Some(normalize::truncate_index),
    },
    FieldSpec {
        name: "index2",
        headers: &["Index2"],
        clean: Some(normalize::truncate_index),
    },
    FieldSpec {
        name: "pcr_1_to_10",
        headers: &["1:10 PCR, P=pass, F=fail"],
        clean: Some(normalize::fix_pcr),
    },
    FieldSpec {
        name: "pcr_1_to_100",
        headers: &["1:100 PCR, P=pass, F=fail"],
        clean: Some(normalize::fix_pcr),
    },
    FieldSpec {
        name: "pcr_neat",
        headers: &["neat PCR, P=pass, F=fail"],
        clean: Some(normalize::fix_pcr),
    },
    FieldSpec {
        name: "dilution",
        headers: &["Dilution used"],
        clean: Some(normalize::fix_dilution),
    },
    FieldSpec {
        name: "sequencing_run_number",
        headers: &["Sequencing run number"],
        clean: None,
    },
    FieldSpec {
        name: "flow_cell_id",
        headers: &["Flowcell"],
        clean: None,
    },
    FieldSpec {
        name: "reads",
        headers: &["# of RAW reads", "# of reads"],
        clean: Some(normalize::parse_int),
    },
    FieldSpec {
        name: "name",
        headers: &["Sample name on sample sheet"],
        clean: None,
    },
    FieldSpec {
        name: "analysis_software_version",
        headers: &["AnalysisSoftwareVersion"],
        clean: None,
    },
    FieldSpec {
        name: "comments",
        headers: &["Comments"],
        clean: None,
    },
];

/// A generic extracted row, fields addressable by their output name
#[derive(Debug, Clone)]
pub struct Row {
    pub file_name: PathBuf,
    /// 1-based row number as shown in a spreadsheet application
    pub row: usize,
    values: HashMap<&'static str, Value>,
}

impl Row {
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&BLANK)
    }

    /// Textual field value, `None` if blank
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name) {
            Value::Blank => None,
            Value::Text(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// Resolves the columns of a field table against a header row once, then
/// maps data rows onto [`Row`]s
pub struct FieldExtractor<'a> {
    fields: &'a [FieldSpec],
    columns: Vec<Option<usize>>,
    file_name: PathBuf,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(fields: &'a [FieldSpec], header: &[Cell], file_name: &Path) -> Self {
        let labels: Vec<String> = header.iter().map(|c| c.text()).collect();
        let columns = fields
            .iter()
            .map(|field| {
                let col = field
                    .headers
                    .iter()
                    .find_map(|h| labels.iter().position(|l| l == h));
                if col.is_none() {
                    warn!(
                        "{}: no column for {} (tried {:?}), leaving it blank",
                        file_name.display(),
                        field.name,
                        field.headers
                    );
                }
                col
            })
            .collect();

        FieldExtractor {
            fields,
            columns,
            file_name: file_name.to_path_buf(),
        }
    }

    /// Map one data row. `row_idx` is the 0-based sheet row.
    pub fn extract(&self, row_idx: usize, cells: &[Cell]) -> Result<Row> {
        let mut values = HashMap::with_capacity(self.fields.len());
        for (field, col) in self.fields.iter().zip(&self.columns) {
            let cell = col.and_then(|c| cells.get(c)).unwrap_or(&EMPTY_CELL);
            let value = match field.clean {
                Some(clean) => clean(cell).map_err(|value| IngestError::InvalidInteger {
                    path: self.file_name.clone(),
                    row: row_idx + 1,
                    field: field.name,
                    value,
                })?,
                None => Value::from_text(cell.text()),
            };
            values.insert(field.name, value);
        }
        Ok(Row {
            file_name: self.file_name.clone(),
            row: row_idx + 1,
            values,
        })
    }
}

/// Lazily extract all data rows of a sheet. Completely empty rows are skipped.
pub fn extract_rows<'a>(
    fields: &'a [FieldSpec],
    layout: SheetLayout,
    grid: &'a [Vec<Cell>],
    file_name: &Path,
) -> Result<impl Iterator<Item = Result<Row>> + 'a> {
    let header = grid.get(layout.header_row).ok_or_else(|| IngestError::MissingHeader {
        path: file_name.to_path_buf(),
        row: layout.header_row,
    })?;
    let extractor = FieldExtractor::new(fields, header, file_name);

    Ok(grid
        .iter()
        .enumerate()
        .skip(layout.data_start)
        .filter(|(_, cells)| !cells.iter().all(Cell::is_empty))
        .map(move |(idx, cells)| extractor.extract(idx, cells)))
}

/// Read the first worksheet of a workbook into an absolute grid, i.e. row
/// and column indices match the sheet even if the used range starts later
pub fn read_grid(path: &Path) -> Result<Vec<Vec<Cell>>> {
    let xlsx_err = |source| IngestError::Spreadsheet {
        path: path.to_path_buf(),
        source,
    };

    let mut wb: Xlsx<_> = open_workbook(path).map_err(xlsx_err)?;
    let sheetname = wb
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::EmptyWorkbook(path.to_path_buf()))?;
    let range = wb
        .worksheet_range(&sheetname)
        .ok_or_else(|| IngestError::EmptyWorkbook(path.to_path_buf()))?
        .map_err(xlsx_err)?;

    let (row0, col0) = range.start().unwrap_or((0, 0));
    let mut grid: Vec<Vec<Cell>> = vec![Vec::new(); row0 as usize];
    for r in range.rows() {
        let cells = grid_row(path, grid.len(), col0 as usize, r);
        grid.push(cells);
    }
    Ok(grid)
}

/// Convert one sheet row, padded to `col0` leading empty cells. Excel error
/// values (`#N/A`, `#REF!`, ...) are reported and read as blank.
fn grid_row(path: &Path, row_idx: usize, col0: usize, data: &[DataType]) -> Vec<Cell> {
    let mut cells = vec![Cell::Empty; col0];
    for (i, d) in data.iter().enumerate() {
        if let DataType::Error(e) = d {
            warn!(
                "{}: row {}, column {}: cell holds {}, reading it as blank",
                path.display(),
                row_idx + 1,
                col0 + i + 1,
                e
            );
        }
        cells.push(Cell::from(d));
    }
    cells
}

/// A metadata spreadsheet row with all amplicon fields cleaned
#[derive(Debug, Clone, Serialize)]
pub struct AmpliconRow {
    pub file_name: String,
    pub row: usize,
    pub bpa_id: Option<String>,
    pub sample_extraction_id: Option<String>,
    pub sequencing_facility: Option<String>,
    pub target: String,
    pub index: Option<String>,
    pub index1: Option<String>,
    pub index2: Option<String>,
    pub pcr_1_to_10: String,
    pub pcr_1_to_100: String,
    pub pcr_neat: String,
    pub dilution: String,
    pub sequencing_run_number: Option<String>,
    pub flow_cell_id: Option<String>,
    pub reads: Option<i64>,
    pub name: Option<String>,
    pub analysis_software_version: Option<String>,
    pub comments: Option<String>,
}

impl From<Row> for AmpliconRow {
    fn from(r: Row) -> Self {
        AmpliconRow {
            file_name: r.file_name.display().to_string(),
            row: r.row,
            bpa_id: r.text("bpa_id"),
            sample_extraction_id: r.text("sample_extraction_id"),
            sequencing_facility: r.text("sequencing_facility"),
            target: r.text("target").unwrap_or_default(),
            index: r.text("index"),
            index1: r.text("index1"),
            index2: r.text("index2"),
            pcr_1_to_10: r.text("pcr_1_to_10").unwrap_or_default(),
            pcr_1_to_100: r.text("pcr_1_to_100").unwrap_or_default(),
            pcr_neat: r.text("pcr_neat").unwrap_or_default(),
            dilution: r.text("dilution").unwrap_or_default(),
            sequencing_run_number: r.text("sequencing_run_number"),
            flow_cell_id: r.text("flow_cell_id"),
            reads: r.int("reads"),
            name: r.text("name"),
            analysis_software_version: r.text("analysis_software_version"),
            comments: r.text("comments"),
        }
    }
}

impl AmpliconRow {
    /// Archaeal amplicons carry more than one index. Bunch all non-blank
    /// ones into a single string.
    pub fn merged_index(&self) -> String {
        [&self.index, &self.index1, &self.index2]
            .iter()
            .filter_map(|i| i.as_deref())
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .collect::<Vec<&str>>()
            .join(", ")
    }
}

/// Parse all metadata rows of an amplicon spreadsheet.
///
/// A read count that is not an integer aborts the whole file.
pub fn rows_from_grid(grid: &[Vec<Cell>], file_name: &Path) -> Result<Vec<AmpliconRow>> {
    extract_rows(AMPLICON_FIELDS, AMPLICON_LAYOUT, grid, file_name)?
        .map(|r| r.map(AmpliconRow::from))
        .collect()
}

pub fn read_metadata(path: &Path) -> Result<Vec<AmpliconRow>> {
    let grid = read_grid(path)?;
    rows_from_grid(&grid, path)
}
