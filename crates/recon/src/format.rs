//! Formatter contract: turn a finished comparison into styled rows.
//!
//! Formatters never re-walk source data; they read the comparison's breaks
//! and its cached metadata and push rows into a `ContentWriter`. Rendering
//! (spreadsheet, HTML, terminal) is the writer's business.

use std::io;

use crate::breaks::{Break, BreakDetail, Side};
use crate::engine::Comparison;
use crate::value::Value;

/// Rows between progress log lines in `BreakFormatter`.
const PROGRESS_EVERY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellStyle {
    #[default]
    Plain,
    Title,
    Key,
    FieldBreak,
    RightValue,
    LeftOnly,
    RightOnly,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentCell {
    pub value: String,
    pub style: CellStyle,
}

impl ContentCell {
    pub fn new(value: impl Into<String>, style: CellStyle) -> Self {
        Self {
            value: value.into(),
            style,
        }
    }

    pub fn plain(value: impl Into<String>) -> Self {
        Self::new(value, CellStyle::Plain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentRow {
    pub cells: Vec<ContentCell>,
}

impl ContentRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cell(mut self, value: impl Into<String>, style: CellStyle) -> Self {
        self.cells.push(ContentCell::new(value, style));
        self
    }

    pub fn with_value(self, value: impl Into<String>) -> Self {
        self.with_cell(value, CellStyle::Plain)
    }

    /// Restyle every cell.
    pub fn with_style(mut self, style: CellStyle) -> Self {
        for cell in &mut self.cells {
            cell.style = style;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn values(&self) -> Vec<&str> {
        self.cells.iter().map(|c| c.value.as_str()).collect()
    }
}

/// Sheet-level hints for a writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMetadata {
    pub title: String,
    pub header_rows: usize,
    pub frozen_columns: usize,
}

pub trait ContentWriter {
    fn open_content(&mut self, metadata: &ContentMetadata) -> io::Result<()>;
    fn write_row(&mut self, row: &ContentRow) -> io::Result<()>;
    fn close_content(&mut self) -> io::Result<()>;
}

pub trait ContentFormatter {
    fn write_data(&self, comparison: &Comparison, writer: &mut dyn ContentWriter) -> io::Result<()>;
}

/// Cell text for a value. Nulls render empty.
fn cell_text(value: &Value) -> String {
    if value.is_null() {
        String::new()
    } else {
        value.to_string()
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Sizes, break totals and per break-type counts, plus an optional legend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryFormatter {
    pub write_legend: bool,
}

impl SummaryFormatter {
    pub fn new(write_legend: bool) -> Self {
        Self { write_legend }
    }

    fn legend(&self, comparison: &Comparison, writer: &mut dyn ContentWriter) -> io::Result<()> {
        let left = comparison.left_source().short_name();
        let right = comparison.right_source().short_name();
        let entries = [
            (format!("{left} value"), CellStyle::FieldBreak),
            (format!("{right} value"), CellStyle::RightValue),
            (format!("Only in {left}"), CellStyle::LeftOnly),
            (format!("Only in {right}"), CellStyle::RightOnly),
            ("Key field".to_string(), CellStyle::Key),
            ("Excluded field".to_string(), CellStyle::Exclude),
        ];

        writer.write_row(&ContentRow::new())?;
        writer.write_row(&ContentRow::new().with_cell("Color Legend", CellStyle::Title))?;
        for (label, style) in entries {
            writer.write_row(&ContentRow::new().with_value(label).with_cell("", style))?;
        }
        Ok(())
    }
}

impl ContentFormatter for SummaryFormatter {
    fn write_data(&self, comparison: &Comparison, writer: &mut dyn ContentWriter) -> io::Result<()> {
        let meta = comparison.metadata();
        writer.open_content(&ContentMetadata {
            title: format!("{} Summary", meta.name()),
            header_rows: 0,
            frozen_columns: 0,
        })?;

        writer.write_row(&ContentRow::new().with_cell(format!("{} Info", meta.name()), CellStyle::Title))?;
        writer.write_row(
            &ContentRow::new()
                .with_value(format!("{} Size", meta.left_name()))
                .with_value(meta.left_size().to_string()),
        )?;
        writer.write_row(
            &ContentRow::new()
                .with_value(format!("{} Size", meta.right_name()))
                .with_value(meta.right_size().to_string()),
        )?;
        writer.write_row(&ContentRow::new())?;

        let mut header = ContentRow::new()
            .with_value("Break Type")
            .with_value("Count");
        if meta.excluded_break_count() > 0 || !meta.excluded_field_break_fields().is_empty() {
            header = header.with_value("Excluded");
        }
        writer.write_row(&header.with_style(CellStyle::Title))?;

        let mut total = ContentRow::new()
            .with_value("Total breaks")
            .with_value(meta.included_break_count().to_string());
        if meta.excluded_break_count() > 0 {
            total = total.with_value(meta.excluded_break_count().to_string());
        }
        writer.write_row(&total)?;

        for info in meta.break_types() {
            let mut row = ContentRow::new()
                .with_value(format!("{} breaks", info.label))
                .with_value(info.break_count.to_string());
            if info.exclude_count > 0 {
                row = row.with_value(info.exclude_count.to_string());
            }
            writer.write_row(&row)?;
        }

        if self.write_legend {
            self.legend(comparison, writer)?;
        }
        writer.close_content()
    }
}

// ============================================================================
// Break listing
// ============================================================================

/// One row per differing field of a field break and one row per presence or
/// group break. `excluded` selects which half of the breaks is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakFormatter {
    pub excluded: bool,
}

impl BreakFormatter {
    pub fn new(excluded: bool) -> Self {
        Self { excluded }
    }

    fn header(&self, comparison: &Comparison, with_group: bool) -> ContentRow {
        let mut row = ContentRow::new().with_cell("Break Type", CellStyle::Title);
        if with_group {
            row = row.with_cell("Group", CellStyle::Title);
        }
        for key in comparison.key_fields() {
            row = row.with_cell(key.as_str(), CellStyle::Key);
        }
        row.with_cell("Field", CellStyle::Title)
            .with_cell(comparison.left_source().short_name(), CellStyle::Title)
            .with_cell(comparison.right_source().short_name(), CellStyle::Title)
    }

    /// Leading cells shared by every row of one break.
    fn lead(&self, comparison: &Comparison, br: &Break, label: String, with_group: bool) -> ContentRow {
        let mut row = ContentRow::new().with_value(label);
        if with_group {
            let group = br.group_id().map(|id| id.to_string()).unwrap_or_default();
            row = row.with_value(group);
        }
        for key in comparison.key_fields() {
            row = row.with_cell(cell_text(br.record().get(key)), CellStyle::Key);
        }
        row
    }

    fn rows(&self, comparison: &Comparison, br: &Break, with_group: bool) -> Vec<ContentRow> {
        let only = |side: Side| match side {
            Side::Left => (
                format!("Only in {}", comparison.left_source().short_name()),
                CellStyle::LeftOnly,
            ),
            Side::Right => (
                format!("Only in {}", comparison.right_source().short_name()),
                CellStyle::RightOnly,
            ),
        };

        match br.detail() {
            BreakDetail::Field(diffs) => diffs
                .iter()
                .map(|diff| {
                    let actual_style = if !self.excluded && diff.excluded {
                        CellStyle::Exclude
                    } else {
                        CellStyle::FieldBreak
                    };
                    self.lead(comparison, br, "Different values".to_string(), with_group)
                        .with_value(diff.field.as_str())
                        .with_cell(cell_text(br.record().get(&diff.field)), actual_style)
                        .with_cell(cell_text(&diff.expected), CellStyle::RightValue)
                })
                .collect(),
            BreakDetail::Presence => {
                let (label, style) = only(br.side());
                let row = self
                    .lead(comparison, br, label, with_group)
                    .with_value("")
                    .with_value("")
                    .with_value("")
                    .with_style(style);
                vec![row]
            }
            BreakDetail::Group { fields, .. } => {
                let (label, style) = only(br.side());
                let value = |side: Side| {
                    if br.side() == side {
                        fields
                            .iter()
                            .map(|f| format!("{f}={}", cell_text(br.record().get(f))))
                            .collect::<Vec<_>>()
                            .join(", ")
                    } else {
                        String::new()
                    }
                };
                let row = self
                    .lead(comparison, br, format!("{label} group"), with_group)
                    .with_value(fields.join(", "))
                    .with_value(value(Side::Left))
                    .with_value(value(Side::Right))
                    .with_style(style);
                vec![row]
            }
        }
    }
}

impl ContentFormatter for BreakFormatter {
    fn write_data(&self, comparison: &Comparison, writer: &mut dyn ContentWriter) -> io::Result<()> {
        let meta = comparison.metadata();
        let with_group = meta.has_group_breaks();
        let kind = if self.excluded { "excluded " } else { "" };

        writer.open_content(&ContentMetadata {
            title: if self.excluded {
                format!("{} Excluded", meta.name())
            } else {
                meta.name().to_string()
            },
            header_rows: 1,
            frozen_columns: if with_group { 2 } else { 1 },
        })?;
        writer.write_row(&self.header(comparison, with_group))?;

        let mut count = 0usize;
        for br in comparison.breaks() {
            if br.is_excluded() != self.excluded {
                continue;
            }
            for row in self.rows(comparison, br, with_group) {
                writer.write_row(&row)?;
            }
            count += 1;
            if count % PROGRESS_EVERY == 0 {
                log::info!("Wrote {count} {kind}breaks");
            }
        }
        log::info!("Wrote {count} total {kind}breaks");

        writer.close_content()
    }
}

// ============================================================================
// In-memory writer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub metadata: ContentMetadata,
    pub rows: Vec<ContentRow>,
}

/// Collects every opened content block in memory.
#[derive(Debug, Default)]
pub struct VecWriter {
    contents: Vec<Content>,
    open: bool,
}

impl VecWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &[Content] {
        &self.contents
    }

    pub fn into_contents(self) -> Vec<Content> {
        self.contents
    }

    fn current(&mut self) -> io::Result<&mut Content> {
        match self.contents.last_mut() {
            Some(content) if self.open => Ok(content),
            _ => Err(io::Error::new(io::ErrorKind::Other, "no content is open")),
        }
    }
}

impl ContentWriter for VecWriter {
    fn open_content(&mut self, metadata: &ContentMetadata) -> io::Result<()> {
        if self.open {
            return Err(io::Error::new(io::ErrorKind::Other, "content already open"));
        }
        self.contents.push(Content {
            metadata: metadata.clone(),
            rows: Vec::new(),
        });
        self.open = true;
        Ok(())
    }

    fn write_row(&mut self, row: &ContentRow) -> io::Result<()> {
        self.current()?.rows.push(row.clone());
        Ok(())
    }

    fn close_content(&mut self) -> io::Result<()> {
        self.current()?;
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakExcludeConfig, ComparisonConfig};
    use crate::engine::Reconciler;
    use crate::source::RecordSource;

    fn comparison() -> Comparison {
        let config = ComparisonConfig::new(["Key"])
            .with_name("Positions")
            .with_break_exclude(BreakExcludeConfig {
                field: Some("Desk".into()),
                ..Default::default()
            });
        let left = RecordSource::from_rows(
            "prod extract",
            vec![
                vec![("Key", "A"), ("Qty", "1"), ("Desk", "x")],
                vec![("Key", "B"), ("Qty", "1"), ("Desk", "x")],
                vec![("Key", "C"), ("Qty", "1"), ("Desk", "x")],
            ],
        );
        let right = RecordSource::from_rows(
            "uat extract",
            vec![
                vec![("Key", "A"), ("Qty", "2"), ("Desk", "y")],
                vec![("Key", "B"), ("Qty", "1"), ("Desk", "z")],
                vec![("Key", "D"), ("Qty", "1"), ("Desk", "x")],
            ],
        );
        Reconciler::new(config).unwrap().compare(left, right).unwrap()
    }

    fn rows(formatter: &dyn ContentFormatter, comparison: &Comparison) -> Content {
        let mut writer = VecWriter::new();
        formatter.write_data(comparison, &mut writer).unwrap();
        let mut contents = writer.into_contents();
        assert_eq!(contents.len(), 1);
        contents.remove(0)
    }

    #[test]
    fn summary_rows() {
        let comparison = comparison();
        let content = rows(&SummaryFormatter::new(false), &comparison);
        assert_eq!(content.metadata.title, "Positions Summary");

        let values: Vec<Vec<&str>> = content.rows.iter().map(ContentRow::values).collect();
        assert_eq!(
            values,
            vec![
                vec!["Positions Info"],
                vec!["prod extract Size", "3"],
                vec!["uat extract Size", "3"],
                vec![],
                vec!["Break Type", "Count", "Excluded"],
                vec!["Total breaks", "3", "1"],
                vec!["Qty breaks", "1"],
                vec!["Only in prod breaks", "1"],
                vec!["Only in uat breaks", "1"],
                vec!["Desk breaks", "0", "2"],
            ]
        );
        assert_eq!(content.rows[0].cells[0].style, CellStyle::Title);
        assert!(content.rows[4].cells.iter().all(|c| c.style == CellStyle::Title));
    }

    #[test]
    fn summary_legend() {
        let comparison = comparison();
        let content = rows(&SummaryFormatter::new(true), &comparison);
        let tail: Vec<&ContentRow> = content.rows.iter().rev().take(6).collect();
        assert_eq!(tail[0].values(), vec!["Excluded field", ""]);
        assert_eq!(tail[0].cells[1].style, CellStyle::Exclude);
        assert_eq!(tail[5].values(), vec!["prod value", ""]);
        assert_eq!(tail[5].cells[1].style, CellStyle::FieldBreak);
    }

    #[test]
    fn included_break_rows() {
        let comparison = comparison();
        let content = rows(&BreakFormatter::new(false), &comparison);
        assert_eq!(content.metadata.title, "Positions");
        assert_eq!(content.metadata.frozen_columns, 1);

        let values: Vec<Vec<&str>> = content.rows.iter().map(ContentRow::values).collect();
        assert_eq!(
            values,
            vec![
                vec!["Break Type", "Key", "Field", "prod", "uat"],
                vec!["Different values", "A", "Qty", "1", "2"],
                vec!["Different values", "A", "Desk", "x", "y"],
                vec!["Only in prod", "C", "", "", ""],
                vec!["Only in uat", "D", "", "", ""],
            ]
        );
        assert_eq!(content.rows[1].cells[3].style, CellStyle::FieldBreak);
        assert_eq!(content.rows[2].cells[3].style, CellStyle::Exclude);
        assert_eq!(content.rows[2].cells[4].style, CellStyle::RightValue);
        assert!(content.rows[3].cells.iter().all(|c| c.style == CellStyle::LeftOnly));
        assert!(content.rows[4].cells.iter().all(|c| c.style == CellStyle::RightOnly));
    }

    #[test]
    fn excluded_break_rows() {
        let comparison = comparison();
        let content = rows(&BreakFormatter::new(true), &comparison);
        assert_eq!(content.metadata.title, "Positions Excluded");
        let values: Vec<Vec<&str>> = content.rows.iter().skip(1).map(ContentRow::values).collect();
        assert_eq!(values, vec![vec!["Different values", "B", "Desk", "x", "z"]]);
        assert_eq!(content.rows[1].cells[3].style, CellStyle::FieldBreak);
    }

    #[test]
    fn group_breaks_add_group_column() {
        let left = RecordSource::from_rows(
            "l",
            vec![vec![("Key", "A"), ("V", "1")], vec![("Key", "A"), ("V", "2")]],
        );
        let right = RecordSource::from_rows(
            "r",
            vec![vec![("Key", "A"), ("V", "1")], vec![("Key", "A"), ("V", "3")]],
        );
        let comparison = Reconciler::new(ComparisonConfig::new(["Key"]))
            .unwrap()
            .compare(left, right)
            .unwrap();
        let content = rows(&BreakFormatter::default(), &comparison);
        assert_eq!(content.metadata.frozen_columns, 2);

        let values: Vec<Vec<&str>> = content.rows.iter().map(ContentRow::values).collect();
        assert_eq!(
            values,
            vec![
                vec!["Break Type", "Group", "Key", "Field", "l", "r"],
                vec!["Only in l group", "1", "A", "V", "V=2", ""],
                vec!["Only in r group", "1", "A", "V", "", "V=3"],
            ]
        );
    }

    #[test]
    fn vec_writer_rejects_rows_outside_content() {
        let mut writer = VecWriter::new();
        assert!(writer.write_row(&ContentRow::new()).is_err());
        assert!(writer.close_content().is_err());

        let meta = ContentMetadata {
            title: "t".into(),
            header_rows: 0,
            frozen_columns: 0,
        };
        writer.open_content(&meta).unwrap();
        assert!(writer.open_content(&meta).is_err());
        writer.write_row(&ContentRow::new().with_value("x")).unwrap();
        writer.close_content().unwrap();
        assert_eq!(writer.contents()[0].rows.len(), 1);
    }
}
