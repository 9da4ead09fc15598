//! Ordering and rendering of the final report.

use std::{cmp::Ordering, fs, io, path::Path};

use itertools::Itertools;

use crate::{aggregate::AggregateMap, Error, Result};

pub const REPORT_HEADER: [&str; 3] = ["drug_name", "num_prescriber", "total_cost"];

/// How `total_cost` is printed. Both styles round to cents first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CostStyle {
    /// Two decimals with a trailing zero dropped: `20.0`, `15.5`, `7.25`.
    #[default]
    Shortest,
    /// Exactly two fractional digits: `20.00`, `7.25`.
    Fixed,
}

impl CostStyle {
    /// Rounds `cost` to two decimals from its exact binary value, ties to even.
    /// `10.005` is stored as `10.00500…` and rounds up, `2.675` as `2.67499…`
    /// and rounds down.
    pub fn render(self, cost: f64) -> String {
        let fixed = format!("{cost:.2}");
        match self {
            CostStyle::Fixed => fixed,
            CostStyle::Shortest => match fixed.strip_suffix('0') {
                Some(trimmed) => trimmed.to_string(),
                None => fixed,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub drug_name: String,
    pub num_prescriber: usize,
    /// Kept at full precision so sorting never sees the display rounding.
    pub total_cost: f64,
}

impl ReportRow {
    /// Cost descending, then drug name ascending.
    pub fn report_order(a: &Self, b: &Self) -> Ordering {
        b.total_cost
            .total_cmp(&a.total_cost)
            .then_with(|| a.drug_name.cmp(&b.drug_name))
    }

    fn to_fields(&self, style: CostStyle) -> [String; 3] {
        [
            self.drug_name.clone(),
            self.num_prescriber.to_string(),
            style.render(self.total_cost),
        ]
    }
}

pub fn build_report(map: AggregateMap) -> Vec<ReportRow> {
    map.into_iter()
        .map(|(drug_name, aggregate)| ReportRow {
            num_prescriber: aggregate.prescriber_count(),
            total_cost: aggregate.total_cost(),
            drug_name,
        })
        .sorted_by(ReportRow::report_order)
        .collect_vec()
}

pub fn write_report<W: io::Write>(writer: W, rows: &[ReportRow], style: CostStyle) -> csv::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    writer.write_record(REPORT_HEADER)?;
    for row in rows {
        writer.write_record(row.to_fields(style))?;
    }
    writer.flush()?;
    Ok(())
}

/// Renders the whole report in memory, then writes `path` in one go.
pub fn save_report(path: &Path, rows: &[ReportRow], style: CostStyle) -> Result<()> {
    let mut buf = Vec::new();
    write_report(&mut buf, rows, style).map_err(|source| Error::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, buf).map_err(|err| Error::io(path, err))
}
