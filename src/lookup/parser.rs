//! CSV and cell parsers for lookup table sources

use nom::branch::alt;
use nom::bytes::complete::take_while;
use nom::character::complete::{char, space0, u32 as parse_u32};
use nom::combinator::{all_consuming, map};
use nom::multi::separated_list1;
use nom::number::complete::double;
use nom::sequence::{delimited, separated_pair, terminated};
use nom::{IResult, Parser};

use super::table::{AgeRange, TableError};

/// A parsed but not yet interpreted CSV grid
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    pub header: Vec<String>,
    /// (source line number, cells)
    pub rows: Vec<(usize, Vec<String>)>,
}

impl CsvTable {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while(|c| c != '"'), char('"')).parse(input)
}

fn bare(input: &str) -> IResult<&str, &str> {
    take_while(|c| c != ',').parse(input)
}

fn cell(input: &str) -> IResult<&str, &str> {
    delimited(space0, alt((quoted, bare)), space0).parse(input)
}

fn record(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(char(','), cell).parse(input)
}

/// Split CSV text into a header and rows. Blank lines and lines starting
/// with `#` are skipped; every row must have as many cells as the header.
pub fn parse_csv(text: &str) -> Result<CsvTable, TableError> {
    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (_, cells) = all_consuming(record)
            .parse(trimmed)
            .map_err(|e| TableError::Parse {
                line: line_no,
                message: e.to_string(),
            })?;
        let cells: Vec<String> = cells.into_iter().map(|c| c.trim().to_string()).collect();

        match &header {
            None => header = Some(cells),
            Some(h) if h.len() != cells.len() => {
                return Err(TableError::RaggedRow {
                    line: line_no,
                    expected: h.len(),
                    found: cells.len(),
                });
            }
            Some(_) => rows.push((line_no, cells)),
        }
    }

    let header = header.ok_or(TableError::Empty)?;
    Ok(CsvTable { header, rows })
}

fn age_range(input: &str) -> IResult<&str, AgeRange> {
    alt((
        map(
            separated_pair(parse_u32, char('-'), parse_u32),
            |(low, high)| AgeRange { low, high },
        ),
        map(terminated(parse_u32, char('+')), |low| AgeRange {
            low,
            high: u32::MAX,
        }),
        map(parse_u32, |age| AgeRange {
            low: age,
            high: age,
        }),
    ))
    .parse(input)
}

/// Parse an age cell: `0-50`, `65+` or a single age `30`
pub fn parse_age_range(cell: &str) -> Option<AgeRange> {
    let (_, range) = all_consuming(age_range).parse(cell.trim()).ok()?;
    (range.low <= range.high).then_some(range)
}

/// Parse a probability cell
pub fn parse_probability(cell: &str) -> Option<f64> {
    let (_, value) = all_consuming(double::<&str, nom::error::Error<&str>>)
        .parse(cell.trim())
        .ok()?;
    value.is_finite().then_some(value)
}
