//! Reader for the fixed-layout `image-gverify.res` result file.
//!
//! Line offsets below are zero-based:
//!
//! | lines  | content                                   |
//! |--------|-------------------------------------------|
//! | 3-4    | absolute residuals, `label=value`         |
//! | 6-10   | colour residuals, `colour residual`       |
//! | 22..   | per-point table, 10 whitespace columns    |

use crate::types::{
    AbsoluteResidualSummary, ColorResidualSummary, CorrelationPoint, GqaError, GqaResult,
    GverifyResults,
};
use std::path::Path;
use std::str::FromStr;

pub const ABSOLUTE_OFFSET: usize = 3;
pub const ABSOLUTE_ROWS: usize = 2;
pub const COLOR_OFFSET: usize = 6;
pub const COLOR_ROWS: usize = 5;
pub const POINT_OFFSET: usize = 22;
pub const POINT_COLUMNS: usize = 10;

/// Parse a result file from disk.
///
/// A missing file or an empty point table yields [`GqaError::NoGcps`].
pub fn parse_gverify<P: AsRef<Path>>(path: P) -> GqaResult<GverifyResults> {
    let path = path.as_ref();
    log::info!("Parsing gverify results: {}", path.display());

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(GqaError::NoGcps(path.display().to_string()));
        }
        Err(e) => return Err(GqaError::Io(e)),
    };

    parse_gverify_str(&contents, &path.display().to_string())
}

/// Parse result file contents; `source` names the file in error messages
pub fn parse_gverify_str(contents: &str, source: &str) -> GqaResult<GverifyResults> {
    let lines: Vec<&str> = contents.lines().collect();

    let points = parse_points(&lines)?;
    if points.is_empty() {
        return Err(GqaError::NoGcps(source.to_string()));
    }

    let absolute = parse_absolute(&lines)?;
    let colors = parse_colors(&lines)?;

    log::debug!(
        "Parsed {} points, {} colour rows, {} absolute rows",
        points.len(),
        colors.len(),
        absolute.len()
    );

    Ok(GverifyResults {
        colors,
        absolute,
        points,
    })
}

fn section<'a>(lines: &[&'a str], offset: usize, rows: usize, name: &str) -> GqaResult<Vec<(usize, &'a str)>> {
    let end = offset + rows;
    if lines.len() < end {
        return Err(GqaError::Parse(format!(
            "{} section needs lines {}-{}, file has {} lines",
            name,
            offset,
            end - 1,
            lines.len()
        )));
    }
    Ok((offset..end).map(|i| (i, lines[i])).collect())
}

fn parse_absolute(lines: &[&str]) -> GqaResult<AbsoluteResidualSummary> {
    section(lines, ABSOLUTE_OFFSET, ABSOLUTE_ROWS, "absolute residual")?
        .into_iter()
        .map(|(n, line)| {
            let (label, value) = line.split_once('=').ok_or_else(|| {
                GqaError::Parse(format!("line {}: expected label=value, got '{}'", n, line))
            })?;
            Ok((label.trim().to_string(), parse_field(value.trim(), n, "residual")?))
        })
        .collect()
}

fn parse_colors(lines: &[&str]) -> GqaResult<ColorResidualSummary> {
    section(lines, COLOR_OFFSET, COLOR_ROWS, "colour residual")?
        .into_iter()
        .map(|(n, line)| {
            // Labels may contain spaces; the residual is the last field
            match line.trim().rsplit_once(char::is_whitespace) {
                Some((color, value)) if !color.trim().is_empty() => {
                    Ok((color.trim().to_string(), parse_field(value, n, "residual")?))
                }
                _ => Err(GqaError::Parse(format!(
                    "line {}: expected colour and residual, got '{}'",
                    n, line
                ))),
            }
        })
        .collect()
}

fn parse_points(lines: &[&str]) -> GqaResult<Vec<CorrelationPoint>> {
    lines
        .iter()
        .enumerate()
        .skip(POINT_OFFSET)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| parse_point(line, n))
        .collect()
}

fn parse_point(line: &str, n: usize) -> GqaResult<CorrelationPoint> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != POINT_COLUMNS {
        return Err(GqaError::Parse(format!(
            "line {}: expected {} columns, found {}",
            n,
            POINT_COLUMNS,
            fields.len()
        )));
    }

    Ok(CorrelationPoint {
        point_id: parse_field(fields[0], n, "Point_ID")?,
        chip: parse_field(fields[1], n, "Chip")?,
        line: parse_field(fields[2], n, "Line")?,
        sample: parse_field(fields[3], n, "Sample")?,
        map_x: parse_field(fields[4], n, "Map_X")?,
        map_y: parse_field(fields[5], n, "Map_Y")?,
        correlation: parse_field(fields[6], n, "Correlation")?,
        y_residual: parse_field(fields[7], n, "Y_Residual")?,
        x_residual: parse_field(fields[8], n, "X_Residual")?,
        outlier: parse_field(fields[9], n, "Outlier")?,
    })
}

fn parse_field<T: FromStr>(value: &str, n: usize, column: &str) -> GqaResult<T> {
    value.parse::<T>().map_err(|_| {
        GqaError::Parse(format!("line {}: invalid {} value '{}'", n, column, value))
    })
}
