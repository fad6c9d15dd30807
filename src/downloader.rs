use std::error::Error;

use crate::record::{FieldValue, Record};

/// Convert rows to CSV
///
/// The first line holds the column names; every following line holds one row,
/// in view order, restricted to `columns`. Missing cells are left empty and
/// values containing commas, quotes or newlines are quoted.
///
/// # Arguments
/// * `columns` - Columns to export, in display order
/// * `rows` - Rows to export, already merged with their edits
///
/// # Returns
/// * `Result<String, Box<dyn Error>>` - CSV content as a string or an error
pub fn to_csv(columns: &[String], rows: &[Record]) -> Result<String, Box<dyn Error>> {
    let mut csv_content = String::new();

    push_line(&mut csv_content, columns.iter().map(|c| c.to_string()));
    for row in rows {
        push_line(
            &mut csv_content,
            columns
                .iter()
                .map(|c| row.get(c).map(FieldValue::display).unwrap_or_default()),
        );
    }

    Ok(csv_content)
}

fn push_line(out: &mut String, values: impl Iterator<Item = String>) {
    for (i, value) in values.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if value.contains(',') || value.contains('"') || value.contains('\n') {
            let escaped = value.replace('"', "\"\"");
            out.push_str(&format!("\"{}\"", escaped));
        } else {
            out.push_str(&value);
        }
    }
    out.push('\n');
}

/// Convert rows to XLSX
///
/// Same layout as [`to_csv`]. Numbers are written as numeric cells so the
/// spreadsheet can still sort and sum them.
///
/// # Returns
/// * `Result<Vec<u8>, Box<dyn Error>>` - XLSX file content as bytes or an error
#[cfg(feature = "web")]
pub fn to_xlsx(columns: &[String], rows: &[Record]) -> Result<Vec<u8>, Box<dyn Error>> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();

    for (c, column) in columns.iter().enumerate() {
        worksheet.write_string(0, c as u16, column)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let xr = (r + 1) as u32;
        for (c, column) in columns.iter().enumerate() {
            match row.get(column) {
                Some(value @ FieldValue::Number(_)) => {
                    if let Some(n) = value.as_f64() {
                        worksheet.write_number(xr, c as u16, n)?;
                    }
                }
                Some(value) => {
                    worksheet.write_string(xr, c as u16, &value.display())?;
                }
                None => {}
            }
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}
