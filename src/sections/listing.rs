//! Plain-text section listings.
//!
//! Each non-empty line is `<addr_hex> <size_hex> <name>`, optionally followed by a file
//! offset as a fourth column. `0x` prefixes are accepted; lines starting with `#` are
//! comments. Without an explicit offset the record's file offset is 0.

use crate::{sections::SectionMeta, Error, Result};

fn parse_hex(field: &str, what: &str, line: usize) -> Result<u32> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u32::from_str_radix(digits, 16)
        .map_err(|_| Error::Section(format!("line {line}: invalid {what} '{field}'")))
}

/// Parses a listing into records without globals or handles.
///
/// # Errors
///
/// Returns [`Error::Section`] naming the offending line if a field is missing or not a
/// 32-bit hexadecimal number.
pub fn parse_section_listing(text: &str) -> Result<Vec<SectionMeta>> {
    let mut sections = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let [addr, size, name, rest @ ..] = fields.as_slice() else {
            return Err(Error::Section(format!(
                "line {line}: expected '<addr> <size> <name>', got '{trimmed}'"
            )));
        };

        let file_offset = match rest {
            [] => 0,
            [offset] => parse_hex(offset, "file offset", line)?,
            _ => {
                return Err(Error::Section(format!(
                    "line {line}: trailing fields after '{name}'"
                )))
            }
        };

        sections.push(SectionMeta::new(
            *name,
            parse_hex(addr, "address", line)?,
            parse_hex(size, "size", line)?,
            file_offset,
        ));
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing() {
        let text = "# addr size name\n\
                    08048000 1a4 .text\n\
                    \n\
                    0x0804a000 0x10 .data 0x1000\n";
        let sections = parse_section_listing(text).unwrap();
        assert_eq!(
            sections,
            vec![
                SectionMeta::new(".text", 0x0804_8000, 0x1a4, 0),
                SectionMeta::new(".data", 0x0804_a000, 0x10, 0x1000),
            ]
        );
    }

    #[test]
    fn test_parse_listing_errors() {
        assert!(parse_section_listing("08048000 .text").is_err());
        assert!(parse_section_listing("zz 10 .text").is_err());
        assert!(parse_section_listing("100000000 10 .text").is_err());
        assert!(parse_section_listing("1 2 .a 3 4").is_err());
    }
}
