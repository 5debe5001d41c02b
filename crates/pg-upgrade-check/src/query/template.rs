//! Printf-style SQL templates from the configuration file.
//!
//! Templates use `%s` for the table name and `%d` for the numeric window
//! bounds, with `%%` for a literal percent sign. Table names are substituted
//! into the SQL text after validation; each `%d` becomes a positional
//! statement parameter (`$1`, `$2`, ...) so bounds are always bound, never
//! formatted. Templates may also reference `$1`/`$2` directly.

use crate::error::{CheckError, Result};

use super::identifier::validate_table_name;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Table,
    Bound,
}

/// A parsed query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    segments: Vec<Segment>,
}

impl QueryTemplate {
    /// Parse a template string.
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                text.push(c);
                continue;
            }

            let verb = match chars.next() {
                Some('%') => {
                    text.push('%');
                    continue;
                }
                Some('s') => Segment::Table,
                Some('d') => Segment::Bound,
                Some(other) => {
                    return Err(CheckError::Config(format!(
                        "Unsupported placeholder %{} in query template (use %s, %d or %%): {:?}",
                        other, template
                    )))
                }
                None => {
                    return Err(CheckError::Config(format!(
                        "Query template ends with a lone '%': {:?}",
                        template
                    )))
                }
            };

            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            segments.push(verb);
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self { segments })
    }

    /// Number of `%s` table name slots.
    pub fn table_slots(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Table))
            .count()
    }

    /// Number of `%d` bound slots.
    pub fn bound_slots(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Bound))
            .count()
    }

    /// Whether the literal SQL text references the given `$n` parameter.
    pub fn references_param(&self, n: usize) -> bool {
        let needle = format!("${}", n);
        self.segments.iter().any(|s| match s {
            Segment::Text(t) => contains_param(t, &needle),
            _ => false,
        })
    }

    /// Render the template for a table.
    ///
    /// Every `%s` receives the (validated) table name and the n-th `%d`
    /// becomes `$n`.
    pub fn render(&self, table: &str) -> Result<String> {
        validate_table_name(table)?;

        let mut sql = String::new();
        let mut param = 0;
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => sql.push_str(t),
                Segment::Table => sql.push_str(table),
                Segment::Bound => {
                    param += 1;
                    sql.push_str(&format!("${}", param));
                }
            }
        }

        Ok(sql)
    }
}

/// Match `$1` but not `$10`.
fn contains_param(text: &str, needle: &str) -> bool {
    text.match_indices(needle).any(|(idx, _)| {
        !text[idx + needle.len()..]
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
    })
}

/// Parse and check a collect template: one table slot, no bounds.
pub fn parse_collect(template: &str) -> Result<QueryTemplate> {
    let parsed = QueryTemplate::parse(template)?;
    if parsed.table_slots() != 1 {
        return Err(CheckError::Config(format!(
            "collect query must contain exactly one %s (found {}): {:?}",
            parsed.table_slots(),
            template
        )));
    }
    if parsed.bound_slots() != 0 {
        return Err(CheckError::Config(format!(
            "collect query must not contain %d bounds: {:?}",
            template
        )));
    }
    Ok(parsed)
}

/// Parse and check a compare template: two table slots and two bounds,
/// given either as `%d` or as `$1`/`$2`.
pub fn parse_compare(template: &str) -> Result<QueryTemplate> {
    let parsed = QueryTemplate::parse(template)?;
    if parsed.table_slots() != 2 {
        return Err(CheckError::Config(format!(
            "compare query must contain exactly two %s (found {}): {:?}",
            parsed.table_slots(),
            template
        )));
    }

    let bounds_ok = match parsed.bound_slots() {
        2 => true,
        0 => parsed.references_param(1) && parsed.references_param(2),
        _ => false,
    };
    if !bounds_ok {
        return Err(CheckError::Config(format!(
            "compare query must take the window bounds as two %d (or $1 and $2): {:?}",
            template
        )));
    }

    Ok(parsed)
}
