//! Lexical scanning of caller-supplied SQL.
//!
//! The scanner does not parse SQL. It only walks the text far enough to tell
//! code apart from string literals, quoted identifiers, dollar-quoted bodies
//! and comments, and records the markers that matter to the statement
//! builder: `$n` placeholders, `%s` placeholders, `%%` escapes and top-level
//! `;` separators.
//!
//! `%s` inside a string literal is text, never a placeholder: counting it
//! would splice a bound value into the middle of a literal. `%%` is still
//! collapsed inside literals when the statement uses `%s` markers, so a
//! `LIKE 'a%%'` written for psycopg reaches the server as `LIKE 'a%'`.

use crate::error::{DbError, DbResult};

/// A marker found in the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// `$n`
    Positional(usize),
    /// `%s`
    Format,
    /// `%%`
    EscapedPercent,
    /// `;` outside any literal or comment
    Separator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Located {
    start: usize,
    end: usize,
    marker: Marker,
}

/// Which placeholder convention a fragment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    None,
    /// Native PostgreSQL `$1, $2, ...`
    Positional,
    /// psycopg-style `%s`
    Format,
}

#[derive(Debug, Clone)]
pub struct ScannedSql<'a> {
    text: &'a str,
    markers: Vec<Located>,
    /// Some code follows a top-level `;`
    trailing_code_after_separator: bool,
    /// An opened literal or comment was never closed
    unterminated: bool,
}

impl ScannedSql<'_> {
    /// Highest `$n` index seen, 0 if none.
    pub fn max_positional(&self) -> usize {
        self.markers
            .iter()
            .filter_map(|m| match m.marker {
                Marker::Positional(n) => Some(n),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// `(start, end, n)` byte spans of every `$n` marker, in text order.
    pub fn positional_spans(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.markers.iter().filter_map(|m| match m.marker {
            Marker::Positional(n) => Some((m.start, m.end, n)),
            _ => None,
        })
    }

    /// Number of `%s` markers.
    pub fn format_count(&self) -> usize {
        self.markers
            .iter()
            .filter(|m| m.marker == Marker::Format)
            .count()
    }

    pub fn separator_count(&self) -> usize {
        self.markers
            .iter()
            .filter(|m| m.marker == Marker::Separator)
            .count()
    }

    /// True when the text holds more than one statement.
    pub fn has_multiple_statements(&self) -> bool {
        self.trailing_code_after_separator
    }

    /// True when the placeholder count can be trusted.
    pub fn is_complete(&self) -> bool {
        !self.unterminated
    }

    pub fn style(&self) -> DbResult<PlaceholderStyle> {
        match (self.max_positional() > 0, self.format_count() > 0) {
            (true, true) => Err(DbError::validation(
                "Cannot mix $n and %s placeholders in one statement",
            )),
            (true, false) => Ok(PlaceholderStyle::Positional),
            (false, true) => Ok(PlaceholderStyle::Format),
            (false, false) => Ok(PlaceholderStyle::None),
        }
    }

    /// Number of parameters the text expects.
    pub fn placeholder_count(&self) -> DbResult<usize> {
        Ok(match self.style()? {
            PlaceholderStyle::None => 0,
            PlaceholderStyle::Positional => self.max_positional(),
            PlaceholderStyle::Format => self.format_count(),
        })
    }

    /// Rewrite the text to native placeholders numbered after `offset`.
    ///
    /// `$n` becomes `$(n + offset)`, the i-th `%s` becomes `$(offset + i)` and,
    /// when `%s` markers are in use, `%%` collapses to `%`. Top-level
    /// separators are dropped when `strip_separators` is set.
    pub fn renumber(&self, offset: usize, strip_separators: bool) -> DbResult<(String, usize)> {
        let style = self.style()?;
        let mut out = String::with_capacity(self.text.len() + 8);
        let mut cursor = 0;
        let mut format_index = 0;

        for located in &self.markers {
            let replacement = match located.marker {
                Marker::Positional(n) => Some(format!("${}", n + offset)),
                Marker::Format => {
                    format_index += 1;
                    Some(format!("${}", offset + format_index))
                }
                Marker::EscapedPercent if style == PlaceholderStyle::Format => {
                    Some("%".to_string())
                }
                Marker::EscapedPercent => None,
                Marker::Separator if strip_separators => Some(String::new()),
                Marker::Separator => None,
            };
            if let Some(replacement) = replacement {
                out.push_str(&self.text[cursor..located.start]);
                out.push_str(&replacement);
                cursor = located.end;
            }
        }
        out.push_str(&self.text[cursor..]);

        let count = match style {
            PlaceholderStyle::None => 0,
            PlaceholderStyle::Positional => self.max_positional(),
            PlaceholderStyle::Format => self.format_count(),
        };
        Ok((out, count))
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Scan `text` for placeholders and separators.
pub fn scan(text: &str) -> ScannedSql<'_> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut markers = Vec::new();
    let mut i = 0;
    let mut seen_separator = false;
    let mut trailing_code_after_separator = false;
    let mut unterminated = false;

    // Called for anything that is code, not whitespace or comment.
    let mut note_code = |seen_separator: bool| {
        if seen_separator {
            trailing_code_after_separator = true;
        }
    };

    while i < len {
        let b = bytes[i];
        match b {
            b'\'' => {
                note_code(seen_separator);
                // E'...' strings honour backslash escapes
                let escapes = i > 0
                    && matches!(bytes[i - 1], b'e' | b'E')
                    && (i < 2 || !is_ident_byte(bytes[i - 2]));
                match skip_quoted(bytes, i, b'\'', escapes, &mut markers) {
                    Some(end) => i = end,
                    None => {
                        unterminated = true;
                        i = len;
                    }
                }
            }
            b'"' => {
                note_code(seen_separator);
                match skip_quoted(bytes, i, b'"', false, &mut markers) {
                    Some(end) => i = end,
                    None => {
                        unterminated = true;
                        i = len;
                    }
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..]
                    .iter()
                    .position(|&c| c == b'\n')
                    .map(|p| i + p + 1)
                    .unwrap_or(len);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => match skip_block_comment(bytes, i) {
                Some(end) => i = end,
                None => {
                    unterminated = true;
                    i = len;
                }
            },
            b'$' if i == 0 || !is_ident_byte(bytes[i - 1]) => {
                note_code(seen_separator);
                let digits = bytes[i + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_digit())
                    .count();
                if digits > 0 {
                    let end = i + 1 + digits;
                    // Out-of-range indices are left for the server to reject
                    if let Ok(n) = text[i + 1..end].parse::<usize>() {
                        markers.push(Located {
                            start: i,
                            end,
                            marker: Marker::Positional(n),
                        });
                    }
                    i = end;
                } else if let Some(tag_end) = dollar_tag_end(bytes, i) {
                    let tag = &bytes[i..=tag_end];
                    match find_subslice(&bytes[tag_end + 1..], tag) {
                        Some(p) => {
                            let body_start = tag_end + 1;
                            collect_escaped_percents(bytes, body_start, body_start + p, &mut markers);
                            i = body_start + p + tag.len();
                        }
                        None => {
                            unterminated = true;
                            i = len;
                        }
                    }
                } else {
                    i += 1;
                }
            }
            b'%' => {
                note_code(seen_separator);
                match bytes.get(i + 1) {
                    Some(b's') => {
                        markers.push(Located {
                            start: i,
                            end: i + 2,
                            marker: Marker::Format,
                        });
                        i += 2;
                    }
                    Some(b'%') => {
                        markers.push(Located {
                            start: i,
                            end: i + 2,
                            marker: Marker::EscapedPercent,
                        });
                        i += 2;
                    }
                    _ => i += 1,
                }
            }
            b';' => {
                note_code(seen_separator);
                markers.push(Located {
                    start: i,
                    end: i + 1,
                    marker: Marker::Separator,
                });
                seen_separator = true;
                i += 1;
            }
            c if c.is_ascii_whitespace() => i += 1,
            _ => {
                note_code(seen_separator);
                i += 1;
            }
        }
    }

    ScannedSql {
        text,
        markers,
        trailing_code_after_separator,
        unterminated,
    }
}

/// Skip a quoted run starting at `start`; returns the index after the closing quote.
fn skip_quoted(
    bytes: &[u8],
    start: usize,
    quote: u8,
    backslash_escapes: bool,
    markers: &mut Vec<Located>,
) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            if quote == b'\'' {
                collect_escaped_percents(bytes, start + 1, i, markers);
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// PostgreSQL block comments nest.
fn skip_block_comment(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => i += 1,
        }
    }
    None
}

/// If a dollar-quote tag (`$$` or `$tag$`) starts at `start`, return the index of its closing `$`.
fn dollar_tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if bytes.get(i) == Some(&b'$') {
        return Some(i);
    }
    match bytes.get(i) {
        Some(c) if c.is_ascii_alphabetic() || *c == b'_' || *c >= 0x80 => {}
        _ => return None,
    }
    while let Some(&c) = bytes.get(i) {
        if c == b'$' {
            return Some(i);
        }
        if !(c.is_ascii_alphanumeric() || c == b'_' || c >= 0x80) {
            return None;
        }
        i += 1;
    }
    None
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `%%` inside literals still collapses when `%s` markers are in use.
fn collect_escaped_percents(bytes: &[u8], start: usize, end: usize, markers: &mut Vec<Located>) {
    let mut i = start;
    while i + 1 < end {
        if bytes[i] == b'%' && bytes[i + 1] == b'%' {
            markers.push(Located {
                start: i,
                end: i + 2,
                marker: Marker::EscapedPercent,
            });
            i += 2;
        } else {
            i += 1;
        }
    }
}
