//! Canonical bracketed external workbook keys.
//!
//! An external reference such as `=[Budget.xlsx]Sheet1!A1` names its
//! workbook inside brackets. These helpers split the key forms the
//! environment resolves:
//!
//! - `"[Book]Sheet"`: workbook + sheet
//! - `"[Book]"`: workbook only (workbook-scoped names and tables)
//! - `"[Book]Sheet!A1"`: workbook + sheet + cell text
//!
//! A key wrapped in single quotes (`'[My Book.xlsx]Sheet 1'`) is accepted
//! and the quotes are dropped. No case folding is applied to either part.

fn unquote(key: &str) -> &str {
    key.strip_prefix('\'')
        .and_then(|k| k.strip_suffix('\''))
        .unwrap_or(key)
}

fn split_bracketed(key: &str) -> Option<(&str, &str)> {
    let rest = unquote(key).strip_prefix('[')?;
    let close = rest.find(']')?;
    let book = &rest[..close];
    if book.is_empty() {
        return None;
    }
    Some((book, &rest[close + 1..]))
}

/// Parse `"[Book]Sheet"` into `(book, sheet)`.
///
/// 3D spans (`"[Book]Sheet1:Sheet3"`) and keys with a cell part are rejected.
pub fn parse_external_sheet_key(key: &str) -> Option<(&str, &str)> {
    let (book, sheet) = split_bracketed(key)?;
    if sheet.is_empty() || sheet.contains([':', '!', '[', ']']) {
        return None;
    }
    Some((book, sheet))
}

/// Parse a workbook-only key `"[Book]"`.
pub fn parse_external_workbook_key(key: &str) -> Option<&str> {
    let (book, rest) = split_bracketed(key)?;
    rest.is_empty().then_some(book)
}

/// Split `"[Book]Sheet!A1"` into `(book, sheet, cell)`. The cell part is
/// returned verbatim; parsing it is the evaluator's business.
pub fn split_external_reference(reference: &str) -> Option<(&str, &str, &str)> {
    let reference = reference.strip_prefix('=').unwrap_or(reference);
    let bang = reference.rfind('!')?;
    let (key, cell) = (&reference[..bang], &reference[bang + 1..]);
    if cell.is_empty() {
        return None;
    }
    let (book, sheet) = parse_external_sheet_key(key)?;
    Some((book, sheet, cell))
}
