//! Directory listing and sorting.

use crate::path::TfmPath;
use std::cmp::Ordering;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    Name,
    Size,
    Date,
    Ext,
}

/// `path.iterdir()` → hidden/filter → sort, per the listing contract.
/// Errors from `iterdir()` propagate; a missing directory yields an
/// empty listing higher up (the pane model treats `NotFound` that way).
pub fn list_directory(
    path: &TfmPath,
    show_hidden: bool,
    filter_pattern: Option<&str>,
    sort_mode: SortMode,
    sort_reverse: bool,
) -> crate::path::error::PathResult<Vec<TfmPath>> {
    let mut entries = path.iterdir()?;

    if !show_hidden {
        entries.retain(|p| !p.name().starts_with('.'));
    }

    if let Some(pattern) = filter_pattern.filter(|p| !p.is_empty()) {
        if let Ok(glob) = globset::Glob::new(pattern) {
            let matcher = glob.compile_matcher();
            entries.retain(|p| matcher.is_match(p.name()));
        }
    }

    sort_entries(&mut entries, sort_mode, sort_reverse);
    Ok(entries)
}

pub fn sort_entries(entries: &mut [TfmPath], sort_mode: SortMode, sort_reverse: bool) {
    entries.sort_by(|a, b| compare_entries(a, b, sort_mode, sort_reverse));
}

fn compare_entries(a: &TfmPath, b: &TfmPath, sort_mode: SortMode, sort_reverse: bool) -> Ordering {
    let a_is_dir = a.is_dir();
    let b_is_dir = b.is_dir();
    if a_is_dir != b_is_dir {
        // "directories first" is never affected by the reverse flag.
        return if a_is_dir { Ordering::Less } else { Ordering::Greater };
    }

    let ordering = match sort_mode {
        SortMode::Name => natural_cmp(&a.name(), &b.name()),
        SortMode::Size => {
            let size_a = if a_is_dir { 0 } else { a.stat().map(|s| s.size).unwrap_or(0) };
            let size_b = if b_is_dir { 0 } else { b.stat().map(|s| s.size).unwrap_or(0) };
            size_a.cmp(&size_b).then_with(|| natural_cmp(&a.name(), &b.name()))
        }
        SortMode::Date => {
            let mtime_a = a.stat().map(|s| s.mtime).unwrap_or(0);
            let mtime_b = b.stat().map(|s| s.mtime).unwrap_or(0);
            mtime_a.cmp(&mtime_b).then_with(|| natural_cmp(&a.name(), &b.name()))
        }
        SortMode::Ext => {
            let suffix_a = a.suffix();
            let suffix_b = b.suffix();
            suffix_a.cmp(&suffix_b).then_with(|| natural_cmp(&a.name(), &b.name()))
        }
    };

    if sort_reverse {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Case-insensitive comparison with numeric runs compared as integers
/// (`file2` < `file10`), after normalizing both sides to NFC so
/// decomposed (NFD, as produced by macOS HFS+) filenames sort the same
/// as their composed equivalents.
///
/// When the case-folded keys tie (e.g. `"File10.txt"` vs. `"file10.txt"`)
/// the original NFC strings break the tie, so ordering is a function of
/// the names alone rather than of whatever order they happened to
/// arrive in — `sort_by`'s stability would otherwise leave case-variant
/// ties in input order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a_nfc: String = a.nfc().collect();
    let b_nfc: String = b.nfc().collect();
    match natural_cmp_folded(&a_nfc, &b_nfc) {
        Ordering::Equal => a_nfc.cmp(&b_nfc),
        other => other,
    }
}

fn natural_cmp_folded(a_nfc: &str, b_nfc: &str) -> Ordering {
    let a = a_nfc.to_lowercase();
    let b = b_nfc.to_lowercase();
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek(), b_chars.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let num_a = take_number(&mut a_chars);
                    let num_b = take_number(&mut b_chars);
                    match num_a.cmp(&num_b) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                match ca.cmp(cb) {
                    Ordering::Equal => {
                        a_chars.next();
                        b_chars.next();
                    }
                    other => return other,
                }
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars>) -> u64 {
    let mut value: u64 = 0;
    while let Some(c) = chars.peek() {
        if let Some(digit) = c.to_digit(10) {
            value = value.saturating_mul(10).saturating_add(digit as u64);
            chars.next();
        } else {
            break;
        }
    }
    value
}
