//! Alternate URLs tried when the manifest URL answers with an error status.
//!
//! Kept separate from the attempt loop: an attempt walks the whole candidate
//! list in order, and the attempt counter only advances once the list is
//! exhausted.

const LARGE_SEGMENT: &str = "/files/large/";
const FLAT_SEGMENT: &str = "/files/";

/// Rewrites of `url` worth trying after a non-success status, in order.
///
/// Never includes `url` itself and never repeats an entry.
pub fn alternate_urls(url: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    if url.contains(LARGE_SEGMENT) {
        candidates.push(url.replacen(LARGE_SEGMENT, FLAT_SEGMENT, 1));
    }

    if let Some(stem) = url.strip_suffix(".webp") {
        candidates.push(format!("{stem}.jpg"));
        candidates.push(format!("{stem}.png"));
        if url.contains(LARGE_SEGMENT) {
            let flat = stem.replacen(LARGE_SEGMENT, FLAT_SEGMENT, 1);
            candidates.push(format!("{flat}.jpg"));
        }
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| c != url && seen.insert(c.clone()));
    candidates
}
