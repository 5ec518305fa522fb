//! Hunk placement and application.

use super::error::PatchError;
use super::{AppliedPatch, DiffLine, Hunk, HunkReport, Patch};

/// Apply every hunk in order, carrying the cumulative line-count delta into
/// later hunks' expected positions.
pub(crate) fn apply(
    patch: &Patch,
    content: &str,
    max_fuzz: u32,
    new_no_newline: bool,
) -> Result<AppliedPatch, PatchError> {
    let had_trailing_newline = content.ends_with('\n');
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let mut reports = Vec::with_capacity(patch.hunks().len());
    let mut delta: i64 = 0;

    for (ordinal, hunk) in patch.hunks().iter().enumerate() {
        let hunk_number = ordinal + 1;
        let placement = place_hunk(hunk, &lines, delta, max_fuzz, hunk_number)?;

        let (old_image, new_image) = trimmed_segments(hunk, placement.fuzz_head, placement.fuzz_tail);
        let replacement: Vec<String> = new_image.iter().map(|s| s.to_string()).collect();
        lines.splice(
            placement.index..placement.index + old_image.len(),
            replacement,
        );

        delta += new_image.len() as i64 - old_image.len() as i64;
        reports.push(HunkReport {
            hunk: hunk_number,
            applied_at: placement.index + 1,
            offset: placement.offset,
            fuzz: placement.fuzz_head.max(placement.fuzz_tail) as u32,
        });
    }

    let mut rebuilt = lines.join("\n");
    if !rebuilt.is_empty() && had_trailing_newline && !new_no_newline {
        rebuilt.push('\n');
    }
    Ok(AppliedPatch {
        content: rebuilt,
        reports,
    })
}

struct Placement {
    index: usize,
    offset: i64,
    fuzz_head: usize,
    fuzz_tail: usize,
}

/// Find where a hunk applies: first at the expected position, then scanning
/// outward, then again with progressively more ignored edge context.
fn place_hunk(
    hunk: &Hunk,
    lines: &[String],
    delta: i64,
    max_fuzz: u32,
    hunk_number: usize,
) -> Result<Placement, PatchError> {
    // `-l,0` means "insert after line l"; no matching is needed when the
    // hunk carries no old image at all.
    let (old_image, _) = hunk.segments();
    let expected = expected_index(hunk, delta, old_image.is_empty());
    if old_image.is_empty() {
        if expected > lines.len() {
            return Err(PatchError::OutOfBounds {
                hunk: hunk_number,
                line: expected + 1,
                total: lines.len(),
            });
        }
        return Ok(Placement {
            index: expected,
            offset: 0,
            fuzz_head: 0,
            fuzz_tail: 0,
        });
    }

    for fuzz in 0..=max_fuzz as usize {
        // Ignore up to `fuzz` context lines from the head, then the tail.
        for (head, tail) in fuzz_splits(fuzz) {
            let (old_image, _) = trimmed_segments(hunk, head, tail);
            if old_image.is_empty() {
                continue;
            }
            if let Some(index) = locate(&old_image, lines, expected + head) {
                return Ok(Placement {
                    index,
                    offset: index as i64 - (expected + head) as i64,
                    fuzz_head: head,
                    fuzz_tail: tail,
                });
            }
        }
    }

    let (old_image, _) = hunk.segments();
    let snippet = old_image
        .iter()
        .take(4)
        .map(|l| format!("  {l}"))
        .collect::<Vec<_>>()
        .join("\n");
    Err(PatchError::HunkMismatch {
        hunk: hunk_number,
        expected: expected + 1,
        snippet,
    })
}

fn expected_index(hunk: &Hunk, delta: i64, insertion: bool) -> usize {
    // Old ranges are 1-based; an insertion's start names the line *after*
    // which the new lines land, so it needs no −1 adjustment.
    let base = if insertion {
        hunk.old_start as i64
    } else {
        hunk.old_start as i64 - 1
    };
    (base + delta).max(0) as usize
}

/// The (head, tail) ignore combinations for a fuzz level, cheapest first.
fn fuzz_splits(fuzz: usize) -> Vec<(usize, usize)> {
    if fuzz == 0 {
        return vec![(0, 0)];
    }
    (0..=fuzz).map(|head| (head, fuzz - head)).collect()
}

/// Drop up to `head`/`tail` *context* lines from the hunk edges. Additions
/// and removals at the edges are never dropped.
fn trimmed_segments<'h>(hunk: &'h Hunk, head: usize, tail: usize) -> (Vec<&'h str>, Vec<&'h str>) {
    let mut body = hunk.lines.as_slice();
    let mut skipped = 0usize;
    while skipped < head
        && let Some((DiffLine::Context(_), rest)) = body.split_first()
    {
        body = rest;
        skipped += 1;
    }
    skipped = 0;
    while skipped < tail
        && let Some((DiffLine::Context(_), rest)) = body.split_last()
    {
        body = rest;
        skipped += 1;
    }

    let mut old_lines = Vec::new();
    let mut new_lines = Vec::new();
    for line in body {
        match line {
            DiffLine::Context(text) => {
                old_lines.push(text.as_str());
                new_lines.push(text.as_str());
            }
            DiffLine::Add(text) => new_lines.push(text.as_str()),
            DiffLine::Remove(text) => old_lines.push(text.as_str()),
        }
    }
    (old_lines, new_lines)
}

/// Exact-match search for `needle` in `haystack`, radiating outward from
/// `origin` so the closest occurrence wins.
fn locate(needle: &[&str], haystack: &[String], origin: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    let last = haystack.len() - needle.len();
    let origin = origin.min(last);

    let matches_at = |at: usize| {
        needle
            .iter()
            .zip(&haystack[at..at + needle.len()])
            .all(|(n, h)| *n == h.as_str())
    };

    if matches_at(origin) {
        return Some(origin);
    }
    for distance in 1..=last.max(origin) {
        if origin >= distance && matches_at(origin - distance) {
            return Some(origin - distance);
        }
        let forward = origin + distance;
        if forward <= last && matches_at(forward) {
            return Some(forward);
        }
    }
    None
}
