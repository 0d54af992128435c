use crate::engine::ByteRange;

/// How a `Range` request header applies to a file of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No usable range: send the whole file with 200.
    Full,
    /// Send exactly this inclusive span with 206.
    Partial(ByteRange),
    /// Syntactically valid but outside the file: 416.
    Unsatisfiable,
}

/// Resolves a `Range` header against `length`.
///
/// Accepts a single `bytes=` range in any of the three forms `a-b`, `a-` and
/// `-n`. An end past the file is clamped. Anything the parser does not
/// understand (other units, multiple ranges, junk) is ignored and the whole
/// file is served, matching what browsers and media players expect.
pub fn resolve(header: Option<&str>, length: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::Full;
    };
    let Some(spec) = parse(header) else {
        return RangeOutcome::Full;
    };
    if length == 0 {
        return RangeOutcome::Unsatisfiable;
    }
    let last = length - 1;

    let (start, end) = match spec {
        Spec::FromTo(start, end) => (start, end.min(last)),
        Spec::From(start) => (start, last),
        Spec::Suffix(0) => return RangeOutcome::Unsatisfiable,
        Spec::Suffix(n) => (length.saturating_sub(n), last),
    };
    if start > last || start > end {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Partial(ByteRange { start, end })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spec {
    FromTo(u64, u64),
    From(u64),
    Suffix(u64),
}

fn parse(header: &str) -> Option<Spec> {
    let header = header.trim();
    let (unit, set) = header.split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return None;
    }
    let set = set.trim();
    if set.contains(',') {
        return None;
    }
    let (first, second) = set.split_once('-')?;
    let (first, second) = (first.trim(), second.trim());

    match (first.is_empty(), second.is_empty()) {
        (true, true) => None,
        (true, false) => Some(Spec::Suffix(digits(second)?)),
        (false, true) => Some(Spec::From(digits(first)?)),
        (false, false) => Some(Spec::FromTo(digits(first)?, digits(second)?)),
    }
}

fn digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
