//! Time-remaining extraction from noisy page text.
//!
//! Page markup is unstable, so the parser walks arbitrary short strings
//! looking for the first recognizable countdown form and degrades to
//! `None` ("unknown timing") rather than guessing. A wrong minutes value
//! causes either a missed or a spurious alert; no value causes neither.
//!
//! Recognized forms, tried in priority order (first match wins):
//! 1. Compact unit: integer + `h`/`m`/`s` ("12m", "2 H", "45s")
//! 2. Word unit: integer + day(s)/hour(s)/minute(s)/second(s)
//!    (plus hr/min/sec truncations)
//! 3. Clock: `H:MM` or `H:MM:SS` (seconds ignored)

/// Parse free-form text into minutes remaining. `None` means the text
/// carries no recognizable timing signal; never treat that as zero.
pub fn parse_minutes(text: &str) -> Option<f64> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    compact_unit(&lower)
        .or_else(|| word_unit(&lower))
        .or_else(|| clock(&lower))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Unit {
    Day,
    Hour,
    Minute,
    Second,
}

/// Minutes for a (value, unit) pair, rounding seconds up so a live
/// countdown never reads as "0 minutes" while still running.
fn to_minutes(value: u64, unit: Unit) -> f64 {
    match unit {
        Unit::Day => (value * 1440) as f64,
        Unit::Hour => (value * 60) as f64,
        Unit::Minute => value as f64,
        Unit::Second => (value as f64 / 60.0).ceil(),
    }
}

/// Scan for `<integer> <h|m|s>` where the unit letter is not part of a
/// longer word. "12m", "2 H", "45s" match; the "m" of "5 months" does not.
fn compact_unit(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let (value, end) = read_number(bytes, i);
            if let Some(value) = value {
                let mut j = end;
                while j < bytes.len() && bytes[j] == b' ' {
                    j += 1;
                }
                if j < bytes.len() {
                    let unit = match bytes[j] {
                        b'h' => Some(Unit::Hour),
                        b'm' => Some(Unit::Minute),
                        b's' => Some(Unit::Second),
                        _ => None,
                    };
                    let standalone =
                        j + 1 >= bytes.len() || !bytes[j + 1].is_ascii_alphabetic();
                    if let (Some(unit), true) = (unit, standalone) {
                        return Some(to_minutes(value, unit));
                    }
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }
    None
}

/// Scan for `<integer> <unit word>`: day(s), hour(s), minute(s),
/// second(s), and the hr/min/sec truncations that show up in page text.
fn word_unit(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let (value, end) = read_number(bytes, i);
            if let Some(value) = value {
                let mut j = end;
                while j < bytes.len() && bytes[j] == b' ' {
                    j += 1;
                }
                let word_start = j;
                while j < bytes.len() && bytes[j].is_ascii_alphabetic() {
                    j += 1;
                }
                let unit = match &text[word_start..j] {
                    "day" | "days" => Some(Unit::Day),
                    "hour" | "hours" | "hr" | "hrs" => Some(Unit::Hour),
                    "minute" | "minutes" | "min" | "mins" => Some(Unit::Minute),
                    "second" | "seconds" | "sec" | "secs" => Some(Unit::Second),
                    _ => None,
                };
                if let Some(unit) = unit {
                    return Some(to_minutes(value, unit));
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }
    None
}

/// Scan for `H:MM` or `H:MM:SS`. The seconds component is ignored for the
/// minutes result; MM must be exactly two digits and a valid minute count.
fn clock(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let (hours, end) = read_number(bytes, i);
            if let Some(hours) = hours {
                if end < bytes.len() && bytes[end] == b':' {
                    let mm_start = end + 1;
                    let mm_end = mm_start + 2;
                    if mm_end <= bytes.len()
                        && bytes[mm_start..mm_end].iter().all(|b| b.is_ascii_digit())
                        && clock_tail_ok(bytes, mm_end)
                    {
                        let minutes: u64 = match text[mm_start..mm_end].parse() {
                            Ok(m) => m,
                            Err(_) => return None,
                        };
                        if minutes < 60 {
                            return Some((hours * 60 + minutes) as f64);
                        }
                    }
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }
    None
}

/// After `H:MM`, accept end-of-token or a well-formed `:SS` pair; reject
/// a third digit ("1:234") or a malformed seconds component.
fn clock_tail_ok(bytes: &[u8], mm_end: usize) -> bool {
    if mm_end >= bytes.len() {
        return true;
    }
    match bytes[mm_end] {
        b':' => {
            let ss_end = mm_end + 3;
            ss_end <= bytes.len()
                && bytes[mm_end + 1..ss_end].iter().all(|b| b.is_ascii_digit())
                && (ss_end >= bytes.len() || !bytes[ss_end].is_ascii_digit())
        }
        b if b.is_ascii_digit() => false,
        _ => true,
    }
}

/// Consume a digit run starting at `start`; returns (value, one-past-end).
/// Runs too long for u64 (opaque numeric ids) yield None but still advance.
fn read_number(bytes: &[u8], start: usize) -> (Option<u64>, usize) {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let value = std::str::from_utf8(&bytes[start..end])
        .ok()
        .and_then(|s| s.parse().ok());
    (value, end)
}
