//! Content negotiation helpers behind `accepts` and `is`.
//!
//! Offers and kinds are either full media types (`application/json`,
//! `text/*`) or one of the shorthands `json`, `html`, `text`, `txt`, `xml`,
//! `form`, `urlencoded`, `js`, `css`.

use std::cmp::Ordering;

use mime::Mime;

fn resolve(offer: &str) -> Option<Mime> {
    let full = match offer {
        "json" => "application/json",
        "html" => "text/html",
        "text" | "txt" => "text/plain",
        "xml" => "application/xml",
        "form" | "urlencoded" => "application/x-www-form-urlencoded",
        "js" => "application/javascript",
        "css" => "text/css",
        other => other,
    };
    full.parse().ok()
}

struct AcceptEntry {
    range: Mime,
    quality: f32,
}

fn parse_accept(accept: &str) -> Vec<AcceptEntry> {
    accept
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| item.parse::<Mime>().ok())
        .map(|range| {
            let quality = range.get_param("q").and_then(|q| q.as_str().parse::<f32>().ok()).unwrap_or(1.0);
            AcceptEntry { range, quality }
        })
        .collect()
}

/// How closely `range` matches `mime`: exact beats `type/*` beats `*/*`.
fn specificity(range: &Mime, mime: &Mime) -> Option<u8> {
    let type_matches = range.type_() == mime::STAR || range.type_() == mime.type_();
    let subtype_matches = range.subtype() == mime::STAR || range.subtype() == mime.subtype();
    if !(type_matches && subtype_matches) {
        return None;
    }

    Some(u8::from(range.type_() != mime::STAR) + u8::from(range.subtype() != mime::STAR))
}

/// The Accept entry an offer matched: its quality, how specific the range
/// was, and where it sat in the header.
#[derive(Clone, Copy)]
struct Priority {
    quality: f32,
    rank: u8,
    position: usize,
}

impl Priority {
    /// The entry that governs `mime`: the most specific matching range, then
    /// the highest quality, then the earliest in the header.
    fn of(entries: &[AcceptEntry], mime: &Mime) -> Option<Self> {
        entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                specificity(&entry.range, mime).map(|rank| Priority { quality: entry.quality, rank, position })
            })
            .reduce(|best, next| {
                let order = next.rank.cmp(&best.rank).then(next.quality.total_cmp(&best.quality));
                if order == Ordering::Greater { next } else { best }
            })
    }

    fn outranks(&self, other: &Self) -> bool {
        let order = self
            .quality
            .total_cmp(&other.quality)
            .then(self.rank.cmp(&other.rank))
            .then(other.position.cmp(&self.position));
        order == Ordering::Greater
    }
}

/// Picks the offer the `accept` header prefers. Offers are ordered by the
/// quality of the entry they match, then by how specific that entry is, then
/// by its position in the header, and finally by offer order. Without an
/// `accept` header the first offer wins.
pub(crate) fn negotiate<'o>(accept: Option<&str>, offers: &[&'o str]) -> Option<&'o str> {
    let first = offers.first().copied()?;
    let Some(accept) = accept.filter(|accept| !accept.trim().is_empty()) else {
        return Some(first);
    };

    let entries = parse_accept(accept);
    let mut best: Option<(&'o str, Priority)> = None;

    for &offer in offers {
        let Some(priority) = resolve(offer).and_then(|mime| Priority::of(&entries, &mime)) else {
            continue;
        };
        if priority.quality <= 0.0 {
            continue;
        }

        match best {
            Some((_, current)) if !priority.outranks(&current) => {}
            _ => best = Some((offer, priority)),
        }
    }

    best.map(|(offer, _)| offer)
}

/// Whether `content_type` is of `kind`. A `json` or `xml` kind also matches
/// structured suffixes such as `application/vnd.api+json`.
pub(crate) fn type_is(content_type: &Mime, kind: &str) -> bool {
    if matches!(kind, "json" | "xml") && content_type.suffix().is_some_and(|suffix| suffix == kind) {
        return true;
    }

    resolve(kind).and_then(|expected| specificity(&expected, content_type)).is_some()
}
