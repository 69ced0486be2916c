//! Author group recognition.
//!
//! One composite pattern covers the three shapes author lists take in
//! reference lines:
//!
//! - `J. Smith, A.B. Jones and C. Brown et al.` (initials before surname);
//! - `Smith J., A. Jones` (a leading surname-initials author, accepted only
//!   when at least one initials-first author follows);
//! - `Smith and Jones et al.` (bare surnames, only with `et al.`).
//!
//! Editor markers around a group turn it into an editor inclusion.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::tagger::mask_tags;

const INITIALS: &str = r"(?:\p{Lu}\p{Ll}?\.\s*-?\s*){1,4}";
const SURNAME_PREFIX: &str =
    r"(?:(?:van|von|der|den|de|del|della|di|da|du|la|le|ter|dos|das|Van|Von|De|Del|Di|Da|Du|La|Le)\s+){0,3}";
const SURNAME_CORE: &str =
    r"(?:\p{Lu}(?:\p{Ll}|')+(?:-?\p{Lu}\p{Ll}+)*|\p{Lu}{2,}(?:-\p{Lu}{2,})?)";
const AUTHOR_SEP: &str = r"(?:\s*,\s*(?:(?:and|&)\s+)?|\s+(?:and|&)\s+)";
const ET_AL: &str = r"(?:,?\s*et\.?\s*al\b\.?)";

fn surname() -> String {
    format!("{SURNAME_PREFIX}{SURNAME_CORE}")
}

/// The composite author pattern. The `etal` group is set when the group ends
/// with `et al.`.
static AUTHOR_RE: Lazy<Regex> = Lazy::new(|| {
    let surname = surname();
    let standard = format!("{INITIALS}{surname}");
    let standard_list = format!("{standard}(?:{AUTHOR_SEP}{standard})*");
    let surname_initials = format!(r"{surname},?\s+(?:\p{{Lu}}\.\s*-?\s*){{1,3}}");

    let pattern = format!(
        r"\b(?:{surname_initials}{AUTHOR_SEP}{standard_list}|{standard_list}|{surname}(?:\s+(?:and|&)\s+{surname})?(?P<bare>{ET_AL}))(?P<etal>{ET_AL})?"
    );
    Regex::new(&pattern).unwrap()
});

/// Lower-confidence pattern recovering one more author after a trailing
/// `and` that the composite pattern left behind.
static ADJOINING_AUTHOR_RE: Lazy<Regex> = Lazy::new(|| {
    let surname = surname();
    Regex::new(&format!(
        r"^\s*,?\s*(?:and|&)\s+(?:{INITIALS}{surname}|{surname}(?:,?\s+(?:\p{{Lu}}\.\s*){{1,3}})?)"
    ))
    .unwrap()
});

/// An author left just before a group, joined to it by `and`.
static LEADING_AUTHOR_RE: Lazy<Regex> = Lazy::new(|| {
    let surname = surname();
    Regex::new(&format!(
        r"\b(?:{INITIALS}{surname}|{surname}(?:,?\s+(?:\p{{Lu}}\.\s*){{1,3}})?)\s*,?\s+(?:and|&)\s+$"
    ))
    .unwrap()
});

/// Bare surnames listed ahead of an `et al.` group.
static LEADING_SURNAMES_RE: Lazy<Regex> = Lazy::new(|| {
    let surname = surname();
    Regex::new(&format!(r"\b{surname}(?:{AUTHOR_SEP}{surname})*\s*,\s*$")).unwrap()
});

static EDITOR_BEFORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\bedited\s+by|\beds?\.?(?:\s+by)?)\s*:?\s*$").unwrap());
static EDITOR_AFTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*,?\s*\(?\s*(?:eds?\b\.?|editors?\b)\s*\)?").unwrap());
static ET_AL_BEFORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"et\.?\s*al\b\.?\s*(?:</AUTHETAL>)?\s*,?\s*$").unwrap()
});

/// Kind of a recognised author group, as written in its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorTag {
    Standard,
    EtAl,
    Editors,
}

impl AuthorTag {
    pub fn name(self) -> &'static str {
        match self {
            AuthorTag::Standard => "AUTHSTND",
            AuthorTag::EtAl => "AUTHETAL",
            AuthorTag::Editors => "AUTHINCL",
        }
    }
}

/// An author group found in a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorMatch {
    /// Span replaced by the tag, editor markers included.
    pub span: Range<usize>,
    /// Span of the names themselves.
    pub names: Range<usize>,
    pub kind: AuthorTag,
}

/// Find author groups outside existing tags.
pub fn find_author_groups(line: &str) -> Vec<AuthorMatch> {
    let masked = mask_tags(line, false);
    let mut groups: Vec<AuthorMatch> = Vec::new();

    for caps in AUTHOR_RE.captures_iter(&masked) {
        let Some(m) = caps.get(0) else { continue };
        let text = m.as_str();
        if text.contains('_') {
            continue;
        }
        let before = &line[..m.start()];
        if ET_AL_BEFORE_RE.is_match(before) {
            debug!(author = text, "author group after et al. left as misc");
            continue;
        }

        let mut names = m.start()..m.start() + text.trim_end_matches([' ', ',']).len();
        let etal = caps.name("etal").is_some() || caps.name("bare").is_some();

        let free_from = groups.last().map_or(0, |g| g.span.end);
        let gap = masked.get(free_from..names.start).unwrap_or("");
        let leading = LEADING_AUTHOR_RE
            .find(gap)
            .or_else(|| etal.then(|| LEADING_SURNAMES_RE.find(gap)).flatten());
        if let Some(lead) = leading {
            debug!(author = lead.as_str(), "author recovered before group");
            names.start = free_from + lead.start();
        }
        let before = &line[..names.start];

        if !etal {
            if let Some(extra) = ADJOINING_AUTHOR_RE.find(&masked[names.end..]) {
                if !extra.as_str().contains('_') {
                    names.end += extra.end();
                    names.end = m.start() + masked[m.start()..names.end].trim_end().len();
                }
            }
        }

        let mut span = names.clone();
        let mut kind = if etal { AuthorTag::EtAl } else { AuthorTag::Standard };

        if let Some(after) = EDITOR_AFTER_RE.find(&masked[names.end..]) {
            span.end = names.end + after.end();
            kind = AuthorTag::Editors;
        } else if let Some(marker) = EDITOR_BEFORE_RE.find(before) {
            if groups.last().is_none_or(|g| g.span.end <= marker.start()) {
                span.start = marker.start();
                kind = AuthorTag::Editors;
            }
        }

        if groups.last().is_some_and(|g| g.span.end > span.start) {
            continue;
        }
        groups.push(AuthorMatch { span, names, kind });
    }
    groups
}

/// Tag author groups: `<AUTHSTND>`, `<AUTHETAL>` or `<AUTHINCL>` for editors.
///
/// A semicolon after a group stays outside the tag.
pub fn tag_authors(line: &str) -> String {
    let groups = find_author_groups(line);
    if groups.is_empty() {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + groups.len() * 24);
    let mut last = 0;
    for group in &groups {
        let name = group.kind.name();
        out.push_str(&line[last..group.span.start]);
        out.push_str(&format!("<{name}>{}</{name}>", &line[group.names.clone()]));
        last = group.span.end;
    }
    out.push_str(&line[last..]);
    debug!(groups = groups.len(), "tagged author groups");
    out
}
