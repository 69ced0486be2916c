use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::tagger::replace_outside_tags;

pub(crate) const URL_PLACEHOLDER: &str = "<URL />";
pub(crate) const DOI_PLACEHOLDER: &str = "<DOI />";

/// A URL cited in a reference line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundUrl {
    pub url: String,
    /// Anchor text for HTML links, otherwise the URL itself.
    pub description: String,
}

/// Strip trailing punctuation and unbalanced closing brackets from a DOI.
fn clean_doi(doi: &str) -> &str {
    let mut doi = doi.trim_end_matches(['.', ',', ';', ':']);
    for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
        while doi.ends_with(close) && doi.matches(close).count() > doi.matches(open).count() {
            doi = doi[..doi.len() - 1].trim_end_matches(['.', ',', ';', ':']);
        }
    }
    doi
}

/// Replace prefixed DOIs with `<DOI />` placeholders.
///
/// Handles formats like:
/// - `doi:10.1234/example`
/// - `DOI 10.1234/example`
/// - `https://doi.org/10.1234/example`
/// - `http://dx.doi.org/10.1234/example`
///
/// Returns the line and the DOIs, without prefix, in order of appearance.
pub fn extract_dois(line: &str) -> (String, Vec<String>) {
    static DOI_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)\b(?:(?:https?://)?(?:dx\.)?doi\.org/|doi\s*:?\s*)(?P<doi>10\.\d{4,}/[^\s\]>},]+)",
        )
        .unwrap()
    });

    let mut dois = Vec::new();
    let line = replace_outside_tags(line, &DOI_RE, |caps: &Captures| {
        let raw = &caps["doi"];
        let doi = clean_doi(raw);
        dois.push(doi.to_string());
        // whatever the cleaning cut off stays in the text
        format!("{}{}", DOI_PLACEHOLDER, &raw[doi.len()..])
    });
    (line, dois)
}

/// Replace HTML anchors and raw URLs with `<URL />` placeholders.
///
/// Anchors keep their text as the description. Trailing `.` and `,` are not
/// part of a raw URL.
pub fn extract_urls(line: &str) -> (String, Vec<FoundUrl>) {
    static URL_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r#"(?i)<a\s+href\s*=\s*["']?(?P<href>[^"'>\s]+)["']?[^>]*>(?P<text>[^<]*)</a>|(?P<raw>\b(?:(?:https?|ftp)://|www\.)[^\s<>"]+)"#,
        )
        .unwrap()
    });

    let mut urls = Vec::new();
    let line = replace_outside_tags(line, &URL_RE, |caps: &Captures| {
        if let Some(href) = caps.name("href") {
            let text = caps.name("text").map_or("", |m| m.as_str()).trim();
            urls.push(FoundUrl {
                url: href.as_str().to_string(),
                description: if text.is_empty() {
                    href.as_str().to_string()
                } else {
                    text.to_string()
                },
            });
            return URL_PLACEHOLDER.to_string();
        }
        let raw = caps.name("raw").map_or("", |m| m.as_str());
        let url = raw.trim_end_matches(['.', ',']);
        urls.push(FoundUrl {
            url: url.to_string(),
            description: url.to_string(),
        });
        format!("{}{}", URL_PLACEHOLDER, &raw[url.len()..])
    });
    (line, urls)
}

/// Tag arXiv identifiers as report numbers.
///
/// `arXiv:1234.5678v2` becomes `arXiv:1234.5678`; old-style identifiers
/// keep their category, `arXiv:hep-th/9901001` becomes `hep-th/9901001`.
pub fn tag_arxiv_ids(line: &str) -> String {
    static ARXIV_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i:\barxiv)\s*:\s*(?:(?P<new>\d{4}\.\d{4,5})|(?P<old>[a-z]+(?:-[a-z]+)?(?:\.[A-Z]{2})?/\d{7}))(?:v\d+)?\b",
        )
        .unwrap()
    });

    replace_outside_tags(line, &ARXIV_RE, |caps: &Captures| {
        let value = match (caps.name("new"), caps.name("old")) {
            (Some(new), _) => format!("arXiv:{}", new.as_str()),
            (None, Some(old)) => old.as_str().to_string(),
            (None, None) => return caps[0].to_string(),
        };
        format!("<REPORTNUMBER>{}</REPORTNUMBER>", value)
    })
}

/// Standardize the numeration part of a report number: spaces become
/// hyphens, repeated hyphens collapse and hyphens around a slash vanish.
pub fn standardize_report_numeration(numeration: &str) -> String {
    static HYPHENS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").unwrap());
    static SLASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?/-?").unwrap());

    let hyphenated = numeration.trim_end().replace(' ', "-");
    let collapsed = HYPHENS_RE.replace_all(&hyphenated, "-");
    SLASH_RE.replace_all(&collapsed, "/").into_owned()
}

/// Join a standard category and raw numeration into the final report number.
pub fn format_report_number(category: &str, numeration: &str) -> String {
    static HEP_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(astro-ph|hep-th|hep-ph|hep-ex|hep-lat|math-ph)-(\d)").unwrap()
    });
    static GLUED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z-]+?)([\d-]+)$").unwrap());

    let joined = format!("{}{}", category, standardize_report_numeration(numeration));
    let joined = HEP_RE.replace(&joined, "$1/$2");
    match GLUED_RE.captures(&joined) {
        Some(caps) if !caps[1].ends_with('-') && !caps[2].starts_with('-') => {
            format!("{}-{}", &caps[1], &caps[2])
        }
        _ => joined.into_owned(),
    }
}
