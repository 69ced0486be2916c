use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Clean a rebuilt reference line: repair broken URLs, replace undesirable
/// characters and collapse whitespace.
///
/// Applying it twice gives the same result as applying it once.
pub fn repair_line(line: &str) -> String {
    let line = repair_broken_urls(line);
    let line = replace_undesirable_characters(&line);
    collapse_whitespace(&line)
}

/// Collapse runs of whitespace into a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join two fragments of a broken line.
///
/// No space is inserted when the left fragment ends in a hyphen (which is
/// kept) or already ends in a space.
pub fn join_fragments(left: &str, right: &str) -> String {
    let mut joined = String::with_capacity(left.len() + right.len() + 1);
    joined.push_str(left);
    if !(left.is_empty() || left.ends_with('-') || left.ends_with(' ')) {
        joined.push(' ');
    }
    joined.push_str(right);
    joined
}

static URL_REPAIR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    const EXTENSIONS: &[&str] = &[
        "shtml", "html", "htm", "txt", "php", "asp", "jsp", "py", "pl", "xml", "jpg", "gif",
        "mov", "swf", "pdf", "ps", "doc", "tex",
    ];

    let spaced = |ext: &str| {
        ext.chars()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(r"\s*")
    };
    let extensions = EXTENSIONS
        .iter()
        .map(|e| spaced(e))
        .collect::<Vec<_>>()
        .join("|");

    let mut patterns = vec![
        // scheme split letter by letter
        r"(?i)(h\s*t\s*t\s*p\s*s?\s*:\s*/\s*/)".to_string(),
        r"(?i)(f\s*t\s*p\s*:\s*/\s*/\s*)".to_string(),
        r"(?i)((?:https?|ftp)://\s*\w)".to_string(),
        // host with spaces around its dots
        r"(?i)((?:https?|ftp)://[\w\-]+(?:\s*\.\s*[\w\-]+)*\s*/)".to_string(),
        // path segments and file names holding a single stray space
        r"(?i)((?:https?|ftp)://[\w.\-]+/(?:[\w.\-]+(?:\s[\w.\-]+)?/)+)".to_string(),
        r"(?i)((?:https?|ftp)://[\w.\-]+/(?:[\w.\-]+?/)*[\w\-]+(?:\s[\w\-]+)?\.\s?\w+)".to_string(),
    ];
    // file extensions
    patterns.push(format!(
        r"(?i)((?:https?|ftp)://[\w.\-]+/(?:[\w.\-]+?/)*[\w\-]+\.(?:{}))",
        extensions
    ));
    // a short fragment ending the line, glued directly to the last slash
    patterns.push(r"(?i)((?:https?|ftp)://[\w.\-]+/(?:[\w.\-]+?/)*(?:[\w.\-]\s?){1,10}\s*)$".to_string());

    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
});

/// Remove spaces inside URLs broken by text extraction.
pub fn repair_broken_urls(line: &str) -> String {
    let mut line = line.to_string();
    for re in URL_REPAIR_PATTERNS.iter() {
        line = re
            .replace_all(&line, |caps: &Captures| caps[1].replace(' ', ""))
            .into_owned();
    }
    line
}

/// Characters removed outright: XML-illegal controls, bidi marks, BOM and
/// language tags.
fn is_undesirable(c: char) -> bool {
    matches!(c,
        '\u{0000}'..='\u{0008}'
        | '\u{000B}'
        | '\u{000E}'..='\u{001F}'
        | '\u{007F}'
        | '\u{2028}'..='\u{202E}'
        | '\u{206A}'..='\u{206F}'
        | '\u{FFF9}'..='\u{FFFC}'
        | '\u{FEFF}'
        | '\u{FFFF}'
        | '\u{E0000}'..='\u{E007F}')
}

fn simple_replacement(c: char) -> Option<&'static str> {
    Some(match c {
        '\u{FB00}' => "ff",
        '\u{FB01}' => "fi",
        '\u{FB02}' => "fl",
        '\u{FB03}' => "ffi",
        '\u{FB04}' => "ffl",
        '\u{FB05}' | '\u{FB06}' => "st",
        '\u{0132}' => "IJ",
        '\u{0133}' => "ij",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{00AB}' | '\u{00BB}' => "\"",
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => "'",
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
        | '\u{2212}' | '\u{FE63}' | '\u{FF0D}' => "-",
        '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2009}' | '\u{200A}' | '\u{202F}' | '\t' => " ",
        '\u{2026}' => "...",
        _ => return None,
    })
}

/// Spacing accents left in front of their letter by text extraction.
const SPACING_ACCENTS: &[char] = &[
    '\u{00A8}', '\u{00B4}', '`', '\u{02C6}', '\u{02DC}', '\u{00B8}', '\u{02C7}',
];

fn compose_accent(accent: char, base: char) -> Option<char> {
    let (plain, composed): (&str, &str) = match accent {
        '\u{00A8}' => ("aeiouyAEIOU", "äëïöüÿÄËÏÖÜ"),
        '\u{00B4}' => ("aeiouyAEIOUYcnszCNSZ", "áéíóúýÁÉÍÓÚÝćńśźĆŃŚŹ"),
        '`' => ("aeiouAEIOU", "àèìòùÀÈÌÒÙ"),
        '\u{02C6}' => ("aeiouAEIOU", "âêîôûÂÊÎÔÛ"),
        '\u{02DC}' => ("anoANO", "ãñõÃÑÕ"),
        '\u{00B8}' => ("cCsS", "çÇşŞ"),
        '\u{02C7}' => ("cenrszCENRSZ", "čěňřšžČĚŇŘŠŽ"),
        _ => return None,
    };
    let idx = plain.chars().position(|c| c == base)?;
    composed.chars().nth(idx)
}

/// Replace characters that PDF conversion leaves broken or unwanted.
pub fn replace_undesirable_characters(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if is_undesirable(c) {
            continue;
        }
        if SPACING_ACCENTS.contains(&c) {
            if let Some(&next) = chars.peek() {
                if let Some(composed) = compose_accent(c, next) {
                    out.push(composed);
                    chars.next();
                    continue;
                }
            }
        }
        match simple_replacement(c) {
            Some(s) => out.push_str(s),
            None => out.push(c),
        }
    }
    out
}

/// Wash punctuation errors in a reference line before tagging, e.g.
/// `Yes , I like it .` becomes `Yes, I like it.`
pub fn wash_line(line: &str) -> String {
    static RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
        [
            (r"\s+,", ","),
            (r"\s+;", ";"),
            (r"\s+\.", "."),
            (r":\s:", ":"),
            (r",\s:", ":"),
            (r"\s+\]", "]"),
            (r"\[\s+", "["),
            (r"[\u{02D7}\u{0335}\u{0336}\u{2212}\u{FE63}\u{FF0D}\u{2010}\u{2011}\u{2013}]", "-"),
            (r"\s{2,}", " "),
        ]
        .into_iter()
        .map(|(p, r)| (Regex::new(p).unwrap(), r))
        .collect()
    });

    let mut line = line.to_string();
    for (re, replacement) in RULES.iter() {
        line = re.replace_all(&line, *replacement).into_owned();
    }
    line
}
