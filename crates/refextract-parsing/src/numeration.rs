//! Volume/year/page numeration, rewritten into the canonical
//! `<VOL>V</VOL> <YR>(Y)</YR> <PG>P</PG>` form whatever order it was written in.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::tagger::replace_outside_tags;

/// Character before a numeration: start of text or anything that cannot
/// continue a word, URL, tag or report number.
const LEAD: &str = r"(?P<lead>^|[^\w/<>.\-])";
/// Volume with an optional `Vol.`/`No.` prefix and issue number.
const VOL: &str =
    r"(?:(?:[Vv]ol?\.?|[Nn]o\.?)\s*)?(?P<vol>[A-Za-z]?\d{1,6}[A-Za-z]?|[IVX]{1,6})\b(?:\s*\(\d{1,2}(?:-\d)?\))?";
const SERIES: &str = r"(?P<series>[A-H])\b";
const SERIES_AFTER: &str = r"(?P<series2>[A-H])\b";
/// Nuclear Physics subtitles, `(FS 13)` or `[PM 2]`.
const NUCPHYS: &str = r"(?:\s*[\(\[]\s*(?:[Ff][Ss]|[Pp][Mm])\s*\d{0,4}\s*[\)\]])";
const MONTH: &str = r"(?:(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.?\s+)?";
const YEAR: &str = r"(?P<year>(?:19|20)\d{2})[a-z]?\b";
const SEP: &str = r"\s*[,\s:-]\s*";
const SEP_THEN_YEAR: &str = r"(?:\s*[,\s:-]\s*\(?|\s*\()";
const YEAR_THEN_SEP: &str = r"(?:\)\s*[,\s:-]?\s*|\s*[,\s:-]\s*)";
/// Page, keeping only the first page of a range.
const PAGE: &str = r"(?:[pP]{1,2}\.?\s?)?(?P<page>[A-Z]?\d+[cC]?)(?:\s*-\s*[A-Z]?\d+[cC]?)?\b";

fn vol_year_page(before_vol: &str, after_vol: &str) -> String {
    format!(
        "{LEAD}{before_vol}{VOL}{after_vol}{NUCPHYS}?{SEP_THEN_YEAR}{MONTH}{YEAR}{YEAR_THEN_SEP}{PAGE}"
    )
}

fn vol_page_year(before_vol: &str, after_vol: &str) -> String {
    format!("{LEAD}{before_vol}{VOL}{after_vol}{NUCPHYS}?{SEP}{PAGE}{SEP_THEN_YEAR}{MONTH}{YEAR}\\)?")
}

/// Rewrite rules, most specific first.
static NUMERATION_RULES: Lazy<Vec<Regex>> = Lazy::new(|| {
    let series_before = format!("{SERIES}{NUCPHYS}?{SEP}");
    let series_after = format!("{SEP}{SERIES_AFTER}");
    let nucphys_before = format!("(?:{NUCPHYS}\\s*)?");
    [
        // series-vol-year-page, series-vol-page-year
        vol_year_page(&series_before, ""),
        vol_page_year(&series_before, ""),
        // vol-series-year-page, vol-series-page-year
        vol_year_page("", &series_after),
        vol_page_year("", &series_after),
        // vol-year-page, vol-page-year, with optional Nucl. Phys. subtitles
        vol_year_page(&nucphys_before, ""),
        vol_page_year(&nucphys_before, ""),
        // year-vol-page
        format!("{LEAD}\\(?{MONTH}{YEAR}\\)?{SEP}{VOL}{SEP}{PAGE}"),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// `Series A, Vol. 4` written out in words.
static SERIES_VOLUME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?i:ser(?:ies|\.)?)\s*(?P<series>[A-H])\s*[,.]?\s*(?i:vol(?:ume)?\.?)\s*(?P<vol>\d+)")
        .unwrap()
});

fn canonical(caps: &Captures) -> String {
    let mut out = caps.name("lead").map_or("", |m| m.as_str()).to_string();
    if let Some(series) = caps.name("series").or_else(|| caps.name("series2")) {
        out.push_str(&format!("<SER>{}</SER> ", series.as_str()));
    }
    out.push_str(&format!(
        "<VOL>{}</VOL> <YR>({})</YR> <PG>{}</PG>",
        &caps["vol"], &caps["year"], &caps["page"]
    ));
    out
}

/// Rewrite every recognised numeration outside existing tags into the
/// canonical tag form.
pub fn standardize_numeration(line: &str) -> String {
    let mut line = replace_outside_tags(line, &SERIES_VOLUME_RE, |caps| {
        format!("{} {}", &caps["series"], &caps["vol"])
    });
    for rule in NUMERATION_RULES.iter() {
        line = replace_outside_tags(&line, rule, canonical);
    }
    line
}

/// Convert a roman-numeral volume to arabic digits. Anything else is
/// returned unchanged.
pub fn roman_to_arabic(volume: &str) -> Option<u32> {
    if volume.is_empty() || !volume.chars().all(|c| matches!(c, 'I' | 'V' | 'X')) {
        return None;
    }
    let value = |c: char| match c {
        'I' => 1,
        'V' => 5,
        _ => 10,
    };
    let digits: Vec<u32> = volume.chars().map(value).collect();
    let mut total = 0;
    for (i, &d) in digits.iter().enumerate() {
        match digits.get(i + 1) {
            Some(&next) if next > d => total -= d as i64,
            _ => total += d as i64,
        }
    }
    u32::try_from(total).ok()
}

/// Normalize a volume: roman numerals become arabic and a trailing series
/// letter moves to the front (`100B` becomes `B100`).
pub fn normalize_volume(volume: &str) -> String {
    static TRAILING_LETTER_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^(\d+)([A-Za-z])$").unwrap());

    if let Some(n) = roman_to_arabic(volume) {
        return n.to_string();
    }
    match TRAILING_LETTER_RE.captures(volume) {
        Some(caps) => format!("{}{}", &caps[2], &caps[1]),
        None => volume.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "<VOL>12</VOL> <YR>(1999)</YR> <PG>34</PG>";

    #[test]
    fn test_four_orderings_standardize_alike() {
        let lines = [
            "Phys. Rev. 12, 34 (1999)",
            "Phys. Rev. 12 (1999) 34",
            "Phys. Rev. 12 D (1999) 34",
            "Phys. Rev. 12 D, 34 (1999)",
        ];
        for line in lines {
            let tagged = standardize_numeration(line);
            assert!(tagged.contains(CANONICAL), "{line:?} gave {tagged:?}");
        }
    }

    #[test]
    fn test_series_before_volume() {
        assert_eq!(
            standardize_numeration("Nucl. Phys. B 34 (1987) 1"),
            "Nucl. Phys. <SER>B</SER> <VOL>34</VOL> <YR>(1987)</YR> <PG>1</PG>"
        );
    }

    #[test]
    fn test_vol_series_keeps_series() {
        assert_eq!(
            standardize_numeration("Phys. Rev. 12 D (1999) 34"),
            "Phys. Rev. <SER>D</SER> <VOL>12</VOL> <YR>(1999)</YR> <PG>34</PG>"
        );
    }

    #[test]
    fn test_page_range_keeps_start() {
        assert_eq!(
            standardize_numeration("Nature 410 (2001) 37-40."),
            "Nature <VOL>410</VOL> <YR>(2001)</YR> <PG>37</PG>."
        );
    }

    #[test]
    fn test_nuclear_physics_subtitle() {
        let tagged = standardize_numeration("Nucl. Phys. B 250 [FS13] (1985) 1");
        assert!(tagged.ends_with("<SER>B</SER> <VOL>250</VOL> <YR>(1985)</YR> <PG>1</PG>"));
    }

    #[test]
    fn test_year_volume_page() {
        assert_eq!(
            standardize_numeration("Science (2003) 299, 1520"),
            "Science <VOL>299</VOL> <YR>(2003)</YR> <PG>1520</PG>"
        );
    }

    #[test]
    fn test_series_volume_words() {
        let tagged = standardize_numeration("J. Phys. Series A, Vol 4 (1971) 11");
        assert!(tagged.contains("<SER>A</SER> <VOL>4</VOL> <YR>(1971)</YR> <PG>11</PG>"));
    }

    #[test]
    fn test_report_number_digits_untouched() {
        let line = "hep-th/9901001 and CERN-TH-2001-123";
        assert_eq!(standardize_numeration(line), line);
    }

    #[test]
    fn test_existing_tags_untouched() {
        let line = "<TITLE>Nucl. Phys.</TITLE> <SER>B</SER> <VOL>34</VOL> <YR>(1987)</YR> <PG>1</PG>";
        assert_eq!(standardize_numeration(line), line);
    }

    #[test]
    fn test_normalize_volume() {
        assert_eq!(normalize_volume("XIV"), "14");
        assert_eq!(normalize_volume("IV"), "4");
        assert_eq!(normalize_volume("100B"), "B100");
        assert_eq!(normalize_volume("B100"), "B100");
        assert_eq!(normalize_volume("12"), "12");
    }
}
