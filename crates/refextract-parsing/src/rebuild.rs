use refextract_core::ReferenceLine;
use tracing::debug;

use crate::repair::{join_fragments, repair_line};
use crate::section::MarkerPattern;

/// What separates one reference from the next in the section text.
#[derive(Debug, Clone, Copy)]
pub enum LineSeparator<'a> {
    /// Each reference starts with a marker of this style.
    Marker(&'a MarkerPattern),
    /// References are paragraphs separated by blank lines.
    BlankLines,
    /// Nothing recognisable: the whole section is one reference.
    Unseparated,
}

impl<'a> LineSeparator<'a> {
    /// Pick the separator for a section, falling back to blank lines when
    /// no marker style is known.
    pub fn choose(section: &[String], marker_pattern: Option<&'a MarkerPattern>) -> Self {
        match marker_pattern {
            Some(pattern) => LineSeparator::Marker(pattern),
            None if blank_lines_separate(section) => LineSeparator::BlankLines,
            None => LineSeparator::Unseparated,
        }
    }

    fn starts_reference(&self, line: &str) -> bool {
        match self {
            LineSeparator::Marker(p) => p.match_start(line).is_some(),
            LineSeparator::BlankLines => line.is_empty(),
            LineSeparator::Unseparated => false,
        }
    }
}

/// Whether blank lines separate the references: more than three blocks of
/// text, one blank run per block (or one fewer), and at least one block
/// spanning several lines so double spacing is not mistaken for separation.
pub fn blank_lines_separate(section: &[String]) -> bool {
    let mut blocks = 0;
    let mut blanks = 0;
    let mut multi_line_block = false;

    let mut i = 0;
    while i < section.len() {
        let blank = section[i].trim().is_empty();
        let run = section[i..]
            .iter()
            .take_while(|l| l.trim().is_empty() == blank)
            .count();
        if blank {
            // a blank run closing the section separates nothing
            if i + run < section.len() {
                blanks += 1;
            }
        } else {
            blocks += 1;
            multi_line_block |= run > 1;
        }
        i += run;
    }

    blocks > 3 && (blanks == blocks || blanks + 1 == blocks) && multi_line_block
}

/// Join broken physical lines into logical reference lines.
///
/// Scans backwards accumulating text; every line that starts a reference
/// closes the one being built.
pub fn rebuild_lines(section: &[String], separator: LineSeparator) -> Vec<String> {
    let mut rebuilt = Vec::new();
    let mut working = String::new();

    let mut finish = |working: &mut String| {
        let line = working.trim().to_string();
        if !line.is_empty() {
            rebuilt.push(line);
        }
        working.clear();
    };

    for line in section.iter().rev() {
        let current = line.trim();
        if separator.starts_reference(current) {
            if !current.is_empty() {
                working = join_fragments(current, &working);
            }
            finish(&mut working);
        } else if !current.is_empty() {
            working = join_fragments(current, &working);
        }
    }
    finish(&mut working);

    rebuilt.reverse();
    rebuilt
}

fn merge_into_last(fixed: &mut [String], text: &str) {
    if let Some(last) = fixed.last_mut() {
        *last = join_fragments(last.trim_end(), text.trim_start());
    }
}

/// Repair lines split on a marker that was not a real reference marker.
///
/// Only runs when the first line is marked `1`: each following line must
/// carry the next number, otherwise it is merged into the previous line or
/// split at an embedded next marker followed by text.
pub fn correct_rebuilt_lines(lines: Vec<String>, pattern: &MarkerPattern) -> Vec<String> {
    let first_marknum = lines
        .first()
        .and_then(|l| pattern.match_start(l))
        .and_then(|m| m.marknum);
    if first_marknum != Some(1) {
        return lines;
    }

    let mut lines = lines.into_iter();
    let mut fixed: Vec<String> = lines.next().into_iter().collect();
    let mut last = 1;

    for line in lines {
        let Some(m) = pattern.match_start(&line) else {
            merge_into_last(&mut fixed, &line);
            continue;
        };
        if m.marknum == Some(last + 1) {
            fixed.push(line);
            last += 1;
            continue;
        }
        let rest = &line[m.end..];
        if rest.trim().is_empty() {
            merge_into_last(&mut fixed, &line);
            continue;
        }

        let split = pattern.find_in(rest).find(|(pos, next)| {
            next.marknum == Some(last + 1)
                && rest[pos + next.end..]
                    .trim_start()
                    .chars()
                    .next()
                    .is_some_and(char::is_alphabetic)
        });
        match split {
            Some((pos, _)) => {
                let at = m.end + pos;
                debug!(marker = last + 1, "splitting misaligned reference line");
                merge_into_last(&mut fixed, &line[..at]);
                fixed.push(line[at..].to_string());
                last += 1;
            }
            None => merge_into_last(&mut fixed, &line),
        }
    }
    fixed
}

/// Rebuild the reference lines of a section and split their markers off.
///
/// Lines left with no text after the marker are dropped.
pub fn rebuild_reference_lines(
    section: &[String],
    marker_pattern: Option<&MarkerPattern>,
) -> Vec<ReferenceLine> {
    let separator = LineSeparator::choose(section, marker_pattern);
    debug!(?separator, lines = section.len(), "rebuilding reference lines");

    let mut lines = rebuild_lines(section, separator);
    if let LineSeparator::Marker(pattern) = separator {
        lines = correct_rebuilt_lines(lines, pattern);
    }

    lines
        .iter()
        .map(|l| repair_line(l))
        .filter_map(|line| {
            let (marker, text) = match marker_pattern.and_then(|p| p.match_start(&line)) {
                Some(m) => (m.mark, line[m.end..].trim().to_string()),
                None => (String::new(), line),
            };
            (!text.is_empty()).then_some(ReferenceLine { marker, text })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::marker_patterns;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    fn brackets() -> &'static MarkerPattern {
        &marker_patterns()[0]
    }

    #[test]
    fn test_rebuild_broken_lines() {
        let section = lines(&[
            "[1] See http://x.org/ fo",
            "r more details.",
            "[2] Example, AN: private communica-",
            "tion (1996).",
        ]);
        let rebuilt = rebuild_lines(&section, LineSeparator::Marker(brackets()));
        assert_eq!(
            rebuilt,
            vec![
                "[1] See http://x.org/ fo r more details.",
                "[2] Example, AN: private communica-tion (1996).",
            ]
        );
    }

    #[test]
    fn test_rebuild_unseparated_is_one_line() {
        let section = lines(&["first part", "second part", "", "third"]);
        assert_eq!(
            rebuild_lines(&section, LineSeparator::Unseparated),
            vec!["first part second part third"]
        );
    }

    #[test]
    fn test_blank_line_separation() {
        let section = lines(&[
            "Smith J 1999 Phys Rev",
            "D 12 34",
            "",
            "Jones A 2001 Nature",
            "",
            "Brown B 2003 Science",
            "",
            "White C 2005 Cell",
        ]);
        assert!(blank_lines_separate(&section));
        let rebuilt = rebuild_lines(&section, LineSeparator::choose(&section, None));
        assert_eq!(rebuilt.len(), 4);
        assert_eq!(rebuilt[0], "Smith J 1999 Phys Rev D 12 34");
    }

    #[test]
    fn test_double_spacing_is_not_separation() {
        let section = lines(&["a", "", "b", "", "c", "", "d"]);
        assert!(!blank_lines_separate(&section));
    }

    #[test]
    fn test_correct_misaligned_marker() {
        let rebuilt = lines(&[
            "[1] Smith, J blah blah",
            "[2] Brown, N blah blah see reference",
            "[56] for more info [3] Wills, A blah blah",
        ]);
        let fixed = correct_rebuilt_lines(rebuilt, brackets());
        assert_eq!(
            fixed,
            vec![
                "[1] Smith, J blah blah",
                "[2] Brown, N blah blah see reference [56] for more info ",
                "[3] Wills, A blah blah",
            ]
        );
    }

    #[test]
    fn test_correct_merges_marker_only_and_unsplittable_lines() {
        let rebuilt = lines(&["[1] A.", "[9]", "[7] see [2]", "[2] B."]);
        let fixed = correct_rebuilt_lines(rebuilt, brackets());
        assert_eq!(fixed, vec!["[1] A. [9] [7] see [2]", "[2] B."]);
    }

    #[test]
    fn test_correct_skipped_when_first_marker_not_one() {
        let rebuilt = lines(&["[4] A.", "[9] B."]);
        assert_eq!(correct_rebuilt_lines(rebuilt.clone(), brackets()), rebuilt);
    }

    #[test]
    fn test_rebuild_reference_lines_splits_markers() {
        let section = lines(&["[1] A. Smith,", "Phys. Rev.  D", "[2]", "", "[3] B. Jones"]);
        let refs = rebuild_reference_lines(&section, Some(brackets()));
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].marker, "[1]");
        // the marker-only line carries no text and is dropped
        assert_eq!(refs[0].text, "A. Smith, Phys. Rev. D");
        assert_eq!(refs[1].marker, "[3]");
        assert_eq!(refs[1].text, "B. Jones");
    }
}
