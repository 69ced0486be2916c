use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9-]+").unwrap());

/// Share of words that must agree for two boundary lines to count as the same.
const SIMILARITY_THRESHOLD: f64 = 0.9;

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_page_break(line: &str) -> bool {
    line.contains('\u{000C}') && line.chars().all(|c| c == '\u{000C}' || c.is_whitespace())
}

/// Indices of the form-feed page-break lines.
pub fn page_break_positions(lines: &[String]) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_page_break(l))
        .map(|(i, _)| i)
        .collect()
}

fn words(line: &str) -> Vec<&str> {
    WORD_RE.find_iter(line).map(|m| m.as_str()).collect()
}

/// Two lines are similar when they have the same number of words and at
/// least 90% of the word pairs are both numbers or share their first and
/// last letter.
fn boundary_lines_similar(a: &[&str], b: &[&str]) -> bool {
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    let matches = a
        .iter()
        .zip(b)
        .filter(|(x, y)| {
            let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
            if digits(x) && digits(y) {
                return true;
            }
            let (x, y) = (x.to_lowercase(), y.to_lowercase());
            x.chars().next() == y.chars().next() && x.chars().last() == y.chars().last()
        })
        .count();
    matches as f64 / a.len() as f64 >= SIMILARITY_THRESHOLD
}

/// Whether the line at `reference` and every line in `others` look alike.
fn lines_agree(lines: &[String], reference: usize, others: impl Iterator<Item = usize>) -> bool {
    let head = &lines[reference];
    let head_words = words(head);
    for idx in others {
        let Some(line) = lines.get(idx) else {
            return false;
        };
        if is_blank(head) {
            if !words(line).is_empty() {
                return false;
            }
        } else if !boundary_lines_similar(&head_words, &words(line)) {
            return false;
        }
    }
    true
}

/// Estimate how many lines at the top of each page are running headers.
fn count_header_lines(lines: &[String], breaks: &[usize]) -> usize {
    if breaks.len() < 4 {
        return 0;
    }
    let remaining = breaks.len() - 1;
    // with many pages only odd pages are compared, even pages often differ
    let step = if remaining > 3 { 2 } else { 1 };

    let mut count = 0;
    loop {
        let first = breaks[1] + count + 1;
        if first >= breaks[2] || first >= lines.len() {
            break;
        }
        let others = (1 + step..remaining)
            .step_by(step)
            .map(|k| breaks[k] + count + 1)
            .filter(|&idx| idx < lines.len());
        if !lines_agree(lines, first, others) {
            break;
        }
        count += 1;
    }
    count
}

/// Estimate how many lines at the bottom of each page are running footers.
fn count_footer_lines(lines: &[String], breaks: &[usize]) -> usize {
    if breaks.len() < 3 {
        return 0;
    }
    let mut count = 0;
    loop {
        let Some(first) = breaks[1].checked_sub(count + 1) else {
            break;
        };
        if first <= breaks[0] {
            break;
        }
        let mut others = Vec::with_capacity(breaks.len());
        for k in 2..breaks.len() {
            match breaks[k].checked_sub(count + 1) {
                Some(idx) if idx > breaks[k - 1] => others.push(idx),
                _ => return count,
            }
        }
        if !lines_agree(lines, first, others.into_iter()) {
            break;
        }
        count += 1;
    }
    count
}

/// Remove page-break lines and the running headers and footers around them.
///
/// Headers and footers are only removed when every page is longer than the
/// furniture being cut. Documents holding nothing but whitespace are
/// returned unchanged.
pub fn strip_page_furniture(lines: &[String]) -> Vec<String> {
    if lines.iter().all(|l| is_blank(l)) {
        return lines.to_vec();
    }

    let breaks = page_break_positions(lines);
    if breaks.is_empty() {
        return lines.to_vec();
    }

    let headers = count_header_lines(lines, &breaks);
    let footers = count_footer_lines(lines, &breaks);

    let shortest_page = breaks.windows(2).map(|w| w[1] - w[0]).min();
    let mut remove: HashSet<usize> = breaks.iter().copied().collect();

    match shortest_page {
        Some(shortest) if headers + footers + 1 < shortest => {
            debug!(
                pages = breaks.len(),
                headers, footers, "stripping page headers and footers"
            );
            let last = breaks.len() - 1;
            for (i, &brk) in breaks.iter().enumerate() {
                if i != last {
                    remove.extend((brk + 1..=brk + headers).filter(|&x| x < lines.len()));
                }
                remove.extend(brk.saturating_sub(footers)..brk);
            }
        }
        _ => debug!(pages = breaks.len(), "removing page breaks only"),
    }

    lines
        .iter()
        .enumerate()
        .filter(|(i, _)| !remove.contains(i))
        .map(|(_, l)| l.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(header: &str, body: &[&str], footer: &str) -> Vec<String> {
        let mut page = vec![header.to_string()];
        page.extend(body.iter().map(|s| s.to_string()));
        page.push(footer.to_string());
        page.push("\u{000C}".to_string());
        page
    }

    fn document() -> Vec<String> {
        let topics = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"];
        let mut doc = Vec::new();
        for (n, topic) in topics.iter().enumerate() {
            let body = [
                format!("body {topic} first"),
                format!("body {topic} second"),
                format!("body {topic} third"),
            ];
            let body: Vec<&str> = body.iter().map(String::as_str).collect();
            doc.extend(page(
                "Journal of Examples 2011",
                &body,
                &format!("Page {}", n + 1),
            ));
        }
        doc
    }

    #[test]
    fn test_page_break_positions() {
        let doc = document();
        let breaks = page_break_positions(&doc);
        assert_eq!(breaks.len(), 6);
        assert_eq!(breaks[0], 5);
    }

    #[test]
    fn test_boundary_similarity() {
        assert!(boundary_lines_similar(&["Page", "3"], &["Page", "14"]));
        assert!(!boundary_lines_similar(&["Page", "3"], &["Chapter", "3"]));
        assert!(!boundary_lines_similar(&["a"], &["a", "b"]));
    }

    #[test]
    fn test_strip_headers_and_footers() {
        let doc = document();
        let stripped = strip_page_furniture(&doc);
        assert!(stripped.iter().all(|l| !l.contains('\u{000C}')));
        assert!(stripped.iter().all(|l| !l.starts_with("Page ")));
        // the first header is only kept because nothing precedes page one
        let headers = stripped
            .iter()
            .filter(|l| l.starts_with("Journal of"))
            .count();
        assert_eq!(headers, 1);
        assert_eq!(stripped.iter().filter(|l| l.starts_with("body")).count(), 18);
    }

    #[test]
    fn test_whitespace_document_unchanged() {
        let doc = vec!["  ".to_string(), "\u{000C}".to_string(), String::new()];
        assert_eq!(strip_page_furniture(&doc), doc);
    }

    #[test]
    fn test_no_page_breaks_unchanged() {
        let doc = vec!["a".to_string(), "b".to_string()];
        assert_eq!(strip_page_furniture(&doc), doc);
    }
}
