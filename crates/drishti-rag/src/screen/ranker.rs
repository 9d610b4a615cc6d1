//! OCR context ranker.
//!
//! Raw screen OCR output is long, repetitive, and often layout-garbled;
//! feeding it into a prompt unranked wastes context budget and buries the
//! one relevant line among UI chrome. This module compresses it to a compact,
//! query-relevant snippet.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::config::ScreenRankerSettings;

/// Lines shorter than this are OCR noise.
const MIN_LINE_CHARS: usize = 3;

static FILE_EXTENSION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)\.(pdf|docx?|txt|md|csv|json|xlsx?|pptx?|png|jpe?g|html?|rs|py|js|ts|toml|yaml|yml)\b",
    )
    .expect("file extension regex is valid")
});

/// Compress raw OCR text into a query-relevant snippet bounded by the
/// configured character budget.
pub fn rank_screen_text(raw: &str, query: &str, settings: &ScreenRankerSettings) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let candidates = segment(raw, settings.window_width);
    let candidates: Vec<&str> = candidates
        .iter()
        .map(|l| l.as_str())
        .filter(|l| l.chars().count() >= MIN_LINE_CHARS)
        .collect();
    if candidates.is_empty() {
        return String::new();
    }

    let term_freq = query_term_frequencies(query);

    let mut scored: Vec<(i64, &str)> = candidates
        .iter()
        .map(|&line| (score_line(line, &term_freq), line))
        .collect();
    // Stable sort keeps on-screen order among equally scored lines.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let selected: Vec<&str> = if scored.first().map(|(s, _)| *s > 0).unwrap_or(false) {
        scored
            .iter()
            .filter(|(s, _)| *s > 0)
            .take(settings.max_lines)
            .map(|(_, l)| *l)
            .collect()
    } else {
        // Nothing matched the query keywords. Visible unscored content may
        // still be the answer, so fall back to the first raw lines.
        candidates.iter().take(settings.max_lines).copied().collect()
    };

    assemble(&selected, settings.char_budget)
}

/// Split into candidate lines. Single-line input of non-trivial length gets
/// re-segmented into fixed-width windows — some OCR engines return one giant
/// run-on line with no breaks at all.
fn segment(raw: &str, window_width: usize) -> Vec<String> {
    let lines: Vec<String> = raw
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    if lines.len() > 1 {
        return lines;
    }

    let collapsed: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= window_width {
        return lines;
    }

    tracing::debug!(
        chars = collapsed.chars().count(),
        window = window_width,
        "Re-segmenting run-on OCR line into fixed-width windows"
    );

    let chars: Vec<char> = collapsed.chars().collect();
    chars
        .chunks(window_width)
        .map(|w| w.iter().collect::<String>().trim().to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn query_term_frequencies(query: &str) -> HashMap<String, i64> {
    let mut freq = HashMap::new();
    for token in query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
    {
        *freq.entry(token.to_string()).or_insert(0) += 1;
    }
    freq
}

fn score_line(line: &str, term_freq: &HashMap<String, i64>) -> i64 {
    let lower = line.to_lowercase();
    let mut score = 0i64;

    for (term, freq) in term_freq {
        let occurrences = lower.matches(term.as_str()).count() as i64;
        score += 3 * occurrences * freq;
    }

    // Prefer prose over symbol noise.
    let total = line.chars().count();
    if total > 0 {
        let alnum = line.chars().filter(|c| c.is_alphanumeric()).count();
        if alnum as f32 / total as f32 > 0.55 {
            score += 1;
        }
    }

    // A filename on screen is a weak but real signal: it often names the
    // open document or tab the user is asking about.
    if FILE_EXTENSION_RE.is_match(line) {
        score += 1;
    }

    score
}

fn assemble(lines: &[&str], char_budget: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for line in lines {
        let sep = usize::from(!out.is_empty());
        let line_chars = line.chars().count();

        if used + sep + line_chars <= char_budget {
            if sep == 1 {
                out.push('\n');
            }
            out.push_str(line);
            used += sep + line_chars;
        } else {
            let remaining = char_budget.saturating_sub(used + sep);
            if remaining >= MIN_LINE_CHARS {
                if sep == 1 {
                    out.push('\n');
                }
                out.extend(line.chars().take(remaining));
            }
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ScreenRankerSettings {
        ScreenRankerSettings {
            char_budget: 1400,
            window_width: 220,
            max_lines: 18,
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(rank_screen_text("", "anything", &settings()), "");
        assert_eq!(rank_screen_text("   \n  ", "anything", &settings()), "");
    }

    #[test]
    fn run_on_line_is_segmented_into_windows() {
        let word = "invoice ";
        let raw = word.repeat(400); // ~3200 chars, no newlines
        let out = rank_screen_text(&raw, "invoice total", &settings());

        assert!(!out.is_empty());
        assert!(out.lines().count() > 1, "expected multiple windows, got one blob");
        assert!(out.chars().count() <= 1400);
    }

    #[test]
    fn query_relevant_line_ranks_first() {
        let raw = "File Edit View Help\n\
                   Battery 84% 14:32\n\
                   The quarterly revenue grew by 12 percent compared to last year\n\
                   □ ▸ ⚙ ✕";
        let out = rank_screen_text(raw, "what was the revenue growth", &settings());
        assert!(out.starts_with("The quarterly revenue grew"));
    }

    #[test]
    fn no_keyword_match_falls_back_to_raw_lines() {
        // All symbols: no keyword hits, no alphanumeric bonus, no filenames.
        let raw = "∆∆ ∆∆ ∆∆∆\n□ □ □ ▸ ▸\n✕ ✕ ✕ ⚙ ⚙";
        let out = rank_screen_text(raw, "zzzzz qqqqq", &settings());
        // Nothing scores above zero, yet visible content is still returned.
        assert!(out.contains("∆∆ ∆∆ ∆∆∆"));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn tiny_noise_lines_are_dropped() {
        let raw = "x\n..\nok then this is a real sentence about shipping dates";
        let out = rank_screen_text(raw, "shipping dates", &settings());
        assert!(!out.contains("x\n"));
        assert!(out.contains("shipping dates"));
    }

    #[test]
    fn output_respects_char_budget() {
        let mut tight = settings();
        tight.char_budget = 50;
        tight.window_width = 40;
        let raw = "connection timeout while loading dashboard\n".repeat(30);
        let out = rank_screen_text(&raw, "dashboard timeout", &tight);
        assert!(out.chars().count() <= 50);
        assert!(!out.is_empty());
    }

    #[test]
    fn filename_lines_get_a_boost() {
        let raw = "some generic text here about nothing much\n\
                   report_q3.pdf - Adobe Acrobat";
        let out = rank_screen_text(raw, "which file is open", &settings());
        assert!(out.lines().next().unwrap().contains("report_q3.pdf"));
    }
}
