//! Text rendering utilities for human-friendly diagnostics.
//!
//! Provides helpers to format resolution paths, candidate lists,
//! type names and "did you mean?" suggestions in error output.

use std::fmt::Write as _;

/// Renders a resolution path as a readable string.
///
/// # Examples
/// ```
/// use warden_support::rendering::render_chain;
///
/// let chain = vec!["UserService", "UserRepo", "Database", "UserService"];
/// let rendered = render_chain(&chain);
/// assert_eq!(rendered, "UserService -> UserRepo -> Database -> UserService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A candidate definition listed in an ambiguity report.
#[derive(Debug)]
pub struct CandidateEntry {
    /// Display identity of the definition (`ShortName@qualifier`).
    pub identity: String,
    /// Whether the definition is flagged primary.
    pub primary: bool,
}

/// Renders candidate definitions one per line, marking primaries.
///
/// ```text
///   - CardPayment
///   - CashPayment@cash [primary]
/// ```
pub fn render_candidates(entries: &[CandidateEntry]) -> String {
    let mut result = String::new();

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            result.push('\n');
        }
        let _ = write!(result, "  - {}", entry.identity);
        if entry.primary {
            result.push_str(" [primary]");
        }
    }

    result
}

/// Shortens a fully qualified type name for display by keeping the last
/// path segment of every type mentioned in it.
///
/// ```
/// use warden_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::services::user::UserService");
/// assert_eq!(short, "UserService");
///
/// let short = shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>");
/// assert_eq!(short, "Arc<dyn Logger>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut short = String::with_capacity(full_name.len());
    let mut token_start = 0;
    for (at, ch) in full_name.char_indices() {
        if matches!(ch, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';') {
            short.push_str(last_segment(&full_name[token_start..at]));
            short.push(ch);
            token_start = at + ch.len_utf8();
        }
    }
    short.push_str(last_segment(&full_name[token_start..]));
    short
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Names from `available` close to `requested`, closest first.
///
/// Names are compared case-insensitively. A name containing the requested
/// one is a perfect match; otherwise the edit distance must stay within a third of
/// the requested name's length (at least two edits). Ties keep the order
/// of `available`.
///
/// ```
/// use warden_support::rendering::suggest_similar;
///
/// let available = ["CardPayment", "Catalog", "dyn Payment"];
/// assert_eq!(suggest_similar("Payment", &available, 3), ["CardPayment", "dyn Payment"]);
/// ```
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let wanted = requested.to_lowercase();
    let budget = (wanted.chars().count() / 3).max(2);

    let mut scored: Vec<(usize, &str)> = available
        .iter()
        .filter(|&&name| name != requested)
        .filter_map(|&name| {
            let candidate = name.to_lowercase();
            let distance = if candidate.contains(&wanted) {
                0
            } else {
                edit_distance(&wanted, &candidate)
            };
            (distance <= budget).then_some((distance, name))
        })
        .collect();

    scored.sort_by_key(|&(distance, _)| distance);
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(_, name)| name.to_owned())
        .collect()
}

/// Levenshtein distance over chars, one row at a time.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_simple_chain() {
        let chain = vec!["A", "B", "A"];
        assert_eq!(render_chain(&chain), "A -> B -> A");
    }

    #[test]
    fn render_single_element_chain() {
        let chain = vec!["A"];
        assert_eq!(render_chain(&chain), "A");
    }

    #[test]
    fn render_empty_chain() {
        let chain: Vec<&str> = vec![];
        assert_eq!(render_chain(&chain), "");
    }

    #[test]
    fn shorten_keeps_last_segments() {
        assert_eq!(shorten_type_name("my_app::services::UserService"), "UserService");
        assert_eq!(shorten_type_name("Payment"), "Payment");
        assert_eq!(
            shorten_type_name("core::option::Option<(my_app::A, &my_app::B)>"),
            "Option<(A, &B)>"
        );
    }

    #[test]
    fn suggestions_tolerate_typos() {
        let available = ["Billing", "Orders", "OrderService", "dyn Logger"];
        assert_eq!(suggest_similar("OrderServise", &available, 3), ["OrderService"]);
        assert_eq!(suggest_similar("Logger", &available, 3), ["dyn Logger"]);
    }

    #[test]
    fn suggestions_are_ranked_and_capped() {
        let available = ["Ordering", "Orders", "Order"];
        assert_eq!(suggest_similar("Order", &available, 2), ["Ordering", "Orders"]);
    }

    #[test]
    fn suggestions_skip_exact_and_distant_names() {
        let available = ["Database"];
        assert!(suggest_similar("Database", &available, 3).is_empty());
        assert!(suggest_similar("XyzAbcDef", &available, 3).is_empty());
    }

    #[test]
    fn candidates_mark_primary() {
        let entries = vec![
            CandidateEntry {
                identity: "CardPayment".to_string(),
                primary: false,
            },
            CandidateEntry {
                identity: "CashPayment@cash".to_string(),
                primary: true,
            },
        ];

        let rendered = render_candidates(&entries);
        assert_eq!(rendered, "  - CardPayment\n  - CashPayment@cash [primary]");
    }
}
