//! Fuzzy tool-name suggestions for unknown-tool errors.

/// Classic two-row Levenshtein distance.
#[must_use]
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// The closest registered name within edit distance 2, if any.
#[must_use]
pub fn closest_match<'a>(name: &str, candidates: &'a [String]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (edit_distance(name, c), c.as_str()))
        .filter(|(d, _)| *d <= 2)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

/// How many registered names an unknown-tool error enumerates before
/// truncating.
const LISTED_NAMES: usize = 5;

/// Build the message for an unknown-tool error.
#[must_use]
pub fn unknown_tool_message(name: &str, registered: &[String]) -> String {
    if registered.is_empty() {
        return format!("Unknown tool '{name}'. No tools are registered.");
    }
    if let Some(best) = closest_match(name, registered) {
        return format!("Unknown tool '{name}'. Did you mean '{best}'?");
    }
    let listed = registered
        .iter()
        .take(LISTED_NAMES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if registered.len() > LISTED_NAMES {
        format!(
            "Unknown tool '{name}'. Available tools: {listed} (and {} more)",
            registered.len() - LISTED_NAMES
        )
    } else {
        format!("Unknown tool '{name}'. Available tools: {listed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_basics() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("add", "add"), 0);
        assert_eq!(edit_distance("ad", "add"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn close_names_are_suggested() {
        let names = vec!["add".to_string(), "subtract".to_string()];
        let msg = unknown_tool_message("ad", &names);
        assert!(msg.contains("Did you mean 'add'?"), "{msg}");
    }

    #[test]
    fn distant_names_are_enumerated() {
        let names = vec!["alpha".to_string(), "beta".to_string()];
        let msg = unknown_tool_message("zzzzzzz", &names);
        assert!(msg.contains("Available tools: alpha, beta"), "{msg}");
    }

    #[test]
    fn long_lists_truncate() {
        let names: Vec<String> = (0..9).map(|i| format!("tool-number-{i}")).collect();
        let msg = unknown_tool_message("qqqqqqqqqq", &names);
        assert!(msg.contains("and 4 more"), "{msg}");
    }

    #[test]
    fn empty_registry_says_so() {
        let msg = unknown_tool_message("anything", &[]);
        assert!(msg.contains("No tools are registered"), "{msg}");
    }
}
