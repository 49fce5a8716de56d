//! MQTT 3.1.1 topic filter validity and matching rules, grounded on
//! `components/DataModel/DataModelElement.cpp` and
//! `DataModelRoot.cpp`'s `checkTopicFilterValidity`.

pub const LEVEL_SEPARATOR: char = '/';
pub const MULTI_LEVEL_WILDCARD: char = '#';
pub const SINGLE_LEVEL_WILDCARD: char = '+';

/// A node name must not contain any of the three reserved characters.
pub fn is_valid_node_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(LEVEL_SEPARATOR)
        && !name.contains(MULTI_LEVEL_WILDCARD)
        && !name.contains(SINGLE_LEVEL_WILDCARD)
}

/// Validates a topic filter per MQTT 3.1.1: `#` must be the sole character
/// of its level and must be the final level; `+` must occupy a whole level
/// but can appear at any level. Ported from
/// `DataModelRoot::checkTopicFilterValidity`.
pub fn is_valid_topic_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }

    let chars: Vec<char> = filter.chars().collect();
    for (pos, &c) in chars.iter().enumerate() {
        let previous = if pos == 0 { None } else { Some(chars[pos - 1]) };
        let next = chars.get(pos + 1).copied();

        match c {
            MULTI_LEVEL_WILDCARD => {
                let previous_ok = previous.is_none() || previous == Some(LEVEL_SEPARATOR);
                return previous_ok && next.is_none();
            }
            SINGLE_LEVEL_WILDCARD => {
                if previous.is_some() && previous != Some(LEVEL_SEPARATOR) {
                    return false;
                }
                if next.is_some() && next != Some(LEVEL_SEPARATOR) {
                    return false;
                }
            }
            LEVEL_SEPARATOR => {
                if previous == Some(LEVEL_SEPARATOR) {
                    return false;
                }
            }
            _ => {}
        }
    }

    true
}

pub fn is_multi_level_wildcard(filter: &str) -> bool {
    filter == "#"
}

/// Whole-topic match of a concrete topic (e.g. `"gps/time"`) against a
/// filter (e.g. `"gps/+"` or `"#"`), applying the `$`-prefix exclusion for
/// wildcards at the root level.
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    if !is_valid_topic_filter(filter) {
        return false;
    }

    let topic_levels: Vec<&str> = if topic.is_empty() { Vec::new() } else { topic.split(LEVEL_SEPARATOR).collect() };
    let filter_levels: Vec<&str> = filter.split(LEVEL_SEPARATOR).collect();

    if let Some(first_topic_level) = topic_levels.first() {
        if first_topic_level.starts_with('$') {
            let first_filter_level = filter_levels[0];
            if first_filter_level == "#" || first_filter_level == "+" {
                return false;
            }
        }
    }

    match_levels(&topic_levels, &filter_levels)
}

fn match_levels(topic_levels: &[&str], filter_levels: &[&str]) -> bool {
    match filter_levels.first() {
        None => topic_levels.is_empty(),
        Some(&MULTI_LEVEL_WILDCARD_STR) => true,
        Some(&level) => {
            if level == "+" {
                match topic_levels.split_first() {
                    Some((_, rest)) => match_levels(rest, &filter_levels[1..]),
                    None => false,
                }
            } else {
                match topic_levels.split_first() {
                    Some((first, rest)) if *first == level => match_levels(rest, &filter_levels[1..]),
                    _ => false,
                }
            }
        }
    }
}

const MULTI_LEVEL_WILDCARD_STR: &str = "#";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity() {
        assert!(is_valid_topic_filter("a/b/c"));
        assert!(is_valid_topic_filter("a/+/c"));
        assert!(is_valid_topic_filter("a/#"));
        assert!(is_valid_topic_filter("#"));
        assert!(is_valid_topic_filter("+"));
        assert!(!is_valid_topic_filter(""));
        assert!(!is_valid_topic_filter("a/#/b"));
        assert!(!is_valid_topic_filter("a/b#"));
        assert!(!is_valid_topic_filter("a+/b"));
        assert!(!is_valid_topic_filter("a//b"));
    }

    #[test]
    fn matching() {
        assert!(topic_matches_filter("gps/time", "gps/time"));
        assert!(topic_matches_filter("gps/time", "gps/+"));
        assert!(topic_matches_filter("gps/time", "#"));
        assert!(topic_matches_filter("gps/time", "gps/#"));
        assert!(!topic_matches_filter("gps/time", "wind/+"));
        assert!(!topic_matches_filter("gps", "gps/+"));
    }

    #[test]
    fn dollar_topics_excluded_from_root_wildcards() {
        assert!(!topic_matches_filter("$sys/uptime", "#"));
        assert!(!topic_matches_filter("$sys/uptime", "+/uptime"));
        assert!(topic_matches_filter("$sys/uptime", "$sys/#"));
        assert!(topic_matches_filter("$sys/uptime", "$sys/uptime"));
    }

    #[test]
    fn equivalent_filters_match_same_leaves() {
        let topics = ["gps/time", "gps/lat", "wind/apparent/angle"];
        let f1 = "gps/+";
        let f2 = "gps/+"; // trivially equal, but exercise via distinct constructed strings
        let f2 = f2.to_string();
        for t in topics {
            assert_eq!(topic_matches_filter(t, f1), topic_matches_filter(t, &f2));
        }
    }
}
