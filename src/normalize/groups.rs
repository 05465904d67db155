use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::collections::HashSet;

/// `base[index]`: base without `[`, index made of ASCII digits only.
static ARRAY_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\[]+)\[([0-9]+)\]$").expect("Hardcode regex pattern"));

/// Families of indexed columns (`skills[0]`, `skills[1]`, ...) keyed by base name.
///
/// Computed once per table from the first row's columns. Bases keep the order
/// in which they were first seen; each base lists its source columns sorted by
/// numeric index, ties kept in encounter order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArrayColumnGroups {
    groups: Vec<(String, Vec<String>)>,
    members: HashSet<String>,
}

impl ArrayColumnGroups {
    pub fn detect<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut pairs: Vec<(String, Vec<(u64, String)>)> = Vec::new();
        for column in columns {
            let column = column.as_ref();
            let Some((base, index)) = parse_array_column(column) else {
                continue;
            };
            let position = *positions.entry(base.to_owned()).or_insert_with(|| {
                pairs.push((base.to_owned(), Vec::new()));
                pairs.len() - 1
            });
            pairs[position].1.push((index, column.to_owned()));
        }

        let mut members = HashSet::new();
        let groups = pairs
            .into_iter()
            .map(|(base, mut columns)| {
                // stable: duplicate indexes stay in header order
                columns.sort_by_key(|(index, _)| *index);
                let columns: Vec<String> = columns.into_iter().map(|(_, column)| column).collect();
                members.extend(columns.iter().cloned());
                (base, columns)
            })
            .collect();
        ArrayColumnGroups { groups, members }
    }

    /// Ordered source columns of `base`.
    pub fn get(&self, base: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(name, _)| name == base)
            .map(|(_, columns)| columns.as_slice())
    }

    pub fn contains_base(&self, base: &str) -> bool {
        self.groups.iter().any(|(name, _)| name == base)
    }

    /// Whether `column` is a source column of any group.
    pub fn contains_column(&self, column: &str) -> bool {
        self.members.contains(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.groups
            .iter()
            .map(|(base, columns)| (base.as_str(), columns.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Splits `base[index]` into its parts. Indexes too large for `u64` saturate.
fn parse_array_column(column: &str) -> Option<(&str, u64)> {
    let captures = ARRAY_COLUMN.captures(column)?;
    let base = captures.get(1)?.as_str();
    let index = captures.get(2)?.as_str();
    Some((base, index.parse::<u64>().unwrap_or(u64::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_sorts_by_numeric_index() {
        let groups = ArrayColumnGroups::detect(["skills[2]", "name", "skills[10]", "skills[0]", "skills[1]"]);
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups.get("skills").unwrap(),
            &["skills[0]", "skills[1]", "skills[2]", "skills[10]"]
        );
        assert!(groups.contains_column("skills[10]"));
        assert!(!groups.contains_column("name"));
        assert!(!groups.contains_base("name"));
    }

    #[test]
    fn detect_ignores_malformed_columns() {
        let groups = ArrayColumnGroups::detect(["tags[a]", "tags[]", "[0]", "tags[0][1]", "tags[ 1]", "tags[0] "]);
        assert!(groups.is_empty());
    }

    #[test]
    fn detect_keeps_duplicate_indexes_in_encounter_order() {
        let groups = ArrayColumnGroups::detect(["tag[1]", "tag[01]", "tag[0]"]);
        assert_eq!(groups.get("tag").unwrap(), &["tag[0]", "tag[1]", "tag[01]"]);
    }

    #[test]
    fn detect_keeps_bases_in_first_seen_order() {
        let groups = ArrayColumnGroups::detect(["b[0]", "a[0]", "b[1]"]);
        let bases: Vec<&str> = groups.iter().map(|(base, _)| base).collect();
        assert_eq!(bases, vec!["b", "a"]);
    }

    #[test]
    fn parse_array_column_rejects_non_ascii_digits() {
        assert_eq!(parse_array_column("x[٣]"), None);
        assert_eq!(parse_array_column("x[3]"), Some(("x", 3)));
        assert_eq!(parse_array_column("a]b[7]"), Some(("a]b", 7)));
    }
}
