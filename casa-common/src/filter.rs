//! Channel allow-list filter

/// Decides whether a channel is worth storing records from
///
/// An empty allow-list monitors everything. Otherwise a channel is monitored
/// when any entry is a case-insensitive substring of its label.
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    /// Lowercased, non-blank entries
    entries: Vec<String>,
}

impl ChannelFilter {
    pub fn new<I, S>(allow_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = allow_list
            .into_iter()
            .map(|entry| entry.as_ref().trim().to_lowercase())
            .filter(|entry| !entry.is_empty())
            .collect();
        Self { entries }
    }

    /// Filter that monitors every channel
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_monitored(&self, channel_label: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        let label = channel_label.to_lowercase();
        self.entries.iter().any(|entry| label.contains(entry.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_match_is_case_insensitive() {
        let filter = ChannelFilter::new(["Housing"]);
        assert!(filter.is_monitored("Milan Housing Group"));
        assert!(filter.is_monitored("HOUSING"));
        assert!(!filter.is_monitored("Random Chat"));
    }

    #[test]
    fn test_empty_allow_list_monitors_everything() {
        let filter = ChannelFilter::new(Vec::<String>::new());
        assert!(filter.is_monitored("Random Chat"));
        assert!(filter.is_monitored(""));
    }

    #[test]
    fn test_blank_entries_are_ignored() {
        // A lone blank entry would otherwise match every label
        let filter = ChannelFilter::new(["  ", "affitti"]);
        assert!(filter.is_monitored("Affitti Milano"));
        assert!(!filter.is_monitored("Random Chat"));
    }

    #[test]
    fn test_any_entry_may_match() {
        let filter = ChannelFilter::new(["stanze", "housing"]);
        assert!(filter.is_monitored("Stanze in affitto"));
        assert!(filter.is_monitored("Erasmus Housing"));
    }
}
