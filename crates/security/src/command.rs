//! Blocked-pattern matching for shell commands.
//!
//! Matching is a case-insensitive substring test after collapsing runs of
//! whitespace. It is coarse on purpose and catches accidents, not adversaries:
//! `r""m -rf` or a base64-encoded payload will pass.

/// A list of substring patterns a command must not contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPolicy {
    patterns: Vec<String>,
}

impl CommandPolicy {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    /// The first pattern `command` contains, if any.
    pub fn find_blocked(&self, command: &str) -> Option<&str> {
        let normalized = normalize(command);
        self.patterns
            .iter()
            .find(|p| normalized.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn is_blocked(&self, command: &str) -> bool {
        self.find_blocked(command).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_match() {
        let policy = CommandPolicy::new(["rm -rf", "mkfs"]);
        assert_eq!(policy.find_blocked("sudo rm -rf /var/log"), Some("rm -rf"));
        assert!(policy.is_blocked("mkfs.ext4 /dev/sda1"));
        assert!(!policy.is_blocked("df -h"));
    }

    #[test]
    fn whitespace_and_case_are_normalized() {
        let policy = CommandPolicy::new(["rm -rf"]);
        assert!(policy.is_blocked("RM   -RF /tmp/x"));
        assert!(policy.is_blocked("rm\t-rf x"));
    }

    #[test]
    fn empty_patterns_are_ignored() {
        let policy = CommandPolicy::new(["", "   "]);
        assert!(policy.is_empty());
        assert!(!policy.is_blocked("anything"));
    }

    #[test]
    fn empty_policy_blocks_nothing() {
        let policy = CommandPolicy::default();
        assert!(!policy.is_blocked("rm -rf /"));
    }
}
