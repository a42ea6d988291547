// Key layout of the shared coordination state, namespaced by cluster name

/// Builds every key the scheduler reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            prefix: cluster_name.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Schedule cursor: Unix seconds of the last fully scheduled minute
    pub fn schedule_cursor(&self) -> String {
        format!("{}:cron:scheduled_through", self.prefix)
    }

    /// Leader lock holding the identity of the scheduling process
    pub fn lock(&self) -> String {
        format!("{}:cron:lock", self.prefix)
    }

    pub fn jobs_prefix(&self) -> String {
        format!("{}:cron:jobs:", self.prefix)
    }

    pub fn job(&self, name: &str) -> String {
        format!("{}{}", self.jobs_prefix(), name)
    }

    pub fn pending_list(&self, queue: &str) -> String {
        format!("{}:queue:{}:pending", self.prefix, queue)
    }

    /// Registry key back to cron name; keys outside the registry namespace are
    /// returned unchanged.
    pub fn job_name_from_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.jobs_prefix().as_str()).unwrap_or(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = KeySpace::new("acme");
        assert_eq!(keys.schedule_cursor(), "acme:cron:scheduled_through");
        assert_eq!(keys.lock(), "acme:cron:lock");
        assert_eq!(keys.job("backup"), "acme:cron:jobs:backup");
        assert_eq!(keys.pending_list("common"), "acme:queue:common:pending");
    }

    #[test]
    fn test_job_name_from_key() {
        let keys = KeySpace::new("c1");
        assert_eq!(keys.job_name_from_key("c1:cron:jobs:nightly"), "nightly");
        assert_eq!(keys.job_name_from_key("c1:cron:jobs:a:b"), "a:b");
        assert_eq!(keys.job_name_from_key("other"), "other");
    }
}
