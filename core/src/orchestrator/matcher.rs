use regex::Regex;

/// Task-type predicate built from a config string.
///
/// - `*` matches everything
/// - `code,docs` matches any listed type exactly
/// - `deploy*` matches by prefix
/// - `re:^test-(unit|e2e)$` matches a regex
#[derive(Debug, Clone)]
pub enum TaskTypeMatcher {
    Any,
    Exact(Vec<String>),
    Prefix(String),
    Pattern(Regex),
}

impl TaskTypeMatcher {
    pub fn parse(raw: &str) -> Result<Self, regex::Error> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" {
            return Ok(Self::Any);
        }
        if let Some(pattern) = raw.strip_prefix("re:") {
            return Regex::new(pattern).map(Self::Pattern);
        }
        if let Some(prefix) = raw.strip_suffix('*') {
            if !prefix.contains(',') {
                return Ok(Self::Prefix(prefix.to_string()));
            }
        }
        Ok(Self::Exact(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }

    /// One matcher per entry; matches when any entry does.
    pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Self>, regex::Error> {
        raw.iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    pub fn matches(&self, task_type: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(types) => types.iter().any(|t| t == task_type),
            Self::Prefix(prefix) => task_type.starts_with(prefix.as_str()),
            Self::Pattern(re) => re.is_match(task_type),
        }
    }
}
