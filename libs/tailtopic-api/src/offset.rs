use std::str::FromStr;

/// Where a newly opened partition stream starts reading.
/// Fixed for the lifetime of one consume invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetPolicy {
    /// Oldest retained message.
    Earliest,
    /// Only messages produced from now on.
    #[default]
    Latest,
}

impl FromStr for OffsetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earliest" => Ok(OffsetPolicy::Earliest),
            "latest" => Ok(OffsetPolicy::Latest),
            other => Err(format!(
                "unknown offset policy '{other}' (expected 'earliest' or 'latest')"
            )),
        }
    }
}

impl std::fmt::Display for OffsetPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OffsetPolicy::Earliest => write!(f, "earliest"),
            OffsetPolicy::Latest => write!(f, "latest"),
        }
    }
}
