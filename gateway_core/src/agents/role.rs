//! Fixed role enumeration and the tool scopes each role is allowed to use.

use std::collections::HashSet;

/// A sub-agent's role, each bound to a fixed set of tool scopes. An unknown
/// role name falls back to [`SubAgentRole::Assistant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubAgentRole {
    /// Broad read/write/test access.
    SeniorDev,
    /// Read-only plus security-specific tooling.
    SecurityReviewer,
    /// Read-only plus test execution.
    QaEngineer,
    /// Narrowest role: query-only.
    Assistant,
    /// Read-only plus data analysis tooling.
    DataScientist,
}

impl SubAgentRole {
    /// Parse a human-supplied role name, falling back to `Assistant` for
    /// anything unrecognized.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "senior dev" | "senior_dev" | "seniordev" => SubAgentRole::SeniorDev,
            "security reviewer" | "security_reviewer" | "securityreviewer" => SubAgentRole::SecurityReviewer,
            "qa engineer" | "qa_engineer" | "qaengineer" => SubAgentRole::QaEngineer,
            "data scientist" | "data_scientist" | "datascientist" => SubAgentRole::DataScientist,
            "assistant" => SubAgentRole::Assistant,
            _ => SubAgentRole::Assistant,
        }
    }

    /// Display name, used in lesson tags and prompts.
    pub fn label(self) -> &'static str {
        match self {
            SubAgentRole::SeniorDev => "Senior Dev",
            SubAgentRole::SecurityReviewer => "Security Reviewer",
            SubAgentRole::QaEngineer => "QA Engineer",
            SubAgentRole::Assistant => "Assistant",
            SubAgentRole::DataScientist => "Data Scientist",
        }
    }

    /// The fixed scope-set this role is allowed to invoke tools within.
    pub fn scopes(self) -> HashSet<&'static str> {
        let raw: &[&str] = match self {
            SubAgentRole::SeniorDev => &["fs.read", "fs.write", "shell.test", "rag.query"],
            SubAgentRole::SecurityReviewer => &["fs.read", "rag.query", "security.audit"],
            SubAgentRole::QaEngineer => &["fs.read", "shell.test", "rag.query"],
            SubAgentRole::Assistant => &["rag.query", "memory.search"],
            SubAgentRole::DataScientist => &["fs.read", "rag.query", "data.execute"],
        };
        raw.iter().copied().collect()
    }

    /// Whether this role may invoke a tool requiring `scope`.
    pub fn allows(self, scope: &str) -> bool {
        self.scopes().contains(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_falls_back_to_assistant() {
        assert_eq!(SubAgentRole::parse("wizard"), SubAgentRole::Assistant);
    }

    #[test]
    fn senior_dev_can_write_files() {
        assert!(SubAgentRole::SeniorDev.allows("fs.write"));
        assert!(!SubAgentRole::Assistant.allows("fs.write"));
    }
}
