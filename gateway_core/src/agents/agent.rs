//! The `SubAgent` record itself: identity, role, plan, and run history.

use crate::agents::role::SubAgentRole;

/// One exchange recorded in an agent's run history: what was sent to the
/// model and what came back.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Text sent to the model for this step.
    pub prompt: String,
    /// Model's response for this step.
    pub response: String,
}

/// A spawned sub-agent. Constructed by the coordinator but not reachable
/// through its agent table until pre-flight validation succeeds.
#[derive(Debug, Clone)]
pub struct SubAgent {
    /// Unique name within the coordinator's agent table.
    pub name: String,
    /// Validated role (unknown input names already folded to `Assistant`).
    pub role: SubAgentRole,
    /// The task description the agent was spawned to pursue.
    pub task: String,
    /// Ordered plan steps, populated by `generate_plan`.
    pub plan: Vec<String>,
    /// Accumulated prompt/response history from `run()`.
    pub history: Vec<HistoryEntry>,
    /// Step budget for the executor loop.
    pub max_steps: u32,
    /// Whether the agent passed pre-flight validation and is live.
    pub active: bool,
    /// Whether the coordinator owns this agent's lifecycle (always true for
    /// agents created via `spawn`; kept distinct from `active` so a future
    /// caller could register an externally-managed agent without it being
    /// eligible for pre-flight bypass).
    pub managed: bool,
}

impl SubAgent {
    /// Construct an unregistered, inactive agent. The coordinator must call
    /// `generate_plan` and run pre-flight validation before marking it
    /// active.
    pub fn new(name: impl Into<String>, role: SubAgentRole, task: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            task: task.into(),
            plan: Vec::new(),
            history: Vec::new(),
            max_steps: 5,
            active: false,
            managed: false,
        }
    }

    /// Parse a numbered or bulleted plan out of a raw LLM response, one
    /// step per non-empty line with its leading marker stripped.
    pub fn generate_plan(&mut self, raw_plan: &str) {
        self.plan = raw_plan
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Self::strip_marker)
            .collect();
    }

    fn strip_marker(line: &str) -> String {
        let without_bullet = line.trim_start_matches(['-', '*', '•']).trim();
        match without_bullet.split_once('.') {
            Some((prefix, rest)) if prefix.chars().all(|c| c.is_ascii_digit()) && !prefix.is_empty() => {
                rest.trim().to_string()
            }
            _ => without_bullet.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_plan_strips_numbering_and_bullets() {
        let mut agent = SubAgent::new("a1", SubAgentRole::Assistant, "task");
        agent.generate_plan("1. Read the file\n- Check for secrets\n\n3. Report findings");
        assert_eq!(
            agent.plan,
            vec!["Read the file", "Check for secrets", "Report findings"]
        );
    }
}
