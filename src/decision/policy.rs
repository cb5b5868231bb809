//! Decision policy.
//!
//! Pure functions: one turns a context snapshot into a prompt, the other
//! turns the service's reply into a [`Decision`]. Neither touches the
//! network or the scheduler.

use crate::capabilities::Capability;
use crate::scheduler::history::ActionEntry;
use crate::scheduler::tasks::truncate_chars;
use chrono::{DateTime, Utc};

/// Replies this short (after trimming) are treated as "nothing".
const MIN_ACTION_CHARS: usize = 10;

const MAX_RATIONALE_CHARS: usize = 200;

/// Everything the decision prompt is built from.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    /// Time of the cycle.
    pub now: DateTime<Utc>,
    /// Recent history, oldest first.
    pub recent: Vec<ActionEntry>,
    /// Capabilities currently on.
    pub capabilities: Vec<Capability>,
    /// `(id, name)` of every enabled task.
    pub tasks: Vec<(String, String)>,
}

/// What the loop should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposedAction {
    /// Trigger the registered task with this id.
    RunTask(String),
    /// Record a free-form action.
    Note(String),
    /// Nothing urgent.
    Nothing,
}

/// A proposed action plus the reply it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// The action.
    pub action: ProposedAction,
    /// Reply text, truncated.
    pub rationale: String,
}

/// Build the decision prompt for `ctx`.
pub fn build_prompt(ctx: &DecisionContext) -> String {
    let recent = if ctx.recent.is_empty() {
        "  (none yet)".to_owned()
    } else {
        ctx.recent
            .iter()
            .map(|e| format!("  - {} ({}): {}", e.actor, e.outcome, e.summary))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let capabilities = if ctx.capabilities.is_empty() {
        "  (none)".to_owned()
    } else {
        ctx.capabilities
            .iter()
            .map(|c| format!("  - {c}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let tasks = ctx
        .tasks
        .iter()
        .map(|(id, name)| format!("  - {id}: {name}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an autonomous background agent. You can take actions on your own initiative.\n\n\
         Recent actions you've taken:\n{recent}\n\n\
         Enabled capabilities:\n{capabilities}\n\n\
         Tasks you can run right now:\n{tasks}\n\n\
         Current time: {}\n\n\
         Think about what would be valuable to do right now. Reply with exactly one line:\n\
         - RUN <task_id> to run one of the tasks above now\n\
         - NOTHING if you should wait\n\
         - otherwise one short sentence describing another action",
        ctx.now.format("%Y-%m-%d %H:%M UTC")
    )
}

/// Interpret a reply against the `(id, name)` list of runnable tasks.
///
/// `RUN <id>` naming a known task triggers it. A reply mentioning "nothing"
/// or too short to describe an action means nothing. Anything else is
/// recorded as a note.
pub fn interpret(reply: &str, tasks: &[(String, String)]) -> Decision {
    let reply = reply.trim();
    let rationale = truncate_chars(reply, MAX_RATIONALE_CHARS);
    let first_line = reply.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");

    if let Some(target) = run_target(first_line) {
        if let Some((id, _)) = tasks.iter().find(|(id, _)| id.eq_ignore_ascii_case(target)) {
            return Decision {
                action: ProposedAction::RunTask(id.clone()),
                rationale,
            };
        }
    }

    let lower = reply.to_lowercase();
    let action = if lower.contains("nothing") || reply.chars().count() <= MIN_ACTION_CHARS {
        ProposedAction::Nothing
    } else {
        ProposedAction::Note(truncate_chars(first_line, MAX_RATIONALE_CHARS))
    };
    Decision { action, rationale }
}

/// Task id named by a `RUN <id>` line.
fn run_target(line: &str) -> Option<&str> {
    let head = line.get(..3)?;
    if !head.eq_ignore_ascii_case("run") {
        return None;
    }
    let rest = &line[3..];
    if !rest.starts_with([' ', ':', '\t']) {
        return None;
    }
    let token = rest
        .trim_start_matches([' ', ':', '\t'])
        .split_whitespace()
        .next()?;
    let token = token.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'));
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::scheduler::history::ActionOutcome;

    fn tasks() -> Vec<(String, String)> {
        vec![
            ("research_topics".to_owned(), "Research Topics".to_owned()),
            ("self_test".to_owned(), "Self Test".to_owned()),
        ]
    }

    #[test]
    fn run_line_maps_to_known_task() {
        let d = interpret("RUN self_test\nbecause it has been a while", &tasks());
        assert_eq!(d.action, ProposedAction::RunTask("self_test".to_owned()));

        let d = interpret("run: `research_topics`.", &tasks());
        assert_eq!(d.action, ProposedAction::RunTask("research_topics".to_owned()));
    }

    #[test]
    fn unknown_task_becomes_note() {
        let d = interpret("RUN launch_rockets immediately", &tasks());
        assert_eq!(
            d.action,
            ProposedAction::Note("RUN launch_rockets immediately".to_owned())
        );
    }

    #[test]
    fn nothing_and_short_replies_mean_nothing() {
        assert_eq!(interpret("NOTHING", &tasks()).action, ProposedAction::Nothing);
        assert_eq!(
            interpret("There is nothing worth doing right now.", &tasks()).action,
            ProposedAction::Nothing
        );
        assert_eq!(interpret("ok sure", &tasks()).action, ProposedAction::Nothing);
        assert_eq!(interpret("", &tasks()).action, ProposedAction::Nothing);
    }

    #[test]
    fn free_text_becomes_note() {
        let d = interpret("Summarise what I learned about Rust this week.", &tasks());
        assert!(matches!(d.action, ProposedAction::Note(ref s) if s.starts_with("Summarise")));
    }

    #[test]
    fn running_is_not_a_run_command() {
        let d = interpret("Running diagnostics would be useful today.", &tasks());
        assert!(matches!(d.action, ProposedAction::Note(_)));
    }

    #[test]
    fn prompt_lists_context() {
        let ctx = DecisionContext {
            now: Utc::now(),
            recent: vec![ActionEntry::new("self_test", ActionOutcome::Success, "3/3 passed")],
            capabilities: vec![Capability::Research],
            tasks: tasks(),
        };
        let prompt = build_prompt(&ctx);
        assert!(prompt.contains("self_test (success): 3/3 passed"));
        assert!(prompt.contains("  - research\n"));
        assert!(prompt.contains("research_topics: Research Topics"));
        assert!(prompt.contains("RUN <task_id>"));
    }
}
