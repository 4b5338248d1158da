use crate::state::{AgentKind, AgentResult};
use std::collections::HashMap;

/// Character budgets for prior-output excerpts threaded into later prompts.
const IMPLEMENT_EXCERPT: usize = 2000;
const DOCS_EXCERPT: usize = 1500;
const DEPLOY_EXCERPT: usize = 1000;

/// Build the prompt for one agent.
///
/// Pure and deterministic: the same description, kind, and prior results
/// always yield a byte-identical string. Prior outputs that are missing
/// substitute the literal `N/A`; unknown agent kinds get a generic
/// template.
pub fn build_prompt(
    description: &str,
    agent: &AgentKind,
    results: &HashMap<AgentKind, AgentResult>,
) -> String {
    match agent {
        AgentKind::Concept => format!(
            "Analyze this development task and provide a clear breakdown:\n\n\
             Task: {description}\n\n\
             Provide:\n\
             1. Clear requirements list\n\
             2. User stories (if applicable)\n\
             3. Acceptance criteria\n\
             4. Scope boundaries\n\n\
             Be concise and actionable."
        ),
        AgentKind::Architect => {
            let concept = prior_output(results, &AgentKind::Concept, None);
            format!(
                "Design the technical architecture for this task:\n\n\
                 Task: {description}\n\n\
                 Previous Analysis:\n{concept}\n\n\
                 Provide:\n\
                 1. Component diagram (text-based)\n\
                 2. Data flow description\n\
                 3. API contracts (if applicable)\n\
                 4. Technology recommendations\n\n\
                 Be specific about implementation details."
            )
        }
        AgentKind::Implement => {
            let architecture = prior_output(results, &AgentKind::Architect, None);
            format!(
                "Generate production-ready code for this task:\n\n\
                 Task: {description}\n\n\
                 Architecture Context:\n{architecture}\n\n\
                 Requirements:\n\
                 - Follow best practices\n\
                 - Include proper error handling\n\
                 - Add necessary type annotations\n\
                 - Make code testable\n\n\
                 Generate complete, working code."
            )
        }
        AgentKind::Test => {
            let code = prior_output(results, &AgentKind::Implement, Some(IMPLEMENT_EXCERPT));
            format!(
                "Create comprehensive tests for this implementation:\n\n\
                 Task: {description}\n\n\
                 Implementation:\n{code}\n\n\
                 Create:\n\
                 1. Unit tests\n\
                 2. Integration tests (if applicable)\n\
                 3. Edge case tests\n\
                 4. Error handling tests"
            )
        }
        AgentKind::Review => {
            let code = prior_output(results, &AgentKind::Implement, Some(IMPLEMENT_EXCERPT));
            format!(
                "Review this code for quality and best practices:\n\n\
                 Task: {description}\n\n\
                 Code to Review:\n{code}\n\n\
                 Check for:\n\
                 1. Code quality issues\n\
                 2. Performance concerns\n\
                 3. Security vulnerabilities\n\
                 4. Best practice violations\n\n\
                 Provide actionable feedback."
            )
        }
        AgentKind::Security => {
            let code = prior_output(results, &AgentKind::Implement, Some(IMPLEMENT_EXCERPT));
            format!(
                "Perform a security audit on this implementation:\n\n\
                 Task: {description}\n\n\
                 Code to Audit:\n{code}\n\n\
                 Check for:\n\
                 1. OWASP Top 10 vulnerabilities\n\
                 2. Input validation issues\n\
                 3. Authentication/Authorization flaws\n\
                 4. Data exposure risks"
            )
        }
        AgentKind::Optimize => {
            let code = prior_output(results, &AgentKind::Implement, Some(IMPLEMENT_EXCERPT));
            format!(
                "Optimize this code for performance:\n\n\
                 Task: {description}\n\n\
                 Code to Optimize:\n{code}\n\n\
                 Focus on:\n\
                 1. Algorithm efficiency\n\
                 2. Memory usage\n\
                 3. Database queries (if applicable)\n\
                 4. Caching opportunities"
            )
        }
        AgentKind::Docs => {
            let code = prior_output(results, &AgentKind::Implement, Some(DOCS_EXCERPT));
            format!(
                "Generate documentation for this implementation:\n\n\
                 Task: {description}\n\n\
                 Code:\n{code}\n\n\
                 Create:\n\
                 1. Function/method documentation\n\
                 2. Usage examples\n\
                 3. API documentation (if applicable)\n\
                 4. README content"
            )
        }
        AgentKind::Deploy => {
            let code = prior_output(results, &AgentKind::Implement, Some(DEPLOY_EXCERPT));
            format!(
                "Create deployment configuration for this implementation:\n\n\
                 Task: {description}\n\n\
                 Implementation Context:\n{code}\n\n\
                 Provide:\n\
                 1. Docker configuration (if applicable)\n\
                 2. CI/CD pipeline steps\n\
                 3. Environment variables needed\n\
                 4. Deployment checklist"
            )
        }
        AgentKind::Other(kind) => format!("Execute the {kind} task for: {description}"),
    }
}

/// A prior agent's output, optionally truncated, or `N/A` when absent.
fn prior_output<'a>(
    results: &'a HashMap<AgentKind, AgentResult>,
    kind: &AgentKind,
    max_chars: Option<usize>,
) -> &'a str {
    let output = match results.get(kind) {
        Some(result) => result.output.as_str(),
        None => return "N/A",
    };
    match max_chars {
        Some(limit) => truncate_chars(output, limit),
        None => output,
    }
}

/// Truncate to at most `max_chars` characters without splitting a code
/// point.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn results_with(entries: &[(AgentKind, &str)]) -> HashMap<AgentKind, AgentResult> {
        entries
            .iter()
            .map(|(kind, output)| {
                (
                    kind.clone(),
                    AgentResult {
                        output: (*output).to_string(),
                        tokens: 10,
                        cost: 0.0,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_concept_prompt_has_task() {
        let prompt = build_prompt("Build a CLI", &AgentKind::Concept, &HashMap::new());
        assert!(prompt.contains("Task: Build a CLI"));
        assert!(prompt.contains("Acceptance criteria"));
    }

    #[test]
    fn test_architect_threads_concept_output() {
        let results = results_with(&[(AgentKind::Concept, "Two requirements.")]);
        let prompt = build_prompt("Build a CLI", &AgentKind::Architect, &results);
        assert!(prompt.contains("Previous Analysis:\nTwo requirements."));
    }

    #[test]
    fn test_missing_prior_substitutes_na() {
        let prompt = build_prompt("Build a CLI", &AgentKind::Architect, &HashMap::new());
        assert!(prompt.contains("Previous Analysis:\nN/A"));

        let prompt = build_prompt("Build a CLI", &AgentKind::Test, &HashMap::new());
        assert!(prompt.contains("Implementation:\nN/A"));
    }

    #[test]
    fn test_review_truncates_implement_output() {
        let long_output = "x".repeat(5000);
        let results = results_with(&[(AgentKind::Implement, long_output.as_str())]);
        let prompt = build_prompt("Task", &AgentKind::Review, &results);
        assert!(prompt.contains(&"x".repeat(2000)));
        assert!(!prompt.contains(&"x".repeat(2001)));
    }

    #[test]
    fn test_deploy_uses_tighter_excerpt_than_docs() {
        let long_output = "y".repeat(5000);
        let results = results_with(&[(AgentKind::Implement, long_output.as_str())]);

        let docs = build_prompt("Task", &AgentKind::Docs, &results);
        assert!(docs.contains(&"y".repeat(1500)));
        assert!(!docs.contains(&"y".repeat(1501)));

        let deploy = build_prompt("Task", &AgentKind::Deploy, &results);
        assert!(deploy.contains(&"y".repeat(1000)));
        assert!(!deploy.contains(&"y".repeat(1001)));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // Multi-byte chars; a byte-indexed slice could split a code point.
        let multibyte = "héllo wörld ünïcode".repeat(200);
        assert_eq!(truncate_chars(&multibyte, 7).chars().count(), 7);

        let results = results_with(&[(AgentKind::Implement, multibyte.as_str())]);
        let prompt = build_prompt("Task", &AgentKind::Test, &results);
        assert!(!prompt.is_empty());
    }

    #[test]
    fn test_unknown_kind_generic_template() {
        let kind = AgentKind::from("migrate");
        let prompt = build_prompt("Move the database", &kind, &HashMap::new());
        assert_eq!(prompt, "Execute the migrate task for: Move the database");
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let results = results_with(&[
            (AgentKind::Concept, "analysis"),
            (AgentKind::Implement, "code"),
        ]);
        let a = build_prompt("Task", &AgentKind::Review, &results);
        let b = build_prompt("Task", &AgentKind::Review, &results);
        assert_eq!(a, b);
    }
}
