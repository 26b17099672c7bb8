//! Prompt builders for each collaborator role.
//!
//! The wording is opaque to the workflow. What matters is that each prompt
//! names the reply shape it expects: fenced code for the designer and
//! solver, the labeled verdict fields for the reviewer and the labeled
//! decision fields for the manager.

use super::CollaboratorRole;

/// Default system prompt for a role.
pub fn system_prompt(role: CollaboratorRole) -> &'static str {
    match role {
        CollaboratorRole::Designer => {
            "You are an expert in formulating objective functions for numerical optimization problems."
        }
        CollaboratorRole::Solver => {
            "You are an expert in population-based and gradient-free optimization algorithms."
        }
        CollaboratorRole::Reviewer => "You are a meticulous Python code reviewer.",
        CollaboratorRole::Manager => {
            "You are a project manager deciding how an optimization workflow proceeds."
        }
    }
}

fn history_section(title: &str, history: &[String]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = format!("\n## {title}\n");
    for (i, item) in history.iter().enumerate() {
        out.push_str(&format!("\n### Attempt {}\n```python\n{}\n```\n", i + 1, item.trim()));
    }
    out
}

/// Ask the designer for the objective-function fragment.
pub fn designer_prompt(problem: &str, history: &[String]) -> String {
    format!(
        "{role}\n\n## Problem\n{problem}\n{history}\n## Task\n\
         Write the body of `targetfunction(self, x)`: evaluate the decision vector `x` and \
         return a single float to be minimized. Use `self.context` for run parameters. \
         Return only one fenced python code block.",
        role = system_prompt(CollaboratorRole::Designer),
        problem = problem.trim(),
        history = history_section("Previous objective functions", history),
    )
}

/// Ask the solver for the optimization-algorithm fragment.
pub fn solver_prompt(
    problem: &str,
    objective_fragment: &str,
    history: &[String],
    feedback: Option<&str>,
) -> String {
    let feedback = feedback
        .filter(|f| !f.trim().is_empty())
        .map(|f| format!("\n## Feedback on the previous solver\n{}\n", f.trim()))
        .unwrap_or_default();
    format!(
        "{role}\n\n## Problem\n{problem}\n\n## Objective function\n```python\n{objective}\n```\n\
         {history}{feedback}\n## Task\n\
         Write the body of `solve_optimization(self)`. Minimize `self.targetfunction`. You may run \
         several strategies; return a dict mapping each strategy name to a dict holding \
         `objective` (or `error` when that strategy failed). Helper classes are allowed. \
         Return only one fenced python code block.",
        role = system_prompt(CollaboratorRole::Solver),
        problem = problem.trim(),
        objective = objective_fragment.trim(),
        history = history_section("Previous solvers", history),
    )
}

/// Ask the reviewer to inspect (and optionally correct) a complete program.
pub fn reviewer_prompt(problem: &str, program: &str, error_log: Option<&str>) -> String {
    let log = error_log
        .filter(|l| !l.trim().is_empty())
        .unwrap_or("No errors reported.");
    format!(
        "{role}\n\n## Problem\n{problem}\n\n## Program\n```python\n{program}\n```\n\n\
         ## Error log\n{log}\n\n## Reply format\n\
         Reply with exactly these labeled fields and nothing else:\n\
         STATUS: PASS or NEEDS_MODIFICATION\n\
         ANALYSIS: <one paragraph>\n\
         ISSUES: <one issue per line, or none>\n\
         SUGGESTIONS: <one suggestion per line, or none>\n\
         CORRECTED_COMPLETE_CODE: <the full corrected program in a fenced block, or UNCHANGED>",
        role = system_prompt(CollaboratorRole::Reviewer),
        problem = problem.trim(),
        program = program.trim_end(),
        log = log.trim(),
    )
}

/// Ask the manager to classify the latest round.
pub fn manager_prompt(problem: &str, iteration: u32, max_iterations: u32, report: &str) -> String {
    format!(
        "{role}\n\n## Problem\n{problem}\n\n## Round\nIteration {iteration} of {max_iterations}\n\n\
         ## Execution report\n{report}\n\n## Reply format\n\
         Reply with exactly these labeled fields:\n\
         DECISION: TERMINATE_SUCCESS | TERMINATE_FAILURE | NEED_CORRECTION | UPDATE_SOLVER\n\
         REASON: <why>\n\
         NEXT_ACTION: <what happens next>\n\
         FEEDBACK: <guidance for the collaborator that acts next>",
        role = system_prompt(CollaboratorRole::Manager),
        problem = problem.trim(),
        report = report.trim(),
    )
}
