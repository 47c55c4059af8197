//! Prompt layout for rule validation

use std::fmt::Write;

use crate::git::Change;
use crate::rules::TaskRules;

/// Answer format the response parser expects
const RESPONSE_FORMAT: &str = r#"{
  "analysis": [
    {
      "ruleId": "string",
      "implemented": boolean,
      "confidence": number,
      "evidence": "where in the changes the implementation was found",
      "suggestion": "what is still missing, if not implemented"
    }
  ],
  "overallCompleteness": number,
  "generalSuggestions": ["general suggestions"],
  "summary": "short summary of the analysis"
}"#;

/// Build the validation prompt for a task, its branch and its changes
pub fn build_validation_prompt(rules: &TaskRules, branch_name: &str, changes: &[Change]) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are an expert in code review and implementation validation.\n\
         Decide whether each business rule below is implemented by the code changes provided.\n\n",
    );

    let _ = writeln!(prompt, "TASK CONTEXT:");
    let _ = writeln!(prompt, "Title: {}", rules.title);
    let _ = writeln!(prompt, "Description: {}", rules.description);
    let _ = writeln!(prompt, "Branch: {branch_name}");

    let _ = writeln!(prompt, "\nBUSINESS RULES TO VALIDATE:");
    for (index, rule) in rules.rules.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. [{}] {} ({}): {}",
            index + 1,
            rule.priority.as_str().to_uppercase(),
            rule.id,
            rule.category,
            rule.description
        );
        if let Some(criteria) = &rule.criteria {
            let _ = writeln!(prompt, "   Criteria:");
            for criterion in criteria {
                let _ = writeln!(prompt, "   - {criterion}");
            }
        }
    }

    let _ = writeln!(prompt, "\nCODE CHANGES:");
    if changes.is_empty() {
        let _ = writeln!(prompt, "(no changes found)");
    }
    for change in changes {
        let _ = writeln!(
            prompt,
            "\n--- File: {} ({}) ---\nAdditions: {} | Deletions: {}\n{}",
            change.file_path, change.change_type, change.additions, change.deletions, change.diff
        );
    }

    prompt.push_str(
        "\nHOW TO READ THE DIFFS:\n\
         - Lines starting with \"-\" were removed; lines starting with \"+\" were added.\n\
         - Lines without a prefix are unchanged context.\n\
         - A rename shows up as a removed line with the old name paired with an added line with the new name.\n\
         \nINSTRUCTIONS:\n\
         1. Give a confidence from 0.0 to 1.0 for every rule.\n\
         2. Cite concrete evidence from the changes for implemented rules.\n\
         3. Suggest what is still needed for rules that are not implemented.\n\
         4. Set overallCompleteness (0.0 to 1.0) consistently with the per-rule verdicts.\n\
         \nANSWER WITH VALID JSON ONLY, IN THIS FORMAT:\n",
    );
    prompt.push_str(RESPONSE_FORMAT);

    prompt
}
