//! Benchmark problem records (HumanEval schema).

use serde::{Deserialize, Serialize};

/// One benchmark task. Created at corpus load and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Problem {
    /// Unique identifier, e.g. `HumanEval/0`.
    pub task_id: String,

    /// Signature plus docstring shown to the generator.
    pub prompt: String,

    /// Reference solution body (only used by the `canonical` backend).
    #[serde(default)]
    pub canonical_solution: String,

    /// Hidden test code defining `check(candidate)`.
    pub test: String,

    /// Name of the function under test.
    pub entry_point: String,
}

impl Problem {
    /// The `def <entry_point>(...):` header found in the prompt.
    ///
    /// Headers spanning several lines are joined with single spaces. Returns
    /// `None` when the prompt does not define the entry point.
    pub fn signature(&self) -> Option<String> {
        let lines: Vec<&str> = self.prompt.lines().collect();
        let start = lines.iter().rposition(|line| {
            let t = line.trim_start();
            let t = t.strip_prefix("async ").unwrap_or(t);
            t.strip_prefix("def ")
                .map(|rest| {
                    rest.trim_start()
                        .strip_prefix(self.entry_point.as_str())
                        .is_some_and(|after| after.trim_start().starts_with('('))
                })
                .unwrap_or(false)
        })?;

        let mut header = Vec::new();
        let mut depth: i32 = 0;
        for line in &lines[start..] {
            let trimmed = line.trim();
            for ch in trimmed.chars() {
                match ch {
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' | '}' => depth -= 1,
                    _ => {}
                }
            }
            header.push(trimmed);
            if depth <= 0 && trimmed.ends_with(':') {
                break;
            }
        }
        Some(header.join(" "))
    }
}
