use serde_yaml::Value;

use crate::error::Result;
use crate::profile::WorkflowEvidence;

const MATRIX_PYTHON_KEYS: &[&str] = &["python-version", "python_version", "python"];

/// Parse a GitHub Actions workflow.
pub fn parse_workflow(content: &str) -> Result<WorkflowEvidence> {
    let doc: Value = serde_yaml::from_str(content)?;
    let mut wf = WorkflowEvidence::default();

    let Some(jobs) = doc.get("jobs").and_then(Value::as_mapping) else {
        return Ok(wf);
    };
    for job in jobs.values() {
        let matrix = job.get("strategy").and_then(|s| s.get("matrix"));
        match job.get("runs-on") {
            Some(Value::String(s)) => {
                wf.runs_on.push(s.clone());
                // `runs-on: ${{ matrix.os }}` expands to the matrix list.
                if s.contains("matrix.") {
                    if let Some(Value::Sequence(oses)) = matrix.and_then(|m| m.get("os")) {
                        wf.runs_on.extend(oses.iter().filter_map(scalar));
                    }
                }
            }
            Some(Value::Sequence(items)) => wf.runs_on.extend(items.iter().filter_map(scalar)),
            _ => {}
        }

        if let Some(matrix) = matrix {
            for key in MATRIX_PYTHON_KEYS {
                match matrix.get(key) {
                    Some(Value::Sequence(items)) => {
                        wf.python_versions.extend(items.iter().filter_map(scalar))
                    }
                    Some(v) => wf.python_versions.extend(scalar(v)),
                    None => {}
                }
            }
            // `include: [{python-version: "3.12"}]`
            if let Some(Value::Sequence(includes)) = matrix.get("include") {
                for inc in includes {
                    for key in MATRIX_PYTHON_KEYS {
                        wf.python_versions.extend(inc.get(key).and_then(scalar));
                    }
                }
            }
        }

        if let Some(Value::Sequence(steps)) = job.get("steps") {
            for step in steps {
                let text = ["run", "uses"]
                    .iter()
                    .filter_map(|k| step.get(k).and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_ascii_lowercase();
                if text.contains("cuda") || text.contains("nvidia") {
                    wf.has_cuda = true;
                }
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    wf.python_versions.retain(|v| seen.insert(v.clone()));
    Ok(wf)
}

/// Matrix entries may be strings or YAML floats (`3.10` parses as `3.1`).
fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
