//! Projection of an event payload onto a workflow's declared inputs.

use serde_json::{Map, Value};

use crate::types::{InputSource, InputType, WorkflowInput};

/// Inputs for one dispatch, plus what went wrong building them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputProjection {
    pub inputs: Map<String, Value>,
    /// Set when a required input is missing or a value has the wrong type.
    /// The dispatch still happens; the engine records a failed run.
    pub error: Option<String>,
}

impl InputProjection {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Build workflow inputs from `payload`.
///
/// Values are read by input name from the data selected by `source`,
/// falling back to the declared default. Missing optional inputs are
/// omitted; missing required ones are reported. A workflow that declares no
/// inputs receives the whole (unwrapped) object.
pub fn project_inputs(
    payload: &Value,
    source: &InputSource,
    declared: &[WorkflowInput],
) -> InputProjection {
    let data = source.unwrap(payload);

    if declared.is_empty() {
        return InputProjection {
            inputs: data.as_object().cloned().unwrap_or_default(),
            error: None,
        };
    }

    let mut inputs = Map::new();
    let mut problems = Vec::new();
    for input in declared {
        let value = data
            .get(&input.name)
            .filter(|v| !v.is_null())
            .or(input.default.as_ref());
        match value {
            Some(v) => {
                if let Some(problem) = type_problem(input, v) {
                    problems.push(problem);
                }
                inputs.insert(input.name.clone(), v.clone());
            }
            None if input.required => {
                problems.push(format!("missing required input '{}'", input.name));
            }
            None => {}
        }
    }

    InputProjection {
        inputs,
        error: (!problems.is_empty()).then(|| problems.join("; ")),
    }
}

fn type_problem(input: &WorkflowInput, value: &Value) -> Option<String> {
    let ok = match input.input_type {
        InputType::String => value.is_string(),
        InputType::Number => value.is_number(),
        InputType::Boolean => value.is_boolean(),
        InputType::Array => value.is_array(),
        InputType::Object => value.is_object(),
        InputType::Choice => {
            if input.options.is_empty() || input.options.contains(value) {
                return None;
            }
            let allowed: Vec<String> = input.options.iter().map(Value::to_string).collect();
            return Some(format!(
                "input '{}' must be one of [{}], got {value}",
                input.name,
                allowed.join(", ")
            ));
        }
    };
    (!ok).then(|| {
        format!(
            "input '{}' expected {}, got {value}",
            input.name,
            type_name(input.input_type)
        )
    })
}

fn type_name(t: InputType) -> &'static str {
    match t {
        InputType::String => "string",
        InputType::Number => "number",
        InputType::Boolean => "boolean",
        InputType::Choice => "choice",
        InputType::Array => "array",
        InputType::Object => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(name: &str, input_type: InputType, required: bool) -> WorkflowInput {
        WorkflowInput {
            name: name.into(),
            input_type,
            required,
            default: None,
            options: vec![],
        }
    }

    #[test]
    fn no_declared_inputs_passes_object_through() {
        let p = project_inputs(&json!({"a": "x"}), &InputSource::Payload, &[]);
        assert_eq!(Value::Object(p.inputs.clone()), json!({"a": "x"}));
        assert!(p.is_valid());

        let p = project_inputs(&json!("scalar"), &InputSource::Payload, &[]);
        assert!(p.inputs.is_empty());
    }

    #[test]
    fn defaults_fill_gaps_and_optional_are_omitted() {
        let mut env = input("env", InputType::String, true);
        env.default = Some(json!("prod"));
        let declared = [env, input("note", InputType::String, false)];
        let p = project_inputs(&json!({}), &InputSource::Payload, &declared);
        assert_eq!(Value::Object(p.inputs.clone()), json!({"env": "prod"}));
        assert!(p.is_valid());
    }

    #[test]
    fn missing_required_input_is_flagged() {
        let declared = [
            input("a", InputType::String, true),
            input("b", InputType::String, true),
        ];
        let p = project_inputs(&json!({"a": "x"}), &InputSource::Payload, &declared);
        assert_eq!(Value::Object(p.inputs.clone()), json!({"a": "x"}));
        assert_eq!(p.error.as_deref(), Some("missing required input 'b'"));
    }

    #[test]
    fn envelope_source_reads_inner_payload() {
        let source = InputSource::Envelope {
            field: "payload".into(),
        };
        let declared = [input("ref", InputType::String, true)];
        let event = json!({"source": "github", "ref": "outer", "payload": {"ref": "main"}});
        let p = project_inputs(&event, &source, &declared);
        assert_eq!(p.inputs["ref"], json!("main"));

        let p = project_inputs(&json!({"source": "github"}), &source, &declared);
        assert!(!p.is_valid());
    }

    #[test]
    fn type_mismatches_are_joined() {
        let mut choice = input("env", InputType::Choice, false);
        choice.options = vec![json!("prod"), json!("staging")];
        let declared = [
            input("n", InputType::Number, false),
            input("flag", InputType::Boolean, false),
            choice,
            input("list", InputType::Array, false),
            input("obj", InputType::Object, false),
        ];
        let p = project_inputs(
            &json!({"n": "7", "flag": true, "env": "dev", "list": [1], "obj": {}}),
            &InputSource::Payload,
            &declared,
        );
        let err = p.error.unwrap();
        assert!(err.contains("input 'n' expected number"));
        assert!(err.contains(r#"input 'env' must be one of ["prod", "staging"], got "dev""#));
        assert!(!err.contains("flag"));
        // mismatched values are still passed along
        assert_eq!(p.inputs.len(), 5);
    }
}
