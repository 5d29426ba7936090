use std::fmt;

use crate::recorder::{inputs_key, outputs_key};
use crate::{KvsEngine, Result, Value};

/// One call read back from the history logs.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// JSON of the argument tuple
    pub inputs: String,
    /// JSON of the result
    pub output: String,
}

impl RecordedCall {
    fn display_output(&self) -> String {
        serde_json::from_str::<String>(&self.output).unwrap_or_else(|_| self.output.clone())
    }
}

/// The recorded history of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// Identity of the operation
    pub qualname: String,
    /// Value of the call counter, 0 if it was never set
    pub count: i64,
    /// Logged calls, oldest first
    pub calls: Vec<RecordedCall>,
}

impl Trace {
    /// Renders the trace: a header followed by one line per logged call.
    ///
    /// Inputs are shown as logged. An output that is a JSON string is shown
    /// unquoted, so a stored key reads `-> <key>`.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.calls.len() + 1);
        lines.push(format!("{} was called {} times:", self.qualname, self.count));
        for call in &self.calls {
            lines.push(format!(
                "{}(*{}) -> {}",
                self.qualname,
                call.inputs,
                call.display_output()
            ));
        }
        lines
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.lines().join("\n"))
    }
}

/// Reads the call counter and history logs of `qualname`.
///
/// Inputs and outputs are paired by position. If a call failed after its
/// inputs were logged the logs differ in length, and pairing stops at the
/// shorter one.
pub fn replay<E: KvsEngine>(engine: &E, qualname: &str) -> Result<Trace> {
    let count = engine
        .get(qualname.to_owned())?
        .map(Value::into_int)
        .transpose()?
        .unwrap_or(0);
    let inputs = engine.lrange(inputs_key(qualname), 0, -1)?;
    let outputs = engine.lrange(outputs_key(qualname), 0, -1)?;
    let calls = inputs
        .into_iter()
        .zip(outputs)
        .map(|(inputs, output)| -> Result<RecordedCall> {
            Ok(RecordedCall {
                inputs: inputs.into_string()?,
                output: output.into_string()?,
            })
        })
        .collect::<Result<_>>()?;
    Ok(Trace {
        qualname: qualname.to_owned(),
        count,
        calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryEngine;

    #[test]
    fn unknown_operation_is_empty() {
        let engine = MemoryEngine::new();
        let trace = replay(&engine, "never").unwrap();
        assert_eq!(trace.count, 0);
        assert!(trace.calls.is_empty());
        assert_eq!(trace.lines(), vec!["never was called 0 times:".to_owned()]);
    }

    #[test]
    fn display_joins_lines() {
        let trace = Trace {
            qualname: "op".to_owned(),
            count: 1,
            calls: vec![RecordedCall {
                inputs: r#"["x"]"#.to_owned(),
                output: r#""y""#.to_owned(),
            }],
        };
        assert_eq!(
            trace.to_string(),
            "op was called 1 times:\nop(*[\"x\"]) -> y"
        );
    }

    #[test]
    fn only_string_outputs_are_unquoted() {
        let call = |output: &str| RecordedCall {
            inputs: "[]".to_owned(),
            output: output.to_owned(),
        };
        let trace = Trace {
            qualname: "op".to_owned(),
            count: 3,
            calls: vec![call(r#""a \"b\"""#), call("[1,2]"), call("not json")],
        };
        assert_eq!(
            trace.lines()[1..].to_vec(),
            vec![
                "op(*[]) -> a \"b\"".to_owned(),
                "op(*[]) -> [1,2]".to_owned(),
                "op(*[]) -> not json".to_owned(),
            ]
        );
    }
}
