// Arithmetic tools

use crate::protocol::{ToolContent, ToolResult};
use crate::tools::{ParamKind, ParamSpec, Tool, ToolProvider};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Subtract,
}

/// Provider of the `add` and `subtract` tools
pub struct MathService;

impl MathService {
    pub fn new() -> Self {
        Self
    }

    pub fn provider() -> Result<Arc<dyn ToolProvider>> {
        Ok(Arc::new(Self::new()))
    }
}

impl Default for MathService {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolProvider for MathService {
    fn name(&self) -> &str {
        "math"
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![
            Arc::new(MathTool { op: Op::Add }),
            Arc::new(MathTool { op: Op::Subtract }),
        ]
    }
}

struct MathTool {
    op: Op,
}

#[derive(Debug, Deserialize)]
struct MathArgs {
    a: Number,
    b: Number,
}

/// Integer arithmetic when both operands are integers, float otherwise
fn apply(op: Op, a: &Number, b: &Number) -> Result<String> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        let value = match op {
            Op::Add => a.checked_add(b),
            Op::Subtract => a.checked_sub(b),
        };
        if let Some(value) = value {
            return Ok(value.to_string());
        }
    }

    let a = a.as_f64().context("operand a is not a finite number")?;
    let b = b.as_f64().context("operand b is not a finite number")?;
    let value = match op {
        Op::Add => a + b,
        Op::Subtract => a - b,
    };
    // Debug keeps the fractional part of integral floats ("3.0")
    Ok(format!("{:?}", value))
}

#[async_trait::async_trait]
impl Tool for MathTool {
    fn name(&self) -> &str {
        match self.op {
            Op::Add => "add",
            Op::Subtract => "subtract",
        }
    }

    fn description(&self) -> &str {
        match self.op {
            Op::Add => "Add two numbers and return their sum",
            Op::Subtract => "Subtract the second number from the first",
        }
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::typed("a", ParamKind::Number),
            ParamSpec::typed("b", ParamKind::Number),
        ]
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<ToolResult> {
        let args: MathArgs = serde_json::from_value(Value::Object(arguments))
            .with_context(|| format!("Invalid arguments for {}", self.name()))?;

        Ok(vec![ToolContent::text(apply(self.op, &args.a, &args.b)?)])
    }
}
