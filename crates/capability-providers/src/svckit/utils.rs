//! Utility Provider
//!
//! Current time and arithmetic, for questions the model should not guess at.

use async_trait::async_trait;
use serde_json::{json, Value};

use agent_core::{
    capability::args, AgentError, Arguments, Capability, CapabilityProvider, ParameterSchema, Result as CoreResult,
};

pub struct UtilsProvider {
    capabilities: Vec<Capability>,
}

impl Default for UtilsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl UtilsProvider {
    pub fn new() -> Self {
        Self {
            capabilities: vec![
                Capability::new("currentTime", "Get the current date and time (UTC)").param(
                    ParameterSchema::string("format", "Output format: 'iso', 'human', or 'unix'")
                        .one_of(&["iso", "human", "unix"]),
                ),
                Capability::new("calculate", "Evaluate a mathematical expression").param(
                    ParameterSchema::string(
                        "expression",
                        "Expression using + - * / ^ and parentheses (e.g., '2 + 2', '(10 - 4) * 5')",
                    )
                    .required(),
                ),
            ],
        }
    }
}

#[async_trait]
impl CapabilityProvider for UtilsProvider {
    fn id(&self) -> &str {
        "utils"
    }

    fn name(&self) -> &str {
        "Utilities"
    }

    fn description(&self) -> &str {
        "Clock and calculator"
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn execute(&self, name: &str, arguments: &Arguments) -> CoreResult<Value> {
        super::validated(self, name, arguments)?;
        match name {
            "currentTime" => {
                let now = chrono::Utc::now();
                let output = match args::optional_str(arguments, "format").unwrap_or("human") {
                    "iso" => now.to_rfc3339(),
                    "unix" => now.timestamp().to_string(),
                    _ => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
                };
                Ok(Value::String(output))
            }
            "calculate" => {
                let expression = args::required_str(arguments, "expression")?;
                let result = evaluate_expression(expression)
                    .map_err(|reason| AgentError::invalid_argument("expression", reason))?;
                Ok(json!({ "expression": expression, "result": result }))
            }
            other => Err(super::unknown(self, other)),
        }
    }
}

/// Evaluate `+ - * / ^`, unary minus and parentheses over f64
pub fn evaluate_expression(expr: &str) -> Result<f64, String> {
    let tokens: Vec<char> = expr.chars().filter(|c| !c.is_whitespace()).collect();
    if tokens.is_empty() {
        return Err("Empty expression".into());
    }
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let value = parser.sum()?;
    match parser.peek() {
        None if value.is_finite() => Ok(value),
        None => Err("Result is not a finite number".into()),
        Some(c) => Err(format!("Unexpected '{c}' at position {}", parser.pos)),
    }
}

/// Deepest nesting of parentheses, signs and exponents accepted
const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Recurse into `parse` one level deeper, refusing past [`MAX_DEPTH`]
    fn nested(&mut self, parse: fn(&mut Self) -> Result<f64, String>) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("Expression nested too deeply".into());
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn sum(&mut self) -> Result<f64, String> {
        let mut value = self.product()?;
        loop {
            if self.eat('+') {
                value += self.product()?;
            } else if self.eat('-') {
                value -= self.product()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn product(&mut self) -> Result<f64, String> {
        let mut value = self.power()?;
        loop {
            if self.eat('*') {
                value *= self.power()?;
            } else if self.eat('/') {
                let divisor = self.power()?;
                if divisor == 0.0 {
                    return Err("Division by zero".into());
                }
                value /= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    /// Right-associative
    fn power(&mut self) -> Result<f64, String> {
        let base = self.unary()?;
        if self.eat('^') {
            let exponent = self.nested(Self::power)?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.eat('-') {
            return Ok(-self.nested(Self::unary)?);
        }
        if self.eat('+') {
            return self.nested(Self::unary);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<f64, String> {
        if self.eat('(') {
            let value = self.nested(Self::sum)?;
            if !self.eat(')') {
                return Err("Missing closing parenthesis".into());
            }
            return Ok(value);
        }

        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(match self.peek() {
                Some(c) => format!("Unexpected '{c}' at position {start}"),
                None => "Unexpected end of expression".into(),
            });
        }
        let literal: String = self.tokens[start..self.pos].iter().collect();
        literal.parse::<f64>().map_err(|e| format!("Parse error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(evaluate_expression("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate_expression("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate_expression("2 * (1 - 3)").unwrap(), -4.0);
        assert_eq!(evaluate_expression("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate_expression("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate_expression("-2 ^ 2").unwrap(), 4.0);
        assert_eq!(evaluate_expression("1000 * 0.05").unwrap(), 50.0);
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate_expression("1 / 0").unwrap_err(), "Division by zero");
        assert!(evaluate_expression("(1 + 2").is_err());
        assert!(evaluate_expression("2 +").is_err());
        assert!(evaluate_expression("abc").is_err());
        assert!(evaluate_expression("1.2.3").is_err());
        assert!(evaluate_expression("").is_err());
    }

    #[test]
    fn test_nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
        assert_eq!(evaluate_expression(&deep).unwrap_err(), "Expression nested too deeply");
        assert_eq!(evaluate_expression(&format!("{}1", "-".repeat(20_000))).unwrap_err(), "Expression nested too deeply");
        assert_eq!(evaluate_expression(&"1^".repeat(20_000)).unwrap_err(), "Expression nested too deeply");

        let fine = format!("{}7{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate_expression(&fine).unwrap(), 7.0);
    }

    #[tokio::test]
    async fn test_calculate_reports_invalid_expression() {
        let provider = UtilsProvider::new();
        let args = json!({ "expression": "4 * (" }).as_object().cloned().unwrap();
        let err = provider.execute("calculate", &args).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidArgument { ref parameter, .. } if parameter == "expression"));

        let args = json!({ "expression": "(10 - 4) * 5" }).as_object().cloned().unwrap();
        assert_eq!(provider.execute("calculate", &args).await.unwrap()["result"], 30.0);

        let args = json!({ "expression": format!("{}1", "(".repeat(20_000)) }).as_object().cloned().unwrap();
        let err = provider.execute("calculate", &args).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidArgument { ref reason, .. } if reason.contains("nested too deeply")));
    }

    #[tokio::test]
    async fn test_current_time_formats() {
        let provider = UtilsProvider::new();
        let args = json!({ "format": "unix" }).as_object().cloned().unwrap();
        let unix = provider.execute("currentTime", &args).await.unwrap();
        assert!(unix.as_str().unwrap().parse::<i64>().is_ok());
    }
}
