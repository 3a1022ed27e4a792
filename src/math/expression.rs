//! Tabulated Wyckoff position expressions such as `-x+1/2`, `2x` or `1/4-y`, compiled
//! once with `evalexpr` and evaluated against (x, y, z).
//!
//! Integer literals are read as floats so that `1/4` is a quarter, and a literal directly
//! followed by a variable or `(` multiplies it. A compiled tree may only reference the
//! variables declared for its Wyckoff set and may not call functions.

use crate::core::error::ExpressionError;
use evalexpr::{
    build_operator_tree, ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, Node,
    Value,
};
use nalgebra::Vector3;
use std::fmt;

const VARIABLES: [char; 3] = ['x', 'y', 'z'];

/// A compiled position expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    tree: Node<DefaultNumericTypes>,
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Rewrites integer literals as float literals and makes implicit products explicit.
fn canonical_source(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let starts_number = (c.is_ascii_digit() || c == '.')
            && !(i > 0 && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '_'));
        if !starts_number {
            out.push(c);
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }
        let literal: String = chars[start..i].iter().collect();
        out.push_str(&literal);
        if !literal.contains('.') {
            out.push_str(".0");
        }
        // "2x", "2(x+y)"
        if let Some(&next) = chars.get(i) {
            if next.is_alphabetic() || next == '(' {
                out.push('*');
            }
        }
    }
    out
}

fn context(values: &Vector3<f64>) -> Result<HashMapContext<DefaultNumericTypes>, ExpressionError> {
    let mut context = HashMapContext::<DefaultNumericTypes>::new();
    for (name, value) in VARIABLES.iter().zip(values.iter()) {
        context.set_value(name.to_string(), Value::from_float(*value))?;
    }
    Ok(context)
}

impl Expression {
    /// Compiles `source`, allowing only the variables listed in `declared`.
    pub fn parse(source: &str, declared: &[char]) -> Result<Self, ExpressionError> {
        let tree = build_operator_tree::<DefaultNumericTypes>(&canonical_source(source))?;

        if let Some(function) = tree.iter_function_identifiers().next() {
            return Err(ExpressionError::Function {
                expression: source.to_string(),
                function: function.to_string(),
            });
        }
        for identifier in tree.iter_variable_identifiers() {
            let mut chars = identifier.chars();
            let declared_variable = match (chars.next(), chars.next()) {
                (Some(c), None) => declared.contains(&c) && VARIABLES.contains(&c),
                _ => false,
            };
            if !declared_variable {
                return Err(ExpressionError::UndeclaredVariable {
                    expression: source.to_string(),
                    variable: identifier.to_string(),
                });
            }
        }

        let expression = Self {
            source: source.to_string(),
            tree,
        };
        // Catches trees that parse but do not produce a number, such as "" or "1 == 1".
        expression.eval(&Vector3::zeros())?;
        Ok(expression)
    }

    /// Evaluates with `values` bound to (x, y, z).
    pub fn eval(&self, values: &Vector3<f64>) -> Result<f64, ExpressionError> {
        Ok(self.tree.eval_float_with_context(&context(values)?)?)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(source: &str, x: f64, y: f64, z: f64) -> f64 {
        Expression::parse(source, &['x', 'y', 'z'])
            .unwrap()
            .eval(&Vector3::new(x, y, z))
            .unwrap()
    }

    #[test]
    fn evaluates_tabulated_forms() {
        assert_relative_eq!(eval("1/4", 0.0, 0.0, 0.0), 0.25);
        assert_relative_eq!(eval("-x+1/2", 0.1, 0.0, 0.0), 0.4);
        assert_relative_eq!(eval("x-y", 0.3, 0.1, 0.0), 0.2);
        assert_relative_eq!(eval("-z+3/4", 0.0, 0.0, 0.25), 0.5);
        assert_relative_eq!(eval("2x", 0.2, 0.0, 0.0), 0.4);
        assert_relative_eq!(eval("2*x+1/3", 0.1, 0.0, 0.0), 0.2 + 1.0 / 3.0);
        assert_relative_eq!(eval("-(x+y)/2", 0.2, 0.4, 0.0), -0.3);
        assert_relative_eq!(eval("2(x+y)", 0.1, 0.2, 0.0), 0.6);
        assert_relative_eq!(eval("0.125", 0.0, 0.0, 0.0), 0.125);
    }

    #[test]
    fn precedence_and_associativity() {
        assert_relative_eq!(eval("1-1/2-1/4", 0.0, 0.0, 0.0), 0.25);
        assert_relative_eq!(eval("2*3/4", 0.0, 0.0, 0.0), 1.5);
    }

    #[test]
    fn literals_become_floats_and_products_explicit() {
        assert_eq!(canonical_source("-x+1/2"), "-x+1.0/2.0");
        assert_eq!(canonical_source("2x"), "2.0*x");
        assert_eq!(canonical_source("0.25"), "0.25");
    }

    #[test]
    fn rejects_undeclared_variables() {
        let err = Expression::parse("x+y", &['x']).unwrap_err();
        assert!(matches!(
            err,
            ExpressionError::UndeclaredVariable { ref variable, .. } if variable == "y"
        ));
        assert!(Expression::parse("__import__", &[]).is_err());
    }

    #[test]
    fn rejects_function_calls() {
        assert!(matches!(
            Expression::parse("math::sqrt(x)", &['x']),
            Err(ExpressionError::Function { .. })
        ));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Expression::parse("(x", &['x']).is_err());
        assert!(Expression::parse("", &[]).is_err());
        assert!(Expression::parse("1 == 1", &[]).is_err());
    }
}
