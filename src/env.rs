//! Concrete input environments.
//!
//! An environment maps input port names to integer values, as supplied
//! on the command line (`x=3 y=4`) or by the agent in an `eval` move.
//! Values arrive signed so that a negative supply can be reported as
//! such rather than silently wrapping; validation converts a good
//! environment into unsigned values ready to pin onto symbols.

use std::collections::BTreeMap;

use crate::error::InputError;
use crate::ir::Program;

/// A raw, unvalidated environment.
pub type Env = BTreeMap<String, i64>;

/// What to do with names that are not declared inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnknownPolicy {
    /// Reject with [`InputError::Unknown`]. Used by top-level `run`.
    Reject,
    /// Silently drop them. Used by the protocol's `eval` move, where
    /// the agent may carry bindings for a sketch's unused inputs.
    Drop,
}

/// Parse `name=value` tokens into an environment. The error is the
/// offending token.
pub fn parse_env<S: AsRef<str>>(tokens: &[S]) -> Result<Env, String> {
    let mut env = Env::new();
    for token in tokens {
        let token = token.as_ref();
        let (name, value) = token
            .split_once('=')
            .ok_or_else(|| token.to_string())?;
        let value: i64 = value.trim().parse().map_err(|_| token.to_string())?;
        env.insert(name.trim().to_string(), value);
    }
    Ok(env)
}

/// Validate an environment against a program's declared inputs.
///
/// Every declared input must be present, values must be non-negative
/// and fit the port width. Unknown names are handled per `policy`.
pub fn validate(
    prog: &Program,
    env: &Env,
    policy: UnknownPolicy,
) -> Result<BTreeMap<String, u64>, InputError> {
    if policy == UnknownPolicy::Reject {
        for name in env.keys() {
            if !prog.inputs.contains_key(name) {
                return Err(InputError::Unknown(name.clone()));
            }
        }
    }

    let mut values = BTreeMap::new();
    for port in prog.inputs.values() {
        let value = *env
            .get(&port.name)
            .ok_or_else(|| InputError::Missing(port.name.clone()))?;
        if value < 0 {
            return Err(InputError::Negative {
                name: port.name.clone(),
                value,
            });
        }
        let value = value as u64;
        if port.width < 64 && value >> port.width != 0 {
            return Err(InputError::TooWide {
                name: port.name.clone(),
                value,
                width: port.width,
            });
        }
        values.insert(port.name.clone(), value);
    }
    Ok(values)
}

/// Render bindings one per line, `name = value`.
pub fn env_str(bindings: &BTreeMap<String, u64>) -> String {
    bindings
        .iter()
        .map(|(name, value)| format!("{} = {}", name, value))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn fixture() -> Program {
        parse("in x: 8; in y: 4; out z: 8; z = add[8](x, zext[4, 8](y));").expect("parse")
    }

    #[test]
    fn parse_env_reads_pairs() {
        let env = parse_env(&["x=3", "y=4"]).expect("env parses");
        assert_eq!(env["x"], 3);
        assert_eq!(env["y"], 4);
        assert!(parse_env(&["bogus"]).is_err());
    }

    #[test]
    fn missing_input_is_rejected() {
        let env = parse_env(&["x=3"]).expect("env parses");
        let err = validate(&fixture(), &env, UnknownPolicy::Reject).expect_err("y missing");
        assert_eq!(err, InputError::Missing("y".into()));
    }

    #[test]
    fn negative_and_wide_values_are_rejected() {
        let env = parse_env(&["x=-1", "y=0"]).expect("env parses");
        assert!(matches!(
            validate(&fixture(), &env, UnknownPolicy::Reject),
            Err(InputError::Negative { .. })
        ));
        let env = parse_env(&["x=1", "y=16"]).expect("env parses");
        assert!(matches!(
            validate(&fixture(), &env, UnknownPolicy::Reject),
            Err(InputError::TooWide { .. })
        ));
    }

    #[test]
    fn unknown_names_follow_policy() {
        let env = parse_env(&["x=1", "y=2", "extra=9"]).expect("env parses");
        assert!(matches!(
            validate(&fixture(), &env, UnknownPolicy::Reject),
            Err(InputError::Unknown(_))
        ));
        let values = validate(&fixture(), &env, UnknownPolicy::Drop).expect("extra is dropped");
        assert_eq!(values.len(), 2);
        assert!(!values.contains_key("extra"));
    }
}
