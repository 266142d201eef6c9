//! Program model for the bit-vector language.
//!
//! A program is a set of named input and output ports plus an ordered
//! list of assignments. Everything here is an immutable value: a
//! rewrite never mutates a program, it builds a new one, and structural
//! equality (`PartialEq`) is what the protocol uses to detect that a
//! candidate is textually identical to the reference.

use std::collections::BTreeMap;

/// A named bit-vector signal with a fixed, positive width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub width: u32,
}

impl Port {
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }
}

/// Presentation base of an integer literal. Semantically irrelevant,
/// but preserved so pretty printing round-trips.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Base {
    Bin,
    Dec,
    Hex,
}

impl Base {
    /// The letter separating width and digits in the surface syntax.
    pub fn tag(self) -> char {
        match self {
            Base::Bin => 'b',
            Base::Dec => 'd',
            Base::Hex => 'x',
        }
    }

    pub fn radix(self) -> u32 {
        match self {
            Base::Bin => 2,
            Base::Dec => 10,
            Base::Hex => 16,
        }
    }
}

/// Expressions appearing on the right-hand side of an assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    /// Reference to an input port or a previously assigned temporary.
    Lookup(String),
    /// A width-tagged constant, e.g. `8x1F`.
    Literal { width: u32, base: Base, value: u64 },
    /// Invocation of a parametric library operation, e.g. `add[8](x, y)`.
    Call {
        func: String,
        params: Vec<u32>,
        args: Vec<Expr>,
    },
}

/// A single assignment. `width` is the explicit annotation from the
/// surface syntax: mandatory when `dest` introduces a temporary, and
/// either absent or matching the port width when `dest` is an output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub dest: String,
    pub width: Option<u32>,
    pub expr: Expr,
}

/// A complete program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub inputs: BTreeMap<String, Port>,
    pub outputs: BTreeMap<String, Port>,
    pub assignments: Vec<Assignment>,
}

impl Program {
    /// Derived view of the temporaries: assignment destinations that
    /// are neither inputs nor outputs, with their declared widths.
    pub fn temps(&self) -> BTreeMap<String, Port> {
        let mut temps = BTreeMap::new();
        for asgt in &self.assignments {
            if self.inputs.contains_key(&asgt.dest) || self.outputs.contains_key(&asgt.dest) {
                continue;
            }
            if let Some(width) = asgt.width {
                temps.insert(asgt.dest.clone(), Port::new(asgt.dest.clone(), width));
            }
        }
        temps
    }

    /// Whether two programs expose the same port signature: identical
    /// input and output name/width sets.
    pub fn signature_matches(&self, other: &Program) -> bool {
        self.inputs == other.inputs && self.outputs == other.outputs
    }

    /// Width of a named input, output, or temporary, if any.
    pub fn width_of(&self, name: &str) -> Option<u32> {
        self.inputs
            .get(name)
            .or_else(|| self.outputs.get(name))
            .map(|p| p.width)
            .or_else(|| self.temps().get(name).map(|p| p.width))
    }
}

/// Evidence that two programs disagree: one concrete input assignment
/// (equal across both programs) plus every output where they differ
/// under it. `differing` is non-empty by construction; `inputs` is
/// empty only when the programs declare no inputs, in which case the
/// disagreement is unconditional.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counterexample {
    pub inputs: BTreeMap<String, u64>,
    pub differing: BTreeMap<String, (u64, u64)>,
}

impl std::fmt::Display for Counterexample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.inputs.is_empty() {
            write!(f, "the outputs always differ:")?;
        } else {
            write!(f, "on inputs")?;
            for (name, value) in &self.inputs {
                write!(f, " {} = {};", name, value)?;
            }
            write!(f, " the outputs differ:")?;
        }
        for (name, (ours, theirs)) in &self.differing {
            write!(f, " {} = {} vs {};", name, ours, theirs)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for port in self.inputs.values() {
            writeln!(f, "in {}: {};", port.name, port.width)?;
        }
        for port in self.outputs.values() {
            writeln!(f, "out {}: {};", port.name, port.width)?;
        }
        for asgt in &self.assignments {
            writeln!(f, "{}", asgt)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Assignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.width {
            Some(width) => write!(f, "{}: {} = {};", self.dest, width, self.expr),
            None => write!(f, "{} = {};", self.dest, self.expr),
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Lookup(var) => write!(f, "{}", var),
            Expr::Literal { width, base, value } => {
                let digits = match base {
                    Base::Bin => format!("{:b}", value),
                    Base::Dec => format!("{}", value),
                    Base::Hex => format!("{:X}", value),
                };
                write!(f, "{}{}{}", width, base.tag(), digits)
            }
            Expr::Call { func, params, args } => {
                write!(f, "{}[", func)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, "](")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(names: &[(&str, u32)]) -> BTreeMap<String, Port> {
        names
            .iter()
            .map(|(n, w)| (n.to_string(), Port::new(*n, *w)))
            .collect()
    }

    #[test]
    fn temps_excludes_ports() {
        let prog = Program {
            inputs: ports(&[("x", 8)]),
            outputs: ports(&[("z", 8)]),
            assignments: vec![
                Assignment {
                    dest: "t".into(),
                    width: Some(4),
                    expr: Expr::Lookup("x".into()),
                },
                Assignment {
                    dest: "z".into(),
                    width: None,
                    expr: Expr::Lookup("t".into()),
                },
            ],
        };
        let temps = prog.temps();
        assert_eq!(temps.len(), 1);
        assert_eq!(temps["t"].width, 4);
    }

    #[test]
    fn signature_compares_names_and_widths() {
        let a = Program {
            inputs: ports(&[("x", 8)]),
            outputs: ports(&[("z", 8)]),
            assignments: vec![],
        };
        let mut b = a.clone();
        assert!(a.signature_matches(&b));
        b.outputs = ports(&[("z", 16)]);
        assert!(!a.signature_matches(&b));
    }

    #[test]
    fn counterexample_display_handles_missing_inputs() {
        let cex = Counterexample {
            inputs: BTreeMap::from([("x".to_string(), 3u64)]),
            differing: BTreeMap::from([("z".to_string(), (1u64, 2u64))]),
        };
        assert_eq!(
            cex.to_string(),
            "on inputs x = 3; the outputs differ: z = 1 vs 2;"
        );

        let constant = Counterexample {
            inputs: BTreeMap::new(),
            differing: BTreeMap::from([("z".to_string(), (1u64, 2u64))]),
        };
        assert_eq!(
            constant.to_string(),
            "the outputs always differ: z = 1 vs 2;"
        );
    }

    #[test]
    fn literal_display_uses_base() {
        let lit = Expr::Literal {
            width: 8,
            base: Base::Hex,
            value: 31,
        };
        assert_eq!(lit.to_string(), "8x1F");
        let lit = Expr::Literal {
            width: 4,
            base: Base::Bin,
            value: 10,
        };
        assert_eq!(lit.to_string(), "4b1010");
    }
}
