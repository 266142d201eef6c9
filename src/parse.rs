//! Parser for the surface syntax of the bit-vector language.
//!
//! The grammar lives in `grammar.pest`; this module walks the parse
//! tree into the program model. The surface syntax:
//!
//! ```text
//! in x: 8;            # input declaration
//! out z: 8;           # output declaration
//! t: 4 = slice[8, 0, 3](x);
//! z = add[8](x, y);
//! ```
//!
//! Literals are width- and base-tagged integers such as `8x1F`, `8d255`
//! or `4b1010`; `#` starts a line comment. A `---` divider separates
//! two assignment blocks that share one set of declarations, which is
//! how a pair of programs is read for equivalence checking.

use std::collections::BTreeMap;

use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ir::{Assignment, Base, Expr, Port, Program};

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct SourceParser;

/// Parse error with a 1-based source position.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "parse error at {}:{}: {}",
            self.line, self.col, self.message
        )
    }
}

impl std::error::Error for ParseError {}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, col) = match err.line_col {
            LineColLocation::Pos(pos) | LineColLocation::Span(pos, _) => pos,
        };
        Self {
            message: err.variant.message().into_owned(),
            line,
            col,
        }
    }
}

/// Error positioned at the start of a pair, for constraints the grammar
/// itself cannot express.
fn err_at(pair: &Pair<Rule>, message: impl Into<String>) -> ParseError {
    let (line, col) = pair.as_span().start_pos().line_col();
    ParseError {
        message: message.into(),
        line,
        col,
    }
}

/// Parse a single program. A `---` divider is rejected here; use
/// [`parse_pair`] for two-program sources.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let (first, second) = parse_pair(source)?;
    match second {
        None => Ok(first),
        Some(_) => Err(ParseError {
            message: "unexpected second program after '---'".into(),
            line: 1,
            col: 1,
        }),
    }
}

/// Parse one program, or two programs sharing a declaration block and
/// separated by `---`.
pub fn parse_pair(source: &str) -> Result<(Program, Option<Program>), ParseError> {
    let mut pairs = SourceParser::parse(Rule::file, source)?;
    let file = pairs.next().expect("a successful parse yields the file pair");

    let mut inputs: BTreeMap<String, Port> = BTreeMap::new();
    let mut outputs: BTreeMap<String, Port> = BTreeMap::new();
    let mut blocks: Vec<Vec<Assignment>> = Vec::new();

    for item in file.into_inner() {
        match item.as_rule() {
            Rule::decl => declare(item, &mut inputs, &mut outputs)?,
            Rule::block => blocks.push(
                item.into_inner()
                    .map(assignment)
                    .collect::<Result<_, _>>()?,
            ),
            Rule::EOI => {}
            rule => unreachable!("unexpected {:?} under file", rule),
        }
    }

    let mut blocks = blocks.into_iter();
    let first = blocks.next().expect("the grammar yields at least one block");
    let second = blocks.next();
    let make = |assignments| Program {
        inputs: inputs.clone(),
        outputs: outputs.clone(),
        assignments,
    };
    Ok((make(first), second.map(make)))
}

fn declare(
    pair: Pair<Rule>,
    inputs: &mut BTreeMap<String, Port>,
    outputs: &mut BTreeMap<String, Port>,
) -> Result<(), ParseError> {
    let mut parts = pair.into_inner();
    let keyword = parts.next().expect("decl has a direction keyword");
    let name_pair = parts.next().expect("decl has a name");
    let width_pair = parts.next().expect("decl has a width");

    let name = name_pair.as_str().to_string();
    let width = width(&width_pair)?;
    if inputs.contains_key(&name) || outputs.contains_key(&name) {
        return Err(err_at(
            &name_pair,
            format!("port '{}' declared more than once", name),
        ));
    }
    let book = if keyword.as_rule() == Rule::kw_in {
        inputs
    } else {
        outputs
    };
    book.insert(name.clone(), Port::new(name, width));
    Ok(())
}

fn assignment(pair: Pair<Rule>) -> Result<Assignment, ParseError> {
    let mut parts = pair.into_inner();
    let dest = parts
        .next()
        .expect("assignment has a destination")
        .as_str()
        .to_string();
    let mut next = parts.next().expect("assignment has an expression");
    let width = if next.as_rule() == Rule::number {
        let w = width(&next)?;
        next = parts.next().expect("assignment has an expression");
        Some(w)
    } else {
        None
    };
    let expr = expr(next)?;
    Ok(Assignment { dest, width, expr })
}

fn expr(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let inner = pair.into_inner().next().expect("expr wraps one alternative");
    match inner.as_rule() {
        Rule::literal => literal(inner),
        Rule::call => call(inner),
        Rule::lookup => {
            let ident = inner.into_inner().next().expect("lookup wraps an identifier");
            Ok(Expr::Lookup(ident.as_str().to_string()))
        }
        rule => unreachable!("unexpected {:?} under expr", rule),
    }
}

fn call(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let mut parts = pair.into_inner();
    let func = parts
        .next()
        .expect("call has a function name")
        .as_str()
        .to_string();
    let params_pair = parts.next().expect("call has a parameter list");
    let args_pair = parts.next().expect("call has an argument list");

    let mut params = Vec::new();
    for p in params_pair.into_inner() {
        params.push(param(&p)?);
    }
    let mut args = Vec::new();
    for a in args_pair.into_inner() {
        args.push(expr(a)?);
    }
    Ok(Expr::Call { func, params, args })
}

fn literal(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let tagged = pair.into_inner().next().expect("literal wraps one base form");
    let base = match tagged.as_rule() {
        Rule::bin_lit => Base::Bin,
        Rule::dec_lit => Base::Dec,
        Rule::hex_lit => Base::Hex,
        rule => unreachable!("unexpected {:?} under literal", rule),
    };
    let mut parts = tagged.into_inner();
    let width_pair = parts.next().expect("literal has a width");
    let digits = parts.next().expect("literal has digits");

    let width = width(&width_pair)?;
    let value = u64::from_str_radix(digits.as_str(), base.radix())
        .map_err(|_| err_at(&digits, format!("number '{}' is out of range", digits.as_str())))?;
    Ok(Expr::Literal { width, base, value })
}

fn width(pair: &Pair<Rule>) -> Result<u32, ParseError> {
    let n = u64_number(pair)?;
    if n == 0 {
        return Err(err_at(pair, "width must be positive"));
    }
    u32::try_from(n).map_err(|_| err_at(pair, format!("width {} is out of range", n)))
}

fn param(pair: &Pair<Rule>) -> Result<u32, ParseError> {
    let n = u64_number(pair)?;
    u32::try_from(n).map_err(|_| err_at(pair, format!("parameter {} is out of range", n)))
}

fn u64_number(pair: &Pair<Rule>) -> Result<u64, ParseError> {
    pair.as_str()
        .parse()
        .map_err(|_| err_at(pair, format!("number '{}' is out of range", pair.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Base, Expr};

    #[test]
    fn parses_declarations_and_call() {
        let prog = parse("in x: 8; in y: 8; out z: 8; z = add[8](x, y);")
            .expect("program should parse");
        assert_eq!(prog.inputs.len(), 2);
        assert_eq!(prog.outputs.len(), 1);
        assert_eq!(prog.assignments.len(), 1);
        match &prog.assignments[0].expr {
            Expr::Call { func, params, args } => {
                assert_eq!(func, "add");
                assert_eq!(params, &[8]);
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected a call, got {:?}", other),
        }
    }

    #[test]
    fn parses_literals_in_every_base() {
        let prog = parse("out z: 8; z = add[8](8x1F, add[8](8d31, 8b11111));")
            .expect("program should parse");
        let Expr::Call { args, .. } = &prog.assignments[0].expr else {
            panic!("expected a call");
        };
        assert_eq!(
            args[0],
            Expr::Literal {
                width: 8,
                base: Base::Hex,
                value: 31
            }
        );
    }

    #[test]
    fn parses_temporary_width_annotation() {
        let prog = parse("in x: 8; out z: 4; t: 4 = slice[8, 0, 3](x); z = t;")
            .expect("program should parse");
        assert_eq!(prog.assignments[0].width, Some(4));
        assert_eq!(prog.assignments[1].width, None);
    }

    #[test]
    fn keywords_do_not_swallow_identifiers() {
        // `index` starts with `in` but is an ordinary destination.
        let prog = parse("in x: 8; out z: 8; index: 8 = x; z = add[8](index, x);")
            .expect("program should parse");
        assert_eq!(prog.assignments[0].dest, "index");
    }

    #[test]
    fn comments_are_skipped() {
        let src = "# a header comment\nin x: 8; # trailing\nout z: 8;\nz = x;\n";
        let prog = parse(src).expect("program should parse");
        assert_eq!(prog.inputs.len(), 1);
    }

    #[test]
    fn divider_splits_two_programs() {
        let (a, b) = parse_pair("in x: 8; out z: 8; z = x; --- z = add[8](x, 8d0);")
            .expect("pair should parse");
        let b = b.expect("second program present");
        assert_eq!(a.inputs, b.inputs);
        assert_ne!(a.assignments, b.assignments);
    }

    #[test]
    fn error_carries_position() {
        let err = parse("in x: 8;\nout z: 8;\nz = add[8](x,;").expect_err("should fail");
        assert_eq!(err.line, 3);
    }

    #[test]
    fn duplicate_port_rejected() {
        assert!(parse("in x: 8; out x: 8;").is_err());
    }

    #[test]
    fn zero_width_rejected() {
        assert!(parse("in x: 0; out z: 8; z = 8d0;").is_err());
    }

    #[test]
    fn oversized_parameter_rejected() {
        let err = parse("in x: 8; out z: 8; z = add[4294967304](x, x);")
            .expect_err("parameter exceeds u32");
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn display_round_trips() {
        let src = "in x: 8;\nin y: 8;\nout z: 8;\nt: 1 = gt[8](x, y);\nz = if[8](t, x, y);\n";
        let prog = parse(src).expect("program should parse");
        let printed = prog.to_string();
        let reparsed = parse(&printed).expect("printed program should parse");
        assert_eq!(prog, reparsed);
    }
}
