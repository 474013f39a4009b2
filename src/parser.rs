//! Netlist and value-expression parsing.
//!
//! A netlist line is `name node... [args...]`; the leading letters of `name` pick the
//! element. Values are numbers with SPICE suffixes (`1k`, `2.2u`, `1meg`), symbol
//! names, or arbitrary expressions in braces. A missing value becomes a symbol named
//! after the component.

use lazy_static::lazy_static;
use log::{debug, info, warn};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace0, one_of},
    combinator::{all_consuming, map, map_opt, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::ToPrimitive;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::algebra::{rational_from_decimal, rational_from_f64, Expr, Func, RatFunc};
use crate::circuit::Circuit;
use crate::component::{Component, ComponentKind, Signal, SourceValue};
use crate::context::AnalysisContext;
use crate::domain::classify;
use crate::error::{CircuitError, Result};
use crate::symbol::SymbolId;
use crate::transform::TransientExpr;

lazy_static! {
    static ref VALUE_PATTERN: Regex = Regex::new(
        r"^([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)([a-zA-Z]*)$"
    ).unwrap();

    static ref PREFIX_PATTERN: Regex = Regex::new(r"^(?i)(TF|TL|[RGLCVIEFHZYWOP])").unwrap();

    static ref PARAM_PATTERN: Regex = Regex::new(
        r"^(?i)\.param\s+([A-Za-z_]\w*)\s*=\s*(.+)$"
    ).unwrap();
}

/// Scale factor of a SPICE suffix; `meg` is checked before `m`, unknown letters
/// are units and scale by one.
fn suffix_scale(suffix: &str) -> BigRational {
    let lower = suffix.to_ascii_lowercase();
    let exponent = if lower.starts_with("meg") {
        "1e6"
    } else {
        match lower.chars().next() {
            Some('f') => "1e-15",
            Some('p') => "1e-12",
            Some('n') => "1e-9",
            Some('u') => "1e-6",
            Some('m') => "1e-3",
            Some('k') => "1e3",
            Some('g') => "1e9",
            Some('t') => "1e12",
            _ => "1",
        }
    };
    rational_from_decimal(exponent).unwrap_or_else(|| BigRational::from_integer(1.into()))
}

/// Exact value of a number with an optional suffix, e.g. `4.7k`.
pub fn parse_number(text: &str) -> Option<BigRational> {
    let captures = VALUE_PATTERN.captures(text.trim())?;
    let mantissa = rational_from_decimal(captures.get(1)?.as_str())?;
    let suffix = captures.get(2).map(|m| m.as_str()).unwrap_or("");
    Some(mantissa * suffix_scale(suffix))
}

/// Expression syntax tree before symbol interning.
#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Num(BigRational),
    Name(String),
    Call(String, Box<Ast>),
    Neg(Box<Ast>),
    Add(Box<Ast>, Box<Ast>),
    Sub(Box<Ast>, Box<Ast>),
    Mul(Box<Ast>, Box<Ast>),
    Div(Box<Ast>, Box<Ast>),
    Pow(Box<Ast>, Box<Ast>),
}

fn ws<'a, O>(inner: impl FnMut(&'a str) -> IResult<&'a str, O>) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    ))(input)
}

fn atom(input: &str) -> IResult<&str, Ast> {
    ws(alt((
        map_opt(number, |text| rational_from_decimal(text).map(Ast::Num)),
        map(
            pair(identifier, delimited(ws(char('(')), expr, ws(char(')')))),
            |(name, arg)| Ast::Call(name.to_string(), Box::new(arg)),
        ),
        map(identifier, |name| Ast::Name(name.to_string())),
        delimited(char('('), expr, char(')')),
    )))(input)
}

fn power(input: &str) -> IResult<&str, Ast> {
    let (input, base) = atom(input)?;
    let (input, exponent) = opt(preceded(ws(alt((tag("**"), tag("^")))), unary))(input)?;
    Ok((
        input,
        match exponent {
            Some(e) => Ast::Pow(Box::new(base), Box::new(e)),
            None => base,
        },
    ))
}

fn unary(input: &str) -> IResult<&str, Ast> {
    alt((
        map(preceded(ws(char('-')), unary), |a| Ast::Neg(Box::new(a))),
        preceded(ws(char('+')), unary),
        power,
    ))(input)
}

fn term(input: &str) -> IResult<&str, Ast> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(ws(one_of("*/")), unary))(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |acc, (op, rhs)| match op {
            '*' => Ast::Mul(Box::new(acc), Box::new(rhs)),
            _ => Ast::Div(Box::new(acc), Box::new(rhs)),
        }),
    ))
}

fn expr(input: &str) -> IResult<&str, Ast> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(ws(one_of("+-")), term))(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |acc, (op, rhs)| match op {
            '+' => Ast::Add(Box::new(acc), Box::new(rhs)),
            _ => Ast::Sub(Box::new(acc), Box::new(rhs)),
        }),
    ))
}

fn lower(ast: Ast, ctx: &mut AnalysisContext) -> std::result::Result<Expr, String> {
    let boxed = |a: Box<Ast>, ctx: &mut AnalysisContext| lower(*a, ctx).map(Box::new);
    Ok(match ast {
        Ast::Num(v) => Expr::Num(v),
        Ast::Name(name) => Expr::Sym(ctx.symbol(&name)),
        Ast::Call(name, arg) => {
            let func = Func::from_name(&name).ok_or_else(|| format!("unknown function '{}'", name))?;
            Expr::Call(func, boxed(arg, ctx)?)
        }
        Ast::Neg(a) => Expr::Neg(boxed(a, ctx)?),
        Ast::Add(a, b) => Expr::Add(vec![lower(*a, ctx)?, lower(*b, ctx)?]),
        Ast::Sub(a, b) => Expr::Add(vec![lower(*a, ctx)?, Expr::Neg(boxed(b, ctx)?)]),
        Ast::Mul(a, b) => Expr::Mul(vec![lower(*a, ctx)?, lower(*b, ctx)?]),
        Ast::Div(a, b) => Expr::Div(boxed(a, ctx)?, boxed(b, ctx)?),
        Ast::Pow(a, b) => Expr::Pow(boxed(a, ctx)?, boxed(b, ctx)?),
    })
}

/// Parses an expression such as `5*exp(-t/tau)*u(t)` or `1/(s*C)`.
pub fn parse_expr(text: &str, ctx: &mut AnalysisContext) -> Result<Expr> {
    let parse_error = |message: String| CircuitError::Parse { line: 0, message };
    let (_, ast) = all_consuming(ws(expr))(text)
        .map_err(|e| parse_error(format!("invalid expression '{}': {:?}", text, e)))?;
    lower(ast, ctx).map_err(parse_error)
}

/// A value token: braced expression, suffixed number, or bare expression.
pub fn parse_value_expr(token: &str, ctx: &mut AnalysisContext) -> Result<Expr> {
    if let Some(inner) = token.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        return parse_expr(inner, ctx);
    }
    match parse_number(token) {
        Some(value) => Ok(Expr::Num(value)),
        None => parse_expr(token, ctx),
    }
}

pub fn parse_value(token: &str, ctx: &mut AnalysisContext) -> Result<RatFunc> {
    parse_value_expr(token, ctx)?.to_ratfunc()
}

/// Whitespace-separated tokens, keeping braced expressions whole.
fn tokens(input: &str) -> IResult<&str, Vec<&str>> {
    many0(ws(alt((
        recognize(delimited(char('{'), take_until("}"), char('}'))),
        take_while1(|c: char| !c.is_whitespace()),
    ))))(input)
}

/// A logical netlist line and the physical line it starts on.
#[derive(Debug, Clone, PartialEq)]
struct Line {
    number: usize,
    text: String,
}

pub struct NetlistParser {
    /// Title used when the netlist has no `.title` line.
    default_title: String,
}

impl Default for NetlistParser {
    fn default() -> Self {
        Self::new()
    }
}

impl NetlistParser {
    pub fn new() -> Self {
        NetlistParser {
            default_title: "netlist".to_string(),
        }
    }

    pub fn with_title(title: &str) -> Self {
        NetlistParser {
            default_title: title.to_string(),
        }
    }

    pub fn parse_file(&self, path: &Path) -> anyhow::Result<Circuit> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read file '{}': {}", path.display(), e))?;
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.default_title.clone());
        let circuit = NetlistParser::with_title(&title).parse_str(&content)?;
        info!(
            "Loaded '{}': {} components, {} nodes",
            circuit.title,
            circuit.components().len(),
            circuit.nodes().len()
        );
        Ok(circuit)
    }

    pub fn parse_str(&self, content: &str) -> Result<Circuit> {
        self.parse_with_context(content, AnalysisContext::new())
    }

    /// Parses into a circuit that starts from `ctx`, sharing its symbols.
    pub fn parse_with_context(&self, content: &str, ctx: AnalysisContext) -> Result<Circuit> {
        let mut circuit = Circuit::with_context(self.default_title.clone(), ctx);
        let mut params: Vec<(usize, String, String)> = Vec::new();

        for line in preprocess_lines(content) {
            let text = line.text.as_str();
            if text.starts_with('.') {
                let directive = text.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
                match directive.as_str() {
                    ".end" => break,
                    ".title" => circuit.title = text[directive.len()..].trim().to_string(),
                    ".param" => {
                        let captures = PARAM_PATTERN.captures(text).ok_or_else(|| CircuitError::Parse {
                            line: line.number,
                            message: "expected .param NAME=VALUE".to_string(),
                        })?;
                        params.push((line.number, captures[1].to_string(), captures[2].trim().to_string()));
                    }
                    _ => warn!("Ignoring directive '{}' on line {}", directive, line.number),
                }
                continue;
            }
            let component = parse_component_line(text, circuit.context_mut()).map_err(|e| at_line(e, line.number))?;
            circuit.add(component)?;
        }

        for (number, name, value) in params {
            let value = parse_value(&value, circuit.context_mut()).map_err(|e| at_line(e, number))?;
            debug!("Substituting parameter {}", name);
            circuit = circuit.substitute(&name, &value);
        }
        Ok(circuit)
    }
}

impl FromStr for Circuit {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self> {
        NetlistParser::new().parse_str(s)
    }
}

fn at_line(error: CircuitError, number: usize) -> CircuitError {
    match error {
        CircuitError::Parse { line: 0, message } => CircuitError::Parse { line: number, message },
        other => other,
    }
}

/// Strips comments and joins `+` continuation lines.
fn preprocess_lines(content: &str) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let text = match raw.find(';') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();
        if text.is_empty() || text.starts_with('*') {
            continue;
        }
        if let Some(rest) = text.strip_prefix('+') {
            if let Some(last) = lines.last_mut() {
                last.text.push(' ');
                last.text.push_str(rest.trim());
                continue;
            }
        }
        lines.push(Line {
            number: index + 1,
            text: text.to_string(),
        });
    }
    lines
}

fn syntax(message: impl Into<String>) -> CircuitError {
    CircuitError::Parse {
        line: 0,
        message: message.into(),
    }
}

/// Value token at `index`, or a symbol named after the component.
fn value_or_name(args: &[&str], index: usize, name: &str, ctx: &mut AnalysisContext) -> Result<RatFunc> {
    match args.get(index) {
        Some(token) => parse_value(token, ctx),
        None => Ok(RatFunc::var(ctx.symbol(name))),
    }
}

fn expect_nodes<'a>(fields: &[&'a str], count: usize, name: &str) -> Result<(Vec<String>, Vec<&'a str>)> {
    if fields.len() < count {
        return Err(syntax(format!("{} expects {} nodes", name, count)));
    }
    Ok((
        fields[..count].iter().map(|n| n.to_string()).collect(),
        fields[count..].to_vec(),
    ))
}

fn parse_component_line(text: &str, ctx: &mut AnalysisContext) -> Result<Component> {
    let (rest, fields) = tokens(text).map_err(|e| syntax(format!("cannot tokenize: {:?}", e)))?;
    if !rest.trim().is_empty() {
        return Err(syntax(format!("unterminated expression near '{}'", rest.trim())));
    }
    let (name, fields) = fields.split_first().ok_or_else(|| syntax("empty line"))?;
    let prefix = PREFIX_PATTERN
        .captures(name)
        .map(|c| c[1].to_ascii_uppercase())
        .ok_or_else(|| syntax(format!("unknown component type '{}'", name)))?;

    let kind_nodes = |kind: ComponentKind, nodes: Vec<String>| Component::new(name, kind, nodes);
    match prefix.as_str() {
        "R" | "Z" | "Y" => {
            let (nodes, args) = expect_nodes(&fields, 2, name)?;
            let value = value_or_name(&args, 0, name, ctx)?;
            let kind = match prefix.as_str() {
                "R" => ComponentKind::Resistor(value),
                "Z" => ComponentKind::Impedance(value),
                _ => ComponentKind::Admittance(value),
            };
            kind_nodes(kind, nodes)
        }
        "G" if fields.len() >= 4 => {
            let (nodes, args) = expect_nodes(&fields, 4, name)?;
            let gain = value_or_name(&args, 0, name, ctx)?;
            kind_nodes(ComponentKind::Vccs { gain }, nodes)
        }
        "G" => {
            let (nodes, args) = expect_nodes(&fields, 2, name)?;
            kind_nodes(ComponentKind::Conductor(value_or_name(&args, 0, name, ctx)?), nodes)
        }
        "C" | "L" => {
            let (nodes, args) = expect_nodes(&fields, 2, name)?;
            let value = value_or_name(&args, 0, name, ctx)?;
            let ic = args.get(1).map(|t| parse_value(t, ctx)).transpose()?;
            let kind = if prefix == "C" {
                ComponentKind::Capacitor { value, v0: ic }
            } else {
                ComponentKind::Inductor { value, i0: ic }
            };
            kind_nodes(kind, nodes)
        }
        "V" | "I" => {
            let (nodes, args) = expect_nodes(&fields, 2, name)?;
            let value = parse_source(&args, name, ctx)?;
            let kind = if prefix == "V" {
                ComponentKind::VoltageSource(value)
            } else {
                ComponentKind::CurrentSource(value)
            };
            kind_nodes(kind, nodes)
        }
        "E" => {
            let (nodes, args) = expect_nodes(&fields, 4, name)?;
            kind_nodes(ComponentKind::Vcvs { gain: value_or_name(&args, 0, name, ctx)? }, nodes)
        }
        "F" | "H" => {
            let (nodes, args) = expect_nodes(&fields, 2, name)?;
            let control = args
                .first()
                .ok_or_else(|| syntax(format!("{} needs a controlling voltage source", name)))?
                .to_string();
            let gain = value_or_name(&args, 1, name, ctx)?;
            let kind = if prefix == "F" {
                ComponentKind::Cccs { control, gain }
            } else {
                ComponentKind::Ccvs { control, gain }
            };
            kind_nodes(kind, nodes)
        }
        "TF" => {
            let (nodes, args) = expect_nodes(&fields, 4, name)?;
            kind_nodes(ComponentKind::Transformer { ratio: value_or_name(&args, 0, name, ctx)? }, nodes)
        }
        "TL" => {
            let (nodes, args) = expect_nodes(&fields, 4, name)?;
            let z0 = match args.first() {
                Some(token) => parse_value(token, ctx)?,
                None => RatFunc::var(ctx.symbol(&format!("Z0_{}", name))),
            };
            let cosh = ctx.registry.opaque(&format!("cosh_{}", name));
            let sinh = ctx.registry.opaque(&format!("sinh_{}", name));
            kind_nodes(ComponentKind::TransmissionLine { z0, cosh, sinh }, nodes)
        }
        "W" | "O" | "P" => {
            let (nodes, args) = expect_nodes(&fields, 2, name)?;
            if !args.is_empty() {
                return Err(syntax(format!("{} takes no value", name)));
            }
            let kind = match prefix.as_str() {
                "W" => ComponentKind::Wire,
                "O" => ComponentKind::Open,
                _ => ComponentKind::Port,
            };
            kind_nodes(kind, nodes)
        }
        other => Err(syntax(format!("unsupported component type '{}'", other))),
    }
}

const SOURCE_KEYWORDS: [&str; 4] = ["dc", "ac", "step", "noise"];

fn is_keyword(token: &str) -> bool {
    SOURCE_KEYWORDS.contains(&token.to_ascii_lowercase().as_str())
}

/// Source value: keyword groups (`dc 5 ac 1 1k 90`), or one value classified by the
/// domain variables it mentions. A bare value without `t` or `s` is dc.
fn parse_source(args: &[&str], name: &str, ctx: &mut AnalysisContext) -> Result<SourceValue> {
    let first = match args.first() {
        Some(first) => first,
        None => return Ok(SourceValue::dc(RatFunc::var(ctx.symbol(name)))),
    };
    if !is_keyword(first) {
        if args.len() > 1 {
            return Err(syntax(format!("unexpected '{}' after source value", args[1])));
        }
        return classify(&parse_value_expr(first, ctx)?);
    }

    let mut value = SourceValue::default();
    let mut i = 0;
    while i < args.len() {
        let keyword = args[i].to_ascii_lowercase();
        let end = args[i + 1..]
            .iter()
            .position(|t| is_keyword(t))
            .map(|p| i + 1 + p)
            .unwrap_or(args.len());
        let group = &args[i + 1..end];
        if group.is_empty() {
            return Err(syntax(format!("'{}' needs a value", keyword)));
        }
        let amplitude = parse_value(group[0], ctx)?;
        let single = |group: &[&str]| {
            if group.len() > 1 {
                Err(syntax(format!("'{}' takes one value", keyword)))
            } else {
                Ok(())
            }
        };
        match keyword.as_str() {
            "dc" => {
                single(group)?;
                value.push(Signal::Dc(amplitude));
            }
            "step" => {
                single(group)?;
                let laplace = amplitude.try_div(&RatFunc::s())?;
                value.push(Signal::Transient(TransientExpr::from_laplace(laplace, true)));
            }
            "noise" => {
                single(group)?;
                let nid = ctx.registry.new_noise_id();
                value.push(Signal::Noise { asd: amplitude, nid });
            }
            _ => {
                if group.len() > 3 {
                    return Err(syntax("'ac' takes magnitude, frequency and phase"));
                }
                let omega = match group.get(1) {
                    Some(freq) => {
                        let two_pi = &RatFunc::from_int(2) * &RatFunc::var(SymbolId::PI);
                        &two_pi * &parse_value(freq, ctx)?
                    }
                    None => RatFunc::var(ctx.symbol("omega0")),
                };
                let phase = match group.get(2) {
                    Some(deg) => parse_number(deg).ok_or_else(|| syntax(format!("invalid phase '{}'", deg)))?,
                    None => BigRational::from_integer(0.into()),
                };
                value.push(Signal::Ac {
                    phasor: &amplitude * &unit_phasor(&phase),
                    omega,
                });
            }
        }
        i = end;
    }
    Ok(value)
}

/// `exp(j * deg)`, exact on multiples of 90 degrees.
fn unit_phasor(degrees: &BigRational) -> RatFunc {
    let quarter = BigRational::from_integer(90.into());
    let turns = degrees / &quarter;
    if turns.is_integer() {
        let k: BigInt = ((turns.to_integer() % 4) + 4) % 4;
        return match k.to_i64() {
            Some(0) => RatFunc::one(),
            Some(1) => RatFunc::j(),
            Some(2) => RatFunc::from_int(-1),
            _ => -RatFunc::j(),
        };
    }
    let radians = crate::algebra::rational_to_f64(degrees).to_radians();
    let re = RatFunc::constant(rational_from_f64(radians.cos()));
    let im = RatFunc::constant(rational_from_f64(radians.sin()));
    &re + &(&RatFunc::j() * &im)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;

    fn rat(n: i64, d: i64) -> BigRational {
        BigRational::new(n.into(), d.into())
    }

    #[test]
    fn test_parse_value_with_unit() {
        assert_eq!(parse_number("1k").unwrap(), rat(1000, 1));
        assert_eq!(parse_number("1.5meg").unwrap(), rat(1_500_000, 1));
        assert_eq!(parse_number("10m").unwrap(), rat(1, 100));
        assert_eq!(parse_number("2.2u").unwrap(), rat(22, 10_000_000));
        assert_eq!(parse_number("5V").unwrap(), rat(5, 1));
        assert!(parse_number("R1").is_none());
    }

    #[test]
    fn test_expression_precedence() {
        let mut ctx = AnalysisContext::new();
        let e = parse_expr("1 + 2*3^2 - -4/2", &mut ctx).unwrap();
        assert_eq!(e.to_ratfunc().unwrap(), RatFunc::from_int(21));
        let r = RatFunc::var(ctx.symbol("R"));
        let e = parse_expr("(R + 1)/R", &mut ctx).unwrap();
        assert_eq!(e.to_ratfunc().unwrap(), (&r + &RatFunc::one()).try_div(&r).unwrap());
        assert!(parse_expr("2 +", &mut ctx).is_err());
        assert!(matches!(parse_expr("foo(t)", &mut ctx), Err(CircuitError::Parse { .. })));
    }

    #[test]
    fn test_preprocess_continuation_and_comments() {
        let lines = preprocess_lines("* title comment\nR1 1 2 ; trailing\n+ 1k\n\nC1 2 0 1u\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], Line { number: 2, text: "R1 1 2 1k".to_string() });
        assert_eq!(lines[1].number, 5);
    }

    #[test]
    fn test_parse_divider() {
        let circuit: Circuit = "V1 1 0 10\nR1 1 2 R\nR2 2 0 R\n".parse().unwrap();
        assert_eq!(circuit.components().len(), 3);
        let v = circuit.voltage("2").unwrap();
        assert_eq!(v.as_scalar().unwrap(), &RatFunc::from_int(5));
    }

    #[test]
    fn test_missing_value_is_named_symbol() {
        let circuit: Circuit = "R1 1 0\n".parse().unwrap();
        let id = circuit.context().registry.lookup("R1").unwrap();
        assert_eq!(circuit.component("R1").unwrap().kind, ComponentKind::Resistor(RatFunc::var(id)));
    }

    #[test]
    fn test_source_spellings() {
        let circuit: Circuit = "V1 1 0 dc 5 ac 2 1k 90\nV2 2 0 step 3\nI1 3 0 noise 1\nI2 4 0 noise 1\nV3 5 0 {cos(3*t)}\n"
            .parse()
            .unwrap();
        let v1 = circuit.component("V1").unwrap().source_value().unwrap();
        assert_eq!(v1.parts().len(), 2);
        assert_eq!(v1.parts()[0], Signal::Dc(RatFunc::from_int(5)));
        match &v1.parts()[1] {
            Signal::Ac { phasor, omega } => {
                assert_eq!(phasor, &(&RatFunc::from_int(2) * &RatFunc::j()));
                assert!(omega.contains(SymbolId::PI));
            }
            other => panic!("unexpected {:?}", other),
        }
        let v2 = circuit.component("V2").unwrap().source_value().unwrap();
        assert_eq!(v2.domains(), vec![Domain::Transient]);
        let n1 = circuit.component("I1").unwrap().source_value().unwrap().domains();
        let n2 = circuit.component("I2").unwrap().source_value().unwrap().domains();
        assert_ne!(n1, n2);
        let v3 = circuit.component("V3").unwrap().source_value().unwrap();
        assert_eq!(v3.domains(), vec![Domain::Ac(RatFunc::from_int(3))]);
    }

    #[test]
    fn test_four_terminal_elements() {
        let circuit: Circuit = "G1 1 0 2 0 gm\nG2 1 0 2\nE1 3 0 1 0 10\nTL1 1 0 4 0 50\nF1 5 0 V1 2\nV1 6 0 1\n"
            .parse()
            .unwrap();
        assert!(matches!(circuit.component("G1").unwrap().kind, ComponentKind::Vccs { .. }));
        assert!(matches!(circuit.component("G2").unwrap().kind, ComponentKind::Conductor(_)));
        assert!(circuit.context().registry.lookup("cosh_TL1").is_some());
        match &circuit.component("F1").unwrap().kind {
            ComponentKind::Cccs { control, gain } => {
                assert_eq!(control, "V1");
                assert_eq!(gain, &RatFunc::from_int(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_initial_conditions_and_params() {
        let circuit: Circuit = ".title rc\nC1 1 0 C 2\nR1 1 0 R\n.param R=1k\n.end\nR9 9 0 1\n".parse().unwrap();
        assert_eq!(circuit.title, "rc");
        assert!(circuit.has_initial_conditions());
        assert!(circuit.component("R9").is_err());
        assert_eq!(
            circuit.component("R1").unwrap().kind,
            ComponentKind::Resistor(RatFunc::from_int(1000))
        );
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = "R1 1 0 1\nQ1 1 2 3\n".parse::<Circuit>().unwrap_err();
        assert_eq!(err, CircuitError::Parse { line: 2, message: "unknown component type 'Q1'".to_string() });
        let err = "R1 1 0 1\n\nV1 1 0 dc\n".parse::<Circuit>().unwrap_err();
        assert!(matches!(err, CircuitError::Parse { line: 3, .. }));
        let err = "R1 1 0 {1+\n".parse::<Circuit>().unwrap_err();
        assert!(matches!(err, CircuitError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_unit_phasor_quadrants() {
        assert_eq!(unit_phasor(&rat(0, 1)), RatFunc::one());
        assert_eq!(unit_phasor(&rat(-90, 1)), -RatFunc::j());
        assert_eq!(unit_phasor(&rat(180, 1)), RatFunc::from_int(-1));
        assert_eq!(unit_phasor(&rat(450, 1)), RatFunc::j());
    }

    #[test]
    fn test_out_of_range_exponent_is_rejected() {
        let err = "V1 1 0 {2*1e99999999999}\nR1 1 0 1\n".parse::<Circuit>().unwrap_err();
        assert!(matches!(err, CircuitError::Parse { line: 1, .. }));
        let err = "R1 1 0 1e400\n".parse::<Circuit>().unwrap_err();
        assert!(matches!(err, CircuitError::Parse { line: 1, .. }));
        assert!(parse_number("1e999k").is_none());
        let mut ctx = AnalysisContext::new();
        assert!(parse_expr("3*1e-400", &mut ctx).is_err());
    }
}
