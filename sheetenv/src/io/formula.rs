//! Formula evaluation for the in-memory engine.
//!
//! Formulas are rewritten into Rhai expressions before evaluation:
//!
//! - `A1` / `$A$1` become `CELL(0, 0)`
//! - `A1:B5` becomes `RANGE(0, 0, 1, 4)` (col/row, corners normalized)
//! - `SUM(x; y)` becomes `SUM([x, y])` for every aggregate
//! - `=`, `<>` and `^` become `==`, `!=` and `**`
//!
//! Every read builds an [`Evaluator`] whose value cache lives for that read.
//! Dependencies are resolved bottom-up with an explicit stack, so reference
//! chains never recurse and every formula cell is evaluated at most once.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use regex::{Captures, Regex};
use rhai::{
    AST, Array, Dynamic, Engine, EvalAltResult, EvalContext, Expression, ImmutableString, ParseError, Position,
};

use crate::core::address::{CellAddr, RangeAddr};

/// Deepest expression nesting the parser accepts.
const MAX_EXPR_DEPTH: usize = 64;
const MAX_OPERATIONS: u64 = 1_000_000;
const MAX_STRING_SIZE: usize = 1 << 20;

/// Aggregates take a variable number of arguments, so their argument list is
/// passed as one array.
const AGGREGATES: &[&str] = &["SUM", "AVERAGE", "MIN", "MAX", "COUNT"];

/// Raw content of a cell as seen by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Empty,
    Number(f64),
    Text(&'a str),
    Formula(&'a str),
}

/// Cell access for one sheet.
pub trait CellSource {
    fn lookup(&self, cell: CellAddr) -> Lookup<'_>;

    /// Non-empty cells inside `range`, row-major.
    fn populated(&self, range: RangeAddr) -> Vec<CellAddr>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaError {
    /// Unknown function, unknown name or unparseable formula.
    Name,
    DivZero,
    Value,
    /// The formula depends on itself.
    Circular,
}

impl FormulaError {
    const ALL: [FormulaError; 4] = [
        FormulaError::Name,
        FormulaError::DivZero,
        FormulaError::Value,
        FormulaError::Circular,
    ];

    fn code(self) -> &'static str {
        match self {
            FormulaError::Name => "#NAME?",
            FormulaError::DivZero => "#DIV/0!",
            FormulaError::Value => "#VALUE!",
            FormulaError::Circular => "Err:522",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|err| err.code() == code)
    }
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of evaluating a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Empty,
    Number(f64),
    Text(String),
    Error(FormulaError),
}

impl Evaluated {
    /// Textual content: empty for numbers and empty cells.
    pub fn text(&self) -> String {
        match self {
            Evaluated::Text(s) => s.clone(),
            Evaluated::Error(e) => e.to_string(),
            Evaluated::Empty | Evaluated::Number(_) => String::new(),
        }
    }

    /// Numeric content: `0` for anything that is not a number.
    pub fn number(&self) -> f64 {
        match self {
            Evaluated::Number(n) => *n,
            _ => 0.0,
        }
    }
}

/// Integers print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Evaluate the content of `cell`, following references through `source`.
pub fn evaluate_cell(source: &dyn CellSource, cell: CellAddr) -> Evaluated {
    Evaluator::new(source).evaluate(cell)
}

/// Evaluated cells shared between the evaluator and the registered builtins.
/// `Pending` marks a formula whose dependencies are still being resolved.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Pending,
    Done(Evaluated),
}

type ValueCache = Arc<Mutex<BTreeMap<CellAddr, Slot>>>;

fn lock(cache: &ValueCache) -> MutexGuard<'_, BTreeMap<CellAddr, Slot>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cells a formula reads.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Reference {
    Cell(CellAddr),
    Range(RangeAddr),
}

struct Prepared {
    ast: AST,
    references: Vec<Reference>,
}

/// Evaluates cells of one sheet, caching every result for its lifetime.
pub struct Evaluator<'a> {
    source: &'a dyn CellSource,
    engine: Engine,
    cache: ValueCache,
}

impl<'a> Evaluator<'a> {
    pub fn new(source: &'a dyn CellSource) -> Self {
        let cache = ValueCache::default();
        Self {
            source,
            engine: create_engine_with_cache(cache.clone()),
            cache,
        }
    }

    pub fn evaluate(&self, cell: CellAddr) -> Evaluated {
        self.resolve(cell);
        match lock(&self.cache).get(&cell) {
            Some(Slot::Done(value)) => value.clone(),
            Some(Slot::Pending) => Evaluated::Error(FormulaError::Circular),
            None => Evaluated::Empty,
        }
    }

    /// Post-order walk over the dependencies of `root`. A formula reached again
    /// while it is still pending closes a cycle and is left for `CELL` to report.
    fn resolve(&self, root: CellAddr) {
        let mut stack = vec![(root, false)];
        let mut prepared: HashMap<CellAddr, Result<Prepared, FormulaError>> = HashMap::new();

        while let Some((cell, expanded)) = stack.pop() {
            if expanded {
                let value = match prepared.remove(&cell) {
                    Some(Ok(formula)) => self.run(&formula.ast),
                    Some(Err(err)) => Evaluated::Error(err),
                    None => Evaluated::Empty,
                };
                lock(&self.cache).insert(cell, Slot::Done(value));
                continue;
            }
            if lock(&self.cache).contains_key(&cell) {
                continue;
            }

            let formula = match self.source.lookup(cell) {
                Lookup::Empty => {
                    lock(&self.cache).insert(cell, Slot::Done(Evaluated::Empty));
                    continue;
                }
                Lookup::Number(n) => {
                    lock(&self.cache).insert(cell, Slot::Done(Evaluated::Number(n)));
                    continue;
                }
                Lookup::Text(s) => {
                    lock(&self.cache).insert(cell, Slot::Done(Evaluated::Text(s.to_string())));
                    continue;
                }
                Lookup::Formula(src) => self.prepare(src),
            };

            lock(&self.cache).insert(cell, Slot::Pending);
            stack.push((cell, true));
            if let Ok(formula) = &formula {
                for reference in &formula.references {
                    match *reference {
                        Reference::Cell(dep) => stack.push((dep, false)),
                        Reference::Range(range) => {
                            stack.extend(self.source.populated(range).into_iter().map(|dep| (dep, false)));
                        }
                    }
                }
            }
            prepared.insert(cell, formula);
        }
    }

    fn prepare(&self, src: &str) -> Result<Prepared, FormulaError> {
        let body = src.strip_prefix('=').ok_or(FormulaError::Name)?;
        let (script, references) = preprocess_formula(body)?;
        let ast = self
            .engine
            .compile_expression(&script)
            .map_err(|_| FormulaError::Name)?;
        Ok(Prepared { ast, references })
    }

    fn run(&self, ast: &AST) -> Evaluated {
        match self.engine.eval_ast::<Dynamic>(ast) {
            Ok(value) => from_dynamic(value),
            Err(err) => Evaluated::Error(classify_error(&err)),
        }
    }
}

fn from_dynamic(value: Dynamic) -> Evaluated {
    if value.is_unit() {
        return Evaluated::Empty;
    }
    if let Ok(n) = value.as_float() {
        return if n.is_finite() {
            Evaluated::Number(n)
        } else {
            Evaluated::Error(FormulaError::DivZero)
        };
    }
    if let Ok(n) = value.as_int() {
        return Evaluated::Number(n as f64);
    }
    if let Ok(b) = value.as_bool() {
        return Evaluated::Number(if b { 1.0 } else { 0.0 });
    }
    if value.is_string() {
        return Evaluated::Text(value.to_string());
    }
    // Arrays from a bare range have no single value.
    Evaluated::Error(FormulaError::Value)
}

fn to_dynamic(value: &Evaluated) -> Result<Dynamic, Box<EvalAltResult>> {
    match value {
        Evaluated::Empty => Ok(Dynamic::from_float(0.0)),
        Evaluated::Number(n) => Ok(Dynamic::from_float(*n)),
        Evaluated::Text(s) => Ok(Dynamic::from(s.clone())),
        Evaluated::Error(err) => Err(formula_error(*err)),
    }
}

fn classify_error(err: &EvalAltResult) -> FormulaError {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => {
            FormulaError::from_code(&value.to_string()).unwrap_or(FormulaError::Value)
        }
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => classify_error(inner),
        // Operators are looked up as functions named after their symbol.
        EvalAltResult::ErrorFunctionNotFound(signature, _) => {
            if signature.starts_with(|c: char| c.is_ascii_alphabetic()) {
                FormulaError::Name
            } else {
                FormulaError::Value
            }
        }
        EvalAltResult::ErrorVariableNotFound(..) | EvalAltResult::ErrorParsing(..) => FormulaError::Name,
        EvalAltResult::ErrorArithmetic(message, _) if message.contains("zero") => FormulaError::DivZero,
        _ => FormulaError::Value,
    }
}

fn formula_error(err: FormulaError) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(err.code().into(), Position::NONE).into()
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[0-9]+(?:\.[0-9]*)?(?:[eE][+-]?[0-9]+)?|\B\.[0-9]+(?:[eE][+-]?[0-9]+)?")
        .expect("valid number regex")
});

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z]{1,3}[0-9]+):([A-Za-z]{1,3}[0-9]+)\b").expect("valid range regex")
});

static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z]{1,3}[0-9]+)\b").expect("valid cell regex"));

static BOOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?i:(true)|false)\b").expect("valid boolean regex"));

static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid call regex"));

/// A formula body split at its string literals.
#[derive(Debug, PartialEq)]
enum Segment {
    Code(String),
    Text(String),
}

/// Split on `"..."` literals; `""` inside a literal is an escaped quote.
fn split_literals(body: &str) -> Result<Vec<Segment>, FormulaError> {
    let mut segments = Vec::new();
    let mut code = String::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '"' {
            code.push(c);
            continue;
        }
        segments.push(Segment::Code(std::mem::take(&mut code)));
        let mut text = String::new();
        loop {
            match chars.next() {
                None => return Err(FormulaError::Name),
                Some('"') if chars.peek() == Some(&'"') => {
                    chars.next();
                    text.push('"');
                }
                Some('"') => break,
                Some(ch) => text.push(ch),
            }
        }
        segments.push(Segment::Text(text));
    }
    segments.push(Segment::Code(code));
    Ok(segments)
}

/// Rewrite a formula body (without the leading `=`) into a Rhai expression
/// and collect the cells it reads.
fn preprocess_formula(body: &str) -> Result<(String, Vec<Reference>), FormulaError> {
    let mut script = String::with_capacity(body.len() * 2);
    let mut references = Vec::new();
    let mut aggregate_parens = Vec::new();

    for segment in split_literals(body)? {
        match segment {
            Segment::Text(text) => script.push_str(&rhai_string(&text)),
            Segment::Code(code) => {
                let code = rewrite_references(&code, &mut references)?;
                rewrite_operators(&code, &mut aggregate_parens, &mut script);
            }
        }
    }
    Ok((script, references))
}

fn rhai_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Float literals never carry an exponent.
fn float_literal(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

fn rewrite_references(code: &str, references: &mut Vec<Reference>) -> Result<String, FormulaError> {
    let mut failed = false;
    let code = code.replace('$', "");

    // Numbers first, so every later integer literal is an address index.
    let code = NUMBER_RE.replace_all(&code, |caps: &Captures| match caps[0].parse::<f64>() {
        Ok(n) => float_literal(n),
        Err(_) => {
            failed = true;
            String::new()
        }
    });

    let code = RANGE_RE.replace_all(&code, |caps: &Captures| {
        match RangeAddr::parse(&format!("{}:{}", &caps[1], &caps[2])) {
            Some(range) => {
                references.push(Reference::Range(range));
                format!(
                    "RANGE({}, {}, {}, {})",
                    range.start.col, range.start.row, range.end.col, range.end.row
                )
            }
            None => {
                failed = true;
                String::new()
            }
        }
    });

    let code = CELL_RE.replace_all(&code, |caps: &Captures| match CellAddr::parse(&caps[1]) {
        Some(cell) => {
            references.push(Reference::Cell(cell));
            format!("CELL({}, {})", cell.col, cell.row)
        }
        None => {
            failed = true;
            String::new()
        }
    });

    let code = BOOL_RE.replace_all(&code, |caps: &Captures| match caps.get(1) {
        Some(_) => "1.0",
        None => "0.0",
    });

    let code = CALL_RE.replace_all(&code, |caps: &Captures| format!("{}(", caps[1].to_ascii_uppercase()));

    if failed {
        return Err(FormulaError::Name);
    }
    Ok(code.into_owned())
}

/// Map spreadsheet operators onto Rhai and wrap aggregate arguments in an
/// array. `parens` tracks, per open parenthesis, whether it opened an aggregate.
fn rewrite_operators(code: &str, parens: &mut Vec<bool>, out: &mut String) {
    let chars: Vec<char> = code.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                out.push_str(&name);
                if chars.get(i) == Some(&'(') && AGGREGATES.contains(&name.as_str()) {
                    out.push_str("([");
                    parens.push(true);
                    i += 1;
                }
                continue;
            }
            '(' => {
                parens.push(false);
                out.push('(');
            }
            ')' => {
                if parens.pop() == Some(true) {
                    out.push(']');
                }
                out.push(')');
            }
            ';' => out.push(','),
            '^' => out.push_str("**"),
            '<' if chars.get(i + 1) == Some(&'>') => {
                out.push_str("!=");
                i += 1;
            }
            '<' | '>' | '!' if chars.get(i + 1) == Some(&'=') => {
                out.push(c);
                out.push('=');
                i += 1;
            }
            '=' => {
                out.push_str("==");
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                }
            }
            other => out.push(other),
        }
        i += 1;
    }
}

// ---------------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------------

/// Create a Rhai engine with the spreadsheet builtins reading from `cache`.
fn create_engine_with_cache(cache: ValueCache) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_string_size(MAX_STRING_SIZE);
    // Registered operators below replace Rhai's built-in ones.
    engine.set_fast_operators(false);
    register_builtins(&mut engine, cache);
    engine
}

fn register_builtins(engine: &mut Engine, cache: ValueCache) {
    let cells = cache.clone();
    engine.register_fn("CELL", move |col: i64, row: i64| -> Result<Dynamic, Box<EvalAltResult>> {
        let cell = CellAddr::new(to_index(col)?, to_index(row)?);
        match lock(&cells).get(&cell) {
            Some(Slot::Done(value)) => to_dynamic(value),
            Some(Slot::Pending) => Err(formula_error(FormulaError::Circular)),
            None => Ok(Dynamic::from_float(0.0)),
        }
    });

    // Numbers inside a range; text and empty cells are skipped.
    let ranges = cache;
    engine.register_fn(
        "RANGE",
        move |c1: i64, r1: i64, c2: i64, r2: i64| -> Result<Array, Box<EvalAltResult>> {
            let start = CellAddr::new(to_index(c1)?, to_index(r1)?);
            let end = CellAddr::new(to_index(c2)?, to_index(r2)?);
            if start.col > end.col || start.row > end.row {
                return Err(formula_error(FormulaError::Value));
            }
            let cache = lock(&ranges);
            let mut values = Array::new();
            for (cell, slot) in cache.range(start..=end) {
                if cell.col < start.col || cell.col > end.col {
                    continue;
                }
                match slot {
                    Slot::Pending => return Err(formula_error(FormulaError::Circular)),
                    Slot::Done(Evaluated::Number(n)) => values.push(Dynamic::from_float(*n)),
                    Slot::Done(Evaluated::Error(err)) => return Err(formula_error(*err)),
                    Slot::Done(_) => {}
                }
            }
            Ok(values)
        },
    );

    engine.register_fn("SUM", |args: Array| numbers(&args).into_iter().sum::<f64>());
    engine.register_fn("AVERAGE", |args: Array| -> Result<f64, Box<EvalAltResult>> {
        let nums = numbers(&args);
        if nums.is_empty() {
            return Err(formula_error(FormulaError::DivZero));
        }
        Ok(nums.iter().sum::<f64>() / nums.len() as f64)
    });
    engine.register_fn("MIN", |args: Array| numbers(&args).into_iter().reduce(f64::min).unwrap_or(0.0));
    engine.register_fn("MAX", |args: Array| numbers(&args).into_iter().reduce(f64::max).unwrap_or(0.0));
    engine.register_fn("COUNT", |args: Array| numbers(&args).len() as f64);

    engine.register_fn("ABS", |x: Dynamic| -> Result<f64, Box<EvalAltResult>> { Ok(coerce(&x)?.abs()) });
    engine.register_fn("ROUND", |x: Dynamic| -> Result<f64, Box<EvalAltResult>> { round(&x, 0.0) });
    engine.register_fn("ROUND", |x: Dynamic, digits: Dynamic| -> Result<f64, Box<EvalAltResult>> {
        round(&x, coerce(&digits)?)
    });

    // IF only evaluates the branch it takes.
    engine.register_custom_syntax_with_state_raw(
        "IF",
        |symbols: &[ImmutableString], look_ahead: &str, _state: &mut Dynamic| -> Result<Option<ImmutableString>, ParseError> {
            if symbols.len() > 1 && symbols.last().is_some_and(|s| s.as_str() == ")") {
                return Ok(None);
            }
            let next = match symbols.len() {
                1 => "(",
                2 | 4 | 6 => "$expr$",
                3 => ",",
                5 if look_ahead == "," => ",",
                _ => ")",
            };
            Ok(Some(next.into()))
        },
        false,
        |context: &mut EvalContext, inputs: &[Expression], _state: &Dynamic| -> Result<Dynamic, Box<EvalAltResult>> {
            let condition = context.eval_expression_tree(&inputs[0])?;
            if truthy(&condition)? {
                context.eval_expression_tree(&inputs[1])
            } else if let Some(otherwise) = inputs.get(2) {
                context.eval_expression_tree(otherwise)
            } else {
                Ok(Dynamic::from_float(0.0))
            }
        },
    );

    register_operators(engine);
}

/// Text operands of arithmetic are parsed as numbers; comparisons between text
/// ignore case and put numbers before text.
fn register_operators(engine: &mut Engine) {
    type Text = ImmutableString;
    type Num = Result<f64, Box<EvalAltResult>>;

    engine.register_fn("/", |a: f64, b: f64| -> Num { divide(a, b) });
    macro_rules! arithmetic {
        ($($op:literal => $f:expr),* $(,)?) => {$(
            engine.register_fn($op, |a: Text, b: Text| -> Num { ($f)(text_number(&a)?, text_number(&b)?) });
            engine.register_fn($op, |a: Text, b: f64| -> Num { ($f)(text_number(&a)?, b) });
            engine.register_fn($op, |a: f64, b: Text| -> Num { ($f)(a, text_number(&b)?) });
        )*};
    }
    arithmetic! {
        "+" => |a: f64, b: f64| -> Num { Ok(a + b) },
        "-" => |a: f64, b: f64| -> Num { Ok(a - b) },
        "*" => |a: f64, b: f64| -> Num { Ok(a * b) },
        "/" => divide,
        "**" => |a: f64, b: f64| -> Num { Ok(a.powf(b)) },
    }

    engine.register_fn("&", |a: Text, b: Text| format!("{a}{b}"));
    engine.register_fn("&", |a: Text, b: f64| format!("{a}{}", format_number(b)));
    engine.register_fn("&", |a: f64, b: Text| format!("{}{b}", format_number(a)));
    engine.register_fn("&", |a: f64, b: f64| format!("{}{}", format_number(a), format_number(b)));

    macro_rules! comparison {
        ($($op:literal => $holds:expr),* $(,)?) => {$(
            engine.register_fn($op, |a: Text, b: Text| ($holds)(a.to_lowercase().cmp(&b.to_lowercase())));
            engine.register_fn($op, |_: f64, _: Text| ($holds)(std::cmp::Ordering::Less));
            engine.register_fn($op, |_: Text, _: f64| ($holds)(std::cmp::Ordering::Greater));
        )*};
    }
    comparison! {
        "==" => std::cmp::Ordering::is_eq,
        "!=" => std::cmp::Ordering::is_ne,
        "<" => std::cmp::Ordering::is_lt,
        "<=" => std::cmp::Ordering::is_le,
        ">" => std::cmp::Ordering::is_gt,
        ">=" => std::cmp::Ordering::is_ge,
    }
}

fn divide(a: f64, b: f64) -> Result<f64, Box<EvalAltResult>> {
    if b == 0.0 {
        return Err(formula_error(FormulaError::DivZero));
    }
    Ok(a / b)
}

fn to_index(value: i64) -> Result<usize, Box<EvalAltResult>> {
    usize::try_from(value).map_err(|_| formula_error(FormulaError::Value))
}

fn text_number(text: &str) -> Result<f64, Box<EvalAltResult>> {
    if text.trim().is_empty() {
        return Ok(0.0);
    }
    text.trim().parse::<f64>().map_err(|_| formula_error(FormulaError::Value))
}

fn coerce(value: &Dynamic) -> Result<f64, Box<EvalAltResult>> {
    if let Ok(n) = value.as_float() {
        return Ok(n);
    }
    if let Ok(n) = value.as_int() {
        return Ok(n as f64);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(if b { 1.0 } else { 0.0 });
    }
    if value.is_string() {
        return text_number(&value.to_string());
    }
    Err(formula_error(FormulaError::Value))
}

fn truthy(value: &Dynamic) -> Result<bool, Box<EvalAltResult>> {
    Ok(coerce(value)? != 0.0)
}

fn round(x: &Dynamic, digits: f64) -> Result<f64, Box<EvalAltResult>> {
    let scale = 10f64.powi(digits.trunc() as i32);
    Ok((coerce(x)? * scale).round() / scale)
}

/// Numbers contributed by aggregate arguments: ranges arrive as nested arrays
/// of numbers, direct text arguments are skipped.
fn numbers(args: &Array) -> Vec<f64> {
    let mut out = Vec::new();
    for arg in args {
        if let Some(inner) = arg.read_lock::<Array>() {
            out.extend(numbers(&inner));
        } else if let Ok(n) = arg.as_float() {
            out.push(n);
        } else if let Ok(n) = arg.as_int() {
            out.push(n as f64);
        } else if let Ok(b) = arg.as_bool() {
            out.push(if b { 1.0 } else { 0.0 });
        }
    }
    out
}
