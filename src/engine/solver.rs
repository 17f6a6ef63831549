//! The embedded logic solver.
//!
//! A deterministic Datalog evaluator behind the pluggable `LogicSolver`
//! contract: named programs with category labels, naive bottom-up evaluation
//! with stratified negation, and `#show` projection of the answer set.
//! Relations iterate in sorted order, so identical inputs always produce the
//! identical answer list.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use crate::error::CardoError;

/// Category every program belongs to implicitly.
pub const CATEGORY_ALL: &str = "all";

/// Library contract of the solver; the bundled implementation is
/// `DatalogSolver`, but anything honouring this interface can be plugged in.
pub trait LogicSolver {
    fn set_program(&mut self, name: &str, text: &str, categories: &[String]);
    fn remove_program(&mut self, name: &str);
    fn remove_all_programs(&mut self);
    /// Concatenation of the selected programs plus `extra`.
    fn build_program(&self, extra: &str, categories: &[String]) -> String;
    /// Evaluate the selected programs plus the query; answers are the shown
    /// ground atoms, rendered as strings and sorted.
    fn solve(&self, query: &str, categories: &[String]) -> Result<Vec<String>, CardoError>;
}

#[derive(Debug, Clone)]
struct StoredProgram {
    text: String,
    categories: BTreeSet<String>,
}

/// Named, category-scoped program store with a Datalog evaluator.
#[derive(Debug, Default)]
pub struct DatalogSolver {
    programs: BTreeMap<String, StoredProgram>,
}

impl DatalogSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Programs in the `all` category are always selected; others only when
    /// the request names one of their categories.
    fn selected(&self, categories: &[String]) -> impl Iterator<Item = &StoredProgram> {
        let requested: BTreeSet<&str> = categories.iter().map(String::as_str).collect();
        self.programs.values().filter(move |program| {
            program.categories.contains(CATEGORY_ALL)
                || program.categories.iter().any(|c| requested.contains(c.as_str()))
        })
    }
}

impl LogicSolver for DatalogSolver {
    fn set_program(&mut self, name: &str, text: &str, categories: &[String]) {
        let mut categories: BTreeSet<String> = categories.iter().cloned().collect();
        if categories.is_empty() {
            categories.insert(CATEGORY_ALL.to_string());
        }
        self.programs
            .insert(name.to_string(), StoredProgram { text: text.to_string(), categories });
    }

    fn remove_program(&mut self, name: &str) {
        self.programs.remove(name);
    }

    fn remove_all_programs(&mut self) {
        self.programs.clear();
    }

    fn build_program(&self, extra: &str, categories: &[String]) -> String {
        let mut out = String::new();
        for program in self.selected(categories) {
            out.push_str(&program.text);
            if !program.text.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push_str(extra);
        out
    }

    fn solve(&self, query: &str, categories: &[String]) -> Result<Vec<String>, CardoError> {
        let text = self.build_program(query, categories);
        let parsed = parse_program(&text)?;
        evaluate(&parsed)
    }
}

// ---------------------------------------------------------------------------
// Terms, atoms, rules

/// A ground value in a relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Const {
    Int(i64),
    Sym(String),
    Str(String),
}

impl Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(i) => write!(f, "{i}"),
            Const::Sym(s) => f.write_str(s),
            Const::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Const(Const),
    Var(String),
    /// `_`: matches anything, binds nothing.
    Anonymous,
}

#[derive(Debug, Clone)]
struct Atom {
    predicate: String,
    terms: Vec<Term>,
}

#[derive(Debug, Clone)]
enum BodyLiteral {
    Positive(Atom),
    Negative(Atom),
    /// `t1 != t2` over bound terms.
    NotEqual(Term, Term),
    /// `t1 == t2` over bound terms.
    Equal(Term, Term),
}

#[derive(Debug, Clone)]
struct Rule {
    head: Atom,
    body: Vec<BodyLiteral>,
}

#[derive(Debug, Default)]
struct ParsedProgram {
    rules: Vec<Rule>,
    /// `#show pred/arity.` projections, in declaration order.
    shown: Vec<(String, usize)>,
}

// ---------------------------------------------------------------------------
// Parser

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input: input.as_bytes(), pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> CardoError {
        let consumed = &self.input[..self.pos];
        let line = consumed.iter().filter(|&&b| b == b'\n').count() + 1;
        CardoError::SolverFailure(format!("parse error at line {line}: {}", message.into()))
    }

    fn skip_trivia(&mut self) {
        loop {
            while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos < self.input.len() && self.input[self.pos] == b'%' {
                while self.pos < self.input.len() && self.input[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: u8) -> Result<(), CardoError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", expected as char)))
        }
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix.as_bytes())
    }

    fn identifier(&mut self) -> Result<String, CardoError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected an identifier"));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn string_literal(&mut self) -> Result<String, CardoError> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'"') => out.push('"'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'n') => out.push('\n'),
                        other => {
                            return Err(self.error(format!(
                                "invalid escape '\\{}'",
                                other.map(|b| b as char).unwrap_or(' ')
                            )));
                        }
                    }
                    self.pos += 1;
                }
                Some(_) => {
                    let start = self.pos;
                    while self
                        .peek()
                        .is_some_and(|b| b != b'"' && b != b'\\')
                    {
                        self.pos += 1;
                    }
                    out.push_str(&String::from_utf8_lossy(&self.input[start..self.pos]));
                }
                None => return Err(self.error("unterminated string literal")),
            }
        }
    }

    fn term(&mut self) -> Result<Term, CardoError> {
        self.skip_trivia();
        match self.peek() {
            Some(b'"') => Ok(Term::Const(Const::Str(self.string_literal()?))),
            Some(b'-') => {
                self.pos += 1;
                let digits = self.integer()?;
                Ok(Term::Const(Const::Int(-digits)))
            }
            Some(b) if b.is_ascii_digit() => Ok(Term::Const(Const::Int(self.integer()?))),
            Some(b'_') if !self
                .input
                .get(self.pos + 1)
                .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_') =>
            {
                self.pos += 1;
                Ok(Term::Anonymous)
            }
            Some(b) if b.is_ascii_uppercase() || b == b'_' => Ok(Term::Var(self.identifier()?)),
            Some(b) if b.is_ascii_lowercase() => Ok(Term::Const(Const::Sym(self.identifier()?))),
            _ => Err(self.error("expected a term")),
        }
    }

    fn integer(&mut self) -> Result<i64, CardoError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected digits"));
        }
        String::from_utf8_lossy(&self.input[start..self.pos])
            .parse()
            .map_err(|e| self.error(format!("invalid integer: {e}")))
    }

    fn atom(&mut self) -> Result<Atom, CardoError> {
        self.skip_trivia();
        let predicate = self.identifier()?;
        let mut terms = Vec::new();
        if self.eat(b'(') {
            loop {
                terms.push(self.term()?);
                self.skip_trivia();
                if self.eat(b',') {
                    continue;
                }
                self.expect(b')')?;
                break;
            }
        }
        Ok(Atom { predicate, terms })
    }

    fn body_literal(&mut self) -> Result<BodyLiteral, CardoError> {
        self.skip_trivia();
        if self.starts_with("not") {
            let after = self.input.get(self.pos + 3);
            if after.is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 3;
                return Ok(BodyLiteral::Negative(self.atom()?));
            }
        }
        // Comparison or atom: parse a term first when it cannot start an atom.
        let checkpoint = self.pos;
        let left = self.term()?;
        self.skip_trivia();
        if self.starts_with("!=") {
            self.pos += 2;
            let right = self.term()?;
            return Ok(BodyLiteral::NotEqual(left, right));
        }
        if self.starts_with("==") {
            self.pos += 2;
            let right = self.term()?;
            return Ok(BodyLiteral::Equal(left, right));
        }
        // Not a comparison: re-parse as an atom.
        self.pos = checkpoint;
        Ok(BodyLiteral::Positive(self.atom()?))
    }

    fn statement(&mut self, program: &mut ParsedProgram) -> Result<(), CardoError> {
        self.skip_trivia();
        if self.starts_with("#show") {
            self.pos += 5;
            self.skip_trivia();
            let predicate = self.identifier()?;
            self.skip_trivia();
            self.expect(b'/')?;
            let arity = self.integer()? as usize;
            self.skip_trivia();
            self.expect(b'.')?;
            program.shown.push((predicate, arity));
            return Ok(());
        }

        let head = self.atom()?;
        self.skip_trivia();
        let mut body = Vec::new();
        if self.starts_with(":-") {
            self.pos += 2;
            loop {
                body.push(self.body_literal()?);
                self.skip_trivia();
                if self.eat(b',') {
                    continue;
                }
                break;
            }
        }
        self.expect(b'.')?;
        program.rules.push(Rule { head, body });
        Ok(())
    }
}

fn parse_program(text: &str) -> Result<ParsedProgram, CardoError> {
    let mut parser = Parser::new(text);
    let mut program = ParsedProgram::default();
    loop {
        parser.skip_trivia();
        if parser.peek().is_none() {
            break;
        }
        parser.statement(&mut program)?;
    }
    Ok(program)
}

// ---------------------------------------------------------------------------
// Evaluation

type Tuple = Vec<Const>;
type Relation = BTreeSet<Tuple>;
type Database = BTreeMap<(String, usize), Relation>;

fn signature(atom: &Atom) -> (String, usize) {
    (atom.predicate.clone(), atom.terms.len())
}

/// Assign each predicate a stratum so that negative dependencies always point
/// strictly downward. Fails on negation cycles.
fn stratify(program: &ParsedProgram) -> Result<Vec<Vec<&Rule>>, CardoError> {
    let mut strata: BTreeMap<(String, usize), usize> = BTreeMap::new();
    for rule in &program.rules {
        strata.entry(signature(&rule.head)).or_insert(0);
        for literal in &rule.body {
            match literal {
                BodyLiteral::Positive(atom) | BodyLiteral::Negative(atom) => {
                    strata.entry(signature(atom)).or_insert(0);
                }
                _ => {}
            }
        }
    }

    let max_rounds = strata.len() + 1;
    for round in 0..=max_rounds {
        let mut changed = false;
        for rule in &program.rules {
            let head = signature(&rule.head);
            for literal in &rule.body {
                let (dep, strict) = match literal {
                    BodyLiteral::Positive(atom) => (signature(atom), false),
                    BodyLiteral::Negative(atom) => (signature(atom), true),
                    _ => continue,
                };
                let dep_stratum = strata[&dep];
                let required = if strict { dep_stratum + 1 } else { dep_stratum };
                if strata[&head] < required {
                    strata.insert(head.clone(), required);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
        if round == max_rounds {
            return Err(CardoError::SolverFailure(
                "program is not stratifiable: negation cycle detected".into(),
            ));
        }
    }

    let levels = strata.values().copied().max().unwrap_or(0);
    let mut layers: Vec<Vec<&Rule>> = vec![Vec::new(); levels + 1];
    for rule in &program.rules {
        layers[strata[&signature(&rule.head)]].push(rule);
    }
    Ok(layers)
}

fn evaluate(program: &ParsedProgram) -> Result<Vec<String>, CardoError> {
    let layers = stratify(program)?;
    let mut db: Database = BTreeMap::new();

    for layer in &layers {
        // Fixpoint within the stratum.
        loop {
            let mut added = false;
            for rule in layer {
                let mut bindings: Vec<BTreeMap<String, Const>> = vec![BTreeMap::new()];
                for literal in &rule.body {
                    bindings = join(&db, bindings, literal)?;
                    if bindings.is_empty() {
                        break;
                    }
                }
                for binding in &bindings {
                    let tuple = ground_head(&rule.head, binding)?;
                    let relation = db.entry(signature(&rule.head)).or_default();
                    if relation.insert(tuple) {
                        added = true;
                    }
                }
            }
            if !added {
                break;
            }
        }
    }

    let mut answers = Vec::new();
    for (predicate, arity) in &program.shown {
        if let Some(relation) = db.get(&(predicate.clone(), *arity)) {
            for tuple in relation {
                answers.push(render_atom(predicate, tuple));
            }
        }
    }
    answers.sort();
    Ok(answers)
}

fn render_atom(predicate: &str, tuple: &[Const]) -> String {
    if tuple.is_empty() {
        return predicate.to_string();
    }
    let args: Vec<String> = tuple.iter().map(Const::to_string).collect();
    format!("{predicate}({})", args.join(","))
}

fn resolve(term: &Term, binding: &BTreeMap<String, Const>) -> Option<Const> {
    match term {
        Term::Const(c) => Some(c.clone()),
        Term::Var(name) => binding.get(name).cloned(),
        Term::Anonymous => None,
    }
}

fn join(
    db: &Database,
    bindings: Vec<BTreeMap<String, Const>>,
    literal: &BodyLiteral,
) -> Result<Vec<BTreeMap<String, Const>>, CardoError> {
    let mut out = Vec::new();
    match literal {
        BodyLiteral::Positive(atom) => {
            let empty = Relation::new();
            let relation = db.get(&signature(atom)).unwrap_or(&empty);
            for binding in &bindings {
                for tuple in relation {
                    if let Some(extended) = unify(atom, tuple, binding) {
                        out.push(extended);
                    }
                }
            }
        }
        BodyLiteral::Negative(atom) => {
            let empty = Relation::new();
            let relation = db.get(&signature(atom)).unwrap_or(&empty);
            for binding in bindings {
                let matches = relation.iter().any(|tuple| unify(atom, tuple, &binding).is_some());
                if !matches {
                    out.push(binding);
                }
            }
        }
        BodyLiteral::NotEqual(left, right) | BodyLiteral::Equal(left, right) => {
            let want_equal = matches!(literal, BodyLiteral::Equal(_, _));
            for binding in bindings {
                let (Some(l), Some(r)) = (resolve(left, &binding), resolve(right, &binding)) else {
                    return Err(CardoError::SolverFailure(
                        "comparison over unbound terms".into(),
                    ));
                };
                if (l == r) == want_equal {
                    out.push(binding);
                }
            }
        }
    }
    Ok(out)
}

fn unify(
    atom: &Atom,
    tuple: &[Const],
    binding: &BTreeMap<String, Const>,
) -> Option<BTreeMap<String, Const>> {
    if atom.terms.len() != tuple.len() {
        return None;
    }
    let mut extended = binding.clone();
    for (term, value) in atom.terms.iter().zip(tuple) {
        match term {
            Term::Anonymous => {}
            Term::Const(c) => {
                if c != value {
                    return None;
                }
            }
            Term::Var(name) => match extended.get(name) {
                Some(bound) if bound != value => return None,
                Some(_) => {}
                None => {
                    extended.insert(name.clone(), value.clone());
                }
            },
        }
    }
    Some(extended)
}

fn ground_head(atom: &Atom, binding: &BTreeMap<String, Const>) -> Result<Tuple, CardoError> {
    atom.terms
        .iter()
        .map(|term| {
            resolve(term, binding).ok_or_else(|| {
                CardoError::SolverFailure(format!(
                    "unbound variable in head of '{}'",
                    atom.predicate
                ))
            })
        })
        .collect()
}

/// Quote a string for embedding into a program as a constant.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Parse one rendered answer atom back into predicate and constants.
pub fn parse_ground_atom(text: &str) -> Result<(String, Vec<Const>), CardoError> {
    let mut parser = Parser::new(text);
    let atom = parser.atom()?;
    parser.skip_trivia();
    if parser.peek().is_some() {
        return Err(CardoError::SolverFailure(format!(
            "trailing input in answer atom '{text}'"
        )));
    }
    let constants = atom
        .terms
        .into_iter()
        .map(|term| match term {
            Term::Const(c) => Ok(c),
            _ => Err(CardoError::SolverFailure(format!(
                "answer atom '{text}' contains a variable"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((atom.predicate, constants))
}
