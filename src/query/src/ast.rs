use std::fmt;
use std::fmt::Display;

use common::query::DateValue;
use common::query::TimeIntervalUnit;

/// Actor-set combinators. Evaluated strictly left to right; EXCEPT is
/// non-commutative, so operands are never reordered or deduplicated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetOperator {
    UnionAll,
    Intersect,
    Except,
}

impl Display for SetOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SetOperator::UnionAll => write!(f, "UNION ALL"),
            SetOperator::Intersect => write!(f, "INTERSECT"),
            SetOperator::Except => write!(f, "EXCEPT"),
        }
    }
}

/// A query plan: a single actor-producing select, or a chain of selects
/// combined with set operations.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanNode {
    Select(Box<SelectQuery>),
    Set(SelectSetQuery),
}

impl PlanNode {
    pub fn select(query: SelectQuery) -> Self {
        PlanNode::Select(Box::new(query))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectSetQuery {
    pub initial: Box<PlanNode>,
    pub subsequent: Vec<SelectSetNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectSetNode {
    pub set_operator: SetOperator,
    pub query: PlanNode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Table {
    Events,
    Persons,
    StaticCohortPersons,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    Table(Table),
    Subquery(Box<PlanNode>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectQuery {
    pub select: Vec<Expr>,
    pub source: Source,
    pub predicate: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

impl SelectQuery {
    pub fn new(select: Vec<Expr>, source: Source) -> Self {
        SelectQuery {
            select,
            source,
            predicate: None,
            group_by: vec![],
            having: None,
        }
    }
}

/// Binary comparison operators, rendered in function form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    ILike,
    NotILike,
    RegexMatch,
    RegexNotMatch,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(DateValue),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Column(String),
    /// Event-scoped property access on the events table.
    EventProperty(String),
    /// Person attribute access on the persons table.
    PersonProperty(String),
    /// Person attribute denormalized onto event rows.
    PersonPropertyOnEvent(String),
    Literal(Literal),
    Alias(Box<Expr>, String),
    Binary {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Min(Box<Expr>),
    Count,
    /// Truncates a timestamp to the start of its period.
    DateTrunc {
        unit: TimeIntervalUnit,
        expr: Box<Expr>,
    },
    /// Deepest step of an ordered event sequence completed by the actor
    /// within the window, `windowFunnel(window)(ts, cond...)` semantics.
    WindowFunnel {
        window_seconds: i64,
        timestamp: Box<Expr>,
        steps: Vec<Expr>,
    },
    /// Reference to an action definition, resolvable only in the semantic
    /// dialect.
    MatchesAction(u64),
}

pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_owned())
}

pub fn lit_str(value: &str) -> Expr {
    Expr::Literal(Literal::String(value.to_owned()))
}

pub fn lit_int(value: i64) -> Expr {
    Expr::Literal(Literal::Int(value))
}

pub fn binary_expr(left: Expr, op: Operator, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

pub fn multi_and(mut exprs: Vec<Expr>) -> Expr {
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::And(exprs)
    }
}

pub fn multi_or(mut exprs: Vec<Expr>) -> Expr {
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::Or(exprs)
    }
}
