use common::query::DateValue;
use common::query::TimeIntervalUnit;
use common::types::COLUMN_PERSON_PROPERTIES;
use common::types::COLUMN_PROPERTIES;
use common::types::COLUMN_TEAM_ID;
use common::types::TABLE_EVENTS;
use common::types::TABLE_PERSONS;
use common::types::TABLE_STATIC_COHORT;

use crate::ast::binary_expr;
use crate::ast::col;
use crate::ast::lit_int;
use crate::ast::multi_and;
use crate::ast::Expr;
use crate::ast::Literal;
use crate::ast::Operator;
use crate::ast::PlanNode;
use crate::ast::SelectQuery;
use crate::ast::Source;
use crate::ast::Table;
use crate::context::Context;
use crate::error::QueryError;
use crate::Result;

const INDENT: &str = "  ";

/// Output dialects of the plan printer.
///
/// `Semantic` is the portable logical form: tables by logical name, property
/// access as `properties.key`, relative dates kept relative. `ClickHouse` is
/// the store-native execution form: tenant scoping injected from the context,
/// property access through `JSONExtractString`, dates resolved to absolute
/// instants against the context's current time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Semantic,
    ClickHouse,
}

impl Dialect {
    pub fn as_str(&self) -> &str {
        match self {
            Dialect::Semantic => "semantic",
            Dialect::ClickHouse => "clickhouse",
        }
    }
}

/// Serializes a plan into query text. Pure: the same plan, context and
/// dialect always produce byte-identical output.
pub fn print_plan(plan: &PlanNode, ctx: &Context, dialect: Dialect) -> Result<String> {
    let mut printer = Printer {
        ctx,
        dialect,
        out: String::new(),
    };
    printer.plan(plan, 0)?;
    printer.out.pop();
    Ok(printer.out)
}

struct Printer<'a> {
    ctx: &'a Context,
    dialect: Dialect,
    out: String,
}

impl Printer<'_> {
    fn line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn plan(&mut self, node: &PlanNode, indent: usize) -> Result<()> {
        match node {
            PlanNode::Select(query) => self.select(query, indent),
            PlanNode::Set(set) => {
                if !self.ctx.enable_subqueries {
                    return Err(QueryError::Render(
                        "subqueries are disabled in this context".to_string(),
                    ));
                }
                self.operand(&set.initial, indent)?;
                for node in &set.subsequent {
                    self.line(indent, &node.set_operator.to_string());
                    self.operand(&node.query, indent)?;
                }
                Ok(())
            }
        }
    }

    fn operand(&mut self, node: &PlanNode, indent: usize) -> Result<()> {
        self.line(indent, "(");
        self.plan(node, indent + 1)?;
        self.line(indent, ")");
        Ok(())
    }

    fn select(&mut self, query: &SelectQuery, indent: usize) -> Result<()> {
        let items = query
            .select
            .iter()
            .map(|e| self.expr(e))
            .collect::<Result<Vec<String>>>()?
            .join(", ");
        self.line(indent, &format!("SELECT {items}"));

        match &query.source {
            Source::Table(table) => {
                self.line(indent, &format!("FROM {}", table_name(table)));
            }
            Source::Subquery(sub) => {
                if !self.ctx.enable_subqueries {
                    return Err(QueryError::Render(
                        "subqueries are disabled in this context".to_string(),
                    ));
                }
                self.line(indent, "FROM (");
                self.plan(sub, indent + 1)?;
                self.line(indent, ")");
            }
        }

        if let Some(predicate) = self.scoped_predicate(query) {
            let rendered = self.expr(&predicate)?;
            self.line(indent, &format!("WHERE {rendered}"));
        }

        if !query.group_by.is_empty() {
            let keys = query
                .group_by
                .iter()
                .map(|e| self.expr(e))
                .collect::<Result<Vec<String>>>()?
                .join(", ");
            self.line(indent, &format!("GROUP BY {keys}"));
        }

        if let Some(having) = &query.having {
            let rendered = self.expr(having)?;
            self.line(indent, &format!("HAVING {rendered}"));
        }

        Ok(())
    }

    /// In the clickhouse dialect every table scan is scoped to the tenant.
    fn scoped_predicate(&self, query: &SelectQuery) -> Option<Expr> {
        let tenant = match (&self.dialect, &query.source) {
            (Dialect::ClickHouse, Source::Table(_)) => Some(binary_expr(
                col(COLUMN_TEAM_ID),
                Operator::Eq,
                lit_int(self.ctx.team_id as i64),
            )),
            _ => None,
        };

        match (tenant, query.predicate.clone()) {
            (Some(tenant), Some(predicate)) => Some(multi_and(vec![tenant, predicate])),
            (Some(tenant), None) => Some(tenant),
            (None, predicate) => predicate,
        }
    }

    fn expr(&self, expr: &Expr) -> Result<String> {
        Ok(match expr {
            Expr::Column(name) => name.to_owned(),
            Expr::EventProperty(key) => self.property(COLUMN_PROPERTIES, key),
            Expr::PersonProperty(key) => self.property(COLUMN_PROPERTIES, key),
            Expr::PersonPropertyOnEvent(key) => match self.dialect {
                Dialect::Semantic => format!("person.properties.{key}"),
                Dialect::ClickHouse => {
                    format!("JSONExtractString({COLUMN_PERSON_PROPERTIES}, '{key}')")
                }
            },
            Expr::Literal(literal) => self.literal(literal),
            Expr::Alias(inner, name) => format!("{} AS {name}", self.expr(inner)?),
            Expr::Binary { left, op, right } => format!(
                "{}({}, {})",
                operator_fn(op),
                self.expr(left)?,
                self.expr(right)?
            ),
            Expr::And(exprs) => format!("and({})", self.expr_list(exprs)?),
            Expr::Or(exprs) => format!("or({})", self.expr_list(exprs)?),
            Expr::Not(inner) => format!("not({})", self.expr(inner)?),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let fun = if *negated { "notIn" } else { "in" };
                format!("{fun}({}, ({}))", self.expr(expr)?, self.expr_list(list)?)
            }
            Expr::IsNull { expr, negated } => {
                let fun = if *negated { "isNotNull" } else { "isNull" };
                format!("{fun}({})", self.expr(expr)?)
            }
            Expr::Min(inner) => format!("min({})", self.expr(inner)?),
            Expr::Count => "count()".to_string(),
            Expr::DateTrunc { unit, expr } => {
                format!("{}({})", trunc_fn(unit), self.expr(expr)?)
            }
            Expr::WindowFunnel {
                window_seconds,
                timestamp,
                steps,
            } => format!(
                "windowFunnel({window_seconds})({}, {})",
                self.expr(timestamp)?,
                self.expr_list(steps)?
            ),
            Expr::MatchesAction(id) => match self.dialect {
                Dialect::Semantic => format!("matchesAction({id})"),
                Dialect::ClickHouse => {
                    return Err(QueryError::Render(format!(
                        "action {id} can only be rendered in the semantic dialect"
                    )));
                }
            },
        })
    }

    fn expr_list(&self, exprs: &[Expr]) -> Result<String> {
        Ok(exprs
            .iter()
            .map(|e| self.expr(e))
            .collect::<Result<Vec<String>>>()?
            .join(", "))
    }

    fn property(&self, column: &str, key: &str) -> String {
        match self.dialect {
            Dialect::Semantic => format!("{column}.{key}"),
            Dialect::ClickHouse => format!("JSONExtractString({column}, '{key}')"),
        }
    }

    fn literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::String(value) => format!("'{}'", value.replace('\'', "\\'")),
            Literal::Int(value) => value.to_string(),
            Literal::Float(value) => value.to_string(),
            Literal::Bool(value) => value.to_string(),
            Literal::Date(value) => self.date(value),
        }
    }

    fn date(&self, value: &DateValue) -> String {
        match (&self.dialect, value) {
            (Dialect::Semantic, DateValue::Relative { n, unit }) => {
                format!("now() - INTERVAL {n} {}", unit.interval_name())
            }
            (Dialect::Semantic, DateValue::Absolute(dt)) => {
                format!("toDateTime('{}')", dt.format("%Y-%m-%d %H:%M:%S"))
            }
            (Dialect::ClickHouse, value) => {
                let resolved = value.resolve(self.ctx.cur_time);
                format!("toDateTime('{}')", resolved.format("%Y-%m-%d %H:%M:%S"))
            }
        }
    }
}

fn table_name(table: &Table) -> &str {
    match table {
        Table::Events => TABLE_EVENTS,
        Table::Persons => TABLE_PERSONS,
        Table::StaticCohortPersons => TABLE_STATIC_COHORT,
    }
}

fn operator_fn(op: &Operator) -> &str {
    match op {
        Operator::Eq => "equals",
        Operator::NotEq => "notEquals",
        Operator::Gt => "greater",
        Operator::GtEq => "greaterOrEquals",
        Operator::Lt => "less",
        Operator::LtEq => "lessOrEquals",
        Operator::ILike => "ilike",
        Operator::NotILike => "notILike",
        Operator::RegexMatch => "match",
        Operator::RegexNotMatch => "notMatch",
    }
}

fn trunc_fn(unit: &TimeIntervalUnit) -> &str {
    match unit {
        TimeIntervalUnit::Second => "toStartOfSecond",
        TimeIntervalUnit::Minute => "toStartOfMinute",
        TimeIntervalUnit::Hour => "toStartOfHour",
        TimeIntervalUnit::Day => "toStartOfDay",
        TimeIntervalUnit::Week => "toStartOfWeek",
        TimeIntervalUnit::Month => "toStartOfMonth",
        TimeIntervalUnit::Year => "toStartOfYear",
    }
}
