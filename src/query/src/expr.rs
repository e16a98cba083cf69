use common::query::DateRange;
use common::query::EventRef;
use common::query::FilterScope;
use common::query::PropValueOperation;
use common::query::PropertyFilter;
use common::types::COLUMN_EVENT;

use crate::ast::binary_expr;
use crate::ast::col;
use crate::ast::lit_str;
use crate::ast::multi_and;
use crate::ast::Expr;
use crate::ast::Literal;
use crate::ast::Operator;
use crate::error::QueryError;
use crate::Result;

/// builds expression for event or action match
pub fn event_expression(event: &EventRef) -> Expr {
    match event {
        EventRef::Event(name) => binary_expr(col(COLUMN_EVENT), Operator::Eq, lit_str(name)),
        EventRef::Action(id) => Expr::MatchesAction(*id),
    }
}

/// builds expression over the filters applied to an event match
pub fn event_filters_expression(filters: &[PropertyFilter]) -> Result<Expr> {
    let filters_exprs = filters
        .iter()
        .map(property_expression)
        .collect::<Result<Vec<Expr>>>()?;

    Ok(multi_and(filters_exprs))
}

/// builds expression for a single event-scoped filter
pub fn property_expression(filter: &PropertyFilter) -> Result<Expr> {
    let prop_col = match filter.scope {
        FilterScope::Event => Expr::EventProperty(filter.key.to_owned()),
        FilterScope::Person => Expr::PersonPropertyOnEvent(filter.key.to_owned()),
    };
    let operation = filter.operator.as_ref().unwrap_or(&PropValueOperation::Exact);
    named_property_expression(prop_col, operation, filter.value.as_ref())
}

/// builds "[property] [op] [value]" expression with an already known
/// property column
pub fn named_property_expression(
    prop_col: Expr,
    operation: &PropValueOperation,
    value: Option<&serde_json::Value>,
) -> Result<Expr> {
    match operation {
        PropValueOperation::Exact | PropValueOperation::Eq => {
            equality_expression(prop_col, operation, value, false)
        }
        PropValueOperation::IsNot => equality_expression(prop_col, operation, value, true),
        PropValueOperation::Icontains => Ok(binary_expr(
            prop_col,
            Operator::ILike,
            lit_str(&format!("%{}%", value_string(operation, value)?)),
        )),
        PropValueOperation::NotIcontains => Ok(binary_expr(
            prop_col,
            Operator::NotILike,
            lit_str(&format!("%{}%", value_string(operation, value)?)),
        )),
        PropValueOperation::Regex => Ok(binary_expr(
            prop_col,
            Operator::RegexMatch,
            lit_str(&value_string(operation, value)?),
        )),
        PropValueOperation::NotRegex => Ok(binary_expr(
            prop_col,
            Operator::RegexNotMatch,
            lit_str(&value_string(operation, value)?),
        )),
        PropValueOperation::Gt => comparison_expression(prop_col, Operator::Gt, operation, value),
        PropValueOperation::Gte => {
            comparison_expression(prop_col, Operator::GtEq, operation, value)
        }
        PropValueOperation::Lt => comparison_expression(prop_col, Operator::Lt, operation, value),
        PropValueOperation::Lte => {
            comparison_expression(prop_col, Operator::LtEq, operation, value)
        }
        // for is_set and is_not_set no value is needed at all
        PropValueOperation::IsSet => Ok(Expr::IsNull {
            expr: Box::new(prop_col),
            negated: true,
        }),
        PropValueOperation::IsNotSet => Ok(Expr::IsNull {
            expr: Box::new(prop_col),
            negated: false,
        }),
    }
}

fn equality_expression(
    prop_col: Expr,
    operation: &PropValueOperation,
    value: Option<&serde_json::Value>,
    negated: bool,
) -> Result<Expr> {
    let value = required_value(operation, value)?;
    match value {
        serde_json::Value::Array(values) => {
            let list = values
                .iter()
                .map(scalar_literal)
                .collect::<Result<Vec<Expr>>>()?;
            Ok(Expr::InList {
                expr: Box::new(prop_col),
                list,
                negated,
            })
        }
        _ => {
            let op = if negated { Operator::NotEq } else { Operator::Eq };
            Ok(binary_expr(prop_col, op, scalar_literal(value)?))
        }
    }
}

fn comparison_expression(
    prop_col: Expr,
    op: Operator,
    operation: &PropValueOperation,
    value: Option<&serde_json::Value>,
) -> Result<Expr> {
    let value = required_value(operation, value)?;
    Ok(binary_expr(prop_col, op, scalar_literal(value)?))
}

/// builds expression bounding a timestamp to the date range
pub fn time_expression(ts: Expr, range: &DateRange) -> Expr {
    let from_expr = binary_expr(
        ts.clone(),
        Operator::GtEq,
        Expr::Literal(Literal::Date(range.from.clone())),
    );
    match &range.to {
        None => from_expr,
        Some(to) => multi_and(vec![
            from_expr,
            binary_expr(ts, Operator::Lt, Expr::Literal(Literal::Date(to.clone()))),
        ]),
    }
}

/// maps a numeric comparison operation to a binary operator
pub fn comparison_operator(operation: &PropValueOperation) -> Result<Operator> {
    match operation {
        PropValueOperation::Gt => Ok(Operator::Gt),
        PropValueOperation::Gte => Ok(Operator::GtEq),
        PropValueOperation::Lt => Ok(Operator::Lt),
        PropValueOperation::Lte => Ok(Operator::LtEq),
        PropValueOperation::Eq | PropValueOperation::Exact => Ok(Operator::Eq),
        other => Err(QueryError::Validation(format!(
            "\"{other:?}\" is not a numeric comparison operator"
        ))),
    }
}

pub fn scalar_literal(value: &serde_json::Value) -> Result<Expr> {
    let literal = match value {
        serde_json::Value::String(v) => Literal::String(v.to_owned()),
        serde_json::Value::Bool(v) => Literal::Bool(*v),
        serde_json::Value::Number(v) => match v.as_i64() {
            Some(n) => Literal::Int(n),
            None => Literal::Float(v.as_f64().unwrap_or_default()),
        },
        other => {
            return Err(QueryError::Validation(format!(
                "{other:?} is not a valid property value"
            )));
        }
    };

    Ok(Expr::Literal(literal))
}

fn required_value<'a>(
    operation: &PropValueOperation,
    value: Option<&'a serde_json::Value>,
) -> Result<&'a serde_json::Value> {
    value.ok_or_else(|| {
        QueryError::Validation(format!(
            "value should be defined for \"{operation:?}\" operation"
        ))
    })
}

fn value_string(operation: &PropValueOperation, value: Option<&serde_json::Value>) -> Result<String> {
    match required_value(operation, value)? {
        serde_json::Value::String(v) => Ok(v.to_owned()),
        serde_json::Value::Number(v) => Ok(v.to_string()),
        other => Err(QueryError::Validation(format!(
            "{other:?} is not a valid value for \"{operation:?}\" operation"
        ))),
    }
}
