use common::query::funnel::FunnelsQuery;
use common::query::funnel::StepSelector;
use common::types::COLUMN_PERSON_ID;
use common::types::COLUMN_TIMESTAMP;

use crate::ast::binary_expr;
use crate::ast::col;
use crate::ast::lit_int;
use crate::ast::multi_and;
use crate::ast::multi_or;
use crate::ast::Expr;
use crate::ast::Literal;
use crate::ast::Operator;
use crate::ast::PlanNode;
use crate::ast::SelectQuery;
use crate::ast::Source;
use crate::ast::Table;
use crate::error::QueryError;
use crate::expr::event_expression;
use crate::expr::event_filters_expression;
use crate::expr::time_expression;
use crate::Result;

pub const COL_STEPS: &str = "steps";

/// Builds the actor query for a sequential-steps condition. The inner query
/// computes the deepest step each actor completed within the conversion
/// window; the outer query keeps actors the step selector accepts.
pub fn build(req: &FunnelsQuery, selector: &StepSelector) -> Result<SelectQuery> {
    if req.series.is_empty() {
        return Err(QueryError::Validation(
            "funnel query requires at least one step".to_string(),
        ));
    }

    let mut step_exprs = vec![];
    for series in &req.series {
        let mut expr = event_expression(&series.event);
        if let Some(filters) = &series.filters {
            if !filters.is_empty() {
                expr = multi_and(vec![expr, event_filters_expression(filters)?]);
            }
        }
        step_exprs.push(expr);
    }

    // scan prefilter: any step may match, identical steps only once
    let mut unique = vec![];
    for expr in &step_exprs {
        if !unique.contains(expr) {
            unique.push(expr.clone());
        }
    }

    let mut inner = SelectQuery::new(
        vec![
            col(COLUMN_PERSON_ID),
            Expr::Alias(
                Box::new(Expr::WindowFunnel {
                    window_seconds: req.window.seconds(),
                    timestamp: Box::new(col(COLUMN_TIMESTAMP)),
                    steps: step_exprs,
                }),
                COL_STEPS.to_string(),
            ),
        ],
        Source::Table(Table::Events),
    );
    inner.predicate = Some(multi_and(vec![
        multi_or(unique),
        time_expression(col(COLUMN_TIMESTAMP), &req.date_range),
    ]));
    inner.group_by = vec![col(COLUMN_PERSON_ID)];

    let mut outer = SelectQuery::new(
        vec![col(COLUMN_PERSON_ID)],
        Source::Subquery(Box::new(PlanNode::select(inner))),
    );
    outer.predicate = Some(selector_predicate(selector));

    Ok(outer)
}

fn selector_predicate(selector: &StepSelector) -> Expr {
    let steps = col(COL_STEPS);
    match selector {
        StepSelector::Reached(n) => binary_expr(steps, Operator::GtEq, lit_int(*n)),
        StepSelector::DroppedOffAt(n) => binary_expr(steps, Operator::Eq, lit_int(*n - 1)),
        StepSelector::Steps(list) if list.is_empty() => Expr::Literal(Literal::Bool(false)),
        StepSelector::Steps(list) => Expr::InList {
            expr: Box::new(steps),
            list: list.iter().map(|n| lit_int(*n)).collect(),
            negated: false,
        },
    }
}
