use common::query::stickiness::StickinessQuery;
use common::types::COLUMN_PERSON_ID;
use common::types::COLUMN_TIMESTAMP;

use crate::ast::binary_expr;
use crate::ast::col;
use crate::ast::lit_int;
use crate::ast::multi_and;
use crate::ast::multi_or;
use crate::ast::Expr;
use crate::ast::Operator;
use crate::ast::PlanNode;
use crate::ast::SelectQuery;
use crate::ast::Source;
use crate::ast::Table;
use crate::error::QueryError;
use crate::expr::comparison_operator;
use crate::expr::event_expression;
use crate::expr::event_filters_expression;
use crate::expr::time_expression;
use crate::Result;

const COL_PERIOD: &str = "period";
const COL_PERIOD_EVENT_COUNT: &str = "period_event_count";
const COL_PERIOD_COUNT: &str = "period_count";

/// Builds the actor query for a regularity condition.
///
/// Three layers: per-actor-per-period occurrence counts, then the number of
/// periods satisfying the criteria, then actors whose qualifying-period count
/// exceeds `day` (zero-indexed minimum-periods threshold).
pub fn build(req: &StickinessQuery, day: i64) -> Result<SelectQuery> {
    if req.series.is_empty() {
        return Err(QueryError::Validation(
            "stickiness query requires at least one series".to_string(),
        ));
    }

    let mut matches = vec![];
    for series in &req.series {
        let mut expr = event_expression(&series.event);
        if let Some(filters) = &series.filters {
            if !filters.is_empty() {
                expr = multi_and(vec![expr, event_filters_expression(filters)?]);
            }
        }
        matches.push(expr);
    }

    let mut periods = SelectQuery::new(
        vec![
            col(COLUMN_PERSON_ID),
            Expr::Alias(
                Box::new(Expr::DateTrunc {
                    unit: req.interval.clone(),
                    expr: Box::new(col(COLUMN_TIMESTAMP)),
                }),
                COL_PERIOD.to_string(),
            ),
            Expr::Alias(Box::new(Expr::Count), COL_PERIOD_EVENT_COUNT.to_string()),
        ],
        Source::Table(Table::Events),
    );
    periods.predicate = Some(multi_and(vec![
        multi_or(matches),
        time_expression(col(COLUMN_TIMESTAMP), &req.date_range),
    ]));
    periods.group_by = vec![col(COLUMN_PERSON_ID), col(COL_PERIOD)];

    let mut qualifying = SelectQuery::new(
        vec![
            col(COLUMN_PERSON_ID),
            Expr::Alias(Box::new(Expr::Count), COL_PERIOD_COUNT.to_string()),
        ],
        Source::Subquery(Box::new(PlanNode::select(periods))),
    );
    qualifying.predicate = Some(binary_expr(
        col(COL_PERIOD_EVENT_COUNT),
        comparison_operator(&req.criteria.operator)?,
        lit_int(req.criteria.value),
    ));
    qualifying.group_by = vec![col(COLUMN_PERSON_ID)];

    let mut outer = SelectQuery::new(
        vec![col(COLUMN_PERSON_ID)],
        Source::Subquery(Box::new(PlanNode::select(qualifying))),
    );
    outer.predicate = Some(binary_expr(col(COL_PERIOD_COUNT), Operator::Gt, lit_int(day)));

    Ok(outer)
}

#[cfg(test)]
mod tests {
    use common::query::stickiness::StickinessCriteria;
    use common::query::stickiness::StickinessQuery;
    use common::query::DateRange;
    use common::query::DateValue;
    use common::query::EventRef;
    use common::query::PropValueOperation;
    use common::query::Series;
    use common::query::TimeIntervalUnit;

    use super::build;
    use crate::ast::Expr;
    use crate::ast::Literal;
    use crate::ast::Operator;

    fn req() -> StickinessQuery {
        StickinessQuery {
            series: vec![Series::new(EventRef::Event("logged_in".to_string()))],
            date_range: DateRange::since(DateValue::Relative {
                n: 30,
                unit: TimeIntervalUnit::Day,
            }),
            interval: TimeIntervalUnit::Day,
            criteria: StickinessCriteria {
                operator: PropValueOperation::Gte,
                value: 2,
            },
        }
    }

    #[test]
    fn threshold_is_zero_indexed() {
        let query = build(&req(), 4).unwrap();
        let Some(Expr::Binary { op, right, .. }) = query.predicate else {
            panic!("expected binary predicate");
        };
        assert_eq!(op, Operator::Gt);
        assert_eq!(*right, Expr::Literal(Literal::Int(4)));
    }

    #[test]
    fn unsupported_criteria_operator_fails() {
        let mut req = req();
        req.criteria.operator = PropValueOperation::Icontains;
        assert!(build(&req, 1).is_err());
    }
}
