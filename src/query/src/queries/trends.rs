use common::query::trends::TrendsQuery;
use common::query::SeriesMath;
use common::types::COLUMN_PERSON_ID;
use common::types::COLUMN_TIMESTAMP;

use crate::ast::col;
use crate::ast::multi_and;
use crate::ast::multi_or;
use crate::ast::Expr;
use crate::ast::SelectQuery;
use crate::ast::Source;
use crate::ast::Table;
use crate::error::QueryError;
use crate::expr::event_expression;
use crate::expr::event_filters_expression;
use crate::expr::time_expression;
use crate::Result;

/// Builds the actor query for an occurrence condition: actors that emitted
/// one of the series events inside the date range.
///
/// With first-time math the scan is unbounded and the window is applied to
/// the actor's earliest occurrence instead, so only actors whose first-ever
/// occurrence falls inside the range qualify.
pub fn build(req: &TrendsQuery) -> Result<SelectQuery> {
    if req.series.is_empty() {
        return Err(QueryError::Validation(
            "trends query requires at least one series".to_string(),
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
    let event_match = multi_or(matches);
    let first_time = matches!(req.series[0].math, Some(SeriesMath::FirstTimeForActor));

    let mut query = SelectQuery::new(vec![col(COLUMN_PERSON_ID)], Source::Table(Table::Events));
    query.group_by = vec![col(COLUMN_PERSON_ID)];
    if first_time {
        query.predicate = Some(event_match);
        query.having = Some(time_expression(
            Expr::Min(Box::new(col(COLUMN_TIMESTAMP))),
            &req.date_range,
        ));
    } else {
        query.predicate = Some(multi_and(vec![
            event_match,
            time_expression(col(COLUMN_TIMESTAMP), &req.date_range),
        ]));
    }

    Ok(query)
}

#[cfg(test)]
mod tests {
    use common::query::trends::TrendsQuery;
    use common::query::DateRange;
    use common::query::DateValue;
    use common::query::EventRef;
    use common::query::Series;
    use common::query::SeriesMath;
    use common::query::TimeIntervalUnit;

    use super::build;
    use crate::ast::Expr;

    fn range() -> DateRange {
        DateRange::since(DateValue::Relative {
            n: 30,
            unit: TimeIntervalUnit::Day,
        })
    }

    #[test]
    fn window_applies_to_scan() {
        let query = build(&TrendsQuery {
            series: vec![Series::new(EventRef::Event("purchase".to_string()))],
            date_range: range(),
        })
        .unwrap();
        assert!(query.having.is_none());
        assert!(matches!(query.predicate, Some(Expr::And(_))));
    }

    #[test]
    fn first_time_window_applies_to_earliest_occurrence() {
        let mut series = Series::new(EventRef::Event("purchase".to_string()));
        series.math = Some(SeriesMath::FirstTimeForActor);
        let query = build(&TrendsQuery {
            series: vec![series],
            date_range: range(),
        })
        .unwrap();
        // unbounded scan, the range lands on min(timestamp)
        assert!(matches!(query.predicate, Some(Expr::Binary { .. })));
        assert!(query.having.is_some());
    }
}
