use common::types::COLUMN_COHORT_ID;
use common::types::COLUMN_PERSON_ID;

use crate::ast::binary_expr;
use crate::ast::col;
use crate::ast::lit_int;
use crate::ast::Operator;
use crate::ast::SelectQuery;
use crate::ast::Source;
use crate::ast::Table;
use crate::context::Context;
use crate::Result;

/// Resolver for precomputed static cohort membership: given a static cohort
/// id, produce the actor query selecting its members.
pub trait StaticCohortProvider: Send + Sync {
    fn members_query(&self, ctx: &Context, cohort_id: u64) -> Result<SelectQuery>;
}

/// Default resolver backed by the static membership table.
#[derive(Default, Clone, Debug)]
pub struct StaticCohortTable;

impl StaticCohortProvider for StaticCohortTable {
    fn members_query(&self, _ctx: &Context, cohort_id: u64) -> Result<SelectQuery> {
        let mut query = SelectQuery::new(
            vec![col(COLUMN_PERSON_ID)],
            Source::Table(Table::StaticCohortPersons),
        );
        query.predicate = Some(binary_expr(
            col(COLUMN_COHORT_ID),
            Operator::Eq,
            lit_int(cohort_id as i64),
        ));
        query.group_by = vec![col(COLUMN_PERSON_ID)];
        Ok(query)
    }
}
