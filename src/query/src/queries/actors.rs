use common::query::cohort::GroupOperator;
use common::query::cohort::PersonProperty;
use common::query::cohort::Property;
use common::query::cohort::PropertyGroup;
use common::query::cohort::PropertyGroupValue;
use common::query::PropValueOperation;
use common::types::COLUMN_PERSON_PK;

use crate::ast::col;
use crate::ast::multi_and;
use crate::ast::multi_or;
use crate::ast::Expr;
use crate::ast::SelectQuery;
use crate::ast::Source;
use crate::ast::Table;
use crate::error::QueryError;
use crate::expr::named_property_expression;
use crate::Result;

/// Builds the persons-table actor query from person property groups. With no
/// properties the query selects every actor of the tenant.
pub fn build(properties: Option<&PropertyGroup>) -> Result<SelectQuery> {
    let predicate = match properties {
        Some(group) => group_expression(group)?,
        None => None,
    };

    let mut query = SelectQuery::new(vec![col(COLUMN_PERSON_PK)], Source::Table(Table::Persons));
    query.predicate = predicate;
    query.group_by = vec![col(COLUMN_PERSON_PK)];

    Ok(query)
}

/// builds expression for a single person attribute predicate
pub fn person_expression(prop: &PersonProperty) -> Result<Expr> {
    named_property_expression(
        Expr::PersonProperty(prop.key.to_owned()),
        prop.operator.as_ref().unwrap_or(&PropValueOperation::Exact),
        prop.value.as_ref(),
    )
}

fn group_expression(group: &PropertyGroup) -> Result<Option<Expr>> {
    let mut exprs = vec![];
    for value in &group.values {
        match value {
            PropertyGroupValue::Group(nested) => {
                if let Some(expr) = group_expression(nested)? {
                    exprs.push(expr);
                }
            }
            PropertyGroupValue::Property(Property::Person(prop)) => {
                exprs.push(person_expression(prop)?);
            }
            PropertyGroupValue::Property(_) => {
                return Err(QueryError::Composition(
                    "only person properties are valid in an actor filter".to_string(),
                ));
            }
        }
    }

    if exprs.is_empty() {
        return Ok(None);
    }
    Ok(Some(match group.operator {
        GroupOperator::And => multi_and(exprs),
        GroupOperator::Or => multi_or(exprs),
    }))
}
