use common::query::cohort::GroupOperator;
use common::query::cohort::Property;
use common::query::cohort::PropertyGroup;
use common::query::cohort::PropertyGroupValue;

/// Outcome of splitting the cohort tree into the behavioral (outer) part the
/// composer lowers and the person-only (inner) part the join stage applies.
pub(crate) struct SplitPropertyGroups {
    pub outer: Option<PropertyGroup>,
    pub inner: Option<PropertyGroup>,
}

/// Splits the caller's property tree. Person-only subtrees move to the inner
/// side only where that preserves boolean semantics: under an AND root, or
/// when the whole tree is person-only. A mixed OR tree stays outer untouched;
/// its person leaves lower through the composer instead.
pub(crate) fn split_property_groups(root: &PropertyGroup) -> SplitPropertyGroups {
    if root.is_empty() {
        return SplitPropertyGroups {
            outer: None,
            inner: None,
        };
    }
    if root.values.iter().all(is_person_only) {
        return SplitPropertyGroups {
            outer: None,
            inner: Some(root.clone()),
        };
    }
    match root.operator {
        GroupOperator::And => {
            let mut outer_values = vec![];
            let mut inner_values = vec![];
            for value in &root.values {
                if is_person_only(value) {
                    inner_values.push(value.clone());
                } else {
                    outer_values.push(value.clone());
                }
            }
            SplitPropertyGroups {
                outer: Some(PropertyGroup::new(GroupOperator::And, outer_values)),
                inner: if inner_values.is_empty() {
                    None
                } else {
                    Some(PropertyGroup::new(GroupOperator::And, inner_values))
                },
            }
        }
        GroupOperator::Or => SplitPropertyGroups {
            outer: Some(root.clone()),
            inner: None,
        },
    }
}

/// Empty groups count as person-only: they lower to nothing on either side.
fn is_person_only(value: &PropertyGroupValue) -> bool {
    match value {
        PropertyGroupValue::Property(Property::Person(_)) => true,
        PropertyGroupValue::Property(_) => false,
        PropertyGroupValue::Group(group) => group.values.iter().all(is_person_only),
    }
}
