use std::sync::Arc;

use common::query::cohort::BehavioralProperty;
use common::query::cohort::BehavioralType;
use common::query::cohort::GroupOperator;
use common::query::cohort::PersonProperty;
use common::query::cohort::Property;
use common::query::cohort::PropertyGroup;
use common::query::cohort::PropertyGroupValue;
use common::query::funnel::FunnelWindow;
use common::query::funnel::FunnelsQuery;
use common::query::funnel::StepSelector;
use common::query::stickiness::StickinessCriteria;
use common::query::stickiness::StickinessQuery;
use common::query::trends::TrendsQuery;
use common::query::DateRange;
use common::query::DateValue;
use common::query::PropValueOperation;
use common::query::Series;
use common::query::SeriesMath;
use common::query::TimeIntervalUnit;
use tracing::debug;
use tracing::warn;

use crate::ast::PlanNode;
use crate::ast::SelectQuery;
use crate::ast::SelectSetNode;
use crate::ast::SelectSetQuery;
use crate::ast::SetOperator;
use crate::context::Context;
use crate::context::PersonsOnEventsMode;
use crate::error::QueryError;
use crate::printer::print_plan;
use crate::printer::Dialect;
use crate::provider::StaticCohortProvider;
use crate::provider::StaticCohortTable;
use crate::queries::actors;
use crate::queries::funnel;
use crate::queries::stickiness;
use crate::queries::trends;
use crate::Result;

mod split;
mod validation;

use split::split_property_groups;
use validation::parse_and_validate_positive_integer;
use validation::validate_interval;

/// Compiles a cohort condition tree into an actor-set query plan.
///
/// The tree is split at construction into the behavioral (outer) part and the
/// person-attribute (inner) part. `build` lowers every outer leaf into an
/// actor select, folds siblings with set operations per the group operator,
/// and finally combines the result with the inner actor filter according to
/// the persons-on-events mode. Compilation is pure: one call builds one plan,
/// nothing is cached or shared.
pub struct CohortQuery {
    ctx: Context,
    static_cohorts: Arc<dyn StaticCohortProvider>,
    outer_property_groups: Option<PropertyGroup>,
    inner_property_groups: Option<PropertyGroup>,
}

impl CohortQuery {
    pub fn new(ctx: Context, properties: &PropertyGroup) -> Self {
        Self::with_provider(ctx, properties, Arc::new(StaticCohortTable))
    }

    pub fn with_provider(
        ctx: Context,
        properties: &PropertyGroup,
        static_cohorts: Arc<dyn StaticCohortProvider>,
    ) -> Self {
        let split = split_property_groups(properties);
        CohortQuery {
            ctx,
            static_cohorts,
            outer_property_groups: split.outer,
            inner_property_groups: split.inner,
        }
    }

    /// Materializes the stored filter payload and builds a compiler over it.
    pub fn from_filter_json(ctx: Context, raw: &serde_json::Value) -> Result<Self> {
        let properties = PropertyGroup::from_json(raw)?;
        Ok(Self::new(ctx, &properties))
    }

    /// Compiles the cohort into a query plan.
    pub fn build(&self) -> Result<PlanNode> {
        let Some(outer) = &self.outer_property_groups else {
            // no behavioral conditions left, query person attributes directly
            return Ok(PlanNode::select(self.actors_query()?));
        };

        let mut plan = self.conditions(outer)?;

        if self.should_join_persons() {
            if self.should_pushdown_persons() {
                match self.ctx.persons_on_events_mode {
                    PersonsOnEventsMode::PersonIdNoOverridePropertiesOnEvents => {
                        // person attributes are on the event rows; the caller
                        // pushes the filter into each event condition instead
                        // of joining here
                    }
                    _ => {
                        plan = PlanNode::Set(SelectSetQuery {
                            initial: Box::new(plan),
                            subsequent: vec![SelectSetNode {
                                set_operator: SetOperator::Intersect,
                                query: PlanNode::select(self.actors_query()?),
                            }],
                        });
                    }
                }
            } else {
                // known gap: the person filter is dropped on this path
                warn!(
                    team_id = self.ctx.team_id,
                    "person filter not applied: persons-on-events disabled and no join path"
                );
            }
        }

        Ok(plan)
    }

    /// Compiles and renders the cohort in the requested dialect.
    pub fn query_str(&self, dialect: Dialect) -> Result<String> {
        let plan = self.build()?;
        debug!(
            team_id = self.ctx.team_id,
            dialect = dialect.as_str(),
            "rendering cohort plan"
        );
        print_plan(&plan, &self.ctx, dialect)
    }

    fn should_join_persons(&self) -> bool {
        self.inner_property_groups.is_some()
    }

    fn should_pushdown_persons(&self) -> bool {
        self.ctx.persons_on_events_mode != PersonsOnEventsMode::Disabled
    }

    fn actors_query(&self) -> Result<SelectQuery> {
        actors::build(self.inner_property_groups.as_ref())
    }

    fn conditions(&self, outer: &PropertyGroup) -> Result<PlanNode> {
        match self.group_plan(outer)? {
            Some(plan) => Ok(plan),
            None => Err(QueryError::Composition(
                "property group has no lowerable conditions".to_string(),
            )),
        }
    }

    /// Recursively reduces a group to a plan. Children are combined in their
    /// original order; a child group lowering to nothing is skipped.
    fn group_plan(&self, group: &PropertyGroup) -> Result<Option<PlanNode>> {
        let mut plans = vec![];
        for value in &group.values {
            let plan = match value {
                PropertyGroupValue::Group(nested) => self.group_plan(nested)?,
                PropertyGroupValue::Property(prop) => Some(self.property_plan(prop)?),
            };
            if let Some(plan) = plan {
                plans.push(plan);
            }
        }

        if plans.is_empty() {
            return Ok(None);
        }
        if plans.len() == 1 {
            return Ok(Some(plans.remove(0)));
        }

        let set_operator = match group.operator {
            GroupOperator::Or => SetOperator::UnionAll,
            GroupOperator::And => SetOperator::Intersect,
        };
        let initial = plans.remove(0);
        let subsequent = plans
            .into_iter()
            .map(|query| SelectSetNode {
                set_operator: set_operator.clone(),
                query,
            })
            .collect();
        Ok(Some(PlanNode::Set(SelectSetQuery {
            initial: Box::new(initial),
            subsequent,
        })))
    }

    fn property_plan(&self, prop: &Property) -> Result<PlanNode> {
        match prop {
            Property::Behavioral(prop) => match prop.value {
                BehavioralType::PerformedEvent => {
                    Ok(PlanNode::select(self.performed_event(prop, false)?))
                }
                BehavioralType::PerformedEventFirstTime => {
                    Ok(PlanNode::select(self.performed_event(prop, true)?))
                }
                BehavioralType::PerformedEventMultiple => {
                    Ok(PlanNode::select(self.performed_event_multiple(prop)?))
                }
                BehavioralType::PerformedEventSequence => {
                    Ok(PlanNode::select(self.performed_event_sequence(prop)?))
                }
                BehavioralType::StoppedPerformingEvent => {
                    Ok(PlanNode::Set(self.stopped_performing_event(prop)?))
                }
                BehavioralType::RestartedPerformingEvent => {
                    Ok(PlanNode::Set(self.restarted_performing_event(prop)?))
                }
                BehavioralType::PerformedEventRegularly => {
                    Ok(PlanNode::select(self.performed_event_regularly(prop)?))
                }
            },
            Property::Person(prop) => Ok(PlanNode::select(self.person_condition(prop)?)),
            Property::StaticCohort(prop) => Ok(PlanNode::select(
                self.static_cohorts.members_query(&self.ctx, prop.value)?,
            )),
        }
    }

    /// Occurrence window of a behavioral leaf. An explicit datetime takes
    /// precedence over `time_value`/`time_interval` when both are present.
    fn occurrence_date_range(&self, prop: &BehavioralProperty) -> Result<DateRange> {
        let from = match &prop.explicit_datetime {
            Some(explicit) => validation::date_value(explicit, "explicit_datetime")?,
            None => {
                let n =
                    parse_and_validate_positive_integer(prop.time_value.as_ref(), "time_value")?;
                let unit = validate_interval(prop.time_interval.as_deref(), "time_interval")?;
                DateValue::Relative { n, unit }
            }
        };
        Ok(DateRange::since(from))
    }

    fn performed_event(&self, prop: &BehavioralProperty, first_time: bool) -> Result<SelectQuery> {
        let mut series = Series::new(validation::event_ref(prop)?);
        if first_time {
            series.math = Some(SeriesMath::FirstTimeForActor);
        }
        series.filters = prop.event_filters.clone();

        trends::build(&TrendsQuery {
            series: vec![series],
            date_range: self.occurrence_date_range(prop)?,
        })
    }

    fn performed_event_multiple(&self, prop: &BehavioralProperty) -> Result<SelectQuery> {
        let count =
            parse_and_validate_positive_integer(prop.operator_value.as_ref(), "operator_value")?;
        let mut series = Series::new(validation::event_ref(prop)?);
        series.filters = prop.event_filters.clone();

        let req = FunnelsQuery {
            series: vec![series; (count + 1) as usize],
            date_range: self.occurrence_date_range(prop)?,
            // effectively unbounded so repeats are never clipped: 50 years
            window: FunnelWindow {
                interval: 12 * 50,
                unit: TimeIntervalUnit::Month,
            },
        };
        funnel::build(&req, &count_selector(prop.operator.as_ref(), count)?)
    }

    fn performed_event_sequence(&self, prop: &BehavioralProperty) -> Result<SelectQuery> {
        let series = vec![
            Series::new(validation::event_ref(prop)?),
            Series::new(validation::seq_event_ref(prop)?),
        ];
        let interval =
            parse_and_validate_positive_integer(prop.seq_time_value.as_ref(), "seq_time_value")?;
        let unit = validate_interval(prop.seq_time_interval.as_deref(), "seq_time_interval")?;

        let req = FunnelsQuery {
            series,
            date_range: self.occurrence_date_range(prop)?,
            window: FunnelWindow { interval, unit },
        };
        funnel::build(&req, &StepSelector::Reached(2))
    }

    /// Performed in the full window but not in the recent sub-window.
    fn stopped_performing_event(&self, prop: &BehavioralProperty) -> Result<SelectSetQuery> {
        // validate the seq fields under their own names before the override
        parse_and_validate_positive_integer(prop.seq_time_value.as_ref(), "seq_time_value")?;
        validate_interval(prop.seq_time_interval.as_deref(), "seq_time_interval")?;

        let full_range = self.performed_event(prop, false)?;
        let recent_range = self.performed_event(&prop.with_sequence_time_window(), false)?;

        Ok(SelectSetQuery {
            initial: Box::new(PlanNode::select(full_range)),
            subsequent: vec![SelectSetNode {
                set_operator: SetOperator::Except,
                query: PlanNode::select(recent_range),
            }],
        })
    }

    /// Recently active, not for the first time, and inactive in the window
    /// just before: recent EXCEPT recent-first-time EXCEPT earlier.
    fn restarted_performing_event(&self, prop: &BehavioralProperty) -> Result<SelectSetQuery> {
        let event = validation::event_ref(prop)?;
        let n = parse_and_validate_positive_integer(prop.time_value.as_ref(), "time_value")?;
        let unit = validate_interval(prop.time_interval.as_deref(), "time_interval")?;
        let date_from = DateValue::Relative { n, unit };
        let n =
            parse_and_validate_positive_integer(prop.seq_time_value.as_ref(), "seq_time_value")?;
        let unit = validate_interval(prop.seq_time_interval.as_deref(), "seq_time_interval")?;
        let date_to = DateValue::Relative { n, unit };

        let series = vec![Series::new(event.clone())];
        let mut first_time_series = Series::new(event);
        first_time_series.math = Some(SeriesMath::FirstTimeForActor);

        let earlier = trends::build(&TrendsQuery {
            series: series.clone(),
            date_range: DateRange {
                from: date_from,
                to: Some(date_to.clone()),
            },
        })?;
        let recent = trends::build(&TrendsQuery {
            series,
            date_range: DateRange::since(date_to.clone()),
        })?;
        let recent_first_time = trends::build(&TrendsQuery {
            series: vec![first_time_series],
            date_range: DateRange::since(date_to),
        })?;

        Ok(SelectSetQuery {
            initial: Box::new(PlanNode::select(recent)),
            subsequent: vec![
                SelectSetNode {
                    set_operator: SetOperator::Except,
                    query: PlanNode::select(recent_first_time),
                },
                SelectSetNode {
                    set_operator: SetOperator::Except,
                    query: PlanNode::select(earlier),
                },
            ],
        })
    }

    fn performed_event_regularly(&self, prop: &BehavioralProperty) -> Result<SelectQuery> {
        let series = vec![Series::new(validation::event_ref(prop)?)];
        let n = parse_and_validate_positive_integer(prop.time_value.as_ref(), "time_value")?;
        let unit = validate_interval(prop.time_interval.as_deref(), "time_interval")?;
        let min_periods =
            parse_and_validate_positive_integer(prop.min_periods.as_ref(), "min_periods")?;
        let value =
            parse_and_validate_positive_integer(prop.operator_value.as_ref(), "operator_value")?;

        let req = StickinessQuery {
            series,
            date_range: DateRange::since(DateValue::Relative {
                n,
                unit: unit.clone(),
            }),
            interval: unit,
            criteria: StickinessCriteria {
                operator: prop
                    .operator
                    .clone()
                    .unwrap_or(PropValueOperation::Gte),
                value,
            },
        };
        stickiness::build(&req, min_periods - 1)
    }

    fn person_condition(&self, prop: &PersonProperty) -> Result<SelectQuery> {
        let mut query = actors::build(None)?;
        query.predicate = Some(actors::person_expression(prop)?);
        Ok(query)
    }
}

fn count_selector(operator: Option<&PropValueOperation>, count: i64) -> Result<StepSelector> {
    match operator {
        Some(PropValueOperation::Gte) => Ok(StepSelector::Reached(count)),
        Some(PropValueOperation::Gt) => Ok(StepSelector::Reached(count + 1)),
        Some(PropValueOperation::Lte) => Ok(StepSelector::Steps((1..=count).collect())),
        Some(PropValueOperation::Lt) => Ok(StepSelector::Steps((1..count).collect())),
        Some(PropValueOperation::Eq) | Some(PropValueOperation::Exact) | None => {
            Ok(StepSelector::DroppedOffAt(count + 1))
        }
        Some(other) => Err(QueryError::Validation(format!(
            "count operator must be gte, lte, gt, lt, eq or unset, got \"{other:?}\""
        ))),
    }
}
