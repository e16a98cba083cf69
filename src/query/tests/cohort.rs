#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use common::query::DateValue;
    use common::query::TimeIntervalUnit;
    use query::ast::Expr;
    use query::ast::Literal;
    use query::ast::Operator;
    use query::ast::PlanNode;
    use query::ast::SetOperator;
    use query::ast::Source;
    use query::ast::Table;
    use query::CohortQuery;
    use query::Context;
    use query::Dialect;
    use query::PersonsOnEventsMode;
    use serde_json::json;
    use tracing_test::traced_test;

    fn ctx() -> Context {
        let mut ctx = Context::new(2);
        ctx.cur_time = Utc.with_ymd_and_hms(2022, 8, 29, 15, 42, 29).unwrap();
        ctx
    }

    fn compile(properties: serde_json::Value) -> CohortQuery {
        CohortQuery::from_filter_json(ctx(), &properties).unwrap()
    }

    fn single(value: serde_json::Value) -> serde_json::Value {
        json!({"type": "AND", "values": [value]})
    }

    /// Walks into the date literal of the scan predicate of a select.
    fn scan_date(query: &query::ast::SelectQuery) -> DateValue {
        fn find(expr: &Expr) -> Option<DateValue> {
            match expr {
                Expr::Literal(Literal::Date(value)) => Some(value.clone()),
                Expr::Binary { left, right, .. } => find(left).or_else(|| find(right)),
                Expr::And(exprs) | Expr::Or(exprs) => exprs.iter().find_map(find),
                _ => None,
            }
        }
        query
            .predicate
            .as_ref()
            .and_then(find)
            .expect("scan predicate has no date bound")
    }

    #[test]
    fn performed_event_compiles_to_single_step_scan() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event",
            "key": "purchase",
            "event_type": "events",
            "time_value": 7,
            "time_interval": "week"
        })));
        let PlanNode::Select(query) = cohort.build().unwrap() else {
            panic!("expected a plain select");
        };
        assert_eq!(query.source, Source::Table(Table::Events));
        let date = scan_date(&query);
        assert_eq!(
            date,
            DateValue::Relative {
                n: 7,
                unit: TimeIntervalUnit::Week
            }
        );
        assert_eq!(date.to_string(), "-7w");

        let out = cohort.query_str(Dialect::Semantic).unwrap();
        assert!(out.contains("equals(event, 'purchase')"));
        assert!(out.contains("now() - INTERVAL 7 WEEK"));
    }

    #[test]
    fn performed_event_first_time_windows_the_earliest_occurrence() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event_first_time",
            "key": "purchase",
            "event_type": "events",
            "time_value": 30,
            "time_interval": "day"
        })));
        let out = cohort.query_str(Dialect::Semantic).unwrap();
        assert!(out.contains("HAVING greaterOrEquals(min(timestamp), now() - INTERVAL 30 DAY)"));
    }

    #[test]
    fn performed_event_multiple_lte_builds_custom_step_funnel() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event_multiple",
            "key": "signed_up",
            "event_type": "events",
            "operator": "lte",
            "operator_value": 3,
            "time_value": 30,
            "time_interval": "day"
        })));
        let PlanNode::Select(outer) = cohort.build().unwrap() else {
            panic!("expected a select");
        };
        // custom step selector {1, 2, 3}
        let Some(Expr::InList { list, negated, .. }) = &outer.predicate else {
            panic!("expected IN selector");
        };
        assert!(!negated);
        assert_eq!(
            list.clone(),
            vec![
                Expr::Literal(Literal::Int(1)),
                Expr::Literal(Literal::Int(2)),
                Expr::Literal(Literal::Int(3))
            ]
        );

        let Source::Subquery(inner) = &outer.source else {
            panic!("expected subquery source");
        };
        let PlanNode::Select(inner) = inner.as_ref() else {
            panic!("expected inner select");
        };
        let Expr::Alias(funnel, _) = &inner.select[1] else {
            panic!("expected aliased funnel");
        };
        let Expr::WindowFunnel {
            window_seconds,
            steps,
            ..
        } = funnel.as_ref()
        else {
            panic!("expected windowFunnel");
        };
        // 4 identical steps over an effectively unbounded 50 year window
        assert_eq!(steps.len(), 4);
        assert_eq!(*window_seconds, 600 * 2592000);
        assert_eq!(scan_date(inner).to_string(), "-30d");
    }

    #[test]
    fn performed_event_multiple_gte_requires_exactly_step_n() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event_multiple",
            "key": "signed_up",
            "event_type": "events",
            "operator": "gte",
            "operator_value": 3,
            "time_value": 30,
            "time_interval": "day"
        })));
        let PlanNode::Select(outer) = cohort.build().unwrap() else {
            panic!("expected a select");
        };
        let Some(Expr::Binary { op, right, .. }) = &outer.predicate else {
            panic!("expected binary selector");
        };
        assert_eq!(*op, Operator::GtEq);
        assert_eq!(**right, Expr::Literal(Literal::Int(3)));
    }

    #[test]
    fn performed_event_multiple_default_operator_is_dropout() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event_multiple",
            "key": "signed_up",
            "event_type": "events",
            "operator_value": 2,
            "time_value": 30,
            "time_interval": "day"
        })));
        let PlanNode::Select(outer) = cohort.build().unwrap() else {
            panic!("expected a select");
        };
        // dropped out at step 3 means the deepest completed step is 2
        let Some(Expr::Binary { op, right, .. }) = &outer.predicate else {
            panic!("expected binary selector");
        };
        assert_eq!(*op, Operator::Eq);
        assert_eq!(**right, Expr::Literal(Literal::Int(2)));
    }

    #[test]
    fn performed_event_multiple_rejects_unknown_operator() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event_multiple",
            "key": "signed_up",
            "event_type": "events",
            "operator": "icontains",
            "operator_value": 2,
            "time_value": 30,
            "time_interval": "day"
        })));
        let err = cohort.build().unwrap_err();
        assert!(err.to_string().contains("count operator"));
    }

    #[test]
    fn performed_event_sequence_is_a_two_step_funnel_in_seconds() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event_sequence",
            "key": "signed_up",
            "event_type": "events",
            "seq_event": "upgraded",
            "seq_event_type": "events",
            "time_value": 30,
            "time_interval": "day",
            "seq_time_value": 3,
            "seq_time_interval": "day"
        })));
        let PlanNode::Select(outer) = cohort.build().unwrap() else {
            panic!("expected a select");
        };
        let Some(Expr::Binary { op, right, .. }) = &outer.predicate else {
            panic!("expected binary selector");
        };
        assert_eq!(*op, Operator::GtEq);
        assert_eq!(**right, Expr::Literal(Literal::Int(2)));

        let out = cohort.query_str(Dialect::Semantic).unwrap();
        assert!(out.contains("windowFunnel(259200)(timestamp, equals(event, 'signed_up'), equals(event, 'upgraded'))"));
    }

    #[test]
    fn stopped_performing_event_subtracts_the_recent_window() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "stopped_performing_event",
            "key": "purchase",
            "event_type": "events",
            "time_value": 30,
            "time_interval": "day",
            "seq_time_value": 7,
            "seq_time_interval": "day"
        })));
        let PlanNode::Set(set) = cohort.build().unwrap() else {
            panic!("expected a set operation");
        };
        assert_eq!(set.subsequent.len(), 1);
        assert_eq!(set.subsequent[0].set_operator, SetOperator::Except);
        let PlanNode::Select(full) = set.initial.as_ref() else {
            panic!("expected select");
        };
        let PlanNode::Select(recent) = &set.subsequent[0].query else {
            panic!("expected select");
        };
        assert_eq!(scan_date(full).to_string(), "-30d");
        assert_eq!(scan_date(recent).to_string(), "-7d");
    }

    #[test]
    fn restarted_performing_event_excludes_first_timers_and_the_prior_window() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "restarted_performing_event",
            "key": "purchase",
            "event_type": "events",
            "time_value": 30,
            "time_interval": "day",
            "seq_time_value": 7,
            "seq_time_interval": "day"
        })));
        let PlanNode::Set(set) = cohort.build().unwrap() else {
            panic!("expected a set operation");
        };
        assert_eq!(set.subsequent.len(), 2);
        assert!(set
            .subsequent
            .iter()
            .all(|node| node.set_operator == SetOperator::Except));

        // recent window first
        let PlanNode::Select(recent) = set.initial.as_ref() else {
            panic!("expected select");
        };
        assert_eq!(scan_date(recent).to_string(), "-7d");
        assert!(recent.having.is_none());

        // then first-ever occurrences in the recent window
        let PlanNode::Select(first_time) = &set.subsequent[0].query else {
            panic!("expected select");
        };
        assert!(first_time.having.is_some());

        // then the preceding window, bounded on both sides
        let PlanNode::Select(earlier) = &set.subsequent[1].query else {
            panic!("expected select");
        };
        let out = cohort.query_str(Dialect::ClickHouse).unwrap();
        assert!(out.contains("toDateTime('2022-07-30 15:42:29')"));
        assert!(earlier.predicate.is_some());
    }

    #[test]
    fn performed_event_regularly_compiles_to_stickiness_threshold() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event_regularly",
            "key": "logged_in",
            "event_type": "events",
            "operator": "gte",
            "operator_value": 2,
            "min_periods": 3,
            "time_value": 30,
            "time_interval": "day"
        })));
        let out = cohort.query_str(Dialect::Semantic).unwrap();
        assert!(out.contains("toStartOfDay(timestamp) AS period"));
        assert!(out.contains("greaterOrEquals(period_event_count, 2)"));
        // min_periods is zero-indexed at the threshold
        assert!(out.contains("greater(period_count, 2)"));
    }

    #[test]
    fn malformed_filter_payload_is_rejected() {
        assert!(CohortQuery::from_filter_json(ctx(), &json!({"bogus": 1})).is_err());
        assert!(CohortQuery::from_filter_json(
            ctx(),
            &json!({"type": "AND", "values": [{"type": "behavioral", "value": "levitated"}]})
        )
        .is_err());
    }

    #[test]
    fn unknown_event_type_is_a_validation_error() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event",
            "key": "purchase",
            "event_type": "webhooks",
            "time_value": 7,
            "time_interval": "day"
        })));
        let err = cohort.build().unwrap_err();
        assert!(err
            .to_string()
            .contains("Event type must be 'events' or 'actions'"));
    }

    #[test]
    fn invalid_time_fields_name_the_offending_field() {
        let bad_interval = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event",
            "key": "purchase",
            "event_type": "events",
            "time_value": 7,
            "time_interval": "fortnight"
        })));
        assert!(bad_interval
            .build()
            .unwrap_err()
            .to_string()
            .contains("time_interval"));

        let bad_value = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event",
            "key": "purchase",
            "event_type": "events",
            "time_value": -1,
            "time_interval": "day"
        })));
        assert!(bad_value
            .build()
            .unwrap_err()
            .to_string()
            .contains("time_value"));
    }

    #[test]
    fn explicit_datetime_takes_precedence_over_time_fields() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event",
            "key": "purchase",
            "event_type": "events",
            "explicit_datetime": "-14d",
            "time_value": 30,
            "time_interval": "day"
        })));
        let PlanNode::Select(query) = cohort.build().unwrap() else {
            panic!("expected a select");
        };
        assert_eq!(scan_date(&query).to_string(), "-14d");
    }

    #[test]
    fn garbage_explicit_datetime_is_rejected() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event",
            "key": "purchase",
            "event_type": "events",
            "explicit_datetime": "whenever"
        })));
        assert!(cohort
            .build()
            .unwrap_err()
            .to_string()
            .contains("explicit_datetime"));
    }

    #[test]
    fn or_group_unions_children_in_order() {
        let cohort = compile(json!({
            "type": "OR",
            "values": [
                {"type": "behavioral", "value": "performed_event", "key": "a",
                 "event_type": "events", "time_value": 1, "time_interval": "day"},
                {"type": "behavioral", "value": "performed_event", "key": "b",
                 "event_type": "events", "time_value": 2, "time_interval": "day"},
                {"type": "behavioral", "value": "performed_event", "key": "c",
                 "event_type": "events", "time_value": 3, "time_interval": "day"}
            ]
        }));
        let PlanNode::Set(set) = cohort.build().unwrap() else {
            panic!("expected a set operation");
        };
        assert_eq!(set.subsequent.len(), 2);
        assert!(set
            .subsequent
            .iter()
            .all(|node| node.set_operator == SetOperator::UnionAll));

        let out = cohort.query_str(Dialect::Semantic).unwrap();
        assert_eq!(out.matches("UNION ALL").count(), 2);
        let a = out.find("equals(event, 'a')").unwrap();
        let b = out.find("equals(event, 'b')").unwrap();
        let c = out.find("equals(event, 'c')").unwrap();
        let first_union = out.find("UNION ALL").unwrap();
        let second_union = out.rfind("UNION ALL").unwrap();
        assert!(a < first_union && first_union < b);
        assert!(b < second_union && second_union < c);
    }

    #[test]
    fn empty_root_compiles_to_the_pure_actor_query() {
        let cohort = compile(json!({"type": "AND", "values": []}));
        let PlanNode::Select(query) = cohort.build().unwrap() else {
            panic!("expected a plain select");
        };
        assert_eq!(query.source, Source::Table(Table::Persons));
        assert!(query.predicate.is_none());
        let out = cohort.query_str(Dialect::Semantic).unwrap();
        assert_eq!(out, "SELECT id\nFROM persons\nGROUP BY id");
    }

    #[test]
    fn person_only_tree_compiles_to_a_filtered_actor_query() {
        let cohort = compile(json!({
            "type": "OR",
            "values": [
                {"type": "person", "key": "email", "value": "test@example.com"},
                {"type": "person", "key": "plan", "value": ["free", "trial"], "operator": "exact"}
            ]
        }));
        let out = cohort.query_str(Dialect::Semantic).unwrap();
        assert!(out.contains("FROM persons"));
        assert!(out.contains("or(equals(properties.email, 'test@example.com'), in(properties.plan, ('free', 'trial')))"));
    }

    #[test]
    fn person_leaf_in_mixed_or_lowers_through_the_composer() {
        let cohort = compile(json!({
            "type": "OR",
            "values": [
                {"type": "behavioral", "value": "performed_event", "key": "purchase",
                 "event_type": "events", "time_value": 7, "time_interval": "day"},
                {"type": "person", "key": "email", "value": "test@example.com"}
            ]
        }));
        let PlanNode::Set(set) = cohort.build().unwrap() else {
            panic!("expected a set operation");
        };
        assert_eq!(set.subsequent[0].set_operator, SetOperator::UnionAll);
        let out = cohort.query_str(Dialect::Semantic).unwrap();
        assert!(out.contains("FROM events"));
        assert!(out.contains("FROM persons"));
    }

    #[test]
    fn static_cohort_leaf_queries_the_membership_table() {
        let cohort = compile(single(json!({
            "type": "static-cohort",
            "key": "id",
            "value": 42
        })));
        let out = cohort.query_str(Dialect::Semantic).unwrap();
        assert!(out.contains("FROM person_static_cohort"));
        assert!(out.contains("equals(cohort_id, 42)"));
    }

    #[test]
    fn event_filters_apply_to_the_occurrence() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event",
            "key": "purchase",
            "event_type": "events",
            "time_value": 7,
            "time_interval": "day",
            "event_filters": [
                {"key": "plan", "value": "premium", "operator": "exact", "type": "event"},
                {"key": "browser", "value": "Chrome", "type": "person"}
            ]
        })));
        let semantic = cohort.query_str(Dialect::Semantic).unwrap();
        assert!(semantic.contains("equals(properties.plan, 'premium')"));
        assert!(semantic.contains("equals(person.properties.browser, 'Chrome')"));
        let clickhouse = cohort.query_str(Dialect::ClickHouse).unwrap();
        assert!(clickhouse.contains("JSONExtractString(properties, 'plan')"));
        assert!(clickhouse.contains("JSONExtractString(person_properties, 'browser')"));
    }

    #[test]
    fn actions_render_in_the_semantic_dialect_only() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event",
            "key": "15",
            "event_type": "actions",
            "time_value": 7,
            "time_interval": "day"
        })));
        let semantic = cohort.query_str(Dialect::Semantic).unwrap();
        assert!(semantic.contains("matchesAction(15)"));
        assert!(cohort.query_str(Dialect::ClickHouse).is_err());
    }

    #[test]
    fn clickhouse_dialect_scopes_every_scan_to_the_tenant() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "performed_event",
            "key": "purchase",
            "event_type": "events",
            "time_value": 7,
            "time_interval": "day"
        })));
        let out = cohort.query_str(Dialect::ClickHouse).unwrap();
        assert!(out.contains("equals(team_id, 2)"));
        assert!(out.contains("toDateTime('2022-08-22 15:42:29')"));
        assert!(!cohort
            .query_str(Dialect::Semantic)
            .unwrap()
            .contains("team_id"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let cohort = compile(single(json!({
            "type": "behavioral",
            "value": "stopped_performing_event",
            "key": "purchase",
            "event_type": "events",
            "time_value": 30,
            "time_interval": "day",
            "seq_time_value": 7,
            "seq_time_interval": "day"
        })));
        let first = cohort.query_str(Dialect::ClickHouse).unwrap();
        let second = cohort.query_str(Dialect::ClickHouse).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn disabled_subqueries_fail_to_render() {
        let mut ctx = ctx();
        ctx.enable_subqueries = false;
        let cohort = CohortQuery::from_filter_json(
            ctx,
            &json!({
                "type": "OR",
                "values": [
                    {"type": "behavioral", "value": "performed_event", "key": "a",
                     "event_type": "events", "time_value": 1, "time_interval": "day"},
                    {"type": "behavioral", "value": "performed_event", "key": "b",
                     "event_type": "events", "time_value": 1, "time_interval": "day"}
                ]
            }),
        )
        .unwrap();
        assert!(cohort.query_str(Dialect::Semantic).is_err());
    }

    fn mixed_and_filter() -> serde_json::Value {
        json!({
            "type": "AND",
            "values": [
                {"type": "behavioral", "value": "performed_event", "key": "purchase",
                 "event_type": "events", "time_value": 7, "time_interval": "day"},
                {"type": "person", "key": "email", "value": "test@example.com"}
            ]
        })
    }

    #[test]
    fn person_filter_intersects_when_pushdown_cannot_use_event_rows() {
        let mut ctx = ctx();
        ctx.persons_on_events_mode = PersonsOnEventsMode::PersonIdOverridePropertiesOnEvents;
        let cohort = CohortQuery::from_filter_json(ctx, &mixed_and_filter()).unwrap();
        let PlanNode::Set(set) = cohort.build().unwrap() else {
            panic!("expected a set operation");
        };
        assert_eq!(set.subsequent.len(), 1);
        assert_eq!(set.subsequent[0].set_operator, SetOperator::Intersect);
        let PlanNode::Select(actors) = &set.subsequent[0].query else {
            panic!("expected actor select");
        };
        assert_eq!(actors.source, Source::Table(Table::Persons));
    }

    #[test]
    fn person_filter_stays_in_event_queries_when_denormalized() {
        let mut ctx = ctx();
        ctx.persons_on_events_mode = PersonsOnEventsMode::PersonIdNoOverridePropertiesOnEvents;
        let cohort = CohortQuery::from_filter_json(ctx, &mixed_and_filter()).unwrap();
        // no join is added; pushing the filter into the event scan is the
        // caller's responsibility in this mode
        let PlanNode::Select(query) = cohort.build().unwrap() else {
            panic!("expected the behavioral plan unchanged");
        };
        assert_eq!(query.source, Source::Table(Table::Events));
    }

    #[traced_test]
    #[test]
    fn person_filter_dropped_when_persons_on_events_disabled() {
        let cohort = CohortQuery::from_filter_json(ctx(), &mixed_and_filter()).unwrap();
        let PlanNode::Select(query) = cohort.build().unwrap() else {
            panic!("expected the behavioral plan unchanged");
        };
        assert_eq!(query.source, Source::Table(Table::Events));
        assert!(logs_contain("person filter not applied"));
    }
}
