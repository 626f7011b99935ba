// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{Condition, ExternalLoadBalancerStatus};
    use crate::model::{LoadBalancerStatus, Monitor, Node, Pool, PoolMember};
    use crate::reconcilers::externallb::success_status;
    use crate::reconcilers::status::{
        condition_changed, create_condition, find_condition, ready_condition, set_condition,
        status_changed,
    };

    const TRANSITION: &str = "2025-01-01T00:00:00Z";

    fn stamped(status: &str) -> Condition {
        Condition {
            last_transition_time: Some(TRANSITION.to_string()),
            ..create_condition("Ready", status, "Reconciled", "in sync")
        }
    }

    #[test]
    fn test_create_condition_basic() {
        let condition = create_condition("Ready", "True", "Reconciled", "2 pools in sync");

        assert_eq!(condition.r#type, "Ready");
        assert_eq!(condition.status, "True");
        assert_eq!(condition.reason.as_deref(), Some("Reconciled"));
        assert_eq!(condition.message.as_deref(), Some("2 pools in sync"));
        assert!(condition.last_transition_time.is_some());
    }

    #[test]
    fn test_condition_changed() {
        let current = stamped("True");

        assert!(condition_changed(None, &current));
        assert!(!condition_changed(Some(&current), &stamped("True")));
        assert!(condition_changed(Some(&current), &stamped("False")));

        let reworded = Condition {
            message: Some("1 pool in sync".to_string()),
            ..stamped("True")
        };
        assert!(condition_changed(Some(&current), &reworded));
    }

    #[test]
    fn test_find_condition() {
        let conditions = vec![
            create_condition("Progressing", "True", "Applying", ""),
            stamped("True"),
        ];

        assert_eq!(
            find_condition(&conditions, "Ready").map(|c| c.status.as_str()),
            Some("True")
        );
        assert!(find_condition(&conditions, "Degraded").is_none());
    }

    // =====================================================
    // Ready Condition Tests
    // =====================================================

    #[test]
    fn test_ready_condition_keeps_transition_time_when_status_holds() {
        let existing = vec![stamped("True")];

        let condition = ready_condition(&existing, true, "Reconciled", "3 pools in sync");

        assert_eq!(condition.last_transition_time.as_deref(), Some(TRANSITION));
        assert_eq!(condition.message.as_deref(), Some("3 pools in sync"));
    }

    #[test]
    fn test_ready_condition_new_transition_time_on_flip() {
        let existing = vec![stamped("True")];

        let condition = ready_condition(&existing, false, "ReconcileFailed", "boom");

        assert_eq!(condition.status, "False");
        assert_ne!(condition.last_transition_time.as_deref(), Some(TRANSITION));
    }

    #[test]
    fn test_set_condition_replaces_same_type() {
        let mut conditions = vec![stamped("True")];

        set_condition(&mut conditions, create_condition("Ready", "False", "ReconcileFailed", "boom"));
        set_condition(&mut conditions, create_condition("Progressing", "True", "Applying", ""));

        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].status, "False");
        assert_eq!(conditions[1].r#type, "Progressing");
    }

    // =====================================================
    // Status Change Tests
    // =====================================================

    fn applied(hosts: &[&str]) -> LoadBalancerStatus {
        LoadBalancerStatus {
            monitor: Some(Monitor {
                name: "Monitor-default-web".to_string(),
                port: 30080,
                ..Monitor::default()
            }),
            pools: vec![Pool {
                name: "Pool-default-web-80".to_string(),
                monitor_name: "Monitor-default-web".to_string(),
                members: hosts
                    .iter()
                    .map(|host| PoolMember::new(Node::new(*host, *host), 30080))
                    .collect(),
            }],
            vips: Vec::new(),
        }
    }

    fn reconciled(hosts: &[&str]) -> ExternalLoadBalancerStatus {
        success_status(
            &ExternalLoadBalancerStatus::default(),
            applied(hosts),
            Some(1),
            "1 pool(s) and 0 VIP(s) in sync on dummy",
        )
    }

    #[test]
    fn test_repeated_success_is_unchanged() {
        let first = reconciled(&["10.0.0.1"]);
        let again = success_status(
            &first,
            applied(&["10.0.0.1"]),
            Some(1),
            "1 pool(s) and 0 VIP(s) in sync on dummy",
        );

        assert!(!status_changed(Some(&first), &again));
    }

    #[test]
    fn test_reconciled_time_alone_is_not_a_change() {
        let first = reconciled(&["10.0.0.1"]);
        let later = ExternalLoadBalancerStatus {
            last_reconciled_time: Some("2030-01-01T00:00:00Z".to_string()),
            ..first.clone()
        };

        assert!(!status_changed(Some(&first), &later));
    }

    #[test]
    fn test_status_changes_that_are_written() {
        let first = reconciled(&["10.0.0.1"]);

        assert!(status_changed(None, &first));
        assert!(status_changed(Some(&first), &reconciled(&["10.0.0.1", "10.0.0.2"])));

        let next_generation = ExternalLoadBalancerStatus {
            observed_generation: Some(2),
            ..first.clone()
        };
        assert!(status_changed(Some(&first), &next_generation));

        let mut failed = first.clone();
        set_condition(
            &mut failed.conditions,
            ready_condition(&first.conditions, false, "ReconcileFailed", "boom"),
        );
        assert!(status_changed(Some(&first), &failed));
    }
}
