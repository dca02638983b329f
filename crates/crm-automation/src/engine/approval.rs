//! Approval-rule matching.
//!
//! Decides which approval rules apply to an entity (a discount request, a
//! large deal) using the same clause evaluation as the `condition` step.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::evaluator::{Clause, ConditionEvaluator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRule {
    pub id: String,
    pub name: String,
    /// Entity kind the rule applies to, e.g. `deal`.
    pub entity_type: String,
    /// Every clause must hold.
    #[serde(default)]
    pub conditions: Vec<Clause>,
    pub approver_id: String,
    /// Higher wins.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
pub struct ApprovalMatcher {
    evaluator: ConditionEvaluator,
}

impl ApprovalMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self, rule: &ApprovalRule, entity_type: &str, entity: &Value) -> bool {
        rule.is_active
            && rule.entity_type == entity_type
            && self.evaluator.evaluate_all(&rule.conditions, entity)
    }

    /// Active rules for `entity_type` whose clauses all hold, highest
    /// priority first. Equal priorities keep input order.
    pub fn matching_rules<'a>(
        &self,
        rules: &'a [ApprovalRule],
        entity_type: &str,
        entity: &Value,
    ) -> Vec<&'a ApprovalRule> {
        let mut matched: Vec<&ApprovalRule> = rules
            .iter()
            .filter(|rule| self.matches(rule, entity_type, entity))
            .collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::evaluator::Operator;
    use serde_json::json;

    fn rule(id: &str, priority: i32, conditions: Vec<Clause>) -> ApprovalRule {
        ApprovalRule {
            id: id.to_string(),
            name: id.to_string(),
            entity_type: "deal".to_string(),
            conditions,
            approver_id: format!("{}-approver", id),
            priority,
            is_active: true,
        }
    }

    fn clause(field: &str, operator: Operator, value: Value) -> Clause {
        Clause {
            field: field.to_string(),
            operator,
            value,
        }
    }

    #[test]
    fn test_matching_rules_sorted_by_priority() {
        let rules = vec![
            rule("big", 1, vec![clause("amount", Operator::GreaterThan, json!(10000))]),
            rule("vip", 5, vec![clause("tier", Operator::In, json!(["gold", "platinum"]))]),
            rule("catch-all", 0, vec![]),
        ];
        let deal = json!({"amount": 25000, "tier": "gold"});

        let matcher = ApprovalMatcher::new();
        let ids: Vec<_> = matcher
            .matching_rules(&rules, "deal", &deal)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["vip", "big", "catch-all"]);
    }

    #[test]
    fn test_inactive_and_other_entity_rules_skipped() {
        let mut inactive = rule("off", 9, vec![]);
        inactive.is_active = false;
        let mut contact_rule = rule("contact", 9, vec![]);
        contact_rule.entity_type = "contact".to_string();

        let rules = vec![inactive, contact_rule];
        let matcher = ApprovalMatcher::new();
        assert!(matcher.matching_rules(&rules, "deal", &json!({})).is_empty());
    }

    #[test]
    fn test_rule_deserializes_from_json() {
        let rule: ApprovalRule = serde_json::from_value(json!({
            "id": "r1",
            "name": "Discount",
            "entityType": "deal",
            "conditions": [{"field": "discount", "operator": "greaterThan", "value": 20}],
            "approverId": "u1",
        }))
        .unwrap();
        assert!(rule.is_active);
        assert_eq!(rule.conditions[0].operator, Operator::GreaterThan);

        let matcher = ApprovalMatcher::new();
        assert!(matcher.matches(&rule, "deal", &json!({"discount": "25"})));
        assert!(!matcher.matches(&rule, "deal", &json!({})));
    }
}
