//! Condition evaluation

use crate::mapping::mapping_types::{Condition, ConditionKind};

/// Decides whether a rule fires for `raw`
///
/// `previous` is the rule's remembered value, `None` while unset. The caller
/// stores `raw` as the new baseline after every evaluation, fired or not.
pub fn evaluate(condition: &Condition, raw: i32, previous: Option<i32>) -> bool {
    match condition.kind {
        ConditionKind::Equals => raw == condition.value,
        ConditionKind::NotEquals => raw != condition.value,
        ConditionKind::GreaterThan => raw > condition.value,
        ConditionKind::LessThan => raw < condition.value,
        // first observation only arms the baseline
        ConditionKind::Changed => previous.is_some_and(|last| last != raw),
        ConditionKind::Always => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparisons_use_condition_value() {
        let eq = Condition::new(ConditionKind::Equals, 3);
        assert!(evaluate(&eq, 3, None));
        assert!(!evaluate(&eq, 4, None));

        let ne = Condition::new(ConditionKind::NotEquals, 3);
        assert!(evaluate(&ne, 4, Some(3)));

        let gt = Condition::new(ConditionKind::GreaterThan, -1);
        assert!(evaluate(&gt, 0, None));
        assert!(!evaluate(&gt, -1, None));

        let lt = Condition::new(ConditionKind::LessThan, 10);
        assert!(evaluate(&lt, 9, None));
        assert!(!evaluate(&lt, 10, None));
    }

    #[test]
    fn changed_never_fires_without_baseline() {
        let changed = Condition::new(ConditionKind::Changed, 0);
        assert!(!evaluate(&changed, 5, None));
        assert!(!evaluate(&changed, 5, Some(5)));
        assert!(evaluate(&changed, 6, Some(5)));
    }

    #[test]
    fn always_fires() {
        assert!(evaluate(&Condition::always(), i32::MIN, None));
    }
}
