/// Synchronous pre-flight check run once before any network call.
pub trait TokenBudgetGuard: Send + Sync {
    fn can_proceed(&self, estimated_cost: u32) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedBudget;

impl TokenBudgetGuard for UnlimitedBudget {
    fn can_proceed(&self, _estimated_cost: u32) -> bool {
        true
    }
}

/// Allows any single generation whose estimate fits under `limit`.
#[derive(Debug, Clone, Copy)]
pub struct FixedBudget {
    pub limit: u32,
}

impl TokenBudgetGuard for FixedBudget {
    fn can_proceed(&self, estimated_cost: u32) -> bool {
        estimated_cost <= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_budget_boundary() {
        let budget = FixedBudget { limit: 100 };
        assert!(budget.can_proceed(100));
        assert!(!budget.can_proceed(101));
        assert!(UnlimitedBudget.can_proceed(u32::MAX));
    }
}
