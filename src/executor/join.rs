//! Join algorithm selection and cost estimation

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::query::JoinType;
use crate::config::EngineConfig;

/// Physical join algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinAlgorithm {
    NestedLoop,
    HashJoin,
    /// Costed only; inputs are assumed to be sorted
    MergeJoin,
}

/// Chosen strategy for one join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPlan {
    pub left_table: String,
    pub right_table: String,
    pub join_type: JoinType,
    pub condition: String,
    pub algorithm: JoinAlgorithm,
    pub estimated_cost: u64,
}

/// Heuristic join planner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinStrategy {
    small_table_threshold: u64,
    hash_build_overhead: u64,
}

impl Default for JoinStrategy {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl JoinStrategy {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            small_table_threshold: config.small_table_threshold,
            hash_build_overhead: config.hash_build_overhead,
        }
    }

    /// Pick an algorithm.
    ///
    /// Either side below the small-table threshold gets a nested loop; an
    /// equality condition otherwise gets a hash join.
    pub fn choose_algorithm(
        &self,
        _left_table: &str,
        _right_table: &str,
        condition: &str,
        left_cardinality: u64,
        right_cardinality: u64,
    ) -> JoinAlgorithm {
        if left_cardinality < self.small_table_threshold
            || right_cardinality < self.small_table_threshold
        {
            return JoinAlgorithm::NestedLoop;
        }
        if condition.contains('=') {
            return JoinAlgorithm::HashJoin;
        }
        JoinAlgorithm::NestedLoop
    }

    /// Rough cost of running `algorithm` over the given input sizes
    pub fn estimate_join_cost(&self, algorithm: JoinAlgorithm, left_rows: u64, right_rows: u64) -> u64 {
        match algorithm {
            JoinAlgorithm::NestedLoop => left_rows.saturating_mul(right_rows),
            JoinAlgorithm::HashJoin => left_rows
                .saturating_add(right_rows)
                .saturating_add(self.hash_build_overhead),
            JoinAlgorithm::MergeJoin => left_rows.saturating_add(right_rows),
        }
    }

    /// Choose an algorithm and cost it
    pub fn plan(
        &self,
        left_table: &str,
        right_table: &str,
        join_type: JoinType,
        condition: &str,
        left_cardinality: u64,
        right_cardinality: u64,
    ) -> JoinPlan {
        let algorithm = self.choose_algorithm(
            left_table,
            right_table,
            condition,
            left_cardinality,
            right_cardinality,
        );
        let estimated_cost =
            self.estimate_join_cost(algorithm, left_cardinality, right_cardinality);
        debug!(
            left = %left_table,
            right = %right_table,
            ?algorithm,
            estimated_cost,
            "planned join"
        );
        JoinPlan {
            left_table: left_table.to_string(),
            right_table: right_table.to_string(),
            join_type,
            condition: condition.to_string(),
            algorithm,
            estimated_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_tables_use_nested_loop() {
        let strategy = JoinStrategy::default();
        assert_eq!(
            strategy.choose_algorithm("a", "b", "a.id = b.aid", 99, 10_000),
            JoinAlgorithm::NestedLoop
        );
        assert_eq!(
            strategy.choose_algorithm("a", "b", "a.id = b.aid", 10_000, 5),
            JoinAlgorithm::NestedLoop
        );
    }

    #[test]
    fn test_large_equi_join_uses_hash() {
        let strategy = JoinStrategy::default();
        assert_eq!(
            strategy.choose_algorithm("a", "b", "a.id = b.aid", 100, 100),
            JoinAlgorithm::HashJoin
        );
        assert_eq!(
            strategy.choose_algorithm("a", "b", "a.id > b.aid", 500, 500),
            JoinAlgorithm::NestedLoop
        );
    }

    #[test]
    fn test_threshold_from_config() {
        let strategy = JoinStrategy::new(&EngineConfig::new().small_table_threshold(2));
        assert_eq!(
            strategy.choose_algorithm("a", "b", "a.id = b.aid", 2, 3),
            JoinAlgorithm::HashJoin
        );
    }

    #[test]
    fn test_cost_estimates() {
        let strategy = JoinStrategy::default();
        assert_eq!(strategy.estimate_join_cost(JoinAlgorithm::NestedLoop, 20, 30), 600);
        assert_eq!(strategy.estimate_join_cost(JoinAlgorithm::HashJoin, 20, 30), 1050);
        assert_eq!(strategy.estimate_join_cost(JoinAlgorithm::MergeJoin, 20, 30), 50);
        assert_eq!(
            strategy.estimate_join_cost(JoinAlgorithm::NestedLoop, u64::MAX, 2),
            u64::MAX
        );
    }

    #[test]
    fn test_plan() {
        let plan = JoinStrategy::default().plan("a", "b", JoinType::Inner, "a.id = b.aid", 2, 3);
        assert_eq!(plan.algorithm, JoinAlgorithm::NestedLoop);
        assert_eq!(plan.estimated_cost, 6);
        assert_eq!(plan.right_table, "b");
    }
}
