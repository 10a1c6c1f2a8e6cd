// Minimal physical plan representation: just enough tree to express the
// storage-aware operators and drive the rewrite rules.

pub mod optimizer;

use crate::query::executor::operators::OrderDirection;

#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalPlan {
    SeqScan {
        table: String,
    },
    IndexScan {
        index: String,
    },
    Sort {
        input: Box<PhysicalPlan>,
        order_by: Vec<(usize, OrderDirection)>,
    },
    Limit {
        input: Box<PhysicalPlan>,
        limit: usize,
    },
    TopN {
        input: Box<PhysicalPlan>,
        order_by: Vec<(usize, OrderDirection)>,
        limit: usize,
    },
}
