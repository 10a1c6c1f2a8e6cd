use super::PhysicalPlan;

/// Bottom-up rewrite pass. The single rule: a limit directly over a sort
/// becomes a top-N, which keeps only N rows in memory instead of the
/// whole input.
pub fn optimize(plan: PhysicalPlan) -> PhysicalPlan {
    match plan {
        PhysicalPlan::Sort { input, order_by } => PhysicalPlan::Sort {
            input: Box::new(optimize(*input)),
            order_by,
        },
        PhysicalPlan::Limit { input, limit } => {
            let input = optimize(*input);
            match input {
                PhysicalPlan::Sort { input, order_by } => PhysicalPlan::TopN {
                    input,
                    order_by,
                    limit,
                },
                other => PhysicalPlan::Limit {
                    input: Box::new(other),
                    limit,
                },
            }
        }
        PhysicalPlan::TopN {
            input,
            order_by,
            limit,
        } => PhysicalPlan::TopN {
            input: Box::new(optimize(*input)),
            order_by,
            limit,
        },
        leaf @ (PhysicalPlan::SeqScan { .. } | PhysicalPlan::IndexScan { .. }) => leaf,
    }
}
