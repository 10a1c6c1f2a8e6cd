// Execution operators.
//
// Scans and DML touch the lock manager and the indexes; joins, aggregation,
// sort, limit and top-N are pure pipeline operators over their children.

pub mod agg;
pub mod dml;
pub mod index_scan;
pub mod join;
pub mod limit;
pub mod seq_scan;
pub mod sort;
pub mod topn;
pub mod values;

pub use agg::{AggregateType, AggregationExecutor};
pub use dml::{DeleteExecutor, InsertExecutor, UpdateExecutor};
pub use index_scan::IndexScanExecutor;
pub use join::{HashJoinExecutor, JoinType, NestedIndexJoinExecutor, NestedLoopJoinExecutor};
pub use limit::LimitExecutor;
pub use seq_scan::SeqScanExecutor;
pub use sort::{OrderDirection, SortExecutor};
pub use topn::TopNExecutor;
pub use values::ValuesExecutor;
