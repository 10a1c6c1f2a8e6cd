use std::cmp::Ordering;

use crate::common::types::Rid;
use crate::query::executor::result::{DataValue, QueryResult, Tuple};
use crate::query::executor::{BoxedExecutor, Executor};

/// Sort directions; `Default` is ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Default,
    Asc,
    Desc,
}

/// Compare two tuples under a multi-key order-by spec, tie-breaking
/// strictly in spec order. Fully equal keys compare Equal: duplicates are
/// legal and a stable sort preserves their input order.
pub(crate) fn compare_tuples(
    a: &Tuple,
    b: &Tuple,
    order_by: &[(usize, OrderDirection)],
) -> Ordering {
    for &(column, direction) in order_by {
        let va = a.value(column).unwrap_or(&DataValue::Null);
        let vb = b.value(column).unwrap_or(&DataValue::Null);
        let ord = match direction {
            OrderDirection::Desc => vb.cmp(va),
            OrderDirection::Asc | OrderDirection::Default => va.cmp(vb),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Buffer the whole child output and emit it in sorted order.
pub struct SortExecutor {
    child: BoxedExecutor,
    order_by: Vec<(usize, OrderDirection)>,
    output: Option<std::vec::IntoIter<(Tuple, Rid)>>,
}

impl SortExecutor {
    pub fn new(child: BoxedExecutor, order_by: Vec<(usize, OrderDirection)>) -> Self {
        Self {
            child,
            order_by,
            output: None,
        }
    }
}

impl Executor for SortExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.output = None;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.output.is_none() {
            let mut rows = Vec::new();
            while let Some(row) = self.child.next()? {
                rows.push(row);
            }
            // Vec::sort_by is stable, which is exactly the tie behavior
            // duplicates need.
            rows.sort_by(|(a, _), (b, _)| compare_tuples(a, b, &self.order_by));
            self.output = Some(rows.into_iter());
        }
        Ok(self.output.as_mut().expect("output built").next())
    }
}
