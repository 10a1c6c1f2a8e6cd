use crate::common::types::Rid;
use crate::query::executor::result::{QueryResult, Tuple};
use crate::query::executor::{BoxedExecutor, Executor};

/// Pass through the first `limit` child rows.
pub struct LimitExecutor {
    child: BoxedExecutor,
    limit: usize,
    emitted: usize,
}

impl LimitExecutor {
    pub fn new(child: BoxedExecutor, limit: usize) -> Self {
        Self {
            child,
            limit,
            emitted: 0,
        }
    }
}

impl Executor for LimitExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.emitted = 0;
        self.child.init()
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.emitted >= self.limit {
            return Ok(None);
        }
        match self.child.next()? {
            Some(row) => {
                self.emitted += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }
}
