use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::result::{QueryResult, Tuple};
use crate::query::executor::Executor;

/// Produces a fixed list of literal rows; the usual child of an insert.
pub struct ValuesExecutor {
    rows: Vec<Tuple>,
    cursor: usize,
}

impl ValuesExecutor {
    pub fn new(rows: Vec<Tuple>) -> Self {
        Self { rows, cursor: 0 }
    }
}

impl Executor for ValuesExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let tuple = self.rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some((tuple, Rid::new(INVALID_PAGE_ID, 0))))
    }
}
