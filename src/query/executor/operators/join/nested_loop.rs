use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::result::{QueryResult, Tuple};
use crate::query::executor::{BoxedExecutor, Executor};

use super::JoinType;

/// Nested-loop join: the right side is buffered once at init and re-scanned
/// for every left row.
pub struct NestedLoopJoinExecutor {
    left: BoxedExecutor,
    right: BoxedExecutor,
    predicate: Box<dyn Fn(&Tuple, &Tuple) -> bool + Send>,
    join_type: JoinType,
    /// Column count of the right side, for LEFT-join padding
    right_width: usize,
    right_rows: Vec<Tuple>,
    current_left: Option<Tuple>,
    right_pos: usize,
    left_matched: bool,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        left: BoxedExecutor,
        right: BoxedExecutor,
        predicate: Box<dyn Fn(&Tuple, &Tuple) -> bool + Send>,
        join_type: JoinType,
        right_width: usize,
    ) -> Self {
        Self {
            left,
            right,
            predicate,
            join_type,
            right_width,
            right_rows: Vec::new(),
            current_left: None,
            right_pos: 0,
            left_matched: false,
        }
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.right_rows.clear();
        while let Some((tuple, _)) = self.right.next()? {
            self.right_rows.push(tuple);
        }
        self.current_left = None;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let out_rid = Rid::new(INVALID_PAGE_ID, 0);
        loop {
            if self.current_left.is_none() {
                match self.left.next()? {
                    Some((tuple, _)) => {
                        self.current_left = Some(tuple);
                        self.right_pos = 0;
                        self.left_matched = false;
                    }
                    None => return Ok(None),
                }
            }
            let left = self.current_left.as_ref().expect("current left set");

            while self.right_pos < self.right_rows.len() {
                let right = &self.right_rows[self.right_pos];
                self.right_pos += 1;
                if (self.predicate)(left, right) {
                    self.left_matched = true;
                    return Ok(Some((left.joined_with(right), out_rid)));
                }
            }

            // Right side exhausted for this left row
            if self.join_type == JoinType::Left && !self.left_matched {
                let padded = left.null_padded(self.right_width);
                self.current_left = None;
                return Ok(Some((padded, out_rid)));
            }
            self.current_left = None;
        }
    }
}
