use std::collections::HashMap;

use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::result::{DataValue, QueryResult, Tuple};
use crate::query::executor::{BoxedExecutor, Executor};

use super::JoinType;

/// Hash join on single-column equality: builds an in-memory multi-map over
/// the right side's join key and probes it once per left row.
pub struct HashJoinExecutor {
    left: BoxedExecutor,
    right: BoxedExecutor,
    left_key: usize,
    right_key: usize,
    join_type: JoinType,
    right_width: usize,
    table: HashMap<DataValue, Vec<Tuple>>,
    current_left: Option<Tuple>,
    matches: Vec<Tuple>,
    match_pos: usize,
}

impl HashJoinExecutor {
    pub fn new(
        left: BoxedExecutor,
        right: BoxedExecutor,
        left_key: usize,
        right_key: usize,
        join_type: JoinType,
        right_width: usize,
    ) -> Self {
        Self {
            left,
            right,
            left_key,
            right_key,
            join_type,
            right_width,
            table: HashMap::new(),
            current_left: None,
            matches: Vec::new(),
            match_pos: 0,
        }
    }
}

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.left.init()?;
        self.right.init()?;

        // Build phase over the right input; NULL keys never match
        self.table.clear();
        while let Some((tuple, _)) = self.right.next()? {
            match tuple.value(self.right_key) {
                Some(DataValue::Null) | None => {}
                Some(key) => {
                    self.table.entry(key.clone()).or_default().push(tuple);
                }
            }
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
                        self.matches = match tuple.value(self.left_key) {
                            Some(DataValue::Null) | None => Vec::new(),
                            Some(key) => self.table.get(key).cloned().unwrap_or_default(),
                        };
                        self.match_pos = 0;
                        self.current_left = Some(tuple);
                    }
                    None => return Ok(None),
                }
            }
            let left = self.current_left.as_ref().expect("current left set");

            if self.match_pos < self.matches.len() {
                let joined = left.joined_with(&self.matches[self.match_pos]);
                self.match_pos += 1;
                return Ok(Some((joined, out_rid)));
            }

            if self.join_type == JoinType::Left && self.matches.is_empty() {
                let padded = left.null_padded(self.right_width);
                self.current_left = None;
                return Ok(Some((padded, out_rid)));
            }
            self.current_left = None;
        }
    }
}
