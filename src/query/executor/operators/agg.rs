use linked_hash_map::LinkedHashMap;

use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::result::{DataValue, QueryResult, Tuple};
use crate::query::executor::{BoxedExecutor, Executor};

/// Aggregate functions over a column (COUNT(*) takes none)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateType {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
}

/// Running state for one aggregate in one group
#[derive(Debug, Clone)]
enum Accumulator {
    Count(i64),
    Sum(Option<i64>),
    Min(Option<DataValue>),
    Max(Option<DataValue>),
}

impl Accumulator {
    fn new(agg: AggregateType) -> Self {
        match agg {
            AggregateType::CountStar | AggregateType::Count => Accumulator::Count(0),
            AggregateType::Sum => Accumulator::Sum(None),
            AggregateType::Min => Accumulator::Min(None),
            AggregateType::Max => Accumulator::Max(None),
        }
    }

    fn update(&mut self, agg: AggregateType, value: Option<&DataValue>) {
        // NULL inputs are ignored everywhere except COUNT(*)
        let non_null = value.filter(|v| !v.is_null());
        match self {
            Accumulator::Count(count) => match agg {
                AggregateType::CountStar => *count += 1,
                _ => {
                    if non_null.is_some() {
                        *count += 1;
                    }
                }
            },
            Accumulator::Sum(sum) => {
                if let Some(DataValue::Integer(v)) = non_null {
                    *sum = Some(sum.unwrap_or(0) + v);
                }
            }
            Accumulator::Min(min) => {
                if let Some(v) = non_null {
                    match min {
                        Some(current) if &*current <= v => {}
                        _ => *min = Some(v.clone()),
                    }
                }
            }
            Accumulator::Max(max) => {
                if let Some(v) = non_null {
                    match max {
                        Some(current) if &*current >= v => {}
                        _ => *max = Some(v.clone()),
                    }
                }
            }
        }
    }

    fn finish(self) -> DataValue {
        match self {
            Accumulator::Count(count) => DataValue::Integer(count),
            Accumulator::Sum(sum) => sum.map(DataValue::Integer).unwrap_or(DataValue::Null),
            Accumulator::Min(min) => min.unwrap_or(DataValue::Null),
            Accumulator::Max(max) => max.unwrap_or(DataValue::Null),
        }
    }
}

/// Single-pass hash aggregation. Groups are keyed by the group-by columns
/// and emitted in first-seen order; without group-by columns an empty
/// input still yields one row of initial values (counts 0, others NULL).
pub struct AggregationExecutor {
    child: BoxedExecutor,
    group_by: Vec<usize>,
    aggregates: Vec<(AggregateType, Option<usize>)>,
    output: Option<std::vec::IntoIter<Tuple>>,
}

impl AggregationExecutor {
    pub fn new(
        child: BoxedExecutor,
        group_by: Vec<usize>,
        aggregates: Vec<(AggregateType, Option<usize>)>,
    ) -> Self {
        Self {
            child,
            group_by,
            aggregates,
            output: None,
        }
    }

    fn build(&mut self) -> QueryResult<Vec<Tuple>> {
        let mut groups: LinkedHashMap<Vec<DataValue>, Vec<Accumulator>> = LinkedHashMap::new();

        if self.group_by.is_empty() {
            // The global group exists even for an empty input
            groups.insert(
                Vec::new(),
                self.aggregates
                    .iter()
                    .map(|&(agg, _)| Accumulator::new(agg))
                    .collect(),
            );
        }

        while let Some((tuple, _)) = self.child.next()? {
            let key: Vec<DataValue> = self
                .group_by
                .iter()
                .map(|&col| tuple.value(col).cloned().unwrap_or(DataValue::Null))
                .collect();
            let accumulators = groups.entry(key).or_insert_with(|| {
                self.aggregates
                    .iter()
                    .map(|&(agg, _)| Accumulator::new(agg))
                    .collect()
            });
            for (accumulator, &(agg, column)) in accumulators.iter_mut().zip(&self.aggregates) {
                let value = column.and_then(|col| tuple.value(col));
                accumulator.update(agg, value);
            }
        }

        let rows = groups
            .into_iter()
            .map(|(key, accumulators)| {
                let mut values = key;
                values.extend(accumulators.into_iter().map(Accumulator::finish));
                Tuple::new(values)
            })
            .collect();
        Ok(rows)
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.output = None;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.output.is_none() {
            let rows = self.build()?;
            self.output = Some(rows.into_iter());
        }
        Ok(self
            .output
            .as_mut()
            .expect("output built")
            .next()
            .map(|tuple| (tuple, Rid::new(INVALID_PAGE_ID, 0))))
    }
}
