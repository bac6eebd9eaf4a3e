//! Limit executor.

/// Limit executor - applies a skip/limit window to a list of rows.
pub struct LimitExecutor {
    limit: Option<usize>,
    skip: usize,
}

impl LimitExecutor {
    /// Creates a new limit executor.
    pub fn new(limit: Option<usize>, skip: Option<usize>) -> Self {
        Self {
            limit,
            skip: skip.unwrap_or(0),
        }
    }

    /// Keeps the window of `rows` selected by skip and limit.
    pub fn execute<T>(&self, mut rows: Vec<T>) -> Vec<T> {
        let len = rows.len();
        let start = self.skip.min(len);
        let end = match self.limit {
            Some(limit) => start.saturating_add(limit).min(len),
            None => len,
        };
        rows.truncate(end);
        if start > 0 {
            rows.drain(..start);
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_and_skip() {
        let rows: Vec<u32> = (0..100).collect();
        assert_eq!(
            LimitExecutor::new(Some(10), Some(20)).execute(rows.clone()),
            (20..30).collect::<Vec<_>>()
        );
        assert_eq!(LimitExecutor::new(None, Some(95)).execute(rows.clone()).len(), 5);
        assert_eq!(LimitExecutor::new(Some(5), None).execute(rows.clone()).len(), 5);
        assert!(LimitExecutor::new(Some(5), Some(200)).execute(rows).is_empty());
    }

    #[test]
    fn test_huge_limit() {
        let rows: Vec<u32> = (0..3).collect();
        assert_eq!(LimitExecutor::new(Some(usize::MAX), Some(1)).execute(rows), vec![1, 2]);
    }
}
