/// Maximal page size accepted from clients
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// `skip` / `count` window over a listing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub skip: i64,
    pub count: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            skip: 0,
            count: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Clamps client supplied values into the allowed window
    pub fn new(skip: Option<i64>, count: Option<i64>) -> Self {
        let skip = skip.unwrap_or(0).max(0);
        let count = count.unwrap_or(DEFAULT_PAGE_SIZE).max(1).min(MAX_PAGE_SIZE);
        Pagination { skip, count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_is_clamped() {
        assert_eq!(Pagination::new(None, None), Pagination::default());
        assert_eq!(Pagination::new(Some(-3), Some(0)), Pagination { skip: 0, count: 1 });
        assert_eq!(Pagination::new(Some(40), Some(1_000)), Pagination { skip: 40, count: MAX_PAGE_SIZE });
    }
}
