pub mod conversation_service;
pub mod message_service;

pub use conversation_service::ConversationService;
pub use message_service::MessageService;

use crate::error::{AppError, AppResult};

/// A validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: u32,
    limit: u32,
}

impl Page {
    /// `page` defaults to 1 and `limit` to `default_limit`; anything outside
    /// `page >= 1` and `1 <= limit <= max_limit` is rejected.
    pub fn resolve(
        page: Option<u32>,
        limit: Option<u32>,
        default_limit: u32,
        max_limit: u32,
    ) -> AppResult<Self> {
        let number = page.unwrap_or(1);
        let limit = limit.unwrap_or(default_limit);
        if number == 0 {
            return Err(AppError::BadRequest("page must be at least 1".into()));
        }
        if limit == 0 || limit > max_limit {
            return Err(AppError::BadRequest(format!(
                "limit must be between 1 and {max_limit}"
            )));
        }
        Ok(Self { number, limit })
    }

    pub fn first(limit: u32) -> Self {
        Self {
            number: 1,
            limit: limit.max(1),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.limit)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_offsets() {
        let page = Page::resolve(None, None, 50, 100).unwrap();
        assert_eq!(page.number(), 1);
        assert_eq!(page.limit(), 50);
        assert_eq!(page.offset(), 0);

        let third = Page::resolve(Some(3), Some(20), 50, 100).unwrap();
        assert_eq!(third.offset(), 40);
    }

    #[test]
    fn out_of_range_is_bad_request() {
        for (page, limit) in [(Some(0), None), (None, Some(0)), (None, Some(101))] {
            assert!(matches!(
                Page::resolve(page, limit, 50, 100),
                Err(AppError::BadRequest(_))
            ));
        }
        assert!(Page::resolve(None, Some(100), 50, 100).is_ok());
    }
}
