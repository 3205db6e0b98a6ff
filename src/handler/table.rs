use super::{ErrorContext, ErrorResponse};
use crate::classifier::{ApiError, ApiErrorType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of asking a registered handler to deal with an error.
#[derive(Debug)]
pub enum HandlerOutcome {
    Handled(ErrorResponse),
    /// The handler looked at the error and left it to default handling.
    Declined,
    /// The handler itself broke; default handling takes over.
    HandlerFailed(anyhow::Error),
}

#[async_trait]
pub trait ErrorTypeHandler: Send + Sync {
    /// Cheap pre-check before `handle` is called.
    fn accepts(&self, _error: &ApiError) -> bool {
        true
    }

    async fn handle(&self, error: &ApiError, context: &ErrorContext) -> HandlerOutcome;
}

/// Per-type handlers, fixed once built.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<ApiErrorType, Arc<dyn ErrorTypeHandler>>,
}

impl HandlerTable {
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    pub fn get(&self, error_type: ApiErrorType) -> Option<&Arc<dyn ErrorTypeHandler>> {
        self.handlers.get(&error_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("HandlerTable").field("types", &types).finish()
    }
}

#[derive(Default)]
pub struct HandlerTableBuilder {
    handlers: HashMap<ApiErrorType, Arc<dyn ErrorTypeHandler>>,
}

impl HandlerTableBuilder {
    /// Register `handler` for `error_type`, replacing any earlier one.
    #[must_use]
    pub fn on(mut self, error_type: ApiErrorType, handler: Arc<dyn ErrorTypeHandler>) -> Self {
        self.handlers.insert(error_type, handler);
        self
    }

    pub fn build(self) -> HandlerTable {
        HandlerTable {
            handlers: self.handlers,
        }
    }
}
