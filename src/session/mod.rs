//! Execution capability
//!
//! The engine never opens connections. It consumes a session that can
//! prepare a statement and execute it with bound values, blocking or
//! non-blocking. Connection lifecycle, retries and load balancing belong to
//! the session implementation.
//!
//! `MemorySession` is an in-memory implementation for tests.

mod memory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use crate::schema::{CqlValue, Row};

pub use memory::{ExecutedStatement, MemorySession};

/// Result type for session calls
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Boxed future returned by `AsyncSession`
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = ExecutionResult<T>> + Send + 'a>>;

/// Errors reported by the session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The store rejected the statement
    #[error("statement rejected: {message}")]
    Invalid { message: String },

    /// Not enough replicas or no reachable host
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// The store did not answer in time
    #[error("timed out: {message}")]
    Timeout { message: String },

    /// A paging token could not be decoded
    #[error("invalid paging state: {reason}")]
    InvalidPagingState { reason: String },
}

impl ExecutionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Invalid { .. } => "CASSMAP_STATEMENT_REJECTED",
            ExecutionError::Unavailable { .. } => "CASSMAP_UNAVAILABLE",
            ExecutionError::Timeout { .. } => "CASSMAP_TIMEOUT",
            ExecutionError::InvalidPagingState { .. } => "CASSMAP_INVALID_PAGING_STATE",
        }
    }
}

/// Opaque resume point returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PagingState(Vec<u8>);

impl PagingState {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decodes a token previously produced by `to_token`.
    pub fn from_token(token: &str) -> ExecutionResult<Self> {
        STANDARD
            .decode(token)
            .map(Self)
            .map_err(|e| ExecutionError::InvalidPagingState {
                reason: e.to_string(),
            })
    }

    /// Caller-facing base64 token
    pub fn to_token(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

/// Page size plus optional resume point
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub page_size: u32,
    pub state: Option<PagingState>,
}

impl PageRequest {
    pub fn first(page_size: u32) -> Self {
        Self {
            page_size,
            state: None,
        }
    }

    pub fn resume(page_size: u32, state: PagingState) -> Self {
        Self {
            page_size,
            state: Some(state),
        }
    }
}

/// Handle to a statement prepared by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub id: u64,
    pub cql: String,
}

/// Rows of one response, with the resume point if more rows exist
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub rows: Vec<Row>,
    pub paging_state: Option<PagingState>,
}

impl ResultPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Blocking execution capability
pub trait Session: Send + Sync {
    fn prepare(&self, cql: &str) -> ExecutionResult<PreparedStatement>;

    fn execute(
        &self,
        prepared: &PreparedStatement,
        values: &[CqlValue],
        paging: Option<&PageRequest>,
    ) -> ExecutionResult<ResultPage>;

    fn execute_unprepared(&self, cql: &str, values: &[CqlValue]) -> ExecutionResult<ResultPage>;
}

/// Non-blocking execution capability
pub trait AsyncSession: Send + Sync {
    fn prepare<'a>(&'a self, cql: &'a str) -> SessionFuture<'a, PreparedStatement>;

    fn execute<'a>(
        &'a self,
        prepared: &'a PreparedStatement,
        values: &'a [CqlValue],
        paging: Option<&'a PageRequest>,
    ) -> SessionFuture<'a, ResultPage>;

    fn execute_unprepared<'a>(
        &'a self,
        cql: &'a str,
        values: &'a [CqlValue],
    ) -> SessionFuture<'a, ResultPage>;
}

impl<T: Session + ?Sized> Session for Arc<T> {
    fn prepare(&self, cql: &str) -> ExecutionResult<PreparedStatement> {
        (**self).prepare(cql)
    }

    fn execute(
        &self,
        prepared: &PreparedStatement,
        values: &[CqlValue],
        paging: Option<&PageRequest>,
    ) -> ExecutionResult<ResultPage> {
        (**self).execute(prepared, values, paging)
    }

    fn execute_unprepared(&self, cql: &str, values: &[CqlValue]) -> ExecutionResult<ResultPage> {
        (**self).execute_unprepared(cql, values)
    }
}

impl<T: AsyncSession + ?Sized> AsyncSession for Arc<T> {
    fn prepare<'a>(&'a self, cql: &'a str) -> SessionFuture<'a, PreparedStatement> {
        (**self).prepare(cql)
    }

    fn execute<'a>(
        &'a self,
        prepared: &'a PreparedStatement,
        values: &'a [CqlValue],
        paging: Option<&'a PageRequest>,
    ) -> SessionFuture<'a, ResultPage> {
        (**self).execute(prepared, values, paging)
    }

    fn execute_unprepared<'a>(
        &'a self,
        cql: &'a str,
        values: &'a [CqlValue],
    ) -> SessionFuture<'a, ResultPage> {
        (**self).execute_unprepared(cql, values)
    }
}

/// Presents a blocking `Session` as an `AsyncSession`.
///
/// The wrapped call runs when the future is first polled, on the polling
/// thread. Used by `BlockingEngine` to drive the async core.
#[derive(Debug, Clone)]
pub struct Blocking<S>(pub S);

impl<S> Blocking<S> {
    pub fn inner(&self) -> &S {
        &self.0
    }
}

impl<S: Session> AsyncSession for Blocking<S> {
    fn prepare<'a>(&'a self, cql: &'a str) -> SessionFuture<'a, PreparedStatement> {
        Box::pin(async move { self.0.prepare(cql) })
    }

    fn execute<'a>(
        &'a self,
        prepared: &'a PreparedStatement,
        values: &'a [CqlValue],
        paging: Option<&'a PageRequest>,
    ) -> SessionFuture<'a, ResultPage> {
        Box::pin(async move { self.0.execute(prepared, values, paging) })
    }

    fn execute_unprepared<'a>(
        &'a self,
        cql: &'a str,
        values: &'a [CqlValue],
    ) -> SessionFuture<'a, ResultPage> {
        Box::pin(async move { self.0.execute_unprepared(cql, values) })
    }
}
