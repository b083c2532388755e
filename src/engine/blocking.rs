//! Blocking facade
//!
//! Wraps a blocking `Session` in the `Blocking` adapter and drives the async
//! engine on a current-thread runtime. The runtime spawns no worker threads;
//! every call runs on the caller's thread.
//!
//! Blocking calls must not be made from inside another tokio runtime.

use std::ops::Deref;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::config::EngineConfig;
use crate::session::{Blocking, ResultPage, Session};
use crate::statement::Statement;

use super::engine::Engine;
use super::errors::{QueryError, QueryResult};

/// Engine for callers without an async runtime
pub struct BlockingEngine<S> {
    engine: Engine<Blocking<S>>,
    runtime: Arc<Runtime>,
}

impl<S: Session> BlockingEngine<S> {
    pub fn new(session: S, config: EngineConfig) -> QueryResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map(Arc::new)
            .map_err(|e| QueryError::Runtime(e.to_string()))?;

        let engine = Engine::new(Blocking(session), config).with_runtime(Arc::clone(&runtime));
        Ok(Self { engine, runtime })
    }

    pub fn engine(&self) -> &Engine<Blocking<S>> {
        &self.engine
    }

    /// The wrapped blocking session
    pub fn session(&self) -> &S {
        self.engine.session().inner()
    }

    /// Runs a future to completion on this engine's runtime.
    pub fn run<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn execute(&self, statement: &Statement) -> QueryResult<ResultPage> {
        self.run(self.engine.execute(statement))
    }
}

impl<S> Deref for BlockingEngine<S> {
    type Target = Engine<Blocking<S>>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CqlValue;
    use crate::session::MemorySession;

    #[test]
    fn test_blocking_execute() {
        let engine = BlockingEngine::new(MemorySession::new(), EngineConfig::default()).unwrap();
        engine
            .execute(&Statement::new(
                "INSERT INTO t (id) VALUES (?)",
                vec![CqlValue::Int(1)],
            ))
            .unwrap();

        assert_eq!(engine.session().rows("t").len(), 1);
        assert!(engine.is_blocking());
        assert_eq!(engine.metrics().snapshot().statements_executed, 1);
    }

    #[test]
    fn test_block_on_through_deref() {
        let engine = BlockingEngine::new(MemorySession::new(), EngineConfig::default()).unwrap();
        let value = engine.block_on(async { 7 }).unwrap();
        assert_eq!(value, 7);
    }
}
