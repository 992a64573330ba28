// src/bootstrap.rs

//! Init-once engine loading.
//!
//! Loading an engine is done at most once, lazily, the first time anything awaits it. Every
//! caller (including ones racing the first) observes the same outcome, success or failure.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{error, info};

use crate::engine::DemuxEngine;
use crate::error::{Error, ErrorKind, Result};

/// A cloneable handle on one shared engine load.
pub struct Bootstrap<E> {
    outcome: Shared<BoxFuture<'static, Result<Arc<E>>>>,
}

impl<E: DemuxEngine> Bootstrap<E> {
    /// Wrap a loader future. Nothing runs until the first [`Bootstrap::engine`] call.
    pub fn new<F>(load: F) -> Self
    where
        F: Future<Output = Result<E>> + Send + 'static,
    {
        let outcome = async move {
            match load.await {
                Ok(engine) => {
                    info!("demux engine ready");
                    Ok(Arc::new(engine))
                }
                Err(err) => {
                    error!(error = %err, "demux engine failed to load");
                    Err(Error::new(
                        ErrorKind::EngineBootstrapFailed,
                        format!("Failed to load demux engine: {err}"),
                    )
                    .with_source(err))
                }
            }
        }
        .boxed()
        .shared();

        Self { outcome }
    }

    /// An already-loaded engine.
    pub fn ready(engine: E) -> Self {
        Self::new(async move { Ok(engine) })
    }

    /// Wait for the load to finish and return its outcome.
    pub async fn engine(&self) -> Result<Arc<E>> {
        self.outcome.clone().await
    }
}

impl<E> Clone for Bootstrap<E> {
    fn clone(&self) -> Self {
        Self {
            outcome: self.outcome.clone(),
        }
    }
}
