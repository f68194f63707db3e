//! The generative-model boundary.
//!
//! An oracle is a black-box `prompt -> text` function. Nothing about the shape
//! of its output is trusted; see [`crate::parser`] for recovery.

use crate::error::{MappingError, Result};
use futures::future::BoxFuture;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.95,
            max_tokens: 2048,
        }
    }
}

pub trait Oracle: Send + Sync {
    /// Complete `prompt`. Either the full text is returned or the call fails
    /// with a transport-class error; there is no partial result.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: &'a GenerationParams,
    ) -> BoxFuture<'a, Result<String>>;
}

impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: &'a GenerationParams,
    ) -> BoxFuture<'a, Result<String>> {
        (**self).generate(prompt, params)
    }
}

impl<T: Oracle + ?Sized> Oracle for Box<T> {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: &'a GenerationParams,
    ) -> BoxFuture<'a, Result<String>> {
        (**self).generate(prompt, params)
    }
}

/// Call `oracle`, converting an elapsed `timeout` into the retryable
/// [`MappingError::OracleTimeout`].
pub async fn generate_with_timeout<O: Oracle + ?Sized>(
    oracle: &O,
    prompt: &str,
    params: &GenerationParams,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, oracle.generate(prompt, params)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Oracle call exceeded {:?}", timeout);
            Err(MappingError::OracleTimeout(timeout))
        }
    }
}
