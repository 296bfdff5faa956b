//! The model provider seam.
//!
//! A [`Model`] turns a message history plus tool definitions into a
//! [`ModelResponse`], either in one shot or as a stream of [`ModelEvent`]
//! deltas. The engine is provider-agnostic: anything implementing this trait
//! can drive a run. [`StubModel`] is the bundled scripted implementation used
//! for tests and offline development.

pub mod stub;

pub use stub::{StubModel, StubResponse};

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::message::{Message, ModelResponse};
use crate::stream::ModelEvent;
use crate::tool::ToolDefinition;

/// A stream of model events from a streaming request.
pub type ModelEventStream = Pin<Box<dyn Stream<Item = Result<ModelEvent, ModelError>> + Send>>;

/// Provider-independent request knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling seed for reproducibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl ModelSettings {
    /// Set the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the generation cap.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A model provider.
#[async_trait]
pub trait Model: Send + Sync {
    /// Provider-visible model name.
    fn name(&self) -> &str;

    /// Produce a complete response for the given history.
    async fn request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        settings: &ModelSettings,
    ) -> Result<ModelResponse, ModelError>;

    /// Produce a response as a stream of deltas.
    ///
    /// Providers without streaming support keep this default.
    async fn request_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        settings: &ModelSettings,
    ) -> Result<ModelEventStream, ModelError> {
        let _ = (messages, tools, settings);
        Err(ModelError::not_supported("streaming"))
    }
}

/// Shared handle to a model.
pub type SharedModel = Arc<dyn Model>;

#[async_trait]
impl<M: Model + ?Sized> Model for Arc<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        settings: &ModelSettings,
    ) -> Result<ModelResponse, ModelError> {
        (**self).request(messages, tools, settings).await
    }

    async fn request_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        settings: &ModelSettings,
    ) -> Result<ModelEventStream, ModelError> {
        (**self).request_stream(messages, tools, settings).await
    }
}
