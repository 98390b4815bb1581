use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::error::Result;

/// Serves the `ilp` payload of an inbound Message and returns the reply payload.
/// May be invoked concurrently for the same peer.
#[async_trait]
pub trait DataHandler: Send + Sync {
    async fn handle_data(&self, from: &str, data: Bytes) -> Result<Bytes>;
}

/// Account lifecycle notifications for the listener role. Called inline from
/// connection handling, so implementations must return promptly.
pub trait AccountHooks: Send + Sync {
    fn on_account_added(&self, id: &str, info: &Value);
    fn on_account_removed(&self, id: &str);
    fn on_connection_changed(&self, id: &str, is_connected: bool);
}

pub struct FnDataHandler<F> {
    f: F,
}

pub fn data_handler_fn<F, Fut>(f: F) -> FnDataHandler<F>
where
    F: Fn(String, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    FnDataHandler { f }
}

#[async_trait]
impl<F, Fut> DataHandler for FnDataHandler<F>
where
    F: Fn(String, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    async fn handle_data(&self, from: &str, data: Bytes) -> Result<Bytes> {
        (self.f)(from.to_string(), data).await
    }
}
