use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

pub(super) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased async handler: request payload bytes in, reply payload bytes out.
pub(super) trait HandlerFn: Send + Sync {
    fn call(&self, payload: Bytes) -> BoxFuture<'static, Result<Bytes>>;
}

/// Adapter from a typed `Fn(TReq) -> Future<Output = Result<TResp>>`.
pub(super) struct Handler<F, TReq, TResp> {
    func: F,
    _phantom: PhantomData<fn(TReq) -> TResp>,
}

impl<F, TReq, TResp> Handler<F, TReq, TResp> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut, TReq, TResp> HandlerFn for Handler<F, TReq, TResp>
where
    F: Fn(TReq) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TResp>> + Send + 'static,
    TReq: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
{
    fn call(&self, payload: Bytes) -> BoxFuture<'static, Result<Bytes>> {
        // ---
        let req: TReq = match serde_json::from_slice(&payload) {
            Ok(r) => r,
            Err(e) => return Box::pin(async move { Err(e.into()) }),
        };

        let fut = (self.func)(req);

        Box::pin(async move {
            let resp = fut.await?;
            Ok(Bytes::from(serde_json::to_vec(&resp)?))
        })
    }
}
