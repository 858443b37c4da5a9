//! Single-port dispatch between the gRPC server and the HTTP router.
//!
//! gRPC requires HTTP/2 and announces itself with an `application/grpc*` content type.
//! Everything else, including malformed content types, goes to the HTTP router.

use std::{
    convert::Infallible,
    task::{Context, Poll},
};

use axum::{
    BoxError, Router,
    body::{Bytes, HttpBody},
    http::{Request, Version, header},
    response::Response,
};
use tower::{Service, ServiceExt, util::Oneshot};

const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Whether the request should be handed to the gRPC server.
pub fn is_grpc_request<B>(req: &Request<B>) -> bool {
    req.version() == Version::HTTP_2
        && req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|content_type| content_type.contains(GRPC_CONTENT_TYPE))
}

/// Routes every request to either `grpc` or `http`, keeping no state between calls.
#[derive(Clone)]
pub struct GrpcMultiplexer {
    grpc: Router,
    http: Router,
}

impl GrpcMultiplexer {
    pub const fn new(grpc: Router, http: Router) -> Self {
        Self { grpc, http }
    }
}

impl<B> Service<Request<B>> for GrpcMultiplexer
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Oneshot<Router, Request<B>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Both routers are always ready.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        if is_grpc_request(&req) {
            tracing::trace!(path = %req.uri().path(), "Dispatching to gRPC");
            self.grpc.clone().oneshot(req)
        } else {
            self.http.clone().oneshot(req)
        }
    }
}
