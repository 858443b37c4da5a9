//! Email service exposing `SendMail` over gRPC and a JSON/REST gateway on a single port.
//!
//! ```text
//!                        ┌──────────────────────────────┐
//!   TLS (h2, http/1.1)   │        GrpcMultiplexer        │   HTTP/2 + application/grpc
//!   or plaintext (h2c) ─▶│  version + content-type check │──────────────▶ tonic EmailService
//!                        └──────────────┬───────────────┘
//!                                       │ everything else
//!                                       ▼
//!                   axum router: POST /v1alpha1/email, /swagger.json,
//!                                /metrics, /swagger-ui/*
//! ```
//!
//! Both protocols call the same [`service::MailService`].

pub mod client;
pub mod config;
pub mod dto;
pub mod handlers;
pub mod observability;
pub mod server;
pub mod service;
