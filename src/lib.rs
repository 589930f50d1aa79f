//! Extração full-load da API OpenDota para Parquet.
//!
//! - [`api`]: cliente HTTP com retentativas e um método por endpoint.
//! - [`processor`]: normalização JSON -> DataFrame -> Parquet.
//! - [`storage`]: envio ao S3, staging e limpeza local.
//! - [`pipeline`]: orquestração sequencial do catálogo de endpoints.

pub mod api;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod retry;
pub mod storage;
