//! # Orquestração da extração
//!
//! Para cada endpoint do catálogo, em sequência:
//! extração -> normalização -> Parquet -> staging local -> envio.
//!
//! ## Princípios
//! - **Resiliência (Fail-Soft)**: Erros individuais em endpoints não abortam o pipeline.
//! - **Observabilidade**: Tempo de execução por etapa e resumo final.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::api::{FetchOutcome, OpenDotaClient};
use crate::errors::StepError;
use crate::models::{EndpointDescriptor, StorageConfig};
use crate::processor;
use crate::storage::{self, ObjectStore};

/// Resultado de um endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Uploaded {
        location: String,
        rows: usize,
        cols: usize,
    },
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub endpoint: String,
    pub status: StepStatus,
    pub elapsed: Duration,
}

/// Resumo da execução completa.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub steps: Vec<StepReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn uploaded(&self) -> usize {
        self.count(|s| matches!(s, StepStatus::Uploaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, StepStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, StepStatus::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&StepStatus) -> bool) -> usize {
        self.steps.iter().filter(|step| predicate(&step.status)).count()
    }

    pub fn status_of(&self, endpoint: &str) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|step| step.endpoint == endpoint)
            .map(|step| &step.status)
    }
}

pub struct Pipeline<'a> {
    client: &'a OpenDotaClient,
    store: &'a dyn ObjectStore,
    storage: &'a StorageConfig,
    infer_schema_len: Option<NonZeroUsize>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        client: &'a OpenDotaClient,
        store: &'a dyn ObjectStore,
        storage: &'a StorageConfig,
        infer_schema_len: Option<NonZeroUsize>,
    ) -> Self {
        Self {
            client,
            store,
            storage,
            infer_schema_len,
        }
    }

    /// Executa os endpoints na ordem recebida.
    pub fn run(&self, endpoints: &[EndpointDescriptor]) -> RunSummary {
        let global_timer = Instant::now();
        let mut summary = RunSummary::default();

        info!(
            endpoints = endpoints.len(),
            base_url = self.client.base_url(),
            "Iniciando extração de dados do Dota 2"
        );

        for endpoint in endpoints {
            let step_timer = Instant::now();
            info!(endpoint = %endpoint.name, path = %endpoint.path, "Processando");

            let status = match self.run_step(endpoint) {
                Ok(status) => status,
                Err(e) => StepStatus::Failed(e.to_string()),
            };

            let elapsed = step_timer.elapsed();
            match &status {
                StepStatus::Uploaded { location, rows, cols } => {
                    info!(endpoint = %endpoint.name, %location, rows, cols, "Sucesso ({:.2?})", elapsed)
                }
                StepStatus::Skipped(reason) => {
                    warn!(endpoint = %endpoint.name, "Ignorado: {}", reason)
                }
                StepStatus::Failed(reason) => {
                    error!(endpoint = %endpoint.name, "Falha: {}", reason)
                }
            }

            summary.steps.push(StepReport {
                endpoint: endpoint.name.clone(),
                status,
                elapsed,
            });
        }

        summary.elapsed = global_timer.elapsed();
        info!(
            uploaded = summary.uploaded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Extração concluída em {:.2?}",
            summary.elapsed
        );

        summary
    }

    fn run_step(&self, endpoint: &EndpointDescriptor) -> Result<StepStatus, StepError> {
        let data = match self.client.fetch(&endpoint.path, &[]) {
            FetchOutcome::Data(value) => value,
            FetchOutcome::Empty => return Ok(StepStatus::Skipped("resposta vazia".to_string())),
            FetchOutcome::NotFound => {
                return Ok(StepStatus::Skipped("endpoint não encontrado".to_string()));
            }
            FetchOutcome::Failed(e) => return Err(e.into()),
        };

        let Some(mut artifact) = processor::build_artifact(endpoint, data, self.infer_schema_len)?
        else {
            return Ok(StepStatus::Skipped("endpoint sem tabulação".to_string()));
        };

        if artifact.record_count == 0 {
            return Ok(StepStatus::Skipped("sem registros".to_string()));
        }
        if artifact.frame.width() == 0 {
            return Ok(StepStatus::Skipped(format!(
                "{} registros sem campos",
                artifact.record_count
            )));
        }
        if artifact.frame.height() == 0 {
            return Ok(StepStatus::Skipped("sem registros".to_string()));
        }

        let (rows, cols) = artifact.frame.shape();
        let bytes = processor::to_parquet(&mut artifact.frame)?;

        storage::write_staging(&self.storage.staging_dir, &artifact.file_name, &bytes)?;

        let key = self.storage.object_key(&artifact.file_name);
        let location = self.store.put(&key, bytes)?;

        Ok(StepStatus::Uploaded {
            location,
            rows,
            cols,
        })
    }
}
