//! Política de retentativas do cliente HTTP.
//!
//! Duas regras convivem:
//! - **Backoff exponencial**: até `max_attempts` envios para status transitórios
//!   e falhas de rede, esperando `fator * 2^(n-1)` segundos antes da retentativa `n`.
//! - **Cooldown de rate limit**: o primeiro HTTP 429 de uma requisição espera um
//!   tempo fixo (60s por padrão) e concede uma tentativa extra. No máximo um
//!   cooldown por requisição.

use crate::models::RetryConfig;
use reqwest::StatusCode;
use std::time::Duration;

/// Abstração da espera entre tentativas, substituída nos testes.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Espera real, bloqueando a thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: Duration,
    pub cooldown: Duration,
    pub retry_statuses: Vec<StatusCode>,
}

/// O que fazer após uma tentativa mal sucedida.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Espera e tenta de novo.
    Backoff(Duration),
    /// Espera o cooldown de rate limit e tenta de novo.
    Cooldown(Duration),
    /// Desiste.
    GiveUp,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_factor: Duration::try_from_secs_f64(config.backoff_factor_secs)
                .unwrap_or(Duration::ZERO),
            cooldown: Duration::from_secs(config.cooldown_secs),
            retry_statuses: config
                .retry_statuses
                .iter()
                .filter_map(|code| StatusCode::from_u16(*code).ok())
                .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Espera antes da retentativa de número `retry` (1 = primeira retentativa).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_factor * 2u32.pow(exponent)
    }
}

/// Estado de uma única requisição ao longo das tentativas.
#[derive(Debug)]
pub struct RetryState<'a> {
    policy: &'a RetryPolicy,
    attempts: u32,
    backoffs: u32,
    cooldown_spent: bool,
}

impl<'a> RetryState<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            backoffs: 0,
            cooldown_spent: false,
        }
    }

    /// Registra um envio. Retorna o número da tentativa corrente.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Limite de envios: `max_attempts`, mais um se o cooldown já foi usado.
    fn budget(&self) -> u32 {
        self.policy.max_attempts + u32::from(self.cooldown_spent)
    }

    /// Decide após um status transitório (ou `None` para falha de rede).
    pub fn after_failure(&mut self, status: Option<StatusCode>) -> RetryDecision {
        if status == Some(StatusCode::TOO_MANY_REQUESTS) && !self.cooldown_spent {
            self.cooldown_spent = true;
            return RetryDecision::Cooldown(self.policy.cooldown);
        }

        if self.attempts >= self.budget() {
            return RetryDecision::GiveUp;
        }

        self.backoffs += 1;
        RetryDecision::Backoff(self.policy.backoff_delay(self.backoffs))
    }
}
