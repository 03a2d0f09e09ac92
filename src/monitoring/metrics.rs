// Copyright (c) 2026 Credence
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Prometheus metrics and the HTTP exporter.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Prometheus registration failed.
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Attestations issued by the local pipeline.
    pub attestations_issued_total: IntCounter,
    /// Attestation issuance failures.
    pub attestations_failed_total: IntCounter,

    /// Tasks created.
    pub tasks_created_total: IntCounter,
    /// Tasks completed with quorum.
    pub tasks_completed_total: IntCounter,
    /// Tasks failed (timeout, disagreement or cancellation).
    pub tasks_failed_total: IntCounter,
    /// Responses accepted into a task bucket.
    pub responses_accepted_total: IntCounter,
    /// Responses rejected at ingestion.
    pub responses_rejected_total: IntCounter,
    /// Events dropped on channel overflow.
    pub events_dropped_total: IntCounter,

    /// Registered operators.
    pub operators: IntGauge,
    /// Operators currently healthy.
    pub operators_healthy: IntGauge,
    /// Tasks currently pending.
    pub tasks_pending: IntGauge,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let attestations_issued_total = IntCounter::new(
            "credence_attestations_issued_total",
            "Attestations issued by the local pipeline",
        )
        .map_err(|_| MetricsError::Prom)?;
        let attestations_failed_total = IntCounter::new(
            "credence_attestations_failed_total",
            "Attestation issuance failures",
        )
        .map_err(|_| MetricsError::Prom)?;

        let tasks_created_total =
            IntCounter::new("credence_tasks_created_total", "Tasks created")
                .map_err(|_| MetricsError::Prom)?;
        let tasks_completed_total =
            IntCounter::new("credence_tasks_completed_total", "Tasks completed with quorum")
                .map_err(|_| MetricsError::Prom)?;
        let tasks_failed_total =
            IntCounter::new("credence_tasks_failed_total", "Tasks failed")
                .map_err(|_| MetricsError::Prom)?;
        let responses_accepted_total = IntCounter::new(
            "credence_responses_accepted_total",
            "Responses accepted into task buckets",
        )
        .map_err(|_| MetricsError::Prom)?;
        let responses_rejected_total = IntCounter::new(
            "credence_responses_rejected_total",
            "Responses rejected at ingestion",
        )
        .map_err(|_| MetricsError::Prom)?;
        let events_dropped_total = IntCounter::new(
            "credence_events_dropped_total",
            "Engine events dropped on channel overflow",
        )
        .map_err(|_| MetricsError::Prom)?;

        let operators = IntGauge::new("credence_operators", "Registered operators")
            .map_err(|_| MetricsError::Prom)?;
        let operators_healthy =
            IntGauge::new("credence_operators_healthy", "Operators currently healthy")
                .map_err(|_| MetricsError::Prom)?;
        let tasks_pending = IntGauge::new("credence_tasks_pending", "Tasks currently pending")
            .map_err(|_| MetricsError::Prom)?;

        for c in [
            &attestations_issued_total,
            &attestations_failed_total,
            &tasks_created_total,
            &tasks_completed_total,
            &tasks_failed_total,
            &responses_accepted_total,
            &responses_rejected_total,
            &events_dropped_total,
        ] {
            registry
                .register(Box::new(c.clone()))
                .map_err(|_| MetricsError::Prom)?;
        }
        for g in [&operators, &operators_healthy, &tasks_pending] {
            registry
                .register(Box::new(g.clone()))
                .map_err(|_| MetricsError::Prom)?;
        }

        Ok(Self {
            registry,
            attestations_issued_total,
            attestations_failed_total,
            tasks_created_total,
            tasks_completed_total,
            tasks_failed_total,
            responses_accepted_total,
            responses_rejected_total,
            events_dropped_total,
            operators,
            operators_healthy,
            tasks_pending,
        })
    }

    /// Render the registry in the Prometheus text format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

/// Observability router: `/metrics` and `/healthz`.
pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .route("/healthz", get(|| async { StatusCode::OK }))
        .with_state(metrics)
}

async fn serve_metrics(State(metrics): State<Arc<Metrics>>) -> (StatusCode, String) {
    (StatusCode::OK, metrics.render())
}
