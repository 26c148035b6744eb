// src/services/scheduler.rs

use std::{sync::Arc, time::Duration};

use clap::ValueEnum;
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::store::ContactStore,
    services::{
        mailchimp_push::{MailchimpPushService, PushReport},
        pabau_sync::{PabauSyncReport, PabauSyncService},
        unsubscribe_sync::{UnsubscribeReport, UnsubscribeSyncService},
    },
};

/// Quais passos de um ciclo rodar
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncStep {
    All,
    Pabau,
    Unsubscribes,
    Push,
}

impl SyncStep {
    fn includes(&self, other: SyncStep) -> bool {
        *self == SyncStep::All || *self == other
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub pabau: Option<PabauSyncReport>,
    pub unsubscribes: Option<UnsubscribeReport>,
    pub push: Option<PushReport>,
    pub failed_steps: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Outro ciclo segura o lock
    Skipped,
}

/// Executa o ciclo Pabau -> unsubscribes -> push sob o lock do ciclo.
pub struct SyncRunner {
    store: Arc<dyn ContactStore>,
    pabau: PabauSyncService,
    unsubscribes: UnsubscribeSyncService,
    push: MailchimpPushService,
}

impl SyncRunner {
    pub fn new(
        store: Arc<dyn ContactStore>,
        pabau: PabauSyncService,
        unsubscribes: UnsubscribeSyncService,
        push: MailchimpPushService,
    ) -> Self {
        Self {
            store,
            pabau,
            unsubscribes,
            push,
        }
    }

    pub async fn run_cycle(&self, step: SyncStep) -> Result<CycleOutcome, AppError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_cycle", %run_id, ?step);

        async move {
            if !self.store.try_lock_cycle().await? {
                warn!("⏭️ Outro ciclo de sync está rodando, pulando este");
                return Ok(CycleOutcome::Skipped);
            }

            let started = std::time::Instant::now();
            info!("🔄 Ciclo de sync iniciado");
            let report = self.run_steps(run_id, step).await;

            // O lock sai mesmo se algum passo falhou
            self.store.unlock_cycle().await?;

            info!(
                "✅ Ciclo de sync concluído em {:.1}s ({} passos com falha)",
                started.elapsed().as_secs_f64(),
                report.failed_steps.len()
            );
            Ok(CycleOutcome::Completed(report))
        }
        .instrument(span)
        .await
    }

    // Cada passo é independente: uma falha é registrada e o próximo roda.
    async fn run_steps(&self, run_id: Uuid, step: SyncStep) -> CycleReport {
        let mut report = CycleReport {
            run_id,
            ..Default::default()
        };

        if step.includes(SyncStep::Pabau) {
            info!("Passo 1/3: Pabau -> banco");
            match self.pabau.run().await {
                Ok(r) => report.pabau = Some(r),
                Err(e) => {
                    error!("❌ Falha no sync do Pabau: {}", e);
                    report.failed_steps.push("pabau");
                }
            }
        }

        if step.includes(SyncStep::Unsubscribes) {
            info!("Passo 2/3: descadastros do Mailchimp -> banco");
            match self.unsubscribes.run().await {
                Ok(r) => report.unsubscribes = Some(r),
                Err(e) => {
                    error!("❌ Falha no sync de descadastros do Mailchimp: {}", e);
                    report.failed_steps.push("unsubscribes");
                }
            }
        }

        if step.includes(SyncStep::Push) {
            info!("Passo 3/3: banco -> Mailchimp");
            match self.push.run().await {
                Ok(r) => report.push = Some(r),
                Err(e) => {
                    error!("❌ Falha no envio para o Mailchimp: {}", e);
                    report.failed_steps.push("push");
                }
            }
        }

        report
    }

    /// Um ciclo agendado em task própria. Um pânico num passo é registrado,
    /// o lock é devolvido e o scheduler segue para o próximo tick.
    /// `None` quando o ciclo morreu.
    pub async fn run_scheduled_cycle(self: Arc<Self>) -> Option<CycleOutcome> {
        let runner = Arc::clone(&self);
        let cycle = tokio::spawn(async move { runner.run_cycle(SyncStep::All).await });

        match cycle.await {
            Ok(Ok(CycleOutcome::Completed(report))) => {
                info!(run_id = %report.run_id, "Sync agendado concluído: {:?}", report.failed_steps);
                Some(CycleOutcome::Completed(report))
            }
            Ok(Ok(CycleOutcome::Skipped)) => Some(CycleOutcome::Skipped),
            Ok(Err(e)) => {
                error!("🔥 Falha no ciclo de sync agendado: {}", e);
                None
            }
            Err(e) => {
                error!("🔥 Ciclo de sync agendado abortou: {}", e);
                // O lock ficou com o ciclo que morreu
                if let Err(e) = self.store.unlock_cycle().await {
                    error!("🔥 Falha ao liberar o lock do ciclo: {}", e);
                }
                None
            }
        }
    }

    /// Roda o ciclo completo a cada `every`. Ticks perdidos enquanto um ciclo
    /// longo roda são descartados, não acumulados.
    pub fn spawn(self: Arc<Self>, every: Duration, run_immediately: bool) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // O primeiro tick do interval é imediato
            if !run_immediately {
                ticker.tick().await;
                info!(
                    "Sync inicial desativado, próximo em {} minutos",
                    every.as_secs() / 60
                );
            }

            loop {
                ticker.tick().await;
                Arc::clone(&self).run_scheduled_cycle().await;
            }
        })
    }
}
