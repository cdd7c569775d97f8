//! Batch enrichment orchestrator.
//!
//! Drives a batch of leads strictly one after another through:
//! 1. CNPJ validation
//! 2. Registry lookup
//! 3. Web discovery + contact extraction (only without an email)
//! 4. AI email guess (only still without an email)
//! 5. Commercial scoring (skipped for inactive companies)
//!
//! Between leads a fixed pacing delay keeps third-party rate limits happy; a
//! rate-limit signal pauses the batch, a terminal auth failure aborts it.
//! Every wait is raced against the batch's cancellation token.

use crate::ai_bridge::{AiBridge, HttpAiBridge};
use crate::config::{Config, PipelineSettings};
use crate::contact_extractor::extract_contact;
use crate::credentials::{
    resolve_credentials, CredentialResolution, CredentialStore, HttpCredentialStore,
};
use crate::discovery::{WebDiscovery, WebDiscoveryResolver};
use crate::email_guesser::guess_email;
use crate::errors::{AppError, ResultExt};
use crate::lead_scorer::score_lead;
use crate::models::{
    BatchContext, BatchSummary, ContactSource, EnrichmentRecord, Lead, LeadScore, LeadStatus,
    LogLevel, LogLine, OrganizationContext,
};
use crate::normalizer::{
    digits, format_cnpj, is_inactive_status, normalize_email, normalize_phone_with,
    validate_cnpj, DEFAULT_CALLING_CODE,
};
use crate::registry::{RegistryClient, RegistryLookup};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const MSG_NOT_FOUND: &str = "Não encontrado";
pub const MSG_RATE_LIMIT: &str = "Limite atingido";
pub const MSG_INVALID_CNPJ: &str = "CNPJ inválido";
pub const MSG_AUTH_FAILURE: &str = "Falha de autenticação";
pub const MSG_GENERIC_FAILURE: &str = "Erro no processamento";

/// Receives per-lead results and progress lines from a running batch.
pub trait BatchObserver: Send {
    /// Called once per processed lead, in input order, with its final state.
    fn on_update(&mut self, lead: Lead);
    /// Human-readable progress suitable for a live terminal view.
    fn on_log(&mut self, level: LogLevel, message: String);
}

/// Adapts two closures to [`BatchObserver`].
pub struct CallbackObserver<U, L> {
    on_update: U,
    on_log: L,
}

impl<U, L> CallbackObserver<U, L>
where
    U: FnMut(Lead) + Send,
    L: FnMut(LogLevel, String) + Send,
{
    pub fn new(on_update: U, on_log: L) -> Self {
        Self { on_update, on_log }
    }
}

impl<U, L> BatchObserver for CallbackObserver<U, L>
where
    U: FnMut(Lead) + Send,
    L: FnMut(LogLevel, String) + Send,
{
    fn on_update(&mut self, lead: Lead) {
        (self.on_update)(lead)
    }

    fn on_log(&mut self, level: LogLevel, message: String) {
        (self.on_log)(level, message)
    }
}

/// Keeps everything in memory; used by the HTTP handler and tests.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    pub leads: Vec<Lead>,
    pub logs: Vec<LogLine>,
}

impl BatchObserver for CollectingObserver {
    fn on_update(&mut self, lead: Lead) {
        self.leads.push(lead);
    }

    fn on_log(&mut self, level: LogLevel, message: String) {
        self.logs.push(LogLine { level, message });
    }
}

/// Mirrors a caller-facing log line into tracing before handing it over.
fn emit(observer: &mut dyn BatchObserver, level: LogLevel, message: String) {
    match level {
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Success => tracing::info!("{}", message),
        LogLevel::Warning => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
    }
    observer.on_log(level, message);
}

/// Sleeps for `duration` unless the batch is cancelled first.
///
/// Returns `false` when cancelled.
async fn wait(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// How a lead left `process_lead` without a batch-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeadOutcome {
    Enriched,
    Inactive,
    NotFound,
    /// Rejected before any network call.
    Invalid,
}

pub struct EnrichmentOrchestrator {
    registry: Arc<dyn RegistryLookup>,
    discovery: Arc<dyn WebDiscovery>,
    bridge: Arc<dyn AiBridge>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    settings: PipelineSettings,
    calling_code: String,
}

impl EnrichmentOrchestrator {
    pub fn new(
        registry: Arc<dyn RegistryLookup>,
        discovery: Arc<dyn WebDiscovery>,
        bridge: Arc<dyn AiBridge>,
    ) -> Self {
        Self {
            registry,
            discovery,
            bridge,
            credential_store: None,
            settings: PipelineSettings::default(),
            calling_code: DEFAULT_CALLING_CODE.to_string(),
        }
    }

    /// Wires the HTTP clients described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let timeout = config.http_timeout();
        let registry = RegistryClient::new(
            config.registry_proxy_url.clone(),
            config.bridge_token.clone(),
            timeout,
        )?;
        let bridge = HttpAiBridge::new(
            config.ai_bridge_url.clone(),
            config.bridge_token.clone(),
            timeout,
        )?;
        let discovery = WebDiscoveryResolver::from_config(config)?;

        let mut orchestrator = Self::new(Arc::new(registry), Arc::new(discovery), Arc::new(bridge))
            .with_settings(config.pipeline_settings())
            .with_calling_code(config.country_calling_code.clone());

        if let Some(ref url) = config.credentials_url {
            let store = HttpCredentialStore::new(url.clone(), config.bridge_token.clone(), timeout)?;
            orchestrator = orchestrator.with_credential_store(Arc::new(store));
        }

        Ok(orchestrator)
    }

    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_calling_code(mut self, calling_code: impl Into<String>) -> Self {
        self.calling_code = calling_code.into();
        self
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    /// Resolves the organization's AI credential once for the whole batch.
    async fn resolve_context(
        &self,
        organization: Option<OrganizationContext>,
        cancel: CancellationToken,
        observer: &mut dyn BatchObserver,
    ) -> BatchContext {
        let resolution =
            resolve_credentials(organization.as_ref(), self.credential_store.as_deref()).await;

        match resolution {
            CredentialResolution::Inline(_) | CredentialResolution::Stored(_) => {
                emit(
                    observer,
                    LogLevel::Info,
                    "Usando chave de IA da organização".to_string(),
                );
            }
            CredentialResolution::Failed(ref e) => {
                tracing::warn!("Organization credential lookup failed: {}", e);
                emit(
                    observer,
                    LogLevel::Warning,
                    "Não foi possível carregar a chave de IA da organização; usando a chave padrão"
                        .to_string(),
                );
            }
            CredentialResolution::PlatformDefault => {}
        }

        BatchContext {
            organization,
            credentials: resolution.into_credentials(),
            cancel,
        }
    }

    /// Enriches `leads` in order, reporting through `observer`.
    ///
    /// Per-lead failures never escape: they end up in that lead's `failed`
    /// state. A terminal auth failure or cancellation stops the batch; leads
    /// not yet processed at that point receive no update.
    pub async fn process_batch(
        &self,
        leads: Vec<Lead>,
        observer: &mut dyn BatchObserver,
        organization: Option<OrganizationContext>,
        cancel: CancellationToken,
    ) -> BatchSummary {
        let total = leads.len();
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };

        emit(
            observer,
            LogLevel::Info,
            format!("Iniciando enriquecimento de {} lead(s)", total),
        );

        let ctx = self.resolve_context(organization, cancel, observer).await;

        for (idx, mut lead) in leads.into_iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let position = format!("[{}/{}]", idx + 1, total);
            let is_last = idx + 1 == total;

            if lead.status == LeadStatus::Enriched && lead.has_email() {
                emit(
                    observer,
                    LogLevel::Info,
                    format!("{} {} já enriquecido, ignorando", position, format_cnpj(&lead.cnpj)),
                );
                summary.skipped += 1;
                observer.on_update(lead);
                if !is_last && !self.pace(&ctx, observer).await {
                    summary.cancelled = true;
                    break;
                }
                continue;
            }

            emit(
                observer,
                LogLevel::Info,
                format!("{} Consultando CNPJ {}...", position, format_cnpj(&lead.cnpj)),
            );

            let mut backoff = false;

            let result = self.process_lead(&mut lead, &ctx, observer).await;
            match result {
                Ok(outcome) => {
                    tracing::debug!("Lead {} finished as {:?}", lead.cnpj, outcome);
                }
                Err(e) if e.is_terminal_auth() => {
                    tracing::error!("Terminal auth failure on {}: {}", lead.cnpj, e);
                    lead.mark_failed(MSG_AUTH_FAILURE);
                    summary.failed += 1;
                    summary.aborted = true;
                    observer.on_update(lead);
                    emit(
                        observer,
                        LogLevel::Error,
                        "Falha fatal de autenticação no provedor. Lote interrompido.".to_string(),
                    );
                    break;
                }
                Err(e) if e.is_rate_limited() => {
                    tracing::warn!("Rate limited on {}: {}", lead.cnpj, e);
                    lead.mark_failed(MSG_RATE_LIMIT);
                    backoff = true;
                }
                Err(e) => {
                    tracing::error!("Failed to enrich {}: {}", lead.cnpj, e);
                    lead.mark_failed(MSG_GENERIC_FAILURE);
                }
            }

            match lead.status {
                LeadStatus::Enriched => summary.enriched += 1,
                _ => summary.failed += 1,
            }
            let (level, line) = Self::result_line(&lead, &position);
            observer.on_update(lead);
            emit(observer, level, line);

            if is_last {
                break;
            }

            if backoff && !self.back_off(&ctx, observer).await {
                summary.cancelled = true;
                break;
            }
            if !self.pace(&ctx, observer).await {
                summary.cancelled = true;
                break;
            }
        }

        if summary.cancelled {
            emit(
                observer,
                LogLevel::Warning,
                "Lote cancelado pelo solicitante".to_string(),
            );
        }

        emit(
            observer,
            if summary.aborted {
                LogLevel::Error
            } else {
                LogLevel::Info
            },
            format!(
                "Concluído: {} enriquecido(s), {} falha(s), {} ignorado(s) de {}",
                summary.enriched, summary.failed, summary.skipped, summary.total
            ),
        );

        summary
    }

    fn result_line(lead: &Lead, position: &str) -> (LogLevel, String) {
        let name = lead.display_name();
        match lead.status {
            LeadStatus::Enriched => (
                LogLevel::Success,
                format!(
                    "{} ✓ {}: {} (score {})",
                    position,
                    name,
                    lead.email.as_deref().unwrap_or("sem e-mail"),
                    lead.lead_score.unwrap_or_default()
                ),
            ),
            _ => (
                LogLevel::Error,
                format!(
                    "{} ✗ {}: {}",
                    position,
                    name,
                    lead.error.as_deref().unwrap_or(MSG_GENERIC_FAILURE)
                ),
            ),
        }
    }

    /// Inter-lead pacing, reported as a per-tick countdown.
    async fn pace(&self, ctx: &BatchContext, observer: &mut dyn BatchObserver) -> bool {
        let tick = if self.settings.pacing_tick.is_zero() {
            self.settings.pacing
        } else {
            self.settings.pacing_tick
        };

        let mut left = self.settings.pacing;
        while !left.is_zero() {
            emit(
                observer,
                LogLevel::Info,
                format!("Próximo lead em {}s...", left.as_secs_f64().ceil() as u64),
            );
            let step = tick.min(left);
            if !wait(&ctx.cancel, step).await {
                return false;
            }
            left -= step;
        }
        !ctx.cancel.is_cancelled()
    }

    async fn back_off(&self, ctx: &BatchContext, observer: &mut dyn BatchObserver) -> bool {
        emit(
            observer,
            LogLevel::Warning,
            format!(
                "Limite de requisições atingido. Pausando por {}s...",
                self.settings.rate_limit_backoff.as_secs()
            ),
        );
        wait(&ctx.cancel, self.settings.rate_limit_backoff).await
    }

    fn fold_record(lead: &mut Lead, record: &EnrichmentRecord) {
        fn pick(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        lead.legal_name = pick(&record.legal_name).or(lead.legal_name.take());
        lead.trade_name = pick(&record.trade_name).or(lead.trade_name.take());
        lead.activity = pick(&record.activity_description).or(lead.activity.take());
        lead.registry_status = pick(&record.registry_status);
        lead.municipality = pick(&record.municipality).or(lead.municipality.take());
        lead.region = pick(&record.region).or(lead.region.take());
        if lead.website.is_none() {
            lead.website = pick(&record.website);
        }
    }

    fn clean_email(raw: Option<&str>) -> Option<String> {
        raw.map(normalize_email).filter(|e| !e.is_empty())
    }

    fn clean_phone(&self, raw: Option<&str>) -> Option<String> {
        raw.map(|p| normalize_phone_with(p, &self.calling_code))
            .filter(|p| !p.is_empty())
    }

    async fn process_lead(
        &self,
        lead: &mut Lead,
        ctx: &BatchContext,
        observer: &mut dyn BatchObserver,
    ) -> Result<LeadOutcome, AppError> {
        lead.status = LeadStatus::Processing;
        lead.error = None;
        lead.email_not_found = false;
        lead.lead_score = None;
        lead.score_reason = None;
        lead.source = None;

        if !validate_cnpj(&lead.cnpj) {
            lead.mark_failed(MSG_INVALID_CNPJ);
            return Ok(LeadOutcome::Invalid);
        }
        let cnpj = digits(&lead.cnpj);

        let lookup = self
            .registry
            .lookup(&cnpj)
            .await
            .with_context(|| format!("Registry lookup for {}", cnpj))
            .and_then(|record| record.ok_or_else(|| AppError::NotFound(cnpj.clone())));

        let record = match lookup {
            Ok(record) => record,
            Err(AppError::NotFound(_)) => {
                tracing::info!("No registry record for {}", cnpj);
                lead.mark_failed(MSG_NOT_FOUND);
                return Ok(LeadOutcome::NotFound);
            }
            Err(e) => return Err(e),
        };

        Self::fold_record(lead, &record);

        let mut email = Self::clean_email(record.email.as_deref());
        let mut phone = self.clean_phone(record.phone.as_deref());
        let mut source = email.as_ref().map(|_| ContactSource::Registry);

        if email.is_none() && lead.has_email() {
            email = Self::clean_email(lead.email.as_deref());
            source = lead.source;
        }
        if phone.is_none() {
            phone = self.clean_phone(lead.phone.as_deref());
        }

        let name = lead.display_name().to_string();

        if email.is_none() {
            emit(
                observer,
                LogLevel::Info,
                format!("Buscando site oficial de {}...", name),
            );
            let known_website = lead.website.clone();
            if let Some(site) = self
                .discovery
                .discover(&name, &cnpj, known_website.as_deref())
                .await
            {
                lead.social.merge(site.social);
                if let (Some(url), Some(text)) = (site.url, site.page_text) {
                    lead.website = Some(url);
                    if let Some(contact) =
                        extract_contact(self.bridge.as_ref(), ctx, &name, &text).await?
                    {
                        if let Some(found) = Self::clean_email(contact.email.as_deref()) {
                            email = Some(found);
                            source = Some(ContactSource::Website);
                        }
                        if phone.is_none() {
                            phone = self.clean_phone(contact.telefone.as_deref());
                        }
                    }
                }
            }
        }

        if email.is_none() {
            emit(
                observer,
                LogLevel::Info,
                format!("Sugerindo e-mail provável para {} via IA...", name),
            );
            if let Some(guess) = guess_email(self.bridge.as_ref(), ctx, &name, &cnpj).await? {
                email = Self::clean_email(Some(&guess));
                source = email.as_ref().map(|_| ContactSource::AiGuess);
            }
        }

        lead.email = email;
        lead.phone = phone;
        lead.source = source;
        lead.email_not_found = !lead.has_email();

        let registry_status = lead.registry_status.clone().unwrap_or_default();
        let inactive = is_inactive_status(&registry_status);

        if inactive {
            lead.lead_score = Some(0);
            lead.score_reason = None;
            lead.status = LeadStatus::Failed;
            lead.error = Some(format!("Empresa {}", registry_status.trim()));
            lead.captured_at = Some(Utc::now());
            return Ok(LeadOutcome::Inactive);
        }

        let score = match score_lead(self.bridge.as_ref(), ctx, lead).await {
            Ok(score) => score,
            Err(failure) if failure.0.is_batch_level() => return Err(failure.0),
            Err(failure) => {
                tracing::warn!("{}; using neutral score for {}", failure, cnpj);
                LeadScore::neutral()
            }
        };

        lead.lead_score = Some(score.score);
        lead.score_reason = Some(score.reason).filter(|r| !r.is_empty());
        lead.status = LeadStatus::Enriched;
        lead.error = None;
        lead.captured_at = Some(Utc::now());

        Ok(LeadOutcome::Enriched)
    }
}
