use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

// ============ Lead ============

/// Lifecycle of a lead inside a single batch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    Pending,
    Processing,
    Enriched,
    Failed,
}

/// Where the lead's email came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    Registry,
    Website,
    AiGuess,
}

/// Social profile URLs spotted while searching for the company website.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialHandles {
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub linkedin: Option<String>,
}

impl SocialHandles {
    pub fn is_empty(&self) -> bool {
        self.instagram.is_none() && self.facebook.is_none() && self.linkedin.is_none()
    }

    /// Fills missing handles from `other`, never overwriting known ones.
    pub fn merge(&mut self, other: SocialHandles) {
        if self.instagram.is_none() {
            self.instagram = other.instagram;
        }
        if self.facebook.is_none() {
            self.facebook = other.facebook;
        }
        if self.linkedin.is_none() {
            self.linkedin = other.linkedin;
        }
    }
}

/// The unit of work and result of a batch.
///
/// Created by the caller as `pending`; only the orchestrator mutates it, and
/// only during a single pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    /// Caller-side key, echoed back untouched.
    #[serde(default)]
    pub id: Option<String>,
    /// 14-digit CNPJ (formatting characters tolerated on input).
    pub cnpj: String,
    #[serde(default)]
    pub legal_name: Option<String>,
    #[serde(default)]
    pub trade_name: Option<String>,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub registry_status: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub social: SocialHandles,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub email_not_found: bool,
    #[serde(default)]
    pub lead_score: Option<u8>,
    #[serde(default)]
    pub score_reason: Option<String>,
    #[serde(default)]
    pub source: Option<ContactSource>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl Lead {
    pub fn new(cnpj: impl Into<String>) -> Self {
        Self {
            cnpj: cnpj.into(),
            ..Default::default()
        }
    }

    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    /// Best name available for searching and prompts.
    pub fn display_name(&self) -> &str {
        self.legal_name
            .as_deref()
            .or(self.trade_name.as_deref())
            .unwrap_or(&self.cnpj)
    }

    pub(crate) fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = LeadStatus::Failed;
        self.error = Some(error.into());
        self.captured_at = Some(Utc::now());
    }
}

// ============ Registry ============

/// Structured result of a single registry lookup. Folded into a `Lead`, never
/// stored on its own.
///
/// Accepts the Portuguese field names used by public CNPJ registries as well as
/// English aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    #[serde(alias = "razao_social", alias = "legalName")]
    pub legal_name: Option<String>,
    #[serde(alias = "nome_fantasia", alias = "tradeName")]
    pub trade_name: Option<String>,
    #[serde(alias = "cnae_fiscal_descricao", alias = "activity")]
    pub activity_description: Option<String>,
    #[serde(
        alias = "descricao_situacao_cadastral",
        alias = "situacao",
        alias = "registryStatus"
    )]
    pub registry_status: Option<String>,
    #[serde(alias = "municipio")]
    pub municipality: Option<String>,
    #[serde(alias = "uf")]
    pub region: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "ddd_telefone_1", alias = "telefone")]
    pub phone: Option<String>,
    #[serde(alias = "site")]
    pub website: Option<String>,
}

// ============ Organization / BYOK ============

/// Caller-supplied provider credential. The key never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    pub provider: String,
    pub api_key: String,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Optional organization context owned by the caller; biases scoring and may
/// carry bring-your-own-key credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationContext {
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub niche: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub credentials: Option<ProviderCredentials>,
}

/// Everything resolved once at batch start and threaded through every
/// delegate call. Read-only for the lifetime of the batch.
#[derive(Debug, Clone, Default)]
pub struct BatchContext {
    pub organization: Option<OrganizationContext>,
    pub credentials: Option<ProviderCredentials>,
    pub cancel: CancellationToken,
}

impl BatchContext {
    pub fn credentials(&self) -> Option<&ProviderCredentials> {
        self.credentials.as_ref()
    }
}

// ============ Progress ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub enriched: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Stopped by a terminal auth failure.
    pub aborted: bool,
    /// Stopped by the caller's cancellation token.
    pub cancelled: bool,
}

// ============ Discovery / AI delegate values ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Official website candidate and its textual content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredSite {
    pub url: Option<String>,
    pub page_text: Option<String>,
    pub social: SocialHandles,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContact {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "phone")]
    pub telefone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadScore {
    pub score: u8,
    #[serde(default)]
    pub reason: String,
}

impl LeadScore {
    pub const NEUTRAL: u8 = 5;

    /// Substituted whenever the scorer fails.
    pub fn neutral() -> Self {
        Self {
            score: Self::NEUTRAL,
            reason: "Pontuação padrão (falha na análise)".to_string(),
        }
    }
}
