//! Optional risk narration for a proposal.
//!
//! An external service may return a structured opinion about an upgrade.
//! The service is advisory only: when it is not configured, slow, or broken
//! the assessment carries a note instead of an opinion and the pipeline
//! continues.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RiskConfig;
use crate::domain::{Caution, ChangeClass, DepshiftError, Result, UpgradeProposal};

pub const NO_OPINION_NOTE: &str = "no automated risk opinion available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Review,
    Reject,
}

/// Opinion returned by a narrator. Scores are clamped on receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskOpinion {
    /// 0 (safe) to 100 (dangerous).
    #[serde(alias = "overallScore")]
    pub overall_score: f64,
    /// 0 to 1.
    pub confidence: f64,
    #[serde(default)]
    pub factors: Vec<String>,
    #[serde(default)]
    pub summary: String,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub reasoning: String,
}

impl RiskOpinion {
    pub fn clamped(mut self) -> Self {
        self.overall_score = clamp_finite(self.overall_score, 0.0, 100.0);
        self.confidence = clamp_finite(self.confidence, 0.0, 1.0);
        self
    }
}

fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub proposal_id: Uuid,
    pub package: String,
    pub from_version: String,
    pub to_version: String,
    pub change_class: ChangeClass,
    #[serde(default)]
    pub cautions: Vec<Caution>,
    #[serde(default)]
    pub opinion: Option<RiskOpinion>,
    /// Why there is no opinion.
    #[serde(default)]
    pub note: Option<String>,
}

#[async_trait]
pub trait RiskNarrator: Send + Sync {
    async fn narrate(&self, proposal: &UpgradeProposal) -> Result<RiskOpinion>;
}

/// Narrator backed by an HTTP endpoint that takes the proposal as JSON and
/// answers with a [`RiskOpinion`].
pub struct HttpRiskNarrator {
    endpoint: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl HttpRiskNarrator {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("depshift/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.trim().to_string(),
            http_client,
        })
    }

    pub fn from_config(config: &RiskConfig) -> Result<Self> {
        match (&config.endpoint, &config.api_key) {
            (Some(endpoint), Some(key)) if config.is_configured() => {
                Self::new(endpoint, key, config.timeout())
            }
            _ => Err(DepshiftError::Config(
                "risk service needs both an endpoint and an api key".to_string(),
            )),
        }
    }
}

#[async_trait]
impl RiskNarrator for HttpRiskNarrator {
    async fn narrate(&self, proposal: &UpgradeProposal) -> Result<RiskOpinion> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(proposal)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<RiskOpinion>().await?)
    }
}

/// Attaches an opinion to proposals when a narrator is available.
pub struct RiskAssessor {
    narrator: Option<Arc<dyn RiskNarrator>>,
    timeout: Duration,
}

impl RiskAssessor {
    /// HTTP narrator when `config` is complete, otherwise none.
    pub fn new(config: &RiskConfig) -> Self {
        let narrator = if config.is_configured() {
            match HttpRiskNarrator::from_config(config) {
                Ok(n) => Some(Arc::new(n) as Arc<dyn RiskNarrator>),
                Err(e) => {
                    warn!(error = %e, "risk narrator disabled");
                    None
                }
            }
        } else {
            None
        };
        Self {
            narrator,
            timeout: config.timeout(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            narrator: None,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_narrator(narrator: Arc<dyn RiskNarrator>, timeout: Duration) -> Self {
        Self {
            narrator: Some(narrator),
            timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.narrator.is_some()
    }

    pub async fn assess(&self, proposal: &UpgradeProposal) -> RiskAssessment {
        let mut assessment = RiskAssessment {
            proposal_id: proposal.id,
            package: proposal.package.clone(),
            from_version: proposal.from_version.clone(),
            to_version: proposal.to_version.clone(),
            change_class: proposal.change_class,
            cautions: proposal.cautions.clone(),
            opinion: None,
            note: None,
        };

        let Some(narrator) = &self.narrator else {
            assessment.note = Some(format!("{NO_OPINION_NOTE}: risk service not configured"));
            return assessment;
        };

        match tokio::time::timeout(self.timeout, narrator.narrate(proposal)).await {
            Ok(Ok(opinion)) => {
                let opinion = opinion.clamped();
                info!(
                    package = %proposal.package,
                    score = opinion.overall_score,
                    recommendation = ?opinion.recommendation,
                    "risk opinion received"
                );
                assessment.opinion = Some(opinion);
            }
            Ok(Err(e)) => {
                warn!(package = %proposal.package, error = %e, "risk narration failed");
                assessment.note = Some(format!("{NO_OPINION_NOTE}: {e}"));
            }
            Err(_) => {
                warn!(package = %proposal.package, "risk narration timed out");
                assessment.note = Some(format!(
                    "{NO_OPINION_NOTE}: service did not answer within {:?}",
                    self.timeout
                ));
            }
        }
        assessment
    }
}
