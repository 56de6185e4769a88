//! Theme analysis through an external zero-shot text classifier.
//!
//! Each contribution is classified on its own against a fixed label set;
//! results are then grouped by top label. Classifier failures never abort the
//! analysis: the affected note falls back to [`FALLBACK_THEME`].

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use configs::ClassifierConfig;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::records::Contribution;
use crate::errors::ServiceError;

pub const FALLBACK_THEME: &str = "non classé";

/// Themes the classifier chooses from (dreams, needs and worries).
pub const CANDIDATE_LABELS: [&str; 22] = [
    "environnement",
    "climat",
    "pollution",
    "énergie",
    "santé",
    "éducation",
    "avenir",
    "travail",
    "emploi",
    "famille",
    "logement",
    "sécurité",
    "violence",
    "technologie",
    "économie",
    "argent",
    "social",
    "relations",
    "justice",
    "liberté",
    "paix",
    "politique",
];

/// Top label for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub score: f64,
}

impl Classification {
    pub fn fallback() -> Self {
        Self { label: FALLBACK_THEME.to_string(), score: 0.0 }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<Classification, ServiceError>;
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a str,
    parameters: ClassifyParameters<'a>,
}

#[derive(Serialize)]
struct ClassifyParameters<'a> {
    candidate_labels: &'a [&'a str],
    multi_label: bool,
}

/// Ranked labels, best first.
#[derive(Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    scores: Vec<f64>,
}

/// Hosted inference endpoint speaking the zero-shot classification protocol.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpClassifier {
    pub fn new(cfg: &ClassifierConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Classifier(e.to_string()))?;
        Ok(Self { client, endpoint: cfg.endpoint.clone(), api_token: cfg.api_token.clone() })
    }

    /// The hosted model loads lazily; a throwaway request warms it up.
    pub async fn warmup(&self) {
        if let Err(e) = self.classify("test", &["test"]).await {
            debug!(error = %e, "classifier warmup failed");
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<Classification, ServiceError> {
        let body = ClassifyRequest {
            inputs: text,
            parameters: ClassifyParameters { candidate_labels: labels, multi_label: false },
        };
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| ServiceError::Classifier(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ServiceError::Classifier(format!("classifier returned {}", resp.status())));
        }
        let ranked: ClassifyResponse =
            resp.json().await.map_err(|e| ServiceError::Classifier(e.to_string()))?;
        Ok(Classification {
            label: ranked.labels.into_iter().next().unwrap_or_else(|| FALLBACK_THEME.to_string()),
            score: ranked.scores.first().copied().unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThemeGroup {
    pub name: String,
    pub contributions: Vec<Contribution>,
    pub count: usize,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThemeAnalysis {
    /// Largest group first.
    pub themes: Vec<ThemeGroup>,
    /// Input notes with `ai_theme` / `ai_score` filled in.
    pub contributions_with_themes: Vec<Contribution>,
    pub total_analyzed: usize,
}

/// Classify every contribution concurrently and group them by theme.
pub async fn analyze_themes(
    classifier: &dyn Classifier,
    contributions: &[Contribution],
) -> Result<ThemeAnalysis, ServiceError> {
    if contributions.is_empty() {
        return Err(ServiceError::Validation("no contributions to analyze".into()));
    }

    let results = join_all(contributions.iter().map(|c| async move {
        match classifier.classify(&c.text, &CANDIDATE_LABELS).await {
            Ok(class) => class,
            Err(e) => {
                warn!(contribution = c.id, error = %e, "classification failed, using fallback theme");
                Classification::fallback()
            }
        }
    }))
    .await;

    let contributions_with_themes: Vec<Contribution> = contributions
        .iter()
        .zip(results)
        .map(|(c, class)| Contribution {
            ai_theme: Some(class.label),
            ai_score: Some(class.score),
            ..c.clone()
        })
        .collect();

    Ok(ThemeAnalysis {
        themes: group_by_theme(&contributions_with_themes),
        total_analyzed: contributions.len(),
        contributions_with_themes,
    })
}

/// Group annotated notes by `ai_theme`; ties keep first-seen order.
pub fn group_by_theme(contributions: &[Contribution]) -> Vec<ThemeGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Contribution>> = HashMap::new();
    for c in contributions {
        let theme = c.ai_theme.clone().unwrap_or_else(|| FALLBACK_THEME.to_string());
        if !groups.contains_key(&theme) {
            order.push(theme.clone());
        }
        groups.entry(theme).or_default().push(c.clone());
    }

    let mut themes: Vec<ThemeGroup> = order
        .into_iter()
        .filter_map(|name| {
            let members = groups.remove(&name)?;
            let count = members.len();
            let total: f64 = members.iter().map(|c| c.ai_score.unwrap_or(0.0)).sum();
            Some(ThemeGroup { name, avg_score: total / count as f64, count, contributions: members })
        })
        .collect();
    themes.sort_by(|a, b| b.count.cmp(&a.count));
    themes
}

#[cfg(test)]
mod tests {
    use super::*;

    struct KeywordClassifier;

    #[async_trait]
    impl Classifier for KeywordClassifier {
        async fn classify(&self, text: &str, labels: &[&str]) -> Result<Classification, ServiceError> {
            assert_eq!(labels.len(), CANDIDATE_LABELS.len());
            if text.contains("vélo") || text.contains("arbres") {
                Ok(Classification { label: "environnement".into(), score: 0.9 })
            } else if text.contains("école") {
                Ok(Classification { label: "éducation".into(), score: 0.6 })
            } else {
                Err(ServiceError::Classifier("HTTP 503".into()))
            }
        }
    }

    fn note(id: u64, text: &str) -> Contribution {
        Contribution {
            id,
            text: text.into(),
            color: "#FFE5B4".into(),
            x: 10.0,
            y: 10.0,
            rotation: 0.0,
            category: None,
            ai_theme: None,
            ai_score: None,
        }
    }

    #[tokio::test]
    async fn groups_by_top_label_largest_first() -> Result<(), ServiceError> {
        let notes = vec![
            note(1, "une école ouverte"),
            note(2, "plus de vélo"),
            note(3, "des arbres en ville"),
            note(4, "???"),
        ];
        let analysis = analyze_themes(&KeywordClassifier, &notes).await?;

        assert_eq!(analysis.total_analyzed, 4);
        assert_eq!(analysis.themes[0].name, "environnement");
        assert_eq!(analysis.themes[0].count, 2);
        assert!((analysis.themes[0].avg_score - 0.9).abs() < 1e-9);
        // ties keep first-seen order
        assert_eq!(analysis.themes[1].name, "éducation");
        assert_eq!(analysis.themes[2].name, FALLBACK_THEME);
        assert_eq!(analysis.themes[2].avg_score, 0.0);

        let failed = &analysis.contributions_with_themes[3];
        assert_eq!(failed.ai_theme.as_deref(), Some(FALLBACK_THEME));
        assert_eq!(failed.ai_score, Some(0.0));
        Ok(())
    }

    #[tokio::test]
    async fn empty_board_is_rejected_without_calls() {
        let res = analyze_themes(&KeywordClassifier, &[]).await;
        assert!(matches!(res, Err(ServiceError::Validation(_))));
    }
}
