use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============ Scoring Input Models ============

/// A workshop lead as captured by the intake flow (chat widget or form).
///
/// All fields except the tenant id are optional: partial leads are scored
/// with degraded sub-scores rather than rejected. The scorer never mutates
/// a lead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lead {
    /// Lead id in the source system, if already persisted.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Tenant (workshop) identifier. Required for a non-degraded score.
    #[serde(default)]
    pub kunde_id: Option<String>,
    /// Free-text description of the customer's request.
    #[serde(default)]
    pub anliegen: Option<String>,
    /// Vehicle description, e.g. "BMW 320d Baujahr 2018".
    #[serde(default)]
    pub fahrzeug: Option<String>,
    /// Customer name.
    #[serde(default)]
    pub name: Option<String>,
    /// Customer phone number.
    #[serde(default)]
    pub telefon: Option<String>,
    /// Customer email address.
    #[serde(default)]
    pub email: Option<String>,
    /// When the lead was created.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The customer.
    User,
    /// The bot.
    Assistant,
    /// Anything else (system notices etc.); ignored by the scorer.
    #[serde(other)]
    Other,
}

/// One message of the chat transcript attached to a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: ChatRole,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// When the message was sent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Convenience constructor used in tests and the backfill binary.
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }
}

/// Tenant-level business parameters used for value estimation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerContext {
    /// Average job value of the workshop in whole euros.
    #[serde(default)]
    pub average_job_value: Option<f64>,
}

/// Fallback job value when no customer context is available.
pub const DEFAULT_JOB_VALUE: f64 = 300.0;

impl CustomerContext {
    /// The monetary baseline for value estimation.
    pub fn base_value(&self) -> f64 {
        self.average_job_value.unwrap_or(DEFAULT_JOB_VALUE)
    }
}

// ============ Scoring Output Models ============

/// The five independently computed sub-scores, each clamped to [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub urgency: i32,
    pub engagement: i32,
    pub intent: i32,
    pub demographics: i32,
    pub behavior: i32,
}

impl ScoreBreakdown {
    /// Breakdown of the degraded default score.
    pub fn neutral() -> Self {
        Self {
            urgency: 50,
            engagement: 50,
            intent: 50,
            demographics: 50,
            behavior: 50,
        }
    }
}

/// Lead temperature derived from the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Hot,
    Warm,
    Cold,
    #[serde(rename = "Very Cold")]
    VeryCold,
}

impl Classification {
    /// Map a total score to its tier. Thresholds are 80/60/40,
    /// non-overlapping, highest first.
    pub fn from_total(total: i32) -> Self {
        match total {
            t if t >= 80 => Classification::Hot,
            t if t >= 60 => Classification::Warm,
            t if t >= 40 => Classification::Cold,
            _ => Classification::VeryCold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Hot => "Hot",
            Classification::Warm => "Warm",
            Classification::Cold => "Cold",
            Classification::VeryCold => "Very Cold",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How fast the workshop must act on a lead.
///
/// Derived from urgency/intent/engagement only — demographics and behavior
/// say how good a lead is, not how fast to respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Map the priority score (0.4·urgency + 0.3·intent + 0.3·engagement)
    /// to a tier.
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            Priority::High
        } else if score >= 50.0 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One actionable recommendation produced by an independent rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Rule identifier, e.g. "immediate_contact" or "contact_collection".
    #[serde(rename = "type")]
    pub rec_type: String,
    /// Human-readable instruction for the workshop.
    pub message: String,
    /// How urgent the recommendation itself is.
    pub priority: Priority,
}

/// The complete scoring result for one (lead, transcript) pair.
///
/// Created fresh on every call and persisted downstream as an immutable
/// historical record — a rescore inserts a new row, never updates one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    /// Weighted total in [0, 100].
    pub total: i32,
    /// The five sub-scores.
    pub breakdown: ScoreBreakdown,
    /// Temperature tier.
    pub classification: Classification,
    /// Response-speed tier.
    pub priority: Priority,
    /// Estimated job value in whole euros.
    pub estimated_value: i64,
    /// Actionable next steps; zero or more rules may fire.
    pub recommendations: Vec<Recommendation>,
    /// Plain-text follow-up suggestions.
    pub follow_up_suggestions: Vec<String>,
    /// True when this is the fallback default after an internal failure.
    /// The payload shape is identical either way.
    pub degraded: bool,
}

impl LeadScore {
    /// The fixed fallback returned when scoring fails internally.
    ///
    /// Callers always receive a well-formed result; the `degraded` flag is
    /// the only way to tell this apart from a computed score.
    pub fn degraded_default() -> Self {
        Self {
            total: 50,
            breakdown: ScoreBreakdown::neutral(),
            classification: Classification::Cold,
            priority: Priority::Medium,
            estimated_value: DEFAULT_JOB_VALUE as i64,
            recommendations: Vec::new(),
            follow_up_suggestions: vec!["Lead manuell prüfen und Kontakt aufnehmen".to_string()],
            degraded: true,
        }
    }
}

// ============ Persistence Models ============

/// One historical score row as stored in `lead_scores`.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRecord {
    /// Row id.
    pub id: Uuid,
    /// Lead the score belongs to.
    pub lead_id: Uuid,
    /// Tenant id.
    pub kunde_id: String,
    /// Total score at scoring time.
    pub total_score: i32,
    /// Breakdown as stored (JSONB).
    pub score_breakdown: serde_json::Value,
    /// Classification label.
    pub classification: String,
    /// Priority label.
    pub priority: String,
    /// Estimated value in whole euros.
    pub estimated_value: i64,
    /// Recommendations as stored (JSONB).
    pub recommendations: serde_json::Value,
    /// Whether this row was a degraded fallback.
    pub degraded: bool,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
}

/// Outcome of the fire-and-forget persistence step.
///
/// Scoring never fails because of storage; callers get the outcome as data
/// so a failed write is observable without being raised.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistOutcome {
    /// Row inserted.
    Stored { score_id: Uuid },
    /// Insert failed; error already logged.
    Failed { reason: String },
    /// Nothing to persist (e.g. the lead has no id yet).
    Skipped,
}

// ============ API Request/Response Models ============

/// Request payload for POST /api/v1/leads/score.
#[derive(Debug, Deserialize)]
pub struct ScoreLeadRequest {
    /// The lead to score. Optional so malformed callers still get the
    /// degraded default instead of a 422.
    #[serde(default)]
    pub lead: Option<Lead>,
    /// Ordered chat transcript, oldest first.
    #[serde(default)]
    pub chat_history: Option<Vec<ChatMessage>>,
    /// Tenant business parameters; fetched from the DB when absent.
    #[serde(default)]
    pub customer_context: Option<CustomerContext>,
}

/// Response payload for single-lead scoring.
#[derive(Debug, Serialize)]
pub struct ScoreLeadResponse {
    /// The computed (or degraded default) score.
    pub score: LeadScore,
    /// What happened to the persistence write.
    pub persistence: PersistOutcome,
}

/// Request payload for POST /api/v1/leads/score/batch.
#[derive(Debug, Deserialize)]
pub struct BatchScoreRequest {
    /// Leads to score, each with its own transcript.
    pub leads: Vec<BatchScoreItem>,
    /// Maximum number of leads to process (default 100).
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One lead plus its transcript inside a batch request.
#[derive(Debug, Deserialize)]
pub struct BatchScoreItem {
    #[serde(default)]
    pub lead: Option<Lead>,
    #[serde(default)]
    pub chat_history: Option<Vec<ChatMessage>>,
}

/// Response payload for batch scoring.
#[derive(Debug, Serialize)]
pub struct BatchScoreResponse {
    /// Number of leads received.
    pub received: usize,
    /// Number of leads processed (capped by the limit).
    pub processed: usize,
    /// Per-lead results in input order.
    pub results: Vec<BatchScoreResult>,
}

/// One entry of a batch response.
#[derive(Debug, Serialize)]
pub struct BatchScoreResult {
    /// Lead id, when the input had one.
    pub lead_id: Option<Uuid>,
    pub score: LeadScore,
    pub persistence: PersistOutcome,
}

/// Response payload for GET /api/v1/leads/:id/scores.
#[derive(Debug, Serialize)]
pub struct ScoreHistoryResponse {
    pub lead_id: Uuid,
    pub scores: Vec<ScoreRecord>,
}
