/// Shared scoring logic for both webhook and HTTP handlers
///
/// This module provides reusable functions for the scoring workflow:
/// 1. Compute the five sub-scores (urgency, engagement, intent,
///    demographics, behavior) from lead, transcript, and customer context
/// 2. Aggregate into total, classification, priority, value estimate,
///    recommendations and follow-up suggestions
/// 3. Persist the score as an immutable history row
/// 4. Alert the workshop on hot leads
///
/// Scoring never fails: every entry point returns a well-formed result,
/// falling back to a degraded default on malformed input.
use crate::cache_validator::ValidatedCacheEntry;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{
    BatchScoreItem, BatchScoreResponse, BatchScoreResult, ChatMessage, ChatRole, Classification,
    CustomerContext, Lead, LeadScore, PersistOutcome, Priority, Recommendation, ScoreBreakdown,
};
use crate::score_storage::ScoreStorage;
use crate::signals::{
    contains_any, count_occurrences, is_complex_message, matching_keywords,
    mentions_vehicle_details, COST_KEYWORDS, HIGH_VALUE_KEYWORDS, POLITENESS_KEYWORDS,
    PURCHASE_INTENT_KEYWORDS, SERVICE_INTENT_KEYWORDS, TECHNICAL_KEYWORDS,
    TIME_PRESSURE_KEYWORDS, URGENCY_KEYWORDS,
};
use chrono::{DateTime, Utc};
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::Arc;

/// Default cap for batch scoring runs.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

/// Batch scoring pauses after this many leads to avoid overwhelming
/// downstream storage.
const BATCH_PAUSE_EVERY: usize = 10;
const BATCH_PAUSE_MS: u64 = 100;

/// Free-mail providers whose domains do not count as business domains.
const FREE_MAIL_PROVIDERS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "yahoo.de",
    "hotmail.com",
    "hotmail.de",
    "outlook.com",
    "outlook.de",
    "web.de",
    "gmx.de",
    "gmx.net",
    "gmx.at",
    "t-online.de",
    "icloud.com",
    "aol.com",
    "freenet.de",
];

/// Validate email address
///
/// Checks for:
/// - Basic email format (contains @ and .)
/// - Fake/placeholder patterns (repeated digits like 9999, 1111)
/// - Minimum length requirements
/// - Valid domain structure
pub fn is_valid_email(email: &str) -> bool {
    // Basic checks
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    // Detect fake patterns (repeated digits)
    let fake_patterns = [
        "999999",    // Common fake: 0159999999@gmail.com
        "111111",    // Common fake: 1111111111@
        "000000",    // Common fake: 000000@
        "123456789", // Sequential fake
    ];

    for pattern in &fake_patterns {
        if email.contains(pattern) {
            tracing::warn!("Invalid email detected (fake pattern '{}'): {}", pattern, email);
            return false;
        }
    }

    // RFC 5322 simplified email regex
    // Matches: local@domain.tld
    let email_regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    if !email_regex.is_match(email) {
        tracing::warn!("Invalid email format: {}", email);
        return false;
    }

    true
}

/// True if the email has a valid shape and its domain is not a known
/// free-mail provider. A business address is a weak seriousness signal,
/// nothing more.
pub fn is_business_email(email: &str) -> bool {
    if !is_valid_email(email) {
        return false;
    }
    let domain = email.split('@').nth(1).unwrap_or("").to_lowercase();
    !FREE_MAIL_PROVIDERS.contains(&domain.as_str())
}

/// Validate and normalize German phone number
///
/// Uses phonenumber library (port of Google's libphonenumber) to:
/// - Parse phone number with German region (DE)
/// - Validate if it's a valid German mobile or landline number
/// - Return normalized E.164 format (+4915112345678)
///
/// Returns: (is_valid, normalized_phone_or_error_msg)
pub fn validate_de_phone(raw: &str) -> (bool, String) {
    // Skip empty or very short strings
    if raw.trim().is_empty() || raw.len() < 6 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(CountryId::DE), raw) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("Valid DE phone: {} -> {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::debug!("Invalid DE phone number: {}", raw);
                (false, "Invalid German phone number".to_string())
            }
        }
        Err(e) => {
            tracing::debug!("Failed to parse DE phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}

fn user_messages(history: &[ChatMessage]) -> impl Iterator<Item = &ChatMessage> {
    history.iter().filter(|m| m.role == ChatRole::User)
}

fn field_present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Freshness bonus: a lead that just arrived needs the fastest reaction.
fn recency_bonus(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i32 {
    let Some(created) = created_at else {
        return 0;
    };
    // Clock skew can put created_at slightly in the future; treat as brand new.
    let age_hours = ((now - created).num_seconds().max(0) as f64) / 3600.0;
    if age_hours < 1.0 {
        20
    } else if age_hours < 6.0 {
        15
    } else if age_hours < 24.0 {
        10
    } else if age_hours < 72.0 {
        5
    } else {
        0
    }
}

/// Urgency: explicit distress language plus lead freshness.
pub fn urgency_score(lead: &Lead, history: &[ChatMessage], now: DateTime<Utc>) -> i32 {
    let mut score = 50i32;

    let anliegen = lead.anliegen.as_deref().unwrap_or("").to_lowercase();
    score += 15 * matching_keywords(&anliegen, URGENCY_KEYWORDS).len() as i32;
    score += 10 * matching_keywords(&anliegen, TIME_PRESSURE_KEYWORDS).len() as i32;

    for msg in user_messages(history) {
        if contains_any(&msg.content.to_lowercase(), URGENCY_KEYWORDS) {
            score += 8;
        }
    }

    score += recency_bonus(lead.created_at, now);
    score.clamp(0, 100)
}

/// Average assistant→user reply delay, in minutes, over consecutive pairs
/// with timestamps on both sides. No timed pairs means no bonus.
fn response_latency_bonus(history: &[ChatMessage]) -> i32 {
    let mut deltas = Vec::new();
    for pair in history.windows(2) {
        if pair[0].role == ChatRole::Assistant && pair[1].role == ChatRole::User {
            if let (Some(asked), Some(replied)) = (pair[0].timestamp, pair[1].timestamp) {
                let minutes = (replied - asked).num_seconds() as f64 / 60.0;
                if minutes >= 0.0 {
                    deltas.push(minutes);
                }
            }
        }
    }

    if deltas.is_empty() {
        return 0;
    }
    let avg = deltas.iter().sum::<f64>() / deltas.len() as f64;
    if avg < 2.0 {
        15
    } else if avg < 5.0 {
        10
    } else if avg < 15.0 {
        5
    } else {
        0
    }
}

/// Engagement: depth and speed of the conversation.
pub fn engagement_score(history: &[ChatMessage]) -> i32 {
    let mut score = 30i32;

    let user_msgs: Vec<&ChatMessage> = user_messages(history).collect();
    let count = user_msgs.len();
    score += if count >= 10 {
        30
    } else if count >= 5 {
        20
    } else if count >= 3 {
        15
    } else if count >= 2 {
        10
    } else {
        0
    };

    if count > 0 {
        let total_chars: usize = user_msgs.iter().map(|m| m.content.chars().count()).sum();
        let avg_len = total_chars as f64 / count as f64;
        score += if avg_len > 100.0 {
            15
        } else if avg_len > 50.0 {
            10
        } else if avg_len > 20.0 {
            5
        } else {
            0
        };
    }

    for msg in &user_msgs {
        if is_complex_message(&msg.content.to_lowercase()) {
            score += 8;
        }
    }

    score += response_latency_bonus(history);
    score.clamp(0, 100)
}

/// Intent: transactional language and willingness to share detail.
pub fn intent_score(lead: &Lead, history: &[ChatMessage]) -> i32 {
    let mut score = 40i32;

    let anliegen = lead.anliegen.as_deref().unwrap_or("").to_lowercase();
    score += 20 * matching_keywords(&anliegen, PURCHASE_INTENT_KEYWORDS).len() as i32;
    score += 15 * matching_keywords(&anliegen, SERVICE_INTENT_KEYWORDS).len() as i32;
    score += 25 * matching_keywords(&anliegen, HIGH_VALUE_KEYWORDS).len() as i32;

    // Transcript-wide scan: every purchase-intent occurrence counts, not
    // just presence.
    let transcript = history
        .iter()
        .map(|m| m.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    score += 12 * count_occurrences(&transcript, PURCHASE_INTENT_KEYWORDS) as i32;
    if contains_any(&transcript, COST_KEYWORDS) {
        score += 20;
    }

    if lead
        .fahrzeug
        .as_deref()
        .is_some_and(|f| f.chars().count() > 5)
    {
        score += 15;
    }
    if field_present(&lead.telefon) && field_present(&lead.name) {
        score += 15;
    }

    score.clamp(0, 100)
}

/// Demographics: completeness and formality of contact data. An
/// intentionally weak, proxy-based signal.
pub fn demographics_score(lead: &Lead) -> i32 {
    let mut score = 50i32;

    if let Some(email) = lead.email.as_deref().filter(|e| !e.trim().is_empty()) {
        score += if is_business_email(email) { 20 } else { 10 };
    }

    if let Some(phone) = lead.telefon.as_deref().filter(|p| !p.trim().is_empty()) {
        let (valid, _) = validate_de_phone(phone);
        score += if valid { 15 } else { 10 };
    }

    if let Some(name) = lead.name.as_deref().filter(|n| !n.trim().is_empty()) {
        let parts = name.split_whitespace().count();
        if parts >= 2 {
            score += 10;
        }
        if parts >= 3 {
            score += 5;
        }
    }

    if lead
        .anliegen
        .as_deref()
        .is_some_and(|a| a.chars().count() > 50)
    {
        score += 15;
    }

    score.clamp(0, 100)
}

/// Behavior: communication style and technical specificity.
pub fn behavior_score(history: &[ChatMessage]) -> i32 {
    let mut score = 40i32;
    let mut vehicle_details = false;

    for msg in user_messages(history) {
        let text = msg.content.to_lowercase();
        if contains_any(&text, POLITENESS_KEYWORDS) {
            score += 8;
        }
        if contains_any(&text, TECHNICAL_KEYWORDS) {
            score += 10;
        }
        if !vehicle_details && mentions_vehicle_details(&text) {
            vehicle_details = true;
        }
        if text.contains('?') {
            score += 5;
        }
    }

    if vehicle_details {
        score += 20;
    }
    score.clamp(0, 100)
}

/// Aggregation weights: urgency, engagement, intent, demographics,
/// behavior. They sum to 1.0, which keeps the total in [0, 100].
pub const SCORE_WEIGHTS: [f64; 5] = [0.25, 0.20, 0.25, 0.15, 0.15];

/// Weighted total over the five sub-scores.
pub fn total_score(breakdown: &ScoreBreakdown) -> i32 {
    (SCORE_WEIGHTS[0] * breakdown.urgency as f64
        + SCORE_WEIGHTS[1] * breakdown.engagement as f64
        + SCORE_WEIGHTS[2] * breakdown.intent as f64
        + SCORE_WEIGHTS[3] * breakdown.demographics as f64
        + SCORE_WEIGHTS[4] * breakdown.behavior as f64)
        .round() as i32
}

/// Priority re-combination: how fast the workshop must act. Demographics
/// and behavior are deliberately left out.
pub fn priority_score(breakdown: &ScoreBreakdown) -> f64 {
    0.4 * breakdown.urgency as f64
        + 0.3 * breakdown.intent as f64
        + 0.3 * breakdown.engagement as f64
}

/// Estimated job value: the tenant's average job value scaled by additive
/// bonuses for strong sub-scores. The multiplier can exceed 2.0.
pub fn estimate_value(breakdown: &ScoreBreakdown, context: &CustomerContext) -> i64 {
    let mut multiplier = 1.0;
    if breakdown.intent > 80 {
        multiplier += 0.5;
    }
    if breakdown.demographics > 70 {
        multiplier += 0.3;
    }
    if breakdown.urgency > 70 {
        multiplier += 0.2;
    }
    (context.base_value() * multiplier).round() as i64
}

/// Independent recommendation rules; zero, one, or all may fire.
pub fn build_recommendations(breakdown: &ScoreBreakdown, lead: &Lead) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    if breakdown.urgency > 70 {
        recs.push(Recommendation {
            rec_type: "immediate_contact".to_string(),
            message: "Lead innerhalb einer Stunde kontaktieren".to_string(),
            priority: Priority::High,
        });
    }
    if breakdown.intent > 80 {
        recs.push(Recommendation {
            rec_type: "appointment_offer".to_string(),
            message: "Sofort einen Termin anbieten".to_string(),
            priority: Priority::High,
        });
    }
    if breakdown.engagement < 40 {
        recs.push(Recommendation {
            rec_type: "nurture".to_string(),
            message: "Follow-up mit weiteren Informationen senden".to_string(),
            priority: Priority::Medium,
        });
    }
    if !field_present(&lead.telefon) {
        recs.push(Recommendation {
            rec_type: "contact_collection".to_string(),
            message: "Telefonnummer erfragen".to_string(),
            priority: Priority::Medium,
        });
    }
    // Inclusive threshold: a lead with no demographic signal at all sits at
    // the neutral base of 50 and still needs qualification.
    if breakdown.demographics <= 50 {
        recs.push(Recommendation {
            rec_type: "qualification".to_string(),
            message: "Lead weiter qualifizieren (Kontaktdaten unvollständig)".to_string(),
            priority: Priority::Low,
        });
    }

    recs
}

/// Plain-text follow-up suggestions, gated independently per threshold.
pub fn build_follow_up_suggestions(breakdown: &ScoreBreakdown) -> Vec<String> {
    let mut suggestions = Vec::new();

    if breakdown.intent > 70 {
        suggestions.push("Konkretes Angebot mit Preisrahmen schicken".to_string());
        suggestions.push("Terminvorschläge für diese Woche anbieten".to_string());
    }
    if breakdown.urgency > 60 {
        suggestions.push("Telefonisch nachfassen, nicht nur per E-Mail".to_string());
    }
    if breakdown.engagement > 60 {
        suggestions.push("Auf die offenen Fragen aus dem Chat eingehen".to_string());
    }

    suggestions
}

/// Fallible scoring computation. Errors only on structurally unusable
/// input (no lead, no tenant id); partial data degrades sub-scores instead.
pub fn try_score_lead(
    lead: Option<&Lead>,
    history: Option<&[ChatMessage]>,
    context: Option<&CustomerContext>,
    now: DateTime<Utc>,
) -> Result<LeadScore, AppError> {
    let lead = lead.ok_or_else(|| AppError::BadRequest("Missing lead data".to_string()))?;
    if !field_present(&lead.kunde_id) {
        return Err(AppError::BadRequest("Lead without kunde_id".to_string()));
    }

    let history = history.unwrap_or(&[]);
    let default_context = CustomerContext::default();
    let context = context.unwrap_or(&default_context);

    let breakdown = ScoreBreakdown {
        urgency: urgency_score(lead, history, now),
        engagement: engagement_score(history),
        intent: intent_score(lead, history),
        demographics: demographics_score(lead),
        behavior: behavior_score(history),
    };

    let total = total_score(&breakdown);

    Ok(LeadScore {
        total,
        breakdown,
        classification: Classification::from_total(total),
        priority: Priority::from_score(priority_score(&breakdown)),
        estimated_value: estimate_value(&breakdown, context),
        recommendations: build_recommendations(&breakdown, lead),
        follow_up_suggestions: build_follow_up_suggestions(&breakdown),
        degraded: false,
    })
}

/// Score a lead. Never fails: malformed input yields the degraded default
/// so callers always receive a well-formed result.
pub fn score_lead(
    lead: Option<&Lead>,
    history: Option<&[ChatMessage]>,
    context: Option<&CustomerContext>,
    now: DateTime<Utc>,
) -> LeadScore {
    match try_score_lead(lead, history, context, now) {
        Ok(score) => score,
        Err(e) => {
            tracing::warn!("Scoring failed, returning degraded default: {}", e);
            LeadScore::degraded_default()
        }
    }
}

/// Score a batch of leads without touching storage: sequential, capped at
/// `limit` (default 100), pausing briefly every 10 leads. One malformed
/// lead resolves to the degraded default; the batch never aborts.
pub async fn score_batch(
    items: &[BatchScoreItem],
    context: Option<&CustomerContext>,
    limit: Option<usize>,
    now: DateTime<Utc>,
) -> Vec<LeadScore> {
    let limit = limit.unwrap_or(DEFAULT_BATCH_LIMIT);
    let mut results = Vec::new();
    for (idx, item) in items.iter().take(limit).enumerate() {
        if idx > 0 && idx % BATCH_PAUSE_EVERY == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(BATCH_PAUSE_MS)).await;
        }
        results.push(score_lead(
            item.lead.as_ref(),
            item.chat_history.as_deref(),
            context,
            now,
        ));
    }
    results
}

/// Resolve tenant business parameters, cache first.
///
/// Cache entries carry a checksum; corrupted entries are discarded and the
/// tenant row is refetched.
pub async fn resolve_customer_context(
    state: &Arc<AppState>,
    kunde_id: &str,
) -> Option<CustomerContext> {
    let cache_key = format!("context:{}", kunde_id);

    if let Some(cached) = state.context_cache.get(&cache_key).await {
        if let Some(valid_data) = ValidatedCacheEntry::deserialize_and_validate(&cached) {
            if let Ok(context) = serde_json::from_str::<CustomerContext>(&valid_data) {
                tracing::debug!("Customer context cache HIT for {}", kunde_id);
                return Some(context);
            }
        } else {
            tracing::warn!(
                "Context cache validation failed for {}, refetching from database",
                kunde_id
            );
        }
    }

    let storage = ScoreStorage::new(state.db.clone());
    match storage.fetch_customer_context(kunde_id).await {
        Ok(mut context) => {
            if context.average_job_value.is_none() {
                context.average_job_value = Some(state.config.default_job_value);
            }
            if let Ok(json) = serde_json::to_string(&context) {
                let entry = ValidatedCacheEntry::new(json);
                state.context_cache.insert(cache_key, entry.serialize()).await;
            }
            Some(context)
        }
        Err(e) => {
            tracing::warn!("Failed to load customer context for {}: {}", kunde_id, e);
            None
        }
    }
}

/// Complete scoring workflow for one lead
///
/// This is the main entry point that orchestrates the whole process:
/// 1. Resolve customer context (override, cache, or tenant row)
/// 2. Compute the score
/// 3. Persist a history row (fire-and-forget, outcome returned as data)
/// 4. Alert the workshop when the lead is hot
pub async fn score_and_store_workflow(
    state: &Arc<AppState>,
    lead: Option<Lead>,
    history: Option<Vec<ChatMessage>>,
    context_override: Option<CustomerContext>,
) -> (LeadScore, PersistOutcome) {
    let now = Utc::now();

    let context = match context_override {
        Some(context) => Some(context),
        None => match lead.as_ref().and_then(|l| l.kunde_id.clone()) {
            Some(kunde_id) => resolve_customer_context(state, &kunde_id).await,
            None => None,
        },
    };

    let score = score_lead(lead.as_ref(), history.as_deref(), context.as_ref(), now);

    let persistence = match lead
        .as_ref()
        .and_then(|l| l.id.zip(l.kunde_id.clone()))
    {
        Some((lead_id, kunde_id)) => {
            let storage = ScoreStorage::new(state.db.clone());
            storage
                .persist_score(&state.storage_breaker, lead_id, &kunde_id, &score)
                .await
        }
        None => {
            tracing::debug!("Lead has no id yet, skipping score persistence");
            PersistOutcome::Skipped
        }
    };

    if score.classification == Classification::Hot || score.priority == Priority::High {
        if let (Some(client), Some(l)) = (state.alert_client.as_ref(), lead.as_ref()) {
            if let Err(e) = client.send_hot_lead_alert(l, &score).await {
                tracing::warn!("Hot lead alert delivery failed: {}", e);
            }
        }
    }

    (score, persistence)
}

/// Score a batch of leads sequentially, capped at `limit` (default 100),
/// with a short pause every 10 leads. One lead's failure resolves to the
/// degraded default and never aborts the batch.
pub async fn score_batch_workflow(
    state: &Arc<AppState>,
    items: Vec<BatchScoreItem>,
    limit: Option<usize>,
) -> BatchScoreResponse {
    let received = items.len();
    let limit = limit.unwrap_or(DEFAULT_BATCH_LIMIT);

    let mut results = Vec::new();
    for (idx, item) in items.into_iter().take(limit).enumerate() {
        if idx > 0 && idx % BATCH_PAUSE_EVERY == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(BATCH_PAUSE_MS)).await;
        }

        let lead_id = item.lead.as_ref().and_then(|l| l.id);
        let (score, persistence) =
            score_and_store_workflow(state, item.lead, item.chat_history, None).await;
        results.push(BatchScoreResult {
            lead_id,
            score,
            persistence,
        });
    }

    tracing::info!(
        "Batch scoring complete: {} received, {} processed",
        received,
        results.len()
    );

    BatchScoreResponse {
        received,
        processed: results.len(),
        results,
    }
}
