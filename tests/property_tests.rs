/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs: the scorer never
/// panics, sub-scores stay within bounds, and tiers are monotone
use carbot_score_api::models::{
    ChatMessage, ChatRole, Classification, CustomerContext, Lead, ScoreBreakdown,
};
use carbot_score_api::scoring::{
    estimate_value, is_valid_email, score_lead, total_score, validate_de_phone,
};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

fn tier_rank(classification: Classification) -> u8 {
    match classification {
        Classification::VeryCold => 0,
        Classification::Cold => 1,
        Classification::Warm => 2,
        Classification::Hot => 3,
    }
}

// Property: Scoring should never panic and always stay within bounds
proptest! {
    #[test]
    fn scoring_never_panics_and_stays_bounded(
        anliegen in "\\PC*",
        fahrzeug in "\\PC*",
        name in "\\PC*",
        email in "\\PC*",
        telefon in "\\PC*",
        contents in proptest::collection::vec("\\PC*", 0..8),
        created_secs in 0i64..=2_000_000_000i64,
    ) {
        let lead = Lead {
            kunde_id: Some("werkstatt-prop".to_string()),
            anliegen: Some(anliegen),
            fahrzeug: Some(fahrzeug),
            name: Some(name),
            email: Some(email),
            telefon: Some(telefon),
            created_at: Some(Utc.timestamp_opt(created_secs, 0).unwrap()),
            ..Default::default()
        };
        let history: Vec<ChatMessage> = contents
            .into_iter()
            .enumerate()
            .map(|(i, c)| ChatMessage::new(
                if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant },
                c,
            ))
            .collect();
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let score = score_lead(Some(&lead), Some(&history), None, now);

        prop_assert!((0..=100).contains(&score.total));
        prop_assert!((0..=100).contains(&score.breakdown.urgency));
        prop_assert!((0..=100).contains(&score.breakdown.engagement));
        prop_assert!((0..=100).contains(&score.breakdown.intent));
        prop_assert!((0..=100).contains(&score.breakdown.demographics));
        prop_assert!((0..=100).contains(&score.breakdown.behavior));
        prop_assert!(score.estimated_value >= 0);
        prop_assert!(!score.degraded);
    }

    #[test]
    fn degraded_default_without_tenant_id(anliegen in "\\PC*") {
        let lead = Lead {
            anliegen: Some(anliegen),
            ..Default::default()
        };
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let score = score_lead(Some(&lead), None, None, now);
        prop_assert!(score.degraded);
        prop_assert_eq!(score.total, 50);
    }
}

// Property: Classification is monotone in the total
proptest! {
    #[test]
    fn classification_monotone_in_total(a in 0i32..=100, b in 0i32..=100) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            tier_rank(Classification::from_total(lo)) <= tier_rank(Classification::from_total(hi)),
            "tiers inverted for totals {} and {}", lo, hi
        );
    }

    #[test]
    fn total_of_uniform_breakdown_is_identity(v in 0i32..=100) {
        let breakdown = ScoreBreakdown {
            urgency: v,
            engagement: v,
            intent: v,
            demographics: v,
            behavior: v,
        };
        prop_assert_eq!(total_score(&breakdown), v);
    }
}

// Property: Validation helpers should never panic
proptest! {
    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }

    #[test]
    fn phone_validation_never_panics(phone in "\\PC*") {
        let _ = validate_de_phone(&phone);
    }

    #[test]
    fn valid_de_mobiles_normalize_to_e164(suffix in 10000000u32..=99999999u32) {
        let phone = format!("0151{}", suffix);
        let (valid, normalized) = validate_de_phone(&phone);
        if valid {
            // Valid numbers normalize to +49...
            prop_assert!(normalized.starts_with("+49"));
            prop_assert!(normalized[1..].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn very_short_phones_always_invalid(phone in "[0-9]{0,5}") {
        let (valid, _) = validate_de_phone(&phone);
        prop_assert!(!valid, "Very short phone should be invalid: {}", phone);
    }
}

// Property: Value estimation scales with the tenant baseline
proptest! {
    #[test]
    fn neutral_breakdown_estimates_the_baseline(base in 1.0f64..10_000.0f64) {
        let breakdown = ScoreBreakdown {
            urgency: 50,
            engagement: 50,
            intent: 50,
            demographics: 50,
            behavior: 50,
        };
        let context = CustomerContext { average_job_value: Some(base) };
        prop_assert_eq!(estimate_value(&breakdown, &context), base.round() as i64);
    }
}
