/// Integration tests with a mocked alert webhook
/// Tests hot-lead alert delivery without hitting a real endpoint
use carbot_score_api::alert_client::AlertClient;
use carbot_score_api::models::{
    Classification, Lead, LeadScore, Priority, ScoreBreakdown,
};
use carbot_score_api::scoring::{is_valid_email, validate_de_phone};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn hot_lead() -> Lead {
    Lead {
        id: Some(Uuid::new_v4()),
        kunde_id: Some("werkstatt-1".to_string()),
        anliegen: Some("Bremsen kaputt, sofort Hilfe".to_string()),
        name: Some("Hans Müller".to_string()),
        telefon: Some("+4915112345678".to_string()),
        ..Default::default()
    }
}

fn hot_score() -> LeadScore {
    LeadScore {
        total: 88,
        breakdown: ScoreBreakdown {
            urgency: 100,
            engagement: 70,
            intent: 95,
            demographics: 75,
            behavior: 80,
        },
        classification: Classification::Hot,
        priority: Priority::High,
        estimated_value: 600,
        recommendations: Vec::new(),
        follow_up_suggestions: Vec::new(),
        degraded: false,
    }
}

#[tokio::test]
async fn test_alert_delivery_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/leads"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "kunde_id": "werkstatt-1",
            "classification": "Hot",
            "priority": "High",
            "total_score": 88,
            "estimated_value": 600
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = AlertClient::new(format!("{}/hooks/leads", mock_server.uri())).unwrap();
    let result = client.send_hot_lead_alert(&hot_lead(), &hot_score()).await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_alert_delivery_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/leads"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let client = AlertClient::new(format!("{}/hooks/leads", mock_server.uri())).unwrap();
    let result = client.send_hot_lead_alert(&hot_lead(), &hot_score()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_alert_delivery_unreachable_endpoint() {
    // Nothing listening on this port
    let client = AlertClient::new("http://127.0.0.1:1/hooks/leads".to_string()).unwrap();
    let result = client.send_hot_lead_alert(&hot_lead(), &hot_score()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_concurrent_alert_deliveries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/leads"))
        .respond_with(ResponseTemplate::new(200))
        .expect(10)
        .mount(&mock_server)
        .await;

    let client = AlertClient::new(format!("{}/hooks/leads", mock_server.uri())).unwrap();

    // Fire 10 concurrent alerts
    let mut handles = vec![];
    for _ in 0..10 {
        let client_clone = client.clone();
        let handle = tokio::spawn(async move {
            client_clone
                .send_hot_lead_alert(&hot_lead(), &hot_score())
                .await
        });
        handles.push(handle);
    }

    // Wait for all to complete
    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }
}

#[test]
fn test_email_validation_comprehensive() {
    // Valid cases
    assert!(is_valid_email("user@example.com"));
    assert!(is_valid_email("test.user+tag@subdomain.example.co.uk"));
    assert!(is_valid_email("valid_email-2023@company.org"));

    // Invalid cases - fake patterns
    assert!(!is_valid_email("fake999999@example.com"));
    assert!(!is_valid_email("test1111111111@example.com"));
    assert!(!is_valid_email("user123456789@example.com"));

    // Invalid cases - malformed
    assert!(!is_valid_email("not_an_email"));
    assert!(!is_valid_email("missing@domain"));
    assert!(!is_valid_email("@example.com"));
    assert!(!is_valid_email("user@"));
}

#[test]
fn test_phone_validation_comprehensive() {
    // Valid German mobiles
    let (valid, normalized) = validate_de_phone("015112345678");
    assert!(valid);
    assert_eq!(normalized, "+4915112345678");

    let (valid, normalized) = validate_de_phone("0151 1234 5678");
    assert!(valid);
    assert_eq!(normalized, "+4915112345678");

    let (valid, normalized) = validate_de_phone("+49 151 12345678");
    assert!(valid);
    assert_eq!(normalized, "+4915112345678");

    // Invalid phones
    let (valid, _) = validate_de_phone("123");
    assert!(!valid);

    let (valid, _) = validate_de_phone("");
    assert!(!valid);

    let (valid, _) = validate_de_phone("+1234567890"); // not a real number anywhere
    assert!(!valid);
}
