use std::sync::{Arc, Mutex};
use std::time::Duration;

use adreports_api::{
    parse_report, Client, Error, PollPolicy, ProcessingMode, ReportDefinition, Sleeper,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPORT_BODY: &str = "Date\tCampaignId\tClicks\n2024-06-01\t42\t7\n";

/// Records requested waits instead of sleeping.
#[derive(Default)]
struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

fn definition() -> ReportDefinition {
    ReportDefinition::new("campaign_daily", "CAMPAIGN_PERFORMANCE_REPORT")
        .with_fields(["Date", "CampaignId", "Clicks"])
        .with_processing_mode(ProcessingMode::Offline)
}

fn window() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 6, 7).unwrap(),
    )
}

fn client(server: &MockServer, max_attempts: u32, sleeper: Arc<RecordingSleeper>) -> Client {
    Client::with_base_url(&server.uri(), "test-token")
        .unwrap()
        .with_poll_policy(PollPolicy {
            max_attempts,
            default_retry_in: Duration::from_secs(5),
        })
        .with_sleeper(sleeper)
}

async fn mount_queued(server: &MockServer, times: u64, retry_in: Option<&str>) {
    let mut template = ResponseTemplate::new(201);
    if let Some(secs) = retry_in {
        template = template.insert_header("retryIn", secs);
    }
    Mock::given(method("POST"))
        .and(path("/json/v5/reports"))
        .respond_with(template)
        .up_to_n_times(times)
        .mount(server)
        .await;
}

async fn mount_ready(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/json/v5/reports"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REPORT_BODY))
        .mount(server)
        .await;
}

#[tokio::test]
async fn ready_on_first_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/json/v5/reports"))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("processingMode", "offline"))
        .and(header("skipReportHeader", "true"))
        .and(header("skipReportSummary", "true"))
        .and(body_partial_json(serde_json::json!({
            "params": {
                "SelectionCriteria": {"DateFrom": "2024-06-01", "DateTo": "2024-06-07"},
                "ReportType": "CAMPAIGN_PERFORMANCE_REPORT",
                "Format": "TSV"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(REPORT_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let (from, to) = window();
    let text = client(&server, 3, sleeper.clone())
        .fetch_report(&definition(), from, to)
        .await
        .unwrap();

    assert_eq!(text, REPORT_BODY);
    assert!(sleeper.waits().is_empty());

    let rows: Vec<_> = parse_report(&text).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("CampaignId"), Some("42"));
}

#[tokio::test]
async fn queued_twice_then_ready() {
    let server = MockServer::start().await;
    mount_queued(&server, 2, Some("1")).await;
    mount_ready(&server).await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let (from, to) = window();
    let text = client(&server, 3, sleeper.clone())
        .fetch_report(&definition(), from, to)
        .await
        .unwrap();

    assert_eq!(text, REPORT_BODY);
    assert_eq!(
        sleeper.waits(),
        vec![Duration::from_secs(1), Duration::from_secs(1)]
    );
}

#[tokio::test]
async fn single_attempt_ceiling_exhausts_before_ready() {
    let server = MockServer::start().await;
    mount_queued(&server, 2, Some("1")).await;
    mount_ready(&server).await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let (from, to) = window();
    let err = client(&server, 1, sleeper.clone())
        .fetch_report(&definition(), from, to)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RetryExhausted { attempts: 1 }));
    assert!(sleeper.waits().is_empty());
}

#[tokio::test]
async fn missing_retry_hint_uses_default_wait() {
    let server = MockServer::start().await;
    mount_queued(&server, 1, None).await;
    mount_ready(&server).await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let (from, to) = window();
    client(&server, 5, sleeper.clone())
        .fetch_report(&definition(), from, to)
        .await
        .unwrap();

    assert_eq!(sleeper.waits(), vec![Duration::from_secs(5)]);
}

#[tokio::test]
async fn accepted_status_is_treated_as_queued() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/json/v5/reports"))
        .respond_with(ResponseTemplate::new(202).insert_header("retryIn", "3"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_ready(&server).await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let (from, to) = window();
    let text = client(&server, 2, sleeper.clone())
        .fetch_report(&definition(), from, to)
        .await
        .unwrap();

    assert_eq!(text, REPORT_BODY);
    assert_eq!(sleeper.waits(), vec![Duration::from_secs(3)]);
}

#[tokio::test]
async fn error_status_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/json/v5/reports"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"error":{"error_code":"4000","error_string":"Invalid request"}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let (from, to) = window();
    let err = client(&server, 5, sleeper.clone())
        .fetch_report(&definition(), from, to)
        .await
        .unwrap_err();

    match err {
        Error::Rejected { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("Invalid request"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
    assert!(sleeper.waits().is_empty());
}

#[tokio::test]
async fn rejected_body_is_kept_whole() {
    let server = MockServer::start().await;
    let detail = format!("{{\"error\":\"{}\"}}", "x".repeat(5000));

    Mock::given(method("POST"))
        .and(path("/json/v5/reports"))
        .respond_with(ResponseTemplate::new(400).set_body_string(detail.clone()))
        .mount(&server)
        .await;

    let (from, to) = window();
    let err = client(&server, 1, Arc::new(RecordingSleeper::default()))
        .fetch_report(&definition(), from, to)
        .await
        .unwrap_err();

    match err {
        Error::Rejected { body, .. } => assert_eq!(body, detail),
        other => panic!("expected Rejected, got {:?}", other),
    }
}

async fn report_names(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|req| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            body["params"]["ReportName"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn polls_keep_report_name_and_refetch_gets_a_new_one() {
    let server = MockServer::start().await;
    mount_queued(&server, 2, Some("1")).await;
    mount_ready(&server).await;

    let client = client(&server, 3, Arc::new(RecordingSleeper::default()));
    let (from, to) = window();
    client.fetch_report(&definition(), from, to).await.unwrap();

    let names = report_names(&server).await;
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|n| n == &names[0]));
    assert!(names[0].starts_with("campaign_daily 2024-06-01..2024-06-07 "));

    tokio::time::sleep(Duration::from_millis(2)).await;
    client.fetch_report(&definition(), from, to).await.unwrap();

    let names = report_names(&server).await;
    assert_eq!(names.len(), 4);
    assert_ne!(names[3], names[0]);
}

#[tokio::test]
async fn client_login_header_is_sent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/json/v5/reports"))
        .and(header("Client-Login", "agency-client"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REPORT_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let (from, to) = window();
    let result = client(&server, 1, Arc::new(RecordingSleeper::default()))
        .with_client_login("agency-client")
        .fetch_report(&definition(), from, to)
        .await;

    assert!(result.is_ok());
}

#[test]
fn error_display() {
    let err = Error::Rejected {
        status: 400,
        body: "bad".to_string(),
    };
    assert!(err.to_string().contains("400"));
    assert!(err.to_string().contains("bad"));

    let err = Error::RetryExhausted { attempts: 3 };
    assert!(err.to_string().contains("3 attempts"));

    assert!(Error::MissingToken.to_string().contains("token"));
}
