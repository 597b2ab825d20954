use std::sync::Mutex;

use super::*;
use crate::config::Config;

fn test_client() -> GeminiClient {
    GeminiClient::new_with_key(&Config::default(), "test-key".to_string())
        .expect("default config is valid")
}

fn model(name: &str, methods: &[&str]) -> ModelInfo {
    ModelInfo {
        name: name.to_string(),
        supported_generation_methods: methods.iter().map(|m| (*m).to_string()).collect(),
    }
}

#[test]
#[serial_test::serial]
fn api_key_is_read_from_environment() {
    // SAFETY: the serial attribute keeps other tests from touching the
    // environment concurrently.
    unsafe { std::env::set_var(API_KEY_ENV, "env-key") };
    let client = GeminiClient::new(&Config::default()).expect("env key is set");
    assert_eq!(client.api_key, "env-key");
    unsafe { std::env::remove_var(API_KEY_ENV) };
}

#[test]
fn task_type_api_strings() {
    assert_eq!(TaskType::RetrievalDocument.as_api_str(), "RETRIEVAL_DOCUMENT");
    assert_eq!(TaskType::RetrievalQuery.as_api_str(), "RETRIEVAL_QUERY");
}

#[test]
fn retry_policy_delays_escalate() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.delay_for(1), Duration::from_secs(20));
    assert_eq!(policy.delay_for(2), Duration::from_secs(40));
    assert_eq!(policy.delay_for(5), Duration::from_secs(100));
}

#[test]
fn rate_limit_exhausts_after_exactly_max_attempts() {
    let sleeps: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&sleeps);
    let client = test_client().with_sleep_fn(Arc::new(move |d| {
        recorder.lock().expect("recorder lock").push(d);
    }));

    let mut attempts = 0;
    let result = client.request_with_backoff(|| {
        attempts += 1;
        Err(RequestError::RateLimited("HTTP 429".to_string()))
    });

    assert!(matches!(result, Err(StudyError::Embedding(_))));
    assert_eq!(attempts, 5);

    let recorded = sleeps.lock().expect("recorder lock");
    let secs: Vec<u64> = recorded.iter().map(Duration::as_secs).collect();
    assert_eq!(secs, vec![20, 40, 60, 80, 100]);
}

#[test]
fn success_after_rate_limits_stops_retrying() {
    let sleeps: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&sleeps);
    let client = test_client().with_sleep_fn(Arc::new(move |d| {
        recorder.lock().expect("recorder lock").push(d);
    }));

    let mut attempts = 0;
    let result = client.request_with_backoff(|| {
        attempts += 1;
        if attempts < 3 {
            Err(RequestError::RateLimited("HTTP 429".to_string()))
        } else {
            Ok("body".to_string())
        }
    });

    assert_eq!(result.expect("third attempt succeeds"), "body");
    assert_eq!(attempts, 3);
    assert_eq!(sleeps.lock().expect("recorder lock").len(), 2);
}

#[test]
fn custom_retry_policy_bounds_attempts() {
    let client = test_client()
        .with_retry_policy(RetryPolicy {
            max_attempts: 2,
            backoff_base_secs: 1,
        })
        .with_sleep_fn(Arc::new(|_| {}));

    let mut attempts = 0;
    let result: crate::Result<String> = client.request_with_backoff(|| {
        attempts += 1;
        Err(RequestError::RateLimited("HTTP 429".to_string()))
    });

    assert!(result.is_err());
    assert_eq!(attempts, 2);
}

#[test]
fn non_rate_limit_errors_do_not_retry() {
    let client = test_client().with_sleep_fn(Arc::new(|_| {
        panic!("must not sleep for non-rate-limit errors");
    }));

    let mut attempts = 0;
    let result: crate::Result<String> = client.request_with_backoff(|| {
        attempts += 1;
        Err(RequestError::Other(anyhow!("HTTP 500")))
    });

    assert!(result.is_err());
    assert_eq!(attempts, 1);
}

#[test]
fn generative_model_preference_order() {
    let models = vec![
        model("models/gemini-2.5-flash", &["generateContent"]),
        model("models/gemini-1.5-pro", &["generateContent"]),
        model("models/gemini-1.5-flash-001", &["generateContent"]),
        model("models/embedding-001", &["embedContent"]),
    ];

    assert_eq!(
        pick_generative_model(&models).as_deref(),
        Some("models/gemini-1.5-flash-001")
    );
}

#[test]
fn generative_model_falls_back_through_tiers() {
    let pro_only = vec![
        model("models/gemini-1.5-pro", &["generateContent"]),
        model("models/embedding-001", &["embedContent"]),
    ];
    assert_eq!(
        pick_generative_model(&pro_only).as_deref(),
        Some("models/gemini-1.5-pro")
    );

    let any_flash = vec![model("models/gemini-2.5-flash", &["generateContent"])];
    assert_eq!(
        pick_generative_model(&any_flash).as_deref(),
        Some("models/gemini-2.5-flash")
    );

    let neither = vec![model("models/gemini-exp", &["generateContent"])];
    assert_eq!(
        pick_generative_model(&neither).as_deref(),
        Some("models/gemini-exp")
    );

    assert_eq!(pick_generative_model(&[]), None);
}

#[test]
fn embedding_model_is_first_with_embed_support() {
    let models = vec![
        model("models/gemini-1.5-flash", &["generateContent"]),
        model("models/text-embedding-004", &["embedContent"]),
        model("models/embedding-001", &["embedContent"]),
    ];

    assert_eq!(
        pick_embedding_model(&models).as_deref(),
        Some("models/text-embedding-004")
    );
    assert_eq!(pick_embedding_model(&[]), None);
}

#[test]
fn pinned_models_skip_discovery() {
    let mut config = Config::default();
    config.gemini.generative_model = Some("gemini-1.5-pro".to_string());
    config.gemini.embedding_model = Some("models/text-embedding-004".to_string());

    let client = GeminiClient::new_with_key(&config, "test-key".to_string())
        .expect("config is valid");

    assert_eq!(client.generative_model(), "models/gemini-1.5-pro");
    assert_eq!(client.embedding_model(), "models/text-embedding-004");
}

#[test]
fn model_name_qualification() {
    assert_eq!(qualify_model_name("embedding-001"), "models/embedding-001");
    assert_eq!(
        qualify_model_name("models/embedding-001"),
        "models/embedding-001"
    );
}

#[test]
fn embed_request_title_only_for_documents() {
    let doc = embed_request("models/embedding-001", "text", TaskType::RetrievalDocument);
    assert_eq!(doc.title, Some("Study Material"));

    let query = embed_request("models/embedding-001", "text", TaskType::RetrievalQuery);
    assert_eq!(query.title, None);
}

#[test]
fn parses_embed_response() {
    let body = r#"{"embedding": {"values": [0.1, -0.2, 0.3]}}"#;
    let parsed: EmbedContentResponse = serde_json::from_str(body).expect("valid fixture");
    assert_eq!(parsed.embedding.values, vec![0.1, -0.2, 0.3]);
}

#[test]
fn parses_generation_response() {
    let body = r#"{
        "candidates": [
            {"content": {"parts": [{"text": "Antwort "}, {"text": "[Seite 2]"}]}}
        ]
    }"#;
    let parsed: GenerateContentResponse = serde_json::from_str(body).expect("valid fixture");
    let text: String = parsed.candidates[0]
        .content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect();
    assert_eq!(text, "Antwort [Seite 2]");
}

#[test]
fn api_urls_carry_key_and_version() {
    let client = test_client();
    let url = client
        .model_url("models/embedding-001", "embedContent")
        .expect("url builds");

    assert!(url.path().ends_with("/v1beta/models/embedding-001:embedContent"));
    assert!(url.query().is_some_and(|q| q.contains("key=test-key")));
}
