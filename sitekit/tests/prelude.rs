#![cfg(all(feature = "client", feature = "form"))]

use std::time::Duration;

use serde_json::json;
use sitekit::prelude::*;

#[test]
fn test_client_config_through_facade() {
    let config = RequestConfig::builder("https://api.example.com")
        .timeout(Duration::from_secs(5))
        .no_cache()
        .build();
    let client = ApiClient::new(config).unwrap();

    assert_eq!(client.config().timeout, Duration::from_secs(5));
    assert_eq!(client.config().cache, CachePolicy::Disabled);
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn test_form_through_facade() {
    let form = FormEngine::builder()
        .field(FieldConfig::new("email").kind(FieldType::Email).required())
        .schema(RuleSchema::new().rule("email", Rule::Email))
        .build()
        .unwrap();

    form.set_field_value("email", json!("nope"));
    assert_eq!(form.handle_submit().await, SubmitOutcome::Invalid);
    assert_eq!(
        form.state().error("email").map(|error| error.kind),
        Some(ErrorKind::Schema)
    );

    form.set_field_value("email", json!("ada@example.com"));
    assert_eq!(form.handle_submit().await, SubmitOutcome::Submitted);
    assert_eq!(form.status(), SubmitStatus::Success);
}
