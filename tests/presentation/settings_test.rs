use std::time::Duration;

use arunika::domain::DEFAULT_LANGUAGE;
use arunika::presentation::{Environment, ProviderKind, Settings};

#[test]
fn given_no_overrides_when_loading_then_compiled_defaults_apply() {
    let settings = Settings::load(Environment::Test).unwrap();

    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.providers.kind, ProviderKind::Mock);
    assert_eq!(settings.audio.language, DEFAULT_LANGUAGE);
    assert_eq!(
        settings.audio.recognition_close_timeout(),
        Duration::from_secs(3)
    );
    assert_eq!(settings.websocket.ping_period(), Duration::from_secs(54));
    assert!(settings.websocket.ping_period() < settings.websocket.pong_wait());
    assert_eq!(
        settings.session.continuation_policy().window(),
        chrono::Duration::minutes(30)
    );
    assert!(settings.moderation.blocked_terms.is_empty());
}

#[test]
fn given_environment_names_when_parsing_then_case_is_ignored() {
    assert_eq!(
        Environment::try_from("PROD".to_string()).unwrap(),
        Environment::Prod
    );
    assert_eq!(
        Environment::try_from("production".to_string()).unwrap(),
        Environment::Prod
    );
    assert_eq!(
        Environment::try_from("Local".to_string()).unwrap(),
        Environment::Local
    );
    assert!(Environment::try_from("staging".to_string()).is_err());
}
