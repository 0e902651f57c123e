use super::*;
use crate::cache::InvalidationEvent;

fn settings(raw: RawSettings) -> Settings {
    Settings::from_raw(raw).expect("settings should build")
}

#[test]
fn defaults_match_standard_behaviour() {
    let settings = settings(RawSettings::default());

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.freshness.stale_window, StaleWindowPolicy::MirrorTtl);
    assert!(settings.invalidation.rules.is_empty());
    assert!(settings.invalidation.paths.is_empty());

    let resolver = settings.resolver();
    assert_eq!(resolver.rules(), InvalidationResolver::new().rules());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("warn".into());
    raw.logging.json = Some(false);
    raw.freshness.stale_window = Some("disabled".into());

    raw.apply_overrides(&Overrides {
        log_level: Some("debug".into()),
        log_json: Some(true),
        stale_window_seconds: Some(90),
    });

    let settings = settings(raw);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(settings.freshness.stale_window, StaleWindowPolicy::Fixed(90));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".into());

    let err = Settings::from_raw(raw).expect_err("level should fail");
    assert!(matches!(err, LoadError::Invalid { ref key, .. } if key == "logging.level"));
}

#[test]
fn stale_window_modes_parse() {
    for (mode, seconds, expected) in [
        ("mirror_ttl", None, StaleWindowPolicy::MirrorTtl),
        ("Disabled", None, StaleWindowPolicy::Disabled),
        ("fixed", Some(30), StaleWindowPolicy::Fixed(30)),
    ] {
        let mut raw = RawSettings::default();
        raw.freshness.stale_window = Some(mode.into());
        raw.freshness.stale_window_seconds = seconds;
        assert_eq!(settings(raw).freshness.stale_window, expected, "mode {mode}");
    }
}

#[test]
fn stale_window_seconds_alone_implies_fixed() {
    let mut raw = RawSettings::default();
    raw.freshness.stale_window_seconds = Some(15);
    assert_eq!(settings(raw).freshness.stale_window, StaleWindowPolicy::Fixed(15));
}

#[test]
fn fixed_stale_window_requires_non_negative_seconds() {
    let mut raw = RawSettings::default();
    raw.freshness.stale_window = Some("fixed".into());
    let err = Settings::from_raw(raw.clone()).expect_err("seconds missing");
    assert!(
        matches!(err, LoadError::Invalid { ref key, .. } if key == "freshness.stale_window_seconds")
    );

    raw.freshness.stale_window_seconds = Some(-1);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn seconds_conflict_with_other_modes() {
    let mut raw = RawSettings::default();
    raw.freshness.stale_window = Some("disabled".into());
    raw.freshness.stale_window_seconds = Some(10);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn unknown_stale_window_mode_is_rejected() {
    let mut raw = RawSettings::default();
    raw.freshness.stale_window = Some("forever".into());
    let err = Settings::from_raw(raw).expect_err("mode should fail");
    assert!(err.to_string().contains("forever"));
}

#[test]
fn configured_rules_extend_standard_table() {
    let mut raw = RawSettings::default();
    raw.invalidation
        .rules
        .insert(" tag_renamed ".into(), vec!["tag_page".into(), " homepage".into()]);

    let settings = settings(raw);
    assert_eq!(
        settings.invalidation.rules.get("tag_renamed"),
        Some(&vec!["tag_page".to_string(), "homepage".to_string()])
    );

    let resolver = settings.resolver();
    assert_eq!(resolver.get_rule("tag_renamed"), ["tag_page", "homepage"]);
    assert!(!resolver.get_rule("post_updated").is_empty());
}

#[test]
fn blank_surface_in_rule_is_rejected() {
    let mut raw = RawSettings::default();
    raw.invalidation
        .rules
        .insert("post_updated".into(), vec!["".into()]);
    let err = Settings::from_raw(raw).expect_err("blank surface");
    assert!(
        matches!(err, LoadError::Invalid { ref key, .. } if key == "invalidation.rules.post_updated")
    );
}

#[test]
fn configured_paths_replace_templates() {
    let mut raw = RawSettings::default();
    raw.invalidation
        .paths
        .insert("post_page".into(), "/posts/{id}".into());

    let resolver = settings(raw).resolver();
    let expected = InvalidationResolver::builder()
        .with_surface("post_page", crate::cache::SurfaceScope::entity("post", "/posts/{id}"))
        .build();

    let event = InvalidationEvent::new("comment_added").with_dependency("post_page", 7);
    assert_eq!(resolver.resolve(&event), expected.resolve(&event));
    assert_ne!(
        resolver.resolve(&event),
        InvalidationResolver::new().resolve(&event)
    );
}

#[test]
fn path_for_unknown_surface_is_rejected() {
    let mut raw = RawSettings::default();
    raw.invalidation
        .paths
        .insert("gallery".into(), "/gallery/{id}".into());
    let err = Settings::from_raw(raw).expect_err("unknown surface");
    assert!(err.to_string().contains("invalidation.paths.gallery"));
}

#[test]
fn templated_surface_path_requires_placeholder() {
    let mut raw = RawSettings::default();
    raw.invalidation
        .paths
        .insert("category_page".into(), "/category".into());
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.invalidation.paths.insert("feed".into(), "/rss.xml".into());
    assert_eq!(
        settings(raw).invalidation.paths.get("feed").map(String::as_str),
        Some("/rss.xml")
    );
}

#[test]
fn freshness_engine_uses_configured_policy() {
    let mut raw = RawSettings::default();
    raw.freshness.stale_window = Some("disabled".into());
    let engine = settings(raw).freshness_engine();
    assert!(engine.is_expired(0, 100, 101));
}

#[test]
fn cli_parses_subcommands() {
    let args = CliArgs::try_parse_from([
        "regen-cache",
        "--log-level",
        "debug",
        "key",
        "--path",
        "/blog/post-1",
        "--variant",
        "lang=en",
        "--variant",
        "page=2",
    ])
    .expect("cli should parse");

    assert_eq!(args.overrides.log_level.as_deref(), Some("debug"));
    let Command::Key(key) = args.command else {
        panic!("expected key command");
    };
    assert_eq!(key.path, "/blog/post-1");
    assert_eq!(key.variants, ["lang=en", "page=2"]);
}

#[test]
fn cli_accepts_negative_freshness_values() {
    let args = CliArgs::try_parse_from([
        "regen-cache",
        "freshness",
        "--created-at",
        "-5",
        "--ttl",
        "-10",
        "--now",
        "0",
    ])
    .expect("cli should parse");

    let Command::Freshness(freshness) = args.command else {
        panic!("expected freshness command");
    };
    assert_eq!(freshness.created_at, Some(-5));
    assert_eq!(freshness.ttl, -10);
    assert_eq!(freshness.now, Some(0));
}
