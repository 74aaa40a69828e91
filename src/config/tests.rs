use super::*;

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:3000");
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.logging.format, LogFormat::Compact);
    assert!(settings.database.url.is_none());
    assert_eq!(settings.database.max_connections.get(), 10);
    assert_eq!(settings.redis.url, "redis://127.0.0.1:6379/0");
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.backend, CacheBackendKind::Redis);
    assert_eq!(settings.cache.namespace, "feedline:api:cache:");
    assert_eq!(settings.cache.ttl, Duration::from_secs(300));
    assert!(settings.stream.enabled);
    assert_eq!(settings.stream.name, "feed-generation:new-feed");
    assert_eq!(settings.stream.group, "api-notifiers");
    assert_eq!(settings.stream.consumer, "api-worker-1");
    assert_eq!(settings.stream.block_timeout, Duration::from_millis(5000));
    assert_eq!(settings.stream.backoff_step, Duration::from_millis(100));
    assert_eq!(settings.stream.backoff_max, Duration::from_secs(30));
    assert_eq!(settings.rate_limit.window_seconds.get(), 60);
    assert_eq!(settings.rate_limit.max_requests.get(), 100);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.redis.url = Some("redis://cache.internal:6379".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        redis: RedisOverride {
            redis_url: Some("redis://10.0.0.5:6380/1".to_string()),
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.redis.url, "redis://10.0.0.5:6380/1");
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.logging.format, LogFormat::Json);
}

#[test]
fn blank_database_url_means_unconfigured() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn memory_backend_is_selectable() {
    let mut raw = RawSettings::default();
    raw.apply_serve_overrides(&ServeOverrides {
        cache_backend: Some("memory".to_string()),
        ..Default::default()
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.backend, CacheBackendKind::Memory);
}

#[test]
fn unknown_cache_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("memcached".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid backend");
    assert!(matches!(err, LoadError::Invalid { key: "cache.backend", .. }));
}

#[test]
fn zero_values_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key: "cache.ttl_seconds", .. })
    ));

    let mut raw = RawSettings::default();
    raw.rate_limit.max_requests = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key: "rate_limit.max_requests", .. })
    ));

    let mut raw = RawSettings::default();
    raw.server.port = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key: "server.port", .. })
    ));
}

#[test]
fn backoff_ceiling_must_cover_step() {
    let mut raw = RawSettings::default();
    raw.stream.backoff_step_ms = Some(500);
    raw.stream.backoff_max_ms = Some(100);

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key: "stream.backoff_max_ms", .. })
    ));
}

#[test]
fn empty_consumer_name_is_rejected() {
    let mut raw = RawSettings::default();
    raw.stream.consumer = Some(" ".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key: "stream.consumer", .. })
    ));
}

#[test]
fn non_redis_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.redis.url = Some("http://localhost:6379".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key: "redis.url", .. })
    ));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key: "logging.level", .. })
    ));
}

#[test]
fn cli_parses_invalidate_subcommand() {
    let args = CliArgs::try_parse_from(["feedline", "invalidate"]).expect("parse");
    match args.command {
        Some(Command::Invalidate(invalidate)) => assert_eq!(invalidate.prefix, "feeds:"),
        other => panic!("unexpected command: {other:?}"),
    }

    let args = CliArgs::try_parse_from([
        "feedline",
        "serve",
        "--server-port",
        "8080",
        "--cache-backend",
        "memory",
    ])
    .expect("parse");
    match args.command {
        Some(Command::Serve(serve)) => {
            assert_eq!(serve.overrides.server_port, Some(8080));
            assert_eq!(serve.overrides.cache_backend.as_deref(), Some("memory"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}
