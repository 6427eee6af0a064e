use super::*;

#[test]
fn defaults_cover_every_setting() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.listen_address, DEFAULT_LISTEN_ADDRESS);
    assert_eq!(settings.server.base_url, DEFAULT_BASE_URL);
    assert_eq!(settings.server.shutdown_timeout, Duration::from_secs(10));
    assert_eq!(settings.render.hugo_path, Path::new("hugo"));
    assert_eq!(settings.render.git_path, Path::new("git"));
    assert_eq!(settings.render.output_dir, Path::new("public"));
    assert!(settings.render.work_dir.ends_with(DEFAULT_WORK_DIR_NAME));
    assert!(settings.repository.url.is_none());
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.listen_address = Some("0.0.0.0:9000".to_string());
    raw.logging.level = Some("info".to_string());
    raw.repository.url = Some("https://example.com/file.git".to_string());

    let overrides = ServeOverrides {
        listen_address: Some("127.0.0.1:4321".to_string()),
        log_level: Some("debug".to_string()),
        render: RenderOverrides {
            repository_url: Some("https://example.com/cli.git".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.listen_address, "127.0.0.1:4321");
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(
        settings.repository.url.as_deref(),
        Some("https://example.com/cli.git")
    );
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

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_shutdown_timeout_is_left_to_the_server() {
    let mut raw = RawSettings::default();
    raw.server.shutdown_timeout_seconds = Some(0);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.server.shutdown_timeout.is_zero());
}

#[test]
fn blank_repository_url_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.repository.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.repository.url.is_none());
}

#[test]
fn rejects_invalid_log_level() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid level");
    assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
}

#[test]
fn rejects_empty_generator_path() {
    let mut raw = RawSettings::default();
    raw.render.hugo_path = Some(PathBuf::new());

    let err = Settings::from_raw(raw).expect_err("empty path");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.hugo_path",
            ..
        }
    ));
}

#[test]
fn output_dir_must_stay_inside_checkout() {
    for candidate in ["", "/srv/public", "../public"] {
        let mut raw = RawSettings::default();
        raw.render.output_dir = Some(PathBuf::from(candidate));

        let err = Settings::from_raw(raw).expect_err("escaping output dir");
        assert!(
            matches!(
                err,
                LoadError::Invalid {
                    key: "render.output_dir",
                    ..
                }
            ),
            "{candidate} should be rejected"
        );
    }
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["hugo-preview"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_arguments() {
    let args = CliArgs::parse_from([
        "hugo-preview",
        "serve",
        "--listen-address",
        "0.0.0.0:8081",
        "--repository-url",
        "https://example.com/site.git",
        "--log-json",
        "true",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(
                serve.overrides.listen_address.as_deref(),
                Some("0.0.0.0:8081")
            );
            assert_eq!(
                serve.overrides.render.repository_url.as_deref(),
                Some("https://example.com/site.git")
            );
            assert_eq!(serve.overrides.log_json, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "hugo-preview",
        "render",
        "--repository-url",
        "https://example.com/site.git",
        "--target",
        "/tmp/site",
        "deadbeef",
    ]);

    match args.command.expect("render command") {
        Command::Render(render) => {
            assert_eq!(render.commit, "deadbeef");
            assert_eq!(render.target.as_deref(), Some(Path::new("/tmp/site")));
            assert_eq!(
                render.overrides.repository_url.as_deref(),
                Some("https://example.com/site.git")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
