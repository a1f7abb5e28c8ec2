use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.views.extension = Some(".jinja".to_string());

    let overrides = SettingsOverrides {
        log_level: Some("debug".to_string()),
        extension: Some(".tpl".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.views.extension, ".tpl");
}

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.views.views_folder, "Views");
    assert_eq!(settings.views.areas_folder, "Areas");
    assert_eq!(settings.views.partials_folder, "_Partials");
    assert_eq!(settings.views.layouts_folder, "_Layouts");
    assert_eq!(settings.views.shared_folder, "_Shared");
    assert!(!settings.views.allow_controllerless);
    assert_eq!(settings.views.extension, ".hbs");
    assert_eq!(settings.views.views_sliding, Some(Duration::from_secs(300)));
    assert_eq!(settings.views.cache_key_prefix, None);
    assert_eq!(settings.cache.poll_interval_ms.get(), DEFAULT_POLL_INTERVAL_MS);
    assert_eq!(settings.cache.missing_retry_ms.get(), DEFAULT_MISSING_RETRY_MS);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn zero_sliding_disables_view_caching() {
    let mut raw = RawSettings::default();
    raw.apply_overrides(&SettingsOverrides {
        views_sliding_seconds: Some(0),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.views.views_sliding, None);
}

#[test]
fn empty_shared_folder_is_allowed() {
    let mut raw = RawSettings::default();
    raw.views.shared_folder = Some(String::new());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.views.shared_folder, "");
}

#[test]
fn extension_must_start_with_a_dot() {
    let mut raw = RawSettings::default();
    raw.views.extension = Some("hbs".to_string());
    let err = Settings::from_raw(raw).expect_err("invalid extension");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "views.extension",
            ..
        }
    ));
}

#[test]
fn cache_key_prefix_rejects_separator() {
    let mut raw = RawSettings::default();
    raw.views.cache_key_prefix = Some("a:b".to_string());
    let err = Settings::from_raw(raw).expect_err("invalid prefix");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "views.cache_key_prefix",
            ..
        }
    ));
}

#[test]
fn zero_poll_interval_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.poll_interval_ms = Some(0);
    let err = Settings::from_raw(raw).expect_err("invalid interval");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.poll_interval_ms",
            ..
        }
    ));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_overrides(&SettingsOverrides {
        log_json: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "vellum",
        "render",
        "--root",
        "/srv/site",
        "--area",
        "Admin",
        "--controller",
        "Home",
        "--layout",
        "wide",
        "--data",
        r#"{"user":"World"}"#,
        "Index",
    ]);

    match args.command {
        Command::Render(render) => {
            assert_eq!(render.root, std::path::Path::new("/srv/site"));
            assert_eq!(render.group.area.as_deref(), Some("Admin"));
            assert_eq!(render.group.controller, "Home");
            assert_eq!(render.view, "Index");
            assert_eq!(render.layout.as_deref(), Some("wide"));
            assert_eq!(render.data.as_deref(), Some(r#"{"user":"World"}"#));
            assert!(!render.partial);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn render_data_sources_conflict() {
    let result = CliArgs::try_parse_from([
        "vellum",
        "render",
        "--controller",
        "Home",
        "--data",
        "{}",
        "--data-file",
        "model.json",
        "Index",
    ]);
    assert!(result.is_err());
}

#[test]
fn parse_watch_arguments() {
    let args = CliArgs::parse_from([
        "vellum",
        "watch",
        "--controller",
        "Home",
        "--interval-ms",
        "250",
        "--cache-poll-interval-ms",
        "100",
        "Index",
    ]);

    match args.command {
        Command::Watch(watch) => {
            assert_eq!(watch.interval_ms, 250);
            assert_eq!(watch.render.view, "Index");
            assert_eq!(watch.render.overrides.poll_interval_ms, Some(100));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_paths_overrides() {
    let args = CliArgs::parse_from([
        "vellum",
        "paths",
        "--controller",
        "Home",
        "--views-allow-controllerless",
        "true",
    ]);

    match args.command {
        Command::Paths(paths) => {
            assert_eq!(paths.group.controller, "Home");
            assert_eq!(paths.overrides.allow_controllerless, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}
