//! Tests for the template renderer

use super::*;
use chrono::{Duration, TimeZone};
use proptest::prelude::*;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn ctx_with<T: Serialize>(key: &str, value: &T) -> TeraContext {
    let mut ctx = TeraContext::new();
    ctx.insert(key, value);
    ctx
}

#[test]
fn test_embedded_templates_load() {
    let renderer = Renderer::new(None).unwrap();

    for name in [
        "base.html",
        "pages/home.html",
        "pages/blog/blog.html",
        "pages/blog/_posts.html",
        "pages/blog/single_blog.html",
        ERROR_TEMPLATE,
        "admin/login.html",
        "admin/dashboard.html",
    ] {
        assert!(renderer.has_template(name), "missing template {name}");
    }
}

#[test]
fn test_override_directory_replaces_template() {
    let temp_dir = TempDir::new().unwrap();
    let pages = temp_dir.path().join("pages");
    fs::create_dir_all(&pages).unwrap();
    fs::write(pages.join("home.html"), "custom home {{ year }}").unwrap();

    let renderer = Renderer::new(Some(temp_dir.path())).unwrap();
    let html = renderer
        .render("pages/home.html", &ctx_with("year", &2024))
        .unwrap();

    assert_eq!(html, "custom home 2024");
}

#[test]
fn test_missing_override_directory_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let renderer = Renderer::new(Some(&temp_dir.path().join("absent"))).unwrap();
    assert!(renderer.has_template("base.html"));
}

#[test]
fn test_static_function() {
    let renderer = Renderer::from_templates([
        ("a.html", r#"{{ static(path="css/styles.css") }}"#),
        ("b.html", r#"{{ static(path="/already/absolute.js") }}"#),
        ("link.html", r#"<link href="{{ static(path='css/styles.css') }}">"#),
    ])
    .unwrap();

    let ctx = TeraContext::new();
    assert_eq!(renderer.render("a.html", &ctx).unwrap(), "/static/css/styles.css");
    assert_eq!(renderer.render("b.html", &ctx).unwrap(), "/already/absolute.js");
    assert_eq!(
        renderer.render("link.html", &ctx).unwrap(),
        r#"<link href="/static/css/styles.css">"#
    );
}

#[test]
fn test_get_version_function() {
    let renderer = Renderer::from_templates([
        ("plain.html", "{{ get_version() }}"),
        ("prefixed.html", r#"{{ get_version(prefix="v") }}"#),
    ])
    .unwrap();

    let ctx = TeraContext::new();
    let version = env!("CARGO_PKG_VERSION");
    assert_eq!(renderer.render("plain.html", &ctx).unwrap(), version);
    assert_eq!(
        renderer.render("prefixed.html", &ctx).unwrap(),
        format!("v{}", version)
    );
}

#[test]
fn test_days_ago_values() {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    let at = |d: DateTime<Utc>| json!(d.to_rfc3339());

    assert_eq!(days_ago_from(&at(now - Duration::hours(3)), now), "Today");
    assert_eq!(days_ago_from(&at(now - Duration::hours(30)), now), "Yesterday");
    assert_eq!(days_ago_from(&at(now - Duration::days(10)), now), "10 days ago");
    assert_eq!(days_ago_from(&json!("2024-06-10 12:00:00"), now), "5 days ago");
}

#[test]
fn test_days_ago_rejects_non_dates() {
    let now = Utc::now();
    assert_eq!(days_ago_from(&json!(42), now), "UNKNOWN days ago");
    assert_eq!(days_ago_from(&json!("yesterday-ish"), now), "UNKNOWN days ago");
    assert_eq!(days_ago_from(&Value::Null, now), "UNKNOWN days ago");
}

#[test]
fn test_days_ago_filter_in_template() {
    let renderer =
        Renderer::from_templates([("t.html", "{{ when | days_ago }}")]).unwrap();
    let html = renderer
        .render("t.html", &ctx_with("when", &Utc::now()))
        .unwrap();
    assert_eq!(html, "Today");
}

#[test]
fn test_render_error_chains_causes() {
    let renderer = Renderer::from_templates([("t.html", "{{ missing.field }}")]).unwrap();
    let err = renderer.render("t.html", &TeraContext::new()).unwrap_err();

    let message = err.to_string();
    assert!(message.contains("Failed to render 't.html'"));
    assert!(matches!(err, RenderError::Template(_)));
}

#[test]
fn test_render_error_page_uses_template() {
    let renderer = Renderer::new(None).unwrap();
    let html = renderer.render_error_page(404, "Not Found", None);
    assert!(html.contains("404"));
    assert!(html.contains("Not Found"));
}

#[test]
fn test_render_error_page_falls_back() {
    let renderer =
        Renderer::from_templates([(ERROR_TEMPLATE, "{{ undefined_var.nested }}")]).unwrap();
    let html = renderer.render_error_page(500, "<boom>", None);

    assert!(html.contains("<h1>500</h1>"));
    assert!(html.contains("&lt;boom&gt;"));
}

#[test]
fn test_page_context() {
    let ctx = PageContext::new("/blog/", true, &Authentication::anonymous()).into_context();
    let json = ctx.into_json();
    assert_eq!(json["request_path"], "/blog/");
    assert_eq!(json["is_htmx"], true);
    assert_eq!(json["current_user"], Value::Null);
    assert_eq!(json["is_admin"], false);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn prop_days_ago_counts_whole_days(days in 2i64..3650, extra_hours in 0i64..23) {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let then = now - Duration::days(days) - Duration::hours(extra_hours);
        prop_assert_eq!(
            days_ago_from(&json!(then.to_rfc3339()), now),
            format!("{} days ago", days)
        );
    }

    #[test]
    fn prop_static_path_prefixes_relative(path in "[a-z]{1,8}(/[a-z]{1,8}){0,3}\\.(css|js|png)") {
        prop_assert_eq!(static_path(&path), format!("/static/{}", path));
    }
}
