//! End-to-end tests for the request facade
//!
//! Requests are built the way a server would hand them over: an
//! `http::Request` carrying a `Connection` extension, converted into a
//! `RawRequest` and wrapped in a `Request`.

use reqlens::prelude::*;
use std::net::IpAddr;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn local_connection() -> Connection {
    Connection::new("127.0.0.1:54321".parse().unwrap())
}

fn incoming(uri: &str, headers: &[(&str, &str)]) -> Request {
    init_tracing();
    let mut builder = reqlens::http::Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let mut req = builder.body(()).unwrap();
    req.extensions_mut().insert(local_connection());
    Request::new(RawRequest::from(req)).unwrap()
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

// ============================================================================
// Input
// ============================================================================

mod input_tests {
    use super::*;

    #[test]
    fn test_query_string() {
        let request = incoming("/?name=foo", &[]);
        assert_eq!(request.get(), &object(json!({ "name": "foo" })));
    }

    #[test]
    fn test_missing_query_string_is_empty() {
        let request = incoming("/", &[]);
        assert!(request.get().is_empty());
    }

    #[test]
    fn test_post_body() {
        let mut request = incoming("/", &[]);
        request.set_body(object(json!({ "name": "foo" })));
        assert_eq!(request.post(), &object(json!({ "name": "foo" })));
    }

    #[test]
    fn test_missing_post_body_is_empty() {
        let request = incoming("/", &[]);
        assert!(request.post().is_empty());
    }

    #[test]
    fn test_input_reads_query() {
        let request = incoming("/?name=foo", &[]);
        assert_eq!(request.input("name"), Some(json!("foo")));
    }

    #[test]
    fn test_input_missing_key() {
        let request = incoming("/", &[]);
        assert_eq!(request.input("name"), None);
    }

    #[test]
    fn test_all_merges_query_and_body() {
        let mut request = incoming("/?name=foo", &[]);
        request.set_body(object(json!({ "age": 22 })));
        assert_eq!(request.all(), object(json!({ "name": "foo", "age": 22 })));
    }
}

// ============================================================================
// Headers and transport
// ============================================================================

mod header_tests {
    use super::*;

    #[test]
    fn test_all_headers() {
        let request = incoming("/", &[("username", "admin")]);
        assert_eq!(
            request.headers().get("username").and_then(|v| v.to_str().ok()),
            Some("admin")
        );
    }

    #[test]
    fn test_single_header() {
        let request = incoming("/", &[("username", "admin")]);
        assert_eq!(request.header("username"), Some("admin"));
        assert_eq!(request.header("UserName"), Some("admin"));
    }

    #[test]
    fn test_ajax() {
        let request = incoming("/", &[("X-Requested-With", "xmlhttprequest")]);
        assert!(request.ajax());
        assert!(!incoming("/", &[]).ajax());
    }

    #[test]
    fn test_pjax() {
        let request = incoming("/", &[("X-PJAX", "true")]);
        assert!(request.pjax());
    }

    #[test]
    fn test_hostname_without_host() {
        let request = incoming("/", &[]);
        assert_eq!(request.hostname(), None);
    }

    #[test]
    fn test_url_and_original_url() {
        let request = incoming("/?query=string", &[]);
        assert_eq!(request.url(), "/");
        assert_eq!(request.original_url(), "/?query=string");
    }

    #[test]
    fn test_method() {
        assert_eq!(incoming("/", &[]).method(), "GET");
    }

    #[test]
    fn test_secure_over_tls() {
        let mut req = reqlens::http::Request::builder()
            .uri("/")
            .body(())
            .unwrap();
        req.extensions_mut().insert(local_connection().encrypted(true));
        let request = Request::new(RawRequest::from(req)).unwrap();

        assert!(request.secure());
        assert_eq!(request.protocol(), "https");
        assert!(!incoming("/", &[]).secure());
    }

    #[test]
    fn test_subdomains_from_bare_url() {
        let request = Request::new(RawRequest::from_url("http://virk.abc.com")).unwrap();
        assert_eq!(request.subdomains(), vec!["virk"]);
    }

    #[test]
    fn test_subdomain_offset_from_config() {
        let config = RequestConfig::new().subdomain_offset(3);
        let raw = RawRequest::builder()
            .uri("/")
            .header("host", "shop.abc.co.uk")
            .build()
            .unwrap();
        let request = Request::with_config(raw, config).unwrap();
        assert_eq!(request.subdomains(), vec!["shop"]);
    }
}

// ============================================================================
// Freshness and negotiation
// ============================================================================

mod protocol_tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_fresh_with_wildcard_etag() {
        let request = incoming("/", &[("if-none-match", "*")]);
        let validators = ResponseValidators::new().etag("\"abc\"");
        assert!(request.fresh(&validators));
        assert!(!request.stale(&validators));
    }

    #[test]
    fn test_not_fresh_without_conditionals() {
        let request = incoming("/", &[]);
        assert!(!request.fresh(&ResponseValidators::new()));
        assert!(request.stale(&ResponseValidators::new()));
    }

    #[test]
    fn test_fresh_by_modification_date() {
        let request = incoming("/", &[("if-modified-since", "Sat, 01 Jan 2022 00:00:00 GMT")]);
        let older = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();

        assert!(request.fresh(&ResponseValidators::new().last_modified(older)));
        assert!(request.stale(&ResponseValidators::new().last_modified(newer)));
    }

    #[test]
    fn test_is_matches_content_type() {
        let request = incoming("/", &[("content-type", "text/html")]);
        assert_eq!(request.is(&["html"]), Some("html"));
        assert_eq!(request.is(&["json"]), None);
    }

    #[test]
    fn test_accepts_without_accept_header() {
        let request = incoming("/", &[("accepts", "text/html")]);
        assert_eq!(request.accepts(&["html"]), Some("html"));
    }

    #[test]
    fn test_accepts_prefers_quality() {
        let request = incoming("/", &[("accept", "text/html;q=0.5, application/json")]);
        assert_eq!(request.accepts(&["html", "json"]), Some("json"));
        assert_eq!(request.types(), vec!["application/json", "text/html"]);
    }

    #[test]
    fn test_language_and_encoding() {
        let request = incoming(
            "/",
            &[
                ("accept-language", "fr-CH, fr;q=0.9, en;q=0.8"),
                ("accept-encoding", "gzip, identity;q=0"),
            ],
        );
        assert_eq!(request.language(&["en", "fr"]), Some("fr"));
        assert_eq!(request.encoding(&["identity", "gzip"]), Some("gzip"));
        assert_eq!(request.encoding(&["identity"]), None);
    }
}

// ============================================================================
// Addresses
// ============================================================================

mod address_tests {
    use super::*;

    fn localhost() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn test_ip() {
        assert_eq!(incoming("/", &[]).ip(), Some(localhost()));
    }

    #[test]
    fn test_ips() {
        assert_eq!(incoming("/", &[]).ips(), vec![localhost()]);
    }

    #[test]
    fn test_forwarded_for_requires_trust() {
        let headers = [("x-forwarded-for", "203.0.113.9, 10.0.0.1")];
        assert_eq!(incoming("/", &headers).ip(), Some(localhost()));

        let raw = RawRequest::builder()
            .uri("/")
            .header(headers[0].0, headers[0].1)
            .connection(local_connection())
            .build()
            .unwrap();
        let config = RequestConfig::new().trust_proxy(TrustProxy::Addresses(vec![localhost()]));
        let request = Request::with_config(raw, config).unwrap();

        assert_eq!(request.ip(), Some("203.0.113.9".parse().unwrap()));
        assert_eq!(request.ips().len(), 2);
    }
}

// ============================================================================
// Cookies and params
// ============================================================================

mod state_tests {
    use super::*;

    #[test]
    fn test_cookies() {
        let request = incoming("/", &[("cookie", "name=foo")]);
        assert_eq!(request.cookies().get("name"), Some("foo"));
        assert_eq!(request.cookies().len(), 1);
    }

    #[test]
    fn test_cookies_are_not_reparsed() {
        let mut request = incoming("/", &[("cookie", "name=foo")]);
        request.cookies();
        request.cookies_mut().insert("age", "22");

        let cookies = request.cookies();
        assert_eq!(cookies.get("name"), Some("foo"));
        assert_eq!(cookies.get("age"), Some("22"));
    }

    #[test]
    fn test_cookie_value() {
        let request = incoming("/", &[("cookie", "name=foo")]);
        assert_eq!(request.cookie("name"), Some("foo"));
        assert_eq!(request.cookie("age"), None);
    }

    #[test]
    fn test_params() {
        let mut request = incoming("/", &[]);
        request.set_params([("id", 1)].into_iter().collect());
        assert_eq!(request.params().to_map(), object(json!({ "id": 1 })));
        assert_eq!(request.param("id"), Some(&json!(1)));
        assert_eq!(request.param("foo"), None);
    }

    #[test]
    fn test_missing_params_are_empty() {
        let request = incoming("/", &[]);
        assert!(request.params().is_empty());
        assert_eq!(request.param("id"), None);
    }
}

// ============================================================================
// Uploads
// ============================================================================

mod upload_tests {
    use super::*;

    fn with_uploads(descriptors: Vec<FileDescriptor>) -> Request {
        let mut request = incoming("/", &[]);
        request.set_files(descriptors.into_iter().collect());
        request
    }

    #[test]
    fn test_uploaded_file() {
        let request = with_uploads(vec![FileDescriptor::new(
            "logo",
            "npm-logo.svg",
            "/tmp/upload_logo",
            1024,
        )
        .content_type("image/svg+xml")]);

        let logo = request.file("logo");
        assert!(logo.exists());
        assert_eq!(logo.client_name(), Some("npm-logo.svg"));
        assert_eq!(logo.extname().as_deref(), Some("svg"));
    }

    #[test]
    fn test_absent_file() {
        let request = incoming("/", &[]);
        let logo = request.file("logo");
        assert!(!logo.exists());
        assert!(logo.errors().is_empty());
    }

    #[test]
    fn test_all_files() {
        let request = with_uploads(vec![
            FileDescriptor::new("logo", "npm-logo.svg", "/tmp/upload_logo", 1024),
            FileDescriptor::new("favicon", "favicon.ico", "/tmp/upload_favicon", 64),
        ]);

        let names: Vec<String> = request
            .files()
            .iter()
            .map(|f| f.field_name().to_string())
            .collect();
        assert_eq!(names, vec!["logo", "favicon"]);
    }

    #[test]
    fn test_files_are_first_read_wins() {
        let mut request = with_uploads(vec![FileDescriptor::new(
            "logo",
            "npm-logo.svg",
            "/tmp/upload_logo",
            1024,
        )]);
        assert_eq!(request.files().len(), 1);

        request.set_files(FileBag::new());
        assert_eq!(request.files().len(), 1);
    }

    #[tokio::test]
    async fn test_validated_move() {
        let scratch = tempfile::tempdir().unwrap();
        let tmp_path = scratch.path().join("upload_logo");
        tokio::fs::write(&tmp_path, b"<svg/>").await.unwrap();

        let mut request = incoming("/", &[]);
        request.set_files(
            [FileDescriptor::new("logo", "npm-logo.svg", &tmp_path, 6)]
                .into_iter()
                .collect(),
        );

        let mut logo = request.file("logo");
        logo.set_validation_options(&FileValidationOptions::new().size(1024).extnames(["svg"]));
        assert!(logo.move_to(scratch.path().join("public"), Some("logo.svg")).await);
        assert_eq!(logo.file_name(), Some("logo.svg"));
        assert!(scratch.path().join("public/logo.svg").exists());
    }

    #[test]
    fn test_invalid_upload_reports_errors() {
        let request = with_uploads(vec![FileDescriptor::new(
            "avatar",
            "me.gif",
            "/tmp/upload_avatar",
            4096,
        )]);

        let mut avatar = request.file("avatar");
        avatar.validate_with(&FileValidationOptions::new().size(1024).extnames(["png"]));
        let kinds: Vec<FileErrorKind> = avatar.errors().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![FileErrorKind::Size, FileErrorKind::Extname]);

        let summary = reqlens::serde_json::to_value(&avatar).unwrap();
        assert_eq!(summary["status"], "error");
    }
}
