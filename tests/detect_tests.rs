// End-to-end detection scenarios against a mock device

mod common;

use common::{ok, response, MockDevice};
use modemprobe::catalog::CatalogIndex;
use modemprobe::detect::{BreakerConfig, Detector};
use modemprobe::errors::DetectError;
use modemprobe::models::{Credentials, ProfileDescriptor};
use modemprobe::session::AuthKind;
use std::time::{Duration, Instant};

fn profile(json: &str) -> ProfileDescriptor {
    serde_json::from_str(json).expect("test profile json")
}

fn creds(username: &str, password: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        password: password.to_string(),
    }
}

/// Every profile in the shipped catalog resolves back to itself by name
#[test]
fn shipped_catalog_round_trips() {
    let catalog = CatalogIndex::load(std::path::Path::new("profiles"));
    assert_eq!(catalog.len(), 8);
    for descriptor in catalog.list_all() {
        let looked_up = catalog
            .lookup(&descriptor.name)
            .expect("listed profile must resolve");
        assert_eq!(looked_up.name, descriptor.name);
    }
}

/// Basic-auth device: 401 until the right Authorization header shows up
#[tokio::test]
async fn detects_basic_auth_device() {
    let device = MockDevice::spawn(|request| {
        let request_lower = request.to_lowercase();
        // admin:admin
        if request_lower.contains("authorization: basic ywrtaw46ywrtaw4=") {
            ok("<html><title>NETGEAR CM1000</title>Cable Connection CM1000</html>")
        } else {
            response(
                401,
                "Unauthorized",
                &[("WWW-Authenticate", "Basic realm=\"NETGEAR CM1000\"")],
                "<html><title>NETGEAR CM1000</title>Login required</html>",
            )
        }
    })
    .await;

    // The shipped catalog: the probe page branding should rank the Netgear
    // profile first and Basic should win on the first attempt
    let catalog = CatalogIndex::load(std::path::Path::new("profiles"));
    assert!(!catalog.is_empty(), "shipped catalog should load");

    let detector = Detector::new(&catalog);
    let detection = detector
        .detect(&device.base_url(), Some(&creds("admin", "admin")), None)
        .await
        .expect("detection should succeed");

    assert_eq!(detection.profile.name, "Netgear CM1000");
    assert_eq!(detection.session.kind(), AuthKind::Basic);
    // The confirm fetch is recorded for the extraction layer
    assert!(detection.session.resources().contains_key("/DocsisStatus.htm"));
}

fn hnap_profiles() -> Vec<ProfileDescriptor> {
    vec![
        profile(
            r#"{
                "name": "Motorola MB7621",
                "manufacturer": "Motorola",
                "model": "MB7621",
                "status": "released",
                "auth": {"strategy": "hnap", "hmac": "md5", "noop": "empty_string"},
                "pages": {"data": {"software_status": "GetMotoStatusSoftware"}},
                "detection": {
                    "pre_auth": ["HNAP", "purenetworks.com/HNAP1"],
                    "post_auth": ["MB7621"]
                }
            }"#,
        ),
        profile(
            r#"{
                "name": "Motorola MB8600",
                "manufacturer": "Motorola",
                "model": "MB8600",
                "status": "verified",
                "auth": {"strategy": "hnap", "hmac": "sha256", "noop": "empty_object"},
                "pages": {"data": {"software_status": "GetMotoStatusSoftware"}},
                "detection": {
                    "pre_auth": ["HNAP", "purenetworks.com/HNAP1"],
                    "post_auth": ["MB8600"]
                }
            }"#,
        ),
    ]
}

/// Two HNAP profiles share every phase-1 marker; the authenticated data
/// fetch carries the model string that settles which one this device is
#[tokio::test]
async fn phase_two_narrows_shared_hnap_markers() {
    let device = MockDevice::spawn(|request| {
        if request.starts_with("GET / ") {
            return ok("<html><title>Login</title>HNAP purenetworks.com/HNAP1</html>");
        }
        if request.contains("\"Action\":\"request\"") {
            return ok(
                r#"{"LoginResponse":{"Challenge":"c9f0a1","PublicKey":"pk77","Cookie":"uid42","LoginResult":"OK"}}"#,
            );
        }
        if request.contains("\"Action\":\"login\"") {
            return ok(r#"{"LoginResponse":{"LoginResult":"OK"}}"#);
        }
        if request.contains("GetMultipleHNAPs") {
            return ok(
                r#"{"GetMultipleHNAPsResponse":{"GetMotoStatusSoftwareResponse":{"StatusSoftwareModelName":"MB8600"}}}"#,
            );
        }
        response(404, "Not Found", &[], "")
    })
    .await;

    let catalog = CatalogIndex::from_descriptors(hnap_profiles());
    let detector = Detector::new(&catalog);
    let detection = detector
        .detect(&device.base_url(), Some(&creds("admin", "motorola")), None)
        .await
        .expect("detection should succeed");

    // Catalog order tried MB7621 first; post-auth evidence supersedes it
    assert_eq!(detection.profile.name, "Motorola MB8600");
    assert_eq!(detection.session.kind(), AuthKind::Hnap);
    assert!(detection
        .session
        .resources()
        .contains_key("hnap:batch"));
}

/// A device that rejects the derived login credential must end in a
/// classified failure, not a hang - the algorithm-mismatch case
#[tokio::test]
async fn hnap_algorithm_mismatch_terminates() {
    let device = MockDevice::spawn(|request| {
        if request.starts_with("GET / ") {
            return ok("<html>HNAP purenetworks.com/HNAP1</html>");
        }
        if request.contains("\"Action\":\"request\"") {
            return ok(
                r#"{"LoginResponse":{"Challenge":"c9f0a1","PublicKey":"pk77","Cookie":"uid42","LoginResult":"OK"}}"#,
            );
        }
        // An SHA-256-only firmware never accepts an MD5-derived credential
        ok(r#"{"LoginResponse":{"LoginResult":"FAILED"}}"#)
    })
    .await;

    let catalog = CatalogIndex::from_descriptors(vec![profile(
        r#"{
            "name": "Motorola MB7621",
            "manufacturer": "Motorola",
            "model": "MB7621",
            "status": "released",
            "auth": {"strategy": "hnap", "hmac": "md5", "noop": "empty_string"},
            "detection": {"pre_auth": ["HNAP"]}
        }"#,
    )]);
    let detector = Detector::new(&catalog);
    let err = detector
        .detect(&device.base_url(), Some(&creds("admin", "motorola")), None)
        .await
        .expect_err("mismatched algorithm must fail");

    assert!(
        matches!(err, DetectError::Auth { scheme: "hnap", .. }),
        "got {err:?}"
    );
}

/// Every attempt fails at the connection level: the breaker must trip at
/// exactly the configured attempt budget
#[tokio::test]
async fn breaker_trips_after_ten_connection_failures() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let base_url = format!("http://127.0.0.1:{}", port);

    let profiles: Vec<ProfileDescriptor> = (0..12)
        .map(|i| {
            profile(&format!(
                r#"{{
                    "name": "Vendor Model-{i}",
                    "manufacturer": "Vendor",
                    "model": "Model-{i}",
                    "status": "released",
                    "auth": {{
                        "strategy": "form",
                        "path": "/login.html",
                        "username_field": "user",
                        "password_field": "pass"
                    }}
                }}"#
            ))
        })
        .collect();
    let catalog = CatalogIndex::from_descriptors(profiles);

    let detector = Detector::new(&catalog)
        .with_breaker(BreakerConfig {
            max_attempts: 10,
            max_elapsed: Duration::from_secs(60),
        })
        .with_timeouts(
            Duration::from_secs(2),
            Duration::from_secs(1),
            Duration::from_millis(500),
        );
    let err = detector
        .detect(&base_url, Some(&creds("admin", "admin")), None)
        .await
        .expect_err("unreachable device must fail");

    match err {
        DetectError::BreakerTripped { attempts, elapsed } => {
            assert_eq!(attempts, 10);
            assert!(elapsed <= Duration::from_secs(60));
        }
        other => panic!("expected breaker trip, got {other:?}"),
    }
}

/// Form login with base64 encoding: the POST body must carry the encoded
/// password, never the literal one
#[tokio::test]
async fn form_post_sends_base64_password() {
    let device = MockDevice::spawn(|request| {
        if request.starts_with("GET /login.html") {
            return ok(r#"<html><form method="post" action="/goform/login"></form></html>"#);
        }
        if request.starts_with("POST /goform/login") {
            return ok("<html>Welcome to device status</html>");
        }
        ok("<html><title>ACME Modem</title></html>")
    })
    .await;

    let catalog = CatalogIndex::from_descriptors(vec![profile(
        r#"{
            "name": "ACME M1",
            "manufacturer": "ACME",
            "model": "M1",
            "status": "released",
            "auth": {
                "strategy": "form",
                "path": "/login.html",
                "username_field": "loginUsername",
                "password_field": "loginPassword",
                "password_encoding": "base64",
                "success_marker": "Welcome"
            },
            "detection": {"pre_auth": ["ACME"]}
        }"#,
    )]);
    let detector = Detector::new(&catalog);
    let detection = detector
        .detect(&device.base_url(), Some(&creds("admin", "password")), None)
        .await
        .expect("detection should succeed");

    assert_eq!(detection.profile.name, "ACME M1");
    let login_post = device
        .requests()
        .into_iter()
        .find(|r| r.starts_with("POST /goform/login"))
        .expect("login POST was sent");
    // "cGFzc3dvcmQ=" with the padding percent-encoded by the form encoder
    assert!(login_post.contains("loginPassword=cGFzc3dvcmQ%3D"));
    assert!(!login_post.contains("loginPassword=password"));
}

/// Without credentials the url_token variant still yields a session, so
/// fingerprinting of cookie-gated devices can proceed
#[tokio::test]
async fn url_token_probe_succeeds_without_credentials() {
    let device = MockDevice::spawn(|request| {
        if request.starts_with("GET /index.html") {
            return response(
                200,
                "OK",
                &[
                    ("Content-Type", "text/html"),
                    ("Set-Cookie", "session=tok123; Path=/"),
                ],
                "<html><title>Hitron CGNV4</title>Login</html>",
            );
        }
        if request.starts_with("GET /data/getSysInfo.asp?sid=tok123") {
            return ok(r#"{"modelName":"CGNV4","swVersion":"4.5.10"}"#);
        }
        ok("<html><title>Hitron CGNV4</title></html>")
    })
    .await;

    let catalog = CatalogIndex::from_descriptors(vec![profile(
        r#"{
            "name": "Hitron CGNV4",
            "manufacturer": "Hitron",
            "model": "CGNV4",
            "status": "in_development",
            "auth": {
                "strategy": "url_token",
                "login_path": "/index.html",
                "data_path": "/data/getSysInfo.asp",
                "link_prefix": "/goform/session",
                "token_prefix": "?sid=",
                "cookie_name": "session"
            },
            "pages": {"data": {"system_info": "/data/getSysInfo.asp"}},
            "detection": {"pre_auth": ["Hitron"], "post_auth": ["CGNV4"]}
        }"#,
    )]);
    let detector = Detector::new(&catalog);
    let detection = detector
        .detect(&device.base_url(), None, None)
        .await
        .expect("credential-less probe should succeed");

    assert_eq!(detection.profile.name, "Hitron CGNV4");
    assert_eq!(detection.session.kind(), AuthKind::UrlToken);
    // The data fetch carried the cookie-derived token in the URL
    assert!(device
        .requests()
        .iter()
        .any(|r| r.starts_with("GET /data/getSysInfo.asp?sid=tok123")));
}

/// A caller deadline in the past cancels before any attempt, and is never
/// reported as a breaker trip
#[tokio::test]
async fn expired_deadline_cancels_not_trips() {
    let catalog = CatalogIndex::from_descriptors(vec![profile(
        r#"{
            "name": "ACME M1",
            "manufacturer": "ACME",
            "model": "M1",
            "status": "released",
            "auth": {"strategy": "none"}
        }"#,
    )]);
    let detector = Detector::new(&catalog)
        .with_deadline(Instant::now() - Duration::from_millis(1))
        .with_timeouts(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_millis(200),
        );
    let err = detector
        .detect("http://127.0.0.1:9", None, None)
        .await
        .expect_err("expired deadline must cancel");
    assert!(matches!(err, DetectError::Cancelled), "got {err:?}");
}

/// A cached hint from an earlier detection is attempted before anything
/// else, skipping the ranking entirely
#[tokio::test]
async fn cached_hint_is_tried_first() {
    let device = MockDevice::spawn(|request| {
        if request.to_lowercase().contains("authorization: basic") {
            return ok("<html>CM1000 status</html>");
        }
        if request.starts_with("GET / ") {
            return ok("<html><title>nothing identifying</title></html>");
        }
        response(401, "Unauthorized", &[], "")
    })
    .await;

    let catalog = CatalogIndex::from_descriptors(vec![
        profile(
            r#"{
                "name": "ACME Other",
                "manufacturer": "ACME",
                "model": "Other",
                "status": "released",
                "auth": {
                    "strategy": "form",
                    "path": "/nope.html",
                    "username_field": "u",
                    "password_field": "p",
                    "success_marker": "never-present"
                }
            }"#,
        ),
        profile(
            r#"{
                "name": "Netgear CM1000",
                "manufacturer": "Netgear",
                "model": "CM1000",
                "status": "verified",
                "auth": {"strategy": "basic"},
                "pages": {"protected": ["/DocsisStatus.htm"]},
                "detection": {"post_auth": ["CM1000"]}
            }"#,
        ),
    ]);

    let detector = Detector::new(&catalog);
    let detection = detector
        .detect(
            &device.base_url(),
            Some(&creds("admin", "admin")),
            Some("Netgear CM1000"),
        )
        .await
        .expect("hinted detection should succeed");

    assert_eq!(detection.profile.name, "Netgear CM1000");
    // The hinted profile authenticated on the very first attempt; the form
    // profile's login page was never requested
    assert!(device
        .requests()
        .iter()
        .all(|r| !r.starts_with("GET /nope.html")));
}
