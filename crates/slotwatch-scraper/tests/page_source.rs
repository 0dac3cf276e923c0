//! Integration tests for `PageSource` and `ExportSource`.
//!
//! `PageSource` tests stand up a `wiremock` server playing the booking site:
//! a GET for the landing page followed by a POST of the doctor search form.

use std::path::Path;
use std::time::{Duration, SystemTime};

use slotwatch_core::{FetchMode, SlotRecord};
use slotwatch_scraper::{
    artifacts, ExportSource, PageClient, PageSource, ScraperError, SearchForm, SlotSource,
    SlotsExport,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOOKING_PATH: &str = "/reserva-de-horas/";

const LANDING_PAGE: &str = r#"<html><body>
    <form id="search"><select name="prevision"><option>FONASA</option></select>
    <input name="apellido"></form></body></html>"#;

const RESULTS_PAGE: &str = r#"<html><body><table>
    <thead><tr><th>Profesional</th><th>Especialidad</th><th>Centro</th><th>Hora</th></tr></thead>
    <tbody>
      <tr><td>Dr. Juan Alvarez</td><td>Medicina General</td><td>Centro</td><td>15/06/2025 09:00</td>
          <td><form><input type="hidden" name="ID_AGENDA" value="991"></form></td></tr>
      <tr><td>Dra. Ana Perez</td><td>Pediatría</td><td>Norte</td><td>16/06/2025 10:30</td></tr>
    </tbody></table></body></html>"#;

const CAPTCHA_PAGE: &str = r#"<html><body>
    <div class="g-recaptcha" data-sitekey="abc"></div></body></html>"#;

/// Results page for a search with no openings, including the site's search
/// form with its invisible reCAPTCHA submit button.
const NO_OPENINGS_PAGE: &str = r#"<html><head>
    <script src="https://www.google.com/recaptcha/api.js" async defer></script>
    <script>function onSubmitDoctor(token) { document.getElementById("buscar").submit(); }</script>
    </head><body>
    <form id="buscar" method="post">
      <select name="prevision"><option>FONASA</option></select>
      <input name="apellido" value="Alvarez">
      <button class="g-recaptcha" data-sitekey="abc" data-callback="onSubmitDoctor">Buscar</button>
    </form>
    <table class="table"><thead><tr><th>Profesional</th><th>Hora</th></tr></thead>
      <tbody></tbody></table>
    <p>No hay horas disponibles</p>
    </body></html>"#;

fn form() -> SearchForm {
    SearchForm {
        prevision: "FONASA".to_owned(),
        apellido: "Alvarez".to_owned(),
    }
}

/// Builds a headless `PageSource` against the mock server with no backoff.
fn test_source(server: &MockServer, artifacts: &Path, nav_attempts: u32) -> PageSource {
    let url = format!("{}{BOOKING_PATH}", server.uri());
    let client = PageClient::new(&url, 5, "slotwatch-test/0.1", nav_attempts, 0)
        .expect("failed to build test PageClient");
    PageSource::new(client, form(), artifacts.to_path_buf(), FetchMode::Headless)
}

async fn mount_landing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(BOOKING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_PAGE))
        .mount(server)
        .await;
}

fn artifact_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// PageSource – happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_extracts_slots_from_search_results() {
    let server = MockServer::start().await;
    let artifacts = tempfile::tempdir().unwrap();
    mount_landing(&server).await;

    Mock::given(method("POST"))
        .and(path(BOOKING_PATH))
        .and(body_string_contains("apellido=Alvarez"))
        .and(body_string_contains("prevision=FONASA"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let source = test_source(&server, artifacts.path(), 1);
    let result = source.fetch().await;

    assert!(result.is_ok(), "expected Ok, got: {result:?}");
    let fetched = result.unwrap();
    assert!(!fetched.failure_detected);
    assert_eq!(fetched.slots.len(), 2);
    assert_eq!(fetched.slots[0].provider, "Dr. Juan Alvarez");
    assert_eq!(fetched.slots[0].time_raw, "15/06/2025 09:00");
    assert_eq!(fetched.slots[0].extra["ID_AGENDA"], "991");
    assert_eq!(fetched.slots[1].provider, "Dra. Ana Perez");
    assert!(fetched.url.ends_with(BOOKING_PATH));
    assert!(
        artifact_names(artifacts.path()).is_empty(),
        "a clean fetch must not write artifacts"
    );
}

#[tokio::test]
async fn empty_results_without_captcha_are_not_a_failure() {
    let server = MockServer::start().await;
    let artifacts = tempfile::tempdir().unwrap();
    mount_landing(&server).await;

    Mock::given(method("POST"))
        .and(path(BOOKING_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<p>No hay horas disponibles</p>"),
        )
        .mount(&server)
        .await;

    let fetched = test_source(&server, artifacts.path(), 1)
        .fetch()
        .await
        .unwrap();
    assert!(fetched.slots.is_empty());
    assert!(!fetched.failure_detected);
}

// ---------------------------------------------------------------------------
// PageSource – CAPTCHA wall
// ---------------------------------------------------------------------------

#[tokio::test]
async fn captcha_page_sets_failure_and_saves_snapshot() {
    let server = MockServer::start().await;
    let artifacts = tempfile::tempdir().unwrap();
    mount_landing(&server).await;

    Mock::given(method("POST"))
        .and(path(BOOKING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(CAPTCHA_PAGE))
        .mount(&server)
        .await;

    let fetched = test_source(&server, artifacts.path(), 1)
        .fetch()
        .await
        .unwrap();

    assert!(fetched.failure_detected);
    assert!(fetched.slots.is_empty());
    let names = artifact_names(artifacts.path());
    assert_eq!(names.len(), 1, "expected one snapshot, got: {names:?}");
    assert!(names[0].starts_with("submit_failure_page_"));
    assert!(names[0].ends_with(".html"));
}

#[tokio::test]
async fn no_openings_page_with_search_form_is_not_a_failure() {
    let server = MockServer::start().await;
    let artifacts = tempfile::tempdir().unwrap();
    mount_landing(&server).await;

    Mock::given(method("POST"))
        .and(path(BOOKING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(NO_OPENINGS_PAGE))
        .mount(&server)
        .await;

    let fetched = test_source(&server, artifacts.path(), 1)
        .fetch()
        .await
        .unwrap();
    assert!(fetched.slots.is_empty());
    assert!(!fetched.failure_detected);
    assert!(
        artifact_names(artifacts.path()).is_empty(),
        "no snapshot for a page without openings"
    );
}

#[tokio::test]
async fn captcha_marker_next_to_rows_is_ignored() {
    let server = MockServer::start().await;
    let artifacts = tempfile::tempdir().unwrap();
    mount_landing(&server).await;

    let page = format!("{RESULTS_PAGE}<script src=\"https://www.google.com/recaptcha/api.js\"></script>");
    Mock::given(method("POST"))
        .and(path(BOOKING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;

    let fetched = test_source(&server, artifacts.path(), 1)
        .fetch()
        .await
        .unwrap();
    assert!(!fetched.failure_detected);
    assert_eq!(fetched.slots.len(), 2);
}

// ---------------------------------------------------------------------------
// PageSource – navigation retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn navigation_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    let artifacts = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(BOOKING_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_landing(&server).await;

    Mock::given(method("POST"))
        .and(path(BOOKING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS_PAGE))
        .mount(&server)
        .await;

    let result = test_source(&server, artifacts.path(), 3).fetch().await;
    assert!(result.is_ok(), "expected Ok after retries, got: {result:?}");
    assert_eq!(result.unwrap().slots.len(), 2);
}

#[tokio::test]
async fn navigation_exhaustion_propagates_error_and_saves_snapshot() {
    let server = MockServer::start().await;
    let artifacts = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(BOOKING_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("<h1>Bad Gateway</h1>"))
        .expect(2)
        .mount(&server)
        .await;

    let result = test_source(&server, artifacts.path(), 2).fetch().await;

    match result {
        Err(ScraperError::UnexpectedStatus { status, .. }) => assert_eq!(status, 502),
        other => panic!("expected UnexpectedStatus, got: {other:?}"),
    }
    let names = artifact_names(artifacts.path());
    assert_eq!(names.len(), 1, "expected one snapshot, got: {names:?}");
    assert!(names[0].starts_with("nav_failure_page_"));
    let saved = std::fs::read_to_string(artifacts.path().join(&names[0])).unwrap();
    assert_eq!(saved, "<h1>Bad Gateway</h1>");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    let artifacts = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(BOOKING_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let result = test_source(&server, artifacts.path(), 3).fetch().await;
    assert!(
        matches!(result, Err(ScraperError::UnexpectedStatus { status: 403, .. })),
        "expected 403, got: {result:?}"
    );
}

#[tokio::test]
async fn rate_limit_on_search_reports_retry_after() {
    let server = MockServer::start().await;
    let artifacts = tempfile::tempdir().unwrap();
    mount_landing(&server).await;

    Mock::given(method("POST"))
        .and(path(BOOKING_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&server)
        .await;

    let result = test_source(&server, artifacts.path(), 1).fetch().await;
    match result {
        Err(ScraperError::RateLimited {
            retry_after_secs, ..
        }) => assert_eq!(retry_after_secs, 30),
        other => panic!("expected RateLimited, got: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// ExportSource
// ---------------------------------------------------------------------------

fn set_mtime(path: &Path, modified: SystemTime) {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .unwrap();
    file.set_modified(modified).unwrap();
}

fn write_export(dir: &Path, name: &str, slots: Vec<SlotRecord>, modified: SystemTime) {
    let export = SlotsExport {
        doctor: "Alvarez".to_owned(),
        slots,
        url: "https://www.centromed.cl/reserva-de-horas/".to_owned(),
        failure_detected: false,
    };
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string(&export).unwrap()).unwrap();
    set_mtime(&path, modified);
}

#[tokio::test]
async fn export_source_replays_newest_export() {
    let dir = tempfile::tempdir().unwrap();
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_750_000_000);
    write_export(
        dir.path(),
        "slots_1.json",
        vec![SlotRecord::new("Dr. Old", "01/06/2025 09:00")],
        base,
    );
    write_export(
        dir.path(),
        "slots_2.json",
        vec![SlotRecord::new("Dr. New", "02/06/2025 09:00")],
        base + Duration::from_secs(60),
    );

    let fetched = ExportSource::new(dir.path()).fetch().await.unwrap();
    assert_eq!(fetched.slots, vec![SlotRecord::new("Dr. New", "02/06/2025 09:00")]);
    assert!(!fetched.failure_detected);
    assert_eq!(fetched.url, "https://www.centromed.cl/reserva-de-horas/");
}

#[tokio::test]
async fn export_source_flags_failure_marker_newer_than_export() {
    let dir = tempfile::tempdir().unwrap();
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_750_000_000);
    write_export(dir.path(), "slots_1.json", Vec::new(), base);

    let marker = dir.path().join("submit_failure_page_1.html");
    std::fs::write(&marker, CAPTCHA_PAGE).unwrap();
    set_mtime(&marker, base + Duration::from_secs(5));

    let fetched = ExportSource::new(dir.path()).fetch().await.unwrap();
    assert!(fetched.failure_detected);
}

#[tokio::test]
async fn export_source_ignores_failure_marker_older_than_export() {
    let dir = tempfile::tempdir().unwrap();
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_750_000_000);

    let marker = dir.path().join("submit_failure_page_1.html");
    std::fs::write(&marker, CAPTCHA_PAGE).unwrap();
    set_mtime(&marker, base);
    write_export(dir.path(), "slots_2.json", Vec::new(), base + Duration::from_secs(5));

    let fetched = ExportSource::new(dir.path()).fetch().await.unwrap();
    assert!(!fetched.failure_detected);
}

#[tokio::test]
async fn blocked_fetch_survives_export_and_replay() {
    let server = MockServer::start().await;
    let artifacts = tempfile::tempdir().unwrap();
    mount_landing(&server).await;

    Mock::given(method("POST"))
        .and(path(BOOKING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(CAPTCHA_PAGE))
        .mount(&server)
        .await;

    let live = test_source(&server, artifacts.path(), 1)
        .fetch()
        .await
        .unwrap();
    assert!(live.failure_detected);

    // The export lands after the submit_failure snapshot, as in a check run.
    tokio::time::sleep(Duration::from_millis(20)).await;
    artifacts::write_slots_export(
        artifacts.path(),
        &SlotsExport::from_fetch("Alvarez", &live),
        chrono::Utc::now(),
    )
    .unwrap();

    let replayed = ExportSource::new(artifacts.path()).fetch().await.unwrap();
    assert!(replayed.failure_detected);
    assert!(replayed.slots.is_empty());
}

#[tokio::test]
async fn export_source_without_export_is_no_export() {
    let dir = tempfile::tempdir().unwrap();
    let result = ExportSource::new(dir.path()).fetch().await;
    assert!(
        matches!(result, Err(ScraperError::NoExport { .. })),
        "expected NoExport, got: {result:?}"
    );
}

#[tokio::test]
async fn export_source_reads_loose_slot_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slots_9.json");
    std::fs::write(
        &path,
        r#"{"doctor":"Alvarez","url":"u","slots":[{"doctor":"Dr. A","hora":null,"HORA":"15/06/2025 09:00","ID":7}]}"#,
    )
    .unwrap();

    let fetched = ExportSource::new(dir.path()).fetch().await.unwrap();
    let slot = &fetched.slots[0];
    assert_eq!(slot.time_raw, "");
    assert_eq!(slot.time_text(), Some("15/06/2025 09:00"));
    assert_eq!(slot.extra["ID"], "7");
}
