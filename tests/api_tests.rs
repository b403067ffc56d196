//! API integration tests

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{ocm_body, ppm_body, TestApp};
use medtrack_server::models::Role;

#[tokio::test]
async fn test_health_and_readiness() {
    let app = TestApp::new().await;

    let (status, body) = app.json(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.json(Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_login() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "admin", "password": common::ADMIN_PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password_hash").is_none());

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "admin", "password": "wrong"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_gates() {
    let app = TestApp::new().await;
    let viewer = app.token_for("viewer1", Role::Viewer).await;
    let editor = app.token_for("editor1", Role::Editor).await;

    let (status, _) = app.json(Method::GET, "/api/v1/equipment/ppm", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(Method::GET, "/api/v1/equipment/ppm", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(Method::GET, "/api/v1/equipment/ppm", Some(&viewer), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/equipment/ppm",
            Some(&viewer),
            Some(ppm_body("P-1", "L-1")),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/equipment/ppm",
            Some(&editor),
            Some(ppm_body("P-1", "L-1")),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.json(Method::GET, "/api/v1/users", Some(&editor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_regime_is_bad_request() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    let (status, _) = app
        .json(Method::GET, "/api/v1/equipment/xyz", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_for_serial_containing_hash() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let (status, created) = app
        .json(
            Method::POST,
            "/api/v1/equipment/ocm",
            Some(&token),
            Some(ocm_body("SW3266#", "LOG-77")),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["url_token"], "SW3266-hash");
    assert_eq!(created["links"]["history"], "/api/v1/equipment/ocm/SW3266-hash/history");

    let (status, note) = app
        .json(
            Method::POST,
            "/api/v1/equipment/ocm/SW3266-hash/history",
            Some(&token),
            Some(json!({"note_text": "Replaced the display cable"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", note);
    assert_eq!(note["equipment_serial"], "SW3266#");
    assert_eq!(note["author_name"], "admin");

    // Both the token and the percent-encoded raw serial reach the same record
    for uri in [
        "/api/v1/equipment/ocm/SW3266-hash/history",
        "/api/v1/equipment/ocm/SW3266%23/history",
    ] {
        let (status, notes) = app.json(Method::GET, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(notes.as_array().unwrap().len(), 1, "{}", uri);
    }

    let (_, page) = app
        .json(Method::GET, "/api/v1/equipment/ocm", Some(&token), None)
        .await;
    assert_eq!(page["items"][0]["serial"], "SW3266#");
    assert_eq!(page["items"][0]["has_history"], true);

    let (status, body) = app
        .json(Method::GET, "/api/v1/equipment/ocm/SW9999-hash", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 5);
}

#[tokio::test]
async fn test_listing_reflects_mutations_immediately() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    // Warm the caches while the regime is empty
    let (_, page) = app
        .json(Method::GET, "/api/v1/equipment/ppm", Some(&token), None)
        .await;
    assert_eq!(page["total"], 0);
    let (_, stats) = app
        .json(Method::GET, "/api/v1/equipment/ppm/_/stats", Some(&token), None)
        .await;
    assert_eq!(stats["total"], 0);

    for (serial, log) in [("A-1", "L-1"), ("B 2", "L-2"), ("C/3", "L-3")] {
        let (status, _) = app
            .json(
                Method::POST,
                "/api/v1/equipment/ppm",
                Some(&token),
                Some(ppm_body(serial, log)),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, page) = app
        .json(Method::GET, "/api/v1/equipment/ppm", Some(&token), None)
        .await;
    assert_eq!(page["total"], 3);
    // Manual creations go to the top
    let serials: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["serial"].as_str().unwrap())
        .collect();
    assert_eq!(serials, vec!["C/3", "B 2", "A-1"]);
    let (_, stats) = app
        .json(Method::GET, "/api/v1/equipment/ppm/_/stats", Some(&token), None)
        .await;
    assert_eq!(stats["total"], 3);

    // Delete the middle row through its token; NO is renumbered without gaps
    let (status, _) = app
        .json(Method::DELETE, "/api/v1/equipment/ppm/B-space2", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, page) = app
        .json(Method::GET, "/api/v1/equipment/ppm", Some(&token), None)
        .await;
    let rows = page["items"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["serial"], "C/3");
    assert_eq!(rows[0]["NO"], 1);
    assert_eq!(rows[1]["serial"], "A-1");
    assert_eq!(rows[1]["NO"], 2);
}

#[tokio::test]
async fn test_update_and_conflicts() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    for (serial, log) in [("EU 2017/745", "L-1"), ("N-A 243", "L-2")] {
        app.json(
            Method::POST,
            "/api/v1/equipment/ocm",
            Some(&token),
            Some(ocm_body(serial, log)),
        )
        .await;
    }

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/equipment/ocm",
            Some(&token),
            Some(ocm_body("EU 2017/745", "L-9")),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Taking another record's log number is rejected
    let (status, _) = app
        .json(
            Method::PUT,
            "/api/v1/equipment/ocm/EU-space2017-slash745",
            Some(&token),
            Some(ocm_body("EU 2017/745", "L-2")),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A token from older front ends still resolves
    let mut body = ocm_body("EU 2017/745", "L-1");
    body["engineer"] = json!("Sara");
    let (status, updated) = app
        .json(
            Method::PUT,
            "/api/v1/equipment/ocm/EU-2017-745",
            Some(&token),
            Some(body),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", updated);
    assert_eq!(updated["maintenance"]["engineer"], "Sara");

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/equipment/ocm",
            Some(&token),
            Some(json!({"serial": "", "log_number": "L-5"})),
        )
        .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_bulk_delete_reports_missing_identifiers() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    for (serial, log) in [("A1", "L1"), ("A2", "L2"), ("A3", "L3")] {
        app.json(
            Method::POST,
            "/api/v1/equipment/ppm",
            Some(&token),
            Some(ppm_body(serial, log)),
        )
        .await;
    }

    let (status, report) = app
        .json(
            Method::POST,
            "/api/v1/equipment/ppm/_/bulk-delete",
            Some(&token),
            Some(json!({"identifiers": ["A1", "A3", "A3", "NOPE"]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["deleted_count"], 2);
    assert_eq!(report["not_found"], json!(["NOPE"]));

    let (_, page) = app
        .json(Method::GET, "/api/v1/equipment/ppm", Some(&token), None)
        .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["serial"], "A2");
    assert_eq!(page["items"][0]["NO"], 1);
}

#[tokio::test]
async fn test_csv_import_and_export() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let csv = "SERIAL,LOG_Number,MODEL,MANUFACTURER,Department,PPM_Q_I.date,PPM_Q_I.engineer\n\
               SN-1,L-1,X-200,Beta,ICU,15/02/2026,Sam\n\
               ,L-2,X-200,Beta,ICU,,\n\
               SN-3,L-3,X-300,Beta,Lab,2026-13-40,\n\
               SN-4,L-1,X-400,Beta,Lab,,\n";
    let (status, report) = app
        .multipart(
            "/api/v1/equipment/ppm/_/import",
            &token,
            &[],
            &[("file", "ppm.csv", "text/csv", csv.as_bytes())],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["added_count"], 1);
    assert_eq!(report["updated_count"], 0);
    assert_eq!(report["skipped_count"], 3);
    assert_eq!(report["errors"].as_array().unwrap().len(), 3);

    // Same serial again updates in place
    let csv = "serial,log number,model,manufacturer,department\nSN-1,L-1,X-201,Beta,ICU\n";
    let (_, report) = app
        .multipart(
            "/api/v1/equipment/ppm/_/import",
            &token,
            &[],
            &[("file", "ppm.csv", "text/csv", csv.as_bytes())],
        )
        .await;
    assert_eq!(report["updated_count"], 1);

    let (_, page) = app
        .json(Method::GET, "/api/v1/equipment/ppm", Some(&token), None)
        .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["model"], "X-201");

    let (status, _) = app
        .multipart(
            "/api/v1/equipment/ocm/_/import",
            &token,
            &[],
            &[("file", "ocm.csv", "text/csv", b"SERIAL,MODEL\nA,B\n" as &[u8])],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = axum::http::Request::builder()
        .uri("/api/v1/equipment/ppm/_/export")
        .header("authorization", format!("Bearer {}", token))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, bytes) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let exported = String::from_utf8(bytes).unwrap();
    let mut lines = exported.lines();
    assert!(lines.next().unwrap().starts_with("NO,Department,Name,MODEL,SERIAL"));
    assert!(lines.next().unwrap().starts_with("1,ICU,,X-201,SN-1,Beta,L-1"));
}

#[tokio::test]
async fn test_note_with_attachment_and_download() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    app.json(
        Method::POST,
        "/api/v1/equipment/ocm",
        Some(&token),
        Some(ocm_body("SW3266#", "LOG-77")),
    )
    .await;

    let (status, note) = app
        .multipart(
            "/api/v1/equipment/ocm/SW3266-hash/history",
            &token,
            &[("note_text", "Calibrated, report attached")],
            &[("files", "report.pdf", "application/pdf", b"%PDF-1.4 test" as &[u8])],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", note);
    let attachment = &note["attachments"][0];
    assert_eq!(attachment["original_filename"], "report.pdf");
    assert!(attachment.get("file_path").is_none());

    let uri = format!(
        "/api/v1/history/{}/attachments/{}",
        note["id"].as_str().unwrap(),
        attachment["id"].as_str().unwrap()
    );
    let request = axum::http::Request::builder()
        .uri(&uri)
        .header("authorization", format!("Bearer {}", token))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, bytes) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"%PDF-1.4 test");

    // Disallowed types are rejected before anything is written
    let (status, _) = app
        .multipart(
            "/api/v1/equipment/ocm/SW3266-hash/history",
            &token,
            &[("note_text", "Firmware updater attached")],
            &[("files", "setup.exe", "application/octet-stream", b"MZ" as &[u8])],
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, notes) = app
        .json(
            Method::GET,
            "/api/v1/equipment/ocm/SW3266-hash/history",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(notes.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_note_permissions() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let author = app.token_for("author", Role::Editor).await;
    let other = app.token_for("other", Role::Editor).await;

    app.json(
        Method::POST,
        "/api/v1/equipment/ppm",
        Some(&admin),
        Some(ppm_body("P-9", "L-9")),
    )
    .await;
    let (_, note) = app
        .json(
            Method::POST,
            "/api/v1/equipment/ppm/P-dash9/history",
            Some(&author),
            Some(json!({"note_text": "Filter replaced today"})),
        )
        .await;
    let uri = format!("/api/v1/history/{}", note["id"].as_str().unwrap());

    let (status, _) = app
        .json(
            Method::PUT,
            &uri,
            Some(&other),
            Some(json!({"note_text": "Someone else's edit"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, edited) = app
        .json(
            Method::PUT,
            &uri,
            Some(&author),
            Some(json!({"note_text": "Filter and gasket replaced"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["is_edited"], true);
    assert_eq!(edited["last_modified_by_name"], "author");

    let (status, _) = app
        .json(
            Method::PUT,
            &uri,
            Some(&author),
            Some(json!({"note_text": "short"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.json(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.json(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_search() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    for (serial, log) in [("SW3266#", "L-1"), ("MX 10", "L-2")] {
        app.json(
            Method::POST,
            "/api/v1/equipment/ocm",
            Some(&token),
            Some(ocm_body(serial, log)),
        )
        .await;
    }
    for (token_path, text) in [
        ("SW3266-hash", "Battery swapped on the monitor"),
        ("MX-space10", "Screen cracked, ordered part"),
    ] {
        let (status, _) = app
            .json(
                Method::POST,
                &format!("/api/v1/equipment/ocm/{}/history", token_path),
                Some(&token),
                Some(json!({ "note_text": text })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, all) = app
        .json(Method::GET, "/api/v1/history/search", Some(&token), None)
        .await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, found) = app
        .json(
            Method::GET,
            "/api/v1/history/search?regime=ocm&serial=SW3266-hash",
            Some(&token),
            None,
        )
        .await;
    let found = found.as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["equipment_serial"], "SW3266#");

    let (_, found) = app
        .json(Method::GET, "/api/v1/history/search?q=CRACKED", Some(&token), None)
        .await;
    assert_eq!(found.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_user_management() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let (status, user) = app
        .json(
            Method::POST,
            "/api/v1/users",
            Some(&token),
            Some(json!({"username": "tech1", "password": "long-enough", "role": "editor"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = user["id"].as_i64().unwrap();

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/users",
            Some(&token),
            Some(json!({"username": "TECH1", "password": "long-enough", "role": "viewer"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, updated) = app
        .json(
            Method::PUT,
            &format!("/api/v1/users/{}/role", id),
            Some(&token),
            Some(json!({"role": "viewer"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["role"], "viewer");

    let (_, me) = app.json(Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    let admin_id = me["id"].as_i64().unwrap();
    let (status, _) = app
        .json(
            Method::PUT,
            &format!("/api/v1/users/{}/role", admin_id),
            Some(&token),
            Some(json!({"role": "editor"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .json(
            Method::DELETE,
            &format!("/api/v1/users/{}", id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_training_crud() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let (status, record) = app
        .json(
            Method::POST,
            "/api/v1/training",
            Some(&token),
            Some(json!({
                "employee_id": "E-17",
                "name": "Nadia",
                "department": "ICU",
                "machine_trainer_assignments": [{"machine": "Ventilator", "trainer": "Omar"}],
                "last_trained_date": "12/01/2026"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", record);
    assert_eq!(record["last_trained_date"], "2026-01-12");
    let uri = format!("/api/v1/training/{}", record["id"]);

    let (status, updated) = app
        .json(
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({"employee_id": "E-17", "name": "Nadia K", "department": "ICU"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Nadia K");
    assert_eq!(updated["machine_trainer_assignments"], json!([]));

    let (status, _) = app.json(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.json(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_serials_named_like_collection_actions() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    for (serial, log) in [("stats", "L-1"), ("export", "L-2")] {
        let (status, _) = app
            .json(
                Method::POST,
                "/api/v1/equipment/ocm",
                Some(&token),
                Some(ocm_body(serial, log)),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, record) = app
        .json(Method::GET, "/api/v1/equipment/ocm/stats", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", record);
    assert_eq!(record["serial"], "stats");

    let mut body = ocm_body("stats", "L-1");
    body["engineer"] = json!("Sara");
    let (status, updated) = app
        .json(Method::PUT, "/api/v1/equipment/ocm/stats", Some(&token), Some(body))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["maintenance"]["engineer"], "Sara");

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/equipment/ocm/export/history",
            Some(&token),
            Some(json!({"note_text": "Cable replaced on site"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, stats) = app
        .json(Method::GET, "/api/v1/equipment/ocm/_/stats", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 2);

    let (status, _) = app
        .json(Method::DELETE, "/api/v1/equipment/ocm/stats", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, stats) = app
        .json(Method::GET, "/api/v1/equipment/ocm/_/stats", Some(&token), None)
        .await;
    assert_eq!(stats["total"], 1);
}

#[tokio::test]
async fn test_audit_trail_records_mutations() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let viewer = app.token_for("auditor", Role::Viewer).await;

    app.json(
        Method::POST,
        "/api/v1/equipment/ocm",
        Some(&admin),
        Some(ocm_body("AUD-1", "L-1")),
    )
    .await;
    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/equipment/ocm",
            Some(&admin),
            Some(ocm_body("AUD-1", "L-2")),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .json(Method::DELETE, "/api/v1/equipment/ocm/AUD-dash1", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .json(Method::GET, "/api/v1/audit", Some(&viewer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, page) = app
        .json(
            Method::GET,
            "/api/v1/audit?event_type=equipment_added",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", page);
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"][0]["status"], "failed");
    assert_eq!(page["items"][0]["performed_by"], "admin");
    assert!(page["items"][0]["details"]["error"].is_string());
    assert_eq!(page["items"][1]["status"], "success");
    assert_eq!(page["items"][1]["details"]["serial"], "AUD-1");

    let (_, deleted) = app
        .json(
            Method::GET,
            "/api/v1/audit?event_type=equipment_deleted",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(deleted["total"], 1);
    assert_eq!(deleted["items"][0]["details"]["serial"], "AUD-1");

    let (_, searched) = app
        .json(Method::GET, "/api/v1/audit?q=system%20startup", Some(&admin), None)
        .await;
    assert_eq!(searched["total"], 1);
    assert_eq!(searched["items"][0]["performed_by"], "System");

    let request = axum::http::Request::builder()
        .uri("/api/v1/audit/export?status=failed")
        .header("authorization", format!("Bearer {}", admin))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, bytes) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let exported = String::from_utf8(bytes).unwrap();
    let mut lines = exported.lines();
    assert_eq!(
        lines.next().unwrap(),
        "ID,Timestamp,Event Type,Performed By,Description,Status,Details"
    );
    assert!(lines.next().unwrap().contains(",Equipment Added,admin,"));
    assert!(lines.next().is_none());

    // The export is itself on record
    let (_, exports) = app
        .json(
            Method::GET,
            "/api/v1/audit?event_type=data_export",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(exports["total"], 1);
    assert_eq!(exports["items"][0]["details"]["data_type"], "audit_log");
}

#[tokio::test]
async fn test_training_csv_import_and_export() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let (_, existing) = app
        .json(
            Method::POST,
            "/api/v1/training",
            Some(&token),
            Some(json!({"employee_id": "E-1", "name": "Nadia", "department": "ICU"})),
        )
        .await;
    let existing_id = existing["id"].as_i64().unwrap();

    let csv = format!(
        "id,employee_id,name,department,machine_trainer_assignments,last_trained_date,next_due_date\n\
         {},E-1,Nadia K,ICU,\"[{{\"\"machine\"\": \"\"Ventilator\"\", \"\"trainer\"\": \"\"Omar\"\"}}]\",12/01/2026,N/A\n\
         ,E-2,Sami,ER,N/A,,\n\
         40,E-3,Lina,Lab,[],,\n\
         41,E-4,Rami,Lab,[broken,,\n\
         ,,Nobody,Lab,[],,\n",
        existing_id
    );
    let (status, report) = app
        .multipart(
            "/api/v1/training/import",
            &token,
            &[],
            &[("file", "training.csv", "text/csv", csv.as_bytes())],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["added_count"], 2);
    assert_eq!(report["updated_count"], 1);
    assert_eq!(report["skipped_count"], 2);

    let (_, updated) = app
        .json(
            Method::GET,
            &format!("/api/v1/training/{}", existing_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(updated["name"], "Nadia K");
    assert_eq!(updated["machine_trainer_assignments"][0]["trainer"], "Omar");
    assert_eq!(updated["last_trained_date"], "2026-01-12");

    let (status, kept_id) = app
        .json(Method::GET, "/api/v1/training/40", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(kept_id["employee_id"], "E-3");

    let request = axum::http::Request::builder()
        .uri("/api/v1/training/export")
        .header("authorization", format!("Bearer {}", token))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, bytes) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let exported = String::from_utf8(bytes).unwrap();
    assert!(exported.starts_with(
        "id,employee_id,name,department,machine_trainer_assignments,last_trained_date,next_due_date\n"
    ));
    assert_eq!(exported.lines().count(), 4);

    // Exported files import back as updates
    let (_, report) = app
        .multipart(
            "/api/v1/training/import",
            &token,
            &[],
            &[("file", "training.csv", "text/csv", exported.as_bytes())],
        )
        .await;
    assert_eq!(report["updated_count"], 3);
    assert_eq!(report["added_count"], 0);
}

#[tokio::test]
async fn test_training_bulk_delete() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    let mut ids = Vec::new();
    for employee in ["E-1", "E-2", "E-3"] {
        let (_, record) = app
            .json(
                Method::POST,
                "/api/v1/training",
                Some(&token),
                Some(json!({"employee_id": employee, "name": "Staff", "department": "ICU"})),
            )
            .await;
        ids.push(record["id"].as_i64().unwrap());
    }

    let (status, report) = app
        .json(
            Method::POST,
            "/api/v1/training/bulk-delete",
            Some(&token),
            Some(json!({"ids": [ids[0], ids[2], ids[2], 9999]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["deleted_count"], 2);
    assert_eq!(report["not_found"], json!([9999]));

    let (_, remaining) = app
        .json(Method::GET, "/api/v1/training", Some(&token), None)
        .await;
    let remaining = remaining.as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["id"], ids[1]);

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/training/bulk-delete",
            Some(&token),
            Some(json!({"ids": []})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let viewer = app.token_for("viewer1", Role::Viewer).await;
    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/training/bulk-delete",
            Some(&viewer),
            Some(json!({"ids": [ids[1]]})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_auto_import_detects_kind() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let files: [(&str, &str, i64); 3] = [
        (
            "SERIAL,LOG_Number,MODEL,MANUFACTURER,Department,Name,PPM_Q_I.date\n\
             AP-1,L-1,X-200,Beta,ICU,Pump,15/02/2026\n",
            "ppm",
            1,
        ),
        (
            "Department,Name,MODEL,SERIAL,MANUFACTURER,LOG_Number,Service_Date,Engineer\n\
             Lab,Monitor,M1,AO-1,Beta,L-9,10/01/2026,Ali\n\
             Lab,Monitor,M1,AO-2,Beta,L-10,10/01/2026,Ali\n",
            "ocm",
            2,
        ),
        (
            "id,employee_id,name,department,machine_trainer_assignments\n,E-1,Nadia,ICU,[]\n",
            "training",
            1,
        ),
    ];
    for (csv, kind, added) in files {
        let (status, report) = app
            .multipart(
                "/api/v1/import/auto",
                &token,
                &[],
                &[("file", "data.csv", "text/csv", csv.as_bytes())],
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", report);
        assert_eq!(report["data_type"], kind);
        assert_eq!(report["added_count"], added);
    }

    let (_, ocm) = app
        .json(Method::GET, "/api/v1/equipment/ocm", Some(&token), None)
        .await;
    assert_eq!(ocm["total"], 2);

    let (status, body) = app
        .multipart(
            "/api/v1/import/auto",
            &token,
            &[],
            &[("file", "data.csv", "text/csv", b"foo,bar\n1,2\n" as &[u8])],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .contains("Unable to determine CSV type"));
}
