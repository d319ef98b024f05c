/// Integration tests for the eix dispatcher
/// These tests run whole request cycles through an application built from a manifest

use eix::config::Manifest;
use eix::domain::entities::{HttpRequest, HttpResponse};
use eix::Application;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest>
    <application>
        <id>notes</id>
        <name>Notes</name>
        <templates>{templates}</templates>
    </application>
    <route>
        <uri>/notes/delete</uri>
        <responder>notes</responder>
        <default>
            <name>action</name>
            <value>delete</value>
        </default>
    </route>
    <route>
        <uri>/notes/([\w-]+)</uri>
        <responder>notes</responder>
        <capture>
            <name>id</name>
            <group>1</group>
        </capture>
    </route>
    <route>
        <uri>/notes/?</uri>
        <responder>notes</responder>
    </route>
    <route>
        <uri>/identity(/.*)?</uri>
        <responder>identity</responder>
    </route>
    <route>
        <uri>/(\w*)</uri>
        <responder>page</responder>
        <capture>
            <name>page</name>
            <group>1</group>
        </capture>
    </route>
    <collection>
        <name>notes</name>
        <item>note</item>
        <managed>true</managed>
        <field>
            <name>title</name>
            <validator>NonEmpty</validator>
        </field>
        <field>
            <name>body</name>
        </field>
    </collection>
    <principal>
        <id>editor</id>
        <key>secret</key>
        <permission>*</permission>
    </principal>
    <principal>
        <id>reader</id>
        <key>glance</key>
        <permission>notes:get.json</permission>
    </principal>
</manifest>"#;

/// Helper to create an application with templates in a temp dir
fn create_application(dir: &TempDir) -> Application {
    let templates = dir.path().join("templates");
    fs::create_dir_all(templates.join("pages")).unwrap();
    fs::create_dir_all(templates.join("notes")).unwrap();
    fs::write(templates.join("pages/index.html"), "<h1>{{ page.title }}</h1>").unwrap();
    fs::write(
        templates.join("notes/index.html"),
        r#"{% if status is defined %}{% for message in status.notice | default([]) %}<p class="notice">{{ message }}</p>{% endfor %}{% endif %}<ul>{% for note in notes %}<li>{{ note.title }}</li>{% endfor %}</ul>"#,
    )
    .unwrap();
    fs::write(
        templates.join("notes/edit.html"),
        r#"{% if validation is defined %}{% for message in validation.title %}<p class="error">{{ message }}</p>{% endfor %}{% endif %}{% if status is defined %}{% for message in status.notice | default([]) %}<p class="notice">{{ message }}</p>{% endfor %}{% endif %}<input name="title" value="{{ note.title }}">"#,
    )
    .unwrap();
    fs::write(templates.join("notes/delete.html"), "Delete {{ notes | join(\", \") }}?").unwrap();

    let xml = MANIFEST.replace("{templates}", templates.to_str().unwrap());
    let manifest = Manifest::parse(&xml).unwrap();
    Application::build(&manifest, manifest.routes().unwrap()).unwrap()
}

fn get(uri: &str, accept: &str) -> HttpRequest {
    HttpRequest::new("GET", uri).with_header("Accept", accept)
}

fn post_form(uri: &str, body: &str) -> HttpRequest {
    HttpRequest::new("POST", uri)
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body(body.as_bytes().to_vec())
}

fn set_cookies(response: &HttpResponse) -> Vec<&str> {
    response
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
        .map(|(_, value)| value.as_str())
        .collect()
}

/// Sign in through the identity responder and return the session cookie
fn sign_in(app: &Application, key: &str) -> String {
    let response = app
        .dispatcher()
        .execute(&post_form("/identity", &format!("provider=key&key={}", key)));
    assert_eq!(response.status_code, 303);
    set_cookies(&response)
        .into_iter()
        .find(|cookie| cookie.starts_with("eix-session="))
        .and_then(|cookie| cookie.split(';').next())
        .unwrap()
        .to_string()
}

fn seed_note(app: &Application, title: &str) -> String {
    let dispatcher = app.dispatcher();
    let factory = dispatcher.context().factories.get("notes").unwrap();
    let data = json!({"title": title}).as_object().cloned().unwrap();
    let note = factory.new_entity(data).unwrap();
    note.store().unwrap();
    note.id().unwrap()
}

#[test]
fn test_restricted_collection_asks_for_identification() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);

    let response = app.dispatcher().execute(&get("/notes/?view=all", "text/html"));

    assert_eq!(response.status_code, 200);
    assert!(response.body_text().contains(r#"name="key""#));
    let cookies = set_cookies(&response);
    assert!(cookies
        .iter()
        .any(|cookie| cookie.starts_with("eix-locator=%2Fnotes%2F%3Fview%3Dall;")));
    assert!(cookies.iter().any(|cookie| cookie.contains("Max-Age=300")));
}

#[test]
fn test_json_client_gets_401() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);

    let response = app.dispatcher().execute(&get("/notes/", "application/json"));

    assert_eq!(response.status_code, 401);
    let error: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(error["code"], 401);
}

#[test]
fn test_recorded_locator_is_kept() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);

    let request = get("/notes/", "text/html").with_header("Cookie", "eix-locator=%2Fnotes%2F42");
    let response = app.dispatcher().execute(&request);

    assert_eq!(response.status_code, 200);
    assert!(set_cookies(&response).is_empty());
}

#[test]
fn test_sign_in_returns_to_locator() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);

    let request = post_form("/identity", "provider=key&key=secret").with_header("Cookie", "eix-locator=%2Fnotes%2F");
    let response = app.dispatcher().execute(&request);

    assert_eq!(response.status_code, 303);
    assert_eq!(response.header("Location"), Some("/notes/"));
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|cookie| cookie.starts_with("eix-session=")));
    assert!(cookies.iter().any(|cookie| cookie.starts_with("eix-locator=;")));
}

#[test]
fn test_wrong_key_shows_identification_again() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);

    let response = app.dispatcher().execute(&post_form("/identity", "provider=key&key=wrong"));

    assert_eq!(response.status_code, 200);
    assert!(response.body_text().contains(r#"name="key""#));
    assert!(set_cookies(&response).is_empty());
}

#[test]
fn test_signed_in_json_listing() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);
    seed_note(&app, "First");
    let session = sign_in(&app, "secret");

    let response = app
        .dispatcher()
        .execute(&get("/notes/", "application/json").with_header("Cookie", session));

    assert_eq!(response.status_code, 200);
    assert_eq!(response.header("Content-Type"), Some("application/json; charset=UTF-8"));
    let notes: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(notes[0]["title"], "First");
}

#[test]
fn test_html_listing_after_unsupported_preference() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);
    seed_note(&app, "First");
    let session = sign_in(&app, "secret");

    // No XML handler on collections, so HTML is next
    let request = get("/notes/", "application/xml, text/html;q=0.8").with_header("Cookie", session);
    let response = app.dispatcher().execute(&request);

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body_text(), "<ul><li>First</li></ul>");
}

#[test]
fn test_json_preference_falls_through_to_html_page() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);

    let response = app.dispatcher().execute(&get("/", "application/json, text/html;q=0.5"));

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body_text(), "<h1>Notes</h1>");
}

#[test]
fn test_nothing_acceptable_is_406() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);

    let response = app.dispatcher().execute(&get("/", "image/png"));

    assert_eq!(response.status_code, 406);
    assert!(response.header("Content-Type").unwrap().starts_with("text/html"));
}

#[test]
fn test_missing_page_is_404() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);

    // The page responder only speaks HTML; the missing template is
    // reported in the preferred representation
    let response = app.dispatcher().execute(&get("/about", "application/json, text/html;q=0.5"));

    assert_eq!(response.status_code, 404);
    let error: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(error["code"], 404);
}

#[test]
fn test_reader_cannot_store() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);
    let session = sign_in(&app, "glance");

    let request = get("/notes/", "application/json").with_header("Cookie", session.clone());
    assert_eq!(app.dispatcher().execute(&request).status_code, 200);

    let request = post_form("/notes/", "operation=store&title=Sneaky").with_header("Cookie", session);
    let response = app.dispatcher().execute(&request);
    assert_eq!(response.status_code, 403);
}

#[test]
fn test_store_reports_validation() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);
    let session = sign_in(&app, "secret");

    let request = post_form("/notes/", "operation=store&title=&body=Text").with_header("Cookie", session);
    let response = app.dispatcher().execute(&request);

    assert_eq!(response.status_code, 200);
    assert!(response.body_text().contains(r#"<p class="error">This field cannot be empty.</p>"#));
    let notes = app.dispatcher().context().factories.get("notes").unwrap().count(None).unwrap();
    assert_eq!(notes, 0);
}

#[test]
fn test_store_then_delete() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);
    let session = sign_in(&app, "secret");
    let dispatcher = app.dispatcher();

    let request = post_form("/notes/", "operation=store&title=Groceries").with_header("Cookie", session.clone());
    let response = dispatcher.execute(&request);
    assert_eq!(response.status_code, 200);
    assert!(response.body_text().contains("Note correctly stored."));

    let factory = dispatcher.context().factories.get("notes").unwrap();
    let stored = factory.get_all(None).unwrap();
    assert_eq!(stored.len(), 1);
    let id = stored[0].id().unwrap();

    let request = post_form("/notes/delete", &format!("confirm=1&ids={}", id)).with_header("Cookie", session.clone());
    let response = dispatcher.execute(&request);
    assert_eq!(response.status_code, 303);
    assert_eq!(response.header("Location"), Some("/notes/"));
    let messages = set_cookies(&response)
        .into_iter()
        .find(|cookie| cookie.starts_with("eix-messages="))
        .and_then(|cookie| cookie.split(';').next())
        .unwrap()
        .to_string();

    // Following the redirect shows the report once
    let request = get("/notes/", "text/html").with_header("Cookie", format!("{}; {}", session, messages));
    let response = dispatcher.execute(&request);
    assert_eq!(response.status_code, 200);
    assert!(response.body_text().contains(r#"<p class="notice">1 notes were affected.</p>"#));
    assert!(set_cookies(&response).iter().any(|cookie| cookie.starts_with("eix-messages=;")));

    let response = dispatcher.execute(&get("/notes/", "text/html").with_header("Cookie", session.clone()));
    assert!(!response.body_text().contains("affected"));

    let request = get(&format!("/notes/{}", id), "application/json").with_header("Cookie", session);
    assert_eq!(dispatcher.execute(&request).status_code, 404);
    assert!(factory.find_entity(&id).is_err());
}

#[test]
fn test_delete_confirmation_lists_selection() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);
    let first = seed_note(&app, "First");
    let session = sign_in(&app, "secret");

    let request = post_form("/notes/delete", &format!("select_{}=on", first)).with_header("Cookie", session);
    let response = app.dispatcher().execute(&request);

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body_text(), format!("Delete {}?", first));
}

#[test]
fn test_unknown_operation_is_bad_request() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_application(&temp_dir);
    let session = sign_in(&app, "secret");

    let request = post_form("/notes/", "operation=polish")
        .with_header("Cookie", session)
        .with_header("Accept", "application/json, */*;q=0.1");
    let response = app.dispatcher().execute(&request);

    assert_eq!(response.status_code, 400);
    let error: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(error["message"], "Bad request: Operation 'polish' not recognised.");
}
