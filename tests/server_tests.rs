/// HTTP adapter tests: requests go through the axum router as a server would see them

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use eix::config::Manifest;
use eix::Application;
use tower::ServiceExt;

const MANIFEST: &str = r#"<manifest>
    <route>
        <uri>/notes/?</uri>
        <responder>notes</responder>
    </route>
    <route>
        <uri>/identity(/.*)?</uri>
        <responder>identity</responder>
    </route>
    <collection>
        <name>notes</name>
        <item>note</item>
        <field>
            <name>title</name>
        </field>
    </collection>
</manifest>"#;

fn application() -> Application {
    let manifest = Manifest::parse(MANIFEST).unwrap();
    Application::build(&manifest, manifest.routes().unwrap()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_browse_collection_as_json() {
    let app = application().router();

    let request = Request::builder()
        .uri("/notes/")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json; charset=UTF-8"
    );
    assert_eq!(body_text(response).await, "[]");
}

#[tokio::test]
async fn test_unrouted_path_reports_404_as_xml() {
    let app = application().router();

    let request = Request::builder()
        .uri("/elsewhere?x=1")
        .header(header::ACCEPT, "text/xml")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_text(response).await;
    assert!(body.contains(r#"<response source="eix">"#));
    assert!(body.contains("<code>404</code>"));
}

#[tokio::test]
async fn test_sign_in_form_without_principals() {
    let app = application().router();

    let request = Request::builder()
        .method("POST")
        .uri("/identity")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("provider=key&key=anything"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    // Nobody can sign in, so the form is shown again
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(r#"name="key""#));
}

#[tokio::test]
async fn test_unsupported_method() {
    let app = application().router();

    let request = Request::builder()
        .method("PATCH")
        .uri("/notes/")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
