use crate::domain::entities::{HttpMethod, Request};
use crate::domain::errors::HttpError;
use crate::domain::negotiation::ContentToken;
use crate::domain::utils::capitalize;
use crate::responders::{AppContext, HandlerTable, Responder};
use crate::responses::Response;

/// Serves the page template `section/page` named by the request.
pub struct PageResponder {
    request: Option<Request>,
}

impl PageResponder {
    pub fn new(request: Option<Request>) -> Self {
        Self { request }
    }

    pub fn handlers() -> HandlerTable<Self> {
        HandlerTable::new()
            .on(HttpMethod::Get, ContentToken::All, Self::page)
            .on(HttpMethod::Get, ContentToken::Html, Self::page)
    }

    fn segment(&self, name: &str, default: &str) -> Result<String, HttpError> {
        let value = self
            .request
            .as_ref()
            .and_then(|request| request.parameter_str(name))
            .unwrap_or_else(|| default.to_string());

        let valid = !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(value)
        } else {
            Err(HttpError::NotFound(format!("Page '{}' does not exist", value)))
        }
    }

    fn page(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let section = self.segment("section", &ctx.settings.default_section)?;
        let page = self.segment("page", &ctx.settings.default_page)?;

        let mut response = ctx.html_response(self.request.as_ref());
        response.set_template_id(format!("{}/{}", section, page));
        if page != ctx.settings.default_page {
            response.append_title(capitalize(&page.replace(['_', '-'], " ")));
        }
        response.set_data("section", section);
        response.set_data("name", page);
        Ok(response)
    }
}

impl Responder for PageResponder {
    fn type_tag(&self) -> &str {
        "page"
    }

    fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responders::{BoundResponder, DynResponder};
    use std::sync::Arc;

    fn respond(request: Option<Request>) -> Result<Response, HttpError> {
        let ctx = AppContext::for_tests();
        let mut responder = BoundResponder::new(PageResponder::new(request), Arc::new(PageResponder::handlers()));
        responder.get_response(&ctx)?;
        Ok(responder.take_response().unwrap())
    }

    #[test]
    fn test_defaults() {
        let response = respond(None).unwrap();
        assert_eq!(response.template_id(), Some("pages/index"));
    }

    #[test]
    fn test_named_page() {
        let request = Request::new(HttpMethod::Get, "/about")
            .with_parameter("section", "site")
            .with_parameter("page", "about_us");
        let response = respond(Some(request)).unwrap();
        assert_eq!(response.template_id(), Some("site/about_us"));
    }

    #[test]
    fn test_rejects_path_tricks() {
        let request = Request::new(HttpMethod::Get, "/x").with_parameter("page", "../secret");
        assert!(matches!(respond(Some(request)), Err(HttpError::NotFound(_))));
    }
}
