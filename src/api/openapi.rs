use crate::api::handlers::{health, tokens, users};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Documented routes. `OPTIONS /health` is added by [`super::router`] and stays undocumented.
pub(crate) fn api_router() -> OpenApiRouter {
    // Paths sharing a template must sit in one `routes!` call.
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(users::list_users, users::create_user))
        .routes(routes!(users::get_me, users::update_me, users::delete_me))
        .routes(routes!(
            users::get_user,
            users::update_user,
            users::delete_user
        ))
        .routes(routes!(tokens::login))
        .routes(routes!(tokens::refresh));

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("Account lifecycle".to_string());
    let mut tokens_tag = Tag::new("tokens");
    tokens_tag.description = Some("Login and access token refresh".to_string());
    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and database status".to_string());
    router.get_openapi_mut().tags = Some(vec![users_tag, tokens_tag, health_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => (
            optional_str(name),
            optional_str(email.trim_end().trim_end_matches('>')),
        ),
        None => (optional_str(author), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_with_and_without_email() {
        assert_eq!(
            parse_author("Team Keyward <team@keyward.dev>"),
            (Some("Team Keyward"), Some("team@keyward.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("<only@mail>"), (None, Some("only@mail")));
        assert_eq!(parse_author("  "), (None, None));
    }

    #[test]
    fn document_uses_package_metadata() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));
        let contact = doc.info.contact.clone();
        assert_eq!(
            contact.and_then(|contact| contact.name).as_deref(),
            Some("Team Keyward")
        );
        let license = doc.info.license.clone();
        assert_eq!(license.map(|license| license.name).as_deref(), Some("BSD-3-Clause"));
    }

    #[test]
    fn document_lists_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/users",
            "/v1/users/me",
            "/v1/users/{id}",
            "/v1/tokens/login",
            "/v1/tokens/refresh",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
