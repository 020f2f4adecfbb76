use std::fmt::Write as _;

use crate::{LocalUser, ProviderKind};

const HOME_TEMPLATE: &str = include_str!("view/home.html");

/// Renders the pages served by the gateway.
pub trait Renderer: Send + Sync {
    /// Profile page for `user`, or the sign-in page listing `providers`
    /// when there is no signed-in user.
    fn render_home(&self, user: Option<&LocalUser>, providers: &[ProviderKind]) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn render_home(&self, user: Option<&LocalUser>, providers: &[ProviderKind]) -> String {
        let body = match user {
            Some(user) => profile_body(user),
            None => sign_in_body(providers),
        };
        HOME_TEMPLATE.replace("{{body}}", &body)
    }
}

fn profile_body(user: &LocalUser) -> String {
    let mut body = String::new();
    if let Some(avatar_url) = &user.avatar_url {
        let _ = writeln!(
            body,
            r#"<img class="avatar" src="{}" alt="">"#,
            escape(avatar_url)
        );
    }
    let _ = writeln!(body, "<h1>Welcome, {}</h1>", escape(&user.name));
    if let Some(email) = &user.email {
        let _ = writeln!(body, r#"<p class="email">{}</p>"#, escape(email));
    }
    body.push_str(r#"<p><a href="/logout">Sign out</a></p>"#);
    body
}

fn sign_in_body(providers: &[ProviderKind]) -> String {
    let mut body = String::from("<h1>Sign in</h1>\n");
    if providers.is_empty() {
        body.push_str("<p>No login providers are configured.</p>");
        return body;
    }
    body.push_str("<nav class=\"providers\">\n");
    for provider in providers {
        let _ = writeln!(
            body,
            r#"<a href="/login/{provider}">Sign in with {}</a>"#,
            provider.display_name()
        );
    }
    body.push_str("</nav>");
    body
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
