use std::sync::Arc;

use axum::{Extension, extract::Query, response::Html};

use crate::{spotify::auth::AuthFlow, types::CallbackParams};

const SUCCESS_PAGE: &str = "<h2>Authorization successful.</h2>\
<p>You can close this window and return to the player.</p>\
<script>window.close();</script>";

pub async fn callback(
    Query(params): Query<CallbackParams>,
    Extension(auth): Extension<Arc<AuthFlow>>,
) -> Html<String> {
    match auth.handle_callback(params).await {
        Ok(()) => Html(SUCCESS_PAGE.to_string()),
        Err(message) => Html(format!(
            "<h2>Authorization failed.</h2><p>{}</p>",
            escape_html(&message)
        )),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
