use reqwest::{Client, Response};

use crate::error::{ChatError, Result};

const DISABLE_SYSTEM_PROXY_ENV: &str = "CHATAI_DISABLE_SYSTEM_PROXY";
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_http_client() -> Result<Client> {
    if should_disable_system_proxy() {
        Client::builder().no_proxy().build().map_err(ChatError::Transport)
    } else {
        Ok(Client::new())
    }
}

fn should_disable_system_proxy() -> bool {
    if std::env::var_os(DISABLE_SYSTEM_PROXY_ENV).is_some() {
        return true;
    }

    cfg!(test)
}

/// Convert a non-success response into `ChatError::HttpStatus`.
pub(crate) async fn status_error(response: Response) -> ChatError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    // Truncate error body to prevent leaking large or sensitive responses.
    let message = if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated]", &body[..cut])
    } else {
        body
    };

    ChatError::HttpStatus { status, message }
}
