//! WS-Security UsernameToken injection.

use crate::envelope::{WSSE_NS, WSU_NS};
use crate::error::{xml_escape, ClientError, Result};
use crate::interceptor::{Interceptor, Phase, SoapMessage};
use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Password type URI for clear-text UsernameToken passwords.
pub const PASSWORD_TEXT: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";

static TOKEN_IDS: AtomicU64 = AtomicU64::new(1);

/// Supplies the password for a WSSE identifier, or `None` when it is unknown.
pub type PasswordCallback = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Callback answering only for `username`.
pub fn password_for(username: impl Into<String>, password: impl Into<String>) -> PasswordCallback {
    let username = username.into();
    let password = password.into();
    Arc::new(move |identifier: &str| (identifier == username).then(|| password.clone()))
}

/// Outbound interceptor adding a `wsse:Security` header with a UsernameToken.
pub struct UsernameTokenInterceptor {
    user: String,
    callback: PasswordCallback,
    add_created: bool,
}

impl UsernameTokenInterceptor {
    pub fn new(user: impl Into<String>, callback: PasswordCallback) -> Self {
        Self {
            user: user.into(),
            callback,
            add_created: false,
        }
    }

    /// Interceptor for a fixed username / password pair.
    pub fn for_credentials(user: &str, password: &str) -> Self {
        Self::new(user, password_for(user, password))
    }

    /// Also emit `wsu:Created` in the token.
    pub fn with_created(mut self, add_created: bool) -> Self {
        self.add_created = add_created;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl fmt::Debug for UsernameTokenInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsernameTokenInterceptor")
            .field("user", &self.user)
            .field("add_created", &self.add_created)
            .finish()
    }
}

impl Interceptor for UsernameTokenInterceptor {
    fn id(&self) -> &str {
        "wsse-username-token"
    }

    fn phase(&self) -> Phase {
        Phase::PreProtocol
    }

    fn handle_message(&self, message: &mut SoapMessage) -> Result<()> {
        let password = (self.callback)(&self.user).ok_or_else(|| {
            ClientError::WsSecurity(format!("No password available for user '{}'", self.user))
        })?;

        let created = self
            .add_created
            .then(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

        message.add_header_block(username_token_header(&self.user, &password, created.as_deref()));
        Ok(())
    }
}

/// Render a `wsse:Security` header block carrying a PasswordText UsernameToken.
pub fn username_token_header(user: &str, password: &str, created: Option<&str>) -> String {
    let token_id = TOKEN_IDS.fetch_add(1, Ordering::Relaxed);
    let created = created
        .map(|c| format!("<wsu:Created>{}</wsu:Created>", xml_escape(c)))
        .unwrap_or_default();

    format!(
        concat!(
            r#"<wsse:Security xmlns:wsse="{wsse}" xmlns:wsu="{wsu}" soap:mustUnderstand="1">"#,
            r#"<wsse:UsernameToken wsu:Id="UsernameToken-{id}">"#,
            r#"<wsse:Username>{user}</wsse:Username>"#,
            r#"<wsse:Password Type="{pw_type}">{password}</wsse:Password>"#,
            "{created}",
            r#"</wsse:UsernameToken></wsse:Security>"#,
        ),
        wsse = WSSE_NS,
        wsu = WSU_NS,
        id = token_id,
        user = xml_escape(user),
        pw_type = PASSWORD_TEXT,
        password = xml_escape(password),
        created = created,
    )
}
