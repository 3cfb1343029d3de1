//! Authenticated App Store Connect session and tester-management operations.
//!
//! A [`Session`] owns one HTTP client (with its cookie jar) for its entire
//! lifetime and bootstraps itself lazily: `add_tester` triggers `login`,
//! `login` triggers the service-key scrape, and the service key unlocks the
//! sign-in against the identity-provider host. Cookies returned by the
//! sign-in handshake are retained by the jar and attached to every
//! subsequent request, which is how later calls stay "logged in" without
//! re-sending credentials.
//!
//! Identifiers the caller did not supply (content provider, default
//! external group) are inferred once after sign-in and cached for the
//! session's lifetime. All calls are sequential; a session issues no
//! concurrent requests. Independent sessions share no state and may run in
//! parallel tasks.

mod error;

pub use error::SessionError;

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Proxy, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::NormalizingJar;

const DEFAULT_STORE_BASE: &str = "https://itunesconnect.apple.com";
const DEFAULT_IDMSA_BASE: &str = "https://idmsa.apple.com";

// The service key is assigned in the served login controller script as a
// single-quoted string literal. When this pattern disappears the page
// structure changed and the session fails loudly.
static SERVICE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"itcServiceKey = '([^']+)'")
        .unwrap_or_else(|e| panic!("invalid static regex: {e}"))
});

/// Optional per-session configuration.
///
/// Linkage identifiers supplied here take precedence over inference:
/// `login()` will not fetch the profile or group list for a field the
/// caller already provided.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// HTTPS proxy address applied to the session transport.
    pub proxy: Option<String>,
    /// Content provider (team) identifier, skipping profile inference.
    pub content_provider_id: Option<String>,
    /// Tester group identifier, skipping default-group inference.
    pub group_id: Option<String>,
}

/// A tester group as reported by the backend.
///
/// Read-only from the client's perspective; only the fields the invitation
/// flow needs are decoded, everything else in the record is ignored.
#[derive(Debug, Clone)]
pub struct TesterGroup {
    /// Backend group identifier.
    pub id: String,
    /// Whether this group is the default destination for external invitees.
    pub is_default_external_group: bool,
}

/// An authenticated session against the App Store Connect web backend.
///
/// Created once per invocation and never persisted. The session moves from
/// unauthenticated to authenticated on the first successful [`login`]; there
/// is no transition back within a process lifetime. A failed login leaves
/// the session unauthenticated and is retryable.
///
/// [`login`]: Session::login
pub struct Session {
    client: Client,
    login_email: String,
    password: String,
    app_id: String,
    store_base: String,
    idmsa_base: String,
    service_key: Option<String>,
    content_provider_id: Option<String>,
    group_id: Option<String>,
    logged_in: bool,
}

// Custom Debug impl that redacts the account password.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("login_email", &self.login_email)
            .field("password", &"[REDACTED]")
            .field("app_id", &self.app_id)
            .field("store_base", &self.store_base)
            .field("idmsa_base", &self.idmsa_base)
            .field("content_provider_id", &self.content_provider_id)
            .field("group_id", &self.group_id)
            .field("logged_in", &self.logged_in)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session against the production hosts.
    ///
    /// Builds the session's HTTP client once, with a fresh [`NormalizingJar`]
    /// as its cookie store and the optional HTTPS proxy from `options`. The
    /// client is owned exclusively by this session for its lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] when the HTTP client cannot be
    /// constructed (for example an unparseable proxy address).
    pub fn new(
        login_email: impl Into<String>,
        password: impl Into<String>,
        app_id: impl Into<String>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        Self::with_base_urls(
            login_email,
            password,
            app_id,
            options,
            DEFAULT_STORE_BASE,
            DEFAULT_IDMSA_BASE,
        )
    }

    /// Creates a session with custom backend hosts (used by integration tests).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn with_base_urls(
        login_email: impl Into<String>,
        password: impl Into<String>,
        app_id: impl Into<String>,
        options: SessionOptions,
        store_base: impl Into<String>,
        idmsa_base: impl Into<String>,
    ) -> Result<Self, SessionError> {
        let mut builder = Client::builder()
            .cookie_provider(Arc::new(NormalizingJar::new()))
            .user_agent(concat!("tfinvite/", env!("CARGO_PKG_VERSION")));
        if let Some(proxy) = &options.proxy {
            builder = builder.proxy(Proxy::https(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            login_email: login_email.into(),
            password: password.into(),
            app_id: app_id.into(),
            store_base: store_base.into().trim_end_matches('/').to_string(),
            idmsa_base: idmsa_base.into().trim_end_matches('/').to_string(),
            service_key: None,
            content_provider_id: options.content_provider_id,
            group_id: options.group_id,
            logged_in: false,
        })
    }

    /// Returns whether `login()` has completed successfully.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// Returns the resolved content provider (team) identifier, if any.
    #[must_use]
    pub fn content_provider_id(&self) -> Option<&str> {
        self.content_provider_id.as_deref()
    }

    /// Returns the resolved tester group identifier, if any.
    #[must_use]
    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    /// Resolves the sign-in service key, fetching it on first use.
    ///
    /// The key is scraped from the served login controller script and cached
    /// for the session's lifetime; it is never re-fetched. If the server
    /// rotates the key, the session must be recreated.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TokenNotFound`] when the script cannot be
    /// fetched or no longer contains the expected assignment pattern.
    pub async fn service_key(&mut self) -> Result<String, SessionError> {
        if let Some(key) = &self.service_key {
            return Ok(key.clone());
        }

        let url = format!(
            "{}/itc/static-resources/controllers/login_cntrl.js",
            self.store_base
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SessionError::TokenNotFound);
        }
        let script = response.text().await?;
        let key = extract_service_key(&script).ok_or(SessionError::TokenNotFound)?;
        debug!("service key resolved");
        self.service_key = Some(key.clone());
        Ok(key)
    }

    /// Signs in against the identity provider and resolves account linkage.
    ///
    /// Idempotent: a no-op when the session is already authenticated. The
    /// sign-in response body is not read; only a success status is required.
    /// Cookies set during the handshake are retained by the session jar.
    /// Linkage identifiers the caller did not supply are inferred here and
    /// cached.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TokenNotFound`] when the service key cannot
    /// be resolved, [`SessionError::Authentication`] when the identity
    /// provider rejects the credentials, and
    /// [`SessionError::LinkageInference`] when the profile or group data
    /// needed for inference is unusable. A failed login leaves the session
    /// unauthenticated; calling again retries the full sequence.
    pub async fn login(&mut self) -> Result<(), SessionError> {
        if self.logged_in {
            return Ok(());
        }

        let widget_key = self.service_key().await?;
        let url = format!("{}/appleauth/auth/signin", self.idmsa_base);
        let response = self
            .client
            .post(&url)
            .query(&[("widgetKey", widget_key.as_str())])
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ACCEPT, "application/json, text/javascript")
            .json(&SignInRequest {
                account_name: &self.login_email,
                password: &self.password,
                remember_me: false,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Authentication {
                status: status.as_u16(),
            });
        }
        debug!("sign-in accepted, session cookies retained");

        if self.content_provider_id.is_none() {
            let id = self.infer_content_provider_id().await?;
            info!(content_provider_id = %id, "inferred content provider id");
            self.content_provider_id = Some(id);
        }

        if self.group_id.is_none() {
            match self.infer_default_group_id().await? {
                Some(id) => {
                    info!(group_id = %id, "inferred default external group");
                    self.group_id = Some(id);
                }
                None => debug!("no group flagged as default external for this app"),
            }
        }

        self.logged_in = true;
        Ok(())
    }

    /// Lists the tester groups for the resolved app.
    ///
    /// # Errors
    ///
    /// Returns any [`login`] error, and
    /// [`SessionError::LinkageInference`] when the group list cannot be
    /// fetched or parsed.
    ///
    /// [`login`]: Session::login
    pub async fn groups(&mut self) -> Result<Vec<TesterGroup>, SessionError> {
        self.login().await?;
        self.fetch_groups().await
    }

    /// Invites a tester and assigns them to the resolved group (two-phase).
    ///
    /// Phase 1 creates the tester for the app; phase 2 assigns the new
    /// tester id to the group. The phases are not transactional: a phase-2
    /// failure leaves the tester created but unassigned. Returns the
    /// backend-assigned tester identifier.
    ///
    /// # Errors
    ///
    /// Returns any [`login`] error first. A rejected creation surfaces as
    /// [`SessionError::DuplicateTester`] when the backend reports the email
    /// as already invited, and [`SessionError::TesterCreation`] otherwise;
    /// the phase-2 request is never issued after a phase-1 failure. With no
    /// group resolved, [`SessionError::GroupUnresolved`] is returned before
    /// the assignment request is built; a rejected assignment surfaces as
    /// [`SessionError::GroupAssignment`].
    ///
    /// [`login`]: Session::login
    pub async fn add_tester(
        &mut self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<String, SessionError> {
        self.login().await?;
        let team_id = self.resolved_team_id()?.to_string();

        let url = format!(
            "{}/testflight/v2/providers/{}/apps/{}/testers",
            self.store_base, team_id, self.app_id
        );
        let response = self
            .client
            .post(&url)
            .json(&NewTester {
                email,
                first_name,
                last_name,
            })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            if is_duplicate_tester_response(status, &body) {
                return Err(SessionError::DuplicateTester {
                    email: email.to_string(),
                });
            }
            return Err(SessionError::TesterCreation {
                status: status.as_u16(),
                body,
            });
        }
        let tester_id = serde_json::from_str::<CreatedTesterResponse>(&body)
            .ok()
            .and_then(|created| id_string(&created.data.id))
            .ok_or_else(|| SessionError::TesterCreation {
                status: status.as_u16(),
                body,
            })?;
        debug!(tester_id = %tester_id, "tester created");

        let group_id = self
            .group_id
            .clone()
            .ok_or(SessionError::GroupUnresolved)?;
        let url = format!(
            "{}/testflight/v2/providers/{}/apps/{}/groups/{}/testers/{}",
            self.store_base, team_id, self.app_id, group_id, tester_id
        );
        let response = self
            .client
            .put(&url)
            .json(&GroupAssignmentRequest {
                group_id: &group_id,
                tester_id: &tester_id,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::GroupAssignment {
                status: status.as_u16(),
                body,
            });
        }

        info!(email = %email, tester_id = %tester_id, "tester invited");
        Ok(tester_id)
    }

    /// Counts the external testers currently on the app.
    ///
    /// Read-only; the only side effect is the lazy `login()`.
    ///
    /// # Errors
    ///
    /// Returns any [`login`] error, and [`SessionError::TesterList`] when
    /// the tester list cannot be fetched or parsed.
    ///
    /// [`login`]: Session::login
    pub async fn num_testers(&mut self) -> Result<usize, SessionError> {
        self.login().await?;

        let url = format!(
            "{}/WebObjects/iTunesConnect.woa/ra/user/externalTesters/{}/",
            self.store_base, self.app_id
        );
        let response = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SessionError::TesterList {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: ExternalTestersResponse =
            serde_json::from_str(&body).map_err(|_| SessionError::TesterList {
                status: status.as_u16(),
                body,
            })?;
        Ok(parsed.data.users.len())
    }

    /// Reads the content provider id from the first associated account on
    /// the signed-in user's profile. Accounts associated with several
    /// organizations are not disambiguated: the first listed wins.
    async fn infer_content_provider_id(&self) -> Result<String, SessionError> {
        let url = format!(
            "{}/WebObjects/iTunesConnect.woa/ra/user/detail",
            self.store_base
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::linkage(format!(
                "user detail returned HTTP {status}"
            )));
        }
        let detail: UserDetailResponse = response.json().await.map_err(|e| {
            SessionError::linkage(format!("user detail is not the expected JSON shape: {e}"))
        })?;
        let account = detail
            .data
            .associated_accounts
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::linkage("no associated accounts on this login"))?;
        id_string(&account.content_provider.content_provider_id)
            .ok_or_else(|| SessionError::linkage("contentProviderId is neither string nor number"))
    }

    /// Picks the group flagged as the default external group, if one exists.
    /// Absence is not an error here; the invite path reports it when it
    /// actually needs a group.
    async fn infer_default_group_id(&self) -> Result<Option<String>, SessionError> {
        let groups = self.fetch_groups().await?;
        Ok(default_external_group_id(&groups))
    }

    async fn fetch_groups(&self) -> Result<Vec<TesterGroup>, SessionError> {
        let team_id = self.resolved_team_id()?;
        let url = format!(
            "{}/testflight/v2/providers/{}/apps/{}/groups",
            self.store_base, team_id, self.app_id
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::linkage(format!(
                "group list returned HTTP {status}"
            )));
        }
        let parsed: GroupsResponse = response.json().await.map_err(|e| {
            SessionError::linkage(format!("group list is not the expected JSON shape: {e}"))
        })?;

        let mut groups = Vec::with_capacity(parsed.data.len());
        for record in parsed.data {
            let id = id_string(&record.id)
                .ok_or_else(|| SessionError::linkage("group id is neither string nor number"))?;
            groups.push(TesterGroup {
                id,
                is_default_external_group: record.is_default_external_group,
            });
        }
        Ok(groups)
    }

    fn resolved_team_id(&self) -> Result<&str, SessionError> {
        self.content_provider_id
            .as_deref()
            .ok_or_else(|| SessionError::linkage("content provider id not resolved"))
    }
}

/// Captures the service key from the login controller script content.
fn extract_service_key(script: &str) -> Option<String> {
    SERVICE_KEY_RE
        .captures(script)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Returns the id of the first group flagged as the default external group.
fn default_external_group_id(groups: &[TesterGroup]) -> Option<String> {
    groups
        .iter()
        .find(|group| group.is_default_external_group)
        .map(|group| group.id.clone())
}

/// Whether a failed creation response reports an already-invited email.
///
/// The backend signals duplicates with 409 Conflict; older responses carry
/// the marker only in the body text, so both are checked.
fn is_duplicate_tester_response(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::CONFLICT {
        return true;
    }
    let lowered = body.to_ascii_lowercase();
    lowered.contains("already exists")
        || lowered.contains("already a tester")
        || lowered.contains("existing_email")
}

/// Backend ids arrive as JSON strings or bare numeric literals depending on
/// the endpoint; both are routed through as their string rendering.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    account_name: &'a str,
    password: &'a str,
    remember_me: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewTester<'a> {
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupAssignmentRequest<'a> {
    group_id: &'a str,
    tester_id: &'a str,
}

#[derive(Deserialize)]
struct UserDetailResponse {
    data: UserDetail,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDetail {
    #[serde(default)]
    associated_accounts: Vec<AssociatedAccount>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssociatedAccount {
    content_provider: ContentProviderRecord,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentProviderRecord {
    content_provider_id: Value,
}

#[derive(Deserialize)]
struct GroupsResponse {
    #[serde(default)]
    data: Vec<GroupRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupRecord {
    id: Value,
    #[serde(default)]
    is_default_external_group: bool,
}

#[derive(Deserialize)]
struct CreatedTesterResponse {
    data: CreatedTester,
}

#[derive(Deserialize)]
struct CreatedTester {
    id: Value,
}

#[derive(Deserialize)]
struct ExternalTestersResponse {
    data: ExternalTesters,
}

#[derive(Deserialize)]
struct ExternalTesters {
    #[serde(default)]
    users: Vec<Value>,
}
