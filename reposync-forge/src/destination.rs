//! Destination mirror client for the Gitea API.
//!
//! Creating a mirror is two phases: resolve the acting identity's numeric id
//! via `GET /user`, then `POST /repos/migrate`. Neither phase retries; the
//! next reconciliation cycle is the retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reposync_core::{Config, RepoName, RepositoryRef};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ForgeError;
use crate::http::{send_cancellable, HttpRequest, HttpTransport, ReqwestTransport};

const SOURCE_SERVICE: &str = "github";

/// A place mirrors can be created.
#[async_trait]
pub trait MirrorDestination: Send + Sync {
    /// `true` only on an explicit "found". Not-found and every error are `false`.
    async fn exists(&self, cancel: &CancellationToken, name: &RepoName) -> bool;

    /// Create a mirror of `repo` under the destination owner.
    async fn create_mirror(
        &self,
        cancel: &CancellationToken,
        repo: &RepositoryRef,
    ) -> Result<(), ForgeError>;
}

/// Credentials the destination uses to pull from the source.
#[derive(Debug, Clone)]
pub struct SourceCredentials {
    pub username: String,
    pub token: String,
}

#[derive(Clone)]
pub struct GiteaDestination {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    owner: String,
    token: String,
    source: SourceCredentials,
    mirror: bool,
}

#[derive(Debug, Deserialize)]
struct Identity {
    id: i64,
}

/// Body of `POST /repos/migrate`.
#[derive(Debug, Serialize)]
struct MigrateRequest<'a> {
    repo_name: &'a str,
    clone_addr: &'a str,
    mirror: bool,
    private: bool,
    service: &'static str,
    auth_username: &'a str,
    auth_password: &'a str,
    wiki: bool,
    labels: bool,
    issues: bool,
    pull_requests: bool,
    releases: bool,
    repo_owner: &'a str,
    uid: i64,
}

impl GiteaDestination {
    /// Client for the destination described by `config`.
    pub fn new(config: &Config, timeout: Duration) -> Result<Self, ForgeError> {
        let transport = ReqwestTransport::with_timeout(timeout)?;
        Ok(Self::with_transport(
            &config.destination.api_url,
            &config.destination.user,
            &config.destination.token,
            SourceCredentials {
                username: config.source.user.clone(),
                token: config.source.token.clone(),
            },
            config.sync.enable_mirror,
            Arc::new(transport),
        ))
    }

    pub fn with_transport(
        api_url: &str,
        owner: &str,
        token: &str,
        source: SourceCredentials,
        mirror: bool,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            token: token.to_string(),
            source,
            mirror,
        }
    }

    pub fn identity_url(&self) -> String {
        format!("{}/user", self.api_url)
    }

    pub fn repo_url(&self, name: &RepoName) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.owner, name)
    }

    pub fn migrate_url(&self) -> String {
        format!("{}/repos/migrate", self.api_url)
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request.header("Authorization", format!("token {}", self.token))
    }

    /// Phase 1: numeric id of the identity the token belongs to.
    async fn resolve_identity(&self, cancel: &CancellationToken) -> Result<i64, ForgeError> {
        let request = self.authorized(HttpRequest::get(self.identity_url()));
        let resp = send_cancellable(self.transport.as_ref(), cancel, request).await?;
        if !resp.is_success() {
            return Err(ForgeError::DestinationAuth {
                status: resp.status,
                body: resp.text(),
            });
        }
        let identity: Identity = resp.json().map_err(|err| ForgeError::DestinationAuth {
            status: resp.status,
            body: format!("malformed identity response: {err}"),
        })?;
        Ok(identity.id)
    }
}

#[async_trait]
impl MirrorDestination for GiteaDestination {
    async fn exists(&self, cancel: &CancellationToken, name: &RepoName) -> bool {
        let request = self.authorized(HttpRequest::get(self.repo_url(name)));
        match send_cancellable(self.transport.as_ref(), cancel, request).await {
            Ok(resp) => resp.status == 200,
            Err(err) => {
                tracing::warn!(repo = %name, error = %err, "existence check failed; assuming absent");
                false
            }
        }
    }

    async fn create_mirror(
        &self,
        cancel: &CancellationToken,
        repo: &RepositoryRef,
    ) -> Result<(), ForgeError> {
        let uid = self.resolve_identity(cancel).await?;

        let payload = MigrateRequest {
            repo_name: repo.name.as_str(),
            clone_addr: &repo.clone_url,
            mirror: self.mirror,
            private: true,
            service: SOURCE_SERVICE,
            auth_username: &self.source.username,
            auth_password: &self.source.token,
            wiki: true,
            labels: true,
            issues: true,
            pull_requests: true,
            releases: true,
            repo_owner: &self.owner,
            uid,
        };
        let request = self.authorized(HttpRequest::post(self.migrate_url()).json(&payload)?);
        let resp = send_cancellable(self.transport.as_ref(), cancel, request).await?;

        if resp.status != 201 {
            return Err(ForgeError::MirrorCreate {
                name: repo.name.to_string(),
                status: resp.status,
                body: resp.text(),
            });
        }

        tracing::info!(repo = %repo.name, mirror = self.mirror, "created destination mirror");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpResponse, MockTransport};
    use rstest::rstest;
    use serde_json::Value;

    const API: &str = "https://gitea.test/api/v1";

    fn destination(mock: &MockTransport, mirror: bool) -> GiteaDestination {
        GiteaDestination::with_transport(
            API,
            "mirror-bot",
            "gitea-token",
            SourceCredentials {
                username: "octocat".into(),
                token: "ghp_secret".into(),
            },
            mirror,
            Arc::new(mock.clone()),
        )
    }

    fn repo() -> RepositoryRef {
        RepositoryRef::new("widgets", "https://github.com/octocat/widgets.git")
    }

    #[rstest]
    #[case(200, true)]
    #[case(404, false)]
    #[case(500, false)]
    #[case(301, false)]
    #[tokio::test]
    async fn exists_is_true_only_on_found(#[case] status: u16, #[case] expected: bool) {
        let mock = MockTransport::new();
        let dest = destination(&mock, true);
        let url = dest.repo_url(&RepoName::from("widgets"));
        mock.push(HttpMethod::Get, url, HttpResponse::new(status, "{}"));

        let found = dest
            .exists(&CancellationToken::new(), &RepoName::from("widgets"))
            .await;
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn exists_treats_transport_failure_as_absent() {
        let mock = MockTransport::new();
        let dest = destination(&mock, true);
        assert!(
            !dest
                .exists(&CancellationToken::new(), &RepoName::from("widgets"))
                .await
        );
    }

    #[tokio::test]
    async fn create_mirror_sends_full_migration_payload() {
        let mock = MockTransport::new();
        let dest = destination(&mock, false);
        mock.push(HttpMethod::Get, dest.identity_url(), HttpResponse::new(200, r#"{"id":17,"login":"mirror-bot"}"#));
        mock.push(HttpMethod::Post, dest.migrate_url(), HttpResponse::new(201, "{}"));

        dest.create_mirror(&CancellationToken::new(), &repo())
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, format!("{API}/user"));
        let migrate = &requests[1];
        assert_eq!(migrate.method, HttpMethod::Post);
        assert!(migrate
            .headers
            .contains(&("Authorization".to_string(), "token gitea-token".to_string())));

        let body: Value = serde_json::from_slice(&migrate.body).unwrap();
        assert_eq!(body["repo_name"], "widgets");
        assert_eq!(body["clone_addr"], "https://github.com/octocat/widgets.git");
        assert_eq!(body["mirror"], false);
        assert_eq!(body["private"], true);
        assert_eq!(body["service"], "github");
        assert_eq!(body["auth_username"], "octocat");
        assert_eq!(body["auth_password"], "ghp_secret");
        assert_eq!(body["repo_owner"], "mirror-bot");
        assert_eq!(body["uid"], 17);
        for flag in ["wiki", "labels", "issues", "pull_requests", "releases"] {
            assert_eq!(body[flag], true, "{flag} must be requested");
        }
    }

    #[tokio::test]
    async fn identity_failure_is_destination_auth_and_skips_migration() {
        let mock = MockTransport::new();
        let dest = destination(&mock, true);
        mock.push(HttpMethod::Get, dest.identity_url(), HttpResponse::new(401, "token is required"));

        let err = dest
            .create_mirror(&CancellationToken::new(), &repo())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::DestinationAuth { status: 401, .. }));
        assert_eq!(mock.count(HttpMethod::Post, &dest.migrate_url()), 0);
    }

    #[rstest]
    #[case(200)]
    #[case(409)]
    #[case(422)]
    #[tokio::test]
    async fn anything_but_created_is_mirror_create_error(#[case] status: u16) {
        let mock = MockTransport::new();
        let dest = destination(&mock, true);
        mock.push(HttpMethod::Get, dest.identity_url(), HttpResponse::new(200, r#"{"id":1}"#));
        mock.push(
            HttpMethod::Post,
            dest.migrate_url(),
            HttpResponse::new(status, r#"{"message":"The repository with the same name already exists."}"#),
        );

        let err = dest
            .create_mirror(&CancellationToken::new(), &repo())
            .await
            .unwrap_err();
        match err {
            ForgeError::MirrorCreate { name, status: got, body } => {
                assert_eq!(name, "widgets");
                assert_eq!(got, status);
                assert!(body.contains("already exists"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
