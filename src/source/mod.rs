use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::timeline::GoalRecord;

pub const DEFAULT_ENDPOINT: &str = "https://dev-test-bbu6.onrender.com/graphql";

const GOALS_QUERY: &str = "query goals($userId: String!) { goals(userId: $userId) { id name description date color } }";
const USERS_QUERY: &str = "{ users { id username email description } }";
const STDIN_PATH: &str = "-";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No user ID found")]
    MissingUserId,
    #[error("unknown user '{0}'")]
    UnknownUser(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("{}", .0.join("; "))]
    GraphQl(Vec<String>),
    #[error("could not decode goals: {0}")]
    Decode(String),
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("stdin is a terminal; pipe a goals document or pass a file path")]
    InteractiveStdin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub description: String,
}

/// Anything that can hand back the goals of one user.
pub trait GoalSource: Send {
    fn fetch_goals(&self, user_id: &str) -> Result<Vec<GoalRecord>, FetchError>;

    fn fetch_users(&self) -> Result<Vec<UserSummary>, FetchError>;

    /// Short human description used in logs and the status line.
    fn describe(&self) -> String;
}

/// Validates the user id and performs the single fetch for it.
pub fn load_goals(
    source: &dyn GoalSource,
    user_id: Option<&str>,
) -> Result<Vec<GoalRecord>, FetchError> {
    let user_id = user_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(FetchError::MissingUserId)?;
    tracing::info!(user_id, source = %source.describe(), "fetching goals");
    match source.fetch_goals(user_id) {
        Ok(goals) => {
            tracing::info!(user_id, count = goals.len(), "goals loaded");
            Ok(goals)
        }
        Err(err) => {
            tracing::error!(user_id, ?err, "goal fetch failed");
            Err(err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphQlMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GoalsData {
    #[serde(default)]
    goals: Option<Vec<GoalRecord>>,
}

#[derive(Debug, Deserialize)]
struct UsersData {
    #[serde(default)]
    users: Vec<UserSummary>,
}

fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    let response: GraphQlResponse<T> =
        serde_json::from_str(body).map_err(|err| FetchError::Decode(err.to_string()))?;
    into_data(response)
}

fn into_data<T>(response: GraphQlResponse<T>) -> Result<T, FetchError> {
    if !response.errors.is_empty() {
        return Err(FetchError::GraphQl(
            response.errors.into_iter().map(|err| err.message).collect(),
        ));
    }
    response
        .data
        .ok_or_else(|| FetchError::Decode("response carries no data".into()))
}

#[derive(Debug)]
pub struct GraphQlSource {
    endpoint: String,
    http_client: reqwest::blocking::Client,
}

impl GraphQlSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(FetchError::Transport("endpoint must not be empty".into()));
        }
        let http_client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(15)))
            .timeout(timeout)
            .user_agent(concat!("goaltl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self {
            endpoint,
            http_client,
        })
    }

    fn post(&self, body: serde_json::Value) -> Result<String, FetchError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .text()
            .map_err(|err| FetchError::Transport(err.to_string()))
    }
}

impl GoalSource for GraphQlSource {
    fn fetch_goals(&self, user_id: &str) -> Result<Vec<GoalRecord>, FetchError> {
        let body = self.post(json!({
            "query": GOALS_QUERY,
            "variables": { "userId": user_id },
        }))?;
        let data: GoalsData = decode_envelope(&body)?;
        Ok(data.goals.unwrap_or_default())
    }

    fn fetch_users(&self) -> Result<Vec<UserSummary>, FetchError> {
        let body = self.post(json!({ "query": USERS_QUERY }))?;
        let data: UsersData = decode_envelope(&body)?;
        Ok(data.users)
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}

#[derive(Debug, Deserialize)]
struct UserDocument {
    #[serde(flatten)]
    summary: UserSummary,
    #[serde(default)]
    goals: Vec<GoalRecord>,
}

/// Shapes accepted from a goals file.
#[derive(Debug)]
enum GoalDocument {
    Goals(Vec<GoalRecord>),
    Envelope { data: GoalsData },
    Users { users: Vec<UserDocument> },
}

#[derive(Debug, Deserialize)]
struct UsersDocument {
    users: Vec<UserDocument>,
}

/// Goals read from a JSON file, or from piped stdin when the path is `-`.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_document(&self) -> Result<GoalDocument, FetchError> {
        let raw = if self.path.as_os_str() == STDIN_PATH {
            if atty::is(atty::Stream::Stdin) {
                return Err(FetchError::InteractiveStdin);
            }
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|source| FetchError::Io {
                    path: "stdin".into(),
                    source,
                })?;
            buf
        } else {
            fs::read_to_string(&self.path).map_err(|source| FetchError::Io {
                path: self.path.display().to_string(),
                source,
            })?
        };
        parse_document(&raw)
    }
}

/// Picks the document shape from the top-level JSON value so that decode
/// errors name the offending field.
fn parse_document(raw: &str) -> Result<GoalDocument, FetchError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| FetchError::Decode(err.to_string()))?;
    let decode_err = |err: serde_json::Error| FetchError::Decode(err.to_string());
    let has_key = |key: &str| value.as_object().is_some_and(|map| map.contains_key(key));
    let is_envelope = has_key("data") || has_key("errors");
    let is_users = has_key("users");

    if value.is_array() {
        serde_json::from_value(value)
            .map(GoalDocument::Goals)
            .map_err(decode_err)
    } else if is_envelope {
        let response: GraphQlResponse<GoalsData> =
            serde_json::from_value(value).map_err(decode_err)?;
        into_data(response).map(|data| GoalDocument::Envelope { data })
    } else if is_users {
        let document: UsersDocument = serde_json::from_value(value).map_err(decode_err)?;
        Ok(GoalDocument::Users {
            users: document.users,
        })
    } else {
        Err(FetchError::Decode(
            "expected a goal list, a GraphQL response or a users document".into(),
        ))
    }
}

impl GoalSource for FileSource {
    fn fetch_goals(&self, user_id: &str) -> Result<Vec<GoalRecord>, FetchError> {
        match self.read_document()? {
            GoalDocument::Goals(goals) => Ok(goals),
            GoalDocument::Envelope { data } => Ok(data.goals.unwrap_or_default()),
            GoalDocument::Users { users } => users
                .into_iter()
                .find(|user| user.summary.id == user_id || user.summary.username == user_id)
                .map(|user| user.goals)
                .ok_or_else(|| FetchError::UnknownUser(user_id.to_string())),
        }
    }

    fn fetch_users(&self) -> Result<Vec<UserSummary>, FetchError> {
        match self.read_document()? {
            GoalDocument::Users { users } => {
                Ok(users.into_iter().map(|user| user.summary).collect())
            }
            GoalDocument::Goals(_) | GoalDocument::Envelope { .. } => Ok(Vec::new()),
        }
    }

    fn describe(&self) -> String {
        if self.path.as_os_str() == STDIN_PATH {
            "stdin".into()
        } else {
            self.path.display().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> Result<PathBuf> {
        let path = dir.path().join(name);
        fs::write(&path, body)?;
        Ok(path)
    }

    #[test]
    fn bare_array_and_envelope_both_load() -> Result<()> {
        let dir = TempDir::new()?;
        let bare = write(
            &dir,
            "bare.json",
            r#"[{"id": "1", "name": "Run", "date": "2021-03-01"}]"#,
        )?;
        let envelope = write(
            &dir,
            "envelope.json",
            r#"{"data": {"goals": [{"id": 2, "name": "Swim", "date": "2021-06-01"}]}}"#,
        )?;

        let goals = FileSource::new(bare).fetch_goals("anyone")?;
        assert_eq!(goals[0].name, "Run");
        let goals = FileSource::new(envelope).fetch_goals("anyone")?;
        assert_eq!(goals[0].id.as_str(), "2");
        Ok(())
    }

    #[test]
    fn users_document_selects_by_id_or_username() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write(
            &dir,
            "users.json",
            r#"{"users": [
                {"id": "u1", "username": "ada", "email": "ada@example.com",
                 "goals": [{"id": "g1", "name": "Book", "date": "2022-01-01"}]},
                {"id": "u2", "username": "bob", "goals": []}
            ]}"#,
        )?;
        let source = FileSource::new(path);

        assert_eq!(source.fetch_goals("u1")?.len(), 1);
        assert_eq!(source.fetch_goals("ada")?[0].name, "Book");
        assert!(source.fetch_goals("u2")?.is_empty());
        assert_matches!(source.fetch_goals("nobody"), Err(FetchError::UnknownUser(id)) if id == "nobody");

        let users = source.fetch_users()?;
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].email, "ada@example.com");
        assert_eq!(users[1].description, "");
        Ok(())
    }

    #[test]
    fn missing_user_id_is_checked_before_fetching() -> Result<()> {
        let dir = TempDir::new()?;
        let source = FileSource::new(dir.path().join("does-not-exist.json"));
        for user in [None, Some(""), Some("   ")] {
            let err = load_goals(&source, user).unwrap_err();
            assert_matches!(err, FetchError::MissingUserId);
            assert_eq!(err.to_string(), "No user ID found");
        }
        assert_matches!(load_goals(&source, Some("u1")), Err(FetchError::Io { .. }));
        Ok(())
    }

    #[test]
    fn graphql_errors_surface_their_messages() -> Result<()> {
        let body = r#"{"data": null, "errors": [{"message": "user not found"}, {"message": "try again"}]}"#;
        let err = decode_envelope::<GoalsData>(body).unwrap_err();
        assert_eq!(err.to_string(), "user not found; try again");

        let dir = TempDir::new()?;
        let path = write(&dir, "errors.json", body)?;
        assert_matches!(
            FileSource::new(path).fetch_goals("u1"),
            Err(FetchError::GraphQl(messages)) if messages.len() == 2
        );
        Ok(())
    }

    #[test]
    fn null_goals_decode_as_empty() -> Result<()> {
        let data: GoalsData = decode_envelope(r#"{"data": {"goals": null}}"#)?;
        assert!(data.goals.unwrap_or_default().is_empty());
        assert_matches!(
            decode_envelope::<GoalsData>(r#"{"data": null}"#),
            Err(FetchError::Decode(_))
        );
        Ok(())
    }

    #[test]
    fn malformed_documents_are_decode_errors() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write(&dir, "broken.json", r#"{"goals": "#)?;
        assert_matches!(
            FileSource::new(path).fetch_goals("u1"),
            Err(FetchError::Decode(_))
        );
        Ok(())
    }

    #[test]
    fn decode_errors_name_the_offending_field() -> Result<()> {
        let dir = TempDir::new()?;
        let nameless = write(&dir, "nameless.json", r#"[{"id": "1", "date": "2021-03-01"}]"#)?;
        assert_matches!(
            FileSource::new(nameless).fetch_goals("u1"),
            Err(FetchError::Decode(message)) if message.contains("missing field `name`")
        );

        let users = write(&dir, "users.json", r#"{"users": [{"id": "u1", "goals": []}]}"#)?;
        assert_matches!(
            FileSource::new(users).fetch_users(),
            Err(FetchError::Decode(message)) if message.contains("username")
        );

        let unknown = write(&dir, "unknown.json", r#"{"goalz": []}"#)?;
        assert_matches!(
            FileSource::new(unknown).fetch_goals("u1"),
            Err(FetchError::Decode(message)) if message.starts_with("expected a goal list")
        );
        Ok(())
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        assert_matches!(
            GraphQlSource::new("  ", Duration::from_secs(5)),
            Err(FetchError::Transport(_))
        );
    }
}
