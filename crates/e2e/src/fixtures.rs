//! Test fixtures: static upload files, generated users and the per-scenario
//! context that replaces module-level test globals.

use rand::Rng;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::pages::MediaKind;

const USERNAME_LEN: usize = 10;

/// An ephemeral account, unique per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestUser {
    pub username: String,
    #[serde(skip)]
    pub password: String,
}

impl TestUser {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Generates a user with a random lowercase username.
    pub fn random(password: impl Into<String>) -> Self {
        Self::new(random_hash(), password)
    }

    /// Path prefix under which the user's files are served over DAV.
    pub fn dav_root(&self) -> String {
        format!("/remote.php/dav/files/{}", self.username)
    }
}

/// Random lowercase ASCII string used for unique usernames.
pub fn random_hash() -> String {
    let mut rng = rand::thread_rng();
    (0..USERNAME_LEN)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// A file read from the fixtures directory.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Read-only view of the fixtures directory.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    dir: PathBuf,
}

impl FixtureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Loads a fixture by file name.
    ///
    /// Names are resolved relative to the store; parent components are
    /// rejected so scenarios cannot read outside the fixtures directory.
    pub async fn load(&self, name: &str) -> E2eResult<Fixture> {
        if Path::new(name)
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(E2eError::FixtureProcessing(format!(
                "{name}: fixture names must be relative to the fixtures directory"
            )));
        }

        let path = self.dir.join(name);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| E2eError::FixtureProcessing(format!("{}: {}", path.display(), e)))?;

        debug!("Loaded fixture {} ({} bytes)", name, bytes.len());
        Ok(Fixture {
            name: name.to_string(),
            bytes,
        })
    }
}

/// A fixture that has been transferred to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub fixture_name: String,
    pub mime_type: String,
    pub destination_path: String,
    pub uploaded_name: String,
}

impl UploadedFile {
    /// Server path of the file relative to the user's root.
    pub fn remote_path(&self) -> String {
        let folder = self.destination_path.trim_matches('/');
        if folder.is_empty() {
            format!("/{}", self.uploaded_name)
        } else {
            format!("/{}/{}", folder, self.uploaded_name)
        }
    }
}

/// State owned by one scenario run.
///
/// Holds the generated user, what has been uploaded and any values saved by
/// steps (file ids, share tokens) for later `{{var}}` interpolation.
#[derive(Debug, Clone)]
pub struct FixtureContext {
    pub user: TestUser,
    pub uploads: Vec<UploadedFile>,
    vars: HashMap<String, String>,
}

impl FixtureContext {
    pub fn new(user: TestUser) -> Self {
        let mut vars = HashMap::new();
        vars.insert("user".to_string(), user.username.clone());
        vars.insert("password".to_string(), user.password.clone());
        Self {
            user,
            uploads: Vec::new(),
            vars,
        }
    }

    /// Context with a freshly generated user.
    pub fn generate(password: &str) -> Self {
        Self::new(TestUser::random(password))
    }

    pub fn record_upload(&mut self, upload: UploadedFile) {
        // PUT by path overwrites, so a re-upload replaces the earlier entry.
        self.uploads
            .retain(|u| u.remote_path() != upload.remote_path());
        self.uploads.push(upload);
    }

    /// Uploaded files the viewer shows with `kind`.
    pub fn media_count(&self, kind: MediaKind) -> usize {
        self.uploads
            .iter()
            .filter(|u| MediaKind::for_mime(&u.mime_type) == Some(kind))
            .count()
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Replaces `{{name}}` placeholders with saved variables.
    ///
    /// Unknown placeholders are an error rather than being left in place, so a
    /// typo in a scenario fails at the step that uses it.
    pub fn interpolate(&self, template: &str) -> E2eResult<String> {
        static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
        let re = PLACEHOLDER.get_or_init(|| {
            Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
        });

        let mut missing = None;
        let out = re.replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match self.vars.get(name) {
                Some(v) => v.clone(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(name) => Err(E2eError::ScenarioParse(format!(
                "unknown variable '{{{{{name}}}}}' in \"{template}\""
            ))),
            None => Ok(out.into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_usernames_are_lowercase_and_distinct() {
        let a = random_hash();
        let b = random_hash();
        assert_eq!(a.len(), USERNAME_LEN);
        assert!(a.chars().all(|c| c.is_ascii_lowercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn dav_root_contains_username() {
        let user = TestUser::new("qwertyuiop", "password");
        assert_eq!(user.dav_root(), "/remote.php/dav/files/qwertyuiop");
    }

    #[tokio::test]
    async fn loads_fixture_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("audio.mp3"), [0xFF, 0xFB, 0x90]).unwrap();

        let fixture = FixtureStore::new(dir.path()).load("audio.mp3").await.unwrap();
        assert_eq!(fixture.name, "audio.mp3");
        assert_eq!(fixture.bytes, vec![0xFF, 0xFB, 0x90]);
    }

    #[tokio::test]
    async fn missing_fixture_is_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FixtureStore::new(dir.path()).load("nope.ogg").await.unwrap_err();
        assert!(matches!(err, E2eError::FixtureProcessing(_)));
    }

    #[tokio::test]
    async fn rejects_escaping_fixture_names() {
        let dir = tempfile::tempdir().unwrap();
        let err = FixtureStore::new(dir.path())
            .load("../secret.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::FixtureProcessing(_)));
    }

    #[test]
    fn reupload_replaces_entry() {
        let mut ctx = FixtureContext::new(TestUser::new("u", "p"));
        let upload = UploadedFile {
            fixture_name: "audio.mp3".into(),
            mime_type: "audio/mpeg".into(),
            destination_path: String::new(),
            uploaded_name: "audio.mp3".into(),
        };
        ctx.record_upload(upload.clone());
        ctx.record_upload(upload);
        assert_eq!(ctx.uploads.len(), 1);
    }

    #[test]
    fn media_count_follows_mime_type() {
        let mut ctx = FixtureContext::new(TestUser::new("u", "p"));
        for (name, mime) in [
            ("audio.mp3", "audio/mpeg"),
            ("audio.ogg", "audio/ogg"),
            ("image.png", "image/png"),
            ("notes.txt", "text/plain"),
        ] {
            ctx.record_upload(UploadedFile {
                fixture_name: name.into(),
                mime_type: mime.into(),
                destination_path: String::new(),
                uploaded_name: name.into(),
            });
        }
        assert_eq!(ctx.media_count(MediaKind::Audio), 2);
        assert_eq!(ctx.media_count(MediaKind::Image), 1);
        assert_eq!(ctx.media_count(MediaKind::Video), 0);
    }

    #[test]
    fn remote_path_joins_folder() {
        let upload = UploadedFile {
            fixture_name: "image.png".into(),
            mime_type: "image/png".into(),
            destination_path: "/Photos/".into(),
            uploaded_name: "renamed.png".into(),
        };
        assert_eq!(upload.remote_path(), "/Photos/renamed.png");
    }

    #[test]
    fn interpolates_known_variables() {
        let mut ctx = FixtureContext::new(TestUser::new("alice", "pw"));
        ctx.set_var("token", "abcdefghijklmno");
        let out = ctx
            .interpolate("/remote.php/dav/files/{{user}}/a.mp3 {{ token }}")
            .unwrap();
        assert_eq!(out, "/remote.php/dav/files/alice/a.mp3 abcdefghijklmno");
        assert_eq!(ctx.var("token"), Some("abcdefghijklmno"));
        assert_eq!(ctx.var("password"), Some("pw"));
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let ctx = FixtureContext::new(TestUser::new("alice", "pw"));
        let err = ctx.interpolate("{{usr}}").unwrap_err();
        assert!(err.to_string().contains("{{usr}}"));
    }
}
