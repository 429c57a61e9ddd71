//! REST implementation of the history, directory, file and membership
//! collaborators.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Method, RequestBuilder, Response,
};
use shared::{
    domain::{MemberId, RoomId},
    error::ApiException,
    protocol::{ChatMessage, FileEntry, MemberProfileRecord, MemberRecord, UploadedFile},
};
use tracing::debug;
use url::Url;

use crate::{
    collaborators::{
        FileBlob, FileTransferBackend, HistorySource, ParticipantDirectory, RoomMembership,
    },
    SessionContext,
};

pub struct RestBackend {
    http: Client,
    base: Url,
    auth_token: Option<String>,
}

impl RestBackend {
    pub fn new(api_base_url: &str, auth_token: Option<String>) -> Result<Self> {
        Self::with_client(Client::new(), api_base_url, auth_token)
    }

    /// Authenticates every request with the session's bearer token.
    pub fn for_session(api_base_url: &str, session: &SessionContext) -> Result<Self> {
        Self::new(api_base_url, session.auth_token.clone())
    }

    pub fn with_client(http: Client, api_base_url: &str, auth_token: Option<String>) -> Result<Self> {
        let base = Url::parse(api_base_url)
            .with_context(|| format!("invalid api base url: {api_base_url}"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("api base url cannot carry paths: {api_base_url}"));
        }
        Ok(Self {
            http,
            base,
            auth_token: auth_token.filter(|token| !token.is_empty()),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("api base url cannot carry paths: {}", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        debug!(%url, status = status.as_u16(), "rest: request rejected");
        Err(ApiException::from_status(status.as_u16(), format!("{url}: {body}")).into())
    }
}

#[async_trait]
impl HistorySource for RestBackend {
    async fn fetch_history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>> {
        let url = self.endpoint(&["api", "chat", "messages", room_id.as_str()])?;
        let messages: Option<Vec<ChatMessage>> = self
            .send(self.request(Method::GET, url))
            .await?
            .json()
            .await
            .with_context(|| format!("invalid history payload for room {room_id}"))?;
        Ok(messages.unwrap_or_default())
    }
}

#[async_trait]
impl ParticipantDirectory for RestBackend {
    async fn fetch_members(&self, room_id: &RoomId) -> Result<Vec<MemberRecord>> {
        let url = self.endpoint(&["api", "chat", "members", room_id.as_str()])?;
        let members: Option<Vec<MemberRecord>> = self
            .send(self.request(Method::GET, url))
            .await?
            .json()
            .await
            .with_context(|| format!("invalid member payload for room {room_id}"))?;
        Ok(members.unwrap_or_default())
    }

    async fn fetch_profile(&self, member_id: &MemberId) -> Result<MemberProfileRecord> {
        let url = self.endpoint(&["member", "info", member_id.as_str()])?;
        let profile: Option<MemberProfileRecord> = self
            .send(self.request(Method::GET, url))
            .await?
            .json()
            .await
            .with_context(|| format!("invalid profile payload for member {member_id}"))?;
        Ok(profile.unwrap_or_default())
    }
}

#[async_trait]
impl FileTransferBackend for RestBackend {
    async fn upload(&self, room_id: &RoomId, file: &FileBlob) -> Result<UploadedFile> {
        let url = self.endpoint(&["api", "chat", "upload"])?;
        let mut part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        if let Some(mime_type) = &file.mime_type {
            part = part
                .mime_str(mime_type)
                .with_context(|| format!("invalid mime type '{mime_type}'"))?;
        }
        let form = Form::new()
            .part("file", part)
            .text("roomId", room_id.to_string());

        self.send(self.request(Method::POST, url).multipart(form))
            .await?
            .json()
            .await
            .with_context(|| format!("invalid upload response for {}", file.file_name))
    }

    async fn list_files(&self, room_id: &RoomId) -> Result<Vec<FileEntry>> {
        let url = self.endpoint(&["api", "chat", "files"])?;
        let files: Option<Vec<FileEntry>> = self
            .send(
                self.request(Method::GET, url)
                    .query(&[("roomId", room_id.as_str())]),
            )
            .await?
            .json()
            .await
            .with_context(|| format!("invalid file list for room {room_id}"))?;
        Ok(files.unwrap_or_default())
    }

    async fn download(&self, storage_name: &str) -> Result<Vec<u8>> {
        let url = self.endpoint(&["api", "chat", "download", storage_name])?;
        let bytes = self
            .send(self.request(Method::GET, url))
            .await?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl RoomMembership for RestBackend {
    async fn leave_room(&self, room_id: &RoomId) -> Result<()> {
        let url = self.endpoint(&["api", "chat", "leave"])?;
        self.send(
            self.request(Method::POST, url)
                .query(&[("roomId", room_id.as_str())]),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
